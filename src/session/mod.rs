//! Session state machine (C4) and per-connection runtime (C6): the pieces
//! that sit between the wire codec and the client/server facades.

pub mod runtime;
pub mod state;

pub use runtime::{
    AllowAllAuthenticator, AuthOutcome, Authenticator, BindHandshakeError, KeepAliveTracker,
    RuntimeConfig, RuntimeError, SessionHandle, SessionHandler, SessionRuntime,
};
pub use state::{BindType, SessionEvent, SessionState};
