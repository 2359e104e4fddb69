// ABOUTME: Configuration for the SMPP server facade (ServerBuilder/SmppServer)
// ABOUTME: Mirrors client::builder::ClientOptions' Duration-typed, defaulted builder pattern

use std::time::Duration;

use crate::client::types::BindType;
use crate::datatypes::{InterfaceVersion, NumericPlanIndicator, TypeOfNumber};

/// Placeholder hook for a transport-level TLS acceptor. SMPP-over-TLS is a
/// deployment concern (a `rustls`/`tokio-rustls` acceptor wrapping the
/// accepted `TcpStream` before it reaches [`crate::transport::Connection`]),
/// not part of this crate's protocol implementation — out of scope per the
/// original specification's purpose statement. The field exists so
/// `ServerOptions` carries every field the configuration surface names;
/// nothing in [`crate::server`] currently reads it.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig;

/// Tunables for [`crate::server::ServerBuilder::start`].
///
/// Carries both the listener-facing fields (`host`/`port`/`max_connections`)
/// and the per-session defaults handed to every accepted connection's
/// [`crate::session::RuntimeConfig`] (`window_size`, the timeout family,
/// `enquire_link_interval`). `reconnect_delay`/`max_reconnect_attempts` are
/// carried for parity with [`crate::client::builder::ClientOptions`]'s
/// configuration surface (the same struct shape documents both roles) but
/// are not consulted by the accept loop: a server never reconnects, it only
/// accepts.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Interface/address to listen on.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// This SMSC's own `system_id`, echoed back in every `bind_*_resp`.
    pub system_id: String,
    /// Shared-secret password consulted by the default authenticator, if
    /// one is configured; a custom [`crate::session::Authenticator`] may
    /// ignore this entirely.
    pub password: String,
    /// `system_type` this SMSC advertises.
    pub system_type: String,
    /// SMPP protocol version this SMSC negotiates (v3.4 vs v5.0 TLV set).
    pub interface_version: InterfaceVersion,
    pub address_ton: TypeOfNumber,
    pub address_npi: NumericPlanIndicator,
    pub address_range: String,
    /// Default bind type advertised in documentation/demos; the accept
    /// loop itself honors whatever bind PDU the peer actually sends.
    pub bind_type: BindType,
    /// Per-session sliding window capacity (SMPP v3.4 §4.1).
    pub window_size: usize,
    /// How long the accept loop waits before giving up on a connection
    /// that never completes its TCP handshake-adjacent setup (reserved for
    /// a future listener-level accept timeout; not currently enforced).
    pub connect_timeout: Duration,
    /// How long a freshly-accepted connection has to send a bind PDU.
    pub bind_timeout: Duration,
    /// How long outbound server-initiated requests (none today; reserved
    /// for broadcast/outbind support) wait for a response.
    pub request_timeout: Duration,
    /// Keep-alive cadence applied to every bound session.
    pub enquire_link_interval: Duration,
    /// See struct-level note: not consulted by the accept loop.
    pub reconnect_delay: Duration,
    /// See struct-level note: not consulted by the accept loop.
    pub max_reconnect_attempts: u32,
    /// Upper bound on a single PDU's `command_length`, passed through to
    /// the codec layer.
    pub max_pdu_size: u32,
    /// See [`TlsConfig`].
    pub tls_config: Option<TlsConfig>,
    /// Maximum number of concurrently accepted connections. Enforced with
    /// a `tokio::sync::Semaphore`; connections beyond this are dropped
    /// immediately after `accept()`, before a bind handshake is attempted.
    pub max_connections: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2775,
            system_id: "smsc".to_string(),
            password: String::new(),
            system_type: String::new(),
            interface_version: InterfaceVersion::SmppV34,
            address_ton: TypeOfNumber::Unknown,
            address_npi: NumericPlanIndicator::Unknown,
            address_range: String::new(),
            bind_type: BindType::Transceiver,
            window_size: 512,
            connect_timeout: Duration::from_secs(30),
            bind_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            enquire_link_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 0,
            max_pdu_size: crate::codec::MAX_PDU_SIZE,
            tls_config: None,
            max_connections: 1024,
        }
    }
}

impl ServerOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = system_id.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_enquire_link_interval(mut self, interval: Duration) -> Self {
        self.enquire_link_interval = interval;
        self
    }
}
