//! SMPP server facade (C7, SMSC role): a `ServerBuilder`/`SmppServer` pair
//! that listens for inbound TCP connections, drives each through
//! [`crate::session::SessionRuntime`]'s bind handshake and dispatch loop,
//! and hands application-level PDUs to a caller-supplied handler.
//!
//! Entirely new relative to the pre-existing ESME-only client: the
//! pre-existing crate only ever played the bind-initiating role. This
//! module is grounded in [`crate::client::builder`]'s factory/options
//! split (`ServerBuilder` mirrors `ClientBuilder`, `ServerOptions` mirrors
//! `ClientOptions`) and in [`crate::session::runtime`] for the actual
//! per-connection state machine, which this module reuses rather than
//! reimplementing.

mod directory;
mod options;

pub use directory::SessionDirectory;
pub use options::{ServerOptions, TlsConfig};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::session::state::SessionEvent;
use crate::session::{
    AllowAllAuthenticator, Authenticator, KeepAliveTracker, RuntimeConfig, SessionHandle,
    SessionHandler, SessionRuntime, SessionState,
};
use crate::transport::Connection;
use crate::window::Window;

/// Everything a handler needs to act as an SMSC: the request callbacks and
/// lifecycle hooks from [`SessionHandler`], plus bind-time authentication
/// from [`Authenticator`]. Blanket-implemented for any type implementing
/// both, matching the layered-trait idiom [`crate::client::traits`] already
/// uses (`SmppTransceiver: SmppTransmitter + SmppReceiver`).
pub trait SmscHandler: SessionHandler + Authenticator {}
impl<T: SessionHandler + Authenticator> SmscHandler for T {}

/// Errors that can prevent the server from starting. Per-connection
/// failures never reach here — they are logged and the connection is
/// dropped, mirroring how `PduRegistry`/`KeepAliveManager` already handle
/// recoverable per-connection faults without taking the whole process
/// down.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
}

/// Factory for starting an [`SmppServer`], mirroring
/// [`crate::client::builder::ClientBuilder`]'s role on the client side.
pub struct ServerBuilder;

impl ServerBuilder {
    /// Bind a `TcpListener` at `options.host:options.port` and spawn the
    /// accept loop. Returns once the listener is bound; connections are
    /// accepted and driven on background tasks.
    pub async fn start<H>(options: ServerOptions, handler: H) -> Result<SmppServer, ServerError>
    where
        H: SmscHandler,
    {
        let listener = TcpListener::bind((options.host.as_str(), options.port))
            .await
            .map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;

        Self::start_on(listener, local_addr, options, handler)
    }

    /// As [`Self::start`], but against an already-bound listener — used by
    /// tests that bind to `127.0.0.1:0` to get an ephemeral port before the
    /// server exists.
    pub fn start_on<H>(
        listener: TcpListener,
        local_addr: SocketAddr,
        options: ServerOptions,
        handler: H,
    ) -> Result<SmppServer, ServerError>
    where
        H: SmscHandler,
    {
        let handler = Arc::new(handler);
        let directory = SessionDirectory::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connections = Arc::new(Semaphore::new(options.max_connections.max(1)));

        let config = RuntimeConfig {
            system_id: options.system_id.clone(),
            window_size: options.window_size,
            bind_timeout: options.bind_timeout,
            request_timeout: options.request_timeout,
            enquire_link_interval: options.enquire_link_interval,
            ..RuntimeConfig::default()
        };

        let accept_task = tokio::spawn(accept_loop(
            listener,
            handler,
            directory.clone(),
            config,
            connections,
            shutdown_rx,
        ));

        Ok(SmppServer {
            local_addr,
            directory,
            shutdown_tx,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    /// Start a server that authenticates every bind attempt; useful for
    /// local testing and demos where no real credential store exists yet,
    /// mirroring [`AllowAllAuthenticator`]'s role on individual bind
    /// handshakes.
    pub async fn start_allow_all<H>(
        options: ServerOptions,
        handler: H,
    ) -> Result<SmppServer, ServerError>
    where
        H: SessionHandler,
    {
        Self::start(options, AllowAllHandler(handler)).await
    }
}

/// Adapts any [`SessionHandler`] into an [`SmscHandler`] by delegating
/// authentication to [`AllowAllAuthenticator`]. Used by
/// [`ServerBuilder::start_allow_all`].
struct AllowAllHandler<H>(H);

impl<H: SessionHandler> SessionHandler for AllowAllHandler<H> {
    fn handle_submit_sm(
        &self,
        pdu: crate::datatypes::SubmitSm,
    ) -> impl Future<Output = crate::datatypes::SubmitSmResponse> + Send {
        self.0.handle_submit_sm(pdu)
    }

    fn handle_submit_multi(
        &self,
        pdu: crate::datatypes::SubmitMulti,
    ) -> impl Future<Output = crate::datatypes::SubmitMultiResponse> + Send {
        self.0.handle_submit_multi(pdu)
    }

    fn handle_query_sm(
        &self,
        pdu: crate::datatypes::QuerySm,
    ) -> impl Future<Output = crate::datatypes::QuerySmResponse> + Send {
        self.0.handle_query_sm(pdu)
    }

    fn handle_cancel_sm(
        &self,
        pdu: crate::datatypes::CancelSm,
    ) -> impl Future<Output = crate::datatypes::CancelSmResponse> + Send {
        self.0.handle_cancel_sm(pdu)
    }

    fn handle_replace_sm(
        &self,
        pdu: crate::datatypes::ReplaceSm,
    ) -> impl Future<Output = crate::datatypes::ReplaceSmResponse> + Send {
        self.0.handle_replace_sm(pdu)
    }

    fn handle_data_sm(
        &self,
        pdu: crate::datatypes::DataSm,
    ) -> impl Future<Output = crate::datatypes::DataSmResponse> + Send {
        self.0.handle_data_sm(pdu)
    }

    fn handle_deliver_sm(
        &self,
        pdu: crate::datatypes::DeliverSm,
    ) -> impl Future<Output = crate::datatypes::DeliverSmResponse> + Send {
        self.0.handle_deliver_sm(pdu)
    }

    fn session_created(&self, remote: SocketAddr) -> impl Future<Output = ()> + Send {
        self.0.session_created(remote)
    }

    fn session_bound(
        &self,
        system_id: &str,
        bind_type: crate::client::types::BindType,
    ) -> impl Future<Output = ()> + Send {
        self.0.session_bound(system_id, bind_type)
    }

    fn session_closed(&self, system_id: &str) -> impl Future<Output = ()> + Send {
        self.0.session_closed(system_id)
    }
}

impl<H> Authenticator for AllowAllHandler<H>
where
    H: Send + Sync,
{
    fn authenticate(
        &self,
        system_id: &str,
        password: Option<&str>,
        system_type: &str,
        bind_type: crate::client::types::BindType,
    ) -> impl Future<Output = crate::session::AuthOutcome> + Send {
        AllowAllAuthenticator.authenticate(system_id, password, system_type, bind_type)
    }
}

/// A running SMPP server. Dropping this without calling [`Self::stop`]
/// leaves the accept loop and any bound sessions running in the
/// background — `stop` is the orderly shutdown path.
pub struct SmppServer {
    local_addr: SocketAddr,
    directory: SessionDirectory,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl SmppServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `system_id`s of every session currently bound (receiver,
    /// transmitter, or transceiver).
    pub async fn sessions(&self) -> Vec<String> {
        self.directory.system_ids().await
    }

    pub async fn session_count(&self) -> usize {
        self.directory.len().await
    }

    /// Signal the accept loop to stop taking new connections and wait for
    /// it to exit. Already-bound sessions are not forcibly closed — each
    /// keeps running its own dispatch loop/keep-alive until its peer
    /// disconnects or calls `unbind`, matching how `run_keep_alive`'s
    /// `shutdown_grace_period` is meant to be driven by the session owner
    /// rather than the listener.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.accept_task.lock().await.take() {
            let _ = task.await;
        }
    }
}

async fn accept_loop<H: SmscHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    directory: SessionDirectory,
    config: RuntimeConfig,
    connections: Arc<Semaphore>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("server accept loop shutting down");
                    return;
                }
            }
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(?err, "accept failed");
                        continue;
                    }
                };

                let permit = match Arc::clone(&connections).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!(%remote, "rejecting connection: max_connections reached");
                        drop(stream);
                        continue;
                    }
                };

                handler.session_created(remote).await;

                let handler = Arc::clone(&handler);
                let directory = directory.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    serve_connection(stream, remote, handler, directory, config).await;
                });
            }
        }
    }
}

async fn serve_connection<H: SmscHandler>(
    stream: TcpStream,
    remote: SocketAddr,
    handler: Arc<H>,
    directory: SessionDirectory,
    config: RuntimeConfig,
) {
    // Scoped to this connection's own lifetime, deliberately independent of
    // the accept loop's shutdown signal: `SmppServer::stop` only stops new
    // accepts (see its doc comment) and must not tear down sessions that
    // are already bound and talking to their peer.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let _ = stream.set_nodelay(true);
    let runtime = SessionRuntime::from_handler(Arc::clone(&handler), config.clone());

    let (mut reader, mut writer) = Connection::new(stream).into_split();

    let (system_id, bind_type) = match runtime.accept_bind(&mut reader, &mut writer, handler.as_ref()).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(%remote, ?err, "bind handshake failed");
            return;
        }
    };

    let initial_state = match bind_type {
        crate::client::types::BindType::Transmitter => SessionState::Open.apply(SessionEvent::Bind(bind_type)),
        crate::client::types::BindType::Receiver => SessionState::Open.apply(SessionEvent::Bind(bind_type)),
        crate::client::types::BindType::Transceiver => SessionState::Open.apply(SessionEvent::Bind(bind_type)),
    };

    let window = Window::new(config.window_size);
    let sequence = Arc::new(crate::session::runtime::SequenceGenerator::new());
    let handle = SessionHandle::new(writer, window, sequence.clone(), initial_state, config.clone());

    directory
        .insert(system_id.clone(), bind_type, handle.clone())
        .await;
    handler.session_bound(&system_id, bind_type).await;

    let last_read = Arc::new(Mutex::new(tokio::time::Instant::now()));
    let keep_alive_tracker = Arc::new(KeepAliveTracker::new());

    let sweep_handle = handle.clone();
    let sweep_shutdown = shutdown_rx.clone();
    let sweep_task = tokio::spawn(async move { sweep_handle.run_expiry_sweeper(sweep_shutdown).await });

    let dispatch = runtime.run_dispatch_loop(
        reader,
        handle.clone(),
        system_id.clone(),
        last_read.clone(),
        keep_alive_tracker.clone(),
        shutdown_rx.clone(),
    );
    let keep_alive = runtime.run_keep_alive(
        handle.clone(),
        sequence,
        last_read,
        keep_alive_tracker,
        shutdown_rx.clone(),
    );

    tokio::select! {
        result = dispatch => {
            if let Err(err) = result {
                tracing::info!(%remote, %system_id, ?err, "dispatch loop ended");
            }
        }
        result = keep_alive => {
            if let Err(err) = result {
                tracing::info!(%remote, %system_id, ?err, "keep-alive ended session");
            }
        }
    }

    // Whichever of dispatch/keep-alive returned first is enough to call the
    // session over; stop the other and the sweeper together rather than
    // leaving them to race the directory/handler cleanup below.
    let _ = shutdown_tx.send(true);
    let _ = sweep_task.await;

    handle.window().close().await;
    handle.set_state(SessionEvent::Close).await;
    directory.remove(&system_id).await;
    handler.session_closed(&system_id).await;
}
