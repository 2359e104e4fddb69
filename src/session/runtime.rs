//! Per-connection session runtime (C6): the piece that turns a split
//! [`crate::transport::Connection`] and a [`crate::window::Window`] into a
//! live SMPP session — bind handshake, sequence number allocation, the
//! inbound dispatch loop, keep-alive, and orderly/forced shutdown.
//!
//! [`crate::client::default::DefaultClient`] speaks SMPP directly over a
//! single `Connection` for simple request/response use; `SessionRuntime`
//! is the split-reader/writer runtime used where a session must also
//! *receive* spontaneous requests while a caller has outbound operations
//! in flight — namely [`crate::server`].

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::client::types::BindType;
use crate::codec::{CodecError, Frame, MalformedPdu};
use crate::datatypes::{
    BindReceiver, BindReceiverResponse, BindTransceiver, BindTransceiverResponse,
    BindTransmitter, BindTransmitterResponse, CancelSm, CancelSmResponse, CommandStatus, DataSm,
    DataSmResponse, DeliverSm, DeliverSmResponse, EnquireLink, EnquireLinkResponse, GenericNack,
    MessageId, QuerySm, QuerySmResponse, ReplaceSm, ReplaceSmResponse, SubmitMulti,
    SubmitMultiResponse, SubmitSm, SubmitSmResponse, Unbind, UnbindResponse,
};
use crate::session::state::{SessionEvent, SessionState};
use crate::transport::{FrameReader, FrameWriter};
use crate::window::{Window, WindowError};

/// A sequence number generator matching the wire constraint that
/// `sequence_number` is a 32-bit value and `0` is reserved (SMPP v3.4
/// §3.2): wraps back to `1`, never `0`, once it reaches the top of the
/// usable range.
pub struct SequenceGenerator {
    next: AtomicU32,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocate the next sequence number.
    pub fn next(&self) -> u32 {
        loop {
            let current = self.next.load(Ordering::Relaxed);
            let after = if current >= 0x7FFF_FFFF { 1 } else { current + 1 };
            if self
                .next
                .compare_exchange_weak(current, after, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return current;
            }
        }
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks outbound `enquire_link` requests awaiting their
/// `enquire_link_resp`, independent of the main [`Window`] (spec §4.7/C8:
/// keep-alive must not consume an application window slot). `run_keep_alive`
/// increments this before writing an `enquire_link`; `dispatch_one`
/// decrements it when the matching `enquire_link_resp` arrives, matched by
/// count rather than by sequence number since keep-alive only needs to know
/// how many are outstanding, not which.
#[derive(Default)]
pub struct KeepAliveTracker {
    pending: AtomicU32,
}

impl KeepAliveTracker {
    pub fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
        }
    }

    /// Number of `enquire_link`s sent but not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire) as usize
    }

    fn increment(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Saturating so a spurious or duplicate `enquire_link_resp` can't
    /// underflow the counter.
    fn decrement(&self) {
        let _ = self.pending.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            Some(v.saturating_sub(1))
        });
    }
}

/// Result of authenticating a bind attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Accepted,
    Rejected(CommandStatus),
}

/// Authenticates incoming bind requests on the server side of a session.
///
/// Kept as its own trait (rather than folded into [`SessionHandler`]) so a
/// server can swap authentication backends — static credential tables,
/// RADIUS, a database lookup — independently of how it handles bound
/// traffic.
pub trait Authenticator: Send + Sync {
    fn authenticate(
        &self,
        system_id: &str,
        password: Option<&str>,
        system_type: &str,
        bind_type: BindType,
    ) -> impl Future<Output = AuthOutcome> + Send;
}

/// An authenticator that accepts every bind attempt. Grounded in the
/// original `DefaultClient`, which never validates SMSC-side credentials
/// either since it only plays the ESME role; useful for local testing of
/// the server facade where no real credential store exists yet.
pub struct AllowAllAuthenticator;

impl Authenticator for AllowAllAuthenticator {
    async fn authenticate(
        &self,
        _system_id: &str,
        _password: Option<&str>,
        _system_type: &str,
        _bind_type: BindType,
    ) -> AuthOutcome {
        AuthOutcome::Accepted
    }
}

/// Failure modes of the bind handshake, distinct from [`RuntimeError`]
/// since a failed bind never reaches the dispatch loop.
#[derive(Debug, Error)]
pub enum BindHandshakeError {
    #[error("bind handshake timed out")]
    Timeout,

    #[error("connection closed before a bind frame was received")]
    ConnectionClosed,

    #[error("peer sent {0:?} instead of a bind PDU")]
    UnexpectedFrame(crate::codec::CodecError),

    #[error("expected a bind response, got a different PDU")]
    UnexpectedResponse,

    #[error("bind rejected by peer: {0:?}")]
    Rejected(CommandStatus),

    #[error("codec error during bind: {0}")]
    Codec(#[from] CodecError),
}

/// Tunables for a [`SessionRuntime`], mirroring the client/server
/// configuration defaults.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// This side's own `system_id`, echoed in every `bind_*_resp` this
    /// session sends as the SMSC role. Unused on the client side, where
    /// the bind response instead carries the *peer's* system_id back to
    /// the caller.
    pub system_id: String,
    /// Maximum number of concurrently outstanding requests this session
    /// may have in flight.
    pub window_size: usize,
    /// How long to wait for a bind/bind_resp handshake to complete.
    pub bind_timeout: Duration,
    /// How long to wait for a response to any other outbound request.
    pub request_timeout: Duration,
    /// Interval at which `enquire_link` is sent on an otherwise idle
    /// write path.
    pub enquire_link_interval: Duration,
    /// Maximum `enquire_link` requests allowed to be outstanding before
    /// the session is considered dead.
    pub max_pending_enquire_links: usize,
    /// Grace period a graceful shutdown waits for the peer's
    /// `unbind_resp` before forcing the connection closed.
    pub shutdown_grace_period: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            system_id: String::new(),
            window_size: 512,
            bind_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            enquire_link_interval: Duration::from_secs(30),
            max_pending_enquire_links: 3,
            shutdown_grace_period: Duration::from_secs(5),
        }
    }
}

/// Errors surfaced by a running session after the bind handshake has
/// completed.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("session is not bound")]
    NotBound,

    #[error("peer closed the connection")]
    ConnectionClosed,

    #[error("session was closed locally")]
    Closed,

    #[error("peer exceeded the allowed pending enquire_link count")]
    KeepAliveExhausted,
}

/// A clonable, `Send + Sync` view of a live session that outbound
/// operations and other tasks (keep-alive sweeper, shutdown trigger) use
/// to submit work without owning the reader/writer halves.
///
/// Holds the writer behind a `Mutex` since SMPP allows only one PDU in
/// flight on the wire at a time per direction, mirroring how
/// `Connection::write_frame` serializes writes internally.
pub struct SessionHandle<W> {
    writer: Arc<Mutex<FrameWriter<W>>>,
    window: Window<Frame>,
    sequence: Arc<SequenceGenerator>,
    state: Arc<Mutex<SessionState>>,
    config: RuntimeConfig,
}

impl<W> Clone for SessionHandle<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            window: self.window.clone(),
            sequence: Arc::clone(&self.sequence),
            state: Arc::clone(&self.state),
            config: self.config.clone(),
        }
    }
}

impl<W: AsyncWrite + Unpin> SessionHandle<W> {
    /// Build a handle around a freshly split writer, ready to drive a
    /// session that has just completed its bind handshake in
    /// `initial_state`.
    pub fn new(
        writer: FrameWriter<W>,
        window: Window<Frame>,
        sequence: Arc<SequenceGenerator>,
        initial_state: SessionState,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            window,
            sequence,
            state: Arc::new(Mutex::new(initial_state)),
            config,
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub fn window(&self) -> &Window<Frame> {
        &self.window
    }

    pub fn next_sequence_number(&self) -> u32 {
        self.sequence.next()
    }

    /// Send `frame` (already carrying its final sequence number) and wait
    /// for the correlated response via the window, or `RuntimeError` on
    /// timeout/connection loss.
    ///
    /// The caller is responsible for assigning `frame`'s sequence number
    /// from `next_sequence_number()` before calling this, since the
    /// window entry must be registered before the write is issued (a
    /// response arriving between write and `offer` would otherwise be
    /// lost).
    pub async fn request(&self, sequence_number: u32, frame: Frame) -> Result<Frame, RuntimeError> {
        let completion = self
            .window
            .offer(sequence_number, self.config.request_timeout)
            .await?;

        if let Err(err) = self.write(&frame).await {
            self.window.fail(sequence_number, WindowError::ConnectionClosed).await;
            return Err(err);
        }

        completion
            .wait_timeout(self.config.request_timeout)
            .await
            .map_err(RuntimeError::from)
    }

    /// Write `frame` without registering it in the window — used for
    /// responses and fire-and-forget PDUs (`outbind`, `alert_notification`
    /// sent by the SMSC role).
    pub async fn write(&self, frame: &Frame) -> Result<(), RuntimeError> {
        let mut writer = self.writer.lock().await;
        writer.write_frame(frame).await.map_err(RuntimeError::from)
    }

    /// Exposed at `pub(crate)` rather than `pub` since the only legitimate
    /// callers are the dispatch loop (on `unbind`) and
    /// [`crate::server`]/[`crate::client`] on connection teardown; an
    /// external caller forcing a transition would desync the handle from
    /// what actually happened on the wire.
    pub(crate) async fn set_state(&self, event: SessionEvent) -> SessionState {
        let mut state = self.state.lock().await;
        *state = state.apply(event);
        *state
    }

    /// Periodically sweep the window for entries older than
    /// `config.request_timeout`, failing them with
    /// [`WindowError::RequestTimeout`] so a peer that accepts a request and
    /// then never answers doesn't pin a window slot forever (spec.md §5
    /// recommends a once-a-second cadence). Intended to run as its own task
    /// alongside [`SessionRuntime::run_dispatch_loop`]/`run_keep_alive`.
    pub async fn run_expiry_sweeper(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    let expired = self.window.expire_old_requests(self.config.request_timeout).await;
                    if expired > 0 {
                        tracing::debug!(expired, "expired stale window entries");
                    }
                }
            }
        }
    }
}

/// Callbacks a [`SessionRuntime`] dispatches inbound, non-response frames
/// to. Every method has a default that answers with the PDU's error
/// response (or a no-op for fire-and-forget PDUs), so an implementation
/// only needs to override the operations it actually supports — a
/// transmitter-only client never overrides `handle_deliver_sm`, and an
/// SMSC that doesn't support broadcast never overrides broadcast
/// handlers.
///
/// Async-fn-in-trait, matching the idiom [`crate::client::traits`]
/// already uses for the ESME-facing client traits; not `dyn`-compatible,
/// so [`SessionRuntime`] and [`crate::server::SmppServer`] are generic
/// over `H: SessionHandler` rather than boxing a trait object.
pub trait SessionHandler: Send + Sync + 'static {
    fn handle_submit_sm(
        &self,
        pdu: SubmitSm,
    ) -> impl Future<Output = SubmitSmResponse> + Send {
        async move { SubmitSmResponse::error(pdu.sequence_number, CommandStatus::SystemError) }
    }

    fn handle_submit_multi(
        &self,
        pdu: SubmitMulti,
    ) -> impl Future<Output = SubmitMultiResponse> + Send {
        async move {
            SubmitMultiResponse::complete_failure(pdu.sequence_number, CommandStatus::SystemError)
        }
    }

    fn handle_query_sm(&self, pdu: QuerySm) -> impl Future<Output = QuerySmResponse> + Send {
        async move {
            QuerySmResponse::new(
                pdu.sequence_number,
                CommandStatus::QuerySmRequestFailed,
                MessageId::default(),
                None,
                crate::datatypes::MessageState::Unknown,
                0,
            )
            .expect("default query_sm_resp fields are always valid")
        }
    }

    fn handle_cancel_sm(&self, pdu: CancelSm) -> impl Future<Output = CancelSmResponse> + Send {
        async move { CancelSmResponse::error(pdu.sequence_number, CommandStatus::CancelSmFailed) }
    }

    fn handle_replace_sm(&self, pdu: ReplaceSm) -> impl Future<Output = ReplaceSmResponse> + Send {
        async move { ReplaceSmResponse::error(pdu.sequence_number, CommandStatus::ReplacedSmFailed) }
    }

    fn handle_data_sm(&self, pdu: DataSm) -> impl Future<Output = DataSmResponse> + Send {
        async move { DataSmResponse::error(pdu.sequence_number, CommandStatus::SystemError) }
    }

    /// `deliver_sm` is sent *by* the SMSC role, so the default here is
    /// what an ESME-role session answers with: accept silently. An SMSC
    /// implementation has no reason to receive one and never calls this.
    fn handle_deliver_sm(
        &self,
        pdu: DeliverSm,
    ) -> impl Future<Output = DeliverSmResponse> + Send {
        async move {
            DeliverSmResponse {
                command_status: CommandStatus::Ok,
                sequence_number: pdu.sequence_number,
                message_id: MessageId::default(),
            }
        }
    }

    /// Called as soon as a connection is accepted, before the bind
    /// handshake even begins. Default is a no-op; servers use this for
    /// connection-level accounting (e.g. enforcing `max_connections`)
    /// that must happen whether or not the peer ever binds successfully.
    fn session_created(&self, _remote: std::net::SocketAddr) -> impl Future<Output = ()> + Send {
        async move {}
    }

    /// Called once a bind handshake succeeds, before the dispatch loop
    /// starts. Default is a no-op; servers use this to register the
    /// session in a directory keyed by `system_id`.
    fn session_bound(&self, _system_id: &str, _bind_type: BindType) -> impl Future<Output = ()> + Send {
        async move {}
    }

    /// Called once, when the session transitions to `Closed` for any
    /// reason (clean unbind, connection loss, forced shutdown).
    fn session_closed(&self, _system_id: &str) -> impl Future<Output = ()> + Send {
        async move {}
    }
}

/// Runs the read side of a bound session: decode frames, route responses
/// to the window, dispatch requests to `handler`, and answer unknown
/// command_ids with `GenericNack` per SMPP v3.4 §4.3.
///
/// `system_id` is only used for handler callbacks and logging; the
/// runtime itself does not re-validate it after the bind handshake.
pub struct SessionRuntime<H> {
    handler: Arc<H>,
    config: RuntimeConfig,
}

impl<H: SessionHandler> SessionRuntime<H> {
    pub fn new(handler: H, config: RuntimeConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            config,
        }
    }

    /// Build a runtime around a handler already shared across connections
    /// (the server facade accepts many connections against one
    /// `Arc<H>`, so each accepted connection's runtime borrows the same
    /// handler rather than requiring `H: Clone`).
    pub fn from_handler(handler: Arc<H>, config: RuntimeConfig) -> Self {
        Self { handler, config }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Client-side bind handshake: send the bind request matching
    /// `credentials.interface_version`/`bind_type`, register it in
    /// `window`, and wait for the matching `*_resp` (or a timeout/any
    /// other failure).
    pub async fn bind_as_client<W: AsyncWrite + Unpin, R: AsyncRead + Unpin>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
        window: &Window<Frame>,
        sequence: &SequenceGenerator,
        credentials: &crate::client::types::BindCredentials,
    ) -> Result<(), BindHandshakeError> {
        let seq = sequence.next();
        let frame = build_bind_request(credentials, seq);

        let completion = window
            .offer(seq, self.config.bind_timeout)
            .await
            .map_err(|_| BindHandshakeError::Timeout)?;

        writer.write_frame(&frame).await?;

        // The reader task isn't running yet during the handshake, so this
        // runtime reads directly off `reader` until the bind response
        // arrives; any other frame received in the meantime (a
        // well-behaved SMSC sends none) is dropped with a warning rather
        // than failing the bind outright.
        loop {
            match tokio::time::timeout(self.config.bind_timeout, reader.read_raw_frame()).await {
                Err(_) => return Err(BindHandshakeError::Timeout),
                Ok(Ok(None)) => return Err(BindHandshakeError::ConnectionClosed),
                Ok(Err(err)) => return Err(BindHandshakeError::UnexpectedFrame(err)),
                Ok(Ok(Some(Err(malformed)))) => {
                    tracing::warn!(?malformed, "malformed PDU during bind handshake");
                    continue;
                }
                Ok(Ok(Some(Ok(response)))) => {
                    if response.sequence_number() != seq {
                        tracing::warn!(
                            expected = seq,
                            got = response.sequence_number(),
                            "ignoring unrelated frame during bind handshake"
                        );
                        continue;
                    }

                    let status = bind_response_status(&response)
                        .ok_or(BindHandshakeError::UnexpectedResponse)?;
                    window.complete(seq, response).await;
                    let _ = completion;

                    return if status == CommandStatus::Ok {
                        Ok(())
                    } else {
                        Err(BindHandshakeError::Rejected(status))
                    };
                }
            }
        }
    }

    /// Server-side bind handshake: wait up to `bind_timeout` for any bind
    /// frame, authenticate it, and write back the matching response.
    /// Returns the negotiated `(system_id, bind_type)` on success.
    pub async fn accept_bind<W: AsyncWrite + Unpin, R: AsyncRead + Unpin>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
        authenticator: &impl Authenticator,
    ) -> Result<(String, BindType), BindHandshakeError> {
        let frame = match tokio::time::timeout(self.config.bind_timeout, reader.read_raw_frame()).await
        {
            Err(_) => return Err(BindHandshakeError::Timeout),
            Ok(Ok(None)) => return Err(BindHandshakeError::ConnectionClosed),
            Ok(Err(err)) => return Err(BindHandshakeError::UnexpectedFrame(err)),
            Ok(Ok(Some(Err(malformed)))) => {
                return Err(BindHandshakeError::Rejected(malformed.status));
            }
            Ok(Ok(Some(Ok(frame)))) => frame,
        };

        let (system_id, password, system_type, bind_type, seq) = match &frame {
            Frame::BindTransmitter(pdu) => (
                pdu.system_id.as_str().unwrap_or("").to_string(),
                pdu.password.as_ref().and_then(|p| p.as_str().ok()).map(str::to_string),
                pdu.system_type.as_str().unwrap_or("").to_string(),
                BindType::Transmitter,
                pdu.sequence_number,
            ),
            Frame::BindReceiver(pdu) => (
                pdu.system_id.as_str().unwrap_or("").to_string(),
                pdu.password.as_ref().and_then(|p| p.as_str().ok()).map(str::to_string),
                pdu.system_type.as_str().unwrap_or("").to_string(),
                BindType::Receiver,
                pdu.sequence_number,
            ),
            Frame::BindTransceiver(pdu) => (
                pdu.system_id.as_str().unwrap_or("").to_string(),
                pdu.password.as_ref().and_then(|p| p.as_str().ok()).map(str::to_string),
                pdu.system_type.as_str().unwrap_or("").to_string(),
                BindType::Transceiver,
                pdu.sequence_number,
            ),
            other => {
                return Err(BindHandshakeError::UnexpectedFrame(CodecError::InvalidCommandId(
                    other.command_id() as u32,
                )));
            }
        };

        let outcome = authenticator
            .authenticate(&system_id, password.as_deref(), &system_type, bind_type)
            .await;

        let status = match outcome {
            AuthOutcome::Accepted => CommandStatus::Ok,
            AuthOutcome::Rejected(status) => status,
        };

        let response = build_bind_response(bind_type, seq, status, &self.config.system_id);
        writer.write_frame(&response).await?;

        match outcome {
            AuthOutcome::Accepted => Ok((system_id, bind_type)),
            AuthOutcome::Rejected(status) => Err(BindHandshakeError::Rejected(status)),
        }
    }

    /// Drive the inbound side of a bound session until the peer closes
    /// the connection, an unrecoverable codec error occurs, or `shutdown`
    /// resolves. Responses are routed to `window`; requests are
    /// dispatched to `self.handler` and their answers written back
    /// through `handle`.
    pub async fn run_dispatch_loop<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
        &self,
        mut reader: FrameReader<R>,
        handle: SessionHandle<W>,
        system_id: String,
        last_read: Arc<Mutex<Instant>>,
        keep_alive: Arc<KeepAliveTracker>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), RuntimeError> {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                    continue;
                }
                frame = reader.read_raw_frame() => frame,
            };

            // Any inbound traffic — including a malformed frame or an
            // enquire_link_resp handled below — counts as read activity,
            // resetting the read-idle clock `run_keep_alive` watches.
            *last_read.lock().await = Instant::now();

            let frame = match outcome? {
                // `session_closed` fires once, from the connection's owner
                // (`server::serve_connection`/the client session), after
                // every background task for the session has wound down —
                // not here, where dispatch is only one of several tasks
                // racing to end the session.
                None => return Err(RuntimeError::ConnectionClosed),
                Some(Err(malformed)) => {
                    tracing::debug!(%system_id, ?malformed, "malformed PDU on bound session");
                    let nack = GenericNack::new(malformed.status, malformed.sequence_number);
                    let _ = handle.write(&Frame::GenericNack(nack)).await;
                    continue;
                }
                Some(Ok(frame)) => frame,
            };

            self.dispatch_one(frame, &handle, &keep_alive).await;
        }
    }

    async fn dispatch_one<W: AsyncWrite + Unpin>(
        &self,
        frame: Frame,
        handle: &SessionHandle<W>,
        keep_alive: &KeepAliveTracker,
    ) {
        // Matched by count against the dedicated `KeepAliveTracker`, not
        // the main window — an `enquire_link` never occupies an
        // application slot (spec §4.7/C8).
        if matches!(frame, Frame::EnquireLinkResp(_)) {
            keep_alive.decrement();
            return;
        }

        if frame.is_response() || matches!(frame, Frame::GenericNack(_)) {
            let seq = frame.sequence_number();
            match &frame {
                Frame::GenericNack(nack) if nack.command_status != CommandStatus::Ok => {
                    handle.window().fail(seq, WindowError::Cancelled).await;
                }
                _ => {
                    handle.window().complete(seq, frame).await;
                }
            }
            return;
        }

        // §4.4: a session may only originate submit_sm/data_sm/query_sm/
        // cancel_sm/replace_sm/submit_multi while bound as transmitter or
        // transceiver; a receiver-bound peer gets ESME_RINVBNDSTS without
        // the request ever reaching `self.handler`.
        if frame.requires_transmit_capability() && !handle.state().await.can_transmit() {
            let seq = frame.sequence_number();
            if let Some(nack) = frame.invalid_bind_status_response(seq) {
                let _ = handle.write(&nack).await;
            }
            return;
        }

        match frame {
            Frame::EnquireLink(pdu) => {
                let resp = EnquireLinkResponse::new(pdu.sequence_number);
                let _ = handle.write(&Frame::EnquireLinkResp(resp)).await;
            }
            Frame::Unbind(pdu) => {
                let resp = UnbindResponse::new(pdu.sequence_number);
                let _ = handle.write(&Frame::UnbindResp(resp)).await;
                handle.set_state(SessionEvent::Unbind).await;
            }
            Frame::SubmitSm(pdu) => {
                let resp = self.handler.handle_submit_sm(*pdu).await;
                let _ = handle.write(&Frame::SubmitSmResp(resp)).await;
            }
            Frame::SubmitMulti(pdu) => {
                let resp = self.handler.handle_submit_multi(*pdu).await;
                let _ = handle.write(&Frame::SubmitMultiResp(resp)).await;
            }
            Frame::QuerySm(pdu) => {
                let resp = self.handler.handle_query_sm(pdu).await;
                let _ = handle.write(&Frame::QuerySmResp(resp)).await;
            }
            Frame::CancelSm(pdu) => {
                let resp = self.handler.handle_cancel_sm(pdu).await;
                let _ = handle.write(&Frame::CancelSmResp(resp)).await;
            }
            Frame::ReplaceSm(pdu) => {
                let resp = self.handler.handle_replace_sm(*pdu).await;
                let _ = handle.write(&Frame::ReplaceSmResp(resp)).await;
            }
            Frame::DataSm(pdu) => {
                let resp = self.handler.handle_data_sm(*pdu).await;
                let _ = handle.write(&Frame::DataSmResp(resp)).await;
            }
            Frame::DeliverSm(pdu) => {
                let resp = self.handler.handle_deliver_sm(*pdu).await;
                let _ = handle.write(&Frame::DeliverSmResp(resp)).await;
            }
            Frame::AlertNotification(_) | Frame::Outbind(_) => {
                // Fire-and-forget PDUs: never entered into the window, no
                // response PDU exists on the wire for either.
            }
            Frame::Unknown { header, .. } => {
                let nack = GenericNack::invalid_command_id(header.sequence_number);
                let _ = handle.write(&Frame::GenericNack(nack)).await;
            }
            // Bind frames and every `*Resp` variant are handled above or
            // only ever seen during the bind handshake.
            _ => {}
        }
    }

    /// Dual-timer keep-alive: `enquire_link` is sent after
    /// `enquire_link_interval` of write-idle time; the read side is
    /// considered dead after `3 * enquire_link_interval` without any
    /// inbound traffic (including `enquire_link_resp`). Intended to run
    /// as its own task alongside `run_dispatch_loop`.
    pub async fn run_keep_alive<W: AsyncWrite + Unpin>(
        &self,
        handle: SessionHandle<W>,
        sequence: Arc<SequenceGenerator>,
        last_read: Arc<Mutex<Instant>>,
        keep_alive: Arc<KeepAliveTracker>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), RuntimeError> {
        let interval = self.config.enquire_link_interval;
        let read_timeout = interval * 3;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
                _ = ticker.tick() => {
                    if last_read.lock().await.elapsed() >= read_timeout {
                        return Err(RuntimeError::KeepAliveExhausted);
                    }
                    if keep_alive.pending() >= self.config.max_pending_enquire_links {
                        return Err(RuntimeError::KeepAliveExhausted);
                    }

                    // Written directly, not through `handle.request`: an
                    // `enquire_link` is tracked by the dedicated
                    // `KeepAliveTracker` counter, never the application
                    // window (spec §4.7/C8). `dispatch_one` decrements the
                    // counter when the matching `enquire_link_resp` arrives.
                    let seq = sequence.next();
                    keep_alive.increment();
                    if let Err(err) = handle.write(&Frame::EnquireLink(EnquireLink::new(seq))).await {
                        return Err(err);
                    }
                }
            }
        }
    }
}

fn build_bind_request(credentials: &crate::client::types::BindCredentials, seq: u32) -> Frame {
    use crate::datatypes::{AddressRange, NumericPlanIndicator, Password, SystemId, SystemType, TypeOfNumber};

    let system_id = SystemId::from(credentials.system_id.as_str());
    let password = Some(Password::from(credentials.password.as_str()));
    let system_type = SystemType::from(credentials.system_type.as_deref().unwrap_or(""));

    match credentials.bind_type {
        BindType::Transmitter => Frame::BindTransmitter(BindTransmitter {
            command_status: CommandStatus::Ok,
            sequence_number: seq,
            system_id,
            password,
            system_type,
            interface_version: credentials.interface_version,
            addr_ton: TypeOfNumber::Unknown,
            addr_npi: NumericPlanIndicator::Unknown,
            address_range: AddressRange::default(),
        }),
        BindType::Receiver => Frame::BindReceiver(BindReceiver {
            command_status: CommandStatus::Ok,
            sequence_number: seq,
            system_id,
            password,
            system_type,
            interface_version: credentials.interface_version,
            addr_ton: TypeOfNumber::Unknown,
            addr_npi: NumericPlanIndicator::Unknown,
            address_range: AddressRange::default(),
        }),
        BindType::Transceiver => Frame::BindTransceiver(BindTransceiver {
            command_status: CommandStatus::Ok,
            sequence_number: seq,
            system_id,
            password,
            system_type,
            interface_version: credentials.interface_version,
            addr_ton: TypeOfNumber::Unknown,
            addr_npi: NumericPlanIndicator::Unknown,
            address_range: AddressRange::default(),
        }),
    }
}

fn bind_response_status(frame: &Frame) -> Option<CommandStatus> {
    match frame {
        Frame::BindTransmitterResp(pdu) => Some(pdu.command_status),
        Frame::BindReceiverResp(pdu) => Some(pdu.command_status),
        Frame::BindTransceiverResp(pdu) => Some(pdu.command_status),
        _ => None,
    }
}

fn build_bind_response(bind_type: BindType, seq: u32, status: CommandStatus, system_id: &str) -> Frame {
    use crate::datatypes::SystemId;

    let system_id = SystemId::from(system_id);
    match bind_type {
        BindType::Transmitter => Frame::BindTransmitterResp(BindTransmitterResponse {
            command_status: status,
            sequence_number: seq,
            system_id,
            sc_interface_version: None,
        }),
        BindType::Receiver => Frame::BindReceiverResp(BindReceiverResponse {
            command_status: status,
            sequence_number: seq,
            system_id,
            sc_interface_version: None,
        }),
        BindType::Transceiver => Frame::BindTransceiverResp(BindTransceiverResponse {
            command_status: status,
            sequence_number: seq,
            system_id,
            sc_interface_version: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_generator_starts_at_one_and_increments() {
        let gen = SequenceGenerator::new();
        assert_eq!(gen.next(), 1);
        assert_eq!(gen.next(), 2);
        assert_eq!(gen.next(), 3);
    }

    #[test]
    fn sequence_generator_wraps_to_one_skipping_zero() {
        let gen = SequenceGenerator {
            next: AtomicU32::new(0x7FFF_FFFF),
        };
        assert_eq!(gen.next(), 0x7FFF_FFFF);
        assert_eq!(gen.next(), 1);
    }

    struct NoopHandler;
    impl SessionHandler for NoopHandler {}

    #[test]
    fn default_session_handler_compiles_for_a_unit_struct() {
        let _handler: Arc<dyn std::any::Any> = Arc::new(NoopHandler);
    }
}
