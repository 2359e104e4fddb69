// ABOUTME: Pipelined SMPP client built on the session runtime's sliding window
// ABOUTME: Lets an ESME have many submit_sm/data_sm/query_sm/etc in flight concurrently, unlike DefaultClient's lock-step model

use std::sync::Arc;

use tokio::io::WriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::client::error::{SmppError, SmppResult};
use crate::client::types::BindCredentials;
use crate::codec::Frame;
use crate::datatypes::{
    CancelSm, CancelSmResponse, CommandStatus, DataSm, DataSmResponse, QuerySm, QuerySmResponse,
    ReplaceSm, ReplaceSmResponse, SubmitMulti, SubmitMultiResponse, SubmitSm, SubmitSmResponse,
    Unbind, UnbindResponse,
};
use crate::session::runtime::{KeepAliveTracker, SequenceGenerator};
use crate::session::state::{SessionEvent, SessionState};
use crate::session::{RuntimeConfig, SessionHandle, SessionHandler, SessionRuntime};
use crate::transport::Connection;
use crate::window::Window;

/// A [`SessionHandler`] that answers inbound traffic with every default the
/// trait already provides (`deliver_sm` accepted silently,
/// `alert_notification`/`outbind` ignored) and nothing else. The handler a
/// [`PipelinedClient`] needs most of the time — overriding `handle_deliver_sm`
/// is only necessary for a receiver/transceiver session that wants to act on
/// inbound messages rather than just acknowledge them.
pub struct NoopSessionHandler;

impl SessionHandler for NoopSessionHandler {}

/// A pipelined SMPP client: binds once, then lets any number of
/// `submit_sm`/`data_sm`/`query_sm`/`cancel_sm`/`replace_sm`/`submit_multi`
/// calls race concurrently, each correlated to its response by sequence
/// number through the same [`crate::window::Window`] the server facade uses.
///
/// Unlike [`crate::client::default::DefaultClient`], which is intentionally
/// lock-step, this type reuses [`SessionRuntime`]'s bind handshake and
/// dispatch/keep-alive loops — already built generically for the SMSC role —
/// for the ESME role instead. A receiver/transceiver session that needs to
/// act on inbound `deliver_sm` rather than just acknowledge it should supply
/// a custom `H: SessionHandler` via [`PipelinedClient::connect_with_handler`].
pub struct PipelinedClient<H: SessionHandler = NoopSessionHandler> {
    handle: SessionHandle<WriteHalf<TcpStream>>,
    sequence: Arc<SequenceGenerator>,
    runtime: Arc<SessionRuntime<H>>,
    shutdown: watch::Sender<bool>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    keep_alive_task: Mutex<Option<JoinHandle<()>>>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl PipelinedClient<NoopSessionHandler> {
    /// Connect and bind with the default no-op handler — the common case
    /// for a pure transmitter, or a receiver/transceiver that only needs
    /// `deliver_sm` acknowledged rather than acted upon.
    pub async fn connect<A: ToSocketAddrs + Send>(
        addr: A,
        credentials: BindCredentials,
        config: RuntimeConfig,
    ) -> SmppResult<Self> {
        Self::connect_with_handler(addr, credentials, config, NoopSessionHandler).await
    }
}

impl<H: SessionHandler> PipelinedClient<H> {
    /// Connect, complete the bind handshake, and start the background
    /// dispatch/keep-alive/expiry-sweep tasks that keep the session alive
    /// and answer inbound traffic between outbound calls.
    pub async fn connect_with_handler<A: ToSocketAddrs + Send>(
        addr: A,
        credentials: BindCredentials,
        config: RuntimeConfig,
        handler: H,
    ) -> SmppResult<Self> {
        let stream = TcpStream::connect(addr).await.map_err(SmppError::Connection)?;
        let _ = stream.set_nodelay(true);

        let (mut reader, mut writer) = Connection::new(stream).into_split();
        let runtime = SessionRuntime::new(handler, config.clone());
        let sequence = Arc::new(SequenceGenerator::new());
        let window: Window<Frame> = Window::new(config.window_size);

        runtime
            .bind_as_client(&mut reader, &mut writer, &window, &sequence, &credentials)
            .await?;

        let initial_state = SessionState::Open.apply(SessionEvent::Bind(credentials.bind_type));
        let handle = SessionHandle::new(
            writer,
            window,
            Arc::clone(&sequence),
            initial_state,
            config.clone(),
        );

        let runtime = Arc::new(runtime);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let last_read = Arc::new(Mutex::new(Instant::now()));
        let keep_alive_tracker = Arc::new(KeepAliveTracker::new());

        let dispatch_task = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            let handle = handle.clone();
            let last_read = Arc::clone(&last_read);
            let keep_alive_tracker = Arc::clone(&keep_alive_tracker);
            let shutdown_rx = shutdown_rx.clone();
            let system_id = credentials.system_id.clone();
            async move {
                if let Err(err) = runtime
                    .run_dispatch_loop(
                        reader,
                        handle,
                        system_id,
                        last_read,
                        keep_alive_tracker,
                        shutdown_rx,
                    )
                    .await
                {
                    tracing::info!(?err, "pipelined client dispatch loop ended");
                }
            }
        });

        let keep_alive_task = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            let handle = handle.clone();
            let sequence = Arc::clone(&sequence);
            let last_read = Arc::clone(&last_read);
            let keep_alive_tracker = Arc::clone(&keep_alive_tracker);
            let shutdown_rx = shutdown_rx.clone();
            async move {
                if let Err(err) = runtime
                    .run_keep_alive(handle, sequence, last_read, keep_alive_tracker, shutdown_rx)
                    .await
                {
                    tracing::info!(?err, "pipelined client keep-alive ended session");
                }
            }
        });

        let sweep_task = tokio::spawn({
            let handle = handle.clone();
            let shutdown_rx = shutdown_rx.clone();
            async move { handle.run_expiry_sweeper(shutdown_rx).await }
        });

        Ok(Self {
            handle,
            sequence,
            runtime,
            shutdown: shutdown_tx,
            dispatch_task: Mutex::new(Some(dispatch_task)),
            keep_alive_task: Mutex::new(Some(keep_alive_task)),
            sweep_task: Mutex::new(Some(sweep_task)),
        })
    }

    pub async fn is_bound(&self) -> bool {
        self.handle.state().await.is_bound()
    }

    pub async fn state(&self) -> SessionState {
        self.handle.state().await
    }

    pub async fn pending_count(&self) -> usize {
        self.handle.window().size().await
    }

    pub fn available_slots(&self) -> usize {
        self.handle.window().available_slots()
    }

    pub fn handler(&self) -> &Arc<H> {
        self.runtime.handler()
    }

    fn next_sequence_number(&self) -> u32 {
        self.sequence.next()
    }

    async fn request(&self, sequence_number: u32, frame: Frame) -> SmppResult<Frame> {
        Ok(self.handle.request(sequence_number, frame).await?)
    }

    /// Submit `pdu` (its `sequence_number`/`command_status` are overwritten)
    /// and return the assigned `message_id` on success, or
    /// [`SmppError::Protocol`] carrying the SMSC's error status.
    pub async fn submit_sm(&self, mut pdu: SubmitSm) -> SmppResult<String> {
        let seq = self.next_sequence_number();
        pdu.sequence_number = seq;
        pdu.command_status = CommandStatus::Ok;

        match self.request(seq, Frame::SubmitSm(Box::new(pdu))).await? {
            Frame::SubmitSmResp(resp) => extract_submit_response(resp),
            other => Err(unexpected("SubmitSmResp", &other)),
        }
    }

    /// As [`Self::submit_sm`] but for the SMPP v5.0-oriented `data_sm`
    /// operation; returns the full response so callers can inspect its
    /// optional TLVs (e.g. `delivery_failure_reason`).
    pub async fn data_sm(&self, mut pdu: DataSm) -> SmppResult<DataSmResponse> {
        let seq = self.next_sequence_number();
        pdu.sequence_number = seq;
        pdu.command_status = CommandStatus::Ok;

        match self.request(seq, Frame::DataSm(Box::new(pdu))).await? {
            Frame::DataSmResp(resp) => Ok(resp),
            other => Err(unexpected("DataSmResp", &other)),
        }
    }

    pub async fn query_sm(&self, mut pdu: QuerySm) -> SmppResult<QuerySmResponse> {
        let seq = self.next_sequence_number();
        pdu.sequence_number = seq;
        pdu.command_status = CommandStatus::Ok;

        match self.request(seq, Frame::QuerySm(pdu)).await? {
            Frame::QuerySmResp(resp) => Ok(resp),
            other => Err(unexpected("QuerySmResp", &other)),
        }
    }

    pub async fn cancel_sm(&self, mut pdu: CancelSm) -> SmppResult<()> {
        let seq = self.next_sequence_number();
        pdu.sequence_number = seq;
        pdu.command_status = CommandStatus::Ok;

        match self.request(seq, Frame::CancelSm(pdu)).await? {
            Frame::CancelSmResp(resp) if resp.command_status == CommandStatus::Ok => Ok(()),
            Frame::CancelSmResp(resp) => Err(SmppError::Protocol(resp.command_status)),
            other => Err(unexpected("CancelSmResp", &other)),
        }
    }

    pub async fn replace_sm(&self, mut pdu: ReplaceSm) -> SmppResult<()> {
        let seq = self.next_sequence_number();
        pdu.sequence_number = seq;
        pdu.command_status = CommandStatus::Ok;

        match self.request(seq, Frame::ReplaceSm(Box::new(pdu))).await? {
            Frame::ReplaceSmResp(resp) if resp.command_status == CommandStatus::Ok => Ok(()),
            Frame::ReplaceSmResp(resp) => Err(SmppError::Protocol(resp.command_status)),
            other => Err(unexpected("ReplaceSmResp", &other)),
        }
    }

    pub async fn submit_multi(&self, mut pdu: SubmitMulti) -> SmppResult<SubmitMultiResponse> {
        let seq = self.next_sequence_number();
        pdu.sequence_number = seq;
        pdu.command_status = CommandStatus::Ok;

        match self.request(seq, Frame::SubmitMulti(Box::new(pdu))).await? {
            Frame::SubmitMultiResp(resp) => Ok(resp),
            other => Err(unexpected("SubmitMultiResp", &other)),
        }
    }

    /// Graceful shutdown: send `unbind`, wait up to
    /// `RuntimeConfig::shutdown_grace_period` for the peer's response, then
    /// stop the background tasks and drain the window regardless of
    /// whether the peer ever answered.
    pub async fn unbind(&self) -> SmppResult<()> {
        let seq = self.next_sequence_number();
        let grace = self.runtime_config().shutdown_grace_period;

        let result = tokio::time::timeout(
            grace,
            self.request(seq, Frame::Unbind(Unbind::new(seq))),
        )
        .await;

        self.handle.set_state(SessionEvent::Unbind).await;
        self.shutdown_tasks().await;
        self.handle.set_state(SessionEvent::Close).await;

        match result {
            Ok(Ok(Frame::UnbindResp(UnbindResponse { command_status, .. })))
                if command_status == CommandStatus::Ok =>
            {
                Ok(())
            }
            Ok(Ok(Frame::UnbindResp(UnbindResponse { command_status, .. }))) => {
                Err(SmppError::Protocol(command_status))
            }
            Ok(Ok(other)) => Err(unexpected("UnbindResp", &other)),
            Ok(Err(err)) => Err(err),
            // Peer never answered within the grace period; the tasks were
            // already stopped above, matching a forced close.
            Err(_) => Err(SmppError::Timeout),
        }
    }

    /// Forced shutdown: stop the background tasks and drain the window
    /// immediately, without attempting an `unbind` handshake.
    pub async fn close(&self) {
        self.shutdown_tasks().await;
        self.handle.set_state(SessionEvent::Close).await;
    }

    async fn shutdown_tasks(&self) {
        let _ = self.shutdown.send(true);
        self.handle.window().close().await;

        for task in [&self.dispatch_task, &self.keep_alive_task, &self.sweep_task] {
            if let Some(task) = task.lock().await.take() {
                let _ = task.await;
            }
        }
    }

    fn runtime_config(&self) -> &RuntimeConfig {
        // `SessionHandle` doesn't expose its config directly; every
        // constructor threads the same `RuntimeConfig` into both the
        // handle and the runtime, so reading it off the runtime is
        // equivalent and avoids duplicating the field.
        self.runtime.config()
    }
}

fn extract_submit_response(resp: SubmitSmResponse) -> SmppResult<String> {
    if resp.command_status != CommandStatus::Ok {
        return Err(SmppError::Protocol(resp.command_status));
    }
    Ok(resp.message_id.to_string())
}

fn unexpected(expected: &str, actual: &Frame) -> SmppError {
    SmppError::UnexpectedPdu {
        expected: expected.to_string(),
        actual: format!("{actual:?}"),
    }
}
