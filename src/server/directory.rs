// ABOUTME: Registry of live, bound sessions keyed by system_id for the SMPP server facade
// ABOUTME: Backs SmppServer::sessions()/session_count(); sessions register on bind, deregister on close

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::types::BindType;
use crate::codec::Frame;
use crate::session::SessionHandle;

type BoundSessionHandle = SessionHandle<tokio::io::WriteHalf<tokio::net::TcpStream>>;

#[derive(Clone)]
struct Entry {
    bind_type: BindType,
    handle: BoundSessionHandle,
}

/// Shared, `Clone`-able directory of sessions currently bound against an
/// [`crate::server::SmppServer`]. Keyed by `system_id`; a system_id binding
/// a second time (e.g. a reconnect racing a stale teardown) simply
/// replaces the previous entry rather than erroring, matching how real
/// SMSCs tend to treat duplicate binds from the same ESME.
#[derive(Clone)]
pub struct SessionDirectory {
    sessions: Arc<Mutex<HashMap<String, Entry>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn insert(
        &self,
        system_id: String,
        bind_type: BindType,
        handle: BoundSessionHandle,
    ) {
        self.sessions
            .lock()
            .await
            .insert(system_id, Entry { bind_type, handle });
    }

    pub async fn remove(&self, system_id: &str) {
        self.sessions.lock().await.remove(system_id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn system_ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// `deliver_sm`/`alert_notification` can only be pushed to a session
    /// bound as receiver or transceiver (spec.md §4.4); returns `None` for
    /// an unknown `system_id` or one bound transmitter-only.
    pub async fn receiver_handle(&self, system_id: &str) -> Option<BoundSessionHandle> {
        let sessions = self.sessions.lock().await;
        let entry = sessions.get(system_id)?;
        matches!(entry.bind_type, BindType::Receiver | BindType::Transceiver)
            .then(|| entry.handle.clone())
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Send `frame` to every currently-bound receiver/transceiver session,
/// used by a `submit_multi`/broadcast-style handler that needs to fan a
/// single `deliver_sm` out to many ESMEs. Best-effort: a write failure on
/// one session is logged and does not stop delivery to the others.
pub async fn broadcast(directory: &SessionDirectory, frame: &Frame) {
    let system_ids = directory.system_ids().await;
    for system_id in system_ids {
        if let Some(handle) = directory.receiver_handle(&system_id).await {
            if let Err(err) = handle.write(frame).await {
                tracing::warn!(%system_id, ?err, "broadcast write failed");
            }
        }
    }
}
