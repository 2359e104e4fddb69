//! Sliding-window correlator: the bounded map of outstanding requests,
//! keyed by sequence number, that matches an inbound response PDU back to
//! the future an outbound request caller is waiting on.
//!
//! A counting semaphore bounds the number of concurrently outstanding
//! entries (the window size); a mutex-protected map holds the pending
//! entries themselves. Completion resolves a `oneshot` sender after the
//! entry has been removed and its permit dropped, so no task ever suspends
//! while holding the map lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{oneshot, Mutex, Semaphore};

/// Errors produced by the window.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// `offer` waited the full timeout without acquiring a slot.
    #[error("timed out waiting for a free window slot")]
    SlotTimeout,

    /// The window has been closed; no further offers are accepted.
    #[error("window is closed")]
    Closed,

    /// `offer`/`try_offer` was called with a sequence number already
    /// pending in the window.
    #[error("sequence number {0} already has a pending entry")]
    DuplicateSequenceNumber(u32),

    /// The entry expired before a response arrived (swept by
    /// `expire_old_requests`).
    #[error("request timed out waiting for a response")]
    RequestTimeout,

    /// The entry was cancelled via `cancel(seq)`.
    #[error("request was cancelled")]
    Cancelled,

    /// The window was closed while this entry was still outstanding.
    #[error("connection closed while awaiting response")]
    ConnectionClosed,
}

/// A future-like handle to a pending request's eventual response.
///
/// Thin wrapper over a `oneshot::Receiver` so callers don't need to depend
/// on `tokio::sync` directly, and so the error type is `WindowError`
/// instead of a raw `RecvError`.
pub struct Completion<R> {
    receiver: oneshot::Receiver<Result<R, WindowError>>,
}

impl<R> Completion<R> {
    /// Await the response, or `ConnectionClosed` if the sender was dropped
    /// without resolving it (e.g. the window was torn down uncleanly).
    pub async fn wait(self) -> Result<R, WindowError> {
        self.receiver
            .await
            .unwrap_or(Err(WindowError::ConnectionClosed))
    }

    /// Await the response, failing with `SlotTimeout` if `timeout` elapses
    /// first. Note this caller-level timeout does not itself free the
    /// window slot — see module docs; the sweeper or `cancel` does that.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<R, WindowError> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(result) => result.unwrap_or(Err(WindowError::ConnectionClosed)),
            Err(_) => Err(WindowError::SlotTimeout),
        }
    }
}

struct PendingEntry<R> {
    created_at: Instant,
    sender: oneshot::Sender<Result<R, WindowError>>,
}

struct Inner<R> {
    pending: Mutex<HashMap<u32, PendingEntry<R>>>,
    semaphore: Semaphore,
    max_size: usize,
    closed: std::sync::atomic::AtomicBool,
}

/// Bounded, thread-safe correlator of outstanding requests to their
/// eventual responses, indexed by SMPP sequence number.
///
/// Cloning a `Window` shares the same underlying state; it is meant to be
/// handed to the reader task, the writer/submission path, and a timeout
/// sweeper alike.
pub struct Window<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for Window<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> Window<R> {
    /// Create a window that allows at most `max_size` concurrently
    /// outstanding requests.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                semaphore: Semaphore::new(max_size),
                max_size,
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Block up to `timeout` for a free slot, then register `sequence_number`
    /// as a pending entry and return a `Completion` that resolves when the
    /// corresponding response arrives.
    pub async fn offer(
        &self,
        sequence_number: u32,
        timeout: Duration,
    ) -> Result<Completion<R>, WindowError> {
        if self.is_closed() {
            return Err(WindowError::Closed);
        }

        // Acquired permits are `forget()`-ten and tracked manually via
        // `release_slot`'s `add_permits`, since the permit's lifetime would
        // otherwise be tied to this async fn's stack frame rather than the
        // pending entry's lifetime in the map.
        tokio::time::timeout(timeout, self.inner.semaphore.acquire())
            .await
            .map_err(|_| WindowError::SlotTimeout)?
            .expect("semaphore is never closed while the window is alive")
            .forget();

        if self.is_closed() {
            self.release_slot();
            return Err(WindowError::Closed);
        }

        self.insert_pending(sequence_number).await.map_err(|e| {
            self.release_slot();
            e
        })
    }

    /// Non-blocking variant of `offer`: returns `None` if the window is
    /// full (or closed) instead of waiting.
    pub async fn try_offer(&self, sequence_number: u32) -> Option<Completion<R>> {
        if self.is_closed() {
            return None;
        }

        let permit = self.inner.semaphore.try_acquire().ok()?;
        permit.forget();

        if self.is_closed() {
            self.release_slot();
            return None;
        }

        match self.insert_pending(sequence_number).await {
            Ok(completion) => Some(completion),
            Err(_) => {
                self.release_slot();
                None
            }
        }
    }

    async fn insert_pending(&self, sequence_number: u32) -> Result<Completion<R>, WindowError> {
        let mut pending = self.inner.pending.lock().await;
        if pending.contains_key(&sequence_number) {
            return Err(WindowError::DuplicateSequenceNumber(sequence_number));
        }
        let (sender, receiver) = oneshot::channel();
        pending.insert(
            sequence_number,
            PendingEntry {
                created_at: Instant::now(),
                sender,
            },
        );
        Ok(Completion { receiver })
    }

    fn release_slot(&self) {
        self.inner.semaphore.add_permits(1);
    }

    /// Remove the pending entry for `sequence_number` and resolve its
    /// completion with `response`. Returns `true` iff an entry existed.
    pub async fn complete(&self, sequence_number: u32, response: R) -> bool {
        self.resolve(sequence_number, Ok(response)).await
    }

    /// Remove the pending entry and resolve it with an error.
    pub async fn fail(&self, sequence_number: u32, error: WindowError) -> bool {
        self.resolve(sequence_number, Err(error)).await
    }

    /// Remove the pending entry and resolve it as cancelled.
    pub async fn cancel(&self, sequence_number: u32) -> bool {
        self.resolve(sequence_number, Err(WindowError::Cancelled)).await
    }

    async fn resolve(&self, sequence_number: u32, outcome: Result<R, WindowError>) -> bool {
        let entry = {
            let mut pending = self.inner.pending.lock().await;
            pending.remove(&sequence_number)
        };

        match entry {
            Some(entry) => {
                self.release_slot();
                // Drop the result if the receiver was already dropped; the
                // slot is still reclaimed above regardless.
                let _ = entry.sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fail every pending entry older than `max_age`. Returns the count of
    /// entries expired. Intended to be driven by a periodic sweeper task.
    pub async fn expire_old_requests(&self, max_age: Duration) -> usize {
        let expired: Vec<u32> = {
            let pending = self.inner.pending.lock().await;
            let now = Instant::now();
            pending
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.created_at) >= max_age)
                .map(|(seq, _)| *seq)
                .collect()
        };

        let mut count = 0;
        for seq in expired {
            if self.fail(seq, WindowError::RequestTimeout).await {
                count += 1;
            }
        }
        count
    }

    /// Fail every currently outstanding entry with `error`. Returns the
    /// count of entries affected.
    pub async fn cancel_all(&self, error: WindowError) -> usize {
        let all: Vec<u32> = {
            let pending = self.inner.pending.lock().await;
            pending.keys().copied().collect()
        };

        let mut count = 0;
        for seq in all {
            if self.fail(seq, error.clone()).await {
                count += 1;
            }
        }
        count
    }

    /// Mark the window closed and cancel every outstanding entry with
    /// `ConnectionClosed`. Idempotent: calling this more than once does not
    /// double-release slots, since the second call's `cancel_all` simply
    /// finds no pending entries left.
    pub async fn close(&self) {
        self.inner
            .closed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.cancel_all(WindowError::ConnectionClosed).await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Current count of outstanding entries.
    pub async fn size(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    pub fn available_slots(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    pub async fn is_full(&self) -> bool {
        self.available_slots() == 0
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn offer_then_complete_round_trips_a_response() {
        let window: Window<u32> = Window::new(4);
        let completion = window
            .offer(1, Duration::from_millis(50))
            .await
            .expect("slot available");
        assert!(window.complete(1, 42).await);
        assert_eq!(completion.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn slot_conservation_holds_across_offer_and_complete() {
        let window: Window<u32> = Window::new(3);
        assert_eq!(window.size().await + window.available_slots(), 3);

        let c1 = window.offer(1, Duration::from_millis(50)).await.unwrap();
        let c2 = window.offer(2, Duration::from_millis(50)).await.unwrap();
        assert_eq!(window.size().await + window.available_slots(), 3);
        assert_eq!(window.size().await, 2);

        window.complete(1, 1).await;
        assert_eq!(window.size().await + window.available_slots(), 3);
        assert_eq!(window.size().await, 1);

        window.fail(2, WindowError::RequestTimeout).await;
        assert_eq!(window.size().await + window.available_slots(), 3);
        assert_eq!(window.size().await, 0);

        let _ = c1.wait().await;
        let _ = c2.wait().await;
    }

    #[tokio::test]
    async fn try_offer_fails_when_full_and_succeeds_after_a_release() {
        let window: Window<u32> = Window::new(2);
        let c1 = window.try_offer(1).await.expect("slot 1");
        let _c2 = window.try_offer(2).await.expect("slot 2");
        assert!(window.try_offer(3).await.is_none());

        assert!(window.complete(1, 1).await);
        let _c3 = window
            .try_offer(3)
            .await
            .expect("a slot freed up after complete");
        let _ = c1.wait().await;
    }

    #[tokio::test]
    async fn duplicate_sequence_number_is_rejected_without_leaking_a_slot() {
        let window: Window<u32> = Window::new(2);
        let _c1 = window.offer(5, Duration::from_millis(50)).await.unwrap();
        let err = window
            .offer(5, Duration::from_millis(50))
            .await
            .expect_err("duplicate seq must be rejected");
        assert_eq!(err, WindowError::DuplicateSequenceNumber(5));
        // The failed duplicate offer must not have consumed a permit.
        assert_eq!(window.available_slots(), 1);
    }

    #[tokio::test]
    async fn offer_times_out_when_the_window_is_full() {
        let window: Window<u32> = Window::new(1);
        let _c1 = window.offer(1, Duration::from_millis(50)).await.unwrap();
        let err = window
            .offer(2, Duration::from_millis(20))
            .await
            .expect_err("window is full");
        assert_eq!(err, WindowError::SlotTimeout);
    }

    #[tokio::test]
    async fn expire_old_requests_fails_stale_entries_and_frees_their_slots() {
        let window: Window<u32> = Window::new(2);
        let completion = window.offer(1, Duration::from_millis(50)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let expired = window.expire_old_requests(Duration::from_millis(5)).await;
        assert_eq!(expired, 1);
        assert_eq!(window.available_slots(), 2);
        assert_eq!(
            completion.wait().await.unwrap_err(),
            WindowError::RequestTimeout
        );
    }

    #[tokio::test]
    async fn close_cancels_all_outstanding_entries_and_rejects_new_offers() {
        let window: Window<u32> = Window::new(2);
        let c1 = window.offer(1, Duration::from_millis(50)).await.unwrap();
        window.close().await;

        assert_eq!(c1.wait().await.unwrap_err(), WindowError::ConnectionClosed);
        assert!(window.is_closed());
        assert_eq!(
            window
                .offer(2, Duration::from_millis(10))
                .await
                .unwrap_err(),
            WindowError::Closed
        );
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let window: Window<u32> = Window::new(2);
        let _c1 = window.offer(1, Duration::from_millis(50)).await.unwrap();
        window.close().await;
        window.close().await;
        assert_eq!(window.available_slots(), 2);
    }

    #[tokio::test]
    async fn cancel_resolves_the_completion_as_cancelled() {
        let window: Window<u32> = Window::new(1);
        let c1 = window.offer(9, Duration::from_millis(50)).await.unwrap();
        assert!(window.cancel(9).await);
        assert_eq!(c1.wait().await.unwrap_err(), WindowError::Cancelled);
        assert_eq!(window.available_slots(), 1);
    }

    #[tokio::test]
    async fn complete_on_unknown_sequence_number_returns_false() {
        let window: Window<u32> = Window::new(1);
        assert!(!window.complete(123, 0).await);
    }
}
