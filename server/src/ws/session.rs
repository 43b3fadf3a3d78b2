use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::connection::Frame;
use super::UserId;

/// Lifecycle of one push connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Queue at capacity, the frame was discarded for this session only.
    Dropped,
    /// Delivery loop already gone.
    Closed,
}

/// Server-side state for one live push connection.
///
/// The outbound queue is bounded; producers never wait on it. All three
/// runtime duties observe the same cancellation token.
pub struct Session {
    id: Uuid,
    user_id: UserId,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    state: AtomicU8,
    dropped: AtomicU64,
    peer_gone: Notify,
    pub(crate) tasks: TaskTracker,
}

impl Session {
    pub(crate) fn new(user_id: UserId, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            outbound,
            cancel: CancellationToken::new(),
            state: AtomicU8::new(SessionState::Connecting as u8),
            dropped: AtomicU64::new(0),
            peer_gone: Notify::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Events discarded because the outbound queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once teardown has been requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Resolves once the inbound drain has seen the peer go away.
    pub async fn peer_closed(&self) {
        self.peer_gone.notified().await
    }

    /// Resolves once all runtime duties have exited; the session is then `Closed`.
    pub async fn closed(&self) {
        self.tasks.wait().await;
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn try_enqueue(&self, frame: Frame) -> Enqueue {
        match self.outbound.try_send(frame) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Enqueue::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    pub(crate) fn mark_open(&self) {
        let _ = self.state.compare_exchange(
            SessionState::Connecting as u8,
            SessionState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Moves to `Closing` and fires the token. Returns false if teardown
    /// had already begun.
    pub(crate) fn begin_close(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= SessionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.cancel.cancel();
        true
    }

    pub(crate) fn notify_peer_closed(&self) {
        self.peer_gone.notify_one();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .field("dropped", &self.dropped_events())
            .finish()
    }
}
