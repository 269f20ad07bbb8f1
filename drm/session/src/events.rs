use tokio::sync::broadcast;

use crate::error::ErrorCode;
use crate::session::SessionId;

/**
    Application-facing notification, fire and forget.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrmEvent {
    /// A session has usable keys for the first time.
    KeysLoaded {
        session_id: SessionId,
        unique_id: i32,
        key_count: usize,
    },
    /// Keys of a session expired. Recovery is up to the application,
    /// typically through `fetch_if_online`.
    KeyExpired {
        session_id: SessionId,
        unique_id: i32,
    },
    /// A session failed asynchronously and settled in error.
    SessionError {
        session_id: SessionId,
        unique_id: i32,
        error: ErrorCode,
    },
}

impl DrmEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::KeysLoaded { session_id, .. }
            | Self::KeyExpired { session_id, .. }
            | Self::SessionError { session_id, .. } => session_id,
        }
    }
}

/**
    Broadcast channel for [`DrmEvent`]s.

    Publishing is synchronous and never blocks, so it is safe from the
    worker thread. Without subscribers events are dropped; slow subscribers
    see `RecvError::Lagged` instead of stalling the worker.
*/
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<DrmEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: DrmEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DrmEvent> {
        self.tx.subscribe()
    }
}
