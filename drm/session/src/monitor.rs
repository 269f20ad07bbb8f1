use crate::error::ErrorCode;
use crate::provider::{KeyState, KeyStatus};
use crate::session::SessionId;

/**
    Key status snapshot pushed to the decoder.

    `key_ids` is the concatenation of `key_count` IDs of `key_size` bytes
    each. A report with a failure code other than output restriction never
    carries keys.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStatusReport {
    pub session_id: SessionId,
    pub unique_id: i32,
    pub key_count: usize,
    pub key_ids: Vec<u8>,
    pub key_size: usize,
    pub error: ErrorCode,
}

impl KeyStatusReport {
    /**
        Build a report from a provider key status notification.

        The error code is `InsufficientOutputProtection` when any key is
        output restricted and `None` otherwise. All keys within one report
        must share a size; a notification that mixes sizes is reported as
        an internal failure without keys.
    */
    pub fn from_statuses(session_id: SessionId, unique_id: i32, statuses: &[KeyStatus]) -> Self {
        let key_size = statuses.first().map_or(0, |s| s.key_id.len());
        if statuses.iter().any(|s| s.key_id.len() != key_size) {
            return Self::failure(session_id, unique_id, ErrorCode::UnknownInternal);
        }

        let mut key_ids = Vec::with_capacity(key_size * statuses.len());
        for status in statuses {
            key_ids.extend_from_slice(&status.key_id);
        }

        let error = if statuses
            .iter()
            .any(|s| s.state == KeyState::OutputRestricted)
        {
            ErrorCode::InsufficientOutputProtection
        } else {
            ErrorCode::None
        };

        Self {
            session_id,
            unique_id,
            key_count: statuses.len(),
            key_ids,
            key_size,
            error,
        }
    }

    /**
        A report carrying no keys and the given failure code.
    */
    pub fn failure(session_id: SessionId, unique_id: i32, error: ErrorCode) -> Self {
        Self {
            session_id,
            unique_id,
            key_count: 0,
            key_ids: Vec::new(),
            key_size: 0,
            error,
        }
    }

    /**
        Iterate the individual key IDs.
    */
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.key_ids.chunks(self.key_size.max(1)).take(self.key_count)
    }
}

/**
    Decode-side consumer of key status reports.

    Called from the session worker thread while the session table is
    locked, so that a released session can never receive a late report.
    Implementations must return promptly and must not call back into the
    session manager.
*/
pub trait KeyStatusSink: Send + Sync {
    fn report_key_status(&self, report: KeyStatusReport);
}

/**
    IDs of the keys a notification marks as usable, in notification order.
*/
pub fn usable_key_ids(statuses: &[KeyStatus]) -> Vec<Vec<u8>> {
    statuses
        .iter()
        .filter(|s| s.state.is_usable())
        .map(|s| s.key_id.clone())
        .collect()
}
