use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::error::ErrorCode;

/**
    Process-wide counter for session serial numbers (for logging).
*/
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/**
    Opaque session identifier assigned by the crypto provider.
*/
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Vec<u8>);

impl SessionId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<&[u8]> for SessionId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", hex::encode(&self.0))
    }
}

/**
    Lifecycle state of a decryption session.

    ```text
    Opening ──► Opened ──► OpenedWithKeys
       │          │              │
       └──► Error ◄──────────────┘
    any ──► Released (terminal)
    ```
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Opening,
    Opened,
    OpenedWithKeys,
    Error(ErrorCode),
    Released,
}

impl SessionState {
    pub const fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Released, _) => false,
            (_, Released) => true,
            (Opening, Opened | Error(_)) => true,
            (Opened, OpenedWithKeys | Error(_)) => true,
            (OpenedWithKeys, Error(_)) => true,
            _ => false,
        }
    }

    /**
        Returns `true` while the session can still make progress.
    */
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Opening | Self::Opened | Self::OpenedWithKeys)
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Opened => "opened",
            Self::OpenedWithKeys => "opened-with-keys",
            Self::Error(_) => "error",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(code) => write!(f, "error ({code})"),
            other => f.write_str(other.to_name()),
        }
    }
}

/**
    How a session deals with persisted key material.
*/
#[repr(i32)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfflineMode {
    /// Online license exchange, nothing persisted.
    #[default]
    None = 0,
    /// Online exchange, keys persisted afterwards.
    Store = 1,
    /// Persisted keys only, no online exchange.
    Retrieve = 2,
    /// Persisted keys when available, otherwise online exchange and persist.
    RetrieveStore = 3,
    /// Like `RetrieveStore`, and drop the persisted record when keys expire.
    KeyExpireRetrieveStore = 4,
}

impl OfflineMode {
    pub const fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Store),
            2 => Some(Self::Retrieve),
            3 => Some(Self::RetrieveStore),
            4 => Some(Self::KeyExpireRetrieveStore),
            _ => None,
        }
    }

    pub const fn stores(self) -> bool {
        matches!(
            self,
            Self::Store | Self::RetrieveStore | Self::KeyExpireRetrieveStore
        )
    }

    pub const fn retrieves(self) -> bool {
        matches!(
            self,
            Self::Retrieve | Self::RetrieveStore | Self::KeyExpireRetrieveStore
        )
    }

    pub const fn handles_expiry(self) -> bool {
        matches!(self, Self::KeyExpireRetrieveStore)
    }

    /**
        Whether an offline key store listener must be registered.
    */
    pub const fn needs_store(self) -> bool {
        self.stores() || self.retrieves()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/**
    One open decryption context, owned by the session table.
*/
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    serial: u64,
    unique_id: i32,
    init_data: Vec<u8>,
    mode: OfflineMode,
    state: SessionState,
    key_ids: Vec<Vec<u8>>,
}

impl Session {
    pub fn new(id: SessionId, init_data: Vec<u8>, mode: OfflineMode, unique_id: i32) -> Self {
        Self {
            id,
            serial: SESSION_COUNTER.fetch_add(1, Ordering::Relaxed),
            unique_id,
            init_data,
            mode,
            state: SessionState::Opening,
            key_ids: Vec::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /**
        Monotonically increasing number, unique within the process.
    */
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn unique_id(&self) -> i32 {
        self.unique_id
    }

    pub fn init_data(&self) -> &[u8] {
        &self.init_data
    }

    pub fn mode(&self) -> OfflineMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /**
        Key IDs currently usable under this session.
    */
    pub fn key_ids(&self) -> &[Vec<u8>] {
        &self.key_ids
    }

    pub(crate) fn set_key_ids(&mut self, key_ids: Vec<Vec<u8>>) {
        self.key_ids = key_ids;
    }

    /**
        Whether this session was opened for the given content unit.
    */
    pub fn matches(&self, init_data: &[u8], unique_id: i32) -> bool {
        self.unique_id == unique_id && self.init_data == init_data
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if !matches!(next, SessionState::OpenedWithKeys) {
            self.key_ids.clear();
        }
        Ok(())
    }
}
