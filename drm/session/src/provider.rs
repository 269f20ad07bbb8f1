use core::fmt;
use std::sync::{Arc, Weak};

use tracing::trace;

use drm_core::ProtectionScheme;

use crate::error::ProviderError;
use crate::manager::{Job, Shared};
use crate::session::SessionId;

/**
    Usability of a single key within a session.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Usable,
    Expired,
    /// Output requirements (HDCP and the like) are not met.
    OutputRestricted,
    /// Status not yet known, usually mid license exchange.
    Pending,
    InternalError,
}

impl KeyState {
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Usable)
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Usable => "usable",
            Self::Expired => "expired",
            Self::OutputRestricted => "output-restricted",
            Self::Pending => "pending",
            Self::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

/**
    One entry of a provider key status notification.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStatus {
    pub key_id: Vec<u8>,
    pub state: KeyState,
}

impl KeyStatus {
    pub fn new(key_id: impl Into<Vec<u8>>, state: KeyState) -> Self {
        Self {
            key_id: key_id.into(),
            state,
        }
    }
}

/**
    Kind of license requested from the server.
*/
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LicenseType {
    /// Keys live only as long as the session.
    #[default]
    Streaming,
    /// Keys are persisted by the provider and addressed by a key set ID.
    Offline,
}

/**
    Opaque license request produced by the provider.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    pub data: Vec<u8>,
    /// License server the provider suggests, used when none is configured.
    pub default_url: Option<String>,
}

/**
    Platform crypto/key-store provider.

    Implementations perform the actual cryptography; this crate only drives
    the session lifecycle around them.
*/
pub trait CryptoProvider: Send + Sync {
    /**
        Capability query used during scheme selection.
    */
    fn supports(&self, scheme: ProtectionScheme) -> bool;

    /**
        Create a provider handle for the negotiated scheme.

        The handle reports asynchronous key and session events through
        `callbacks`, from any thread.
    */
    fn create(
        &self,
        scheme: ProtectionScheme,
        callbacks: ProviderCallbacks,
    ) -> Result<Arc<dyn CryptoHandle>, ProviderError>;
}

/**
    A live provider instance bound to one protection scheme.
*/
pub trait CryptoHandle: Send + Sync {
    fn open_session(&self) -> Result<SessionId, ProviderError>;

    fn key_request(
        &self,
        session: &SessionId,
        init_data: &[u8],
        license_type: LicenseType,
    ) -> Result<KeyRequest, ProviderError>;

    /**
        Feed a license server response into the session.

        Returns the key set ID for offline licenses.
    */
    fn provide_key_response(
        &self,
        session: &SessionId,
        response: &[u8],
    ) -> Result<Option<Vec<u8>>, ProviderError>;

    /**
        Load previously persisted keys into the session.
    */
    fn restore_keys(&self, session: &SessionId, key_set_id: &[u8]) -> Result<(), ProviderError>;

    fn close_session(&self, session: &SessionId) -> Result<(), ProviderError>;

    /**
        Release the provider instance. Called once, after every session
        has been closed.
    */
    fn release(&self);
}

/**
    Entry points for asynchronous provider notifications.

    Every method only queues work for the session worker and returns
    immediately. Notifications arriving after the owning content was
    closed are dropped.
*/
#[derive(Clone)]
pub struct ProviderCallbacks {
    shared: Weak<Shared>,
    epoch: u64,
}

impl ProviderCallbacks {
    pub(crate) fn new(shared: Weak<Shared>, epoch: u64) -> Self {
        Self { shared, epoch }
    }

    pub fn key_status_changed(&self, session: &SessionId, statuses: Vec<KeyStatus>) {
        self.dispatch(Job::KeyStatus {
            epoch: self.epoch,
            session: session.clone(),
            statuses,
        });
    }

    pub fn key_expired(&self, session: &SessionId) {
        self.dispatch(Job::KeyExpired {
            epoch: self.epoch,
            session: session.clone(),
        });
    }

    pub fn session_error(&self, session: &SessionId, error: ProviderError) {
        self.dispatch(Job::SessionError {
            epoch: self.epoch,
            session: session.clone(),
            error,
        });
    }

    fn dispatch(&self, job: Job) {
        match self.shared.upgrade() {
            Some(shared) => shared.enqueue(job),
            None => trace!("manager gone, dropping provider notification"),
        }
    }
}

impl fmt::Debug for ProviderCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCallbacks")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
