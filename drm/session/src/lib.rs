mod config;
mod connectivity;
mod error;
mod events;
mod manager;
mod monitor;
mod offline;
mod provider;
mod selector;
mod session;
mod table;
mod transport;
mod worker;

pub use drm_core::{InitData, InitDataError, ProtectionScheme, PsshEntry};

pub use self::config::DrmConfig;
pub use self::connectivity::{Connectivity, NetworkKind};
pub use self::error::{DrmError, DrmResult, ErrorCode, ProviderError, TransportError};
pub use self::events::{DrmEvent, EventBus};
pub use self::manager::{DrmSessionManager, DrmSessionManagerBuilder};
pub use self::monitor::{KeyStatusReport, KeyStatusSink, usable_key_ids};
pub use self::offline::{
    AcquisitionPlan, ContentIdentity, MemoryKeyStore, OfflineBridge, OfflineKeyStore,
};
pub use self::provider::{
    CryptoHandle, CryptoProvider, KeyRequest, KeyState, KeyStatus, LicenseType,
    ProviderCallbacks,
};
pub use self::selector::{SchemeSelector, Selection};
pub use self::session::{InvalidTransition, OfflineMode, Session, SessionId, SessionState};
pub use self::table::SessionTable;
pub use self::transport::{
    HttpTransport, LicenseClient, LicenseRequest, LicenseTransport, RequestInterceptor,
};
pub use self::worker::{JobQueue, Worker};
