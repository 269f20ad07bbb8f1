use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::DrmError;
use crate::provider::LicenseType;
use crate::session::OfflineMode;

/**
    Identity of a content unit for offline key records.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentIdentity {
    pub init_data: Vec<u8>,
    pub unique_id: i32,
}

impl ContentIdentity {
    pub fn new(init_data: impl Into<Vec<u8>>, unique_id: i32) -> Self {
        Self {
            init_data: init_data.into(),
            unique_id,
        }
    }
}

/**
    Application-supplied persistence for offline key set IDs.

    The application owns the storage format and location. Only the most
    recently stored record per content identity is expected to be returned
    by `retrieve`.
*/
pub trait OfflineKeyStore: Send + Sync {
    fn store(&self, content: &ContentIdentity, key_set_id: &[u8]);

    fn retrieve(&self, content: &ContentIdentity) -> Option<Vec<u8>>;

    /**
        Forget the record for `content`; its keys have expired.
    */
    fn expire(&self, content: &ContentIdentity);
}

/**
    In-process [`OfflineKeyStore`], last store wins.
*/
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: Mutex<HashMap<ContentIdentity, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl OfflineKeyStore for MemoryKeyStore {
    fn store(&self, content: &ContentIdentity, key_set_id: &[u8]) {
        self.records
            .lock()
            .insert(content.clone(), key_set_id.to_vec());
    }

    fn retrieve(&self, content: &ContentIdentity) -> Option<Vec<u8>> {
        self.records.lock().get(content).cloned()
    }

    fn expire(&self, content: &ContentIdentity) {
        self.records.lock().remove(content);
    }
}

/**
    How the worker should obtain keys for a session.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionPlan {
    /// Load persisted keys; no license server round trip.
    Restore(Vec<u8>),
    /// Exchange with the license server, persisting the result if `store`.
    Online {
        license_type: LicenseType,
        store: bool,
    },
    /// Settle the session in error without contacting anyone.
    Fail(DrmError),
}

/**
    Connects sessions to the application's offline key store.
*/
#[derive(Clone, Default)]
pub struct OfflineBridge {
    store: Option<Arc<dyn OfflineKeyStore>>,
}

impl OfflineBridge {
    pub fn new(store: Option<Arc<dyn OfflineKeyStore>>) -> Self {
        Self { store }
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /**
        Decide how to acquire keys for a session opened in `mode`.

        Consults the retrieve callback for retrieving modes. A missing
        listener or, for `Retrieve`, a missing record fails initialization.
    */
    pub fn plan(&self, mode: OfflineMode, content: &ContentIdentity) -> AcquisitionPlan {
        if !mode.needs_store() {
            return AcquisitionPlan::Online {
                license_type: LicenseType::Streaming,
                store: false,
            };
        }

        let Some(store) = &self.store else {
            return AcquisitionPlan::Fail(DrmError::InitializationFailed(format!(
                "offline mode {mode:?} requires an offline key store"
            )));
        };

        if mode.retrieves() {
            match store.retrieve(content) {
                Some(key_set_id) if !key_set_id.is_empty() => {
                    return AcquisitionPlan::Restore(key_set_id);
                }
                _ if !mode.stores() => {
                    return AcquisitionPlan::Fail(DrmError::InitializationFailed(
                        "no offline key record to retrieve".into(),
                    ));
                }
                _ => debug!(unique_id = content.unique_id, "no offline record, going online"),
            }
        }

        AcquisitionPlan::Online {
            license_type: LicenseType::Offline,
            store: mode.stores(),
        }
    }

    pub fn store(&self, content: &ContentIdentity, key_set_id: &[u8]) {
        if let Some(store) = &self.store {
            store.store(content, key_set_id);
        }
    }

    pub fn expire(&self, content: &ContentIdentity) {
        if let Some(store) = &self.store {
            store.expire(content);
        }
    }
}
