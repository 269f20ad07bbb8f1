#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::broadcast::{self, error::TryRecvError};

use drm_session::{
    CryptoHandle, CryptoProvider, DrmConfig, DrmEvent, DrmSessionManager,
    DrmSessionManagerBuilder, KeyRequest, KeyState, KeyStatus, KeyStatusReport, KeyStatusSink,
    LicenseRequest, LicenseTransport, LicenseType, ProtectionScheme, ProviderCallbacks,
    ProviderError, SessionId, TransportError,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub const WIDEVINE: [u8; 16] = ProtectionScheme::Widevine.system_id();
pub const PLAYREADY: [u8; 16] = ProtectionScheme::PlayReady.system_id();
pub const CLEARKEY: [u8; 16] = hex_literal::hex!("e2719d58a985b3c9781ab030af78d30e");

pub const KEY_A: [u8; 16] = [0xa1; 16];
pub const KEY_B: [u8; 16] = [0xb2; 16];
pub const KEY_C: [u8; 16] = [0xc3; 16];

/**
    Poll `cond` until it holds or the timeout passes.
*/
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn next_event(rx: &mut broadcast::Receiver<DrmEvent>) -> DrmEvent {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match rx.try_recv() {
            Ok(event) => return event,
            Err(TryRecvError::Empty) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("no event: {e:?}"),
        }
    }
}

/**
    Build a version 0 PSSH box.
*/
pub fn pssh(system_id: [u8; 16], data: &[u8]) -> Vec<u8> {
    let size = 32 + data.len();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&(size as u32).to_be_bytes());
    out.extend_from_slice(b"pssh");
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&system_id);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

pub fn usable(key: [u8; 16]) -> KeyStatus {
    KeyStatus::new(key.to_vec(), KeyState::Usable)
}

// ── Provider ──

/**
    What the fake provider does in response to calls.
*/
#[derive(Default)]
pub struct Script {
    /// Emitted through the callbacks after a license response or restore.
    pub key_statuses: Vec<KeyStatus>,
    pub key_set_id: Option<Vec<u8>>,
    pub fail_open: Option<ProviderError>,
    pub fail_key_response: Option<ProviderError>,
    pub fail_close: Vec<SessionId>,
}

#[derive(Default)]
pub struct ProviderLog {
    pub created: Mutex<Vec<ProtectionScheme>>,
    pub capability_queries: Mutex<Vec<ProtectionScheme>>,
    pub opened: Mutex<Vec<SessionId>>,
    pub key_requests: Mutex<Vec<(SessionId, Vec<u8>, LicenseType)>>,
    pub responses: Mutex<Vec<(SessionId, Vec<u8>)>>,
    pub restored: Mutex<Vec<(SessionId, Vec<u8>)>>,
    pub closed: Mutex<Vec<SessionId>>,
    pub released: AtomicUsize,
}

pub struct FakeProvider {
    supported: Vec<ProtectionScheme>,
    pub log: Arc<ProviderLog>,
    pub script: Arc<Mutex<Script>>,
    callbacks: Arc<Mutex<Option<ProviderCallbacks>>>,
    next_id: Arc<AtomicU32>,
}

impl FakeProvider {
    pub fn new(supported: &[ProtectionScheme]) -> Arc<Self> {
        let provider = Self {
            supported: supported.to_vec(),
            log: Arc::default(),
            script: Arc::default(),
            callbacks: Arc::default(),
            next_id: Arc::new(AtomicU32::new(1)),
        };
        provider.script.lock().key_statuses = vec![usable(KEY_A)];
        Arc::new(provider)
    }

    /**
        Callbacks handed to the most recent handle.
    */
    pub fn callbacks(&self) -> ProviderCallbacks {
        self.callbacks
            .lock()
            .clone()
            .expect("no provider handle created")
    }
}

impl CryptoProvider for FakeProvider {
    fn supports(&self, scheme: ProtectionScheme) -> bool {
        self.log.capability_queries.lock().push(scheme);
        self.supported.contains(&scheme)
    }

    fn create(
        &self,
        scheme: ProtectionScheme,
        callbacks: ProviderCallbacks,
    ) -> Result<Arc<dyn CryptoHandle>, ProviderError> {
        self.log.created.lock().push(scheme);
        *self.callbacks.lock() = Some(callbacks.clone());
        Ok(Arc::new(FakeHandle {
            callbacks,
            log: self.log.clone(),
            script: self.script.clone(),
            next_id: self.next_id.clone(),
        }))
    }
}

struct FakeHandle {
    callbacks: ProviderCallbacks,
    log: Arc<ProviderLog>,
    script: Arc<Mutex<Script>>,
    next_id: Arc<AtomicU32>,
}

impl FakeHandle {
    fn emit_keys(&self, session: &SessionId) {
        let statuses = self.script.lock().key_statuses.clone();
        if !statuses.is_empty() {
            self.callbacks.key_status_changed(session, statuses);
        }
    }
}

impl CryptoHandle for FakeHandle {
    fn open_session(&self) -> Result<SessionId, ProviderError> {
        if let Some(err) = self.script.lock().fail_open.clone() {
            return Err(err);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = SessionId::new(n.to_be_bytes().to_vec());
        self.log.opened.lock().push(id.clone());
        Ok(id)
    }

    fn key_request(
        &self,
        session: &SessionId,
        init_data: &[u8],
        license_type: LicenseType,
    ) -> Result<KeyRequest, ProviderError> {
        self.log
            .key_requests
            .lock()
            .push((session.clone(), init_data.to_vec(), license_type));
        Ok(KeyRequest {
            data: b"challenge".to_vec(),
            default_url: Some("https://provider.example/license".into()),
        })
    }

    fn provide_key_response(
        &self,
        session: &SessionId,
        response: &[u8],
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        self.log
            .responses
            .lock()
            .push((session.clone(), response.to_vec()));
        if let Some(err) = self.script.lock().fail_key_response.clone() {
            return Err(err);
        }
        self.emit_keys(session);
        Ok(self.script.lock().key_set_id.clone())
    }

    fn restore_keys(&self, session: &SessionId, key_set_id: &[u8]) -> Result<(), ProviderError> {
        self.log
            .restored
            .lock()
            .push((session.clone(), key_set_id.to_vec()));
        self.emit_keys(session);
        Ok(())
    }

    fn close_session(&self, session: &SessionId) -> Result<(), ProviderError> {
        self.log.closed.lock().push(session.clone());
        if self.script.lock().fail_close.contains(session) {
            return Err(ProviderError::Other {
                code: -42,
                message: "close failed".into(),
            });
        }
        Ok(())
    }

    fn release(&self) {
        self.log.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Sink ──

#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<KeyStatusReport>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<KeyStatusReport> {
        self.reports.lock().clone()
    }

    pub fn reports_for(&self, id: &SessionId) -> Vec<KeyStatusReport> {
        self.reports
            .lock()
            .iter()
            .filter(|r| &r.session_id == id)
            .cloned()
            .collect()
    }

    pub fn wait_for(&self, id: &SessionId, count: usize) -> Vec<KeyStatusReport> {
        assert!(
            wait_until(|| self.reports_for(id).len() >= count),
            "expected {count} reports for {id}, got {:?}",
            self.reports_for(id)
        );
        self.reports_for(id)
    }
}

impl KeyStatusSink for RecordingSink {
    fn report_key_status(&self, report: KeyStatusReport) {
        self.reports.lock().push(report);
    }
}

// ── Transport ──

#[derive(Default)]
struct Gate {
    held: Mutex<bool>,
    cv: Condvar,
}

#[derive(Default)]
pub struct FakeTransport {
    pub requests: Mutex<Vec<LicenseRequest>>,
    pub fail: Mutex<Option<TransportError>>,
    gate: Gate,
}

impl FakeTransport {
    /**
        Make subsequent requests block until `open` is called.
    */
    pub fn hold(&self) {
        *self.gate.held.lock() = true;
    }

    pub fn open(&self) {
        *self.gate.held.lock() = false;
        self.gate.cv.notify_all();
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl LicenseTransport for FakeTransport {
    fn execute(&self, request: LicenseRequest) -> Result<Vec<u8>, TransportError> {
        self.requests.lock().push(request);
        let mut held = self.gate.held.lock();
        while *held {
            self.gate.cv.wait(&mut held);
        }
        drop(held);
        match self.fail.lock().clone() {
            Some(err) => Err(err),
            None => Ok(b"license".to_vec()),
        }
    }
}

// ── Harness ──

pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub sink: Arc<RecordingSink>,
    pub transport: Arc<FakeTransport>,
}

impl Harness {
    pub fn new(supported: &[ProtectionScheme]) -> Self {
        Self {
            provider: FakeProvider::new(supported),
            sink: Arc::default(),
            transport: Arc::default(),
        }
    }

    pub fn builder(&self) -> DrmSessionManagerBuilder {
        DrmSessionManager::builder(self.provider.clone(), self.sink.clone())
            .config(DrmConfig::default().with_license_server_url("https://license.example"))
            .transport(self.transport.clone())
    }

    pub fn manager(&self) -> DrmSessionManager {
        self.builder().build().expect("manager")
    }
}
