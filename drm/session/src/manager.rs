use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use drm_core::{InitData, ProtectionScheme};

use crate::config::DrmConfig;
use crate::connectivity::Connectivity;
use crate::error::{DrmError, DrmResult, ErrorCode, ProviderError};
use crate::events::{DrmEvent, EventBus};
use crate::monitor::{KeyStatusReport, KeyStatusSink, usable_key_ids};
use crate::offline::{AcquisitionPlan, ContentIdentity, OfflineBridge, OfflineKeyStore};
use crate::provider::{
    CryptoHandle, CryptoProvider, KeyState, KeyStatus, LicenseType, ProviderCallbacks,
};
use crate::selector::SchemeSelector;
use crate::session::{OfflineMode, Session, SessionId, SessionState};
use crate::table::SessionTable;
use crate::transport::{HttpTransport, LicenseClient, LicenseTransport, RequestInterceptor};
use crate::worker::Worker;

const WORKER_NAME: &str = "drm-worker";

/**
    Work item for the session worker.

    Every job carries the epoch it was created in; jobs from before the
    last `release_all` are dropped.
*/
pub(crate) enum Job {
    Acquire {
        epoch: u64,
        session: SessionId,
    },
    Refresh {
        epoch: u64,
        session: SessionId,
    },
    KeyStatus {
        epoch: u64,
        session: SessionId,
        statuses: Vec<KeyStatus>,
    },
    KeyExpired {
        epoch: u64,
        session: SessionId,
    },
    SessionError {
        epoch: u64,
        session: SessionId,
        error: ProviderError,
    },
}

struct State {
    table: SessionTable,
    scheme: Option<ProtectionScheme>,
    handle: Option<Arc<dyn CryptoHandle>>,
    /// Bumped on every `release_all`.
    epoch: u64,
}

/**
    What the worker needs to know about a session, copied out of the table
    so that no lock is held across provider or network calls.
*/
struct Snapshot {
    handle: Arc<dyn CryptoHandle>,
    scheme: ProtectionScheme,
    content: ContentIdentity,
    mode: OfflineMode,
}

/**
    State shared between the boundary API, the worker thread and the
    provider callbacks.

    Lock order is `state` before `worker`. Provider callbacks only take
    `worker`, so providers may notify from inside any handle method.
*/
pub(crate) struct Shared {
    me: Weak<Shared>,
    provider: Arc<dyn CryptoProvider>,
    sink: Arc<dyn KeyStatusSink>,
    selector: SchemeSelector,
    license: LicenseClient,
    offline: OfflineBridge,
    connectivity: Option<Arc<dyn Connectivity>>,
    events: EventBus,
    state: Mutex<State>,
    worker: Mutex<Option<Worker<Job>>>,
}

impl Shared {
    pub(crate) fn enqueue(&self, job: Job) {
        let worker = self.worker.lock();
        match worker.as_ref() {
            Some(worker) if worker.push(job) => {}
            _ => trace!("session worker not running, dropping job"),
        }
    }

    fn start_and_push(&self, job: Job) -> DrmResult<()> {
        let mut slot = self.worker.lock();
        if slot.is_none() {
            let me = self.me.clone();
            let worker = Worker::spawn(WORKER_NAME, move |job: Job| {
                if let Some(shared) = me.upgrade() {
                    shared.run(job);
                }
            })
            .map_err(|e| DrmError::internal(format!("failed to start session worker: {e}")))?;
            *slot = Some(worker);
        }

        match slot.as_ref() {
            Some(worker) if worker.push(job) => Ok(()),
            _ => Err(DrmError::internal("session worker is stopped")),
        }
    }

    fn stop_worker(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.stop();
            debug!("session worker stopped");
        }
    }

    // ── Boundary operations ──

    fn init_session(
        &self,
        candidates: &[[u8; 16]],
        init_data: &[u8],
        mode: OfflineMode,
        unique_id: i32,
    ) -> DrmResult<SessionId> {
        InitData::parse(init_data)?;

        let mut state = self.state.lock();

        let scheme = match state.scheme {
            Some(scheme) => scheme,
            None => {
                let selection = self
                    .selector
                    .select(candidates, |s| self.provider.supports(s))
                    .ok_or(DrmError::SchemeNotSupported)?;
                debug!(
                    scheme = %selection.scheme,
                    index = selection.index,
                    "protection scheme selected"
                );
                selection.scheme
            }
        };

        if let Some(existing) = state.table.find_live(init_data, unique_id) {
            debug!(session = %existing.id(), unique_id, "reusing open session");
            return Ok(existing.id().clone());
        }
        let failed = state
            .table
            .find(init_data, unique_id)
            .map(|s| s.id().clone());
        if let Some(failed) = failed {
            debug!(session = %failed, unique_id, "replacing failed session");
            if let Err(e) = self.close(&mut state, &failed) {
                warn!(session = %failed, error = %e, "failed to close replaced session");
            }
        }

        let handle = match state.handle.clone() {
            Some(handle) => handle,
            None => {
                let callbacks = ProviderCallbacks::new(self.me.clone(), state.epoch);
                let handle = self.provider.create(scheme, callbacks)?;
                state.handle = Some(handle.clone());
                handle
            }
        };
        state.scheme = Some(scheme);

        let id = handle.open_session()?;
        let session = Session::new(id.clone(), init_data.to_vec(), mode, unique_id);
        let serial = session.serial();
        let primary = state.table.insert(session);
        debug!(
            session = %id,
            serial,
            unique_id,
            primary,
            scheme = %scheme,
            mode = ?mode,
            "session opening"
        );

        let epoch = state.epoch;
        if let Err(err) = self.start_and_push(Job::Acquire {
            epoch,
            session: id.clone(),
        }) {
            state.table.remove(&id);
            if let Err(e) = handle.close_session(&id) {
                warn!(session = %id, error = %e, "failed to close session after worker failure");
            }
            return Err(err);
        }

        Ok(id)
    }

    /**
        Remove a session from the table and close it with the provider.
    */
    fn close(&self, state: &mut State, id: &SessionId) -> DrmResult<()> {
        let Some(mut session) = state.table.remove(id) else {
            trace!(session = %id, "release of unknown session");
            return Ok(());
        };
        advance(&mut session, SessionState::Released);
        debug!(session = %id, serial = session.serial(), "session released");

        match &state.handle {
            Some(handle) => handle.close_session(id).map_err(DrmError::from),
            None => Ok(()),
        }
    }

    fn release(&self, id: &SessionId) -> DrmResult<()> {
        let mut state = self.state.lock();
        let result = self.close(&mut state, id);
        if state.table.is_empty() {
            self.stop_worker();
        }
        result
    }

    fn release_all(&self) -> DrmResult<()> {
        let mut state = self.state.lock();
        let sessions = state.table.drain();
        let handle = state.handle.take();
        let mut first_error: Option<DrmError> = None;

        for mut session in sessions {
            advance(&mut session, SessionState::Released);
            let Some(handle) = &handle else {
                continue;
            };
            if let Err(e) = handle.close_session(session.id()) {
                warn!(
                    session = %session.id(),
                    error = %e,
                    "failed to close session, continuing"
                );
                if first_error.is_none() {
                    first_error = Some(e.into());
                }
            }
        }

        if let Some(handle) = handle {
            handle.release();
            debug!("crypto provider released");
        }
        state.scheme = None;
        state.epoch = state.epoch.wrapping_add(1);
        self.stop_worker();
        drop(state);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fetch_if_online(&self) -> bool {
        let network = self.connectivity.as_ref().map(|c| c.network());

        let state = self.state.lock();
        let targets: Vec<SessionId> = state
            .table
            .iter()
            .filter(|s| matches!(s.state(), SessionState::Opened | SessionState::OpenedWithKeys))
            .filter(|s| s.mode() != OfflineMode::Retrieve)
            .map(|s| s.id().clone())
            .collect();
        if targets.is_empty() {
            return false;
        }
        if let Some(network) = network.filter(|n| !n.is_online()) {
            debug!(%network, "no connectivity, skipping key refresh");
            return false;
        }

        let epoch = state.epoch;
        debug!(sessions = targets.len(), "refreshing license keys");
        for session in targets {
            self.enqueue(Job::Refresh { epoch, session });
        }
        true
    }

    // ── Worker side ──

    fn run(&self, job: Job) {
        match job {
            Job::Acquire { epoch, session } => self.acquire(epoch, &session),
            Job::Refresh { epoch, session } => self.refresh(epoch, &session),
            Job::KeyStatus {
                epoch,
                session,
                statuses,
            } => self.key_status(epoch, &session, &statuses),
            Job::KeyExpired { epoch, session } => self.key_expired(epoch, &session),
            Job::SessionError {
                epoch,
                session,
                error,
            } => self.settle_error(epoch, &session, error.into()),
        }
    }

    fn snapshot(&self, epoch: u64, id: &SessionId) -> Option<Snapshot> {
        let state = self.state.lock();
        if state.epoch != epoch {
            return None;
        }
        let session = state.table.get(id).filter(|s| s.state().is_live())?;
        Some(Snapshot {
            handle: state.handle.clone()?,
            scheme: state.scheme?,
            content: ContentIdentity::new(session.init_data(), session.unique_id()),
            mode: session.mode(),
        })
    }

    fn is_current(&self, epoch: u64, id: &SessionId) -> bool {
        let state = self.state.lock();
        state.epoch == epoch && state.table.get(id).is_some_and(|s| s.state().is_live())
    }

    /**
        Move a session out of `Opening`. Returns false if the session is
        gone or failed in the meantime.
    */
    fn mark_opened(&self, epoch: u64, id: &SessionId) -> bool {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return false;
        }
        let Some(session) = state.table.get_mut(id) else {
            return false;
        };
        if session.state() == SessionState::Opening {
            advance(session, SessionState::Opened);
            debug!(session = %id, "session opened");
        }
        session.state().is_live()
    }

    fn acquire(&self, epoch: u64, id: &SessionId) {
        let Some(ctx) = self.snapshot(epoch, id) else {
            trace!(session = %id, "skipping acquisition for stale session");
            return;
        };
        if let Err(err) = self.acquire_keys(epoch, id, &ctx) {
            self.settle_error(epoch, id, err);
        }
    }

    fn acquire_keys(&self, epoch: u64, id: &SessionId, ctx: &Snapshot) -> DrmResult<()> {
        match self.offline.plan(ctx.mode, &ctx.content) {
            AcquisitionPlan::Fail(err) => Err(err),
            AcquisitionPlan::Restore(key_set_id) => {
                debug!(session = %id, "restoring offline keys");
                ctx.handle.restore_keys(id, &key_set_id)?;
                self.mark_opened(epoch, id);
                Ok(())
            }
            AcquisitionPlan::Online {
                license_type,
                store,
            } => self.exchange(epoch, id, ctx, license_type, store),
        }
    }

    fn exchange(
        &self,
        epoch: u64,
        id: &SessionId,
        ctx: &Snapshot,
        license_type: LicenseType,
        store: bool,
    ) -> DrmResult<()> {
        let init_data = InitData::parse(&ctx.content.init_data)?;
        let request = ctx
            .handle
            .key_request(id, init_data.payload_for(ctx.scheme), license_type)?;
        if !self.mark_opened(epoch, id) {
            return Ok(());
        }

        let response = self.license.exchange(ctx.scheme, id, &request)?;
        if !self.is_current(epoch, id) {
            trace!(session = %id, "session released during license exchange");
            return Ok(());
        }

        let key_set_id = ctx.handle.provide_key_response(id, &response)?;
        if store {
            match key_set_id.filter(|k| !k.is_empty()) {
                Some(key_set_id) => {
                    debug!(session = %id, unique_id = ctx.content.unique_id, "storing offline key set");
                    self.offline.store(&ctx.content, &key_set_id);
                }
                None => warn!(session = %id, "offline license carried no key set id"),
            }
        }
        Ok(())
    }

    fn refresh(&self, epoch: u64, id: &SessionId) {
        let Some(ctx) = self.snapshot(epoch, id) else {
            trace!(session = %id, "skipping refresh for stale session");
            return;
        };
        let store = ctx.mode.stores();
        let license_type = if store {
            LicenseType::Offline
        } else {
            LicenseType::Streaming
        };
        if let Err(err) = self.exchange(epoch, id, &ctx, license_type, store) {
            self.settle_error(epoch, id, err);
        }
    }

    fn key_status(&self, epoch: u64, id: &SessionId, statuses: &[KeyStatus]) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            trace!(session = %id, "dropping key status from previous content");
            return;
        }
        let Some(session) = state.table.get_mut(id).filter(|s| s.state().is_live()) else {
            trace!(session = %id, "dropping key status for closed session");
            return;
        };

        let unique_id = session.unique_id();
        let mut report = KeyStatusReport::from_statuses(id.clone(), unique_id, statuses);
        let usable = usable_key_ids(statuses);
        let only_expired = statuses.iter().all(|s| s.state == KeyState::Expired);
        let any_failed = statuses.iter().any(|s| s.state == KeyState::InternalError);
        let mut event = None;

        if !report.error.permits_keys() {
            advance(session, SessionState::Error(report.error));
            event = Some(DrmEvent::SessionError {
                session_id: id.clone(),
                unique_id,
                error: report.error,
            });
        } else if !usable.is_empty() {
            if session.state() == SessionState::Opening {
                advance(session, SessionState::Opened);
            }
            if session.state() == SessionState::Opened {
                advance(session, SessionState::OpenedWithKeys);
                event = Some(DrmEvent::KeysLoaded {
                    session_id: id.clone(),
                    unique_id,
                    key_count: usable.len(),
                });
            }
            session.set_key_ids(usable);
        } else if session.state() == SessionState::OpenedWithKeys && only_expired {
            session.set_key_ids(Vec::new());
        } else if session.state() == SessionState::OpenedWithKeys || any_failed {
            // No usable key is left; the decoder gets a zero-key failure.
            let code = match report.error {
                ErrorCode::None => ErrorCode::KeyUnavailable,
                code => code,
            };
            advance(session, SessionState::Error(code));
            report = KeyStatusReport::failure(id.clone(), unique_id, code);
            event = Some(DrmEvent::SessionError {
                session_id: id.clone(),
                unique_id,
                error: code,
            });
        }

        debug!(
            session = %id,
            keys = report.key_count,
            error = %report.error,
            state = %session.state(),
            "key status changed"
        );
        self.sink.report_key_status(report);
        drop(state);

        if let Some(event) = event {
            self.events.publish(event);
        }
    }

    fn key_expired(&self, epoch: u64, id: &SessionId) {
        let Some(ctx) = self.snapshot(epoch, id) else {
            trace!(session = %id, "dropping key expiry for closed session");
            return;
        };
        debug!(session = %id, unique_id = ctx.content.unique_id, "keys expired");
        if ctx.mode.handles_expiry() {
            self.offline.expire(&ctx.content);
        }
        self.events.publish(DrmEvent::KeyExpired {
            session_id: id.clone(),
            unique_id: ctx.content.unique_id,
        });
    }

    /**
        Settle a live session in error: one zero-key report to the decoder
        and one application event. Later failures of the same session are
        dropped.
    */
    fn settle_error(&self, epoch: u64, id: &SessionId, err: DrmError) {
        let code = err.code();
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }
        let Some(session) = state.table.get_mut(id).filter(|s| s.state().is_live()) else {
            trace!(session = %id, error = %err, "dropping failure for closed session");
            return;
        };

        advance(session, SessionState::Error(code));
        let unique_id = session.unique_id();
        warn!(session = %id, unique_id, error = %err, "session failed");
        self.sink
            .report_key_status(KeyStatusReport::failure(id.clone(), unique_id, code));
        drop(state);

        self.events.publish(DrmEvent::SessionError {
            session_id: id.clone(),
            unique_id,
            error: code,
        });
    }
}

fn advance(session: &mut Session, next: SessionState) {
    if let Err(e) = session.transition(next) {
        warn!(session = %session.id(), error = %e, "ignoring session transition");
    }
}

/**
    Builder for [`DrmSessionManager`].
*/
pub struct DrmSessionManagerBuilder {
    provider: Arc<dyn CryptoProvider>,
    sink: Arc<dyn KeyStatusSink>,
    config: DrmConfig,
    transport: Option<Arc<dyn LicenseTransport>>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    offline_store: Option<Arc<dyn OfflineKeyStore>>,
    connectivity: Option<Arc<dyn Connectivity>>,
}

impl DrmSessionManagerBuilder {
    pub fn config(mut self, config: DrmConfig) -> Self {
        self.config = config;
        self
    }

    /**
        Replace the default HTTP transport.
    */
    pub fn transport(mut self, transport: Arc<dyn LicenseTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    pub fn offline_store(mut self, store: Arc<dyn OfflineKeyStore>) -> Self {
        self.offline_store = Some(store);
        self
    }

    /**
        Connectivity probe for `fetch_if_online`. Without one the device
        is assumed to be online.
    */
    pub fn connectivity(mut self, connectivity: impl Connectivity + 'static) -> Self {
        self.connectivity = Some(Arc::new(connectivity));
        self
    }

    pub fn build(self) -> DrmResult<DrmSessionManager> {
        let selector = self
            .config
            .selector()
            .map_err(|e| DrmError::InitializationFailed(e.to_string()))?;
        let transport: Arc<dyn LicenseTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpTransport::new(self.config.request_timeout())
                    .map_err(|e| DrmError::InitializationFailed(e.to_string()))?,
            ),
        };
        let license = LicenseClient::new(
            transport,
            self.interceptor,
            self.config.license_server_url.clone(),
            self.config.headers(),
        );

        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            provider: self.provider,
            sink: self.sink,
            selector,
            license,
            offline: OfflineBridge::new(self.offline_store),
            connectivity: self.connectivity,
            events: EventBus::new(self.config.event_capacity),
            state: Mutex::new(State {
                table: SessionTable::new(),
                scheme: None,
                handle: None,
                epoch: 0,
            }),
            worker: Mutex::new(None),
        });

        Ok(DrmSessionManager { shared })
    }
}

/**
    Content protection session lifecycle manager, one per player instance.

    The boundary calls (`init_session`, `deinit_session`, releases) return
    without waiting on the network; license exchanges run on a dedicated
    worker thread and their outcome reaches the decoder through the
    [`KeyStatusSink`].
*/
pub struct DrmSessionManager {
    shared: Arc<Shared>,
}

impl DrmSessionManager {
    pub fn builder(
        provider: Arc<dyn CryptoProvider>,
        sink: Arc<dyn KeyStatusSink>,
    ) -> DrmSessionManagerBuilder {
        DrmSessionManagerBuilder {
            provider,
            sink,
            config: DrmConfig::default(),
            transport: None,
            interceptor: None,
            offline_store: None,
            connectivity: None,
        }
    }

    /**
        Open (or reuse) the session for a track's protection metadata.

        The first call after content open negotiates the protection scheme
        from `candidates`; later calls keep that scheme. Returns as soon as
        license acquisition is queued. Errors returned here are never
        reported again asynchronously.
    */
    pub fn init_session(
        &self,
        candidates: &[[u8; 16]],
        init_data: &[u8],
        mode: OfflineMode,
        unique_id: i32,
    ) -> DrmResult<SessionId> {
        self.shared
            .init_session(candidates, init_data, mode, unique_id)
    }

    /**
        A track no longer needs its session. Auxiliary sessions are
        released; the primary session stays open until `release_all`.
    */
    pub fn deinit_session(&self, id: &SessionId) -> DrmResult<()> {
        if self.shared.state.lock().table.is_primary(id) {
            debug!(session = %id, "keeping primary session until content close");
            return Ok(());
        }
        self.release(id)
    }

    /**
        Release one session. Unknown or already released IDs are ignored.
    */
    pub fn release(&self, id: &SessionId) -> DrmResult<()> {
        self.shared.release(id)
    }

    /**
        Release every session and the provider handle (content close).

        All sessions are closed in the order they were opened even if some
        fail; the first failure is returned afterwards.
    */
    pub fn release_all(&self) -> DrmResult<()> {
        self.shared.release_all()
    }

    /**
        Queue a license refresh for open sessions if the device is online.
        Returns whether anything was queued.
    */
    pub fn fetch_if_online(&self) -> bool {
        self.shared.fetch_if_online()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DrmEvent> {
        self.shared.events.subscribe()
    }

    pub fn session_state(&self, id: &SessionId) -> Option<SessionState> {
        self.shared.state.lock().table.get(id).map(Session::state)
    }

    pub fn session_key_ids(&self, id: &SessionId) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .table
            .get(id)
            .map(|s| s.key_ids().to_vec())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.shared.state.lock().table.len()
    }

    pub fn primary_session(&self) -> Option<SessionId> {
        self.shared.state.lock().table.primary().cloned()
    }

    pub fn selected_scheme(&self) -> Option<ProtectionScheme> {
        self.shared.state.lock().scheme
    }

    pub fn is_worker_running(&self) -> bool {
        self.shared
            .worker
            .lock()
            .as_ref()
            .is_some_and(Worker::is_running)
    }

    /**
        `init_session` in boundary form: `(error code, session id bytes)`.
    */
    pub fn init_session_code(
        &self,
        candidates: &[[u8; 16]],
        init_data: &[u8],
        mode: i32,
        unique_id: i32,
    ) -> (i32, Vec<u8>) {
        let Some(mode) = OfflineMode::from_i32(mode) else {
            warn!(mode, "unknown offline mode");
            return (ErrorCode::InitializationFailed.to_i32(), Vec::new());
        };
        match self.init_session(candidates, init_data, mode, unique_id) {
            Ok(id) => (ErrorCode::None.to_i32(), id.into_bytes()),
            Err(err) => {
                debug!(error = %err, "init session failed");
                (err.code().to_i32(), Vec::new())
            }
        }
    }

    /**
        `deinit_session` in boundary form.
    */
    pub fn deinit_session_code(&self, session_id: &[u8]) -> i32 {
        match self.deinit_session(&SessionId::from(session_id)) {
            Ok(()) => ErrorCode::None.to_i32(),
            Err(err) => err.code().to_i32(),
        }
    }
}

impl Drop for DrmSessionManager {
    fn drop(&mut self) {
        if let Err(e) = self.shared.release_all() {
            warn!(error = %e, "release on drop failed");
        }
    }
}
