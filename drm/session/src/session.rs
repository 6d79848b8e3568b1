use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use drm_core::SystemId;

use crate::callback::{EventListener, LicenseCallback};
use crate::control::ControlThread;
use crate::engine::{
    CryptoEngine, EngineEventKind, KeyRequest, KeyRequestType, KeyScope, NativeSessionId,
};
use crate::error::{CallbackError, DrmError, EngineError};
use crate::executor::RequestExecutor;
use crate::mode::{Mode, OfflineLicenseHandle};
use crate::provisioning::ProvisioningGuard;
use crate::selector::Fingerprint;

/**
    An offline license this close to expiry is renewed during playback.
*/
const RENEWAL_WINDOW_SECS: u64 = 60;

const LICENSE_DURATION_REMAINING: &str = "LicenseDurationRemaining";
const PLAYBACK_DURATION_REMAINING: &str = "PlaybackDurationRemaining";

/**
    Lifecycle state of a [`Session`].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not yet acquired.
    Idle,
    /// Native session opening or open, waiting on a key or provisioning exchange.
    Opening,
    /// Native session open, no usable keys.
    Opened,
    /// Keys loaded, decryption possible.
    OpenedWithKeys,
    /// Failed. Stays this way until every reference is released.
    Error,
    /// Reference count reached zero. Native session closed.
    Released,
}

impl SessionState {
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Opened | Self::OpenedWithKeys)
    }

    pub const fn has_keys(self) -> bool {
        matches!(self, Self::OpenedWithKeys)
    }
}

/**
    Collaborators shared by every session of one manager.
*/
pub(crate) struct SessionContext {
    pub(crate) scheme: SystemId,
    pub(crate) engine: Arc<dyn CryptoEngine>,
    pub(crate) callback: Arc<dyn LicenseCallback>,
    pub(crate) executor: Arc<dyn RequestExecutor>,
    pub(crate) listener: Option<Arc<dyn EventListener>>,
    pub(crate) key_request_parameters: HashMap<String, String>,
    pub(crate) provisioning: ProvisioningGuard<Session>,
}

impl SessionContext {
    /**
        Queue a listener notification on the control thread.
    */
    pub(crate) fn notify(
        &self,
        control: &ControlThread,
        event: impl FnOnce(&dyn EventListener) + Send + 'static,
    ) {
        if let Some(listener) = self.listener.clone() {
            control.post(move || event(listener.as_ref()));
        }
    }

    /**
        Apply a provisioning response and wake every session waiting on it.
        Runs on the control thread.
    */
    fn complete_provisioning(&self, result: Result<Vec<u8>, CallbackError>) {
        let outcome = result
            .map_err(|e| DrmError::ProvisionRequestFailed(e.to_string()))
            .and_then(|response| {
                self.engine
                    .provide_provision_response(&response)
                    .map_err(|e| DrmError::ProvisionRequestFailed(e.to_string()))
            });

        let waiters = self.provisioning.finish();
        match &outcome {
            Ok(()) => info!(scheme = %self.scheme, waiters = waiters.len(), "device provisioned"),
            Err(e) => warn!(scheme = %self.scheme, error = %e, "provisioning failed"),
        }

        for session in waiters {
            match &outcome {
                Ok(()) => session.on_provisioning_completed(),
                Err(e) => session.on_provisioning_failed(e.clone()),
            }
        }
    }
}

struct SessionInner {
    state: SessionState,
    reference_count: usize,
    native_id: Option<NativeSessionId>,
    offline_license: Option<OfflineLicenseHandle>,
    last_error: Option<DrmError>,
    awaiting_provisioning: bool,
}

/**
    One decryption session per distinct fingerprint.

    Owns its native session handle, drives key acquisition for its mode and
    is shared by reference count among everyone who acquired it. All state
    changes happen on the manager's control thread.
*/
pub struct Session {
    ctx: Arc<SessionContext>,
    control: ControlThread,
    fingerprint: Fingerprint,
    mode: Mode,
    this: Weak<Session>,
    /// Never entered the pool; handed out only to report an acquisition failure.
    detached: bool,
    /// Set once on release. Readable from request jobs without taking the lock.
    released: AtomicBool,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(
        ctx: Arc<SessionContext>,
        control: ControlThread,
        fingerprint: Fingerprint,
        mode: Mode,
        offline_license: Option<OfflineLicenseHandle>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            ctx,
            control,
            fingerprint,
            mode,
            this: this.clone(),
            detached: false,
            released: AtomicBool::new(false),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                reference_count: 0,
                native_id: None,
                offline_license,
                last_error: None,
                awaiting_provisioning: false,
            }),
        })
    }

    /**
        A session that failed before it could be opened. It holds one
        reference and never touches the engine. The caller reports the error.
    */
    pub(crate) fn new_failed(
        ctx: Arc<SessionContext>,
        control: ControlThread,
        fingerprint: Fingerprint,
        mode: Mode,
        error: DrmError,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            ctx,
            control,
            fingerprint,
            mode,
            this: this.clone(),
            detached: true,
            released: AtomicBool::new(false),
            inner: Mutex::new(SessionInner {
                state: SessionState::Error,
                reference_count: 1,
                native_id: None,
                offline_license: None,
                last_error: Some(error),
                awaiting_provisioning: false,
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /**
        The error that put this session into [`SessionState::Error`].
    */
    pub fn error(&self) -> Option<DrmError> {
        self.inner.lock().last_error.clone()
    }

    pub fn native_session_id(&self) -> Option<NativeSessionId> {
        self.inner.lock().native_id.clone()
    }

    /**
        Offline license this session restores from, or the key set id the
        engine returned after a download or renewal.
    */
    pub fn offline_license(&self) -> Option<OfflineLicenseHandle> {
        self.inner.lock().offline_license.clone()
    }

    pub fn reference_count(&self) -> usize {
        self.inner.lock().reference_count
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn scheme(&self) -> SystemId {
        self.fingerprint.scheme
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /**
        Key status reported by the engine. `None` unless the session is open.
    */
    pub fn query_key_status(&self) -> Option<HashMap<String, String>> {
        let inner = self.inner.lock();
        if !inner.state.is_open() {
            return None;
        }
        let id = inner.native_id.as_ref()?;
        match self.ctx.engine.query_key_status(id) {
            Ok(status) => Some(status),
            Err(e) => {
                debug!(session_id = %id, error = %e, "key status query failed");
                None
            }
        }
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached
    }

    pub(crate) fn can_reuse(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprint == *fingerprint
    }

    pub(crate) fn has_native_session_id(&self, id: &NativeSessionId) -> bool {
        self.inner.lock().native_id.as_ref() == Some(id)
    }

    /**
        Add a reference. The first reference opens the native session and
        starts key acquisition.
    */
    pub(crate) fn acquire(&self) {
        let mut inner = self.inner.lock();
        inner.reference_count += 1;
        if inner.reference_count != 1 || inner.state != SessionState::Idle {
            trace!(references = inner.reference_count, state = ?inner.state, "session shared");
            return;
        }

        debug!(scheme = %self.ctx.scheme, mode = %self.mode, "opening session");
        inner.state = SessionState::Opening;
        if self.open(&mut inner, true) {
            self.do_license(&mut inner);
        }
    }

    /**
        Drop a reference. Returns `true` when this was the last one, in which
        case the native session is closed and the session is finished.
    */
    pub(crate) fn release(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.reference_count == 0 {
            warn!("release of a session with no references");
            return false;
        }
        inner.reference_count -= 1;
        if inner.reference_count > 0 {
            return false;
        }

        self.released.store(true, Ordering::Release);
        inner.state = SessionState::Released;
        inner.awaiting_provisioning = false;
        inner.last_error = None;
        if let Some(id) = inner.native_id.take() {
            debug!(session_id = %id, "closing native session");
            self.ctx.engine.close_session(&id);
        }
        true
    }

    /**
        Handle an engine event addressed to this session's native handle.
    */
    pub(crate) fn on_engine_event(&self, kind: EngineEventKind) {
        let mut inner = self.inner.lock();
        if !inner.state.is_open() {
            trace!(?kind, state = ?inner.state, "event ignored, session not open");
            return;
        }

        match kind {
            EngineEventKind::KeyRequired => self.do_license(&mut inner),
            EngineEventKind::KeyExpired => {
                if inner.state == SessionState::OpenedWithKeys {
                    self.fail(&mut inner, DrmError::KeysExpired);
                }
            }
            EngineEventKind::ProvisionRequired => self.start_provisioning(&mut inner),
            EngineEventKind::SessionReclaimed => self.fail(
                &mut inner,
                DrmError::Engine(EngineError::Generic("native session reclaimed".into())),
            ),
            EngineEventKind::VendorDefined(code) => trace!(code, "vendor event ignored"),
        }
    }

    /**
        Resume after device provisioning finished. Only sessions that were
        waiting on it do anything.
    */
    pub(crate) fn on_provisioning_completed(&self) {
        let mut inner = self.inner.lock();
        if !inner.awaiting_provisioning || inner.state != SessionState::Opening {
            return;
        }
        inner.awaiting_provisioning = false;
        debug!(scheme = %self.ctx.scheme, "retrying after provisioning");
        if self.open(&mut inner, false) {
            self.do_license(&mut inner);
        }
    }

    pub(crate) fn on_provisioning_failed(&self, error: DrmError) {
        let mut inner = self.inner.lock();
        if !inner.awaiting_provisioning || inner.state != SessionState::Opening {
            return;
        }
        inner.awaiting_provisioning = false;
        self.fail(&mut inner, error);
    }

    fn open(&self, inner: &mut SessionInner, allow_provisioning: bool) -> bool {
        if inner.native_id.is_some() {
            return true;
        }
        match self.ctx.engine.open_session() {
            Ok(id) => {
                debug!(session_id = %id, "native session opened");
                inner.native_id = Some(id);
                true
            }
            Err(EngineError::NotProvisioned) if allow_provisioning => {
                self.start_provisioning(inner);
                false
            }
            Err(e) => {
                self.fail(inner, e.into());
                false
            }
        }
    }

    /**
        Obtain keys the way the configured mode asks for.
    */
    fn do_license(&self, inner: &mut SessionInner) {
        let Some(session_id) = inner.native_id.clone() else {
            return;
        };
        let license = inner.offline_license.clone();

        match (self.mode, license) {
            (Mode::Playback | Mode::Query, None) => {
                self.request_keys(inner, KeyRequestType::Streaming);
            }
            (Mode::Playback, Some(license)) => {
                if !self.restore_keys(inner, &session_id, &license) {
                    return;
                }
                let remaining = self.license_duration_remaining(&session_id);
                if remaining <= RENEWAL_WINDOW_SECS {
                    debug!(remaining, "offline license close to expiry, renewing");
                    self.request_keys(inner, KeyRequestType::Offline);
                } else {
                    self.keys_restored(inner);
                }
            }
            (Mode::Query, Some(license)) => {
                if !self.restore_keys(inner, &session_id, &license) {
                    return;
                }
                if self.license_duration_remaining(&session_id) == 0 {
                    self.fail(inner, DrmError::KeysExpired);
                } else {
                    self.keys_restored(inner);
                }
            }
            (Mode::Download, None) => self.request_keys(inner, KeyRequestType::Offline),
            (Mode::Download, Some(license)) => {
                if self.restore_keys(inner, &session_id, &license) {
                    self.request_keys(inner, KeyRequestType::Offline);
                }
            }
            (Mode::Release, Some(license)) => {
                if self.restore_keys(inner, &session_id, &license) {
                    self.request_keys(inner, KeyRequestType::Release);
                }
            }
            (Mode::Release, None) => {
                self.fail(
                    inner,
                    DrmError::illegal_state("release mode without an offline license"),
                );
            }
        }
    }

    fn restore_keys(
        &self,
        inner: &mut SessionInner,
        session_id: &NativeSessionId,
        license: &OfflineLicenseHandle,
    ) -> bool {
        match self.ctx.engine.restore_keys(session_id, license) {
            Ok(()) => true,
            Err(e) => {
                self.fail(inner, e.into());
                false
            }
        }
    }

    fn keys_restored(&self, inner: &mut SessionInner) {
        inner.state = SessionState::OpenedWithKeys;
        info!(scheme = %self.ctx.scheme, "offline keys restored");
        self.ctx.notify(&self.control, |l| l.on_keys_restored());
    }

    /**
        Seconds of license validity left. Only Widevine reports this; other
        schemes and unreadable values count as unlimited.
    */
    fn license_duration_remaining(&self, session_id: &NativeSessionId) -> u64 {
        if self.ctx.scheme != SystemId::Widevine {
            return u64::MAX;
        }
        let status = match self.ctx.engine.query_key_status(session_id) {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, "key status unavailable");
                return u64::MAX;
            }
        };
        let read = |key: &str| {
            status
                .get(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .map_or(u64::MAX, |secs| secs.max(0) as u64)
        };
        read(LICENSE_DURATION_REMAINING).min(read(PLAYBACK_DURATION_REMAINING))
    }

    fn request_keys(&self, inner: &mut SessionInner, key_type: KeyRequestType) {
        let init_data = self.fingerprint.init_data.as_ref();
        let request = match (key_type, inner.native_id.as_ref(), inner.offline_license.as_ref()) {
            (KeyRequestType::Release, _, Some(license)) => self.ctx.engine.get_key_request(
                KeyScope::KeySet(license),
                None,
                None,
                key_type,
                &self.ctx.key_request_parameters,
            ),
            (KeyRequestType::Streaming | KeyRequestType::Offline, Some(id), _) => {
                self.ctx.engine.get_key_request(
                    KeyScope::Session(id),
                    init_data.map(|i| i.data.as_slice()),
                    init_data.map(|i| i.mime_type.as_str()),
                    key_type,
                    &self.ctx.key_request_parameters,
                )
            }
            _ => return,
        };

        match request {
            Ok(request) => self.post_key_request(request, key_type),
            Err(e) => self.on_keys_error(inner, e),
        }
    }

    fn post_key_request(&self, request: KeyRequest, key_type: KeyRequestType) {
        debug!(scheme = %self.ctx.scheme, ?key_type, "posting key request");
        let callback = Arc::clone(&self.ctx.callback);
        let scheme = self.ctx.scheme;
        let this = self.this.clone();
        let control = self.control.clone();

        self.ctx.executor.execute(Box::new(move || {
            if !is_live(&this) {
                return;
            }
            let result = callback.execute_key_request(scheme, &request);
            control.post(move || match this.upgrade() {
                Some(session) => session.on_key_response(key_type, result),
                None => trace!("key response for dropped session"),
            });
        }));
    }

    fn on_key_response(&self, key_type: KeyRequestType, result: Result<Vec<u8>, CallbackError>) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Error | SessionState::Released)
            || inner.native_id.is_none()
        {
            debug!(state = ?inner.state, "stale key response dropped");
            return;
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.fail(&mut inner, DrmError::KeyRequestFailed(e.to_string()));
                return;
            }
        };

        if key_type == KeyRequestType::Release {
            let Some(license) = inner.offline_license.clone() else {
                return;
            };
            match self
                .ctx
                .engine
                .provide_key_response(KeyScope::KeySet(&license), &response)
            {
                Ok(_) => {
                    inner.offline_license = None;
                    inner.state = SessionState::Opened;
                    info!(license = %license, "offline license released");
                    self.ctx.notify(&self.control, |l| l.on_keys_removed());
                }
                Err(e) => self.on_keys_error(&mut inner, e),
            }
            return;
        }

        let Some(id) = inner.native_id.clone() else {
            return;
        };
        match self
            .ctx
            .engine
            .provide_key_response(KeyScope::Session(&id), &response)
        {
            Ok(key_set) => {
                let keeps_license = self.mode == Mode::Download
                    || (self.mode == Mode::Playback && inner.offline_license.is_some());
                if keeps_license && let Some(key_set) = key_set.filter(|k| !k.is_empty()) {
                    inner.offline_license = Some(key_set);
                }
                inner.state = SessionState::OpenedWithKeys;
                info!(session_id = %id, "keys loaded");
                self.ctx.notify(&self.control, |l| l.on_keys_loaded());
            }
            Err(e) => self.on_keys_error(&mut inner, e),
        }
    }

    fn on_keys_error(&self, inner: &mut SessionInner, error: EngineError) {
        match error {
            EngineError::NotProvisioned => self.start_provisioning(inner),
            other => self.fail(inner, DrmError::KeyRequestFailed(other.to_string())),
        }
    }

    /**
        Wait for provisioning, issuing the request unless another session
        already has one in flight.
    */
    fn start_provisioning(&self, inner: &mut SessionInner) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        inner.state = SessionState::Opening;
        inner.awaiting_provisioning = true;

        if !self.ctx.provisioning.enlist(&this) {
            debug!(scheme = %self.ctx.scheme, "provisioning already in flight, waiting");
            return;
        }

        info!(scheme = %self.ctx.scheme, "device not provisioned, requesting provisioning");
        let request = self.ctx.engine.get_provision_request();
        let ctx = Arc::clone(&self.ctx);
        let control = self.control.clone();
        self.ctx.executor.execute(Box::new(move || {
            let result = ctx.callback.execute_provision_request(ctx.scheme, &request);
            let apply = Arc::clone(&ctx);
            if !control.post(move || apply.complete_provisioning(result)) {
                // Control loop is gone; free the flag so a later manager
                // binding can provision again.
                ctx.provisioning.finish();
            }
        }));
    }

    /**
        Enter the error state. The native session is closed and the error is
        reported once.
    */
    fn fail(&self, inner: &mut SessionInner, error: DrmError) {
        warn!(scheme = %self.ctx.scheme, state = ?inner.state, error = %error, "session failed");
        inner.state = SessionState::Error;
        inner.awaiting_provisioning = false;
        inner.last_error = Some(error.clone());
        if let Some(id) = inner.native_id.take() {
            self.ctx.engine.close_session(&id);
        }
        self.ctx
            .notify(&self.control, move |l| l.on_session_manager_error(&error));
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("scheme", &self.fingerprint.scheme)
            .field("mode", &self.mode)
            .field("state", &inner.state)
            .field("references", &inner.reference_count)
            .field("native_id", &inner.native_id)
            .finish()
    }
}

fn is_live(session: &Weak<Session>) -> bool {
    session
        .upgrade()
        .is_some_and(|s| !s.released.load(Ordering::Acquire))
}
