use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use drm_core::{InitData, SystemId};

use crate::callback::{EventListener, LicenseCallback};
use crate::config::ManagerConfig;
use crate::control::ControlThread;
use crate::engine::{CryptoEngine, EngineEvent, EngineEventKind, NativeSessionId};
use crate::error::{DrmError, DrmResult};
use crate::executor::{RequestExecutor, RequestWorker};
use crate::mode::{Mode, ModeConfig, OfflineLicenseHandle};
use crate::pool::{SessionPool, SharingPolicy};
use crate::provisioning::ProvisioningGuard;
use crate::selector::{Fingerprint, SchemeSelector};
use crate::session::{Session, SessionContext};

const SESSION_SHARING_PROPERTY: &str = "sessionSharing";
const PLAYREADY_CUSTOM_DATA: &str = "PRCustomData";

/**
    Builder for a [`SessionManager`].
*/
pub struct SessionManagerBuilder {
    scheme: SystemId,
    engine: Arc<dyn CryptoEngine>,
    callback: Arc<dyn LicenseCallback>,
    config: ManagerConfig,
    listener: Option<Arc<dyn EventListener>>,
    executor: Option<Arc<dyn RequestExecutor>>,
}

impl SessionManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /**
        Run key and provisioning requests on `executor` instead of a
        dedicated worker thread.
    */
    pub fn executor(mut self, executor: Arc<dyn RequestExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> DrmResult<SessionManager> {
        if self.scheme.is_common() || !self.engine.supports_scheme(self.scheme) {
            return Err(DrmError::UnsupportedScheme(self.scheme));
        }

        let executor: Arc<dyn RequestExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(RequestWorker::spawn().map_err(|e| DrmError::Worker(e.to_string()))?),
        };

        let policy = self.config.sharing_policy();
        if policy == SharingPolicy::PerFingerprint
            && let Err(e) = self
                .engine
                .set_property_string(SESSION_SHARING_PROPERTY, "enable")
        {
            warn!(scheme = %self.scheme, error = %e, "engine refused session sharing");
        }

        debug!(scheme = %self.scheme, ?policy, platform = self.config.platform_level.0, "session manager created");

        let ctx = Arc::new(SessionContext {
            scheme: self.scheme,
            engine: self.engine,
            callback: self.callback,
            executor,
            listener: self.listener,
            key_request_parameters: self.config.key_request_parameters,
            provisioning: ProvisioningGuard::new(),
        });

        Ok(SessionManager {
            inner: Arc::new(ManagerInner {
                ctx,
                selector: SchemeSelector::new(self.scheme, self.config.platform_level),
                policy,
                pool: Mutex::new(PoolState::default()),
            }),
        })
    }
}

#[derive(Default)]
struct PoolState {
    /// Bound while the pool is non-empty.
    control: Option<ControlThread>,
    mode: ModeConfig,
    sessions: SessionPool,
}

struct ManagerInner {
    ctx: Arc<SessionContext>,
    selector: SchemeSelector,
    policy: SharingPolicy,
    pool: Mutex<PoolState>,
}

impl ManagerInner {
    fn dispatch_engine_event(&self, session_id: &NativeSessionId, kind: EngineEventKind) -> bool {
        let session = {
            let pool = self.pool.lock();
            if pool.mode.mode() != Mode::Playback {
                trace!(?kind, mode = %pool.mode.mode(), "engine event ignored outside playback");
                return false;
            }
            pool.sessions.find_by_native_id(session_id)
        };

        match session {
            Some(session) => {
                trace!(%session_id, ?kind, "dispatching engine event");
                session.on_engine_event(kind);
                true
            }
            None => {
                trace!(%session_id, ?kind, "engine event for unknown session dropped");
                false
            }
        }
    }

    fn install_engine_listener(self: &Arc<Self>, control: &ControlThread) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let control = control.clone();
        self.ctx
            .engine
            .set_event_listener(Some(Arc::new(move |event: EngineEvent| {
                let weak = weak.clone();
                control.post(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.dispatch_engine_event(&event.session_id, event.kind);
                    }
                });
            })));
    }
}

/**
    Hands out reference-counted decryption sessions for one DRM scheme.

    Every acquisition and release, and every notification, happens on the
    control thread bound by the first acquisition. The binding lasts until
    the last session is released.
*/
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn builder(
        scheme: SystemId,
        engine: Arc<dyn CryptoEngine>,
        callback: Arc<dyn LicenseCallback>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            scheme,
            engine,
            callback,
            config: ManagerConfig::default(),
            listener: None,
            executor: None,
        }
    }

    /**
        A Widevine manager with default configuration.
    */
    pub fn widevine(
        engine: Arc<dyn CryptoEngine>,
        callback: Arc<dyn LicenseCallback>,
        listener: Option<Arc<dyn EventListener>>,
    ) -> DrmResult<Self> {
        let mut builder = Self::builder(SystemId::Widevine, engine, callback);
        builder.listener = listener;
        builder.build()
    }

    /**
        A PlayReady manager. Non-empty `custom_data` is sent with every key
        request.
    */
    pub fn playready(
        custom_data: &str,
        engine: Arc<dyn CryptoEngine>,
        callback: Arc<dyn LicenseCallback>,
        listener: Option<Arc<dyn EventListener>>,
    ) -> DrmResult<Self> {
        let mut config = ManagerConfig::default();
        if !custom_data.is_empty() {
            config
                .key_request_parameters
                .insert(PLAYREADY_CUSTOM_DATA.to_owned(), custom_data.to_owned());
        }
        let mut builder = Self::builder(SystemId::PlayReady, engine, callback).config(config);
        builder.listener = listener;
        builder.build()
    }

    pub fn scheme(&self) -> SystemId {
        self.inner.ctx.scheme
    }

    pub fn sharing_policy(&self) -> SharingPolicy {
        self.inner.policy
    }

    pub fn can_acquire(&self, init_data: &InitData) -> bool {
        self.inner.selector.can_acquire(init_data)
    }

    /**
        Acquire a session for `init_data`, binding `control` if nothing is
        bound yet.

        Fails only on misuse. Runtime failures are reported through the
        event listener and leave the returned session in the error state.
    */
    pub fn acquire(&self, control: &ControlThread, init_data: &InitData) -> DrmResult<Arc<Session>> {
        let inner = &self.inner;
        let session = {
            let mut pool = inner.pool.lock();
            if let Some(bound) = &pool.control
                && bound != control
            {
                return Err(DrmError::illegal_state(format!(
                    "acquire on control thread {} while bound to {}",
                    control.id(),
                    bound.id()
                )));
            }

            let mode = pool.mode.mode();
            let offline_license = pool.mode.offline_license().cloned();
            let resolved = match offline_license {
                Some(_) => None,
                None => {
                    let resolved = inner.selector.resolve(init_data);
                    if resolved.is_none() {
                        warn!(scheme = %inner.ctx.scheme, "init data has no entry for scheme");
                        let error = DrmError::MissingSchemeData(inner.ctx.scheme);
                        inner.ctx.notify(control, move |l: &dyn EventListener| {
                            l.on_session_manager_error(&error)
                        });
                    }
                    resolved
                }
            };
            let fingerprint = Fingerprint {
                scheme: inner.ctx.scheme,
                init_data: resolved,
            };

            if offline_license.is_none() && fingerprint.init_data.is_none() {
                // A shared session still serves the request; otherwise the
                // caller gets a session that carries the error.
                match pool.sessions.find(inner.policy, &fingerprint) {
                    Some(existing) => existing,
                    None => {
                        return Ok(Session::new_failed(
                            Arc::clone(&inner.ctx),
                            control.clone(),
                            fingerprint,
                            mode,
                            DrmError::MissingSchemeData(inner.ctx.scheme),
                        ));
                    }
                }
            } else {
                if pool.control.is_none() {
                    debug!(control = control.id(), "binding control thread");
                    inner.install_engine_listener(control);
                    pool.control = Some(control.clone());
                }

                match pool.sessions.find(inner.policy, &fingerprint) {
                    Some(existing) => existing,
                    None => {
                        let session = Session::new(
                            Arc::clone(&inner.ctx),
                            control.clone(),
                            fingerprint,
                            mode,
                            offline_license,
                        );
                        pool.sessions.insert(Arc::clone(&session));
                        info!(scheme = %inner.ctx.scheme, sessions = pool.sessions.len(), "session created");
                        session
                    }
                }
            }
        };

        session.acquire();
        Ok(session)
    }

    /**
        Drop one reference to `session`. The last release closes it and,
        once no session remains, unbinds the control thread.
    */
    pub fn release(&self, session: &Arc<Session>) -> DrmResult<()> {
        let mut pool = self.inner.pool.lock();
        if !pool.sessions.contains(session) {
            if session.is_detached() {
                session.release();
                return Ok(());
            }
            return Err(DrmError::illegal_state("session is not live in this manager"));
        }

        if session.release() {
            pool.sessions.remove(session);
            debug!(sessions = pool.sessions.len(), "session released");
        }

        if pool.sessions.is_empty() {
            self.inner.ctx.engine.set_event_listener(None);
            if let Some(control) = pool.control.take() {
                debug!(control = control.id(), "control thread unbound");
            }
        }
        Ok(())
    }

    /**
        Change the mode for sessions acquired from now on. Only allowed while
        no session is live.
    */
    pub fn set_mode(&self, mode: Mode, offline_license: Option<OfflineLicenseHandle>) -> DrmResult<()> {
        let mut pool = self.inner.pool.lock();
        if !pool.sessions.is_empty() {
            return Err(DrmError::illegal_state(format!(
                "cannot change mode with {} live sessions",
                pool.sessions.len()
            )));
        }
        pool.mode = ModeConfig::new(mode, offline_license)?;
        debug!(mode = %mode, "mode set");
        Ok(())
    }

    pub fn mode_config(&self) -> ModeConfig {
        self.inner.pool.lock().mode.clone()
    }

    /**
        Route an engine event to the live session owning `session_id`.
        Returns `false` when no session matched or the mode ignores events.
    */
    pub fn dispatch_engine_event(&self, session_id: &NativeSessionId, kind: EngineEventKind) -> bool {
        self.inner.dispatch_engine_event(session_id, kind)
    }

    pub fn session_count(&self) -> usize {
        self.inner.pool.lock().sessions.len()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.pool.lock().sessions.sessions()
    }

    pub fn control_thread(&self) -> Option<ControlThread> {
        self.inner.pool.lock().control.clone()
    }

    pub fn is_provisioning(&self) -> bool {
        self.inner.ctx.provisioning.is_in_flight()
    }

    pub fn property_string(&self, key: &str) -> DrmResult<String> {
        Ok(self.inner.ctx.engine.property_string(key)?)
    }

    pub fn set_property_string(&self, key: &str, value: &str) -> DrmResult<()> {
        Ok(self.inner.ctx.engine.set_property_string(key, value)?)
    }

    pub fn property_bytes(&self, key: &str) -> DrmResult<Vec<u8>> {
        Ok(self.inner.ctx.engine.property_bytes(key)?)
    }

    pub fn set_property_bytes(&self, key: &str, value: &[u8]) -> DrmResult<()> {
        Ok(self.inner.ctx.engine.set_property_bytes(key, value)?)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = self.inner.pool.lock();
        f.debug_struct("SessionManager")
            .field("scheme", &self.inner.ctx.scheme)
            .field("policy", &self.inner.policy)
            .field("mode", &pool.mode)
            .field("sessions", &pool.sessions.len())
            .field("control", &pool.control)
            .finish()
    }
}
