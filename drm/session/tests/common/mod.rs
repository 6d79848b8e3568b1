#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use drm_session::{
    CallbackError, ControlLoop, ControlThread, CryptoEngine, DrmError, EngineError, EngineEvent,
    EngineEventKind, EngineEventListener, EventListener, InitData, InlineExecutor, KeyRequest,
    KeyRequestType, KeyScope, LicenseCallback, ManagerConfig, NativeSessionId,
    OfflineLicenseHandle, ProvisionRequest, SchemeData, SessionManager, SystemId,
    control_thread,
};

pub const DOWNLOADED_KEY_SET: &[u8] = b"downloaded-ksid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedKeyRequest {
    pub session: Option<NativeSessionId>,
    pub key_set: Option<OfflineLicenseHandle>,
    pub init_data: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub key_type: KeyRequestType,
    pub parameters: HashMap<String, String>,
}

#[derive(Default)]
struct EngineState {
    next_id: u8,
    open: Vec<NativeSessionId>,
    opened_total: usize,
    closed: Vec<NativeSessionId>,
    provisioned: bool,
    open_failure: Option<EngineError>,
    key_response_failures: VecDeque<EngineError>,
    restore_failure: Option<EngineError>,
    restored: Vec<OfflineLicenseHandle>,
    key_requests: Vec<RecordedKeyRequest>,
    key_responses: Vec<Vec<u8>>,
    key_response_threads: Vec<ThreadId>,
    provision_responses: Vec<Vec<u8>>,
    key_status: HashMap<String, String>,
    properties: HashMap<String, String>,
    byte_properties: HashMap<String, Vec<u8>>,
    listener: Option<EngineEventListener>,
}

/**
    In-memory crypto engine. Provisioned unless told otherwise.
*/
pub struct FakeEngine {
    supported: Vec<SystemId>,
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            supported: vec![SystemId::Widevine, SystemId::PlayReady, SystemId::ClearKey],
            state: Mutex::new(EngineState {
                provisioned: true,
                ..Default::default()
            }),
        })
    }

    pub fn unprovisioned() -> Arc<Self> {
        let engine = Self::new();
        engine.state.lock().provisioned = false;
        engine
    }

    pub fn fail_open(&self, error: EngineError) {
        self.state.lock().open_failure = Some(error);
    }

    pub fn fail_next_key_response(&self, error: EngineError) {
        self.state.lock().key_response_failures.push_back(error);
    }

    pub fn fail_restore(&self, error: EngineError) {
        self.state.lock().restore_failure = Some(error);
    }

    pub fn set_key_status(&self, key: &str, value: &str) {
        self.state
            .lock()
            .key_status
            .insert(key.to_owned(), value.to_owned());
    }

    pub fn open_sessions(&self) -> Vec<NativeSessionId> {
        self.state.lock().open.clone()
    }

    pub fn opened_total(&self) -> usize {
        self.state.lock().opened_total
    }

    pub fn closed_sessions(&self) -> Vec<NativeSessionId> {
        self.state.lock().closed.clone()
    }

    pub fn key_requests(&self) -> Vec<RecordedKeyRequest> {
        self.state.lock().key_requests.clone()
    }

    pub fn key_responses(&self) -> Vec<Vec<u8>> {
        self.state.lock().key_responses.clone()
    }

    pub fn key_response_threads(&self) -> Vec<ThreadId> {
        self.state.lock().key_response_threads.clone()
    }

    pub fn restored(&self) -> Vec<OfflineLicenseHandle> {
        self.state.lock().restored.clone()
    }

    pub fn provision_responses(&self) -> Vec<Vec<u8>> {
        self.state.lock().provision_responses.clone()
    }

    pub fn is_provisioned(&self) -> bool {
        self.state.lock().provisioned
    }

    pub fn has_listener(&self) -> bool {
        self.state.lock().listener.is_some()
    }

    /**
        Raise an event through the registered listener, as the platform would.
        Returns `false` when no listener is registered.
    */
    pub fn fire(&self, session_id: &NativeSessionId, kind: EngineEventKind) -> bool {
        let listener = self.state.lock().listener.clone();
        match listener {
            Some(listener) => {
                listener(EngineEvent {
                    session_id: session_id.clone(),
                    kind,
                    extra: 0,
                    data: Vec::new(),
                });
                true
            }
            None => false,
        }
    }
}

impl CryptoEngine for FakeEngine {
    fn supports_scheme(&self, scheme: SystemId) -> bool {
        self.supported.contains(&scheme)
    }

    fn open_session(&self) -> Result<NativeSessionId, EngineError> {
        let mut state = self.state.lock();
        if !state.provisioned {
            return Err(EngineError::NotProvisioned);
        }
        if let Some(error) = state.open_failure.clone() {
            return Err(error);
        }
        state.next_id += 1;
        state.opened_total += 1;
        let id = NativeSessionId::new(vec![0xa0, state.next_id]);
        state.open.push(id.clone());
        Ok(id)
    }

    fn close_session(&self, session_id: &NativeSessionId) {
        let mut state = self.state.lock();
        state.open.retain(|id| id != session_id);
        state.closed.push(session_id.clone());
    }

    fn get_key_request(
        &self,
        scope: KeyScope<'_>,
        init_data: Option<&[u8]>,
        mime_type: Option<&str>,
        key_type: KeyRequestType,
        parameters: &HashMap<String, String>,
    ) -> Result<KeyRequest, EngineError> {
        let mut state = self.state.lock();
        let (session, key_set) = match scope {
            KeyScope::Session(id) => (Some(id.clone()), None),
            KeyScope::KeySet(handle) => (None, Some(handle.clone())),
        };
        state.key_requests.push(RecordedKeyRequest {
            session,
            key_set,
            init_data: init_data.map(<[u8]>::to_vec),
            mime_type: mime_type.map(str::to_owned),
            key_type,
            parameters: parameters.clone(),
        });
        Ok(KeyRequest {
            data: b"challenge".to_vec(),
            default_url: Some("https://license.test/".into()),
        })
    }

    fn provide_key_response(
        &self,
        _scope: KeyScope<'_>,
        response: &[u8],
    ) -> Result<Option<OfflineLicenseHandle>, EngineError> {
        let mut state = self.state.lock();
        if let Some(error) = state.key_response_failures.pop_front() {
            return Err(error);
        }
        state.key_responses.push(response.to_vec());
        state.key_response_threads.push(thread::current().id());
        let offline = state
            .key_requests
            .last()
            .is_some_and(|r| r.key_type == KeyRequestType::Offline);
        Ok(offline.then(|| OfflineLicenseHandle::new(DOWNLOADED_KEY_SET.to_vec())))
    }

    fn restore_keys(
        &self,
        _session_id: &NativeSessionId,
        license: &OfflineLicenseHandle,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if let Some(error) = state.restore_failure.clone() {
            return Err(error);
        }
        state.restored.push(license.clone());
        Ok(())
    }

    fn query_key_status(
        &self,
        _session_id: &NativeSessionId,
    ) -> Result<HashMap<String, String>, EngineError> {
        Ok(self.state.lock().key_status.clone())
    }

    fn get_provision_request(&self) -> ProvisionRequest {
        ProvisionRequest {
            data: b"provision".to_vec(),
            default_url: "https://provisioning.test/".into(),
        }
    }

    fn provide_provision_response(&self, response: &[u8]) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.provision_responses.push(response.to_vec());
        if response.is_empty() {
            return Err(EngineError::Generic("empty provisioning response".into()));
        }
        state.provisioned = true;
        Ok(())
    }

    fn property_string(&self, key: &str) -> Result<String, EngineError> {
        self.state
            .lock()
            .properties
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::Generic(format!("no property {key}")))
    }

    fn set_property_string(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.state
            .lock()
            .properties
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn property_bytes(&self, key: &str) -> Result<Vec<u8>, EngineError> {
        self.state
            .lock()
            .byte_properties
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::Generic(format!("no property {key}")))
    }

    fn set_property_bytes(&self, key: &str, value: &[u8]) -> Result<(), EngineError> {
        self.state
            .lock()
            .byte_properties
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn set_event_listener(&self, listener: Option<EngineEventListener>) {
        self.state.lock().listener = listener;
    }
}

/**
    License server stand-in. Answers every request unless a failure is set.
*/
#[derive(Default)]
pub struct FakeCallback {
    key_requests: AtomicUsize,
    provision_requests: AtomicUsize,
    key_failure: Mutex<Option<CallbackError>>,
    provision_failure: Mutex<Option<CallbackError>>,
    provision_response: Mutex<Option<Vec<u8>>>,
    key_request_threads: Mutex<Vec<ThreadId>>,
    gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

/**
    Holds the next key request inside the callback until opened.
*/
pub struct KeyRequestGate {
    entered: mpsc::Receiver<()>,
    open: mpsc::Sender<()>,
}

impl KeyRequestGate {
    /**
        Wait until the held request is inside the callback.
    */
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(5))
            .expect("key request never reached the callback");
    }

    pub fn open(&self) {
        self.open.send(()).unwrap();
    }
}

impl FakeCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_key_requests(&self, error: CallbackError) {
        *self.key_failure.lock() = Some(error);
    }

    pub fn fail_provision_requests(&self, error: CallbackError) {
        *self.provision_failure.lock() = Some(error);
    }

    pub fn provision_with(&self, response: Vec<u8>) {
        *self.provision_response.lock() = Some(response);
    }

    pub fn hold_next_key_request(&self) -> KeyRequestGate {
        let (entered_tx, entered) = mpsc::channel();
        let (open, open_rx) = mpsc::channel();
        *self.gate.lock() = Some((entered_tx, open_rx));
        KeyRequestGate { entered, open }
    }

    pub fn key_request_threads(&self) -> Vec<ThreadId> {
        self.key_request_threads.lock().clone()
    }

    pub fn key_requests(&self) -> usize {
        self.key_requests.load(Ordering::SeqCst)
    }

    pub fn provision_requests(&self) -> usize {
        self.provision_requests.load(Ordering::SeqCst)
    }
}

impl LicenseCallback for FakeCallback {
    fn execute_key_request(
        &self,
        _scheme: SystemId,
        request: &KeyRequest,
    ) -> Result<Vec<u8>, CallbackError> {
        self.key_requests.fetch_add(1, Ordering::SeqCst);
        self.key_request_threads.lock().push(thread::current().id());
        let gate = self.gate.lock().take();
        if let Some((entered, open)) = gate {
            entered.send(()).unwrap();
            open.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        if let Some(error) = self.key_failure.lock().clone() {
            return Err(error);
        }
        let mut response = b"license:".to_vec();
        response.extend_from_slice(&request.data);
        Ok(response)
    }

    fn execute_provision_request(
        &self,
        _scheme: SystemId,
        _request: &ProvisionRequest,
    ) -> Result<Vec<u8>, CallbackError> {
        self.provision_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.provision_failure.lock().clone() {
            return Err(error);
        }
        Ok(self
            .provision_response
            .lock()
            .clone()
            .unwrap_or_else(|| b"certificate".to_vec()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    KeysLoaded,
    KeysRestored,
    KeysRemoved,
    Error(DrmError),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Notification>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &Notification) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    pub fn errors(&self) -> Vec<DrmError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Notification::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventListener for RecordingListener {
    fn on_keys_loaded(&self) {
        self.events.lock().push(Notification::KeysLoaded);
    }

    fn on_session_manager_error(&self, error: &DrmError) {
        self.events.lock().push(Notification::Error(error.clone()));
    }

    fn on_keys_restored(&self) {
        self.events.lock().push(Notification::KeysRestored);
    }

    fn on_keys_removed(&self) {
        self.events.lock().push(Notification::KeysRemoved);
    }
}

/**
    A manager wired to fakes, running requests inline, plus the control loop
    that drives it.
*/
pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub callback: Arc<FakeCallback>,
    pub listener: Arc<RecordingListener>,
    pub manager: SessionManager,
    pub control: ControlThread,
    pub control_loop: ControlLoop,
}

impl Harness {
    pub fn new(scheme: SystemId, config: ManagerConfig) -> Self {
        Self::with_engine(FakeEngine::new(), scheme, config)
    }

    pub fn with_engine(engine: Arc<FakeEngine>, scheme: SystemId, config: ManagerConfig) -> Self {
        let callback = FakeCallback::new();
        let listener = RecordingListener::new();
        let manager = SessionManager::builder(scheme, engine.clone(), callback.clone())
            .config(config)
            .listener(listener.clone())
            .executor(Arc::new(InlineExecutor))
            .build()
            .unwrap();
        let (control, control_loop) = control_thread();
        Self {
            engine,
            callback,
            listener,
            manager,
            control,
            control_loop,
        }
    }

    pub fn widevine() -> Self {
        Self::new(SystemId::Widevine, ManagerConfig::default())
    }

    pub fn multi_session() -> Self {
        Self::new(
            SystemId::Widevine,
            ManagerConfig {
                multi_session: true,
                ..Default::default()
            },
        )
    }

    pub fn run(&mut self) -> usize {
        self.control_loop.run_until_idle()
    }
}

/**
    Drive `control_loop` until `done` holds, waiting on posts from other
    threads. Panics after a few seconds.
*/
pub fn run_until(control_loop: &mut ControlLoop, mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        control_loop.run_until_idle();
        if done() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("control loop never reached the expected state");
}

pub fn widevine_init(data: &[u8]) -> InitData {
    InitData::single(SchemeData::new(SystemId::Widevine, "video/mp4", data.to_vec()))
}
