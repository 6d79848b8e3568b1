#![allow(clippy::doc_overindented_list_items)]

mod callback;
mod config;
mod control;
mod engine;
mod error;
mod executor;
mod manager;
mod mode;
mod pool;
mod provisioning;
mod selector;
mod session;

// Re-export shared DRM types from drm-core
pub use drm_core::{EncryptionScheme, InitData, SchemeData, SystemId};

pub use self::callback::{EventListener, LicenseCallback};
pub use self::config::ManagerConfig;
pub use self::control::{ControlLoop, ControlThread, control_thread};
pub use self::engine::{
    CryptoEngine, EngineEvent, EngineEventKind, EngineEventListener, KeyRequest, KeyRequestType,
    KeyScope, NativeSessionId, ProvisionRequest,
};
pub use self::error::{CallbackError, DrmError, DrmResult, EngineError};
pub use self::executor::{InlineExecutor, Job, RequestExecutor, RequestWorker};
pub use self::manager::{SessionManager, SessionManagerBuilder};
pub use self::mode::{Mode, ModeConfig, OfflineLicenseHandle};
pub use self::pool::SharingPolicy;
pub use self::selector::{Fingerprint, PlatformLevel, ResolvedInitData, SchemeSelector};
pub use self::session::{Session, SessionState};
