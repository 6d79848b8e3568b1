use thiserror::Error;

use drm_core::SystemId;

/**
    Failures reported by the platform crypto engine.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("device is not provisioned")]
    NotProvisioned,
    #[error("denied by server: {0}")]
    DeniedByServer(String),
    #[error("{0}")]
    Generic(String),
}

/**
    Failures from the license/provisioning transport.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with status {status}: {message}")]
    Server { status: u16, message: String },
}

/**
    Errors surfaced by the session manager, either returned from its public
    operations or delivered through [`crate::EventListener`].
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrmError {
    // ── Construction ──────────────────────────────────────────────────
    #[error("unsupported DRM scheme: {0}")]
    UnsupportedScheme(SystemId),
    #[error("failed to start request worker: {0}")]
    Worker(String),

    // ── Runtime, delivered through the event sink ────────────────────
    #[error("device is not provisioned")]
    NotProvisioned,
    #[error("key request failed: {0}")]
    KeyRequestFailed(String),
    #[error("provision request failed: {0}")]
    ProvisionRequestFailed(String),
    #[error("license keys expired")]
    KeysExpired,
    #[error("media does not carry init data for {0}")]
    MissingSchemeData(SystemId),
    #[error("crypto engine error: {0}")]
    Engine(EngineError),

    // ── Contract violations ───────────────────────────────────────────
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl DrmError {
    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }
}

impl From<EngineError> for DrmError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotProvisioned => Self::NotProvisioned,
            other => Self::Engine(other),
        }
    }
}

/**
    Type alias for results that may return a [`DrmError`].
*/
pub type DrmResult<T> = std::result::Result<T, DrmError>;
