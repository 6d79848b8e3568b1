use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use drm_core::SystemId;

use crate::error::EngineError;
use crate::mode::OfflineLicenseHandle;

/**
    Identifier of a native session opened by the crypto engine.
*/
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NativeSessionId(Vec<u8>);

impl NativeSessionId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NativeSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for NativeSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeSessionId({self})")
    }
}

/**
    Kind of license a key request asks for.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRequestType {
    Streaming,
    Offline,
    Release,
}

/**
    What a key request or key response applies to: an open native session,
    or (for releases) a persisted offline license.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope<'a> {
    Session(&'a NativeSessionId),
    KeySet(&'a OfflineLicenseHandle),
}

/**
    Opaque license request produced by the engine.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    pub data: Vec<u8>,
    pub default_url: Option<String>,
}

/**
    Opaque device provisioning request produced by the engine.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub data: Vec<u8>,
    pub default_url: String,
}

/**
    Asynchronous event kinds raised by the engine for a native session.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    ProvisionRequired,
    KeyRequired,
    KeyExpired,
    SessionReclaimed,
    VendorDefined(i32),
}

impl EngineEventKind {
    /**
        Map a platform event code (1 = provision required, 2 = key required,
        3 = key expired, 5 = session reclaimed) to a kind. Anything else is
        vendor defined.
    */
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::ProvisionRequired,
            2 => Self::KeyRequired,
            3 => Self::KeyExpired,
            5 => Self::SessionReclaimed,
            other => Self::VendorDefined(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub session_id: NativeSessionId,
    pub kind: EngineEventKind,
    pub extra: i32,
    pub data: Vec<u8>,
}

/**
    Process-wide event sink registered with the engine. May be called from
    any thread.
*/
pub type EngineEventListener = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/**
    The platform crypto engine consumed by the session manager.

    One engine instance is shared by every session of a manager. Native
    session handles returned by [`CryptoEngine::open_session`] are owned by
    exactly one session each.
*/
pub trait CryptoEngine: Send + Sync {
    fn supports_scheme(&self, scheme: SystemId) -> bool;

    fn open_session(&self) -> Result<NativeSessionId, EngineError>;

    fn close_session(&self, session_id: &NativeSessionId);

    fn get_key_request(
        &self,
        scope: KeyScope<'_>,
        init_data: Option<&[u8]>,
        mime_type: Option<&str>,
        key_type: KeyRequestType,
        parameters: &HashMap<String, String>,
    ) -> Result<KeyRequest, EngineError>;

    /**
        Apply a license server response. Offline licenses yield the key set
        id under which the engine persisted them.
    */
    fn provide_key_response(
        &self,
        scope: KeyScope<'_>,
        response: &[u8],
    ) -> Result<Option<OfflineLicenseHandle>, EngineError>;

    fn restore_keys(
        &self,
        session_id: &NativeSessionId,
        license: &OfflineLicenseHandle,
    ) -> Result<(), EngineError>;

    fn query_key_status(
        &self,
        session_id: &NativeSessionId,
    ) -> Result<HashMap<String, String>, EngineError>;

    fn get_provision_request(&self) -> ProvisionRequest;

    fn provide_provision_response(&self, response: &[u8]) -> Result<(), EngineError>;

    fn property_string(&self, key: &str) -> Result<String, EngineError>;

    fn set_property_string(&self, key: &str, value: &str) -> Result<(), EngineError>;

    fn property_bytes(&self, key: &str) -> Result<Vec<u8>, EngineError>;

    fn set_property_bytes(&self, key: &str, value: &[u8]) -> Result<(), EngineError>;

    /**
        Install or clear the single event listener.
    */
    fn set_event_listener(&self, listener: Option<EngineEventListener>);
}
