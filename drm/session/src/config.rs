use std::collections::HashMap;

use serde::Deserialize;

use crate::pool::SharingPolicy;
use crate::selector::PlatformLevel;

/**
    Construction-time settings of a [`crate::SessionManager`].
*/
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Allow one native session per distinct init data instead of sharing a
    /// single session between all tracks.
    pub multi_session: bool,
    pub platform_level: PlatformLevel,
    /// Sent with every key request.
    pub key_request_parameters: HashMap<String, String>,
}

impl ManagerConfig {
    pub fn sharing_policy(&self) -> SharingPolicy {
        SharingPolicy::from_multi_session(self.multi_session)
    }
}
