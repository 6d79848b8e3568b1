use core::fmt;
use core::str::FromStr;

use drm_core::{ParseError, eq_ignore_ascii_case, trim_ascii};

use crate::error::{DrmError, DrmResult};

/**
    Determines what a session does once acquired.
*/
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Load (and renew when needed) a license for playback. Streaming unless
    /// an offline license is configured, in which case it is restored.
    #[default]
    Playback,
    /// Restore an offline license so its status can be queried.
    Query,
    /// Download a new offline license, or renew the configured one.
    Download,
    /// Release the configured offline license.
    Release,
}

impl Mode {
    pub const fn requires_offline_license(self) -> bool {
        matches!(self, Self::Query | Self::Release)
    }

    pub const fn from_name(name: &[u8]) -> Option<Self> {
        let name = trim_ascii(name);
        match name.len() {
            5 if eq_ignore_ascii_case(name, b"query") => Some(Self::Query),
            7 if eq_ignore_ascii_case(name, b"release") => Some(Self::Release),
            8 if eq_ignore_ascii_case(name, b"playback") => Some(Self::Playback),
            8 if eq_ignore_ascii_case(name, b"download") => Some(Self::Download),
            _ => None,
        }
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Query => "query",
            Self::Download => "download",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s.as_bytes()).ok_or_else(|| ParseError {
            kind: "mode",
            value: s.to_owned(),
        })
    }
}

/**
    Key set id of a persisted offline license.
*/
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OfflineLicenseHandle(Vec<u8>);

impl OfflineLicenseHandle {
    pub fn new(key_set_id: impl Into<Vec<u8>>) -> Self {
        Self(key_set_id.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OfflineLicenseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for OfflineLicenseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OfflineLicenseHandle({self})")
    }
}

/**
    Mode plus the offline license it operates on.

    Only constructible in a valid combination. The manager swaps it as a
    whole, and only while no session is live.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeConfig {
    mode: Mode,
    offline_license: Option<OfflineLicenseHandle>,
}

impl ModeConfig {
    pub fn new(mode: Mode, offline_license: Option<OfflineLicenseHandle>) -> DrmResult<Self> {
        if mode.requires_offline_license() && offline_license.is_none() {
            return Err(DrmError::illegal_state(format!(
                "{mode} mode requires an offline license"
            )));
        }
        Ok(Self {
            mode,
            offline_license,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn offline_license(&self) -> Option<&OfflineLicenseHandle> {
        self.offline_license.as_ref()
    }
}
