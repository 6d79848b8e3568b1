use core::fmt;
use core::str::FromStr;

use crate::error::ParseError;
use crate::utils::{bytes_equal, eq_ignore_ascii_case, trim_ascii};

/**
    DRM content protection system identifier.

    Recognizes the major DRM systems by their DASH-IF registered UUIDs.
    Unrecognized system IDs are captured in the `Unknown` variant.

    `Common` is the W3C common PSSH id. It never names a system a session
    manager can be built for, but init data tagged with it is usable by
    ClearKey.

    Reference: <https://dashif.org/identifiers/content_protection/>
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemId {
    Widevine,
    PlayReady,
    FairPlay,
    ClearKey,
    Common,
    Unknown([u8; 16]),
}

impl SystemId {
    /**
        Identify a DRM system from its 16-byte UUID.
    */
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        use crate::constants::*;
        if bytes_equal(&bytes, &WIDEVINE_SYSTEM_ID) {
            Self::Widevine
        } else if bytes_equal(&bytes, &PLAYREADY_SYSTEM_ID) {
            Self::PlayReady
        } else if bytes_equal(&bytes, &FAIRPLAY_SYSTEM_ID) {
            Self::FairPlay
        } else if bytes_equal(&bytes, &CLEARKEY_SYSTEM_ID) {
            Self::ClearKey
        } else if bytes_equal(&bytes, &COMMON_SYSTEM_ID) {
            Self::Common
        } else {
            Self::Unknown(bytes)
        }
    }

    /**
        Return the raw 16-byte UUID for this system.
    */
    pub const fn to_bytes(self) -> [u8; 16] {
        use crate::constants::*;
        match self {
            Self::Widevine => WIDEVINE_SYSTEM_ID,
            Self::PlayReady => PLAYREADY_SYSTEM_ID,
            Self::FairPlay => FAIRPLAY_SYSTEM_ID,
            Self::ClearKey => CLEARKEY_SYSTEM_ID,
            Self::Common => COMMON_SYSTEM_ID,
            Self::Unknown(bytes) => bytes,
        }
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Widevine => "Widevine",
            Self::PlayReady => "PlayReady",
            Self::FairPlay => "FairPlay",
            Self::ClearKey => "ClearKey",
            Self::Common => "Common",
            Self::Unknown(_) => "Unknown",
        }
    }

    /**
        Parse a UUID string into a `SystemId`.

        Accepts both hyphenated and plain formats, hex digits in any case.
    */
    pub const fn from_uuid(s: &[u8]) -> Option<Self> {
        use crate::utils::hex_digit;

        let mut bytes = [0u8; 16];
        let mut bi = 0;
        let mut si = 0;

        while si < s.len() {
            if s[si] == b'-' {
                si += 1;
                continue;
            }
            if bi >= 16 || si + 1 >= s.len() {
                return None;
            }
            let (Some(hi), Some(lo)) = (hex_digit(s[si]), hex_digit(s[si + 1])) else {
                return None;
            };
            bytes[bi] = (hi << 4) | lo;
            bi += 1;
            si += 2;
        }

        if bi != 16 {
            return None;
        }

        Some(Self::from_bytes(bytes))
    }

    /**
        Format as a standard UUID string (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`).
    */
    pub fn to_uuid(self) -> String {
        let b = self.to_bytes();
        format!(
            "{}-{}-{}-{}-{}",
            hex::encode(&b[0..4]),
            hex::encode(&b[4..6]),
            hex::encode(&b[6..8]),
            hex::encode(&b[8..10]),
            hex::encode(&b[10..16]),
        )
    }

    /**
        Returns `true` for the common PSSH id, which is a placeholder
        rather than a DRM system.
    */
    pub const fn is_common(self) -> bool {
        matches!(self, Self::Common)
    }

    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.to_name(), self.to_uuid())
    }
}

impl From<[u8; 16]> for SystemId {
    fn from(bytes: [u8; 16]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl FromStr for SystemId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uuid(s.trim().as_bytes()).ok_or_else(|| ParseError {
            kind: "system id",
            value: s.to_owned(),
        })
    }
}

/**
    Common Encryption scheme declared by the media (ISO/IEC 23001-7 `schm` box).

    `Cenc` is patternless AES-CTR. The other named schemes use AES-CBC or
    pattern encryption and need a sufficiently capable platform.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EncryptionScheme {
    Cenc,
    Cbc1,
    Cbcs,
    Cens,
    Other(String),
}

impl EncryptionScheme {
    pub fn from_name(name: &[u8]) -> Self {
        let name = trim_ascii(name);
        if eq_ignore_ascii_case(name, b"cenc") {
            Self::Cenc
        } else if eq_ignore_ascii_case(name, b"cbc1") {
            Self::Cbc1
        } else if eq_ignore_ascii_case(name, b"cbcs") {
            Self::Cbcs
        } else if eq_ignore_ascii_case(name, b"cens") {
            Self::Cens
        } else {
            Self::Other(String::from_utf8_lossy(name).into_owned())
        }
    }

    pub fn to_name(&self) -> &str {
        match self {
            Self::Cenc => "cenc",
            Self::Cbc1 => "cbc1",
            Self::Cbcs => "cbcs",
            Self::Cens => "cens",
            Self::Other(name) => name,
        }
    }

    /**
        Returns `true` for the AES-CBC and pattern encryption schemes.
    */
    pub const fn is_pattern_or_cbc(&self) -> bool {
        matches!(self, Self::Cbc1 | Self::Cbcs | Self::Cens)
    }
}

impl fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

impl FromStr for EncryptionScheme {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if trim_ascii(s.as_bytes()).is_empty() {
            return Err(ParseError {
                kind: "encryption scheme",
                value: s.to_owned(),
            });
        }
        Ok(Self::from_name(s.as_bytes()))
    }
}
