use drm_core::{InitData, PsshBox, SchemeData, SystemId};
use serde::Deserialize;
use tracing::trace;

/**
    Content type ClearKey expects for MP4 media on older platforms.
*/
const CENC_MIME_TYPE: &str = "cenc";

/**
    Platform capability tier of the device the engine runs on.

    Gates behavior that older engines lack or implement differently.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct PlatformLevel(pub u32);

impl PlatformLevel {
    /// Tier at which AES-CBC and pattern encryption become supported.
    pub const PATTERN_ENCRYPTION: Self = Self(24);
    /// Below this tier the engine wants the payload inside the `pssh` box.
    pub const RAW_PSSH: Self = Self(21);
    /// Below this tier ClearKey only accepts `cenc` as the MP4 content type.
    pub const CLEARKEY_MP4_MIME: Self = Self(26);
    pub const CURRENT: Self = Self(34);
}

impl Default for PlatformLevel {
    fn default() -> Self {
        Self::CURRENT
    }
}

/**
    Init data bytes and content type after scheme selection and legacy
    adjustments, exactly as they will be handed to the engine.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedInitData {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/**
    Identity of a session for pooling: the scheme plus the resolved init data.
    Offline modes restore from a license handle and carry no init data.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub scheme: SystemId,
    pub init_data: Option<ResolvedInitData>,
}

/**
    Picks the init data entry applicable to one target scheme.
*/
#[derive(Debug, Clone, Copy)]
pub struct SchemeSelector {
    scheme: SystemId,
    platform: PlatformLevel,
}

impl SchemeSelector {
    pub fn new(scheme: SystemId, platform: PlatformLevel) -> Self {
        Self { scheme, platform }
    }

    pub fn scheme(&self) -> SystemId {
        self.scheme
    }

    /**
        Entry for the target scheme. ClearKey falls back to the common PSSH
        entry when the media has none of its own.
    */
    pub fn scheme_data<'a>(&self, init: &'a InitData) -> Option<&'a SchemeData> {
        init.get(self.scheme).or_else(|| {
            if self.scheme == SystemId::ClearKey {
                init.get(SystemId::Common)
            } else {
                None
            }
        })
    }

    /**
        True when `init` has an entry for the target scheme and its declared
        encryption scheme is usable on this platform. A missing declaration
        means patternless AES-CTR, which is always supported. Unrecognized
        declarations are assumed supported.
    */
    pub fn can_acquire(&self, init: &InitData) -> bool {
        if self.scheme_data(init).is_none() {
            return false;
        }
        match init.scheme_type() {
            Some(scheme_type) if scheme_type.is_pattern_or_cbc() => {
                self.platform >= PlatformLevel::PATTERN_ENCRYPTION
            }
            _ => true,
        }
    }

    /**
        Resolve the bytes and content type to hand to the engine.
    */
    pub fn resolve(&self, init: &InitData) -> Option<ResolvedInitData> {
        let entry = self.scheme_data(init)?;
        Some(ResolvedInitData {
            data: self.engine_init_data(entry),
            mime_type: self.engine_mime_type(entry),
        })
    }

    fn engine_init_data(&self, entry: &SchemeData) -> Vec<u8> {
        if self.platform < PlatformLevel::RAW_PSSH
            && let Some(inner) = PsshBox::scheme_specific_data(&entry.data, self.scheme)
        {
            trace!(scheme = %self.scheme, "using pssh payload for legacy engine");
            return inner;
        }
        entry.data.clone()
    }

    fn engine_mime_type(&self, entry: &SchemeData) -> String {
        let is_mp4 = entry.mime_type == "video/mp4" || entry.mime_type == "audio/mp4";
        if self.platform < PlatformLevel::CLEARKEY_MP4_MIME
            && self.scheme == SystemId::ClearKey
            && is_mp4
        {
            return CENC_MIME_TYPE.to_owned();
        }
        entry.mime_type.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drm_core::EncryptionScheme;
    use rstest::rstest;

    fn widevine_init() -> InitData {
        InitData::single(SchemeData::new(SystemId::Widevine, "video/mp4", b"b1".to_vec()))
    }

    #[test]
    fn exact_scheme_entry() {
        let selector = SchemeSelector::new(SystemId::Widevine, PlatformLevel::CURRENT);
        let resolved = selector.resolve(&widevine_init()).unwrap();
        assert_eq!(resolved.data, b"b1");
        assert_eq!(resolved.mime_type, "video/mp4");
    }

    #[test]
    fn missing_scheme_entry() {
        let selector = SchemeSelector::new(SystemId::PlayReady, PlatformLevel::CURRENT);
        assert!(!selector.can_acquire(&widevine_init()));
        assert!(selector.resolve(&widevine_init()).is_none());
    }

    #[test]
    fn clearkey_falls_back_to_common() {
        let init = InitData::single(SchemeData::new(SystemId::Common, "video/mp4", b"c".to_vec()));
        let clearkey = SchemeSelector::new(SystemId::ClearKey, PlatformLevel::CURRENT);
        assert!(clearkey.can_acquire(&init));
        assert_eq!(clearkey.resolve(&init).unwrap().data, b"c");

        let widevine = SchemeSelector::new(SystemId::Widevine, PlatformLevel::CURRENT);
        assert!(!widevine.can_acquire(&init));
    }

    #[test]
    fn clearkey_prefers_its_own_entry() {
        let init = InitData::new(
            None,
            [
                SchemeData::new(SystemId::Common, "video/mp4", b"common".to_vec()),
                SchemeData::new(SystemId::ClearKey, "video/mp4", b"own".to_vec()),
            ],
        )
        .unwrap();
        let selector = SchemeSelector::new(SystemId::ClearKey, PlatformLevel::CURRENT);
        assert_eq!(selector.resolve(&init).unwrap().data, b"own");
    }

    #[rstest]
    #[case(None, 18, true)]
    #[case(Some(EncryptionScheme::Cenc), 18, true)]
    #[case(Some(EncryptionScheme::Cbcs), 23, false)]
    #[case(Some(EncryptionScheme::Cbcs), 24, true)]
    #[case(Some(EncryptionScheme::Cbc1), 23, false)]
    #[case(Some(EncryptionScheme::Cens), 30, true)]
    #[case(Some(EncryptionScheme::Other("xyz1".into())), 18, true)]
    fn encryption_scheme_support(
        #[case] scheme_type: Option<EncryptionScheme>,
        #[case] level: u32,
        #[case] expected: bool,
    ) {
        let mut init = widevine_init();
        if let Some(scheme_type) = scheme_type {
            init = init.with_scheme_type(scheme_type);
        }
        let selector = SchemeSelector::new(SystemId::Widevine, PlatformLevel(level));
        assert_eq!(selector.can_acquire(&init), expected);
    }

    #[test]
    fn legacy_platform_unwraps_pssh() {
        let atom = PsshBox::new(SystemId::Widevine, vec![], b"inner".to_vec()).to_bytes();
        let init = InitData::single(SchemeData::new(SystemId::Widevine, "video/mp4", atom.clone()));

        let legacy = SchemeSelector::new(SystemId::Widevine, PlatformLevel(19));
        assert_eq!(legacy.resolve(&init).unwrap().data, b"inner");

        let modern = SchemeSelector::new(SystemId::Widevine, PlatformLevel::CURRENT);
        assert_eq!(modern.resolve(&init).unwrap().data, atom);
    }

    #[test]
    fn legacy_platform_keeps_non_pssh_bytes() {
        let legacy = SchemeSelector::new(SystemId::Widevine, PlatformLevel(19));
        assert_eq!(legacy.resolve(&widevine_init()).unwrap().data, b"b1");
    }

    #[rstest]
    #[case(SystemId::ClearKey, "video/mp4", 25, "cenc")]
    #[case(SystemId::ClearKey, "audio/mp4", 25, "cenc")]
    #[case(SystemId::ClearKey, "video/webm", 25, "video/webm")]
    #[case(SystemId::ClearKey, "video/mp4", 26, "video/mp4")]
    #[case(SystemId::Widevine, "video/mp4", 25, "video/mp4")]
    fn clearkey_mime_type_on_old_platforms(
        #[case] scheme: SystemId,
        #[case] mime: &str,
        #[case] level: u32,
        #[case] expected: &str,
    ) {
        let init = InitData::single(SchemeData::new(scheme, mime, b"x".to_vec()));
        let selector = SchemeSelector::new(scheme, PlatformLevel(level));
        assert_eq!(selector.resolve(&init).unwrap().mime_type, expected);
    }
}
