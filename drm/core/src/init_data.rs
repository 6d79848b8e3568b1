use crate::error::InitDataError;
use crate::types::{EncryptionScheme, SystemId};

/**
    Initialization data for one DRM scheme, as extracted from a container.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemeData {
    pub system_id: SystemId,
    /**
        Content type of the media the data belongs to, e.g. `video/mp4`.
    */
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl SchemeData {
    pub fn new(system_id: SystemId, mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            system_id,
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/**
    Per-scheme initialization data attached to a media unit.

    Holds at most one [`SchemeData`] per [`SystemId`] plus the encryption
    scheme the media declares, if any.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitData {
    scheme_type: Option<EncryptionScheme>,
    entries: Vec<SchemeData>,
}

impl InitData {
    pub fn new(
        scheme_type: Option<EncryptionScheme>,
        entries: impl IntoIterator<Item = SchemeData>,
    ) -> Result<Self, InitDataError> {
        let mut collected: Vec<SchemeData> = Vec::new();
        for entry in entries {
            if collected.iter().any(|e| e.system_id == entry.system_id) {
                return Err(InitDataError::DuplicateScheme(entry.system_id));
            }
            collected.push(entry);
        }
        Ok(Self {
            scheme_type,
            entries: collected,
        })
    }

    /**
        Init data with a single entry and no declared encryption scheme.
    */
    pub fn single(entry: SchemeData) -> Self {
        Self {
            scheme_type: None,
            entries: vec![entry],
        }
    }

    pub fn with_scheme_type(mut self, scheme_type: EncryptionScheme) -> Self {
        self.scheme_type = Some(scheme_type);
        self
    }

    /**
        Encryption scheme declared by the media. `None` means patternless
        AES-CTR is assumed.
    */
    pub fn scheme_type(&self) -> Option<&EncryptionScheme> {
        self.scheme_type.as_ref()
    }

    /**
        Exact lookup. No fallback is applied here.
    */
    pub fn get(&self, system_id: SystemId) -> Option<&SchemeData> {
        self.entries.iter().find(|e| e.system_id == system_id)
    }

    pub fn entries(&self) -> &[SchemeData] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
