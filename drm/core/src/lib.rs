#![allow(clippy::doc_overindented_list_items)]

mod constants;
mod error;
mod init_data;
mod pssh;
mod types;

pub mod utils;

pub use self::constants::{
    CLEARKEY_SYSTEM_ID, COMMON_SYSTEM_ID, FAIRPLAY_SYSTEM_ID, PLAYREADY_SYSTEM_ID,
    WIDEVINE_SYSTEM_ID,
};
pub use self::error::{InitDataError, ParseError, PsshError};
pub use self::init_data::{InitData, SchemeData};
pub use self::pssh::PsshBox;
pub use self::types::{EncryptionScheme, SystemId};
pub use self::utils::{eq_ignore_ascii_case, trim_ascii};
