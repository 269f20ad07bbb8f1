#![allow(clippy::doc_overindented_list_items)]

mod error;
mod init_data;
mod scheme;
mod utils;

pub use self::error::{InitDataError, ParseError};
pub use self::init_data::{InitData, PsshEntry};
pub use self::scheme::{
    DEFAULT_PRIORITY, PLAYREADY_SYSTEM_ID, ProtectionScheme, WIDEVINE_SYSTEM_ID,
};
