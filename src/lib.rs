pub mod bgzf;
pub mod binning;
pub mod config;
pub mod error;
pub mod formats;
pub mod spans;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use formats::{BamFile, TwoBitFile};
pub use types::{ReadOptions, Region};
