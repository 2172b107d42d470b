use std::io;
use std::path::PathBuf;

/// 索引加载的致命错误。任何一种都意味着本次运行无法继续。
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index file '{path}' not found")]
    Missing { path: PathBuf },

    #[error("cannot read index file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("index file '{path}' is truncated or corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("'{path}' is not a bpmap index (bad magic)")]
    BadMagic { path: PathBuf },

    #[error("index '{path}' has format version {found}, this build reads version {expected}")]
    Version { path: PathBuf, found: u32, expected: u32 },
}
