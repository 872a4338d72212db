//! Error types for decoder operations.

use thiserror::Error;

/// Errors that can occur while decoding a MOBI container.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read past end of buffer")]
    BufferEnd,

    #[error("invalid parameter: {0}")]
    Param(&'static str),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("operation on uninitialized state: {0}")]
    Uninitialized(&'static str),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("DRM voucher expired")]
    DrmExpired,

    #[error("DRM key not found")]
    DrmKeyNotFound,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a `Corrupt` error with a formatted message.
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }
}
