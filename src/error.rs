use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CographError>;

#[derive(Debug, Error)]
pub enum CographError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic 0x{0:08X}")]
    BadMagic(u32),
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("image truncated: {0}")]
    Truncated(String),
    #[error("offset out of range: {0}")]
    OutOfRange(String),
    #[error("unterminated string at offset {0}")]
    Unterminated(u32),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid UTF-8 at offset {0}")]
    InvalidUtf8(u32),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("builder state error: {0}")]
    BuilderState(&'static str),
}
