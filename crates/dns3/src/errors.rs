//! Error types for DNS3 alias resolution

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolverError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("resolver key is not valid hex: {0}")]
    InvalidKeyHex(#[from] hex::FromHexError),

    #[error("resolver key cannot change while a handle is open")]
    KeyAlreadyBound,

    #[error("no resolver key bound")]
    KeyNotBound,

    #[error("failed to load resolver library {path}: {reason}")]
    LibraryLoad { path: String, reason: String },

    #[error("resolver library refused to create a handle")]
    HandleCreationFailed,

    #[error("no active resolver handle")]
    NoActiveHandle,

    #[error("resolver handle has been closed")]
    HandleClosed,

    #[error("name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("request generation failed with code {0}")]
    GenerationFailed(i32),

    #[error("record decryption failed with code {0}")]
    DecryptionFailed(i32),

    #[error("deferred resolver task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ResolverError>;
