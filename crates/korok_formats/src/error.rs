//! Error types for the pack and value codecs.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while decoding or encoding a binary blob.
#[derive(Error, Debug)]
pub enum Error {
    /// The blob does not start with the expected magic bytes.
    #[error("invalid magic: {0:02x?}")]
    InvalidMagic(Vec<u8>),

    /// The byte-order mark is neither of the two recognized values.
    #[error("invalid byte-order mark: {0:#06x}")]
    InvalidByteOrderMark(u16),

    /// The format version is not supported by this codec.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// A length or offset points past the end of the blob.
    #[error("truncated data: needed {needed} bytes at offset {offset}, had {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A node tag byte is not a known [`Value`](crate::Value) variant.
    #[error("unknown value tag: {0:#04x}")]
    UnknownTag(u8),

    /// An entry name or string payload is not valid UTF-8.
    #[error("invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Failed to parse or emit the textual projection of a value.
    #[error("text form error: {0}")]
    Text(#[from] serde_json::Error),
}
