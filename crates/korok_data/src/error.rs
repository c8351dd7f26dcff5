//! Error types for diff and merge operations.
//!
//! The distinction that matters for callers is *whose* data failed:
//! [`Error::BaselineUnavailable`] means the stock game files are missing
//! or corrupt and the whole merge pass must abort, while
//! [`Error::ModDataUnreadable`] is scoped to a single mod — the merge
//! pipeline logs it and continues with the remaining mods.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while diffing or merging game data tables.
#[derive(Error, Debug)]
pub enum Error {
    /// The stock boot package or one of its expected sub-entries is
    /// missing or corrupt. Fatal: the game installation is presumed
    /// broken.
    #[error("stock game data unavailable at '{path}': {reason}")]
    BaselineUnavailable { path: Utf8PathBuf, reason: String },

    /// A single mod's container or diff log is malformed. The mod's
    /// contribution is skipped; other mods still merge.
    #[error("unreadable mod data at '{path}': {reason}")]
    ModDataUnreadable { path: Utf8PathBuf, reason: String },

    /// A binary blob does not conform to the expected schema.
    #[error("format error: {0}")]
    Format(#[from] korok_formats::Error),

    /// An entry is missing its identity field (`DataName` / `HashValue`)
    /// or carries it with the wrong type. Never dropped silently.
    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    /// Filesystem I/O failed (reading packs, writing logs, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON (diff logs, size registry).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
