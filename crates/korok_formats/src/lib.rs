//! Binary codecs for the Korok merge toolkit.
//!
//! This crate provides the two container formats the merge engine works
//! with, independent of any merge semantics:
//!
//! - [`pack`] — a flat archive of named byte blobs ("pack archive"), used
//!   for the boot package and the gamedata/savedata sub-archives.
//! - [`value`] — a hierarchical map/array/scalar structure ([`Value`])
//!   with a binary encoding and a stable textual projection used for
//!   on-disk diff logs.
//!
//! Both binary forms are endianness-parameterized via [`Endian`], since
//! the target hardware dictates the byte order of every blob in the
//! pipeline. Readers detect the byte order from a byte-order mark in the
//! header; writers take the flag explicitly.

pub mod error;
pub mod pack;
pub mod value;

pub use error::{Error, Result};
pub use pack::{Pack, PackWriter};
pub use value::Value;

/// Byte order of a binary blob.
///
/// Mirrors the target hardware: the legacy console target is big-endian,
/// the current one little-endian. Every `to_binary` in this crate takes
/// one of these; every `from_binary` detects it from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}
