//! Resource size registry bookkeeping.
//!
//! The game looks up expected resource sizes in a registry; an archive
//! that grows past its registered size crashes the loader. Every merge
//! that changes an archive therefore re-registers its size. The registry
//! itself is owned by a separate merger; this module maintains the
//! engine's view of it as a JSON map persisted under the merged logs
//! directory, and the final registry build folds it in.

use crate::error::Result;
use crate::settings::Settings;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registered resource sizes for merged archives, keyed by the game's
/// logical resource path.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SizeRegistry {
    entries: BTreeMap<String, u32>,
}

impl SizeRegistry {
    /// Load the registry from the merge pass's logs directory. A missing
    /// file is an empty registry, not an error.
    pub fn load(settings: &Settings) -> Result<Self> {
        let path = settings.size_registry_path();
        match std::fs::read_to_string(path.as_std_path()) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn get(&self, resource: &str) -> Option<u32> {
        self.entries.get(resource).copied()
    }

    pub fn set(&mut self, resource: impl Into<String>, size: u32) {
        self.entries.insert(resource.into(), size);
    }

    pub fn remove(&mut self, resource: &str) {
        self.entries.remove(resource);
    }

    /// Persist the registry, creating the logs directory if needed.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let path = settings.size_registry_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }
        write_atomic(&path, serde_json::to_string_pretty(&self.entries)?.as_bytes())
    }
}

/// Per-extension loader overhead added on top of the aligned file
/// length. Unlisted extensions get the plain resource overhead.
const EXT_OVERHEAD: &[(&str, usize)] = &[
    (".sarc", 0x168),
    (".ssarc", 0x168),
    (".bgdata", 0x20),
    (".bgsvdata", 0x20),
];

const DEFAULT_OVERHEAD: usize = 0x20;

/// Registered size of an uncompressed resource: length rounded up to the
/// loader's 32-byte allocation granularity plus the extension's fixed
/// header overhead.
pub fn calc_size(uncompressed_len: usize, ext: &str) -> u32 {
    let overhead = EXT_OVERHEAD
        .iter()
        .find(|(known, _)| *known == ext)
        .map_or(DEFAULT_OVERHEAD, |(_, overhead)| *overhead);
    let aligned = uncompressed_len.div_ceil(32) * 32;
    (aligned + overhead) as u32
}

fn write_atomic(path: &Utf8Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(tmp.as_std_path(), data)?;
    std::fs::rename(tmp.as_std_path(), path.as_std_path())?;
    Ok(())
}
