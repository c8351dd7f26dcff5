//! Stock baseline loading, memoization, and modedness detection.
//!
//! The stock gamedata and savedata archives live compressed inside the
//! game's boot package. Loading and decompressing them is expensive, and
//! every differ needs them, so [`BaselineCache`] loads the pair at most
//! once per process and hands out a shared immutable [`Baseline`].
//! Alongside the parsed archives it keeps one name -> content-hash index
//! per archive, which is all modedness detection needs.

use crate::consolidate::savedata_buckets;
use crate::error::{Error, Result};
use crate::settings::{normalize_entry_name, GAMEDATA_ENTRY, SAVEDATA_ENTRY};
use crate::utils;
use camino::{Utf8Path, Utf8PathBuf};
use korok_formats::Pack;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The unmodified stock gamedata and savedata tables.
///
/// Loaded once, read-only for the process lifetime. Every consumer takes
/// it by shared reference; nothing in this crate mutates it after
/// construction.
pub struct Baseline {
    gamedata: Pack,
    savedata: Pack,
    gamedata_hashes: HashMap<String, u64>,
    savedata_hashes: HashMap<String, u64>,
}

impl Baseline {
    /// Load the stock baseline from the boot package at `bootup_path`.
    ///
    /// Any failure here — missing boot package, missing sub-entries,
    /// corrupt archives — is fatal for the merge pass: the game
    /// installation is presumed broken.
    pub fn load(bootup_path: &Utf8Path) -> Result<Self> {
        let bytes = std::fs::read(bootup_path.as_std_path())
            .map_err(|err| unavailable(bootup_path, err))?;
        let bootup = Pack::from_binary(bytes).map_err(|err| unavailable(bootup_path, err))?;

        let gamedata = load_sub_archive(&bootup, GAMEDATA_ENTRY, bootup_path)?;
        let savedata = load_sub_archive(&bootup, SAVEDATA_ENTRY, bootup_path)?;
        let gamedata_hashes = hash_index(&gamedata);
        let savedata_hashes = hash_index(&savedata);

        tracing::debug!(
            "Baseline loaded: {} gamedata buckets, {} savedata buckets",
            gamedata.len(),
            savedata.len()
        );

        Ok(Self {
            gamedata,
            savedata,
            gamedata_hashes,
            savedata_hashes,
        })
    }

    /// The stock gamedata archive.
    pub fn gamedata(&self) -> &Pack {
        &self.gamedata
    }

    /// The stock savedata archive.
    pub fn savedata(&self) -> &Pack {
        &self.savedata
    }

    /// Normalized entry name -> xxh64 content hash for stock gamedata.
    pub fn gamedata_hashes(&self) -> &HashMap<String, u64> {
        &self.gamedata_hashes
    }

    /// Normalized entry name -> xxh64 content hash for stock savedata.
    pub fn savedata_hashes(&self) -> &HashMap<String, u64> {
        &self.savedata_hashes
    }
}

/// Process-scoped memoization of the stock [`Baseline`].
///
/// The first call to [`get`](Self::get) loads from disk; later calls
/// return the cached value. The lock makes the load race-free if callers
/// ever share the cache across threads; this crate otherwise assumes one
/// merge pass at a time.
pub struct BaselineCache {
    bootup_path: Utf8PathBuf,
    cached: Mutex<Option<Arc<Baseline>>>,
}

impl BaselineCache {
    /// Create a cache for the boot package at the given path.
    pub fn new(bootup_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            bootup_path: bootup_path.into(),
            cached: Mutex::new(None),
        }
    }

    /// Get the baseline, loading it on first use.
    pub fn get(&self) -> Result<Arc<Baseline>> {
        let mut guard = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(baseline) = guard.as_ref() {
            return Ok(Arc::clone(baseline));
        }
        let baseline = Arc::new(Baseline::load(&self.bootup_path)?);
        *guard = Some(Arc::clone(&baseline));
        Ok(baseline)
    }
}

/// Whether a candidate gamedata archive differs from stock.
///
/// An entry counts as modified if its name is absent from the stock
/// index or its content hash differs.
pub fn is_gamedata_modded(candidate: &Pack, baseline: &Baseline) -> bool {
    candidate.files().any(|(name, data)| {
        baseline
            .gamedata_hashes
            .get(normalize_entry_name(name))
            .is_none_or(|&hash| hash != utils::content_hash(data))
    })
}

/// Whether a candidate savedata archive differs from stock.
///
/// The two trailer buckets are format bookkeeping and excluded from the
/// comparison.
pub fn is_savedata_modded(candidate: &Pack, baseline: &Baseline) -> Result<bool> {
    let buckets = savedata_buckets(candidate)?;
    let end = buckets.len().saturating_sub(2);
    Ok(buckets[..end].iter().any(|(name, data)| {
        baseline
            .savedata_hashes
            .get(normalize_entry_name(name))
            .is_none_or(|&hash| hash != utils::content_hash(data))
    }))
}

fn load_sub_archive(bootup: &Pack, entry: &str, bootup_path: &Utf8Path) -> Result<Pack> {
    let compressed = bootup.get(entry).ok_or_else(|| Error::BaselineUnavailable {
        path: bootup_path.to_path_buf(),
        reason: format!("missing sub-entry '{entry}'"),
    })?;
    let bytes =
        utils::decompress(compressed).map_err(|err| unavailable(bootup_path, err))?;
    Pack::from_binary(bytes).map_err(|err| unavailable(bootup_path, err))
}

fn hash_index(pack: &Pack) -> HashMap<String, u64> {
    pack.files()
        .map(|(name, data)| {
            (
                normalize_entry_name(name).to_string(),
                utils::content_hash(data),
            )
        })
        .collect()
}

fn unavailable(path: &Utf8Path, err: impl std::fmt::Display) -> Error {
    Error::BaselineUnavailable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use korok_formats::{Endian, PackWriter};

    #[test]
    fn test_load_and_memoize() {
        let fixture = GameFixture::new(Endian::Little);
        let cache = BaselineCache::new(fixture.bootup_path());

        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.gamedata().len(), 1);
        assert_eq!(first.savedata().len(), 3);
    }

    #[test]
    fn test_missing_bootup_is_fatal() {
        let cache = BaselineCache::new("/nonexistent/Pack/Bootup.pack");
        assert!(matches!(
            cache.get(),
            Err(Error::BaselineUnavailable { .. })
        ));
    }

    #[test]
    fn test_missing_sub_entry_is_fatal() {
        let fixture = GameFixture::new(Endian::Little);
        let bytes = std::fs::read(fixture.bootup_path().as_std_path()).unwrap();
        let bootup = Pack::from_binary(bytes).unwrap();
        let mut writer = PackWriter::from_pack(&bootup);
        writer.files.remove(GAMEDATA_ENTRY);
        std::fs::write(fixture.bootup_path().as_std_path(), writer.to_binary()).unwrap();

        let cache = BaselineCache::new(fixture.bootup_path());
        assert!(matches!(
            cache.get(),
            Err(Error::BaselineUnavailable { .. })
        ));
    }

    #[test]
    fn test_gamedata_modded_detection() {
        let fixture = GameFixture::new(Endian::Little);
        let baseline = Baseline::load(&fixture.bootup_path()).unwrap();

        assert!(!is_gamedata_modded(baseline.gamedata(), &baseline));

        let mut tables = stock_gamedata_tables();
        tables
            .get_mut("Bool")
            .unwrap()
            .push(flag_entry("NewFlag", 9));
        let modded = gamedata_pack(&tables, Endian::Little);
        assert!(is_gamedata_modded(&modded, &baseline));
    }

    #[test]
    fn test_savedata_modded_ignores_trailers() {
        let fixture = GameFixture::new(Endian::Little);
        let baseline = Baseline::load(&fixture.bootup_path()).unwrap();

        assert!(!is_savedata_modded(baseline.savedata(), &baseline).unwrap());

        // Changing only the trailer buckets is not a modification.
        let mut writer = PackWriter::from_pack(baseline.savedata());
        writer
            .files
            .insert("/saveformat_2.bgsvdata".into(), b"different trailer".to_vec());
        let trailer_only = korok_formats::Pack::from_binary(writer.to_binary()).unwrap();
        assert!(!is_savedata_modded(&trailer_only, &baseline).unwrap());

        let modded = savedata_pack(&[save_entry(1, "a"), save_entry(99, "x")], Endian::Little);
        assert!(is_savedata_modded(&modded, &baseline).unwrap());
    }
}
