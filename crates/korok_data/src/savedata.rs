//! Savedata schema registry diffing and merging.
//!
//! Savedata entries are identified by their 32-bit `HashValue`. Diffing
//! is identity-based: a mod's diff records the entries whose hashes are
//! absent from stock (`add`) and the stock hashes the mod drops (`del`).
//! An entry that keeps its hash but changes other fields does not show
//! up in the diff; the hash is the schema identity and the rest of the
//! entry is derived from it.
//!
//! Consolidation runs the per-mod diffs newest-first: the last installed
//! mod's entry wins when two mods add the same hash. Applying the diff
//! keys stock entries by hash, overlays `add`, removes `del`, then
//! re-chunks into bucket files of at most [`SAVEDATA_BUCKET_MAX`]
//! entries. The stock archive's two trailer buckets carry format
//! bookkeeping the merge never touches; they are copied verbatim and
//! renumbered to follow the rebuilt entry buckets.

use crate::baseline::{is_savedata_modded, Baseline};
use crate::consolidate::{
    consolidate_savedata, entry_hash, savedata_buckets, SAVEDATA_BUCKET_MAX,
};
use crate::error::{Error, Result};
use crate::merger::{sub_archive, Merger};
use crate::settings::{Settings, SAVEDATA_ENTRY, SAVEDATA_SIZE_PATH};
use korok_formats::{Pack, PackWriter, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Diff of the savedata schema registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveDataDiff {
    /// Entries whose hash is not in stock, in stock-archive order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<Value>,
    /// Stock hashes the mod removes.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub del: BTreeSet<i32>,
}

impl SaveDataDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.del.is_empty()
    }
}

/// Merger for the savedata schema registry.
pub struct SaveDataMerger {
    settings: Settings,
}

impl SaveDataMerger {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Hash values a mod touches (added or deleted), across its main and
    /// option logs. Used for conflict display.
    pub fn edit_info(&self, installed: &crate::InstalledMod) -> Result<BTreeSet<i32>> {
        let mut hashes = BTreeSet::new();
        for diff in self.mod_diffs(installed)? {
            for entry in &diff.add {
                hashes.insert(entry_hash(entry)?);
            }
            hashes.extend(diff.del);
        }
        Ok(hashes)
    }
}

impl Merger for SaveDataMerger {
    type Diff = SaveDataDiff;

    fn name(&self) -> &'static str {
        "savedata"
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn log_name(&self) -> &'static str {
        "savedata.json"
    }

    fn digest_name(&self) -> &'static str {
        "savedata.log"
    }

    fn container_name(&self) -> &'static str {
        "savedata.sarc"
    }

    fn bootup_entry(&self) -> &'static str {
        SAVEDATA_ENTRY
    }

    fn size_entry(&self) -> &'static str {
        SAVEDATA_SIZE_PATH
    }

    fn generate_diff(&self, bootup: &Pack, baseline: &Baseline) -> Result<Option<SaveDataDiff>> {
        let Some(pack) = sub_archive(bootup, SAVEDATA_ENTRY)? else {
            return Ok(None);
        };
        if !is_savedata_modded(&pack, baseline)? {
            return Ok(None);
        }

        let stock = consolidate_savedata(baseline.savedata())?;
        let stock_hashes = hash_set(&stock)?;
        let entries = consolidate_savedata(&pack)?;
        let mod_hashes = hash_set(&entries)?;

        let mut diff = SaveDataDiff::default();
        for entry in entries {
            if !stock_hashes.contains(&entry_hash(&entry)?) {
                diff.add.push(entry);
            }
        }
        diff.del
            .extend(stock_hashes.difference(&mod_hashes).copied());
        Ok(Some(diff))
    }

    /// Newest-first, first-wins per hash for `add`; union for `del`.
    fn consolidate_diffs(&self, diffs: Vec<SaveDataDiff>) -> Result<SaveDataDiff> {
        let mut add: BTreeMap<i32, Value> = BTreeMap::new();
        let mut del = BTreeSet::new();
        for diff in diffs.into_iter().rev() {
            for entry in diff.add {
                add.entry(entry_hash(&entry)?).or_insert(entry);
            }
            del.extend(diff.del);
        }
        Ok(SaveDataDiff {
            add: add.into_values().collect(),
            del,
        })
    }

    fn build_merged(&self, diff: &SaveDataDiff, baseline: &Baseline) -> Result<Vec<u8>> {
        let stock = consolidate_savedata(baseline.savedata())?;
        let mut merged: BTreeMap<i32, Value> = stock
            .into_iter()
            .map(|entry| Ok((entry_hash(&entry)?, entry)))
            .collect::<Result<_>>()?;
        for entry in &diff.add {
            merged.insert(entry_hash(entry)?, entry.clone());
        }
        for hash in &diff.del {
            merged.remove(hash);
        }

        let entries: Vec<&Value> = merged.values().collect();
        let mut writer = PackWriter::new(self.settings.endian);
        let mut index = 0usize;
        for chunk in entries.chunks(SAVEDATA_BUCKET_MAX) {
            writer.files.insert(
                format!("/saveformat_{index}.bgsvdata"),
                bucket_value(chunk).to_binary(self.settings.endian),
            );
            index += 1;
        }

        let buckets = savedata_buckets(baseline.savedata())?;
        if buckets.len() < 2 {
            return Err(Error::MalformedEntry(
                "stock savedata archive is missing its trailer buckets".into(),
            ));
        }
        for (_, data) in &buckets[buckets.len() - 2..] {
            writer
                .files
                .insert(format!("/saveformat_{index}.bgsvdata"), data.to_vec());
            index += 1;
        }
        Ok(writer.to_binary())
    }
}

/// Wrap entries in the bucket envelope the game expects: the fixed file
/// descriptor ahead of the entry array, plus the save_info block.
pub fn bucket_value(entries: &[&Value]) -> Value {
    let descriptor = Value::Map(BTreeMap::from([
        ("IsCommon".to_string(), Value::Bool(false)),
        ("IsCommonAtSameAccount".to_string(), Value::Bool(false)),
        ("IsSaveSecureCode".to_string(), Value::Bool(true)),
        (
            "file_name".to_string(),
            Value::String("game_data.sav".to_string()),
        ),
    ]));
    let save_info = Value::Map(BTreeMap::from([
        ("directory_num".to_string(), Value::I32(8)),
        ("is_build_machine".to_string(), Value::Bool(true)),
        ("revision".to_string(), Value::I32(18203)),
    ]));
    Value::Map(BTreeMap::from([
        (
            "file_list".to_string(),
            Value::Array(vec![
                descriptor,
                Value::Array(entries.iter().map(|entry| (*entry).clone()).collect()),
            ]),
        ),
        ("save_info".to_string(), Value::Array(vec![save_info])),
    ]))
}

fn hash_set(entries: &[Value]) -> Result<BTreeSet<i32>> {
    entries.iter().map(entry_hash).collect()
}
