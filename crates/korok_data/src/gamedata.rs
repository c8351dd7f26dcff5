//! Gamedata flag registry diffing and merging.
//!
//! Gamedata entries are identified by `DataName` within their data type.
//! A mod's diff records, per data type, the entries it adds or changes
//! (`add`, full entry values) and the names it removes (`del`).
//! Consolidation across mods is last-write-wins for `add` and a union
//! for `del`, so one mod deleting a flag is never undone by an earlier
//! mod merely shipping stock data. Applying the diff keys the stock
//! tables by name, overlays `add`, removes `del`, then re-chunks each
//! type into bucket files of at most [`GAMEDATA_BUCKET_MAX`] entries.
//!
//! Diff entries for data types the stock tables do not have are carried
//! in logs but ignored at apply time; the game only reads registries it
//! knows about.

use crate::baseline::{is_gamedata_modded, Baseline};
use crate::consolidate::{consolidate_gamedata, entry_name, GameDataTables, GAMEDATA_BUCKET_MAX};
use crate::error::Result;
use crate::merger::{sub_archive, Merger};
use crate::settings::{Settings, GAMEDATA_ENTRY, GAMEDATA_SIZE_PATH};
use korok_formats::{Pack, PackWriter, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Diff of one data type's entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameDataTypeDiff {
    /// Added or changed entries, keyed by `DataName`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, Value>,
    /// Deleted entry names.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub del: BTreeSet<String>,
}

impl GameDataTypeDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.del.is_empty()
    }
}

/// Diff of the whole flag registry: data type -> per-type diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameDataDiff(pub BTreeMap<String, GameDataTypeDiff>);

impl GameDataDiff {
    /// Overlay a later mod's diff onto this one. Later `add`s win per
    /// entry name; `del`s accumulate.
    pub fn merge_from(&mut self, other: GameDataDiff) {
        for (data_type, incoming) in other.0 {
            let slot = self.0.entry(data_type).or_default();
            slot.add.extend(incoming.add);
            slot.del.extend(incoming.del);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(GameDataTypeDiff::is_empty)
    }
}

/// Merger for the gamedata flag registry.
pub struct GameDataMerger {
    settings: Settings,
    pool: Option<rayon::ThreadPool>,
}

impl GameDataMerger {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            pool: None,
        }
    }

    /// Use a caller-owned thread pool for bucket decoding instead of the
    /// global one.
    pub fn with_pool(mut self, pool: rayon::ThreadPool) -> Self {
        self.pool = Some(pool);
        self
    }

    fn tables(&self, pack: &Pack) -> Result<GameDataTables> {
        consolidate_gamedata(pack, self.pool.as_ref())
    }

    /// Flag names a mod touches (added, changed, or deleted), across its
    /// main and option logs. Used for conflict display.
    pub fn edit_info(&self, installed: &crate::InstalledMod) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for diff in self.mod_diffs(installed)? {
            for type_diff in diff.0.into_values() {
                names.extend(type_diff.add.into_keys());
                names.extend(type_diff.del);
            }
        }
        Ok(names)
    }
}

impl Merger for GameDataMerger {
    type Diff = GameDataDiff;

    fn name(&self) -> &'static str {
        "gamedata"
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn log_name(&self) -> &'static str {
        "gamedata.json"
    }

    fn digest_name(&self) -> &'static str {
        "gamedata.log"
    }

    fn container_name(&self) -> &'static str {
        "gamedata.sarc"
    }

    fn bootup_entry(&self) -> &'static str {
        GAMEDATA_ENTRY
    }

    fn size_entry(&self) -> &'static str {
        GAMEDATA_SIZE_PATH
    }

    fn generate_diff(&self, bootup: &Pack, baseline: &Baseline) -> Result<Option<GameDataDiff>> {
        let Some(pack) = sub_archive(bootup, GAMEDATA_ENTRY)? else {
            return Ok(None);
        };
        if !is_gamedata_modded(&pack, baseline) {
            return Ok(None);
        }

        let mod_tables = self.tables(&pack)?;
        let stock_tables = self.tables(baseline.gamedata())?;

        let mut diff = GameDataDiff::default();
        for (data_type, entries) in &mod_tables {
            let stock: BTreeMap<&str, &Value> = match stock_tables.get(data_type) {
                Some(stock_entries) => index_by_name(stock_entries)?,
                None => BTreeMap::new(),
            };

            let mut type_diff = GameDataTypeDiff::default();
            let mut mod_names = BTreeSet::new();
            for entry in entries {
                let name = entry_name(entry)?;
                mod_names.insert(name);
                if stock.get(name) != Some(&entry) {
                    type_diff.add.insert(name.to_string(), entry.clone());
                }
            }
            // Deletions only make sense against a stock table; a
            // mod-introduced type has nothing to delete from.
            if stock_tables.contains_key(data_type) {
                type_diff.del.extend(
                    stock
                        .keys()
                        .filter(|name| !mod_names.contains(**name))
                        .map(|name| name.to_string()),
                );
            }
            if !type_diff.is_empty() {
                diff.0.insert(data_type.clone(), type_diff);
            }
        }
        Ok(Some(diff))
    }

    fn consolidate_diffs(&self, diffs: Vec<GameDataDiff>) -> Result<GameDataDiff> {
        let mut merged = GameDataDiff::default();
        for diff in diffs {
            merged.merge_from(diff);
        }
        merged.0.retain(|_, type_diff| !type_diff.is_empty());
        Ok(merged)
    }

    fn build_merged(&self, diff: &GameDataDiff, baseline: &Baseline) -> Result<Vec<u8>> {
        let stock_tables = self.tables(baseline.gamedata())?;

        let mut writer = PackWriter::new(self.settings.endian);
        for (data_type, entries) in &stock_tables {
            let mut merged: BTreeMap<String, Value> = entries
                .iter()
                .map(|entry| Ok((entry_name(entry)?.to_string(), entry.clone())))
                .collect::<Result<_>>()?;

            if let Some(type_diff) = diff.0.get(data_type) {
                for (name, entry) in &type_diff.add {
                    merged.insert(name.clone(), entry.clone());
                }
                for name in &type_diff.del {
                    merged.remove(name);
                }
            }

            let merged: Vec<Value> = merged.into_values().collect();
            for (index, chunk) in merged.chunks(GAMEDATA_BUCKET_MAX).enumerate() {
                let root = Value::Map(BTreeMap::from([(
                    data_type.clone(),
                    Value::Array(chunk.to_vec()),
                )]));
                writer.files.insert(
                    format!("/{data_type}_{index}.bgdata"),
                    root.to_binary(self.settings.endian),
                );
            }
        }
        Ok(writer.to_binary())
    }
}

fn index_by_name(entries: &[Value]) -> Result<BTreeMap<&str, &Value>> {
    entries
        .iter()
        .map(|entry| Ok((entry_name(entry)?, entry)))
        .collect()
}
