//! Fixture builders shared by unit tests.

use crate::consolidate::GameDataTables;
use crate::savedata::bucket_value;
use crate::settings::{Settings, BOOTUP_PATH, GAMEDATA_ENTRY, SAVEDATA_ENTRY};
use crate::utils;
use camino::Utf8PathBuf;
use korok_formats::{Endian, Pack, PackWriter, Value};
use std::collections::BTreeMap;
use tempfile::TempDir;

/// A fake game installation with a stock boot package, plus an empty
/// merged-output root, both inside one temp directory.
pub struct GameFixture {
    _dir: TempDir,
    pub game_root: Utf8PathBuf,
    pub merged_root: Utf8PathBuf,
    pub mods_root: Utf8PathBuf,
    pub endian: Endian,
}

impl GameFixture {
    pub fn new(endian: Endian) -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let game_root = root.join("game");
        let merged_root = root.join("merged");
        let mods_root = root.join("mods");

        let gamedata = gamedata_pack_bytes(&stock_gamedata_tables(), endian);
        let savedata = savedata_pack_bytes(&stock_savedata_entries(), endian);
        write_bootup(&game_root, &gamedata, &savedata, endian);

        Self {
            _dir: dir,
            game_root,
            merged_root,
            mods_root,
            endian,
        }
    }

    pub fn bootup_path(&self) -> Utf8PathBuf {
        self.game_root.join(BOOTUP_PATH)
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.game_root.clone(), self.merged_root.clone(), self.endian)
    }

    /// Create a mod directory (no logs yet) and return its handle.
    pub fn add_mod(&self, name: &str) -> crate::InstalledMod {
        let path = self.mods_root.join(name);
        std::fs::create_dir_all(path.join("logs").as_std_path()).unwrap();
        crate::InstalledMod::new(name, path)
    }

    /// Write a mod boot package whose gamedata/savedata differ from
    /// stock as given.
    pub fn write_mod_bootup(
        &self,
        installed: &crate::InstalledMod,
        tables: &GameDataTables,
        save_entries: &[Value],
    ) {
        let gamedata = gamedata_pack_bytes(tables, self.endian);
        let savedata = savedata_pack_bytes(save_entries, self.endian);
        write_bootup(&installed.path, &gamedata, &savedata, self.endian);
    }
}

/// A gamedata entry: `DataName` identity plus a payload field.
pub fn flag_entry(name: &str, value: i32) -> Value {
    Value::Map(BTreeMap::from([
        ("DataName".to_string(), Value::String(name.to_string())),
        ("InitValue".to_string(), Value::I32(value)),
    ]))
}

/// A savedata entry: `HashValue` identity plus a payload field.
pub fn save_entry(hash: i32, name: &str) -> Value {
    Value::Map(BTreeMap::from([
        ("HashValue".to_string(), Value::I32(hash)),
        ("DataName".to_string(), Value::String(name.to_string())),
    ]))
}

/// Stock gamedata used by the fixtures: one `Bool` type with two flags.
pub fn stock_gamedata_tables() -> GameDataTables {
    GameDataTables::from([(
        "Bool".to_string(),
        vec![flag_entry("A", 1), flag_entry("B", 2)],
    )])
}

/// Stock savedata used by the fixtures: entries with hashes 1, 2, 3.
pub fn stock_savedata_entries() -> Vec<Value> {
    vec![save_entry(1, "a"), save_entry(2, "b"), save_entry(3, "c")]
}

/// Serialize gamedata tables into bucket files (one bucket per type).
pub fn gamedata_pack_bytes(tables: &GameDataTables, endian: Endian) -> Vec<u8> {
    let mut writer = PackWriter::new(endian);
    for (data_type, entries) in tables {
        let root = Value::Map(BTreeMap::from([(
            data_type.clone(),
            Value::Array(entries.clone()),
        )]));
        writer
            .files
            .insert(format!("/{data_type}_0.bgdata"), root.to_binary(endian));
    }
    writer.to_binary()
}

pub fn gamedata_pack(tables: &GameDataTables, endian: Endian) -> Pack {
    Pack::from_binary(gamedata_pack_bytes(tables, endian)).unwrap()
}

/// Serialize savedata entries into one bucket plus the two trailers.
pub fn savedata_pack_bytes(entries: &[Value], endian: Endian) -> Vec<u8> {
    let mut writer = PackWriter::new(endian);
    let refs: Vec<&Value> = entries.iter().collect();
    writer.files.insert(
        "/saveformat_0.bgsvdata".to_string(),
        bucket_value(&refs).to_binary(endian),
    );
    writer
        .files
        .insert("/saveformat_1.bgsvdata".to_string(), b"trailer-one".to_vec());
    writer
        .files
        .insert("/saveformat_2.bgsvdata".to_string(), b"trailer-two".to_vec());
    writer.to_binary()
}

pub fn savedata_pack(entries: &[Value], endian: Endian) -> Pack {
    Pack::from_binary(savedata_pack_bytes(entries, endian)).unwrap()
}

/// Write a boot package with the two compressed sub-archives and one
/// unrelated entry that merges must preserve.
pub fn write_bootup(root: &Utf8PathBuf, gamedata: &[u8], savedata: &[u8], endian: Endian) {
    let mut writer = PackWriter::new(endian);
    writer.files.insert(
        GAMEDATA_ENTRY.to_string(),
        utils::compress(gamedata).unwrap(),
    );
    writer.files.insert(
        SAVEDATA_ENTRY.to_string(),
        utils::compress(savedata).unwrap(),
    );
    writer
        .files
        .insert("Other/untouched.bin".to_string(), vec![0xAB; 16]);

    let bootup_path = root.join(BOOTUP_PATH);
    std::fs::create_dir_all(bootup_path.parent().unwrap().as_std_path()).unwrap();
    std::fs::write(bootup_path.as_std_path(), writer.to_binary()).unwrap();
}
