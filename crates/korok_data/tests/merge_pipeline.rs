//! End-to-end merge pipeline over a fake game installation.

use camino::Utf8PathBuf;
use korok_data::savedata::bucket_value;
use korok_data::settings::{BOOTUP_PATH, GAMEDATA_ENTRY, SAVEDATA_ENTRY};
use korok_data::{
    utils, BaselineCache, GameDataMerger, InstalledMod, MergeOutcome, Merger, SaveDataMerger,
    Settings,
};
use korok_formats::{Endian, Pack, PackWriter, Value};
use std::collections::BTreeMap;
use std::sync::Once;
use tempfile::TempDir;

const ENDIAN: Endian = Endian::Big;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

struct Fixture {
    _dir: TempDir,
    settings: Settings,
    mods_root: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let game_root = root.join("game");
        let settings = Settings::new(game_root.clone(), root.join("merged"), ENDIAN);

        write_bootup(&game_root, &stock_flags(), &stock_saves());
        Self {
            _dir: dir,
            settings,
            mods_root: root.join("mods"),
        }
    }

    fn install(
        &self,
        name: &str,
        flags: &[(&str, i32)],
        saves: &[(i32, &str)],
    ) -> InstalledMod {
        let path = self.mods_root.join(name);
        write_bootup(&path, flags, saves);
        let installed = InstalledMod::new(name, path);

        let cache = BaselineCache::new(self.settings.stock_bootup_path());
        let baseline = cache.get().unwrap();
        GameDataMerger::new(self.settings.clone())
            .log_diff(&installed, &baseline)
            .unwrap();
        SaveDataMerger::new(self.settings.clone())
            .log_diff(&installed, &baseline)
            .unwrap();
        installed
    }

    fn merge_all(&self, mods: &[InstalledMod]) -> (MergeOutcome, MergeOutcome) {
        let cache = BaselineCache::new(self.settings.stock_bootup_path());
        (
            GameDataMerger::new(self.settings.clone())
                .perform_merge(mods, &cache)
                .unwrap(),
            SaveDataMerger::new(self.settings.clone())
                .perform_merge(mods, &cache)
                .unwrap(),
        )
    }

    fn merged_bootup(&self) -> Pack {
        let path = self.settings.merged_bootup_path();
        Pack::from_binary(std::fs::read(path.as_std_path()).unwrap()).unwrap()
    }

    fn container_bytes(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.settings.merged_logs_dir().join(name).as_std_path()).unwrap()
    }
}

fn stock_flags() -> Vec<(&'static str, i32)> {
    vec![("Armor_Default", 1), ("Weapon_Default", 2)]
}

fn stock_saves() -> Vec<(i32, &'static str)> {
    vec![(100, "slot_a"), (200, "slot_b"), (300, "slot_c")]
}

fn flag(name: &str, value: i32) -> Value {
    Value::Map(BTreeMap::from([
        ("DataName".to_string(), Value::String(name.to_string())),
        ("InitValue".to_string(), Value::I32(value)),
    ]))
}

fn save(hash: i32, name: &str) -> Value {
    Value::Map(BTreeMap::from([
        ("HashValue".to_string(), Value::I32(hash)),
        ("DataName".to_string(), Value::String(name.to_string())),
    ]))
}

fn write_bootup<F, S>(root: &Utf8PathBuf, flags: &[(F, i32)], saves: &[(i32, S)])
where
    F: AsRef<str>,
    S: AsRef<str>,
{
    let entries: Vec<Value> = flags
        .iter()
        .map(|(name, value)| flag(name.as_ref(), *value))
        .collect();
    let mut gamedata = PackWriter::new(ENDIAN);
    let root_value = Value::Map(BTreeMap::from([(
        "Bool".to_string(),
        Value::Array(entries),
    )]));
    gamedata
        .files
        .insert("/Bool_0.bgdata".to_string(), root_value.to_binary(ENDIAN));

    let save_entries: Vec<Value> = saves
        .iter()
        .map(|(hash, name)| save(*hash, name.as_ref()))
        .collect();
    let refs: Vec<&Value> = save_entries.iter().collect();
    let mut savedata = PackWriter::new(ENDIAN);
    savedata.files.insert(
        "/saveformat_0.bgsvdata".to_string(),
        bucket_value(&refs).to_binary(ENDIAN),
    );
    savedata
        .files
        .insert("/saveformat_1.bgsvdata".to_string(), b"caption".to_vec());
    savedata
        .files
        .insert("/saveformat_2.bgsvdata".to_string(), b"option".to_vec());

    let mut bootup = PackWriter::new(ENDIAN);
    bootup.files.insert(
        GAMEDATA_ENTRY.to_string(),
        utils::compress(&gamedata.to_binary()).unwrap(),
    );
    bootup.files.insert(
        SAVEDATA_ENTRY.to_string(),
        utils::compress(&savedata.to_binary()).unwrap(),
    );

    let bootup_path = root.join(BOOTUP_PATH);
    std::fs::create_dir_all(bootup_path.parent().unwrap().as_std_path()).unwrap();
    std::fs::write(bootup_path.as_std_path(), bootup.to_binary()).unwrap();
}

fn flag_names(pack: &Pack) -> Vec<String> {
    let value = Value::from_binary(pack.get("/Bool_0.bgdata").unwrap()).unwrap();
    value
        .get("Bool")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|entry| {
            entry
                .get("DataName")
                .and_then(Value::as_str)
                .unwrap()
                .to_string()
        })
        .collect()
}

#[test]
fn two_mods_merge_into_bootup() {
    let fixture = Fixture::new();

    // First mod adds a flag and a save hash.
    let first = fixture.install(
        "first",
        &[
            ("Armor_Default", 1),
            ("Weapon_Default", 2),
            ("Armor_Extra", 5),
        ],
        &[(100, "slot_a"), (200, "slot_b"), (300, "slot_c"), (400, "d")],
    );
    // Second mod overrides the extra flag and drops a stock save hash.
    let second = fixture.install(
        "second",
        &[
            ("Armor_Default", 1),
            ("Weapon_Default", 2),
            ("Armor_Extra", 9),
        ],
        &[(200, "slot_b"), (300, "slot_c")],
    );

    let mods = vec![first, second];
    assert_eq!(
        fixture.merge_all(&mods),
        (MergeOutcome::Merged, MergeOutcome::Merged)
    );

    let bootup = fixture.merged_bootup();
    let gamedata = Pack::from_binary(
        utils::decompress(bootup.get(GAMEDATA_ENTRY).unwrap()).unwrap(),
    )
    .unwrap();
    assert_eq!(
        flag_names(&gamedata),
        vec!["Armor_Default", "Armor_Extra", "Weapon_Default"]
    );
    // Last-installed mod's version of the shared flag wins.
    let value = Value::from_binary(gamedata.get("/Bool_0.bgdata").unwrap()).unwrap();
    let extra = value.get("Bool").and_then(Value::as_array).unwrap()[1].clone();
    assert_eq!(extra.get("InitValue").and_then(Value::as_i32), Some(9));

    let savedata = Pack::from_binary(
        utils::decompress(bootup.get(SAVEDATA_ENTRY).unwrap()).unwrap(),
    )
    .unwrap();
    let bucket = Value::from_binary(savedata.get("/saveformat_0.bgsvdata").unwrap()).unwrap();
    let hashes: Vec<i32> = bucket
        .get("file_list")
        .and_then(Value::as_array)
        .and_then(|list| list.get(1))
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|entry| entry.get("HashValue").and_then(Value::as_i32).unwrap())
        .collect();
    assert_eq!(hashes, vec![200, 300, 400]);
    // Trailer buckets survive the rebuild.
    assert_eq!(savedata.get("/saveformat_1.bgsvdata"), Some(&b"caption"[..]));
    assert_eq!(savedata.get("/saveformat_2.bgsvdata"), Some(&b"option"[..]));

    // Second pass with the same load order is a no-op.
    assert_eq!(
        fixture.merge_all(&mods),
        (MergeOutcome::Unchanged, MergeOutcome::Unchanged)
    );
}

#[test]
fn merged_output_is_deterministic() {
    let build = || {
        let fixture = Fixture::new();
        let installed = fixture.install(
            "only",
            &[("Armor_Default", 1), ("Weapon_Default", 2), ("New", 3)],
            &[(100, "slot_a"), (200, "slot_b"), (300, "slot_c"), (999, "z")],
        );
        fixture.merge_all(&[installed]);
        (
            fixture.container_bytes("gamedata.sarc"),
            fixture.container_bytes("savedata.sarc"),
        )
    };

    assert_eq!(build(), build());
}

#[test]
fn stock_identical_mods_produce_no_changes() {
    let fixture = Fixture::new();
    let installed = fixture.install("vanilla", &stock_flags(), &stock_saves());

    assert_eq!(
        fixture.merge_all(&[installed]),
        (MergeOutcome::NoChanges, MergeOutcome::NoChanges)
    );
    assert!(!fixture
        .settings
        .merged_bootup_path()
        .as_std_path()
        .exists());
}

#[test]
fn option_logs_override_main_log() {
    let fixture = Fixture::new();
    let installed = fixture.install(
        "with-option",
        &[("Armor_Default", 1), ("Weapon_Default", 2), ("New", 3)],
        &stock_saves(),
    );

    // An enabled option ships its own gamedata log; its adds land on
    // top of the main log's.
    let option_logs = installed.path.join("options/harder/logs");
    std::fs::create_dir_all(option_logs.as_std_path()).unwrap();
    let option_diff = serde_json::json!({
        "Bool": { "add": { "New": {
            "Map": { "DataName": { "String": "New" }, "InitValue": { "I32": 7 } }
        } } }
    });
    std::fs::write(
        option_logs.join("gamedata.json").as_std_path(),
        serde_json::to_string_pretty(&option_diff).unwrap(),
    )
    .unwrap();

    let cache = BaselineCache::new(fixture.settings.stock_bootup_path());
    GameDataMerger::new(fixture.settings.clone())
        .perform_merge(&[installed], &cache)
        .unwrap();

    let bootup = fixture.merged_bootup();
    let gamedata = Pack::from_binary(
        utils::decompress(bootup.get(GAMEDATA_ENTRY).unwrap()).unwrap(),
    )
    .unwrap();
    let value = Value::from_binary(gamedata.get("/Bool_0.bgdata").unwrap()).unwrap();
    let new_flag = value
        .get("Bool")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .find(|entry| entry.get("DataName").and_then(Value::as_str) == Some("New"))
        .cloned()
        .unwrap();
    assert_eq!(new_flag.get("InitValue").and_then(Value::as_i32), Some(7));
}
