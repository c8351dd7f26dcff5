//! Merge pass configuration and well-known paths.

use camino::Utf8PathBuf;
use korok_formats::Endian;

/// Logical path of the boot package inside a content root.
pub const BOOTUP_PATH: &str = "Pack/Bootup.pack";

/// Boot package sub-entry holding the compressed gamedata archive.
pub const GAMEDATA_ENTRY: &str = "GameData/gamedata.ssarc";

/// Boot package sub-entry holding the compressed savedata archive.
pub const SAVEDATA_ENTRY: &str = "GameData/savedataformat.ssarc";

/// Size-registry resource path for the merged gamedata archive.
pub const GAMEDATA_SIZE_PATH: &str = "GameData/gamedata.sarc";

/// Size-registry resource path for the merged savedata archive.
pub const SAVEDATA_SIZE_PATH: &str = "GameData/savedataformat.sarc";

/// Configuration for one merge pass.
///
/// Constructed by the caller (the mod manager); the merge engine itself
/// never reads ambient global state.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Content root of the unmodified game installation.
    pub game_root: Utf8PathBuf,
    /// Content root where merged output is assembled.
    pub merged_root: Utf8PathBuf,
    /// Byte order of the target hardware; affects every binary
    /// encode in the pipeline.
    pub endian: Endian,
    /// Bypass the merge digest short-circuit and remerge even when no
    /// diff changes were detected.
    pub force: bool,
}

impl Settings {
    pub fn new(
        game_root: impl Into<Utf8PathBuf>,
        merged_root: impl Into<Utf8PathBuf>,
        endian: Endian,
    ) -> Self {
        Self {
            game_root: game_root.into(),
            merged_root: merged_root.into(),
            endian,
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Path of the stock boot package.
    pub fn stock_bootup_path(&self) -> Utf8PathBuf {
        self.game_root.join(BOOTUP_PATH)
    }

    /// Path of the merged boot package (may not exist yet).
    pub fn merged_bootup_path(&self) -> Utf8PathBuf {
        self.merged_root.join(BOOTUP_PATH)
    }

    /// Directory holding merge digests, merged container caches, and
    /// the size registry.
    pub fn merged_logs_dir(&self) -> Utf8PathBuf {
        self.merged_root.join("logs")
    }

    /// Path of the persisted size registry.
    pub fn size_registry_path(&self) -> Utf8PathBuf {
        self.merged_logs_dir().join("sizes.json")
    }

    /// Canonical name of a boot package sub-entry as it appears in a
    /// mod's modded-files list (`Pack/Bootup.pack//<entry>`).
    pub fn nested_entry_name(entry: &str) -> String {
        format!("{BOOTUP_PATH}//{entry}")
    }
}

/// Strip the leading slash some archives carry on entry names, so stock
/// and mod entries compare under one canonical form.
pub fn normalize_entry_name(name: &str) -> &str {
    name.trim_start_matches('/')
}
