//! Installed mod handles.
//!
//! Mod discovery, ordering, and option-group resolution happen in the
//! mod manager. The merge engine only receives an ordered slice of
//! [`InstalledMod`]s (install/priority order) and reads diff logs out
//! of each mod's directory. Diff logs are owned by the mod — they live
//! and die with its on-disk state; the merge engine never writes into
//! an installed mod except through [`Merger::log_diff`](crate::Merger::log_diff)
//! at install time.

use crate::error::Result;
use crate::settings::BOOTUP_PATH;
use camino::{Utf8Path, Utf8PathBuf};

/// One installed mod, in the manager-supplied priority order.
#[derive(Debug, Clone)]
pub struct InstalledMod {
    /// Identifier used in logs and diagnostics.
    pub name: String,
    /// Root directory of the mod's installed files.
    pub path: Utf8PathBuf,
}

impl InstalledMod {
    pub fn new(name: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Path of the mod's copy of the boot package, if it ships one.
    pub fn bootup_path(&self) -> Utf8PathBuf {
        self.path.join(BOOTUP_PATH)
    }

    /// Path of the mod's main diff log for the given log name.
    pub fn log_path(&self, log_name: &str) -> Utf8PathBuf {
        self.path.join("logs").join(log_name)
    }

    /// Diff log paths for every enabled option sub-directory that ships
    /// one, sorted by option name so the contribution order is stable
    /// across runs.
    pub fn option_log_paths(&self, log_name: &str) -> Result<Vec<Utf8PathBuf>> {
        let options_dir = self.path.join("options");
        if !options_dir.as_std_path().is_dir() {
            return Ok(Vec::new());
        }

        let mut option_dirs = Vec::new();
        for entry in std::fs::read_dir(options_dir.as_std_path())? {
            let entry = entry?;
            let path = match Utf8PathBuf::from_path_buf(entry.path()) {
                Ok(p) => p,
                Err(p) => {
                    tracing::warn!("Skipping non-UTF-8 option path: {}", p.display());
                    continue;
                }
            };
            if path.as_std_path().is_dir() {
                option_dirs.push(path);
            }
        }
        option_dirs.sort();

        Ok(option_dirs
            .into_iter()
            .map(|dir| dir.join("logs").join(log_name))
            .filter(|log| log.as_std_path().exists())
            .collect())
    }
}

impl AsRef<Utf8Path> for InstalledMod {
    fn as_ref(&self) -> &Utf8Path {
        &self.path
    }
}
