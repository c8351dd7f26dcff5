//! The merge pipeline shared by both data tables.
//!
//! Gamedata and savedata go through the same five stages: diff one mod
//! against stock at install time, persist the diff as a text log in the
//! mod's directory, consolidate all installed mods' logs into one diff,
//! apply it over stock to build the merged archive, and inject that back
//! into the boot package. [`Merger`] captures the shared driver; the two
//! implementations supply the table-specific diff model and archive
//! layout.
//!
//! The driver is careful about when it does nothing. An empty
//! consolidated diff removes the merge artifacts instead of writing
//! empty ones, and an unchanged diff digest short-circuits the whole
//! rebuild unless the pass is forced.

use crate::baseline::{Baseline, BaselineCache};
use crate::error::{Error, Result};
use crate::inject::inject_into_bootup;
use crate::mods::InstalledMod;
use crate::settings::Settings;
use crate::size_table::{calc_size, SizeRegistry};
use crate::utils;
use camino::Utf8Path;
use korok_formats::Pack;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// What a merge pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No installed mod touches this table; merge artifacts were removed.
    NoChanges,
    /// The consolidated diff matches the last merged digest; nothing was
    /// rebuilt.
    Unchanged,
    /// The merged archive was rebuilt and injected.
    Merged,
}

/// One mergeable data table.
pub trait Merger {
    /// Structured diff for this table, serialized to the mod's log file.
    /// The `Default` value is the empty diff.
    type Diff: Serialize + DeserializeOwned + Default + PartialEq;

    /// Short table name used in diagnostics ("gamedata", "savedata").
    fn name(&self) -> &'static str;
    fn settings(&self) -> &Settings;
    /// File name of per-mod diff logs.
    fn log_name(&self) -> &'static str;
    /// File name of the merge digest under the merged logs directory.
    fn digest_name(&self) -> &'static str;
    /// File name of the cached merged archive under the merged logs
    /// directory.
    fn container_name(&self) -> &'static str;
    /// Boot package sub-entry the merged archive is injected at.
    fn bootup_entry(&self) -> &'static str;
    /// Size-registry resource the merged archive is tracked under.
    fn size_entry(&self) -> &'static str;

    /// Diff a mod's boot package against stock. `None` means the mod
    /// does not modify this table.
    fn generate_diff(&self, bootup: &Pack, baseline: &Baseline) -> Result<Option<Self::Diff>>;

    /// Fold per-mod diffs (install order) into one.
    fn consolidate_diffs(&self, diffs: Vec<Self::Diff>) -> Result<Self::Diff>;

    /// Apply a consolidated diff over stock and serialize the merged
    /// archive.
    fn build_merged(&self, diff: &Self::Diff, baseline: &Baseline) -> Result<Vec<u8>>;

    /// Whether a mod's modded-files list (as reported by its installer)
    /// names this table's boot package sub-entry.
    fn touches(&self, modded_files: &[String]) -> bool {
        let nested = Settings::nested_entry_name(self.bootup_entry());
        modded_files.iter().any(|file| *file == nested)
    }

    /// Diff one installed mod and write (or clear) its diff log. Called
    /// at install time; mods without a boot package are untouched.
    fn log_diff(&self, installed: &InstalledMod, baseline: &Baseline) -> Result<()> {
        let bootup_path = installed.bootup_path();
        if !bootup_path.as_std_path().exists() {
            return Ok(());
        }
        let bootup = read_mod_pack(&bootup_path)?;
        let log_path = installed.log_path(self.log_name());
        match self.generate_diff(&bootup, baseline)? {
            Some(diff) if diff != Self::Diff::default() => write_diff_log(&log_path, &diff),
            // A stale log from a previous version of the mod must not
            // keep contributing once the data no longer differs.
            _ => remove_if_exists(&log_path),
        }
    }

    /// All diff logs of one mod, main log first, then enabled options in
    /// sorted order.
    fn mod_diffs(&self, installed: &InstalledMod) -> Result<Vec<Self::Diff>> {
        let mut diffs = Vec::new();
        let main = installed.log_path(self.log_name());
        if main.as_std_path().exists() {
            diffs.push(read_diff_log(&main)?);
        }
        for log in installed.option_log_paths(self.log_name())? {
            diffs.push(read_diff_log(&log)?);
        }
        Ok(diffs)
    }

    /// Consolidated diff across all installed mods, in install order. A
    /// mod with unreadable logs is skipped with a warning; it must not
    /// take the rest of the load order down with it.
    fn consolidated_diff(&self, mods: &[InstalledMod]) -> Result<Self::Diff> {
        let mut diffs = Vec::new();
        for installed in mods {
            match self.mod_diffs(installed) {
                Ok(mod_diffs) => diffs.extend(mod_diffs),
                Err(err) => {
                    tracing::warn!(
                        "Skipping {} contribution of mod '{}': {err}",
                        self.name(),
                        installed.name
                    );
                }
            }
        }
        self.consolidate_diffs(diffs)
    }

    /// Run the merge for the current load order.
    fn perform_merge(&self, mods: &[InstalledMod], cache: &BaselineCache) -> Result<MergeOutcome> {
        let settings = self.settings();
        let digest_path = settings.merged_logs_dir().join(self.digest_name());
        let container_path = settings.merged_logs_dir().join(self.container_name());

        let diff = self.consolidated_diff(mods)?;
        if diff == Self::Diff::default() {
            remove_if_exists(&digest_path)?;
            remove_if_exists(&container_path)?;
            let mut registry = SizeRegistry::load(settings)?;
            if registry.get(self.size_entry()).is_some() {
                registry.remove(self.size_entry());
                registry.save(settings)?;
            }
            tracing::info!("No {} changes to merge", self.name());
            return Ok(MergeOutcome::NoChanges);
        }

        let digest = diff_digest(&diff)?;
        if !settings.force && stored_digest(&digest_path)?.as_deref() == Some(digest.as_str()) {
            tracing::info!("Merged {} is up to date", self.name());
            return Ok(MergeOutcome::Unchanged);
        }

        tracing::info!("Merging {} for {} installed mods", self.name(), mods.len());
        let baseline = cache.get()?;
        let archive = self.build_merged(&diff, &baseline)?;

        std::fs::create_dir_all(settings.merged_logs_dir().as_std_path())?;
        std::fs::write(container_path.as_std_path(), &archive)?;

        let uncompressed_len = inject_into_bootup(settings, self.bootup_entry(), &archive)?;

        let mut registry = SizeRegistry::load(settings)?;
        registry.set(self.size_entry(), calc_size(uncompressed_len, ".sarc"));
        registry.save(settings)?;

        // Digest last. A crash mid-merge would otherwise leave a current
        // digest next to half-written output, and the next pass would
        // skip the rebuild.
        std::fs::write(digest_path.as_std_path(), digest.as_bytes())?;

        tracing::info!("Merged {} injected into boot package", self.name());
        Ok(MergeOutcome::Merged)
    }

    /// The merged archive as a boot package injection: the sub-entry
    /// name and the compressed bytes, read back from the container
    /// cache. `None` when the last pass found no changes. For callers
    /// that assemble the boot package themselves.
    fn bootup_injection(&self) -> Result<Option<(&'static str, Vec<u8>)>> {
        let container_path = self
            .settings()
            .merged_logs_dir()
            .join(self.container_name());
        match std::fs::read(container_path.as_std_path()) {
            Ok(archive) => Ok(Some((self.bootup_entry(), utils::compress(&archive)?))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Read and parse a mod-owned pack. Failures are scoped to the mod.
pub fn read_mod_pack(path: &Utf8Path) -> Result<Pack> {
    let bytes = std::fs::read(path.as_std_path()).map_err(|err| unreadable(path, err))?;
    Pack::from_binary(bytes).map_err(|err| unreadable(path, err))
}

/// Extract and decompress a table archive from a boot package. `None`
/// means the boot package does not carry that entry at all.
pub fn sub_archive(bootup: &Pack, entry: &str) -> Result<Option<Pack>> {
    let Some(compressed) = bootup.get(entry) else {
        return Ok(None);
    };
    let bytes = utils::decompress(compressed)?;
    Ok(Some(Pack::from_binary(bytes)?))
}

/// Parse a diff log. Failures are scoped to the owning mod.
pub fn read_diff_log<D: DeserializeOwned>(path: &Utf8Path) -> Result<D> {
    let text = std::fs::read_to_string(path.as_std_path()).map_err(|err| unreadable(path, err))?;
    serde_json::from_str(&text).map_err(|err| unreadable(path, err))
}

/// Write a diff log as pretty JSON, creating the logs directory.
pub fn write_diff_log<D: Serialize>(path: &Utf8Path, diff: &D) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent.as_std_path())?;
    }
    std::fs::write(path.as_std_path(), serde_json::to_string_pretty(diff)?)?;
    Ok(())
}

/// Digest of a consolidated diff, compared across passes to skip
/// rebuilds. Hashes the compact JSON form, so it is stable under
/// reordering-free re-serialization but not across diff model changes.
pub fn diff_digest<D: Serialize>(diff: &D) -> Result<String> {
    Ok(utils::content_hash_hex(&serde_json::to_vec(diff)?))
}

/// The digest recorded by the previous merge pass, if any.
pub fn stored_digest(path: &Utf8Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path.as_std_path()) {
        Ok(text) => Ok(Some(text.trim().to_string())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn remove_if_exists(path: &Utf8Path) -> Result<()> {
    match std::fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn unreadable(path: &Utf8Path, err: impl std::fmt::Display) -> Error {
    Error::ModDataUnreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
