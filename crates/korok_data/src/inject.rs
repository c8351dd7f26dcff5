//! Injection of merged archives back into the boot package.

use crate::error::Result;
use crate::settings::Settings;
use crate::utils;
use korok_formats::{Pack, PackWriter};

/// Compress `archive` and write it into the merged boot package at
/// `entry`, creating the merged boot package from the stock one on
/// first use. All other entries are carried over untouched. Returns the
/// uncompressed archive length, which is what the size registry tracks.
pub fn inject_into_bootup(settings: &Settings, entry: &str, archive: &[u8]) -> Result<usize> {
    let merged_path = settings.merged_bootup_path();
    let source = if merged_path.as_std_path().exists() {
        merged_path.clone()
    } else {
        settings.stock_bootup_path()
    };

    let bootup = Pack::from_binary(std::fs::read(source.as_std_path())?)?;
    let mut writer = PackWriter::from_pack(&bootup);
    writer.files.insert(entry.to_string(), utils::compress(archive)?);

    if let Some(parent) = merged_path.parent() {
        std::fs::create_dir_all(parent.as_std_path())?;
    }
    std::fs::write(merged_path.as_std_path(), writer.to_binary())?;

    tracing::debug!("Injected '{entry}' into {merged_path}");
    Ok(archive.len())
}
