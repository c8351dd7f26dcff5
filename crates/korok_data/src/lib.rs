//! Game data table diffing and merging for mod management.
//!
//! The game keeps two registries packed inside its boot package: the
//! gamedata flag registry and the savedata schema registry. Mods that
//! touch either ship a whole replacement archive, so installing two such
//! mods naively means the last one wins wholesale. This crate merges
//! them properly:
//!
//! - **Install-time diffing**: Each mod's archives are diffed against
//!   the stock baseline and persisted as a structured JSON log
//! - **Consolidation**: All installed mods' logs fold into one diff with
//!   defined precedence per table
//! - **Merging**: The consolidated diff is applied over stock, chunked
//!   back into bucket files, and injected into the merged boot package
//! - **Skip detection**: A digest of the consolidated diff short-circuits
//!   remerges when the load order's data contribution has not changed
//!
//! # Example
//!
//! ```no_run
//! use korok_data::{
//!     BaselineCache, GameDataMerger, InstalledMod, Merger, SaveDataMerger, Settings,
//! };
//! use korok_formats::Endian;
//!
//! # fn main() -> korok_data::Result<()> {
//! let settings = Settings::new("/games/botw", "/profiles/merged", Endian::Big);
//! let cache = BaselineCache::new(settings.stock_bootup_path());
//!
//! let mods = vec![
//!     InstalledMod::new("expanded-inventory", "/profiles/mods/expanded-inventory"),
//!     InstalledMod::new("second-wind", "/profiles/mods/second-wind"),
//! ];
//!
//! GameDataMerger::new(settings.clone()).perform_merge(&mods, &cache)?;
//! SaveDataMerger::new(settings).perform_merge(&mods, &cache)?;
//! # Ok(())
//! # }
//! ```

pub mod baseline;
pub mod consolidate;
pub mod error;
pub mod gamedata;
pub mod inject;
pub mod merger;
pub mod mods;
pub mod savedata;
pub mod settings;
pub mod size_table;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use baseline::{Baseline, BaselineCache};
pub use error::{Error, Result};
pub use gamedata::{GameDataDiff, GameDataMerger, GameDataTypeDiff};
pub use merger::{MergeOutcome, Merger};
pub use mods::InstalledMod;
pub use savedata::{SaveDataDiff, SaveDataMerger};
pub use settings::Settings;
pub use size_table::SizeRegistry;
