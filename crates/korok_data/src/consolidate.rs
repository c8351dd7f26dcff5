//! Flattening of bucket archives into unified tables.
//!
//! Gamedata ships as many small bucket files, each one a binary blob of
//! `{DataType: [entry, ...]}`. Savedata ships as numbered bucket files
//! whose `file_list` arrays hold the entries, plus two trailer buckets
//! of format bookkeeping. Before anything can be diffed, both layouts
//! are flattened: gamedata into one table per data type, savedata into
//! one flat entry sequence. Stock and candidate archives go through the
//! same flattening so they diff on equal footing.
//!
//! Gamedata bucket decoding is the one hot spot in the pipeline (stock
//! data is tens of thousands of entries), so it runs on a rayon pool —
//! either one supplied by the caller or the global pool ad hoc. Workers
//! are pure (bytes in, value out); the union step afterwards is
//! order-independent since the same data type can legitimately span many
//! buckets. Any worker failure fails the whole flatten: a partial table
//! must never be diffed.

use crate::error::{Error, Result};
use korok_formats::{Pack, Value};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Flattened gamedata: data type -> all entries across its buckets.
pub type GameDataTables = BTreeMap<String, Vec<Value>>;

/// Maximum entries per gamedata bucket file.
pub const GAMEDATA_BUCKET_MAX: usize = 4096;

/// Maximum entries per savedata bucket file.
pub const SAVEDATA_BUCKET_MAX: usize = 8192;

/// Decode every gamedata bucket and union the entry arrays per data
/// type. No dedup happens here; stock data is assumed internally
/// consistent, and diffing works on the raw union.
pub fn consolidate_gamedata(
    pack: &Pack,
    pool: Option<&rayon::ThreadPool>,
) -> Result<GameDataTables> {
    let files: Vec<(&str, &[u8])> = pack.files().collect();

    let decoded: Result<Vec<Value>> = with_pool(pool, || {
        files
            .par_iter()
            .map(|(_, data)| Value::from_binary(data).map_err(Error::from))
            .collect()
    });

    let mut tables = GameDataTables::new();
    for value in decoded? {
        let map = value
            .as_map()
            .ok_or_else(|| Error::MalformedEntry("gamedata bucket root is not a map".into()))?;
        for (data_type, entries) in map {
            let entries = entries.as_array().ok_or_else(|| {
                Error::MalformedEntry(format!("gamedata bucket '{data_type}' is not an array"))
            })?;
            tables
                .entry(data_type.clone())
                .or_default()
                .extend(entries.iter().cloned());
        }
    }
    Ok(tables)
}

/// Savedata bucket entries of a pack, ordered by their numeric index.
///
/// Ordering by the `_{i}` suffix rather than lexically keeps bucket 10
/// after bucket 9, which matters for identifying the two trailers.
pub fn savedata_buckets(pack: &Pack) -> Result<Vec<(&str, &[u8])>> {
    let mut buckets: Vec<(u64, &str, &[u8])> = pack
        .files()
        .map(|(name, data)| Ok((bucket_index(name)?, name, data)))
        .collect::<Result<_>>()?;
    buckets.sort_by_key(|&(index, _, _)| index);
    Ok(buckets
        .into_iter()
        .map(|(_, name, data)| (name, data))
        .collect())
}

/// Flatten all savedata entry buckets (everything except the two
/// trailers) into one ordered sequence.
pub fn consolidate_savedata(pack: &Pack) -> Result<Vec<Value>> {
    let buckets = savedata_buckets(pack)?;
    let end = buckets.len().saturating_sub(2);

    let mut entries = Vec::new();
    for (name, data) in &buckets[..end] {
        let value = Value::from_binary(data)?;
        entries.extend(bucket_entries(&value, name)?.iter().cloned());
    }
    Ok(entries)
}

/// The entry array of a decoded savedata bucket (`file_list[1]`).
pub fn bucket_entries<'v>(value: &'v Value, name: &str) -> Result<&'v [Value]> {
    value
        .get("file_list")
        .and_then(Value::as_array)
        .and_then(|list| list.get(1))
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedEntry(format!("savedata bucket '{name}' has no file list")))
}

/// Identity of a savedata entry. Fails on a missing or mistyped
/// `HashValue` — a misidentified entry must never be silently dropped.
pub fn entry_hash(entry: &Value) -> Result<i32> {
    entry
        .get("HashValue")
        .and_then(Value::as_i32)
        .ok_or_else(|| Error::MalformedEntry("savedata entry has no HashValue".into()))
}

/// Identity of a gamedata entry. Fails on a missing or mistyped
/// `DataName`.
pub fn entry_name(entry: &Value) -> Result<&str> {
    entry
        .get("DataName")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MalformedEntry("gamedata entry has no DataName".into()))
}

fn bucket_index(name: &str) -> Result<u64> {
    name.rsplit_once('_')
        .and_then(|(_, rest)| rest.split('.').next())
        .and_then(|index| index.parse().ok())
        .ok_or_else(|| Error::MalformedEntry(format!("unrecognized savedata bucket name '{name}'")))
}

fn with_pool<R: Send>(pool: Option<&rayon::ThreadPool>, op: impl FnOnce() -> R + Send) -> R {
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}
