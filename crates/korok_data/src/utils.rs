//! Compression and hashing helpers shared across the merge pipeline.

use crate::error::Result;
use xxhash_rust::xxh64::xxh64;

/// Compress data with zstd (level 3), the codec used for boot package
/// sub-entries.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::stream::encode_all(data, 3)?)
}

/// Decompress a zstd-compressed boot package sub-entry.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::stream::decode_all(data)?)
}

/// Content hash used for change detection and merge digests. Not a
/// cryptographic integrity check.
pub fn content_hash(data: &[u8]) -> u64 {
    xxh64(data, 0)
}

/// Hex form of [`content_hash`], as stored in digest log files.
pub fn content_hash_hex(data: &[u8]) -> String {
    format!("{:016x}", content_hash(data))
}
