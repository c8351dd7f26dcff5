//! Pack archive reader/writer.
//!
//! A pack archive is a flat collection of named byte blobs. The boot
//! package and the gamedata/savedata sub-archives are all pack archives.
//!
//! # Wire format
//!
//! ```text
//! [0x00] magic    b"KPAK"
//! [0x04] bom      u16 0xFEFF (stored in archive byte order)
//! [0x06] version  u16 (currently 1)
//! [0x08] count    u32
//! [0x0C] entry table: count x { name_len u32, name bytes, data_off u32, data_len u32 }
//! [....] data region, each blob aligned to 8 bytes
//! ```
//!
//! All integers are stored in the archive's byte order, which the reader
//! detects from the byte-order mark. Entries are written in sorted name
//! order so that the same contents always serialize to identical bytes.

use crate::error::{Error, Result};
use crate::Endian;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::BTreeMap;

const MAGIC: [u8; 4] = *b"KPAK";
const VERSION: u16 = 1;
const DATA_ALIGN: usize = 8;

/// A parsed, read-only pack archive.
pub struct Pack {
    data: Vec<u8>,
    entries: BTreeMap<String, (usize, usize)>,
    endian: Endian,
}

impl Pack {
    /// Parse a pack archive from raw bytes.
    ///
    /// The byte order is detected from the header's byte-order mark.
    pub fn from_binary(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        let mut pos = 0usize;

        let magic = take(&data, &mut pos, 4)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic.to_vec()));
        }

        let bom = BigEndian::read_u16(take(&data, &mut pos, 2)?);
        let endian = match bom {
            0xFEFF => Endian::Big,
            0xFFFE => Endian::Little,
            other => return Err(Error::InvalidByteOrderMark(other)),
        };

        match endian {
            Endian::Big => Self::parse::<BigEndian>(data, pos, endian),
            Endian::Little => Self::parse::<LittleEndian>(data, pos, endian),
        }
    }

    fn parse<E: ByteOrder>(data: Vec<u8>, mut pos: usize, endian: Endian) -> Result<Self> {
        let version = E::read_u16(take(&data, &mut pos, 2)?);
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let count = E::read_u32(take(&data, &mut pos, 4)?) as usize;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let name_len = E::read_u32(take(&data, &mut pos, 4)?) as usize;
            let name = String::from_utf8(take(&data, &mut pos, name_len)?.to_vec())?;
            let data_off = E::read_u32(take(&data, &mut pos, 4)?) as usize;
            let data_len = E::read_u32(take(&data, &mut pos, 4)?) as usize;

            if data_off.checked_add(data_len).is_none_or(|end| end > data.len()) {
                return Err(Error::Truncated {
                    offset: data_off,
                    needed: data_len,
                    available: data.len().saturating_sub(data_off),
                });
            }
            entries.insert(name, (data_off, data_len));
        }

        Ok(Self {
            data,
            entries,
            endian,
        })
    }

    /// Get the raw bytes of an entry by name.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .get(name)
            .map(|&(off, len)| &self.data[off..off + len])
    }

    /// Iterate over all entries in sorted name order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, &(off, len))| (name.as_str(), &self.data[off..off + len]))
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive contains no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Byte order the archive was serialized with.
    pub fn endian(&self) -> Endian {
        self.endian
    }
}

/// Builder for writing a pack archive.
///
/// Entries are held in a [`BTreeMap`] so that serialization order (and
/// therefore the output bytes) is deterministic regardless of insertion
/// order.
pub struct PackWriter {
    pub endian: Endian,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl PackWriter {
    /// Create an empty writer targeting the given byte order.
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            files: BTreeMap::new(),
        }
    }

    /// Create a writer pre-populated with every entry of an existing
    /// archive, keeping its byte order. Used to rewrite an archive with
    /// a few entries replaced.
    pub fn from_pack(pack: &Pack) -> Self {
        Self {
            endian: pack.endian(),
            files: pack
                .files()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
        }
    }

    /// Serialize the archive to bytes.
    pub fn to_binary(&self) -> Vec<u8> {
        match self.endian {
            Endian::Big => self.write::<BigEndian>(),
            Endian::Little => self.write::<LittleEndian>(),
        }
    }

    fn write<E: ByteOrder>(&self) -> Vec<u8> {
        // Header + entry table size, so data offsets can be computed up front.
        let table_len: usize = self
            .files
            .keys()
            .map(|name| 4 + name.len() + 4 + 4)
            .sum::<usize>()
            + 12;
        let mut data_off = align_up(table_len, DATA_ALIGN);

        let mut offsets = Vec::with_capacity(self.files.len());
        for data in self.files.values() {
            offsets.push(data_off);
            data_off = align_up(data_off + data.len(), DATA_ALIGN);
        }

        let mut out = Vec::with_capacity(data_off);
        out.extend_from_slice(&MAGIC);
        match self.endian {
            Endian::Big => out.extend_from_slice(&[0xFE, 0xFF]),
            Endian::Little => out.extend_from_slice(&[0xFF, 0xFE]),
        }
        put_u16::<E>(&mut out, VERSION);
        put_u32::<E>(&mut out, self.files.len() as u32);

        for ((name, data), off) in self.files.iter().zip(&offsets) {
            put_u32::<E>(&mut out, name.len() as u32);
            out.extend_from_slice(name.as_bytes());
            put_u32::<E>(&mut out, *off as u32);
            put_u32::<E>(&mut out, data.len() as u32);
        }

        for (data, off) in self.files.values().zip(&offsets) {
            out.resize(*off, 0);
            out.extend_from_slice(data);
        }
        out.resize(align_up(out.len(), DATA_ALIGN), 0);

        out
    }
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).filter(|&end| end <= data.len()).ok_or(
        Error::Truncated {
            offset: *pos,
            needed: len,
            available: data.len().saturating_sub(*pos),
        },
    )?;
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}

fn put_u16<E: ByteOrder>(out: &mut Vec<u8>, value: u16) {
    let mut buf = [0u8; 2];
    E::write_u16(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn put_u32<E: ByteOrder>(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    E::write_u32(&mut buf, value);
    out.extend_from_slice(&buf);
}
