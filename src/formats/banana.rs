//! Banana DAT / PK - archive with obfuscated, variable-length names.
//!
//! ## Layout
//! ```text
//! [0x00] Count                    (u32 LE, 1..=10000)
//! [0x04] EntryTable               (Count variable-length entries)
//! [...]  FileData
//! ```
//!
//! ## Entry
//! ```text
//! [0x00]       NameLen            (u8)
//! [0x01]       EncodedName        (NameLen bytes, see crypto::shuffle)
//! [1+NameLen]  Offset - absolute  (u32 BE)
//! [5+NameLen]  Size               (u32 BE)
//! ```
//!
//! ## Notes
//! * Names may contain path separators; they are returned unchanged.
//! * Which entries are LZSS-compressed is not recorded. Games compress
//!   scripts by extension, so callers supply an [`ExtensionSet`]. The stream
//!   is decoded to its end since no decompressed size is stored.

use std::io::{Read, Seek, SeekFrom, Take, Write};
use std::ops::Index;

use tracing::debug;

use crate::compression::lzss;
use crate::crypto::shuffle::{decode_name, encode_name};
use crate::formats::ExtensionSet;
use crate::utils::{
    be_u32, bytesv, check_count, check_range, display_name, le_u32, put_be_u32, put_le_u32,
    put_u8, stream_len, to_u32, u8,
};
use crate::{Error, Result};

const MAX_ENTRIES: u32 = 10_000;

/// Parsed Banana archive (metadata only).
#[derive(Debug)]
pub struct Banana {
    /// All entries in table order.
    pub files: Vec<BananaFile>,
}

/// Metadata for a single Banana entry.
#[derive(Debug, Clone)]
pub struct BananaFile {
    /// Decoded entry name for display and lookup.
    pub name: String,
    /// Decoded entry name as stored, before any UTF-8 conversion.
    pub raw_name: Vec<u8>,
    /// Absolute offset of the stored data.
    pub offset: u64,
    /// Stored size in bytes.
    pub size: u64,
}

impl Banana {
    /// Parse the entry table, decoding every name.
    ///
    /// A name that decodes to control or high bytes, or an empty name, means
    /// the file is not a Banana archive and yields [`Error::Parse`]. Entries
    /// reaching past the end of the stream yield [`Error::InvalidRange`].
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let stream = stream_len(r)?;
        let count = le_u32(r)?;
        check_count(count, MAX_ENTRIES)?;

        let mut files = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = u8(r)? as usize;
            let raw_name = decode_name(&bytesv(r, len)?)?;
            if raw_name.is_empty() {
                return Err(Error::Parse("empty file name"));
            }
            let offset = be_u32(r)? as u64;
            let size = be_u32(r)? as u64;
            check_range(offset, size, stream)?;
            files.push(BananaFile {
                name: display_name(&raw_name),
                raw_name,
                offset,
                size,
            });
        }
        debug!(count, "parsed Banana table");

        Ok(Self { files })
    }
}

/// Reader wrapper around a [`Banana`] archive.
pub struct BananaReader<R> {
    inner: R,
    /// Parsed metadata.
    pub archive: Banana,
}

impl<R: Read + Seek> BananaReader<R> {
    /// Parse a Banana archive and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let archive = Banana::parse(&mut reader)?;
        Ok(Self {
            inner: reader,
            archive,
        })
    }

    /// Open an entry's stored bytes for streaming access.
    pub fn read_file(&mut self, file: &BananaFile) -> Result<Take<&mut R>> {
        self.inner.seek(SeekFrom::Start(file.offset))?;
        Ok(self.inner.by_ref().take(file.size))
    }

    /// Read an entry, decompressing it when its extension is in `compressed`.
    pub fn extract(&mut self, file: &BananaFile, compressed: &ExtensionSet) -> Result<Vec<u8>> {
        let raw = bytesv(&mut self.read_file(file)?, file.size as usize)?;
        if compressed.matches(&file.raw_name) {
            return Ok(lzss::decompress_to_end(&raw));
        }
        Ok(raw)
    }

    /// Iterate over all entries.
    pub fn files(&self) -> impl Iterator<Item = &BananaFile> {
        self.archive.files.iter()
    }

    /// Find an entry by name. Returns [`None`] if not found.
    pub fn get_file_by_name(&self, name: &str) -> Option<&BananaFile> {
        self.archive.files.iter().find(|f| f.name == name)
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Index<&str> for BananaReader<R> {
    type Output = BananaFile;

    /// # Panics
    /// Panics if the entry does not exist.
    fn index(&self, index: &str) -> &Self::Output {
        self.get_file_by_name(index)
            .unwrap_or_else(|| panic!("no file '{index}' in Banana archive"))
    }
}

/// Write a Banana archive, literal-encoding entries whose extension is in
/// `compressed`.
///
/// Names are written byte for byte. Empty names and names with bytes
/// outside `0x20..0xFD` are rejected, since [`Banana::parse`] would refuse
/// the result.
pub fn pack<W, N, D>(w: &mut W, files: &[(N, D)], compressed: &ExtensionSet) -> Result<()>
where
    W: Write,
    N: AsRef<[u8]>,
    D: AsRef<[u8]>,
{
    let count = to_u32(files.len() as u64)?;
    check_count(count, MAX_ENTRIES)?;

    let mut names = Vec::with_capacity(files.len());
    let mut payloads = Vec::with_capacity(files.len());
    for (name, data) in files {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(Error::Parse("empty file name"));
        }
        names.push(encode_name(name)?);
        payloads.push(if compressed.matches(name) {
            lzss::compress_literal(data.as_ref())
        } else {
            data.as_ref().to_vec()
        });
    }

    let table_len: u64 = names.iter().map(|n| 1 + n.len() as u64 + 8).sum();
    let mut offset = 4 + table_len;

    put_le_u32(w, count)?;
    for (name, payload) in names.iter().zip(&payloads) {
        put_u8(w, name.len() as u8)?;
        w.write_all(name)?;
        put_be_u32(w, to_u32(offset)?)?;
        put_be_u32(w, to_u32(payload.len() as u64)?)?;
        offset += payload.len() as u64;
    }
    for payload in &payloads {
        w.write_all(payload)?;
    }
    debug!(count, "packed Banana archive");
    Ok(())
}
