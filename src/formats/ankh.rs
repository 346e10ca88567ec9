//! Ankh DAT - flat archive with a fixed-width name table.
//!
//! ## Layout
//! ```text
//! [0x00] Count                     (u32 LE, 1..=10000)
//! [0x04] EntryTable                (Count × 0x14 bytes)
//! [...]  FileData
//! ```
//!
//! ## Entry (0x14 bytes)
//! ```text
//! [0x00] Name    - NUL-padded, no terminator when full (12 bytes)
//! [0x0C] Size    - stored size in bytes (u32 LE)
//! [0x10] Offset  - absolute from the start of the archive (u32 LE)
//! ```
//!
//! ## `snr` payloads
//! Scenario archives wrap each entry in a small header followed by an LZSS
//! stream (see [`crate::compression::lzss`]):
//! ```text
//! v1: [0x00] "snr"  [0x0C] DecompressedSize (u32 LE)  [0x10] LZSS data
//! v2: [0x00] "snr"  [0x04] DecompressedSize (u32 LE)  [0x08] LZSS data
//! ```
//! Which variant applies is not recorded in the archive; callers pick it
//! with [`SnrVersion`].

use std::io::{Read, Seek, SeekFrom, Take, Write};
use std::ops::Index;

use tracing::debug;

use crate::compression::lzss;
use crate::utils::{
    bytesa, bytesv, check_count, check_range, display_name, fixed_field, fixed_name, le_u32,
    put_le_u32, stream_len, to_u32,
};
use crate::{Error, Result};

const ENTRY_SIZE: u64 = 0x14;
const MAX_ENTRIES: u32 = 10_000;
const SNR_MAGIC: &[u8; 3] = b"snr";

/// Layout of the `snr` wrapper around compressed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnrVersion {
    /// 16-byte header, size at 0x0C.
    V1,
    /// 8-byte header, size at 0x04.
    V2,
}

impl SnrVersion {
    /// Header length preceding the LZSS stream.
    pub fn header_len(self) -> usize {
        match self {
            SnrVersion::V1 => 0x10,
            SnrVersion::V2 => 0x08,
        }
    }

    fn size_offset(self) -> usize {
        match self {
            SnrVersion::V1 => 0x0C,
            SnrVersion::V2 => 0x04,
        }
    }
}

/// Parsed Ankh DAT archive (metadata only).
#[derive(Debug)]
pub struct AnkhDat {
    /// Named entries in table order. Slots with an empty name are dropped.
    pub files: Vec<AnkhFile>,
}

/// Metadata for a single Ankh DAT entry.
#[derive(Debug, Clone)]
pub struct AnkhFile {
    /// Entry name for display and lookup.
    pub name: String,
    /// Entry name as stored (at most 12 bytes).
    pub raw_name: Vec<u8>,
    /// Absolute offset of the stored data.
    pub offset: u64,
    /// Stored size in bytes.
    pub size: u64,
}

impl AnkhDat {
    /// Parse the entry table. The reader must be at the start of the archive.
    ///
    /// Named entries must lie inside the stream.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let len = stream_len(r)?;
        let count = le_u32(r)?;
        check_count(count, MAX_ENTRIES)?;

        let mut files = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw_name = fixed_name(&bytesa::<12>(r)?);
            let size = le_u32(r)? as u64;
            let offset = le_u32(r)? as u64;
            if raw_name.is_empty() {
                continue;
            }
            check_range(offset, size, len)?;
            files.push(AnkhFile {
                name: display_name(&raw_name),
                raw_name,
                offset,
                size,
            });
        }
        debug!(count, named = files.len(), "parsed Ankh DAT table");

        Ok(Self { files })
    }
}

/// Reader wrapper around an [`AnkhDat`] archive.
pub struct AnkhReader<R> {
    inner: R,
    /// Parsed metadata.
    pub dat: AnkhDat,
}

impl<R: Read + Seek> AnkhReader<R> {
    /// Parse an Ankh DAT and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let dat = AnkhDat::parse(&mut reader)?;
        Ok(Self { inner: reader, dat })
    }

    /// Open an entry's stored bytes for streaming access.
    pub fn read_file(&mut self, file: &AnkhFile) -> Result<Take<&mut R>> {
        self.inner.seek(SeekFrom::Start(file.offset))?;
        Ok(self.inner.by_ref().take(file.size))
    }

    /// Read an entry, unwrapping the `snr` layer when `snr` is given.
    ///
    /// A decompressed length that disagrees with the header is logged, not
    /// rejected.
    pub fn extract(&mut self, file: &AnkhFile, snr: Option<SnrVersion>) -> Result<Vec<u8>> {
        let raw = bytesv(&mut self.read_file(file)?, file.size as usize)?;
        match snr {
            Some(version) => unwrap_snr(&raw, version),
            None => Ok(raw),
        }
    }

    /// Iterate over all named entries.
    pub fn files(&self) -> impl Iterator<Item = &AnkhFile> {
        self.dat.files.iter()
    }

    /// Find an entry by name. Returns [`None`] if not found.
    pub fn get_file_by_name(&self, name: &str) -> Option<&AnkhFile> {
        self.dat.files.iter().find(|f| f.name == name)
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Index<&str> for AnkhReader<R> {
    type Output = AnkhFile;

    /// # Panics
    /// Panics if the entry does not exist.
    fn index(&self, index: &str) -> &Self::Output {
        self.get_file_by_name(index)
            .unwrap_or_else(|| panic!("no file '{index}' in Ankh DAT"))
    }
}

/// Strip an `snr` header and decompress the LZSS stream behind it.
pub fn unwrap_snr(data: &[u8], version: SnrVersion) -> Result<Vec<u8>> {
    let header_len = version.header_len();
    if data.len() < header_len {
        return Err(Error::UnexpectedEof);
    }
    if &data[..3] != SNR_MAGIC {
        return Err(Error::BadMagic);
    }
    let at = version.size_offset();
    let mut size = [0u8; 4];
    size.copy_from_slice(&data[at..at + 4]);
    let expected = u32::from_le_bytes(size) as usize;

    let out = lzss::decompress(&data[header_len..], expected);
    lzss::check_size("snr entry", expected, out.len());
    Ok(out)
}

/// Wrap `data` in an `snr` header with a literal-only LZSS body.
pub fn wrap_snr(data: &[u8], version: SnrVersion) -> Result<Vec<u8>> {
    let mut out = vec![0u8; version.header_len()];
    out[..3].copy_from_slice(SNR_MAGIC);
    let at = version.size_offset();
    out[at..at + 4].copy_from_slice(&to_u32(data.len() as u64)?.to_le_bytes());
    out.extend_from_slice(&lzss::compress_literal(data));
    Ok(out)
}

/// Write an Ankh DAT containing `files` in the given order.
///
/// Names are written byte for byte. With `snr` set, every payload is
/// wrapped by [`wrap_snr`].
pub fn pack<W, N, D>(w: &mut W, files: &[(N, D)], snr: Option<SnrVersion>) -> Result<()>
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
        names.push(fixed_field::<12>(name.as_ref(), false)?);
        payloads.push(match snr {
            Some(version) => wrap_snr(data.as_ref(), version)?,
            None => data.as_ref().to_vec(),
        });
    }

    put_le_u32(w, count)?;
    let mut offset = 4 + count as u64 * ENTRY_SIZE;
    for (name, payload) in names.iter().zip(&payloads) {
        w.write_all(name)?;
        put_le_u32(w, to_u32(payload.len() as u64)?)?;
        put_le_u32(w, to_u32(offset)?)?;
        offset += payload.len() as u64;
    }
    for payload in &payloads {
        w.write_all(payload)?;
    }
    debug!(count, snr = ?snr, "packed Ankh DAT");
    Ok(())
}
