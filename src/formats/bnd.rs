//! BND - nameless archive of LZSS-compressed entries.
//!
//! ## Layout
//! ```text
//! [0x00] Count           (u32 LE)
//! [0x04] EntryTable      (Count × 0x0C bytes)
//! [...]  FileData
//! ```
//!
//! ## Entry (0x0C bytes)
//! ```text
//! [0x00] Offset          - absolute (u32 LE)
//! [0x04] DecompressedLen (u32 LE)
//! [0x08] Size            - stored (compressed) size (u32 LE)
//! ```
//!
//! ## Notes
//! * No names are stored; entries are exposed as `00000`, `00001`, ...
//! * Every entry is an LZSS stream; see [`crate::compression::lzss`].

use std::io::{Read, Seek, SeekFrom, Take, Write};
use std::ops::Index;

use tracing::debug;

use crate::compression::lzss;
use crate::formats::index_name;
use crate::utils::{bytesv, check_range, display_name, le_u32, put_le_u32, stream_len, to_u32};
use crate::{Error, Result};

const ENTRY_SIZE: u64 = 0x0C;

/// Parsed BND archive (metadata only).
#[derive(Debug)]
pub struct Bnd {
    /// All entries in table order.
    pub files: Vec<BndFile>,
}

/// Metadata for a single BND entry.
#[derive(Debug, Clone)]
pub struct BndFile {
    /// Synthesized name: the zero-padded table index.
    pub name: String,
    /// Bytes of `name`, for symmetry with the named formats.
    pub raw_name: Vec<u8>,
    /// Absolute offset of the compressed data.
    pub offset: u64,
    /// Compressed size.
    pub size: u64,
    /// Size after decompression, as recorded in the table.
    pub decompressed_size: u64,
}

impl Bnd {
    /// Parse the entry table.
    ///
    /// Fails with [`Error::InvalidCount`] when the table would not fit in the
    /// stream and [`Error::InvalidRange`] when an entry points past its end.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let len = stream_len(r)?;
        let count = le_u32(r)?;
        if 4 + count as u64 * ENTRY_SIZE > len {
            return Err(Error::InvalidCount(count));
        }

        let mut files = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let offset = le_u32(r)? as u64;
            let decompressed_size = le_u32(r)? as u64;
            let size = le_u32(r)? as u64;
            check_range(offset, size, len)?;
            let name = index_name(i);
            files.push(BndFile {
                raw_name: name.clone().into_bytes(),
                name,
                offset,
                size,
                decompressed_size,
            });
        }
        debug!(count, "parsed BND table");

        Ok(Self { files })
    }
}

/// Reader wrapper around a [`Bnd`] archive.
pub struct BndReader<R> {
    inner: R,
    /// Parsed metadata.
    pub bnd: Bnd,
}

impl<R: Read + Seek> BndReader<R> {
    /// Parse a BND and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let bnd = Bnd::parse(&mut reader)?;
        Ok(Self { inner: reader, bnd })
    }

    /// Open an entry's compressed bytes for streaming access.
    pub fn read_file(&mut self, file: &BndFile) -> Result<Take<&mut R>> {
        self.inner.seek(SeekFrom::Start(file.offset))?;
        Ok(self.inner.by_ref().take(file.size))
    }

    /// Read and decompress an entry.
    ///
    /// Output is capped at the recorded size; a shorter result is logged.
    pub fn extract(&mut self, file: &BndFile) -> Result<Vec<u8>> {
        let raw = bytesv(&mut self.read_file(file)?, file.size as usize)?;
        let expected = file.decompressed_size as usize;
        let out = lzss::decompress(&raw, expected);
        lzss::check_size(&file.name, expected, out.len());
        Ok(out)
    }

    /// Iterate over all entries.
    pub fn files(&self) -> impl Iterator<Item = &BndFile> {
        self.bnd.files.iter()
    }

    /// Find an entry by its synthesized name. Returns [`None`] if not found.
    pub fn get_file_by_name(&self, name: &str) -> Option<&BndFile> {
        self.bnd.files.iter().find(|f| f.name == name)
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Index<&str> for BndReader<R> {
    type Output = BndFile;

    /// # Panics
    /// Panics if the entry does not exist.
    fn index(&self, index: &str) -> &Self::Output {
        self.get_file_by_name(index)
            .unwrap_or_else(|| panic!("no file '{index}' in BND"))
    }
}

/// Write a BND archive.
///
/// Entries are stored in name order, so files named `00000`, `00001`, ...
/// keep their original slots. Payloads use the literal-only LZSS encoding.
pub fn pack<W, N, D>(w: &mut W, files: &[(N, D)]) -> Result<()>
where
    W: Write,
    N: AsRef<[u8]>,
    D: AsRef<[u8]>,
{
    let mut sorted: Vec<_> = files.iter().collect();
    sorted.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

    let count = to_u32(sorted.len() as u64)?;
    let mut offset = 4 + count as u64 * ENTRY_SIZE;
    let mut payloads = Vec::with_capacity(sorted.len());

    put_le_u32(w, count)?;
    for (name, data) in sorted {
        let data = data.as_ref();
        let packed = lzss::compress_literal(data);
        put_le_u32(w, to_u32(offset)?)?;
        put_le_u32(w, to_u32(data.len() as u64)?)?;
        put_le_u32(w, to_u32(packed.len() as u64)?)?;
        debug!(
            name = %display_name(name.as_ref()),
            offset,
            size = packed.len(),
            "packing BND entry"
        );
        offset += packed.len() as u64;
        payloads.push(packed);
    }
    for payload in &payloads {
        w.write_all(payload)?;
    }
    Ok(())
}
