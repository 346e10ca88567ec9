//! GsPack4 - GsWin4 engine resource archive (`.pak`).
//!
//! ## Layout
//! ```text
//! [0x000] Header              (0x48 bytes)
//! [...]   Padding to DataOffset (0x800 in packed archives)
//! [DataOffset] FileData       (entries padded to 4 bytes)
//! [IndexOffset] Index         (IndexLength bytes, masked LZSS)
//! ```
//!
//! ## Header (0x48 bytes)
//! ```text
//! [0x00] Magic "GsPack4 abc"  (16 bytes, NUL-padded)
//! [0x10] Description          (32 bytes, "GsPackFile4")
//! [0x30] MinorVersion         (u16 LE)
//! [0x32] MajorVersion         (u16 LE, 4)
//! [0x34] IndexLength          (u32 LE)
//! [0x38] DecodeKey            (u32 LE)
//! [0x3C] IndexEntries         (u32 LE)
//! [0x40] DataOffset           (u32 LE)
//! [0x44] IndexOffset          (u32 LE)
//! ```
//!
//! ## Index
//! Each stored byte `i` is XORed with `i & DecodeKey`; the result is an LZSS
//! stream that must expand to exactly `IndexEntries × 0x48` bytes of:
//! ```text
//! [0x00] Name     (64 bytes, NUL-terminated)
//! [0x40] Offset   - relative to DataOffset (u32 LE)
//! [0x44] Length   (u32 LE)
//! ```
//!
//! Scw4.x scripts inside the archive are handled by [`super::scw`].

use std::io::{Read, Seek, SeekFrom, Take, Write};
use std::ops::Index;

use tracing::debug;

use crate::compression::lzss;
use crate::crypto::xor::xor_index_mask;
use crate::formats::scw;
use crate::utils::{
    align_up, bytesa, bytesv, check_range, display_name, fixed_field, fixed_name, le_u16, le_u32,
    put_le_u16, put_le_u32, put_zeros, stream_len, to_u32,
};
use crate::{Error, Result};

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 0x48;
/// Size of one decompressed index entry.
pub const ENTRY_SIZE: usize = 0x48;
/// Data offset used by packed archives.
pub const DATA_OFFSET: u32 = 0x800;

const MAGIC: &[u8; 11] = b"GsPack4 abc";
const DESCRIPTION: &[u8] = b"GsPackFile4";

/// Parsed GsPack4 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsPackHeader {
    /// `GsPack4 abc`, NUL-padded.
    pub magic: [u8; 16],
    /// Free-form description, `GsPackFile4` in packed archives.
    pub description: [u8; 32],
    /// Minor format version.
    pub minor_version: u16,
    /// Major format version, 4.
    pub major_version: u16,
    /// Stored (compressed) index length.
    pub index_length: u32,
    /// Mask applied to the stored index; zero means unmasked.
    pub decode_key: u32,
    /// Number of index entries.
    pub index_entries: u32,
    /// Base for entry offsets.
    pub data_offset: u32,
    /// Absolute offset of the stored index.
    pub index_offset: u32,
}

impl GsPackHeader {
    /// Header for a new archive: version 4.0, unmasked index, data at 0x800.
    pub fn new() -> Self {
        let mut magic = [0u8; 16];
        magic[..MAGIC.len()].copy_from_slice(MAGIC);
        let mut description = [0u8; 32];
        description[..DESCRIPTION.len()].copy_from_slice(DESCRIPTION);
        Self {
            magic,
            description,
            minor_version: 0,
            major_version: 4,
            index_length: 0,
            decode_key: 0,
            index_entries: 0,
            data_offset: DATA_OFFSET,
            index_offset: 0,
        }
    }

    /// Parse a header. Only the first 11 bytes of the magic are compared.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let magic = bytesa::<16>(r)?;
        if &magic[..MAGIC.len()] != MAGIC {
            return Err(Error::BadMagic);
        }
        Ok(Self {
            magic,
            description: bytesa::<32>(r)?,
            minor_version: le_u16(r)?,
            major_version: le_u16(r)?,
            index_length: le_u32(r)?,
            decode_key: le_u32(r)?,
            index_entries: le_u32(r)?,
            data_offset: le_u32(r)?,
            index_offset: le_u32(r)?,
        })
    }

    /// Write the header, exactly [`HEADER_SIZE`] bytes.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.magic)?;
        w.write_all(&self.description)?;
        put_le_u16(w, self.minor_version)?;
        put_le_u16(w, self.major_version)?;
        put_le_u32(w, self.index_length)?;
        put_le_u32(w, self.decode_key)?;
        put_le_u32(w, self.index_entries)?;
        put_le_u32(w, self.data_offset)?;
        put_le_u32(w, self.index_offset)?;
        Ok(())
    }
}

impl Default for GsPackHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed GsPack4 archive (metadata only).
#[derive(Debug)]
pub struct GsPack {
    /// Parsed header.
    pub header: GsPackHeader,
    /// All entries in index order.
    pub files: Vec<GsPackFile>,
}

/// Metadata for a single GsPack4 entry.
#[derive(Debug, Clone)]
pub struct GsPackFile {
    /// Entry name, possibly containing path separators.
    pub name: String,
    /// Entry name as stored (at most 63 bytes).
    pub raw_name: Vec<u8>,
    /// Offset relative to the header's `data_offset`.
    pub offset: u64,
    /// Stored length, including alignment padding.
    pub size: u64,
}

impl GsPack {
    /// Parse the header and the compressed index.
    ///
    /// The index must expand to exactly `index_entries × 0x48` bytes;
    /// anything else is an [`Error::SizeMismatch`]. Entries reaching past the
    /// end of the stream are an [`Error::InvalidRange`].
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let len = stream_len(r)?;
        let header = GsPackHeader::parse(r)?;
        debug!(
            major = header.major_version,
            minor = header.minor_version,
            entries = header.index_entries,
            key = header.decode_key,
            "parsed GsPack4 header"
        );

        check_range(header.index_offset as u64, header.index_length as u64, len)?;
        let index_size = header.index_entries as u64 * ENTRY_SIZE as u64;
        if index_size > lzss::max_output_len(header.index_length as usize) as u64 {
            return Err(Error::InvalidCount(header.index_entries));
        }

        r.seek(SeekFrom::Start(header.index_offset as u64))?;
        let mut stored = bytesv(r, header.index_length as usize)?;
        xor_index_mask(&mut stored, header.decode_key);
        let index = lzss::decompress_exact(&stored, index_size as usize)?;

        let mut files = Vec::with_capacity(header.index_entries as usize);
        for entry in index.chunks_exact(ENTRY_SIZE) {
            let mut field = [0u8; 4];
            field.copy_from_slice(&entry[0x40..0x44]);
            let offset = u32::from_le_bytes(field) as u64;
            field.copy_from_slice(&entry[0x44..0x48]);
            let size = u32::from_le_bytes(field) as u64;
            check_range(header.data_offset as u64 + offset, size, len)?;
            let raw_name = fixed_name(&entry[..0x40]);
            files.push(GsPackFile {
                name: display_name(&raw_name),
                raw_name,
                offset,
                size,
            });
        }

        Ok(Self { header, files })
    }
}

/// Reader wrapper around a [`GsPack`] archive.
pub struct GsPackReader<R> {
    inner: R,
    /// Parsed metadata.
    pub pack: GsPack,
}

impl<R: Read + Seek> GsPackReader<R> {
    /// Parse a GsPack4 archive and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let pack = GsPack::parse(&mut reader)?;
        Ok(Self {
            inner: reader,
            pack,
        })
    }

    /// Open an entry's stored bytes for streaming access.
    pub fn read_file(&mut self, file: &GsPackFile) -> Result<Take<&mut R>> {
        let start = self.pack.header.data_offset as u64 + file.offset;
        self.inner.seek(SeekFrom::Start(start))?;
        Ok(self.inner.by_ref().take(file.size))
    }

    /// Read an entry, expanding compressed Scw4.x scripts.
    pub fn extract(&mut self, file: &GsPackFile) -> Result<Vec<u8>> {
        let raw = bytesv(&mut self.read_file(file)?, file.size as usize)?;
        scw::decode(&raw)
    }

    /// Iterate over all entries.
    pub fn files(&self) -> impl Iterator<Item = &GsPackFile> {
        self.pack.files.iter()
    }

    /// Find an entry by name. Returns [`None`] if not found.
    pub fn get_file_by_name(&self, name: &str) -> Option<&GsPackFile> {
        self.pack.files.iter().find(|f| f.name == name)
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Index<&str> for GsPackReader<R> {
    type Output = GsPackFile;

    /// # Panics
    /// Panics if the entry does not exist.
    fn index(&self, index: &str) -> &Self::Output {
        self.get_file_by_name(index)
            .unwrap_or_else(|| panic!("no file '{index}' in GsPack4"))
    }
}

/// Write a GsPack4 archive.
///
/// Plain Scw4.x scripts are compressed with [`scw::encode`]; other entries
/// are stored as-is. Each entry is zero-padded to a multiple of 4 bytes and
/// the recorded length includes the padding. The index is written
/// literal-encoded and unmasked after the data. Names are written byte for
/// byte.
pub fn pack<W, N, D>(w: &mut W, files: &[(N, D)]) -> Result<()>
where
    W: Write,
    N: AsRef<[u8]>,
    D: AsRef<[u8]>,
{
    let mut index = Vec::with_capacity(files.len() * ENTRY_SIZE);
    let mut payloads = Vec::with_capacity(files.len());
    let mut offset = 0u64;
    for (name, data) in files {
        let payload = scw::encode(data.as_ref())?;
        let size = align_up(payload.len() as u64, 4);
        index.extend_from_slice(&fixed_field::<0x40>(name.as_ref(), true)?);
        index.extend_from_slice(&to_u32(offset)?.to_le_bytes());
        index.extend_from_slice(&to_u32(size)?.to_le_bytes());
        debug!(
            name = %display_name(name.as_ref()),
            offset,
            size,
            "packing GsPack4 entry"
        );
        offset += size;
        payloads.push(payload);
    }
    let stored_index = lzss::compress_literal(&index);

    let mut header = GsPackHeader::new();
    header.index_entries = to_u32(files.len() as u64)?;
    header.index_length = to_u32(stored_index.len() as u64)?;
    header.index_offset = to_u32(DATA_OFFSET as u64 + offset)?;

    header.write(w)?;
    put_zeros(w, DATA_OFFSET as usize - HEADER_SIZE)?;
    for payload in &payloads {
        w.write_all(payload)?;
        let padded = align_up(payload.len() as u64, 4) as usize;
        put_zeros(w, padded - payload.len())?;
    }
    w.write_all(&stored_index)?;
    Ok(())
}
