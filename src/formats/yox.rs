//! YOX DAT - archive with 0x800-aligned entries and optional zlib bodies.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "YOX\0"          (u32 LE 0x00584F59)
//! [0x04] Unknown                (u32 LE, preserved)
//! [0x08] IndexOffset            (u32 LE)
//! [0x0C] Count                  (u32 LE)
//! [...]  FileData
//! [IndexOffset] Index           (Count entries)
//! [...]  Trailer                (unparsed, preserved on repack)
//! ```
//!
//! ## Index entry
//! ```text
//! v1: [0x00] Offset (u32 LE)  [0x04] Size (u32 LE)
//! v2: as v1, followed by 8 opaque bytes
//! ```
//!
//! ## Compressed entries
//! An entry whose data begins with its own `YOX` signature and has flag bit
//! 1 (`& 2`) set carries a zlib body:
//! ```text
//! [0x00] "YOX\0"  [0x04] Flags  [0x08] UnpackedSize  [0x0C] Reserved
//! [0x10] zlib stream
//! ```
//! Inflating requires the `compression` feature.
//!
//! Entries have no stored names; they are exposed as `00000`, `00001`, ...

use std::io::{Read, Seek, SeekFrom, Take, Write};
use std::ops::Index;

use tracing::debug;

use crate::formats::index_name;
use crate::utils::{
    align_up, bytesa, bytesv, check_range, le_u32, put_le_u32, put_zeros, stream_len, to_u32,
};
use crate::{Error, Result};

/// `"YOX\0"` read as a little-endian `u32`.
pub const SIGNATURE: u32 = 0x0058_4F59;
/// Alignment of entry data in repacked archives.
pub const ALIGNMENT: u64 = 0x800;

const HEADER_SIZE: usize = 0x10;
const SUB_HEADER_SIZE: usize = 0x10;
const FLAG_ZLIB: u32 = 2;

/// Index entry layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YoxVersion {
    /// 8-byte entries.
    V1,
    /// 16-byte entries with 8 opaque trailing bytes.
    V2,
}

impl YoxVersion {
    fn entry_size(self) -> u64 {
        match self {
            YoxVersion::V1 => 8,
            YoxVersion::V2 => 16,
        }
    }
}

/// Parsed YOX DAT archive (metadata only).
#[derive(Debug)]
pub struct Yox {
    /// Raw 16-byte header, copied verbatim on repack.
    pub header: [u8; 16],
    /// Index entry layout the archive was parsed with.
    pub version: YoxVersion,
    /// Absolute offset of the index.
    pub index_offset: u64,
    /// All entries in index order.
    pub files: Vec<YoxFile>,
    /// Bytes following the index.
    pub trailer: Vec<u8>,
}

/// Metadata for a single YOX entry.
#[derive(Debug, Clone)]
pub struct YoxFile {
    /// Synthesized name: the zero-padded index position.
    pub name: String,
    /// Bytes of `name`, for symmetry with the named formats.
    pub raw_name: Vec<u8>,
    /// Absolute offset of the stored data (including any sub-header).
    pub offset: u64,
    /// Stored size (including any sub-header).
    pub size: u64,
    /// Opaque v2 entry bytes; zero for v1.
    pub extra: [u8; 8],
}

impl Yox {
    /// Parse the header, index and trailer.
    pub fn parse<R: Read + Seek>(r: &mut R, version: YoxVersion) -> Result<Self> {
        let len = stream_len(r)?;
        let header = bytesa::<HEADER_SIZE>(r)?;
        let field = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&header[at..at + 4]);
            u32::from_le_bytes(b)
        };
        if field(0) != SIGNATURE {
            return Err(Error::BadMagic);
        }
        let index_offset = field(8) as u64;
        let count = field(0xC);
        let index_len = count as u64 * version.entry_size();
        if index_offset.saturating_add(index_len) > len {
            return Err(Error::InvalidCount(count));
        }

        r.seek(SeekFrom::Start(index_offset))?;
        let mut files = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let offset = le_u32(r)? as u64;
            let size = le_u32(r)? as u64;
            let extra = match version {
                YoxVersion::V1 => [0u8; 8],
                YoxVersion::V2 => bytesa::<8>(r)?,
            };
            check_range(offset, size, len)?;
            let name = index_name(i);
            files.push(YoxFile {
                raw_name: name.clone().into_bytes(),
                name,
                offset,
                size,
                extra,
            });
        }
        let trailer = bytesv(r, (len - index_offset - index_len) as usize)?;
        debug!(
            count,
            index_offset,
            trailer = trailer.len(),
            "parsed YOX DAT index"
        );

        Ok(Self {
            header,
            version,
            index_offset,
            files,
            trailer,
        })
    }
}

/// Reader wrapper around a [`Yox`] archive.
pub struct YoxReader<R> {
    inner: R,
    /// Parsed metadata.
    pub yox: Yox,
}

impl<R: Read + Seek> YoxReader<R> {
    /// Parse a YOX DAT and wrap the provided reader.
    pub fn new(mut reader: R, version: YoxVersion) -> Result<Self> {
        let yox = Yox::parse(&mut reader, version)?;
        Ok(Self { inner: reader, yox })
    }

    /// Open an entry's stored bytes (sub-header included) for streaming
    /// access.
    pub fn read_file(&mut self, file: &YoxFile) -> Result<Take<&mut R>> {
        self.inner.seek(SeekFrom::Start(file.offset))?;
        Ok(self.inner.by_ref().take(file.size))
    }

    /// Read an entry, inflating it when it carries a zlib sub-header.
    ///
    /// Without the `compression` feature a zlib entry yields
    /// [`Error::Unsupported`].
    pub fn extract(&mut self, file: &YoxFile) -> Result<Vec<u8>> {
        let raw = bytesv(&mut self.read_file(file)?, file.size as usize)?;
        match zlib_sub_header(&raw) {
            Some(unpacked) => inflate(&raw[SUB_HEADER_SIZE..], unpacked),
            None => Ok(raw),
        }
    }

    /// Iterate over all entries.
    pub fn files(&self) -> impl Iterator<Item = &YoxFile> {
        self.yox.files.iter()
    }

    /// Find an entry by its synthesized name. Returns [`None`] if not found.
    pub fn get_file_by_name(&self, name: &str) -> Option<&YoxFile> {
        self.yox.files.iter().find(|f| f.name == name)
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Index<&str> for YoxReader<R> {
    type Output = YoxFile;

    /// # Panics
    /// Panics if the entry does not exist.
    fn index(&self, index: &str) -> &Self::Output {
        self.get_file_by_name(index)
            .unwrap_or_else(|| panic!("no file '{index}' in YOX DAT"))
    }
}

/// Unpacked size from a zlib sub-header, if `data` starts with one.
fn zlib_sub_header(data: &[u8]) -> Option<usize> {
    if data.len() < SUB_HEADER_SIZE {
        return None;
    }
    let field = |at: usize| {
        let mut b = [0u8; 4];
        b.copy_from_slice(&data[at..at + 4]);
        u32::from_le_bytes(b)
    };
    if field(0) == SIGNATURE && field(4) & FLAG_ZLIB != 0 {
        Some(field(8) as usize)
    } else {
        None
    }
}

#[cfg(feature = "compression")]
fn inflate(data: &[u8], unpacked: usize) -> Result<Vec<u8>> {
    crate::compression::zlib::decompress_zlib(data, unpacked)
}

#[cfg(not(feature = "compression"))]
fn inflate(_data: &[u8], _unpacked: usize) -> Result<Vec<u8>> {
    Err(Error::Unsupported("zlib entries require the `compression` feature"))
}

#[cfg(feature = "compression")]
fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    crate::compression::zlib::compress_zlib(data)
}

#[cfg(not(feature = "compression"))]
fn deflate(_data: &[u8]) -> Result<Vec<u8>> {
    Err(Error::Unsupported("zlib entries require the `compression` feature"))
}

/// Rebuild an archive from `original`'s header, index extras and trailer,
/// with entry contents taken from `files` by entry name (`00000`, ...).
///
/// Entries start at 0x800 and each following entry (and the index) starts at
/// the next 0x800 boundary. With `zlib` set, every entry is deflated behind a
/// sub-header. Every entry of the original must have a replacement.
pub fn repack<W, N, D>(w: &mut W, original: &Yox, files: &[(N, D)], zlib: bool) -> Result<()>
where
    W: Write,
    N: AsRef<[u8]>,
    D: AsRef<[u8]>,
{
    let mut stored = Vec::with_capacity(original.files.len());
    let mut pos = ALIGNMENT;
    for entry in &original.files {
        let data = files
            .iter()
            .find(|(name, _)| name.as_ref() == entry.raw_name.as_slice())
            .map(|(_, data)| data.as_ref())
            .ok_or(Error::Parse("missing replacement for YOX entry"))?;

        let payload = if zlib {
            let packed = deflate(data)?;
            let mut out = Vec::with_capacity(SUB_HEADER_SIZE + packed.len());
            put_le_u32(&mut out, SIGNATURE)?;
            put_le_u32(&mut out, FLAG_ZLIB)?;
            put_le_u32(&mut out, to_u32(data.len() as u64)?)?;
            put_le_u32(&mut out, 0)?;
            out.extend_from_slice(&packed);
            out
        } else {
            data.to_vec()
        };
        debug!(name = %entry.name, offset = pos, size = payload.len(), "packing YOX entry");
        let offset = pos;
        pos = align_up(offset + payload.len() as u64, ALIGNMENT);
        stored.push((offset, payload, entry.extra));
    }
    let index_offset = pos;

    let mut header = original.header;
    header[8..12].copy_from_slice(&to_u32(index_offset)?.to_le_bytes());
    w.write_all(&header)?;
    put_zeros(w, ALIGNMENT as usize - HEADER_SIZE)?;
    for (offset, payload, _) in &stored {
        w.write_all(payload)?;
        let end = offset + payload.len() as u64;
        put_zeros(w, (align_up(end, ALIGNMENT) - end) as usize)?;
    }
    for (offset, payload, extra) in &stored {
        put_le_u32(w, to_u32(*offset)?)?;
        put_le_u32(w, to_u32(payload.len() as u64)?)?;
        if original.version == YoxVersion::V2 {
            w.write_all(extra)?;
        }
    }
    w.write_all(&original.trailer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Archive with plain entries packed back to back, index at the end.
    fn build(version: YoxVersion, entries: &[&[u8]], trailer: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut index = Vec::new();
        let mut offset = HEADER_SIZE as u32;
        for entry in entries {
            index.extend_from_slice(&offset.to_le_bytes());
            index.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            if version == YoxVersion::V2 {
                index.extend_from_slice(&[0xEE; 8]);
            }
            data.extend_from_slice(entry);
            offset += entry.len() as u32;
        }
        let mut out = Vec::new();
        out.extend_from_slice(&SIGNATURE.to_le_bytes());
        out.extend_from_slice(&0x1234u32.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);
        out.extend_from_slice(&index);
        out.extend_from_slice(trailer);
        out
    }

    #[test]
    fn parses_both_index_versions() {
        for version in [YoxVersion::V1, YoxVersion::V2] {
            let bytes = build(version, &[b"first", b"second"], b"tail");
            let mut reader = YoxReader::new(Cursor::new(bytes), version).unwrap();
            assert_eq!(reader.yox.trailer, b"tail");
            let second = reader["00001"].clone();
            assert_eq!(second.offset, 0x10 + 5);
            assert_eq!(reader.extract(&second).unwrap(), b"second");
            if version == YoxVersion::V2 {
                assert_eq!(second.extra, [0xEE; 8]);
            }
        }
    }

    #[test]
    fn repack_aligns_and_preserves_header_and_trailer() {
        let bytes = build(YoxVersion::V2, &[b"a", b"b"], b"tail");
        let original = Yox::parse(&mut Cursor::new(bytes), YoxVersion::V2).unwrap();
        let files = [("00000", vec![1u8; 0x900]), ("00001", vec![2u8; 3])];

        let mut out = Vec::new();
        repack(&mut out, &original, &files, false).unwrap();
        assert_eq!(&out[4..8], &0x1234u32.to_le_bytes());
        assert_eq!(&out[8..12], &0x2000u32.to_le_bytes());
        assert_eq!(out.len(), 0x2000 + 2 * 16 + 4);
        assert!(out[0x1100..0x1800].iter().all(|&b| b == 0));

        let mut reader = YoxReader::new(Cursor::new(out), YoxVersion::V2).unwrap();
        let first = reader["00000"].clone();
        let second = reader["00001"].clone();
        assert_eq!(first.offset, 0x800);
        assert_eq!(first.size, 0x900);
        assert_eq!(second.offset, 0x1800);
        assert_eq!(second.extra, [0xEE; 8]);
        assert_eq!(reader.extract(&second).unwrap(), vec![2u8; 3]);
        assert_eq!(reader.yox.trailer, b"tail");
    }

    #[test]
    fn repack_requires_every_entry() {
        let bytes = build(YoxVersion::V1, &[b"a", b"b"], b"");
        let original = Yox::parse(&mut Cursor::new(bytes), YoxVersion::V1).unwrap();
        let files = [("00000", b"x")];
        assert!(matches!(
            repack(&mut Vec::new(), &original, &files, false),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn sub_header_detection() {
        let mut sub = Vec::new();
        sub.extend_from_slice(&SIGNATURE.to_le_bytes());
        sub.extend_from_slice(&2u32.to_le_bytes());
        sub.extend_from_slice(&99u32.to_le_bytes());
        sub.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(zlib_sub_header(&sub), Some(99));
        sub[4] = 1;
        assert_eq!(zlib_sub_header(&sub), None);
        assert_eq!(zlib_sub_header(b"YOX"), None);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn zlib_repack_round_trips() {
        let bytes = build(YoxVersion::V1, &[b"script"], b"");
        let original = Yox::parse(&mut Cursor::new(bytes), YoxVersion::V1).unwrap();
        let script = b"message message message".repeat(10);
        let mut out = Vec::new();
        repack(&mut out, &original, &[("00000", &script)], true).unwrap();

        let mut reader = YoxReader::new(Cursor::new(out), YoxVersion::V1).unwrap();
        let file = reader["00000"].clone();
        assert_eq!(reader.extract(&file).unwrap(), script);
    }

    #[cfg(not(feature = "compression"))]
    #[test]
    fn zlib_needs_the_compression_feature() {
        let bytes = build(YoxVersion::V1, &[b"script"], b"");
        let original = Yox::parse(&mut Cursor::new(bytes), YoxVersion::V1).unwrap();
        assert!(matches!(
            repack(&mut Vec::new(), &original, &[("00000", b"x")], true),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut bytes = build(YoxVersion::V1, &[b"a"], b"");
        bytes[0] = b'X';
        assert!(matches!(
            Yox::parse(&mut Cursor::new(bytes), YoxVersion::V1),
            Err(Error::BadMagic)
        ));
    }
}
