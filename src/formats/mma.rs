//! MNP MMA - indexed archive with MNP LZ and keyed XOR entries.
//!
//! ## Layout
//! ```text
//! [0x00] Signature       (4 bytes, preserved)
//! [0x04] IndexOffset     (u32 LE)
//! [0x08] Unknown         (2 × u32, preserved)
//! [0x10] FileCount       (u32 LE)
//! [...]  FileData
//! [IndexOffset] Index    (FileCount × 0x14 bytes)
//! ```
//!
//! ## Index entry (0x14 bytes)
//! ```text
//! [0x00] Offset     - absolute (u32 LE)
//! [0x04] OrgSize    - size after decoding (u32 LE)
//! [0x08] Size       - stored size, block prefix included (u32 LE)
//! [0x0C] BlockSize  - length of an opaque prefix before the payload (u32 LE)
//! [0x10] Flags      (u32 LE, preserved)
//! ```
//!
//! ## Entry coding
//! Whether payloads are compressed ([`crate::compression::mnp`]) and
//! encrypted ([`MnpCipher`]) is not recorded per entry; callers pass an
//! [`MmaCoding`]. Entry names live in a newline-separated listing, normally
//! the first entry; see [`Mma::apply_listing`].
//!
//! Repacking copies the original archive, appends every replaced entry
//! (prefix first) after it and rewrites the index in place.

use std::io::{self, Read, Seek, SeekFrom, Take, Write};
use std::ops::Index;

use tracing::debug;

use crate::compression::{lzss, mnp};
use crate::crypto::xor::MnpCipher;
use crate::formats::index_name;
use crate::utils::{
    bytesa, bytesv, check_range, display_name, le_u32, put_le_u32, stream_len, to_u32,
};
use crate::{Error, Result};

const ENTRY_SIZE: u64 = 0x14;

/// How entry payloads are coded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MmaCoding {
    /// Payloads are MNP LZ streams.
    pub compressed: bool,
    /// Payloads are XORed with the MNP key.
    pub encrypted: bool,
}

impl MmaCoding {
    fn cipher(self) -> MnpCipher {
        if self.compressed {
            MnpCipher::compressed()
        } else {
            MnpCipher::plain()
        }
    }

    /// Remove encryption and compression from a payload.
    pub fn decode(self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut data = payload.to_vec();
        if self.encrypted {
            self.cipher().decrypt(&mut data);
        }
        if self.compressed {
            data = mnp::decompress(&data, self.encrypted)?;
        }
        Ok(data)
    }

    /// Inverse of [`MmaCoding::decode`].
    pub fn encode(self, data: &[u8]) -> Vec<u8> {
        let mut out = if self.compressed {
            mnp::compress(data, self.encrypted)
        } else {
            data.to_vec()
        };
        if self.encrypted {
            self.cipher().encrypt(&mut out);
        }
        out
    }
}

/// Parsed MMA archive (metadata only).
#[derive(Debug)]
pub struct Mma {
    /// Raw signature bytes.
    pub signature: [u8; 4],
    /// Absolute offset of the index.
    pub index_offset: u64,
    /// All entries in index order.
    pub files: Vec<MmaFile>,
}

/// Metadata for a single MMA entry.
#[derive(Debug, Clone)]
pub struct MmaFile {
    /// Entry name: the zero-padded index until a listing is applied.
    pub name: String,
    /// Entry name bytes.
    pub raw_name: Vec<u8>,
    /// Absolute offset of the stored block.
    pub offset: u64,
    /// Size after decoding, as recorded.
    pub org_size: u32,
    /// Stored size, prefix included.
    pub size: u64,
    /// Length of the opaque prefix.
    pub block_size: u32,
    /// Opaque flags.
    pub flags: u32,
}

impl Mma {
    /// Parse the header and index.
    ///
    /// An index that does not fit in the stream is an
    /// [`Error::InvalidCount`]; an entry outside the stream, or with a prefix
    /// longer than the entry, is an [`Error::InvalidRange`].
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let len = stream_len(r)?;
        let signature = bytesa::<4>(r)?;
        let index_offset = le_u32(r)? as u64;
        bytesa::<8>(r)?;
        let count = le_u32(r)?;
        if index_offset.saturating_add(count as u64 * ENTRY_SIZE) > len {
            return Err(Error::InvalidCount(count));
        }

        r.seek(SeekFrom::Start(index_offset))?;
        let mut files = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let offset = le_u32(r)? as u64;
            let org_size = le_u32(r)?;
            let size = le_u32(r)? as u64;
            let block_size = le_u32(r)?;
            let flags = le_u32(r)?;
            check_range(offset, size, len)?;
            if block_size as u64 > size {
                return Err(Error::InvalidRange);
            }
            let name = index_name(i);
            files.push(MmaFile {
                raw_name: name.clone().into_bytes(),
                name,
                offset,
                org_size,
                size,
                block_size,
                flags,
            });
        }
        debug!(count, index_offset, "parsed MMA index");

        Ok(Self {
            signature,
            index_offset,
            files,
        })
    }

    /// Name entries from a decoded listing: one line per entry, in index
    /// order. Only the last path component of each line is kept.
    ///
    /// A listing whose line count differs from the entry count is an
    /// [`Error::InvalidCount`] and leaves the names untouched.
    pub fn apply_listing(&mut self, listing: &[u8]) -> Result<()> {
        let lines: Vec<&[u8]> = listing
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
            .collect();
        if lines.len() != self.files.len() {
            return Err(Error::InvalidCount(lines.len() as u32));
        }
        for (file, line) in self.files.iter_mut().zip(lines) {
            let start = line
                .iter()
                .rposition(|&b| b == b'/' || b == b'\\')
                .map_or(0, |i| i + 1);
            file.raw_name = line[start..].to_vec();
            file.name = display_name(&file.raw_name);
        }
        Ok(())
    }
}

/// Reader wrapper around an [`Mma`] archive.
pub struct MmaReader<R> {
    inner: R,
    /// Parsed metadata.
    pub mma: Mma,
}

impl<R: Read + Seek> MmaReader<R> {
    /// Parse an MMA archive and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let mma = Mma::parse(&mut reader)?;
        Ok(Self { inner: reader, mma })
    }

    /// Open an entry's stored block (prefix included) for streaming access.
    pub fn read_file(&mut self, file: &MmaFile) -> Result<Take<&mut R>> {
        self.inner.seek(SeekFrom::Start(file.offset))?;
        Ok(self.inner.by_ref().take(file.size))
    }

    /// Read an entry's payload, skipping the prefix and undoing `coding`.
    ///
    /// A decoded size different from `org_size` is logged.
    pub fn extract(&mut self, file: &MmaFile, coding: MmaCoding) -> Result<Vec<u8>> {
        let stored = bytesv(&mut self.read_file(file)?, file.size as usize)?;
        let data = coding.decode(&stored[file.block_size as usize..])?;
        lzss::check_size(&file.name, file.org_size as usize, data.len());
        Ok(data)
    }

    /// Iterate over all entries.
    pub fn files(&self) -> impl Iterator<Item = &MmaFile> {
        self.mma.files.iter()
    }

    /// Find an entry by name. Returns [`None`] if not found.
    pub fn get_file_by_name(&self, name: &str) -> Option<&MmaFile> {
        self.mma.files.iter().find(|f| f.name == name)
    }

    /// Write a copy of the archive with some entries replaced.
    ///
    /// `files` holds plain contents keyed by `raw_name`. Replaced entries are
    /// appended after the original bytes with their prefix copied in front
    /// and their payload coded with `coding`; the index is rewritten at its
    /// original offset. Entries without a replacement keep their index
    /// record.
    pub fn repack<W, N, D>(&mut self, w: &mut W, files: &[(N, D)], coding: MmaCoding) -> Result<()>
    where
        W: Write,
        N: AsRef<[u8]>,
        D: AsRef<[u8]>,
    {
        let len = stream_len(&mut self.inner)?;
        let mut index = Vec::with_capacity(self.mma.files.len() * ENTRY_SIZE as usize);
        let mut appended = Vec::new();
        let mut next = len;

        for file in self.mma.files.clone() {
            let replacement = files
                .iter()
                .find(|(name, _)| name.as_ref() == file.raw_name.as_slice())
                .map(|(_, data)| data.as_ref());
            let (offset, org_size, size) = match replacement {
                Some(data) => {
                    let prefix = bytesv(&mut self.read_file(&file)?, file.block_size as usize)?;
                    let payload = coding.encode(data);
                    let stored = prefix.len() as u64 + payload.len() as u64;
                    debug!(name = %file.name, offset = next, size = stored, "appending MMA entry");
                    let offset = next;
                    next += stored;
                    appended.push(prefix);
                    appended.push(payload);
                    (offset, to_u32(data.len() as u64)?, stored)
                }
                None => (file.offset, file.org_size, file.size),
            };
            put_le_u32(&mut index, to_u32(offset)?)?;
            put_le_u32(&mut index, org_size)?;
            put_le_u32(&mut index, to_u32(size)?)?;
            put_le_u32(&mut index, file.block_size)?;
            put_le_u32(&mut index, file.flags)?;
        }
        to_u32(next)?;

        let index_end = self.mma.index_offset + index.len() as u64;
        self.inner.seek(SeekFrom::Start(0))?;
        io::copy(&mut self.inner.by_ref().take(self.mma.index_offset), w)?;
        w.write_all(&index)?;
        self.inner.seek(SeekFrom::Start(index_end))?;
        io::copy(&mut self.inner.by_ref().take(len - index_end), w)?;
        for block in &appended {
            w.write_all(block)?;
        }
        Ok(())
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Index<&str> for MmaReader<R> {
    type Output = MmaFile;

    /// # Panics
    /// Panics if the entry does not exist.
    fn index(&self, index: &str) -> &Self::Output {
        self.get_file_by_name(index)
            .unwrap_or_else(|| panic!("no file '{index}' in MMA archive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const LISTING: &[u8] = b"data\\list.txt\r\nscript\\main.mns\r\n";

    /// Archive holding a plain listing and one coded script with a 4-byte
    /// prefix, index at the end.
    fn build(coding: MmaCoding, script: &[u8]) -> Vec<u8> {
        let payload = coding.encode(script);
        let mut out = Vec::new();
        out.extend_from_slice(b"MMA\0");
        let index_offset = 0x14 + LISTING.len() + 4 + payload.len();
        out.extend_from_slice(&(index_offset as u32).to_le_bytes());
        out.extend_from_slice(&[0xAA; 8]);
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(LISTING);
        out.extend_from_slice(b"PRFX");
        out.extend_from_slice(&payload);

        let entries = [
            (0x14, LISTING.len(), LISTING.len(), 0, 0),
            (0x14 + LISTING.len(), script.len(), 4 + payload.len(), 4, 7),
        ];
        for (offset, org, size, block, flags) in entries {
            for v in [offset, org, size, block, flags] {
                out.extend_from_slice(&(v as u32).to_le_bytes());
            }
        }
        out
    }

    fn packed() -> MmaCoding {
        MmaCoding {
            compressed: true,
            encrypted: true,
        }
    }

    #[test]
    fn extracts_coded_entry_behind_prefix() {
        let script = b"call call call call start".to_vec();
        let mut reader = MmaReader::new(Cursor::new(build(packed(), &script))).unwrap();
        let file = reader["00001"].clone();
        assert_eq!(file.block_size, 4);
        assert_eq!(reader.extract(&file, packed()).unwrap(), script);

        let mut stored = Vec::new();
        reader.read_file(&file).unwrap().read_to_end(&mut stored).unwrap();
        assert_eq!(&stored[..4], b"PRFX");
        assert_eq!(stored[4], mnp::MAGIC ^ crate::crypto::xor::MNP_KEY[0]);
    }

    #[test]
    fn listing_names_entries() {
        let mut mma = Mma::parse(&mut Cursor::new(build(MmaCoding::default(), b"x"))).unwrap();
        mma.apply_listing(LISTING).unwrap();
        assert_eq!(mma.files[0].name, "list.txt");
        assert_eq!(mma.files[1].raw_name, b"main.mns");
        assert!(matches!(
            mma.apply_listing(b"only_one\n"),
            Err(Error::InvalidCount(1))
        ));
        assert_eq!(mma.files[1].name, "main.mns");
    }

    #[test]
    fn repack_appends_and_rewrites_index() {
        let original = build(packed(), b"old script");
        let mut reader = MmaReader::new(Cursor::new(original.clone())).unwrap();
        reader.mma.apply_listing(LISTING).unwrap();

        let new_script = b"new script new script new script".to_vec();
        let mut out = Vec::new();
        reader
            .repack(&mut out, &[("main.mns", &new_script)], packed())
            .unwrap();

        let index_offset = reader.mma.index_offset as usize;
        assert_eq!(&out[..index_offset], &original[..index_offset]);
        assert!(out.len() > original.len());

        let mut repacked = MmaReader::new(Cursor::new(out)).unwrap();
        let listing = repacked.mma.files[0].clone();
        assert_eq!(listing.offset, 0x14);
        let script = repacked.mma.files[1].clone();
        assert_eq!(script.offset, original.len() as u64);
        assert_eq!(script.org_size as usize, new_script.len());
        assert_eq!((script.block_size, script.flags), (4, 7));
        assert_eq!(repacked.extract(&script, packed()).unwrap(), new_script);

        let mut stored = Vec::new();
        repacked.read_file(&script).unwrap().read_to_end(&mut stored).unwrap();
        assert_eq!(&stored[..4], b"PRFX");
    }

    #[test]
    fn plain_encrypted_entries_round_trip() {
        let coding = MmaCoding {
            compressed: false,
            encrypted: true,
        };
        let data = b"uncompressed but rotated".to_vec();
        let stored = coding.encode(&data);
        assert_eq!(stored.len(), data.len());
        assert_eq!(stored[0], data[0].rotate_left(3) ^ crate::crypto::xor::MNP_KEY[0]);
        assert_eq!(coding.decode(&stored).unwrap(), data);
    }

    #[test]
    fn corrupt_index_is_rejected() {
        let mut bytes = build(MmaCoding::default(), b"abc");
        bytes[0x10..0x14].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            Mma::parse(&mut Cursor::new(bytes)),
            Err(Error::InvalidCount(1000))
        ));

        let mut bytes = build(MmaCoding::default(), b"abc");
        let last = bytes.len() - 8;
        // Prefix longer than the entry.
        bytes[last..last + 4].copy_from_slice(&0x100u32.to_le_bytes());
        assert!(matches!(
            Mma::parse(&mut Cursor::new(bytes)),
            Err(Error::InvalidRange)
        ));
    }
}
