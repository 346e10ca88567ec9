//! FlyingV3 PD - archive with a fixed-size directory.
//!
//! ## Layout
//! ```text
//! [0x00] IndexCount              (u32 LE, directory slots)
//! [0x04] FileCount               (u32 LE, occupied slots)
//! [0x08] Unknown                 (u32)
//! [0x0C] TotalSize               (u32 LE)
//! [0x10] Unknown                 (8 bytes)
//! [0x18] Directory               (IndexCount × 0x11C bytes)
//! [0x18 + IndexCount × 0x11C]
//!        FileData
//! ```
//!
//! ## Directory slot (0x11C bytes)
//! ```text
//! [0x000] Name       (0x108 bytes, NUL-terminated; empty = unused slot)
//! [0x108] Size       (u32 LE)
//! [0x10C] RelOffset  - relative to the data base (u32 LE)
//! [0x110] Unknown    (12 bytes, preserved)
//! ```
//!
//! ## Notes
//! * `.def` and `.dsf` payloads are stored with each byte's nibbles swapped
//!   (see [`crate::crypto::shuffle::swap_nibbles`]).
//! * Repacking copies the original header and directory and only rewrites
//!   the size and offset of each used slot.

use std::io::{Read, Seek, SeekFrom, Take, Write};
use std::ops::Index;

use tracing::{debug, warn};

use crate::crypto::shuffle::swap_nibbles;
use crate::formats::ExtensionSet;
use crate::utils::{bytesv, check_range, display_name, fixed_name, stream_len, to_u32};
use crate::{Error, Result};

const HEADER_SIZE: u64 = 0x18;
const SLOT_SIZE: u64 = 0x11C;
const NAME_SIZE: usize = 0x108;
const MAX_SLOTS: u32 = 10_000;

/// Extensions stored nibble-swapped.
pub fn swapped_extensions() -> ExtensionSet {
    ["def", "dsf"].into_iter().collect()
}

/// Parsed PD archive (metadata only).
#[derive(Debug)]
pub struct Pd3 {
    /// Number of directory slots.
    pub index_count: u32,
    /// Number of occupied slots, as recorded.
    pub file_count: u32,
    /// Total data size, as recorded.
    pub total_size: u32,
    /// Raw header and directory, the first `data_base` bytes of the archive.
    pub directory: Vec<u8>,
    /// Occupied slots in directory order.
    pub files: Vec<Pd3File>,
}

/// Metadata for a single PD entry.
#[derive(Debug, Clone)]
pub struct Pd3File {
    /// Entry name for display and lookup.
    pub name: String,
    /// Entry name as stored.
    pub raw_name: Vec<u8>,
    /// Absolute offset of the stored data.
    pub offset: u64,
    /// Stored size in bytes.
    pub size: u64,
    /// Directory slot this entry occupies.
    pub slot: u32,
}

impl Pd3 {
    /// Parse header and directory.
    ///
    /// Rejects archives with no occupied slot, more occupied slots than
    /// directory slots, or more than 10000 slots.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let len = stream_len(r)?;
        let head = bytesv(r, HEADER_SIZE as usize)?;
        let field = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&head[at..at + 4]);
            u32::from_le_bytes(b)
        };
        let index_count = field(0);
        let file_count = field(4);
        let total_size = field(0xC);
        if file_count == 0 || index_count < file_count || index_count > MAX_SLOTS {
            return Err(Error::InvalidCount(index_count));
        }

        let base = Self::data_base_for(index_count);
        let mut directory = head;
        directory.extend_from_slice(&bytesv(r, (base - HEADER_SIZE) as usize)?);

        let mut files = Vec::new();
        for slot in 0..index_count {
            let at = (HEADER_SIZE + slot as u64 * SLOT_SIZE) as usize;
            let entry = &directory[at..at + SLOT_SIZE as usize];
            if entry[0] == 0 {
                continue;
            }
            let size = slot_field(entry, 0x108) as u64;
            let offset = base + slot_field(entry, 0x10C) as u64;
            check_range(offset, size, len)?;
            let raw_name = fixed_name(&entry[..NAME_SIZE]);
            files.push(Pd3File {
                name: display_name(&raw_name),
                raw_name,
                offset,
                size,
                slot,
            });
        }
        if files.is_empty() {
            return Err(Error::Parse("PD directory has no occupied slots"));
        }
        if files.len() != file_count as usize {
            warn!(
                file_count,
                occupied = files.len(),
                "PD file count differs from occupied slots"
            );
        }
        debug!(index_count, file_count, total_size, "parsed PD directory");

        Ok(Self {
            index_count,
            file_count,
            total_size,
            directory,
            files,
        })
    }

    /// Absolute offset where entry data begins.
    pub fn data_base(&self) -> u64 {
        Self::data_base_for(self.index_count)
    }

    fn data_base_for(index_count: u32) -> u64 {
        HEADER_SIZE + index_count as u64 * SLOT_SIZE
    }
}

fn slot_field(entry: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&entry[at..at + 4]);
    u32::from_le_bytes(b)
}

/// Reader wrapper around a [`Pd3`] archive.
pub struct Pd3Reader<R> {
    inner: R,
    /// Parsed metadata.
    pub pd: Pd3,
}

impl<R: Read + Seek> Pd3Reader<R> {
    /// Parse a PD archive and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let pd = Pd3::parse(&mut reader)?;
        Ok(Self { inner: reader, pd })
    }

    /// Open an entry's stored bytes for streaming access.
    pub fn read_file(&mut self, file: &Pd3File) -> Result<Take<&mut R>> {
        self.inner.seek(SeekFrom::Start(file.offset))?;
        Ok(self.inner.by_ref().take(file.size))
    }

    /// Read an entry, undoing the nibble swap on `.def`/`.dsf` files.
    pub fn extract(&mut self, file: &Pd3File) -> Result<Vec<u8>> {
        let mut data = bytesv(&mut self.read_file(file)?, file.size as usize)?;
        if swapped_extensions().matches(&file.raw_name) {
            swap_nibbles(&mut data);
        }
        Ok(data)
    }

    /// Iterate over all entries.
    pub fn files(&self) -> impl Iterator<Item = &Pd3File> {
        self.pd.files.iter()
    }

    /// Find an entry by name. Returns [`None`] if not found.
    pub fn get_file_by_name(&self, name: &str) -> Option<&Pd3File> {
        self.pd.files.iter().find(|f| f.name == name)
    }

    /// Write a copy of the archive with some entries replaced.
    ///
    /// `files` holds plain (unswapped) contents keyed by the stored entry
    /// name bytes (`raw_name`; a `&str` works for ASCII names); entries
    /// without a replacement keep their stored bytes. Data is laid out
    /// contiguously from the data base in directory order, and every used
    /// slot's size and offset are rewritten to match.
    pub fn repack<W, N, D>(&mut self, w: &mut W, files: &[(N, D)]) -> Result<()>
    where
        W: Write,
        N: AsRef<[u8]>,
        D: AsRef<[u8]>,
    {
        let swapped = swapped_extensions();
        let base = self.pd.data_base();
        let mut directory = self.pd.directory.clone();
        let mut payloads = Vec::with_capacity(self.pd.files.len());
        let mut rel = 0u64;

        for file in self.pd.files.clone() {
            let replacement = files
                .iter()
                .find(|(name, _)| name.as_ref() == file.raw_name.as_slice())
                .map(|(_, data)| data.as_ref());
            let payload = match replacement {
                Some(data) => {
                    let mut data = data.to_vec();
                    if swapped.matches(&file.raw_name) {
                        swap_nibbles(&mut data);
                    }
                    debug!(name = %file.name, size = data.len(), "replacing PD entry");
                    data
                }
                None => bytesv(&mut self.read_file(&file)?, file.size as usize)?,
            };

            let at = (HEADER_SIZE + file.slot as u64 * SLOT_SIZE) as usize;
            directory[at + 0x108..at + 0x10C]
                .copy_from_slice(&to_u32(payload.len() as u64)?.to_le_bytes());
            directory[at + 0x10C..at + 0x110].copy_from_slice(&to_u32(rel)?.to_le_bytes());
            rel += payload.len() as u64;
            if base + rel > u32::MAX as u64 {
                return Err(Error::InvalidRange);
            }
            payloads.push(payload);
        }

        w.write_all(&directory)?;
        for payload in &payloads {
            w.write_all(payload)?;
        }
        Ok(())
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Index<&str> for Pd3Reader<R> {
    type Output = Pd3File;

    /// # Panics
    /// Panics if the entry does not exist.
    fn index(&self, index: &str) -> &Self::Output {
        self.get_file_by_name(index)
            .unwrap_or_else(|| panic!("no file '{index}' in PD archive"))
    }
}
