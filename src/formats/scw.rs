//! Scw4.x - GsWin4 compiled script container.
//!
//! ## Layout
//! ```text
//! [0x000] Header  (0x1C4 bytes)
//! [0x1C4] Body    (raw, or XOR-masked LZSS when IsCompressed == -1)
//! ```
//!
//! ## Header (0x1C4 bytes)
//! ```text
//! [0x00] Magic "Scw4.x"              (16 bytes, NUL-padded)
//! [0x10] MinorVersion                (u16 LE)
//! [0x12] MajorVersion                (u16 LE)
//! [0x14] IsCompressed                (i32 LE, -1 = compressed, 0 = plain)
//! [0x18] UncompressedLen             (u32 LE)
//! [0x1C] CompressedLen               (u32 LE)
//! [0x20] Always1                     (u32 LE)
//! [0x24] InstructionTableEntries     (u32 LE)
//! [0x28] StringTableEntries          (u32 LE)
//! [0x2C] UnknownTableEntries         (u32 LE)
//! [0x30] InstructionDataLength       (u32 LE)
//! [0x34] StringDataLength            (u32 LE)
//! [0x38] UnknownDataLength           (u32 LE)
//! [0x3C] Reserved                    (0x188 bytes)
//! ```
//!
//! A compressed body is `lzss(body)` with every byte XORed by its position
//! (see [`crate::crypto::xor::xor_position`]). Decoding is strict: the body
//! must expand to exactly `UncompressedLen` bytes.
//!
//! Data that is too short or lacks the magic is not a script and passes
//! through [`decode`] and [`encode`] unchanged, which lets archive code
//! apply them to every entry.

use std::io::{Read, Write};

use tracing::debug;

use crate::compression::lzss;
use crate::crypto::xor::xor_position;
use crate::utils::{
    bytesa, bytesv, le_i32, le_u16, le_u32, put_le_i32, put_le_u16, put_le_u32, to_u32,
};
use crate::{Error, Result};

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 0x1C4;
const MAGIC: &[u8; 6] = b"Scw4.x";
const RESERVED_SIZE: usize = 0x188;

/// Value of `is_compressed` for an XOR-masked LZSS body.
pub const COMPRESSED: i32 = -1;

/// Parsed Scw4.x header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScwHeader {
    /// `Scw4.x`, NUL-padded.
    pub magic: [u8; 16],
    /// Minor script version.
    pub minor_version: u16,
    /// Major script version.
    pub major_version: u16,
    /// `-1` when the body is compressed, `0` otherwise.
    pub is_compressed: i32,
    /// Body length after decompression.
    pub uncompressed_len: u32,
    /// Stored body length.
    pub compressed_len: u32,
    /// Always 1 in known scripts.
    pub always_1: u32,
    /// Instruction table entry count.
    pub instruction_table_entries: u32,
    /// String table entry count.
    pub string_table_entries: u32,
    /// Third table's entry count; its purpose is unknown.
    pub unknown_table_entries: u32,
    /// Instruction data length in bytes.
    pub instruction_data_length: u32,
    /// String data length in bytes.
    pub string_data_length: u32,
    /// Third table's data length in bytes.
    pub unknown_data_length: u32,
    /// Trailing header bytes, preserved verbatim.
    pub reserved: Vec<u8>,
}

impl ScwHeader {
    /// Parse a header. Returns [`Error::BadMagic`] if the magic is missing.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let magic = bytesa::<16>(r)?;
        if &magic[..MAGIC.len()] != MAGIC {
            return Err(Error::BadMagic);
        }
        Ok(Self {
            magic,
            minor_version: le_u16(r)?,
            major_version: le_u16(r)?,
            is_compressed: le_i32(r)?,
            uncompressed_len: le_u32(r)?,
            compressed_len: le_u32(r)?,
            always_1: le_u32(r)?,
            instruction_table_entries: le_u32(r)?,
            string_table_entries: le_u32(r)?,
            unknown_table_entries: le_u32(r)?,
            instruction_data_length: le_u32(r)?,
            string_data_length: le_u32(r)?,
            unknown_data_length: le_u32(r)?,
            reserved: bytesv(r, RESERVED_SIZE)?,
        })
    }

    /// Write the header, exactly [`HEADER_SIZE`] bytes.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.magic)?;
        put_le_u16(w, self.minor_version)?;
        put_le_u16(w, self.major_version)?;
        put_le_i32(w, self.is_compressed)?;
        put_le_u32(w, self.uncompressed_len)?;
        put_le_u32(w, self.compressed_len)?;
        put_le_u32(w, self.always_1)?;
        put_le_u32(w, self.instruction_table_entries)?;
        put_le_u32(w, self.string_table_entries)?;
        put_le_u32(w, self.unknown_table_entries)?;
        put_le_u32(w, self.instruction_data_length)?;
        put_le_u32(w, self.string_data_length)?;
        put_le_u32(w, self.unknown_data_length)?;
        let mut reserved = self.reserved.clone();
        reserved.resize(RESERVED_SIZE, 0);
        w.write_all(&reserved)?;
        Ok(())
    }
}

/// Whether `data` starts with a complete Scw4.x header.
pub fn is_scw(data: &[u8]) -> bool {
    data.len() >= HEADER_SIZE && data.starts_with(MAGIC)
}

/// Expand a compressed script into its plain form.
///
/// The returned header has `is_compressed = 0` and
/// `compressed_len = uncompressed_len`. Plain scripts and non-script data are
/// returned unchanged.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    if !is_scw(data) {
        return Ok(data.to_vec());
    }
    let mut header = ScwHeader::parse(&mut &data[..HEADER_SIZE])?;
    if header.is_compressed != COMPRESSED {
        return Ok(data.to_vec());
    }

    let body = &data[HEADER_SIZE..];
    let compressed_len = header.compressed_len as usize;
    if compressed_len > body.len() {
        return Err(Error::InvalidRange);
    }
    let mut masked = body[..compressed_len].to_vec();
    xor_position(&mut masked);
    let plain = lzss::decompress_exact(&masked, header.uncompressed_len as usize)?;
    debug!(
        compressed = compressed_len,
        uncompressed = plain.len(),
        "decoded Scw4.x body"
    );

    header.is_compressed = 0;
    header.compressed_len = header.uncompressed_len;
    let mut out = Vec::with_capacity(HEADER_SIZE + plain.len());
    header.write(&mut out)?;
    out.extend_from_slice(&plain);
    Ok(out)
}

/// Compress a plain script (`is_compressed == 0`) with the literal-only
/// LZSS encoding and position mask.
///
/// Scripts flagged with any other value, and non-script data, are returned
/// unchanged.
pub fn encode(data: &[u8]) -> Result<Vec<u8>> {
    if !is_scw(data) {
        return Ok(data.to_vec());
    }
    let mut header = ScwHeader::parse(&mut &data[..HEADER_SIZE])?;
    if header.is_compressed != 0 {
        return Ok(data.to_vec());
    }

    let body = &data[HEADER_SIZE..];
    let mut packed = lzss::compress_literal(body);
    xor_position(&mut packed);

    header.is_compressed = COMPRESSED;
    header.uncompressed_len = to_u32(body.len() as u64)?;
    header.compressed_len = to_u32(packed.len() as u64)?;
    let mut out = Vec::with_capacity(HEADER_SIZE + packed.len());
    header.write(&mut out)?;
    out.extend_from_slice(&packed);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_script(body: &[u8]) -> Vec<u8> {
        let mut magic = [0u8; 16];
        magic[..6].copy_from_slice(MAGIC);
        let header = ScwHeader {
            magic,
            minor_version: 0,
            major_version: 4,
            is_compressed: 0,
            uncompressed_len: body.len() as u32,
            compressed_len: body.len() as u32,
            always_1: 1,
            instruction_table_entries: 2,
            string_table_entries: 3,
            unknown_table_entries: 0,
            instruction_data_length: 8,
            string_data_length: 16,
            unknown_data_length: 0,
            reserved: vec![0xAA; RESERVED_SIZE],
        };
        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn header_is_0x1c4_bytes() {
        let script = plain_script(b"");
        assert_eq!(script.len(), HEADER_SIZE);
        let header = ScwHeader::parse(&mut script.as_slice()).unwrap();
        assert_eq!(header.string_table_entries, 3);
        assert_eq!(header.reserved, vec![0xAA; RESERVED_SIZE]);
    }

    #[test]
    fn encode_then_decode_restores_script() {
        let body = b"instructions and strings".repeat(5);
        let plain = plain_script(&body);
        let packed = encode(&plain).unwrap();

        let header = ScwHeader::parse(&mut &packed[..HEADER_SIZE]).unwrap();
        assert_eq!(header.is_compressed, COMPRESSED);
        assert_eq!(header.uncompressed_len as usize, body.len());
        assert_eq!(
            header.compressed_len as usize,
            body.len() + body.len().div_ceil(8)
        );
        // First body byte is the 0xFF control byte masked with position 0.
        assert_eq!(packed[HEADER_SIZE], 0xFF);
        assert_eq!(packed[HEADER_SIZE + 1], body[0] ^ 1);

        assert_eq!(decode(&packed).unwrap(), plain);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let plain = plain_script(&[0x42; 64]);
        let mut packed = encode(&plain).unwrap();
        packed.truncate(packed.len() - 10);
        assert!(matches!(decode(&packed), Err(Error::InvalidRange)));

        // Shrink the recorded compressed length so the range is valid but
        // the stream ends early.
        packed[0x1C..0x20].copy_from_slice(&20u32.to_le_bytes());
        assert!(matches!(
            decode(&packed),
            Err(Error::SizeMismatch { expected: 64, .. })
        ));
    }

    #[test]
    fn non_scripts_pass_through() {
        assert_eq!(decode(b"plain text").unwrap(), b"plain text");
        assert_eq!(encode(b"plain text").unwrap(), b"plain text");
        let plain = plain_script(b"body");
        assert_eq!(decode(&plain).unwrap(), plain);
    }
}
