//! Zlib (RFC 1950) payloads (requires the `compression` feature).
//!
//! Used by YOX DAT entries whose sub-header flags a compressed body. The
//! decompressed size is always recorded next to the stream, so decoding
//! pre-allocates and verifies it.

#![cfg(feature = "compression")]

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::{Error, Result};

/// Decompress a zlib stream whose decompressed size is known.
///
/// Returns [`Error::Zlib`] on a corrupt stream and [`Error::SizeMismatch`]
/// if the stream does not inflate to exactly `expected` bytes.
pub fn decompress_zlib(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|_| Error::Zlib)?;
    if out.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Compress `data` into a zlib stream at the best compression level.
pub fn compress_zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
