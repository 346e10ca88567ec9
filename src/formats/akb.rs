//! AKB - delta-filtered, LZSS-compressed raster image.
//!
//! ## Layout
//! ```text
//! [0x00] Signature 'AKB '      (u32 LE 0x20424B41; 'AKB+' = incremental)
//! [0x04] Width                 (u16 LE, canvas)
//! [0x06] Height                (u16 LE, canvas)
//! [0x08] Flags                 (u32 LE)
//! [0x0C] Background            (4 bytes, B G R A)
//! [0x10] Left                  (i32 LE)
//! [0x14] Top                   (i32 LE)
//! [0x18] Right                 (i32 LE)
//! [0x1C] Bottom                (i32 LE)
//! [0x20] Pixel data            (LZSS, to end of file)
//! ```
//!
//! ## Flags
//! * bit 30 - 24 bits per pixel (BGR); otherwise 32 (BGRX / BGRA)
//! * bit 31 - alpha channel present
//!
//! ## Pixel data
//! Only the inner rectangle `Left..Right × Top..Bottom` is stored, as
//! `(Right - Left) × (Bottom - Top)` pixels with rows bottom-up. Before
//! compression a delta filter is applied over the top-down rows: within the
//! first row each byte is stored minus the byte one pixel to its left; every
//! later byte is stored minus the byte one row above. The decoded inner
//! image is composited onto a canvas filled with the background colour.
//!
//! Incremental (`AKB+`) images reference a base image and are rejected with
//! [`Error::Unsupported`].

use std::io::{Read, Write};

use tracing::debug;

use crate::compression::lzss;
use crate::formats::Image;
use crate::utils::{bytesa, le_i32, le_u16, le_u32, put_le_i32, put_le_u16, put_le_u32};
use crate::{Error, Result};

/// `'AKB '` read as a little-endian `u32`.
pub const SIGNATURE: u32 = 0x2042_4B41;
/// `'AKB+'` read as a little-endian `u32`.
pub const SIGNATURE_INCREMENTAL: u32 = 0x2B42_4B41;

/// Flag bit selecting 24-bit pixels.
pub const FLAG_24BPP: u32 = 0x4000_0000;
/// Flag bit marking an alpha channel.
pub const FLAG_ALPHA: u32 = 0x8000_0000;

/// Parsed AKB header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AkbHeader {
    /// Canvas width in pixels.
    pub width: u16,
    /// Canvas height in pixels.
    pub height: u16,
    /// [`FLAG_24BPP`] and [`FLAG_ALPHA`] bits.
    pub flags: u32,
    /// Canvas colour in B, G, R, A order.
    pub background: [u8; 4],
    /// Left edge of the stored rectangle.
    pub left: i32,
    /// Top edge of the stored rectangle.
    pub top: i32,
    /// Right edge (exclusive).
    pub right: i32,
    /// Bottom edge (exclusive).
    pub bottom: i32,
}

impl AkbHeader {
    /// Parse a header, rejecting incremental images.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        match le_u32(r)? {
            SIGNATURE => {}
            SIGNATURE_INCREMENTAL => return Err(Error::Unsupported("incremental AKB+ image")),
            _ => return Err(Error::BadMagic),
        }
        Ok(Self {
            width: le_u16(r)?,
            height: le_u16(r)?,
            flags: le_u32(r)?,
            background: bytesa::<4>(r)?,
            left: le_i32(r)?,
            top: le_i32(r)?,
            right: le_i32(r)?,
            bottom: le_i32(r)?,
        })
    }

    /// Write the header (0x20 bytes).
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        put_le_u32(w, SIGNATURE)?;
        put_le_u16(w, self.width)?;
        put_le_u16(w, self.height)?;
        put_le_u32(w, self.flags)?;
        w.write_all(&self.background)?;
        put_le_i32(w, self.left)?;
        put_le_i32(w, self.top)?;
        put_le_i32(w, self.right)?;
        put_le_i32(w, self.bottom)?;
        Ok(())
    }

    /// Bytes per stored pixel: 3 or 4.
    pub fn pixel_size(&self) -> usize {
        if self.flags & FLAG_24BPP != 0 { 3 } else { 4 }
    }

    pub fn inner_width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn inner_height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }
}

/// Decode an AKB image from `r`, consuming it to the end.
///
/// A decompressed size different from the inner rectangle's is logged and
/// the missing tail is left zero; an empty result is an error. A rectangle
/// larger than the pixel stream could ever expand to is rejected with
/// [`Error::InvalidRange`] before anything is allocated for it. The result
/// has 3 channels for 24-bit sources and 4 otherwise.
pub fn decode<R: Read>(r: &mut R) -> Result<Image> {
    let header = AkbHeader::parse(r)?;
    let mut compressed = Vec::new();
    r.read_to_end(&mut compressed)?;

    let (iw, ih) = (header.inner_width(), header.inner_height());
    if iw <= 0 || ih <= 0 {
        return Err(Error::InvalidRange);
    }
    let (iw, ih) = (iw as usize, ih as usize);
    let ps = header.pixel_size();
    let stride = iw.checked_mul(ps).ok_or(Error::InvalidRange)?;
    let expected = stride.checked_mul(ih).ok_or(Error::InvalidRange)?;
    debug!(
        width = header.width,
        height = header.height,
        inner_width = iw,
        inner_height = ih,
        bpp = ps * 8,
        "decoding AKB image"
    );

    if expected > lzss::max_output_len(compressed.len()) {
        return Err(Error::InvalidRange);
    }

    let mut stored = lzss::decompress(&compressed, expected);
    if stored.is_empty() {
        return Err(Error::SizeMismatch {
            expected,
            actual: 0,
        });
    }
    lzss::check_size("AKB pixels", expected, stored.len());
    stored.resize(expected, 0);

    let mut inner = flip_rows(&stored, stride);
    restore_delta(&mut inner, stride, ps);
    composite(&header, &inner, iw, ih)
}

/// Encode RGBA pixels (rows top-down) as a 32-bit AKB with alpha.
///
/// The whole canvas is stored, the background is transparent black, and the
/// pixel data is compressed with the greedy LZSS matcher.
pub fn encode<W: Write>(w: &mut W, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let (Ok(w16), Ok(h16)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(Error::InvalidRange);
    };
    if width == 0 || height == 0 {
        return Err(Error::InvalidRange);
    }
    let stride = width as usize * 4;
    let expected = stride * height as usize;
    if rgba.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: rgba.len(),
        });
    }

    let mut pixels = rgba.to_vec();
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    apply_delta(&mut pixels, stride, 4);
    let stored = flip_rows(&pixels, stride);
    let compressed = lzss::compress(&stored);
    debug!(
        width,
        height,
        raw = stored.len(),
        compressed = compressed.len(),
        "encoded AKB image"
    );

    let header = AkbHeader {
        width: w16,
        height: h16,
        flags: FLAG_ALPHA,
        background: [0; 4],
        left: 0,
        top: 0,
        right: width as i32,
        bottom: height as i32,
    };
    header.write(w)?;
    w.write_all(&compressed)?;
    Ok(())
}

/// Reverse the row order of a `stride`-byte-per-row buffer.
fn flip_rows(data: &[u8], stride: usize) -> Vec<u8> {
    data.chunks_exact(stride).rev().flatten().copied().collect()
}

fn restore_delta(pixels: &mut [u8], stride: usize, ps: usize) {
    for i in ps..stride.min(pixels.len()) {
        pixels[i] = pixels[i].wrapping_add(pixels[i - ps]);
    }
    for i in stride..pixels.len() {
        pixels[i] = pixels[i].wrapping_add(pixels[i - stride]);
    }
}

/// Inverse of [`restore_delta`]; runs back to front so every subtraction
/// sees an unfiltered neighbour.
fn apply_delta(pixels: &mut [u8], stride: usize, ps: usize) {
    for i in (stride..pixels.len()).rev() {
        pixels[i] = pixels[i].wrapping_sub(pixels[i - stride]);
    }
    for i in (ps..stride.min(pixels.len())).rev() {
        pixels[i] = pixels[i].wrapping_sub(pixels[i - ps]);
    }
}

fn composite(header: &AkbHeader, inner: &[u8], iw: usize, ih: usize) -> Result<Image> {
    let ps = header.pixel_size();
    let channels = ps;
    let (cw, ch) = (header.width as usize, header.height as usize);
    let [b, g, r, a] = header.background;
    let fill: &[u8] = if channels == 4 { &[r, g, b, a] } else { &[r, g, b] };
    let mut image = Image::filled(header.width as u32, header.height as u32, fill)?;
    let pixels = &mut image.pixels;

    for y in 0..ih {
        let dy = header.top as i64 + y as i64;
        if dy < 0 || dy >= ch as i64 {
            continue;
        }
        for x in 0..iw {
            let dx = header.left as i64 + x as i64;
            if dx < 0 || dx >= cw as i64 {
                continue;
            }
            let src = &inner[(y * iw + x) * ps..][..ps];
            let dst = &mut pixels[(dy as usize * cw + dx as usize) * channels..][..channels];
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            if channels == 4 {
                dst[3] = src[3];
            }
        }
    }

    Ok(image)
}
