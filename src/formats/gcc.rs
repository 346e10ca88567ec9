//! AI5WIN GCC - LZSS colour plane with a separately stored alpha plane.
//!
//! ## Layout
//! ```text
//! [0x00] Signature 'G24m'     (u32 LE 0x6D343247; see below)
//! [0x04] OffsetX              (i16 LE, image position on the alpha canvas)
//! [0x06] OffsetY              (i16 LE)
//! [0x08] Width                (u16 LE)
//! [0x0A] Height               (u16 LE)
//! [0x0C] AlphaOffset          (u32 LE, length of the colour stream)
//! [0x10] ImageOffset          (u32 LE, preserved)
//! [0x14] Reserved             (u32)
//! [0x18] AlphaWidth           (u16 LE)
//! [0x1A] AlphaHeight          (u16 LE)
//! [0x1C] AlphaControlLen      (u32 LE, ceil(AlphaWidth × AlphaHeight / 8))
//! [0x20] Colour plane         (LZSS, BGR, rows bottom-up)
//! [0x20 + AlphaOffset]
//!        Alpha plane          (AlphaControlLen control bytes, then data)
//! ```
//!
//! ## Signatures
//! * `G24m` - colour plus alpha.
//! * `G24n` - colour only; no alpha plane is read.
//! * `R24m` / `R24n` - a different colour codec, rejected with
//!   [`Error::Unsupported`].
//!
//! ## Alpha plane
//! One byte per canvas pixel, rows bottom-up. All control bytes come first:
//! bit `i % 8` (LSB first) of control byte `i / 8` is clear when pixel `i` is
//! the next data byte. The engine's tools only ever write clear bits; a set
//! bit is reported as [`Error::Unsupported`].
//!
//! The colour image sits on the alpha canvas at `(OffsetX, OffsetY)`,
//! measured from the top-left corner.

use std::io::{Read, Write};

use tracing::debug;

use crate::compression::lzss;
use crate::formats::Image;
use crate::utils::{le_i16, le_u16, le_u32, put_le_i16, put_le_u16, put_le_u32};
use crate::{Error, Result};

/// `'G24m'` read as a little-endian `u32`.
pub const SIGNATURE_G24M: u32 = 0x6D34_3247;
/// `'G24n'` read as a little-endian `u32`.
pub const SIGNATURE_G24N: u32 = 0x6E34_3247;
/// `'R24m'` read as a little-endian `u32`.
pub const SIGNATURE_R24M: u32 = 0x6D34_3252;
/// `'R24n'` read as a little-endian `u32`.
pub const SIGNATURE_R24N: u32 = 0x6E34_3252;

/// Size of the fixed header.
pub const HEADER_SIZE: u32 = 0x20;

/// Parsed GCC header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GccHeader {
    /// One of the `SIGNATURE_*` constants.
    pub signature: u32,
    /// Horizontal position of the image on the alpha canvas.
    pub offset_x: i16,
    /// Vertical position of the image on the alpha canvas.
    pub offset_y: i16,
    /// Image width in pixels.
    pub width: u16,
    /// Image height in pixels.
    pub height: u16,
    /// Length of the compressed colour plane.
    pub alpha_offset: u32,
    /// Opaque offset, carried over from a template when re-encoding.
    pub image_offset: u32,
    /// Unused, zero in encoded files.
    pub reserved: u32,
    /// Alpha canvas width.
    pub alpha_width: u16,
    /// Alpha canvas height.
    pub alpha_height: u16,
    /// Number of alpha control bytes.
    pub alpha_control_len: u32,
}

impl GccHeader {
    /// Parse a header, accepting all four signatures.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let signature = le_u32(r)?;
        if ![SIGNATURE_G24M, SIGNATURE_G24N, SIGNATURE_R24M, SIGNATURE_R24N].contains(&signature) {
            return Err(Error::BadMagic);
        }
        Ok(Self {
            signature,
            offset_x: le_i16(r)?,
            offset_y: le_i16(r)?,
            width: le_u16(r)?,
            height: le_u16(r)?,
            alpha_offset: le_u32(r)?,
            image_offset: le_u32(r)?,
            reserved: le_u32(r)?,
            alpha_width: le_u16(r)?,
            alpha_height: le_u16(r)?,
            alpha_control_len: le_u32(r)?,
        })
    }

    /// Write the header (0x20 bytes).
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        put_le_u32(w, self.signature)?;
        put_le_i16(w, self.offset_x)?;
        put_le_i16(w, self.offset_y)?;
        put_le_u16(w, self.width)?;
        put_le_u16(w, self.height)?;
        put_le_u32(w, self.alpha_offset)?;
        put_le_u32(w, self.image_offset)?;
        put_le_u32(w, self.reserved)?;
        put_le_u16(w, self.alpha_width)?;
        put_le_u16(w, self.alpha_height)?;
        put_le_u32(w, self.alpha_control_len)?;
        Ok(())
    }

    /// Whether the file carries an alpha plane (`?24m`).
    pub fn has_alpha(&self) -> bool {
        self.signature >> 24 == b'm' as u32
    }

    /// Header for re-encoding a `width × height` image.
    ///
    /// Without a template the alpha canvas matches the image. A `?24m`
    /// template lends its position and canvas size; a `?24n` template lends
    /// only its position. Stream lengths are left for the encoder to fill.
    pub fn for_image(width: u16, height: u16, template: Option<&GccHeader>) -> Self {
        let mut header = Self {
            signature: SIGNATURE_G24M,
            offset_x: 0,
            offset_y: 0,
            width,
            height,
            alpha_offset: 0,
            image_offset: HEADER_SIZE,
            reserved: 0,
            alpha_width: width,
            alpha_height: height,
            alpha_control_len: 0,
        };
        if let Some(t) = template {
            header.image_offset = t.image_offset;
            header.offset_x = t.offset_x;
            header.offset_y = t.offset_y;
            if t.has_alpha() {
                header.alpha_width = t.alpha_width;
                header.alpha_height = t.alpha_height;
            }
        }
        header
    }

    /// Top-left corner of the image on the alpha canvas, if the image fits.
    fn placement(&self) -> Result<(usize, usize)> {
        let (ox, oy) = (self.offset_x as i64, self.offset_y as i64);
        if ox < 0
            || oy < 0
            || ox + self.width as i64 > self.alpha_width as i64
            || oy + self.height as i64 > self.alpha_height as i64
        {
            return Err(Error::InvalidRange);
        }
        Ok((ox as usize, oy as usize))
    }
}

/// Decode a GCC image from `r`, consuming it to the end.
///
/// `G24m` files decode to RGBA with alpha taken from the canvas at the
/// image's position, `G24n` files to RGB. A short colour plane is logged and
/// zero-filled.
pub fn decode<R: Read>(r: &mut R) -> Result<Image> {
    let header = GccHeader::parse(r)?;
    if header.signature == SIGNATURE_R24M || header.signature == SIGNATURE_R24N {
        return Err(Error::Unsupported("R24 GCC colour codec"));
    }
    let mut body = Vec::new();
    r.read_to_end(&mut body)?;

    let (w, h) = (header.width as usize, header.height as usize);
    let stride = w * 3;
    let expected = stride * h;
    let colour_len = if header.has_alpha() {
        header.alpha_offset as usize
    } else {
        body.len()
    };
    let colour = body.get(..colour_len).ok_or(Error::UnexpectedEof)?;
    if expected > lzss::max_output_len(colour.len()) {
        return Err(Error::InvalidRange);
    }
    debug!(
        width = w,
        height = h,
        alpha = header.has_alpha(),
        "decoding GCC image"
    );

    let mut bgr = lzss::decompress(colour, expected);
    lzss::check_size("GCC colour plane", expected, bgr.len());
    bgr.resize(expected, 0);

    let alpha = if header.has_alpha() {
        let (ox, oy) = header.placement()?;
        let (aw, ah) = (header.alpha_width as usize, header.alpha_height as usize);
        let plane = decompress_alpha(
            &body[colour_len..],
            header.alpha_control_len as usize,
            aw * ah,
        )?;
        Some((plane, ox, oy, aw, ah))
    } else {
        None
    };

    let channels = if alpha.is_some() { 4 } else { 3 };
    let mut image = Image::filled(w as u32, h as u32, &[0u8; 4][..channels])?;
    for y in 0..h {
        let row = &bgr[(h - 1 - y) * stride..][..stride];
        for x in 0..w {
            let dst = &mut image.pixels[(y * w + x) * channels..][..channels];
            dst[0] = row[x * 3 + 2];
            dst[1] = row[x * 3 + 1];
            dst[2] = row[x * 3];
            if let Some((plane, ox, oy, aw, ah)) = &alpha {
                dst[3] = plane[(ah - 1 - (oy + y)) * aw + ox + x];
            }
        }
    }
    Ok(image)
}

/// Encode RGBA pixels (rows top-down) as a `G24m` file.
///
/// `template` is the header of the file being replaced, if any; see
/// [`GccHeader::for_image`]. Canvas pixels outside the image get alpha 0.
/// The colour plane is literal-encoded, as the engine's own tools do.
pub fn encode<W: Write>(
    w: &mut W,
    width: u32,
    height: u32,
    rgba: &[u8],
    template: Option<&GccHeader>,
) -> Result<()> {
    let (Ok(w16), Ok(h16)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(Error::InvalidRange);
    };
    let (wu, hu) = (width as usize, height as usize);
    let expected = wu * hu * 4;
    if rgba.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: rgba.len(),
        });
    }

    let mut header = GccHeader::for_image(w16, h16, template);
    let (ox, oy) = header.placement()?;
    let (aw, ah) = (header.alpha_width as usize, header.alpha_height as usize);

    let mut bgr = Vec::with_capacity(wu * hu * 3);
    let mut alpha = vec![0u8; aw * ah];
    for y in (0..hu).rev() {
        for x in 0..wu {
            let px = &rgba[(y * wu + x) * 4..][..4];
            bgr.extend_from_slice(&[px[2], px[1], px[0]]);
            alpha[(ah - 1 - (oy + y)) * aw + ox + x] = px[3];
        }
    }

    let colour = lzss::compress_literal(&bgr);
    let alpha = compress_alpha(&alpha);
    header.alpha_offset = u32::try_from(colour.len()).map_err(|_| Error::InvalidRange)?;
    header.alpha_control_len = (aw * ah).div_ceil(8) as u32;
    debug!(
        width,
        height,
        alpha_width = aw,
        alpha_height = ah,
        "encoded GCC image"
    );

    header.write(w)?;
    w.write_all(&colour)?;
    w.write_all(&alpha)?;
    Ok(())
}

/// Store an alpha plane with every pixel as a data byte: one zero control
/// byte per 8 pixels, then the pixels.
pub fn compress_alpha(alpha: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; alpha.len().div_ceil(8)];
    out.extend_from_slice(alpha);
    out
}

/// Expand `expected` alpha pixels from a plane with `control_len` leading
/// control bytes.
pub fn decompress_alpha(data: &[u8], control_len: usize, expected: usize) -> Result<Vec<u8>> {
    if control_len < expected.div_ceil(8) {
        return Err(Error::InvalidRange);
    }
    let control = data.get(..control_len).ok_or(Error::UnexpectedEof)?;
    let pixels = data
        .get(control_len..control_len + expected)
        .ok_or(Error::UnexpectedEof)?;
    if (0..expected).any(|i| control[i / 8] & (1 << (i % 8)) != 0) {
        return Err(Error::Unsupported("GCC alpha back-references"));
    }
    Ok(pixels.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> Vec<u8> {
        (0..w * h)
            .flat_map(|i| [i as u8, (i * 3) as u8, (i * 7) as u8, (255 - i) as u8])
            .collect()
    }

    #[test]
    fn rgba_round_trip_without_template() {
        let rgba = gradient(5, 3);
        let mut gcc = Vec::new();
        encode(&mut gcc, 5, 3, &rgba, None).unwrap();

        let header = GccHeader::parse(&mut gcc.as_slice()).unwrap();
        assert_eq!(header.signature, SIGNATURE_G24M);
        assert_eq!(header.image_offset, HEADER_SIZE);
        assert_eq!((header.alpha_width, header.alpha_height), (5, 3));
        // 45 colour bytes literal-encoded, then 2 control bytes.
        assert_eq!(header.alpha_offset, 45 + 6);
        assert_eq!(header.alpha_control_len, 2);
        assert_eq!(gcc.len(), 0x20 + 51 + 2 + 15);

        let image = decode(&mut gcc.as_slice()).unwrap();
        assert_eq!((image.width, image.height, image.channels), (5, 3, 4));
        assert_eq!(image.pixels, rgba);
    }

    #[test]
    fn colour_plane_is_bottom_up_bgr() {
        // 1x2: top pixel red, bottom pixel blue.
        let rgba = [255, 0, 0, 255, 0, 0, 255, 128];
        let mut gcc = Vec::new();
        encode(&mut gcc, 1, 2, &rgba, None).unwrap();
        let colour = &gcc[0x20..0x20 + 7];
        assert_eq!(colour, &[0xFF, 255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn template_canvas_positions_the_alpha() {
        let template = GccHeader {
            signature: SIGNATURE_G24M,
            offset_x: 1,
            offset_y: 2,
            width: 0,
            height: 0,
            alpha_offset: 0,
            image_offset: 0x1234,
            reserved: 0,
            alpha_width: 4,
            alpha_height: 4,
            alpha_control_len: 0,
        };
        let rgba = gradient(2, 1);
        let mut gcc = Vec::new();
        encode(&mut gcc, 2, 1, &rgba, Some(&template)).unwrap();

        let header = GccHeader::parse(&mut gcc.as_slice()).unwrap();
        assert_eq!(header.image_offset, 0x1234);
        assert_eq!((header.offset_x, header.offset_y), (1, 2));
        let plane = &gcc[0x20 + header.alpha_offset as usize + 2..];
        // Top-down row 2 is stored as row 1 of the bottom-up canvas.
        let mut canvas = [0u8; 16];
        canvas[4 + 1] = rgba[3];
        canvas[4 + 2] = rgba[7];
        assert_eq!(plane, &canvas);

        assert_eq!(decode(&mut gcc.as_slice()).unwrap().pixels, rgba);
    }

    #[test]
    fn no_alpha_template_uses_image_sized_canvas() {
        let template = GccHeader {
            signature: SIGNATURE_G24N,
            ..GccHeader::for_image(9, 9, None)
        };
        let header = GccHeader::for_image(3, 2, Some(&template));
        assert_eq!((header.alpha_width, header.alpha_height), (3, 2));
        assert!(header.has_alpha());
    }

    #[test]
    fn image_outside_canvas_is_rejected() {
        let template = GccHeader {
            offset_x: 3,
            ..GccHeader::for_image(4, 4, None)
        };
        assert!(matches!(
            encode(&mut Vec::new(), 2, 2, &[0; 16], Some(&template)),
            Err(Error::InvalidRange)
        ));
    }

    #[test]
    fn colour_only_files_decode_to_rgb() {
        let header = GccHeader {
            signature: SIGNATURE_G24N,
            ..GccHeader::for_image(1, 1, None)
        };
        let mut gcc = Vec::new();
        header.write(&mut gcc).unwrap();
        gcc.extend_from_slice(&lzss::compress_literal(&[1, 2, 3]));

        let image = decode(&mut gcc.as_slice()).unwrap();
        assert_eq!(image.channels, 3);
        assert_eq!(image.pixels, [3, 2, 1]);
    }

    #[test]
    fn unsupported_and_implausible_files_are_rejected() {
        let mut r24 = Vec::new();
        GccHeader {
            signature: SIGNATURE_R24M,
            ..GccHeader::for_image(1, 1, None)
        }
        .write(&mut r24)
        .unwrap();
        assert!(matches!(
            decode(&mut r24.as_slice()),
            Err(Error::Unsupported(_))
        ));

        let mut huge = Vec::new();
        GccHeader {
            signature: SIGNATURE_G24N,
            ..GccHeader::for_image(0xFFFF, 0xFFFF, None)
        }
        .write(&mut huge)
        .unwrap();
        huge.extend_from_slice(&[0xFF, 1, 2, 3]);
        assert!(matches!(
            decode(&mut huge.as_slice()),
            Err(Error::InvalidRange)
        ));
    }

    #[test]
    fn alpha_plane_rejects_set_control_bits() {
        let mut stored = vec![0u8, 0];
        stored.extend_from_slice(&[9; 9]);
        assert_eq!(compress_alpha(&[9; 9]), stored);
        assert_eq!(decompress_alpha(&compress_alpha(&[9; 9]), 2, 9).unwrap(), [9; 9]);
        assert!(matches!(
            decompress_alpha(&[0x01, 5], 1, 1),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            decompress_alpha(&[0x00, 5], 1, 2),
            Err(Error::UnexpectedEof)
        ));
    }
}
