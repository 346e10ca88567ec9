//! Parsers and packers for visual novel container formats.
//!
//! Each submodule targets one format family. All of them follow the same
//! conventions:
//!
//! * **Generic over** [`std::io::Read`] + [`std::io::Seek`] - pass a
//!   [`std::fs::File`], a [`std::io::Cursor`], or anything else that
//!   implements both traits.
//! * **Metadata first** - `parse` reads headers and tables and builds an
//!   in-memory description of the archive. Entry data is only read on demand.
//! * **Reader wrappers** - archive formats have a matching `*Reader<R>` type
//!   that owns the underlying reader. `read_file` gives bounded raw access via
//!   [`std::io::Take<&mut R>`]; `extract` returns the entry with the format's
//!   compression and obfuscation removed.
//! * **Packers take `(name, bytes)` pairs** - anything whose items are
//!   `(impl AsRef<[u8]>, impl AsRef<[u8]>)` - and write the container to any
//!   [`std::io::Write`]. Directory walking is left to the caller.
//! * **Names are bytes** - games store Shift-JIS names, so every entry keeps
//!   its `raw_name` exactly as stored next to a lossy UTF-8 `name` used for
//!   display and lookup. Passing `raw_name` back to a packer reproduces the
//!   original table.
//!
//! ## Format overview
//!
//! | Module     | Format          | Description |
//! |------------|-----------------|-------------|
//! | [`ankh`]   | Ankh DAT        | Flat table of 12-byte names; optional `snr` LZSS wrapper |
//! | [`bnd`]    | BND             | Nameless table; every entry LZSS-compressed |
//! | [`banana`] | Banana DAT / PK | Obfuscated names, big-endian table fields |
//! | [`gspack`] | GsPack4 PAK     | GsWin4 archive with masked, LZSS-compressed index |
//! | [`scw`]    | Scw4.x          | GsWin4 script with XOR + LZSS body |
//! | [`yox`]    | YOX DAT         | Aligned entries with optional zlib sub-header |
//! | [`pd3`]    | FlyingV3 PD     | Fixed 0x11C-byte directory; nibble-swapped scripts |
//! | [`mma`]    | MNP MMA         | Indexed archive with MNP LZ and keyed XOR entries |
//! | [`akb`]    | AKB             | Delta-filtered LZSS raster image |
//! | [`gcc`]    | AI5WIN GCC      | LZSS BGR plane with a separate alpha plane |

pub mod akb;
pub mod ankh;
pub mod banana;
pub mod bnd;
pub mod gcc;
pub mod gspack;
pub mod mma;
pub mod pd3;
pub mod scw;
pub mod yox;

use crate::{Error, Result};

/// Decoded image, rows top-down, channels in R, G, B(, A) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// 3 for RGB, 4 for RGBA.
    pub channels: u8,
    /// `width * height * channels` bytes.
    pub pixels: Vec<u8>,
}

impl Image {
    /// An image with every pixel set to `fill` (one byte per channel).
    ///
    /// Fails with [`Error::InvalidRange`] instead of aborting when the
    /// buffer cannot be allocated.
    pub(crate) fn filled(width: u32, height: u32, fill: &[u8]) -> Result<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(fill.len()))
            .ok_or(Error::InvalidRange)?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| Error::InvalidRange)?;
        for _ in 0..len / fill.len().max(1) {
            pixels.extend_from_slice(fill);
        }
        Ok(Self {
            width,
            height,
            channels: fill.len() as u8,
            pixels,
        })
    }
}

/// Set of file extensions that select per-entry processing.
///
/// Extensions are matched case-insensitively, with or without the leading
/// dot: `"soc"`, `".soc"` and `".SOC"` are the same entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    extensions: Vec<String>,
}

impl ExtensionSet {
    /// An empty set; nothing matches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extension to the set.
    pub fn with(mut self, extension: &str) -> Self {
        let ext = normalize(extension);
        if !self.extensions.contains(&ext) {
            self.extensions.push(ext);
        }
        self
    }

    /// Whether `name`'s extension (bytes after the last `.`) is in the set.
    ///
    /// Names without a dot never match.
    pub fn matches(&self, name: impl AsRef<[u8]>) -> bool {
        let name = name.as_ref();
        match name.iter().rposition(|&b| b == b'.') {
            Some(dot) => {
                let ext = &name[dot + 1..];
                self.extensions
                    .iter()
                    .any(|e| e.as_bytes().eq_ignore_ascii_case(ext))
            }
            None => false,
        }
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for ExtensionSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::with)
    }
}

fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

/// Name used for entries of formats that store no file names: the entry
/// index, zero-padded to five digits.
pub(crate) fn index_name(index: usize) -> String {
    format!("{index:05}")
}
