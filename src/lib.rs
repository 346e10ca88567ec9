//! **vnkit** - a reusable Rust library for visual novel asset containers.
//!
//! The centre of the crate is the frame-based LZSS codec in
//! [`compression::lzss`], shared by most of the engines below. Every
//! container module parses its tables field by field from any
//! `Read + Seek` source, gives bounded access to raw entries, extracts them
//! with the engine's compression and obfuscation removed, and can write the
//! container back out.
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::ankh`]   | Ankh DAT, optional `snr` LZSS entries |
//! | [`formats::bnd`]    | BND - LZSS-compressed nameless archive |
//! | [`formats::banana`] | Banana DAT / PK - obfuscated names |
//! | [`formats::gspack`] | GsWin4 `GsPack4 abc` PAK |
//! | [`formats::scw`]    | GsWin4 `Scw4.x` scripts |
//! | [`formats::yox`]    | YOX DAT - zlib entries with the `compression` feature |
//! | [`formats::pd3`]    | FlyingV3 PD |
//! | [`formats::akb`]    | AKB raster images |
//! | [`formats::gcc`]    | AI5WIN GCC images with a separate alpha plane |
//! | [`formats::mma`]    | MNP MMA - LZ and XOR coded entries |
//!
//! # Codecs and ciphers
//! | Module | Purpose |
//! |--------|---------|
//! | [`compression::lzss`] | 4 KiB ring-buffer LZSS |
//! | [`compression::mnp`]  | MNP/MMA 2 KiB-window LZ |
//! | [`crypto::xor`]       | Positional and keyed XOR layers |
//! | [`crypto::shuffle`]   | Nibble swap and name substitution |
//!
//! # Logging
//! Size mismatches that the engines tolerate are reported with
//! [`tracing::warn!`]; parse and pack steps emit `debug!` events. The library
//! never installs a subscriber.

pub mod compression;
pub mod crypto;
pub mod error;
pub mod formats;
pub(crate) mod utils;

pub use error::{Error, Result};
