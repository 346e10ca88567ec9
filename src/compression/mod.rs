//! Compression and decompression codecs.
//!
//! The LZ codecs are implemented in-crate and always available. Zlib is
//! gated behind the `compression` Cargo feature so that the core library
//! compiles without a deflate backend:
//!
//! ```toml
//! [dependencies]
//! vnkit = { version = "0.1", features = ["compression"] }
//! ```
//!
//! ## Submodules
//!
//! | Module | Algorithm | Typical use in vnkit |
//! |--------|-----------|----------------------|
//! | [`lzss`] | Ring-buffer LZSS (4 KiB window, 3..=18) | Ankh DAT, BND, Banana PK, GsPack4 index, SCW scripts, AKB pixels |
//! | [`mnp`]  | Distance LZ (2 KiB window, 3..=34) | MNP/MMA script payloads |
//! | `zlib`   | Zlib | YOX DAT entries (feature `compression`) |
//!
//! ## Choosing the right function
//!
//! * **Container records the decompressed size** - use
//!   [`lzss::decompress`] with that size as the limit and report a mismatch
//!   with [`lzss::check_size`], or [`lzss::decompress_exact`] when a short
//!   result must be fatal.
//! * **No recorded size** - [`lzss::decompress_to_end`].
//! * **Repacking** - [`lzss::compress_literal`] reproduces what the original
//!   engines' tools write; [`lzss::compress`] produces genuinely smaller
//!   streams that the same decoder accepts.

pub mod lzss;
pub mod mnp;

#[cfg(feature = "compression")]
pub mod zlib;
