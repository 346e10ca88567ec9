//! Obfuscation layers used by visual novel containers.
//!
//! None of these are cryptographically meaningful; they exist to stop casual
//! inspection of archives. Every function works in place on already-loaded
//! bytes so callers can apply them before or after decompression as the
//! format requires.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`xor`] | GsPack4 index mask, SCW positional XOR, MNP rotate-and-XOR |
//! | [`shuffle`] | PD nibble swap, Banana PK name substitution |
//!
//! ## Where each layer sits
//!
//! ```text
//! GsPack4 index : stored = lzss(index) ^ (i & decode_key)
//! SCW body      : stored = lzss(body)  ^ (i & 0xFF)
//! MNP entry     : stored = rotl3(data) ^ key[i % 32]       (plain)
//!                 stored = mnp_lz(data, rotl3 literals) ^ key[i % 32]
//! PD .def/.dsf  : stored = swap_nibbles(data)
//! Banana name   : stored[i] = name[i] + (len + 1 - i)
//! ```

pub mod shuffle;
pub mod xor;
