//! Frame-based LZSS, the ring-buffer LZ77 variant shared by most of the
//! engines in this crate.
//!
//! ## Stream layout
//! ```text
//! [ctrl] [token] x up to 8  [ctrl] [token] x up to 8  ...
//!
//! ctrl bit (LSB first) = 1  ->  literal:    1 byte, copied as-is
//! ctrl bit (LSB first) = 0  ->  reference:  2 bytes lo, hi
//!        offset = ((hi & 0xF0) << 4) | lo    absolute window position (12 bits)
//!        count  = (hi & 0x0F) + 3            3..=18 bytes
//! ```
//!
//! ## Window
//! A 4096-byte ring buffer filled with `0x00`, write cursor starting at
//! `0xFEE`. Every produced byte is stored at the cursor. References are
//! copied one byte at a time so that a source range overlapping the
//! destination replicates periodic patterns.
//!
//! ## Termination
//! The stream carries no end marker. Decoding stops when the caller's output
//! limit is reached or the input runs out, whichever happens first; a token
//! cut short by the end of input is dropped. The number of bytes produced is
//! reported rather than treated as an error, matching how the containers
//! record (and loosely trust) a decompressed length.
//!
//! ## Encoders
//! * [`compress_literal`] - the encoder every packer in this crate uses:
//!   groups of 8 literals behind a `0xFF` control byte. Never emits a
//!   reference, so packed archives grow by one byte in eight.
//! * [`compress`] - a greedy hash-chain matcher for callers that want real
//!   compression (AKB images).

use tracing::warn;

use crate::{Error, Result};

/// Default ring-buffer size.
pub const WINDOW_SIZE: usize = 0x1000;
/// Default ring-buffer fill byte.
pub const WINDOW_FILL: u8 = 0x00;
/// Default initial write cursor.
pub const WINDOW_START: usize = 0xFEE;
/// Shortest back-reference.
pub const MIN_MATCH: usize = 3;
/// Longest back-reference.
pub const MAX_MATCH: usize = 18;

const GROUP: usize = 8;
const OFFSET_LIMIT: usize = 0x1000;

/// Window parameters for an LZSS stream.
///
/// The defaults match every container in this crate; engines that seed the
/// window differently can build their own with [`LzssConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzssConfig {
    window_size: usize,
    fill: u8,
    start: usize,
}

impl Default for LzssConfig {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            fill: WINDOW_FILL,
            start: WINDOW_START,
        }
    }
}

impl LzssConfig {
    /// Build a configuration.
    ///
    /// `window_size` must be a non-zero power of two; `start` is reduced
    /// modulo the window size.
    pub fn new(window_size: usize, fill: u8, start: usize) -> Result<Self> {
        if !window_size.is_power_of_two() {
            return Err(Error::Parse("LZSS window size must be a power of two"));
        }
        Ok(Self {
            window_size,
            fill,
            start: start & (window_size - 1),
        })
    }

    /// Ring-buffer size in bytes.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Byte the window is filled with before decoding.
    pub fn fill(&self) -> u8 {
        self.fill
    }

    /// Initial write cursor.
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    fn mask(&self) -> usize {
        self.window_size - 1
    }
}

struct Window {
    buf: Vec<u8>,
    pos: usize,
    mask: usize,
}

impl Window {
    fn new(config: &LzssConfig) -> Self {
        Self {
            buf: vec![config.fill; config.window_size],
            pos: config.start,
            mask: config.mask(),
        }
    }

    #[inline]
    fn push(&mut self, b: u8) {
        self.buf[self.pos] = b;
        self.pos = (self.pos + 1) & self.mask;
    }

    #[inline]
    fn get(&self, at: usize) -> u8 {
        self.buf[at & self.mask]
    }
}

/// Core decoding loop. Returns the number of bytes handed to `emit`.
fn expand<F: FnMut(u8)>(input: &[u8], limit: usize, config: &LzssConfig, mut emit: F) -> usize {
    let mut window = Window::new(config);
    let mut src = 0;
    let mut produced = 0;

    'stream: while src < input.len() {
        let ctrl = input[src];
        src += 1;
        for bit in 0..GROUP {
            if produced >= limit {
                break 'stream;
            }
            if ctrl & (1 << bit) != 0 {
                let Some(&b) = input.get(src) else {
                    break 'stream;
                };
                src += 1;
                window.push(b);
                emit(b);
                produced += 1;
            } else {
                if src + 1 >= input.len() {
                    break 'stream;
                }
                let lo = input[src] as usize;
                let hi = input[src + 1] as usize;
                src += 2;
                let offset = ((hi & 0xF0) << 4) | lo;
                let count = MIN_MATCH + (hi & 0x0F);
                for k in 0..count {
                    if produced >= limit {
                        break 'stream;
                    }
                    let v = window.get(offset + k);
                    window.push(v);
                    emit(v);
                    produced += 1;
                }
            }
        }
    }
    produced
}

/// Decompress into a caller-sized buffer.
///
/// Fills at most `output.len()` bytes and returns how many were produced,
/// which is less than `output.len()` when the input is exhausted first.
pub fn decompress_into(input: &[u8], output: &mut [u8], config: &LzssConfig) -> usize {
    let limit = output.len();
    let mut n = 0;
    expand(input, limit, config, |b| {
        output[n] = b;
        n += 1;
    })
}

/// Decompress at most `limit` bytes using the default window.
///
/// Short output is not an error; compare the length against the container's
/// recorded size (see [`check_size`]) or use [`decompress_exact`].
pub fn decompress(input: &[u8], limit: usize) -> Vec<u8> {
    decompress_with(input, limit, &LzssConfig::default())
}

/// Decompress at most `limit` bytes with an explicit window configuration.
pub fn decompress_with(input: &[u8], limit: usize, config: &LzssConfig) -> Vec<u8> {
    // A reference expands two input bytes into at most 18 output bytes.
    let bound = input.len().saturating_mul(MAX_MATCH / 2);
    let mut out = Vec::with_capacity(limit.min(bound));
    expand(input, limit, config, |b| out.push(b));
    out
}

/// Decompress until the input is exhausted.
///
/// For containers that do not record the decompressed length.
pub fn decompress_to_end(input: &[u8]) -> Vec<u8> {
    decompress_with(input, usize::MAX, &LzssConfig::default())
}

/// Decompress exactly `expected` bytes.
///
/// Returns [`Error::SizeMismatch`] if the input runs out first.
pub fn decompress_exact(input: &[u8], expected: usize) -> Result<Vec<u8>> {
    let out = decompress(input, expected);
    if out.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Upper bound on the bytes a stream of `input_len` bytes can decode to.
///
/// A group of eight maximum-length references takes 17 input bytes and
/// yields 144, so no stream expands by more than a factor of 9. Callers use
/// this to reject recorded sizes before allocating for them.
pub fn max_output_len(input_len: usize) -> usize {
    input_len.saturating_mul(9)
}

/// Log a warning when a decoded payload is not the size its container
/// recorded. Returns whether the sizes agree.
pub fn check_size(context: &str, expected: usize, actual: usize) -> bool {
    if expected != actual {
        warn!(
            context,
            expected, actual, "decompressed size differs from recorded size"
        );
        return false;
    }
    true
}

/// Literal-only encoding: every group of up to 8 bytes is preceded by a
/// `0xFF` control byte.
///
/// The output is `n + ceil(n / 8)` bytes long. A short final group keeps the
/// full `0xFF` control byte; the decoder stops when the input runs out.
pub fn compress_literal(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len().div_ceil(GROUP));
    for chunk in input.chunks(GROUP) {
        out.push(0xFF);
        out.extend_from_slice(chunk);
    }
    out
}

/// Compress with a greedy longest-match search using the default window.
pub fn compress(input: &[u8]) -> Vec<u8> {
    compress_with(input, &LzssConfig::default())
}

/// Compress with a greedy longest-match search.
///
/// References only point at bytes of `input` itself (never at the window's
/// initial fill) and stay within `window_size - 18` bytes of the cursor, so
/// the source is still in the ring when the decoder copies it.
pub fn compress_with(input: &[u8], config: &LzssConfig) -> Vec<u8> {
    let mask = config.mask();
    let max_distance = config.window_size.saturating_sub(MAX_MATCH);
    let encodable = |src: usize| (config.start + src) & mask < OFFSET_LIMIT;

    let mut out = Vec::with_capacity(input.len() + input.len().div_ceil(GROUP));
    let mut finder = MatchFinder::new(input.len());
    let mut pos = 0;
    let mut ctrl_at = 0;
    let mut bit = GROUP;

    while pos < input.len() {
        if bit == GROUP {
            ctrl_at = out.len();
            out.push(0);
            bit = 0;
        }

        let (len, src) = finder.longest(input, pos, max_distance, encodable);
        if len >= MIN_MATCH {
            let ring = (config.start + src) & mask;
            out.push((ring & 0xFF) as u8);
            out.push((((ring >> 4) & 0xF0) | (len - MIN_MATCH)) as u8);
            for p in pos..pos + len {
                finder.insert(input, p);
            }
            pos += len;
        } else {
            out[ctrl_at] |= 1 << bit;
            out.push(input[pos]);
            finder.insert(input, pos);
            pos += 1;
        }
        bit += 1;
    }
    out
}

const HASH_BITS: u32 = 12;
const MAX_CHAIN: usize = 256;
const NONE: usize = usize::MAX;

/// Hash chains over 3-byte prefixes, newest position first.
struct MatchFinder {
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl MatchFinder {
    fn new(len: usize) -> Self {
        Self {
            head: vec![NONE; 1 << HASH_BITS],
            prev: vec![NONE; len],
        }
    }

    #[inline]
    fn hash(data: &[u8], pos: usize) -> usize {
        let h = (data[pos] as usize) << 8 ^ (data[pos + 1] as usize) << 4 ^ data[pos + 2] as usize;
        h & ((1 << HASH_BITS) - 1)
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH > data.len() {
            return;
        }
        let h = Self::hash(data, pos);
        self.prev[pos] = self.head[h];
        self.head[h] = pos;
    }

    /// Longest match for `data[pos..]`, as `(length, source position)`.
    fn longest<F: Fn(usize) -> bool>(
        &self,
        data: &[u8],
        pos: usize,
        max_distance: usize,
        accept: F,
    ) -> (usize, usize) {
        if pos + MIN_MATCH > data.len() {
            return (0, 0);
        }
        let max_len = MAX_MATCH.min(data.len() - pos);
        let mut best = (0, 0);
        let mut cand = self.head[Self::hash(data, pos)];
        let mut steps = 0;

        while cand != NONE && steps < MAX_CHAIN {
            if pos - cand > max_distance {
                break;
            }
            if accept(cand) {
                let mut len = 0;
                while len < max_len && data[cand + len] == data[pos + len] {
                    len += 1;
                }
                if len > best.0 {
                    best = (len, cand);
                    if len == max_len {
                        break;
                    }
                }
            }
            cand = self.prev[cand];
            steps += 1;
        }
        best
    }
}
