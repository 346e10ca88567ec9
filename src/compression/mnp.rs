//! MNP/MMA LZ - a distance-based LZ77 variant with a 2048-byte window.
//!
//! Unlike [`super::lzss`] this format has no ring buffer: references count
//! back from the end of the output produced so far.
//!
//! ## Stream layout
//! ```text
//! [0x00] Magic 0xC0
//! [0x01] [ctrl] [token] x up to 8  [ctrl] ...
//!
//! ctrl bit (MSB first) = 1  ->  reference: u16 BE word
//!        distance = (word >> 5) + 1         1..=2048
//!        length   = (word & 0x1F) + 3       3..=34
//! ctrl bit (MSB first) = 0  ->  literal: 1 byte
//! ```
//!
//! Archives packed with encryption store literals rotated left by 3 bits;
//! pass `rotate_literals = true` to both directions in that case. The keyed
//! XOR layer on top lives in [`crate::crypto::xor::MnpCipher`].

use crate::{Error, Result};

/// Leading byte of every stream.
pub const MAGIC: u8 = 0xC0;
/// Shortest back-reference.
pub const MIN_MATCH: usize = 3;
/// Longest back-reference.
pub const MAX_MATCH: usize = 34;
/// Farthest back-reference.
pub const MAX_DISTANCE: usize = 2048;

const GROUP: usize = 8;

/// Compress `input` with a greedy nearest-first search over the full window.
pub fn compress(input: &[u8], rotate_literals: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + input.len() + input.len().div_ceil(GROUP));
    out.push(MAGIC);

    let mut pos = 0;
    while pos < input.len() {
        let ctrl_at = out.len();
        out.push(0);
        for bit in 0..GROUP {
            if pos >= input.len() {
                break;
            }
            let (len, distance) = longest_match(input, pos);
            if len >= MIN_MATCH {
                out[ctrl_at] |= 0x80 >> bit;
                let word = (((distance - 1) << 5) | (len - MIN_MATCH)) as u16;
                out.extend_from_slice(&word.to_be_bytes());
                pos += len;
            } else {
                let b = input[pos];
                out.push(if rotate_literals { b.rotate_left(3) } else { b });
                pos += 1;
            }
        }
    }
    out
}

/// Decompress a complete stream.
///
/// Returns [`Error::BadMagic`] if the stream does not start with `0xC0` and
/// [`Error::InvalidRange`] if a reference points before the start of the
/// output. A token cut short by the end of input ends decoding.
pub fn decompress(input: &[u8], rotate_literals: bool) -> Result<Vec<u8>> {
    let (&magic, body) = input.split_first().ok_or(Error::UnexpectedEof)?;
    if magic != MAGIC {
        return Err(Error::BadMagic);
    }

    let mut out = Vec::with_capacity(body.len() * 2);
    let mut src = 0;
    'stream: while src < body.len() {
        let ctrl = body[src];
        src += 1;
        for bit in 0..GROUP {
            if ctrl & (0x80 >> bit) != 0 {
                let Some(pair) = body.get(src..src + 2) else {
                    break 'stream;
                };
                src += 2;
                let word = u16::from_be_bytes([pair[0], pair[1]]) as usize;
                let distance = (word >> 5) + 1;
                let len = (word & 0x1F) + MIN_MATCH;
                if distance > out.len() {
                    return Err(Error::InvalidRange);
                }
                let from = out.len() - distance;
                for k in 0..len {
                    let b = out[from + k];
                    out.push(b);
                }
            } else {
                let Some(&b) = body.get(src) else {
                    break 'stream;
                };
                src += 1;
                out.push(if rotate_literals { b.rotate_right(3) } else { b });
            }
        }
    }
    Ok(out)
}

/// Longest match for `data[pos..]` as `(length, distance)`; ties keep the
/// nearest source.
fn longest_match(data: &[u8], pos: usize) -> (usize, usize) {
    let max_len = MAX_MATCH.min(data.len() - pos);
    let start = pos.saturating_sub(MAX_DISTANCE);
    let ahead = &data[pos..pos + max_len];
    let mut best = (0, 0);

    for p in (start..pos).rev() {
        let len = data[p..]
            .iter()
            .zip(ahead)
            .take_while(|(a, b)| a == b)
            .count();
        if len > best.0 {
            best = (len, pos - p);
            if len == max_len {
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_just_the_magic() {
        assert_eq!(compress(&[], false), [MAGIC]);
        assert!(decompress(&[MAGIC], false).unwrap().is_empty());
    }

    #[test]
    fn run_uses_overlapping_reference() {
        let data = [7u8; 40];
        let packed = compress(&data, false);
        // magic, ctrl, literal, ref(34), ref(5)
        assert_eq!(packed.len(), 1 + 1 + 1 + 2 + 2);
        assert_eq!(packed[1], 0b0110_0000);
        assert_eq!(decompress(&packed, false).unwrap(), data);
    }

    #[test]
    fn rotated_literals_round_trip() {
        let data = b"the quick brown fox jumps over the quick brown dog";
        let plain = compress(data, false);
        let rotated = compress(data, true);
        assert_eq!(plain.len(), rotated.len());
        assert_ne!(plain, rotated);
        assert_eq!(decompress(&rotated, true).unwrap(), data);
        assert_ne!(decompress(&rotated, false).unwrap(), data);
    }

    #[test]
    fn far_matches_stay_inside_window() {
        let mut data: Vec<u8> = (0..3000u32).map(|i| (i * 7 % 256) as u8).collect();
        let head = data[..64].to_vec();
        data.extend_from_slice(&head);
        let packed = compress(&data, false);
        assert_eq!(decompress(&packed, false).unwrap(), data);
    }

    #[test]
    fn rejects_bad_magic_and_bad_distance() {
        assert!(matches!(decompress(&[0x00], false), Err(Error::BadMagic)));
        assert!(matches!(decompress(&[], false), Err(Error::UnexpectedEof)));
        // Reference with distance 1 before any output.
        assert!(matches!(
            decompress(&[MAGIC, 0x80, 0x00, 0x00], false),
            Err(Error::InvalidRange)
        ));
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let packed = compress(b"abcabcabcabc", false);
        let cut = &packed[..packed.len() - 1];
        let out = decompress(cut, false).unwrap();
        assert_eq!(out, b"abc");
    }
}
