//! Byte substitutions that are not XOR based.

use crate::{Error, Result};

/// Swap the high and low nibble of every byte (PD `.def`/`.dsf` payloads).
///
/// Applying it twice restores the input.
pub fn swap_nibbles(data: &mut [u8]) {
    for b in data.iter_mut() {
        *b = b.rotate_left(4);
    }
}

/// Bytes a Banana PK name may contain. Shift-JIS lead and trail bytes fall
/// inside this range.
const NAME_BYTES: std::ops::Range<u8> = 0x20..0xFD;

/// Decode a Banana PK file name into its raw bytes.
///
/// Each byte was stored as `c + key`, with `key` starting at `len + 1` and
/// decreasing by one per byte (all arithmetic modulo 256). Decoded bytes
/// outside `0x20..0xFD` mean the table is not a Banana index and produce an
/// error.
pub fn decode_name(encoded: &[u8]) -> Result<Vec<u8>> {
    let mut key = (encoded.len() as u8).wrapping_add(1);
    let mut name = Vec::with_capacity(encoded.len());
    for &b in encoded {
        let c = b.wrapping_sub(key);
        if !NAME_BYTES.contains(&c) {
            return Err(Error::Parse("invalid character in encoded file name"));
        }
        name.push(c);
        key = key.wrapping_sub(1);
    }
    Ok(name)
}

/// Encode a Banana PK file name. Inverse of [`decode_name`].
///
/// Names longer than 255 bytes do not fit the one-byte length field, and
/// bytes outside `0x20..0xFD` would not decode again.
pub fn encode_name(name: &[u8]) -> Result<Vec<u8>> {
    if name.len() > u8::MAX as usize {
        return Err(Error::NameTooLong(name.len()));
    }
    if name.iter().any(|c| !NAME_BYTES.contains(c)) {
        return Err(Error::Parse("file name byte outside 0x20..0xFD"));
    }
    let mut key = (name.len() as u8).wrapping_add(1);
    Ok(name
        .iter()
        .map(|&c| {
            let e = c.wrapping_add(key);
            key = key.wrapping_sub(1);
            e
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_swap_is_an_involution() {
        let mut data = vec![0x12, 0xAB, 0xF0];
        swap_nibbles(&mut data);
        assert_eq!(data, [0x21, 0xBA, 0x0F]);
        swap_nibbles(&mut data);
        assert_eq!(data, [0x12, 0xAB, 0xF0]);
    }

    #[test]
    fn name_key_counts_down_from_length_plus_one() {
        let encoded = encode_name(b"abc").unwrap();
        assert_eq!(encoded, [b'a' + 4, b'b' + 3, b'c' + 2]);
        assert_eq!(decode_name(&encoded).unwrap(), b"abc");
    }

    #[test]
    fn shift_jis_names_round_trip_byte_for_byte() {
        let name = [0x82, 0xA0, b'.', b's', b'o', b'c'];
        let encoded = encode_name(&name).unwrap();
        assert_eq!(encoded.len(), name.len());
        assert_eq!(decode_name(&encoded).unwrap(), name);
    }

    #[test]
    fn decoding_rejects_control_characters() {
        assert!(decode_name(&[0x01]).is_err());
        assert!(encode_name("x".repeat(256).as_bytes()).is_err());
        assert!(decode_name(&[]).unwrap().is_empty());
    }

    #[test]
    fn encoding_rejects_bytes_that_would_not_decode() {
        let cases: [&[u8]; 3] = [b"tab\there", &[b'a', 0xFD], &[0x1F]];
        for bad in cases {
            assert!(matches!(encode_name(bad), Err(Error::Parse(_))));
        }
    }
}
