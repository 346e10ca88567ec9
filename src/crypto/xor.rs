//! Position- and key-driven XOR ciphers.
//!
//! All ciphers here are their own inverse except [`MnpCipher`], whose
//! bit rotation has to be undone in the opposite order.

/// XOR each byte with the low 8 bits of `index & key` (GsPack4 index).
///
/// A key of zero leaves the data untouched.
pub fn xor_index_mask(data: &mut [u8], key: u32) {
    if key == 0 {
        return;
    }
    for (i, b) in data.iter_mut().enumerate() {
        *b ^= (i as u32 & key) as u8;
    }
}

/// XOR each byte with the low 8 bits of its position (SCW script bodies).
pub fn xor_position(data: &mut [u8]) {
    for (i, b) in data.iter_mut().enumerate() {
        *b ^= i as u8;
    }
}

/// Key used by MNP/MMA archives.
pub const MNP_KEY: [u8; 32] = [
    0x77, 0x2C, 0x6F, 0x7A, 0x71, 0x4F, 0x25, 0x74, 0x6C, 0x28, 0x7A, 0x81, 0x4C, 0x31, 0x81, 0x5B,
    0x77, 0x81, 0x4D, 0x79, 0x29, 0x69, 0x45, 0x6B, 0x79, 0x7A, 0x68, 0x2D, 0x69, 0x66, 0x29, 0x39,
];

/// MNP/MMA entry cipher: rotate each byte left by 3, then XOR with a
/// repeating 32-byte key.
///
/// For LZ-compressed entries the rotation is applied to literals during
/// compression instead (see [`crate::compression::mnp`]), so only the XOR
/// layer runs over the stream.
#[derive(Debug, Clone, Copy)]
pub struct MnpCipher {
    key: &'static [u8; 32],
    compressed: bool,
}

impl MnpCipher {
    /// Cipher for a plain (uncompressed) entry.
    pub fn plain() -> Self {
        Self {
            key: &MNP_KEY,
            compressed: false,
        }
    }

    /// Cipher for an LZ-compressed entry.
    pub fn compressed() -> Self {
        Self {
            key: &MNP_KEY,
            compressed: true,
        }
    }

    /// Encrypt `data` in place.
    pub fn encrypt(&self, data: &mut [u8]) {
        for (i, b) in data.iter_mut().enumerate() {
            let v = if self.compressed { *b } else { b.rotate_left(3) };
            *b = v ^ self.key[i % self.key.len()];
        }
    }

    /// Decrypt `data` in place.
    pub fn decrypt(&self, data: &mut [u8]) {
        for (i, b) in data.iter_mut().enumerate() {
            let v = *b ^ self.key[i % self.key.len()];
            *b = if self.compressed { v } else { v.rotate_right(3) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::mnp;

    #[test]
    fn index_mask_is_symmetric_and_keyed() {
        let original: Vec<u8> = (0..=255).collect();
        let mut data = original.clone();
        xor_index_mask(&mut data, 0);
        assert_eq!(data, original);
        xor_index_mask(&mut data, 0xFF);
        assert!(data.iter().all(|&b| b == 0));
        xor_index_mask(&mut data, 0xFF);
        assert_eq!(data, original);
    }

    #[test]
    fn position_xor_wraps_every_256_bytes() {
        let mut data = vec![0u8; 300];
        xor_position(&mut data);
        assert_eq!(data[1], 1);
        assert_eq!(data[256], 0);
        assert_eq!(data[257], 1);
    }

    #[test]
    fn plain_mnp_cipher_round_trips() {
        let original = b"mnp archive entry".to_vec();
        let mut data = original.clone();
        MnpCipher::plain().encrypt(&mut data);
        assert_ne!(data, original);
        assert_eq!(data[0], original[0].rotate_left(3) ^ MNP_KEY[0]);
        MnpCipher::plain().decrypt(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn compressed_pipeline_round_trips() {
        let original = b"repeat repeat repeat repeat".to_vec();
        let mut stream = mnp::compress(&original, true);
        MnpCipher::compressed().encrypt(&mut stream);
        MnpCipher::compressed().decrypt(&mut stream);
        assert_eq!(mnp::decompress(&stream, true).unwrap(), original);
    }
}
