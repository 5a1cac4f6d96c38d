// src/codecs/mod.rs
pub mod pcm;

pub use pcm::{decode_i16le, encode_i16le, BYTES_PER_SAMPLE_I16};

use sha2::{Digest, Sha256};

/// SHA-256 digest of `data` as a lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn sha256_is_deterministic() {
        let data = b"auscult-node checksum";
        assert_eq!(sha256_hex(data), sha256_hex(data));
    }
}
