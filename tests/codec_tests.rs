use auscult_node::codecs::{decode_i16le, encode_i16le, sha256_hex};
use proptest::prelude::*;

#[test]
fn sha256_well_known_value() {
    assert_eq!(
        sha256_hex(b"hello"),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
}

#[test]
fn empty_input_digest() {
    assert_eq!(
        sha256_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

proptest! {
    #[test]
    fn digest_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(sha256_hex(&data), sha256_hex(&data));
    }

    #[test]
    fn distinct_payloads_get_distinct_digests(
        a in prop::collection::vec(any::<u8>(), 0..256),
        b in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(sha256_hex(&a), sha256_hex(&b));
    }

    #[test]
    fn int16_roundtrip_error_is_bounded(
        samples in prop::collection::vec(-1.0f32..1.0, 0..256),
    ) {
        let bytes = encode_i16le(&samples);
        prop_assert_eq!(bytes.len(), samples.len() * 2);
        let decoded = decode_i16le(&bytes).expect("aligned bytes");
        for (orig, restored) in samples.iter().zip(decoded.iter()) {
            prop_assert!((orig - restored).abs() <= 1.5 / 32768.0);
        }
    }

    #[test]
    fn decode_rejects_odd_lengths(data in prop::collection::vec(any::<u8>(), 1..256)) {
        prop_assume!(data.len() % 2 == 1);
        prop_assert!(decode_i16le(&data).is_err());
    }
}
