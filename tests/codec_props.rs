use hamarc::hamming::{HammingCodec, HammingConfig};
use proptest::prelude::*;

/// (k, r) pairs whose parity checks reach every codeword position.
fn covered_config() -> impl Strategy<Value = HammingConfig> {
    (1u32..=16, 1u32..=8).prop_filter_map("parity does not cover the codeword", |(k, r)| {
        HammingConfig::new(k, r).ok().filter(|c| c.covers_all_positions())
    })
}

proptest! {
    #[test]
    fn stream_roundtrip(cfg in covered_config(), data in prop::collection::vec(any::<u8>(), 0..600)) {
        let codec = HammingCodec::new(cfg);
        let mut encoded = Vec::new();
        let written = codec.encode_stream(&data[..], &mut encoded).unwrap();
        prop_assert_eq!(written, cfg.encoded_size(data.len() as u64));
        prop_assert_eq!(encoded.len() as u64, written);

        let mut decoded = Vec::new();
        let stats = codec.decode_stream(&encoded[..], &mut decoded, data.len() as u64, written).unwrap();
        prop_assert_eq!(stats.corrected, 0);
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn any_single_flip_is_repaired(cfg in covered_config(), data in any::<u32>(), bit in any::<u32>()) {
        let codec = HammingCodec::new(cfg);
        let data = data & ((1u32 << cfg.data_bits()) - 1);
        let bit = bit % cfg.codeword_bits();

        let codeword = codec.encode_block(data);
        prop_assert_eq!(codec.syndrome(codeword), 0);
        prop_assert_eq!(codec.decode_block(codeword ^ (1 << bit)).data(), Some(data));
    }

    #[test]
    fn one_flip_per_codeword_in_a_stream(cfg in covered_config(), data in prop::collection::vec(any::<u8>(), 1..200), seed in any::<u64>()) {
        let codec = HammingCodec::new(cfg);
        let mut encoded = Vec::new();
        codec.encode_stream(&data[..], &mut encoded).unwrap();

        let n = cfg.codeword_bits() as u64;
        let codewords = cfg.codeword_count(data.len() as u64);
        for cw in 0..codewords {
            let bit = cw * n + (seed.wrapping_add(cw.wrapping_mul(7)) % n);
            encoded[(bit / 8) as usize] ^= 1 << (bit % 8);
        }

        let mut decoded = Vec::new();
        let stats = codec
            .decode_stream(&encoded[..], &mut decoded, data.len() as u64, encoded.len() as u64)
            .unwrap();
        prop_assert_eq!(stats.codewords, codewords);
        prop_assert_eq!(stats.corrected, codewords);
        prop_assert_eq!(decoded, data);
    }
}
