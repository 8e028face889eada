//! Configurable Hamming single-error-correcting block code.
//!
//! # Bit layout
//! Codeword positions are 1-indexed over `1..=k+r`.  Every power-of-two
//! position holds a parity bit; the remaining positions hold data bits in
//! increasing order (data bit 0 lands on position 3).  Parity bit `p` is the
//! XOR of every position whose index has bit `p` set, so the set of failing
//! checks on decode spells out the position of a single flipped bit.
//!
//! Position `i` is stored at bit `i - 1` of the `u32` codeword.  This layout
//! is the archive's compatibility contract: any change produces archives
//! that older builds cannot read.
//!
//! # Coverage
//! A `(k, r)` pair only gets full single-error correction when
//! `2^r >= k + r + 1`.  Under-provisioned pairs are accepted (the parity
//! positions are derived from the codeword width, not from `r`) but silently
//! drop data bits that have no free position.  [`HammingConfig::validate_coverage`]
//! is the opt-in guard.

mod stream;

pub use stream::{BitReader, BitWriter, DecodeStats};

use std::io;
use thiserror::Error;

/// Upper bound for `k`.
pub const MAX_DATA_BITS:       u32 = 16;
/// Upper bound for `r`.
pub const MAX_PARITY_BITS:     u32 = 8;
pub const DEFAULT_DATA_BITS:   u32 = 8;
pub const DEFAULT_PARITY_BITS: u32 = 4;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum HammingError {
    #[error("Invalid Hamming parameters: {0}")]
    InvalidConfig(String),
    /// More than one bit flipped inside a codeword.  No data is produced.
    #[error("Uncorrectable data corruption in codeword {block}")]
    Uncorrectable { block: u64 },
    #[error("Encoded stream ends early at codeword {block}")]
    Truncated { block: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── HammingConfig ────────────────────────────────────────────────────────────

/// Block code parameters: `k` data bits and `r` parity bits per codeword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HammingConfig {
    data_bits:   u32,
    parity_bits: u32,
}

impl Default for HammingConfig {
    fn default() -> Self {
        Self { data_bits: DEFAULT_DATA_BITS, parity_bits: DEFAULT_PARITY_BITS }
    }
}

impl HammingConfig {
    pub fn new(data_bits: u32, parity_bits: u32) -> Result<Self, HammingError> {
        if !(1..=MAX_DATA_BITS).contains(&data_bits) {
            return Err(HammingError::InvalidConfig(format!(
                "data bits must be in 1..={MAX_DATA_BITS}, got {data_bits}"
            )));
        }
        if !(1..=MAX_PARITY_BITS).contains(&parity_bits) {
            return Err(HammingError::InvalidConfig(format!(
                "parity bits must be in 1..={MAX_PARITY_BITS}, got {parity_bits}"
            )));
        }
        Ok(Self { data_bits, parity_bits })
    }

    #[inline]
    pub fn data_bits(self) -> u32 { self.data_bits }

    #[inline]
    pub fn parity_bits(self) -> u32 { self.parity_bits }

    #[inline]
    pub fn codeword_bits(self) -> u32 { self.data_bits + self.parity_bits }

    /// `true` when every data bit has a position and every single-bit error
    /// is addressable by the syndrome (`2^r >= k + r + 1`).
    pub fn covers_all_positions(self) -> bool {
        (1u32 << self.parity_bits) > self.codeword_bits()
    }

    pub fn validate_coverage(self) -> Result<(), HammingError> {
        if self.covers_all_positions() {
            Ok(())
        } else {
            Err(HammingError::InvalidConfig(format!(
                "{} parity bits cannot protect a {}-bit codeword (need 2^r >= k + r + 1)",
                self.parity_bits,
                self.codeword_bits(),
            )))
        }
    }

    /// Number of codewords needed for `original_size` bytes.
    pub fn codeword_count(self, original_size: u64) -> u64 {
        let bits = original_size as u128 * 8;
        saturate(bits.div_ceil(self.data_bits as u128))
    }

    /// On-disk size of `original_size` bytes once encoded:
    /// `ceil(ceil(bytes * 8 / k) * (k + r) / 8)`.
    pub fn encoded_size(self, original_size: u64) -> u64 {
        let bits = original_size as u128 * 8;
        let codewords = bits.div_ceil(self.data_bits as u128);
        saturate((codewords * self.codeword_bits() as u128).div_ceil(8))
    }
}

fn saturate(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

// ── Block codec ──────────────────────────────────────────────────────────────

/// Result of decoding one codeword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDecode {
    Clean(u32),
    /// A single bit at 1-indexed `position` was flipped back.
    Corrected { data: u32, position: u32 },
    Uncorrectable,
}

impl BlockDecode {
    pub fn data(self) -> Option<u32> {
        match self {
            BlockDecode::Clean(d) | BlockDecode::Corrected { data: d, .. } => Some(d),
            BlockDecode::Uncorrectable => None,
        }
    }
}

/// Hamming encoder/decoder for one [`HammingConfig`].
///
/// The parity masks and data positions are computed once at construction;
/// block encode/decode is then a handful of popcounts.
#[derive(Debug, Clone)]
pub struct HammingCodec {
    config:         HammingConfig,
    /// `(parity_position, mask of every position covered by it)`
    parity_masks:   Vec<(u32, u32)>,
    /// 1-indexed positions that carry data, in data-bit order.
    data_positions: Vec<u32>,
}

impl HammingCodec {
    pub fn new(config: HammingConfig) -> Self {
        let n = config.codeword_bits();

        let mut parity_masks = Vec::new();
        let mut p = 1u32;
        while p <= n {
            let mask = (1..=n)
                .filter(|i| i & p != 0)
                .fold(0u32, |m, i| m | (1 << (i - 1)));
            parity_masks.push((p, mask));
            p <<= 1;
        }

        let data_positions = (1..=n).filter(|pos| !pos.is_power_of_two()).collect();

        Self { config, parity_masks, data_positions }
    }

    pub fn config(&self) -> HammingConfig { self.config }

    /// Failing parity checks of `codeword`, as a position number.
    pub fn syndrome(&self, codeword: u32) -> u32 {
        self.parity_masks
            .iter()
            .filter(|(_, mask)| (codeword & mask).count_ones() & 1 == 1)
            .fold(0, |s, (p, _)| s | p)
    }

    /// Spread the low `k` bits of `data` over the data positions and fill in
    /// the parity bits.
    pub fn encode_block(&self, data: u32) -> u32 {
        let mut codeword = 0u32;
        for (idx, &pos) in self.data_positions.iter().enumerate() {
            if (data >> idx) & 1 == 1 {
                codeword |= 1 << (pos - 1);
            }
        }
        for &(p, mask) in &self.parity_masks {
            if (codeword & mask).count_ones() & 1 == 1 {
                codeword |= 1 << (p - 1);
            }
        }
        codeword
    }

    pub fn decode_block(&self, mut codeword: u32) -> BlockDecode {
        let n = self.config.codeword_bits();
        let syndrome = self.syndrome(codeword);

        let corrected = match syndrome {
            0 => None,
            s if s <= n => {
                codeword ^= 1 << (s - 1);
                if self.syndrome(codeword) != 0 {
                    return BlockDecode::Uncorrectable;
                }
                Some(s)
            }
            _ => return BlockDecode::Uncorrectable,
        };

        let data = self.extract_data(codeword);
        match corrected {
            None           => BlockDecode::Clean(data),
            Some(position) => BlockDecode::Corrected { data, position },
        }
    }

    fn extract_data(&self, codeword: u32) -> u32 {
        self.data_positions
            .iter()
            .enumerate()
            .filter(|&(_, &pos)| (codeword >> (pos - 1)) & 1 == 1)
            .fold(0u32, |d, (idx, _)| d | (1 << idx))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(k: u32, r: u32) -> HammingCodec {
        HammingCodec::new(HammingConfig::new(k, r).unwrap())
    }

    #[test]
    fn config_rejects_out_of_range() {
        assert!(HammingConfig::new(0, 4).is_err());
        assert!(HammingConfig::new(17, 4).is_err());
        assert!(HammingConfig::new(8, 0).is_err());
        assert!(HammingConfig::new(8, 9).is_err());
        assert!(HammingConfig::new(16, 8).is_ok());
    }

    #[test]
    fn coverage_rule() {
        assert!(HammingConfig::new(4, 3).unwrap().covers_all_positions());
        assert!(HammingConfig::new(8, 4).unwrap().covers_all_positions());
        assert!(HammingConfig::new(11, 4).unwrap().covers_all_positions());
        assert!(!HammingConfig::new(12, 4).unwrap().covers_all_positions());
        assert!(HammingConfig::new(16, 1).unwrap().validate_coverage().is_err());
    }

    #[test]
    fn encoded_size_formula() {
        let cfg = HammingConfig::default();
        assert_eq!(cfg.encoded_size(0), 0);
        assert_eq!(cfg.encoded_size(1), 2);     // 12 bits
        assert_eq!(cfg.encoded_size(2), 3);     // 24 bits
        assert_eq!(cfg.encoded_size(1024), 1536);

        let cfg = HammingConfig::new(11, 4).unwrap();
        // 24 bits -> 3 codewords -> 45 bits -> 6 bytes
        assert_eq!(cfg.codeword_count(3), 3);
        assert_eq!(cfg.encoded_size(3), 6);
    }

    #[test]
    fn hamming_7_4_known_codeword() {
        // data 0b1011 -> positions 3,5,6,7 = 1,1,0,1
        // p1 = 3^5^7 = 1, p2 = 3^6^7 = 0, p4 = 5^6^7 = 0
        let c = codec(4, 3);
        assert_eq!(c.encode_block(0b1011), 0b101_0101);
        assert_eq!(c.decode_block(0b101_0101), BlockDecode::Clean(0b1011));
    }

    #[test]
    fn single_flip_is_corrected_everywhere() {
        let c = codec(8, 4);
        for data in [0u32, 0xFF, 0xA5, 0x3C] {
            let cw = c.encode_block(data);
            for bit in 0..12 {
                match c.decode_block(cw ^ (1 << bit)) {
                    BlockDecode::Corrected { data: d, position } => {
                        assert_eq!(d, data);
                        assert_eq!(position, bit + 1);
                    }
                    other => panic!("bit {bit}: unexpected {other:?}"),
                }
            }
        }
    }

    #[test]
    fn syndrome_outside_codeword_is_uncorrectable() {
        // n = 12: flipping positions 9 and 6 gives syndrome 15 > 12.
        let c = codec(8, 4);
        let cw = c.encode_block(0x5A) ^ (1 << 8) ^ (1 << 5);
        assert_eq!(c.decode_block(cw), BlockDecode::Uncorrectable);
    }

    #[test]
    fn underprovisioned_config_drops_high_bits() {
        // n = 17 has five power-of-two positions, leaving 12 data slots for 16 bits.
        let c = codec(16, 1);
        let cw = c.encode_block(0xFFFF);
        assert_eq!(c.decode_block(cw).data(), Some(0x0FFF));
    }
}
