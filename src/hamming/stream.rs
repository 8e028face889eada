//! Streaming encode/decode on top of the block codec.
//!
//! Both directions pack bits LSB-first: the first bit of a byte is its least
//! significant bit, and codeword bit 0 (position 1) is emitted first.  The
//! encoder needs no length up front; the decoder is driven by the original
//! byte count because the zero padding of the final block is
//! indistinguishable from data.

use std::io::{self, Read, Write};

use super::{BlockDecode, HammingCodec, HammingError};

const IO_BUF_SIZE: usize = 8 * 1024;

// ── BitWriter ────────────────────────────────────────────────────────────────

/// Packs variable-width bit groups into bytes, LSB-first.
pub struct BitWriter<W: Write> {
    inner:   W,
    acc:     u64,
    nbits:   u32,
    buf:     Vec<u8>,
    written: u64,
}

impl<W: Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, acc: 0, nbits: 0, buf: Vec::with_capacity(IO_BUF_SIZE), written: 0 }
    }

    /// Append the low `count` bits of `value` (`count <= 32`).
    pub fn push_bits(&mut self, value: u32, count: u32) -> io::Result<()> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(());
        }
        let masked = value as u64 & ((1u64 << count) - 1);
        self.acc |= masked << self.nbits;
        self.nbits += count;
        while self.nbits >= 8 {
            self.buf.push(self.acc as u8);
            self.acc >>= 8;
            self.nbits -= 8;
        }
        if self.buf.len() >= IO_BUF_SIZE {
            self.flush_buf()?;
        }
        Ok(())
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        self.inner.write_all(&self.buf)?;
        self.written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Emit any partial byte (high bits zero) and flush.  Returns the total
    /// number of bytes written.
    pub fn finish(mut self) -> io::Result<u64> {
        if self.nbits > 0 {
            self.buf.push(self.acc as u8);
            self.acc = 0;
            self.nbits = 0;
        }
        self.flush_buf()?;
        self.inner.flush()?;
        Ok(self.written)
    }
}

// ── BitReader ────────────────────────────────────────────────────────────────

/// Reads variable-width bit groups from a byte stream, LSB-first.
pub struct BitReader<R: Read> {
    inner: R,
    acc:   u64,
    nbits: u32,
    buf:   Box<[u8]>,
    pos:   usize,
    len:   usize,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            acc: 0,
            nbits: 0,
            buf: vec![0u8; IO_BUF_SIZE].into_boxed_slice(),
            pos: 0,
            len: 0,
        }
    }

    /// Read `count` bits (`count <= 32`).  Fails with `UnexpectedEof` when
    /// the stream runs dry.
    pub fn read_bits(&mut self, count: u32) -> io::Result<u32> {
        debug_assert!(count <= 32);
        while self.nbits < count {
            let byte = self.next_byte()?;
            self.acc |= (byte as u64) << self.nbits;
            self.nbits += 8;
        }
        let value = (self.acc & ((1u64 << count) - 1)) as u32;
        self.acc >>= count;
        self.nbits -= count;
        Ok(value)
    }

    fn next_byte(&mut self) -> io::Result<u8> {
        if self.pos == self.len {
            self.len = loop {
                match self.inner.read(&mut self.buf) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };
            self.pos = 0;
            if self.len == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }
}

// ── Stream codec ─────────────────────────────────────────────────────────────

/// Counters reported by [`HammingCodec::decode_stream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub codewords: u64,
    /// Codewords in which a single flipped bit was repaired.
    pub corrected: u64,
}

impl HammingCodec {
    /// Encode everything `input` yields into `output`.  Returns the number of
    /// bytes written, which always equals
    /// [`encoded_size`](super::HammingConfig::encoded_size) of the bytes read.
    pub fn encode_stream<R: Read, W: Write>(&self, mut input: R, output: W) -> Result<u64, HammingError> {
        let k = self.config.data_bits();
        let n = self.config.codeword_bits();
        let block_mask = (1u64 << k) - 1;

        let mut writer = BitWriter::new(output);
        let mut acc   = 0u64;
        let mut nbits = 0u32;
        let mut chunk = vec![0u8; IO_BUF_SIZE];

        loop {
            let read = match input.read(&mut chunk) {
                Ok(0) => break,
                Ok(r) => r,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            for &byte in &chunk[..read] {
                acc |= (byte as u64) << nbits;
                nbits += 8;
                while nbits >= k {
                    let codeword = self.encode_block((acc & block_mask) as u32);
                    writer.push_bits(codeword, n)?;
                    acc >>= k;
                    nbits -= k;
                }
            }
        }

        // Partial trailing block: unset high bits are already zero.
        if nbits > 0 {
            writer.push_bits(self.encode_block(acc as u32), n)?;
        }

        Ok(writer.finish()?)
    }

    /// Decode exactly the codewords covering `original_size` bytes, reading
    /// at most `encoded_size` bytes of `input`.
    ///
    /// Stops at the first uncorrectable codeword; whatever was written to
    /// `output` up to that point must be discarded by the caller.
    pub fn decode_stream<R: Read, W: Write>(
        &self,
        input:         R,
        output:        W,
        original_size: u64,
        encoded_size:  u64,
    ) -> Result<DecodeStats, HammingError> {
        let k = self.config.data_bits();
        let n = self.config.codeword_bits();

        let original_bits = original_size as u128 * 8;
        let codeword_count = self.config.codeword_count(original_size);

        let mut reader = BitReader::new(input.take(encoded_size));
        let mut writer = BitWriter::new(output);
        let mut stats = DecodeStats::default();
        let mut bits_written: u128 = 0;

        for block in 0..codeword_count {
            let codeword = reader.read_bits(n).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => HammingError::Truncated { block },
                _ => HammingError::Io(e),
            })?;

            let data = match self.decode_block(codeword) {
                BlockDecode::Clean(d) => d,
                BlockDecode::Corrected { data, .. } => {
                    stats.corrected += 1;
                    data
                }
                BlockDecode::Uncorrectable => return Err(HammingError::Uncorrectable { block }),
            };

            let emit = (original_bits - bits_written).min(k as u128) as u32;
            writer.push_bits(data, emit)?;
            bits_written += emit as u128;
            stats.codewords += 1;
        }

        writer.finish()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::super::HammingConfig;
    use super::*;

    fn codec(k: u32, r: u32) -> HammingCodec {
        HammingCodec::new(HammingConfig::new(k, r).unwrap())
    }

    fn encode(c: &HammingCodec, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        c.encode_stream(data, &mut out).unwrap();
        out
    }

    #[test]
    fn bit_writer_packs_lsb_first() {
        let mut out = Vec::new();
        let mut w = BitWriter::new(&mut out);
        w.push_bits(0b101, 3).unwrap();
        w.push_bits(0b11111, 5).unwrap();
        w.push_bits(0b1, 1).unwrap();
        assert_eq!(w.finish().unwrap(), 2);
        assert_eq!(out, vec![0b1111_1101, 0b0000_0001]);
    }

    #[test]
    fn bit_reader_reports_eof() {
        let mut r = BitReader::new(&[0xABu8][..]);
        assert_eq!(r.read_bits(4).unwrap(), 0xB);
        assert_eq!(r.read_bits(4).unwrap(), 0xA);
        assert_eq!(r.read_bits(1).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn encoded_length_matches_formula() {
        for (k, r) in [(8, 4), (4, 3), (11, 4), (16, 5), (3, 3), (1, 2)] {
            let c = codec(k, r);
            for len in [0usize, 1, 2, 3, 7, 100, 1023] {
                let data: Vec<u8> = (0..len).map(|i| (i * 31 + 7) as u8).collect();
                let out = encode(&c, &data);
                assert_eq!(out.len() as u64, c.config().encoded_size(len as u64), "k={k} r={r} len={len}");
            }
        }
    }

    #[test]
    fn roundtrip_partial_final_block() {
        let c = codec(11, 4);
        let data = b"odd-sized payload!";
        let enc = encode(&c, data);
        let mut dec = Vec::new();
        let stats = c.decode_stream(&enc[..], &mut dec, data.len() as u64, enc.len() as u64).unwrap();
        assert_eq!(dec, data);
        assert_eq!(stats.corrected, 0);
        assert_eq!(stats.codewords, c.config().codeword_count(data.len() as u64));
    }

    #[test]
    fn one_flip_per_codeword_is_healed() {
        let c = codec(8, 4);
        let data: Vec<u8> = (0u8..=255).collect();
        let mut enc = encode(&c, &data);
        // Codewords are 12 bits wide; flip a different bit in each one.
        for block in 0..data.len() {
            let bit = block * 12 + block % 12;
            enc[bit / 8] ^= 1 << (bit % 8);
        }
        let mut dec = Vec::new();
        let stats = c.decode_stream(&enc[..], &mut dec, data.len() as u64, enc.len() as u64).unwrap();
        assert_eq!(dec, data);
        assert_eq!(stats.corrected, data.len() as u64);
    }

    #[test]
    fn short_input_is_truncation() {
        let c = codec(8, 4);
        let enc = encode(&c, b"abcd");
        let err = c.decode_stream(&enc[..4], Vec::new(), 4, 6).unwrap_err();
        assert!(matches!(err, HammingError::Truncated { block: 2 }));
    }

    #[test]
    fn encoded_size_bound_limits_reads() {
        let c = codec(8, 4);
        let mut enc = encode(&c, b"abcd");
        enc.extend_from_slice(&[0xFF; 16]);
        let err = c.decode_stream(&enc[..], Vec::new(), 4, 5).unwrap_err();
        assert!(matches!(err, HammingError::Truncated { block: 3 }));
    }

    #[test]
    fn zero_length_reads_nothing() {
        let c = codec(8, 4);
        let mut dec = Vec::new();
        let stats = c.decode_stream(&[][..], &mut dec, 0, 0).unwrap();
        assert!(dec.is_empty());
        assert_eq!(stats, DecodeStats::default());
    }
}
