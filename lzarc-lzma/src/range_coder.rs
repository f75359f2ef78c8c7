//! Range encoder for LZMA compression.
//!
//! The range coder is an entropy coding method similar to arithmetic coding.
//! LZMA uses a specific variant with:
//! - 32-bit range tracking, normalized when the range drops below 2^24
//! - 11-bit adaptive probabilities (2048 = 100%, 1024 = 50%)
//! - a deferred-carry byte cache so carries can propagate through runs of
//!   0xFF output bytes

use lzarc_core::error::Result;
use std::io::Write;

/// Number of bits in the probability model.
pub const PROB_BITS: u32 = 11;

/// Total probability scale (`1 << PROB_BITS`).
pub const PROB_SCALE: u16 = 1 << PROB_BITS;

/// Initial probability (50%).
pub const PROB_INIT: u16 = PROB_SCALE / 2;

/// Number of bits to shift for probability adaptation.
pub const MOVE_BITS: u32 = 5;

/// Normalization threshold for the range.
const TOP_VALUE: u32 = 1 << 24;

/// Range encoder writing through a caller-supplied byte sink.
///
/// Every compressed byte goes out through [`Write::write_all`] in emission
/// order; a sink error aborts encoding and is propagated unchanged.
#[derive(Debug)]
pub struct RangeEncoder<W: Write> {
    sink: W,
    /// Current range width.
    range: u32,
    /// Low bound of the encoded interval; bits 32..39 hold a pending carry.
    low: u64,
    /// Deferred output byte, waiting for a possible carry.
    cache: u8,
    /// Number of deferred bytes (the cache plus any 0xFF run behind it).
    cache_size: u64,
}

impl<W: Write> RangeEncoder<W> {
    /// Create a new range encoder over a sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cache_size: 1,
        }
    }

    /// Write bytes straight through to the sink.
    ///
    /// Only valid before the first encoded bit; used for stream headers.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes)?;
        Ok(())
    }

    /// Shift the low register and emit any bytes that can no longer change.
    fn shift_low(&mut self) -> Result<()> {
        // Bytes can be released either when no carry can reach them anymore
        // (top byte of low below 0xFF) or when a carry is pending and must be
        // propagated through the cached 0xFF run right now.
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            let mut out = self.cache;

            loop {
                self.sink.write_all(&[out.wrapping_add(carry)])?;
                out = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }

            self.cache = (self.low >> 24) as u8;
        }

        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
        Ok(())
    }

    /// Rescale the range once it drops below the normalization threshold.
    fn normalize(&mut self) -> Result<()> {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low()?;
        }
        debug_assert!(self.range >= TOP_VALUE);
        Ok(())
    }

    /// Encode a single bit with an adaptive probability.
    pub fn encode_bit(&mut self, prob: &mut u16, bit: u32) -> Result<()> {
        let bound = (self.range >> PROB_BITS) * u32::from(*prob);

        if bit == 0 {
            self.range = bound;
            *prob += (PROB_SCALE - *prob) >> MOVE_BITS;
        } else {
            self.low += u64::from(bound);
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }

        self.normalize()
    }

    /// Encode a bit with fixed 50% probability.
    pub fn encode_direct_bit(&mut self, bit: u32) -> Result<()> {
        self.range >>= 1;
        if bit != 0 {
            self.low += u64::from(self.range);
        }
        self.normalize()
    }

    /// Encode multiple equiprobable bits, most significant first.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) -> Result<()> {
        for i in (0..count).rev() {
            self.encode_direct_bit((value >> i) & 1)?;
        }
        Ok(())
    }

    /// Encode an `num_bits`-wide symbol through a bit tree, MSB first.
    pub fn encode_bit_tree(&mut self, probs: &mut [u16], num_bits: u32, symbol: u32) -> Result<()> {
        let mut m = 1usize;

        for i in (0..num_bits).rev() {
            let bit = (symbol >> i) & 1;
            self.encode_bit(&mut probs[m], bit)?;
            m = (m << 1) | bit as usize;
        }

        Ok(())
    }

    /// Encode an `num_bits`-wide symbol through a bit tree, LSB first.
    pub fn encode_bit_tree_reverse(
        &mut self,
        probs: &mut [u16],
        num_bits: u32,
        symbol: u32,
    ) -> Result<()> {
        let mut m = 1usize;

        for i in 0..num_bits {
            let bit = (symbol >> i) & 1;
            self.encode_bit(&mut probs[m], bit)?;
            m = (m << 1) | bit as usize;
        }

        Ok(())
    }

    /// Flush the remaining interval state: five shifts empty the low register
    /// and the byte cache.
    pub fn flush(&mut self) -> Result<()> {
        for _ in 0..5 {
            self.shift_low()?;
        }
        self.sink.flush()?;
        Ok(())
    }

    /// Give back the sink. Call [`RangeEncoder::flush`] first.
    pub fn into_sink(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prob_constants() {
        assert_eq!(PROB_SCALE, 2048);
        assert_eq!(PROB_INIT, 1024);
    }

    #[test]
    fn test_fresh_flush_emits_five_bytes() {
        let mut rc = RangeEncoder::new(Vec::new());
        rc.flush().unwrap();
        assert_eq!(rc.into_sink(), vec![0u8; 5]);
    }

    #[test]
    fn test_probability_stays_in_bounds() {
        // Saturated updates must stay within [2^MOVE_BITS - 1,
        // PROB_SCALE - (2^MOVE_BITS - 1)] no matter how long they run.
        let floor = (1u16 << MOVE_BITS) - 1;
        let ceil = PROB_SCALE - floor;

        let mut rc = RangeEncoder::new(Vec::new());
        let mut prob = PROB_INIT;
        for _ in 0..10_000 {
            rc.encode_bit(&mut prob, 1).unwrap();
            assert!(prob >= floor && prob <= ceil, "prob = {}", prob);
        }
        assert_eq!(prob, floor);

        let mut prob = PROB_INIT;
        for _ in 0..10_000 {
            rc.encode_bit(&mut prob, 0).unwrap();
            assert!(prob >= floor && prob <= ceil, "prob = {}", prob);
        }
        assert_eq!(prob, ceil);
    }

    #[test]
    fn test_mixed_updates_stay_in_bounds() {
        let floor = (1u16 << MOVE_BITS) - 1;
        let ceil = PROB_SCALE - floor;

        let mut rc = RangeEncoder::new(Vec::new());
        let mut prob = PROB_INIT;
        let mut x = 0x2F6E_2CE5u32;
        for _ in 0..50_000 {
            x = x.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
            rc.encode_bit(&mut prob, x >> 31).unwrap();
            assert!(prob >= floor && prob <= ceil);
        }
    }

    #[test]
    fn test_deterministic_output() {
        let encode = || {
            let mut rc = RangeEncoder::new(Vec::new());
            let mut prob = PROB_INIT;
            for i in 0..256u32 {
                rc.encode_bit(&mut prob, i & 1).unwrap();
            }
            rc.encode_direct_bits(0xDEAD, 16).unwrap();
            rc.flush().unwrap();
            rc.into_sink()
        };
        assert_eq!(encode(), encode());
    }

    #[test]
    fn test_sink_error_propagates() {
        struct FailingSink;
        impl Write for FailingSink {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "abort"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut rc = RangeEncoder::new(FailingSink);
        // Enough direct bits to force a byte out of the cache.
        let err = rc.encode_direct_bits(0xFFFF_FFFF, 32);
        assert!(err.is_err());
    }
}
