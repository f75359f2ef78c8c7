//! Reference LZMA decoder used by the integration tests.
//!
//! Decoding is not part of the library; this module exists so the tests can
//! verify that encoder output round-trips. It mirrors the reference decoder
//! behavior: headers, the range decoder, and every token form the encoder
//! can emit, stopping at the end-of-stream marker or at the advertised
//! uncompressed size.

use lzarc_core::error::{LzArcError, Result};
use lzarc_lzma::model::{
    DIST_ALIGN_BITS, DIST_SLOT_BITS, END_DIST_MODEL, EOS_DISTANCE, LEN_HIGH_BITS, LEN_LOW_BITS,
    LEN_LOW_SYMBOLS, LEN_MID_BITS, LEN_MID_SYMBOLS, LzmaModel, LzmaProperties, MATCH_LEN_MIN,
    START_DIST_MODEL, State,
};
use lzarc_lzma::range_coder::{MOVE_BITS, PROB_BITS, PROB_SCALE};

const TOP_VALUE: u32 = 1 << 24;

struct RangeDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    range: u32,
    code: u32,
}

impl<'a> RangeDecoder<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(LzArcError::invalid_header("range-coded data too short"));
        }
        if data[0] != 0x00 {
            return Err(LzArcError::invalid_header("invalid stream start byte"));
        }

        let mut code = 0u32;
        for &b in &data[1..5] {
            code = (code << 8) | u32::from(b);
        }

        Ok(Self {
            data,
            pos: 5,
            range: 0xFFFF_FFFF,
            code,
        })
    }

    fn next_byte(&mut self) -> u8 {
        // Trailing bytes past the stream (padding after the EOS marker) are
        // never reached before the marker terminates decoding; reading zeros
        // past the end keeps truncated-input behavior defined.
        let b = self.data.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    fn normalize(&mut self) {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.code = (self.code << 8) | u32::from(self.next_byte());
        }
    }

    fn decode_bit(&mut self, prob: &mut u16) -> u32 {
        self.normalize();
        let bound = (self.range >> PROB_BITS) * u32::from(*prob);

        if self.code < bound {
            self.range = bound;
            *prob += (PROB_SCALE - *prob) >> MOVE_BITS;
            0
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            1
        }
    }

    fn decode_direct_bits(&mut self, count: u32) -> u32 {
        let mut result = 0u32;
        for _ in 0..count {
            self.normalize();
            self.range >>= 1;
            self.code = self.code.wrapping_sub(self.range);
            let bit = if (self.code as i32) < 0 {
                self.code = self.code.wrapping_add(self.range);
                0
            } else {
                1
            };
            result = (result << 1) | bit;
        }
        result
    }

    fn decode_tree(&mut self, probs: &mut [u16], num_bits: u32) -> u32 {
        let mut m = 1usize;
        for _ in 0..num_bits {
            let bit = self.decode_bit(&mut probs[m]);
            m = (m << 1) | bit as usize;
        }
        m as u32 - (1 << num_bits)
    }

    fn decode_tree_reverse(&mut self, probs: &mut [u16], num_bits: u32) -> u32 {
        let mut m = 1usize;
        let mut value = 0u32;
        for i in 0..num_bits {
            let bit = self.decode_bit(&mut probs[m]);
            m = (m << 1) | bit as usize;
            value |= bit << i;
        }
        value
    }
}

struct RefDecoder<'a> {
    rc: RangeDecoder<'a>,
    model: LzmaModel,
    state: State,
    rep: [u32; 4],
    out: Vec<u8>,
}

impl<'a> RefDecoder<'a> {
    fn new(data: &'a [u8], props: LzmaProperties) -> Result<Self> {
        Ok(Self {
            rc: RangeDecoder::new(data)?,
            model: LzmaModel::new(props),
            state: State::new(),
            rep: [0; 4],
            out: Vec::new(),
        })
    }

    fn byte_back(&self, dist: u32) -> Result<u8> {
        if dist as usize >= self.out.len() {
            return Err(LzArcError::invalid_distance(
                u64::from(dist) + 1,
                self.out.len() as u64,
            ));
        }
        Ok(self.out[self.out.len() - 1 - dist as usize])
    }

    fn decode_literal(&mut self) -> Result<()> {
        let prev_byte = self.out.last().copied().unwrap_or(0);
        let base =
            self.model
                .literal
                .cluster_base(self.out.len() as u64, prev_byte, &self.model.props);

        let symb = if self.state.is_literal() {
            let mut symb = 1usize;
            while symb < 0x100 {
                let bit = self
                    .rc
                    .decode_bit(&mut self.model.literal.probs[base + symb]);
                symb = (symb << 1) | bit as usize;
            }
            symb
        } else {
            let mut symb = 1usize;
            let mut match_byte = u32::from(self.byte_back(self.rep[0])?);
            let mut offs = 0x100u32;
            while symb < 0x100 {
                match_byte <<= 1;
                let mbit = match_byte & offs;
                let idx = base + (offs + mbit) as usize + symb;
                let bit = self.rc.decode_bit(&mut self.model.literal.probs[idx]);
                symb = (symb << 1) | bit as usize;
                if (bit == 1) != (mbit != 0) {
                    offs = 0;
                }
            }
            symb
        };

        self.out.push((symb - 0x100) as u8);
        self.state.update_literal();
        Ok(())
    }

    fn decode_length(&mut self, rep: bool) -> u32 {
        let pos_state = self.out.len() & (self.model.props.num_pos_states() - 1);
        let lm = if rep {
            &mut self.model.rep_len
        } else {
            &mut self.model.match_len
        };

        if self.rc.decode_bit(&mut lm.choice) == 0 {
            MATCH_LEN_MIN + self.rc.decode_tree(&mut lm.low[pos_state], LEN_LOW_BITS)
        } else if self.rc.decode_bit(&mut lm.choice2) == 0 {
            MATCH_LEN_MIN
                + LEN_LOW_SYMBOLS
                + self.rc.decode_tree(&mut lm.mid[pos_state], LEN_MID_BITS)
        } else {
            MATCH_LEN_MIN
                + LEN_LOW_SYMBOLS
                + LEN_MID_SYMBOLS
                + self.rc.decode_tree(&mut lm.high, LEN_HIGH_BITS)
        }
    }

    fn decode_distance(&mut self, len: u32) -> u32 {
        let len_state = ((len - MATCH_LEN_MIN).min(3)) as usize;
        let slot = self
            .rc
            .decode_tree(&mut self.model.distance.slot[len_state], DIST_SLOT_BITS);

        if slot < START_DIST_MODEL {
            return slot;
        }

        let footer_bits = (slot >> 1) - 1;
        let base = (2 | (slot & 1)) << footer_bits;

        if slot < END_DIST_MODEL {
            let mut m = 1u32;
            let mut value = 0u32;
            for i in 0..footer_bits {
                let idx = (base + m - slot - 1) as usize;
                let bit = self.rc.decode_bit(&mut self.model.distance.mid[idx]);
                m = (m << 1) | bit;
                value |= bit << i;
            }
            base + value
        } else {
            let direct = self.rc.decode_direct_bits(footer_bits - DIST_ALIGN_BITS);
            let align = self
                .rc
                .decode_tree_reverse(&mut self.model.distance.align, DIST_ALIGN_BITS);
            base + (direct << DIST_ALIGN_BITS) + align
        }
    }

    fn copy_match(&mut self, dist: u32, len: u32) -> Result<()> {
        for _ in 0..len {
            let b = self.byte_back(dist)?;
            self.out.push(b);
        }
        Ok(())
    }

    fn run(mut self, limit: Option<u64>) -> Result<Vec<u8>> {
        loop {
            if let Some(limit) = limit {
                if self.out.len() as u64 >= limit {
                    break;
                }
            }

            let pos_state = self.out.len() & (self.model.props.num_pos_states() - 1);
            let st = self.state.value();

            if self
                .rc
                .decode_bit(&mut self.model.switches.is_match[st][pos_state])
                == 0
            {
                self.decode_literal()?;
                continue;
            }

            if self.rc.decode_bit(&mut self.model.switches.is_rep[st]) == 0 {
                // Simple match.
                let len = self.decode_length(false);
                let dist = self.decode_distance(len);

                if dist == EOS_DISTANCE {
                    if limit.is_some() {
                        return Err(LzArcError::corrupted(
                            self.out.len() as u64,
                            "end marker inside sized stream",
                        ));
                    }
                    break;
                }

                self.rep[3] = self.rep[2];
                self.rep[2] = self.rep[1];
                self.rep[1] = self.rep[0];
                self.rep[0] = dist;
                self.state.update_match();
                self.copy_match(dist, len)?;
            } else if self.rc.decode_bit(&mut self.model.switches.is_rep_g0[st]) == 0 {
                if self
                    .rc
                    .decode_bit(&mut self.model.switches.is_rep0_long[st][pos_state])
                    == 0
                {
                    // Short rep: a single byte at the rep0 distance.
                    let b = self.byte_back(self.rep[0])?;
                    self.out.push(b);
                    self.state.update_short_rep();
                } else {
                    let len = self.decode_length(true);
                    self.state.update_rep();
                    self.copy_match(self.rep[0], len)?;
                }
            } else {
                // Rep match at index 1..=3; rotate it to the front.
                let idx = if self.rc.decode_bit(&mut self.model.switches.is_rep_g1[st]) == 0 {
                    1
                } else if self.rc.decode_bit(&mut self.model.switches.is_rep_g2[st]) == 0 {
                    2
                } else {
                    3
                };

                let dist = self.rep[idx];
                for j in (1..=idx).rev() {
                    self.rep[j] = self.rep[j - 1];
                }
                self.rep[0] = dist;

                let len = self.decode_length(true);
                self.state.update_rep();
                self.copy_match(dist, len)?;
            }
        }

        Ok(self.out)
    }
}

/// Decode a complete stream as produced by the encoder under test.
///
/// `header_has_size` must match the parameters the stream was encoded with.
/// A known size field bounds the output; otherwise decoding runs to the
/// end-of-stream marker.
pub fn decode_stream(data: &[u8], header_has_size: bool) -> Result<Vec<u8>> {
    let props = LzmaProperties::from_byte(data[0])
        .ok_or_else(|| LzArcError::invalid_header("invalid property byte"))?;
    let header_len = if header_has_size { 13 } else { 5 };
    if data.len() < header_len {
        return Err(LzArcError::invalid_header("stream shorter than its header"));
    }

    let limit = if header_has_size {
        let size = u64::from_le_bytes(data[5..13].try_into().unwrap());
        (size != u64::MAX).then_some(size)
    } else {
        None
    };

    RefDecoder::new(&data[header_len..], props)?.run(limit)
}
