//! Side-effect-free probability simulation.
//!
//! A [`Simulator`] answers "how probable would this token be if it were
//! committed right now?" It walks exactly the bits the committed encoder
//! would emit, but reads the probability tables without updating them and
//! carries a value-typed copy of the machine state, so scoring a candidate
//! never disturbs the live encoder.
//!
//! Probabilities are accumulated as an `f64` product per token; chained
//! tokens (literal-then-match and so on) take the running product out with
//! [`Simulator::take_product`] between tokens.

use crate::encoder::LzmaEncoder;
use crate::model::{
    DIST_ALIGN_BITS, DIST_ALIGN_SIZE, DIST_SLOT_BITS, END_DIST_MODEL, LEN_LOW_SYMBOLS,
    LEN_MID_SYMBOLS, LzmaModel, MATCH_LEN_MIN, START_DIST_MODEL, State, dist_slot,
};
use crate::range_coder::PROB_SCALE;
use crate::variants::MALUS_SIMPLE_MATCH_VS_REP;
use lzarc_core::ringbuffer::HistoryBuffer;
use std::io::Write;

/// Shadow machine walking the committed encoder's tables read-only.
#[derive(Clone)]
pub(crate) struct Simulator<'a> {
    model: &'a LzmaModel,
    text: &'a HistoryBuffer,
    state: State,
    rep: [u32; 4],
    total_pos: u64,
    prev_byte: u8,
    r: u32,
    pos_mask: u32,
    p: f64,
}

impl<W: Write> LzmaEncoder<W> {
    /// Snapshot the committed machine state for simulation.
    pub(crate) fn simulator(&self) -> Simulator<'_> {
        Simulator {
            model: &self.model,
            text: &self.text,
            state: self.state,
            rep: self.rep,
            total_pos: self.total_pos,
            prev_byte: self.prev_byte,
            r: self.r,
            pos_mask: self.pos_mask,
            p: 1.0,
        }
    }
}

impl Simulator<'_> {
    /// Probability product accumulated so far.
    pub(crate) fn product(&self) -> f64 {
        self.p
    }

    /// Take the accumulated product and reset it, keeping the shadow state.
    pub(crate) fn take_product(&mut self) -> f64 {
        std::mem::replace(&mut self.p, 1.0)
    }

    /// Byte the window holds at the shadow cursor (the next byte a
    /// pre-copied DL region would produce).
    pub(crate) fn next_byte(&self) -> u8 {
        self.text.get(self.r)
    }

    #[inline]
    fn bit(&mut self, prob: u16, bit: u32) {
        let p0 = f64::from(prob) / f64::from(PROB_SCALE);
        self.p *= if bit == 0 { p0 } else { 1.0 - p0 };
    }

    fn tree(&mut self, probs: &[u16], num_bits: u32, symbol: u32) {
        let mut m = 1usize;
        for i in (0..num_bits).rev() {
            let bit = (symbol >> i) & 1;
            self.bit(probs[m], bit);
            m = (m << 1) | bit as usize;
        }
    }

    fn tree_reverse(&mut self, probs: &[u16], num_bits: u32, symbol: u32) {
        let mut m = 1usize;
        for i in 0..num_bits {
            let bit = (symbol >> i) & 1;
            self.bit(probs[m], bit);
            m = (m << 1) | bit as usize;
        }
    }

    #[inline]
    fn pos_state(&self) -> usize {
        (self.total_pos as u32 & self.pos_mask) as usize
    }

    fn rep0_byte(&self) -> u8 {
        self.text
            .get(self.r.wrapping_sub(self.rep[0]).wrapping_sub(1))
    }

    fn advance_literal(&mut self, byte: u8) {
        self.prev_byte = byte;
        self.total_pos += 1;
        self.r = self.r.wrapping_add(1);
    }

    fn advance_match(&mut self, len: u32) {
        self.total_pos += u64::from(len);
        self.r = self.r.wrapping_add(len);
        self.prev_byte = self.text.get(self.r.wrapping_sub(1));
    }

    /// Simulate committing `byte` as a strict literal.
    pub(crate) fn literal(&mut self, byte: u8) {
        let model = self.model;
        let pos_state = self.pos_state();
        let st = self.state.value();
        self.bit(model.switches.is_match[st][pos_state], 0);

        let base = model
            .literal
            .cluster_base(self.total_pos, self.prev_byte, &model.props);

        if self.state.is_literal() {
            let mut symb = u32::from(byte) | 0x100;
            while symb < 0x1_0000 {
                let idx = base + (symb >> 8) as usize;
                self.bit(model.literal.probs[idx], (symb >> 7) & 1);
                symb <<= 1;
            }
        } else {
            let mut symb = u32::from(byte) | 0x100;
            let mut match_byte = u32::from(self.rep0_byte());
            let mut offs = 0x100u32;
            while symb < 0x1_0000 {
                match_byte <<= 1;
                let idx = base + (offs + (match_byte & offs) + (symb >> 8)) as usize;
                self.bit(model.literal.probs[idx], (symb >> 7) & 1);
                symb <<= 1;
                offs &= !(match_byte ^ symb);
            }
        }

        self.state.update_literal();
        self.advance_literal(byte);
    }

    /// Simulate committing a short rep match.
    pub(crate) fn short_rep(&mut self) {
        let model = self.model;
        let pos_state = self.pos_state();
        let st = self.state.value();
        self.bit(model.switches.is_match[st][pos_state], 1);
        self.bit(model.switches.is_rep[st], 1);
        self.bit(model.switches.is_rep_g0[st], 0);
        self.bit(model.switches.is_rep0_long[st][pos_state], 0);

        self.state.update_short_rep();
        let byte = self.rep0_byte();
        self.advance_literal(byte);
    }

    /// Simulate committing `byte` the way the variant-aware literal path
    /// would: a short rep match is substituted when it scores higher.
    pub(crate) fn any_literal(&mut self, byte: u8) {
        if self.total_pos > u64::from(self.rep[0]) + 1 && byte == self.rep0_byte() {
            let mut as_lit = self.clone();
            as_lit.literal(byte);
            let mut as_srm = self.clone();
            as_srm.short_rep();
            *self = if as_srm.p > as_lit.p { as_srm } else { as_lit };
        } else {
            self.literal(byte);
        }
    }

    /// Simulate committing a rep match at MRU index `idx`.
    pub(crate) fn rep_match(&mut self, idx: usize, len: u32) {
        let model = self.model;
        let pos_state = self.pos_state();
        let st = self.state.value();
        self.bit(model.switches.is_match[st][pos_state], 1);
        self.bit(model.switches.is_rep[st], 1);

        match idx {
            0 => {
                self.bit(model.switches.is_rep_g0[st], 0);
                self.bit(model.switches.is_rep0_long[st][pos_state], 1);
            }
            1 => {
                self.bit(model.switches.is_rep_g0[st], 1);
                self.bit(model.switches.is_rep_g1[st], 0);
            }
            2 => {
                self.bit(model.switches.is_rep_g0[st], 1);
                self.bit(model.switches.is_rep_g1[st], 1);
                self.bit(model.switches.is_rep_g2[st], 0);
            }
            _ => {
                self.bit(model.switches.is_rep_g0[st], 1);
                self.bit(model.switches.is_rep_g1[st], 1);
                self.bit(model.switches.is_rep_g2[st], 1);
            }
        }

        let dist = self.rep[idx];
        for j in (1..=idx).rev() {
            self.rep[j] = self.rep[j - 1];
        }
        self.rep[0] = dist;

        self.length(true, len, pos_state);
        self.state.update_rep();
        self.advance_match(len);
    }

    /// Simulate committing a simple match with 0-based distance `dist`.
    pub(crate) fn simple_match(&mut self, dist: u32, len: u32) {
        let model = self.model;
        let pos_state = self.pos_state();
        let st = self.state.value();
        self.bit(model.switches.is_match[st][pos_state], 1);
        self.bit(model.switches.is_rep[st], 0);

        self.length(false, len, pos_state);
        self.distance(dist, len);

        self.rep[3] = self.rep[2];
        self.rep[2] = self.rep[1];
        self.rep[1] = self.rep[0];
        self.rep[0] = dist;

        self.state.update_match();
        self.advance_match(len);
    }

    /// Simulate a strict DL code: the same rep-vs-simple resolution the
    /// committed path applies, including the rep bias.
    pub(crate) fn strict_dl(&mut self, distance: u32, len: u32) {
        let dist = distance - 1;
        if let Some(idx) = self.rep.iter().position(|&d| d == dist) {
            let mut as_rep = self.clone();
            as_rep.rep_match(idx, len);
            let mut as_simple = self.clone();
            as_simple.simple_match(dist, len);
            *self = if as_rep.p >= MALUS_SIMPLE_MATCH_VS_REP * as_simple.p {
                as_rep
            } else {
                as_simple
            };
        } else {
            self.simple_match(dist, len);
        }
    }

    fn length(&mut self, rep: bool, len: u32, pos_state: usize) {
        let model = self.model;
        let lm = if rep { &model.rep_len } else { &model.match_len };
        let l = len - MATCH_LEN_MIN;

        if l < LEN_LOW_SYMBOLS {
            self.bit(lm.choice, 0);
            self.tree(&lm.low[pos_state], crate::model::LEN_LOW_BITS, l);
        } else if l < LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS {
            self.bit(lm.choice, 1);
            self.bit(lm.choice2, 0);
            self.tree(
                &lm.mid[pos_state],
                crate::model::LEN_MID_BITS,
                l - LEN_LOW_SYMBOLS,
            );
        } else {
            self.bit(lm.choice, 1);
            self.bit(lm.choice2, 1);
            self.tree(
                &lm.high,
                crate::model::LEN_HIGH_BITS,
                l - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS,
            );
        }
    }

    fn distance(&mut self, dist: u32, len: u32) {
        let model = self.model;
        let len_state = ((len - MATCH_LEN_MIN).min(3)) as usize;
        let slot = dist_slot(dist);
        self.tree(&model.distance.slot[len_state], DIST_SLOT_BITS, slot);

        if slot >= START_DIST_MODEL {
            let footer_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << footer_bits;
            let reduced = dist - base;

            if slot < END_DIST_MODEL {
                let mut m = 1u32;
                for i in 0..footer_bits {
                    let bit = (reduced >> i) & 1;
                    let idx = (base + m - slot - 1) as usize;
                    self.bit(model.distance.mid[idx], bit);
                    m = (m << 1) | bit;
                }
            } else {
                // Each direct bit is equiprobable.
                self.p *= 0.5f64.powi((footer_bits - DIST_ALIGN_BITS) as i32);
                self.tree_reverse(
                    &model.distance.align,
                    DIST_ALIGN_BITS,
                    reduced & (DIST_ALIGN_SIZE as u32 - 1),
                );
            }
        }
    }
}
