//! LZMA stream encoder.
//!
//! [`LzmaEncoder`] is the committed half of the machine: it owns the
//! probability tables, the range coder, the text history window and the
//! finite-state-machine context, and turns LZ77 events into range-coded
//! symbols. An external producer drives it through [`LzmaEncoder::emit_literal`]
//! and [`LzmaEncoder::emit_dl_code`]; [`crate::lz77`] provides the default
//! producer.
//!
//! At levels 2 and up the events are routed through the variant optimizer
//! (see [`crate::variants`]), which may replace a token by a more probable
//! alternative before it reaches the commit paths below.

use crate::model::{
    DIST_ALIGN_BITS, DIST_ALIGN_SIZE, DIST_SLOT_BITS, END_DIST_MODEL, EOS_DISTANCE, LEN_HIGH_BITS,
    LEN_LOW_BITS, LEN_LOW_SYMBOLS, LEN_MID_BITS, LEN_MID_SYMBOLS, LzmaModel, MATCH_LEN_MAX,
    MATCH_LEN_MIN, START_DIST_MODEL, State, dist_slot,
};
use crate::range_coder::RangeEncoder;
use crate::EncoderParams;
use log::debug;
use lzarc_core::error::Result;
use lzarc_core::ringbuffer::HistoryBuffer;
use std::io::Write;

/// Smallest dictionary size accepted in the stream header.
pub const DICT_SIZE_MIN: u32 = 1 << 12;
/// Largest dictionary size accepted in the stream header.
pub const DICT_SIZE_MAX: u32 = 1 << 25;

/// Counts of committed tokens, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    /// Literal bytes committed.
    pub literals: u64,
    /// Short rep matches (length 1) committed.
    pub short_reps: u64,
    /// Rep matches committed.
    pub rep_matches: u64,
    /// Simple matches committed.
    pub simple_matches: u64,
}

impl EncoderStats {
    /// Total number of committed tokens.
    pub fn tokens(&self) -> u64 {
        self.literals + self.short_reps + self.rep_matches + self.simple_matches
    }
}

/// LZMA encoder over a byte sink.
pub struct LzmaEncoder<W: Write> {
    rc: RangeEncoder<W>,
    pub(crate) model: LzmaModel,
    pub(crate) text: HistoryBuffer,
    pub(crate) state: State,
    /// Recent distances, 0-based wire form, most recent first.
    pub(crate) rep: [u32; 4],
    pub(crate) total_pos: u64,
    pub(crate) prev_byte: u8,
    /// Cursor of the next byte to commit, as an absolute window position.
    pub(crate) r: u32,
    pub(crate) pos_mask: u32,
    dict_size: u32,
    variants: bool,
    end_marker: bool,
    stats: EncoderStats,
}

impl<W: Write> LzmaEncoder<W> {
    /// Create an encoder and write the stream header to the sink.
    ///
    /// # Panics
    ///
    /// Panics if `lc > 8`, `lp > 4` or `pb > 4`.
    pub fn new(sink: W, params: &EncoderParams) -> Result<Self> {
        let props = params.properties();
        assert!(props.lc <= 8 && props.lp <= 4 && props.pb <= 4);

        let dict_size = params.resolved_dict_size();
        debug!(
            "lzma encode: level={} lc={} lp={} pb={} dict_size={} end_marker={}",
            params.level.value(),
            props.lc,
            props.lp,
            props.pb,
            dict_size,
            params.end_marker
        );

        let mut enc = Self {
            rc: RangeEncoder::new(sink),
            model: LzmaModel::new(props),
            text: HistoryBuffer::new(dict_size.next_power_of_two()),
            state: State::new(),
            rep: [0; 4],
            total_pos: 0,
            prev_byte: 0,
            r: 0,
            pos_mask: props.pos_mask(),
            dict_size,
            variants: params.level.variants_enabled(),
            end_marker: params.end_marker,
            stats: EncoderStats::default(),
        };
        enc.write_header(params)?;
        Ok(enc)
    }

    /// Dictionary size advertised in the header; emitted distances never
    /// exceed it.
    pub fn dict_size(&self) -> u32 {
        self.dict_size
    }

    /// Token counts committed so far.
    pub fn stats(&self) -> EncoderStats {
        self.stats
    }

    fn write_header(&mut self, params: &EncoderParams) -> Result<()> {
        let mut header = [0u8; 13];
        header[0] = self.model.props.to_byte();
        header[1..5].copy_from_slice(&self.dict_size.to_le_bytes());

        if params.header_has_size {
            let size = params.uncompressed_size.unwrap_or(u64::MAX);
            header[5..13].copy_from_slice(&size.to_le_bytes());
            self.rc.write_raw(&header)
        } else {
            self.rc.write_raw(&header[..5])
        }
    }

    /// Feed one uncompressed literal byte.
    pub fn emit_literal(&mut self, byte: u8) -> Result<()> {
        self.text.put(self.r, byte);
        if self.variants {
            self.optimize_literal(byte)
        } else {
            self.commit_literal(byte)
        }
    }

    /// Feed one (distance, length) match event.
    ///
    /// The history at `distance` must contain at least `len` valid bytes.
    /// The match bytes are replayed into the history window up front so that
    /// variant simulation can probe the region the token is about to produce.
    ///
    /// # Panics
    ///
    /// Panics if the producer violates its contract: `distance` of zero or
    /// beyond the written history or the dictionary size, or `len` outside
    /// `[2, 273]`.
    pub fn emit_dl_code(&mut self, distance: u32, len: u32) -> Result<()> {
        assert!(distance >= 1, "DL code with zero distance");
        assert!(
            u64::from(distance) <= self.total_pos && distance <= self.dict_size,
            "DL code distance {} outside history",
            distance
        );
        assert!(
            (MATCH_LEN_MIN..=MATCH_LEN_MAX).contains(&len),
            "DL code length {} out of range",
            len
        );

        self.text.copy_match(self.r, distance, len);
        if self.variants {
            self.optimize_dl(distance, len)
        } else {
            self.commit_dl_plain(distance, len)
        }
    }

    /// Finish the stream: emit the end-of-stream marker if configured, flush
    /// the range coder, and return the sink.
    pub fn finish(mut self) -> Result<W> {
        if self.end_marker {
            let pos_state = self.pos_state();
            let st = self.state.value();
            self.rc
                .encode_bit(&mut self.model.switches.is_match[st][pos_state], 1)?;
            self.rc
                .encode_bit(&mut self.model.switches.is_rep[st], 0)?;
            self.encode_length(false, MATCH_LEN_MIN, pos_state)?;
            self.encode_distance(EOS_DISTANCE, MATCH_LEN_MIN)?;
        }
        self.rc.flush()?;

        debug!(
            "lzma encode: {} bytes in, {} tokens ({} lit, {} srep, {} rep, {} match)",
            self.total_pos,
            self.stats.tokens(),
            self.stats.literals,
            self.stats.short_reps,
            self.stats.rep_matches,
            self.stats.simple_matches
        );
        Ok(self.rc.into_sink())
    }

    #[inline]
    pub(crate) fn pos_state(&self) -> usize {
        (self.total_pos as u32 & self.pos_mask) as usize
    }

    /// Byte the decoder would copy for a rep0 reference at the cursor.
    #[inline]
    pub(crate) fn rep0_byte(&self) -> u8 {
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

    /// Commit a literal token.
    pub(crate) fn commit_literal(&mut self, byte: u8) -> Result<()> {
        let pos_state = self.pos_state();
        let st = self.state.value();
        self.rc
            .encode_bit(&mut self.model.switches.is_match[st][pos_state], 0)?;

        let base = self
            .model
            .literal
            .cluster_base(self.total_pos, self.prev_byte, &self.model.props);

        if self.state.is_literal() {
            // Plain mode: walk the 256-node tree, MSB first.
            let mut symb = u32::from(byte) | 0x100;
            while symb < 0x1_0000 {
                let idx = base + (symb >> 8) as usize;
                let bit = (symb >> 7) & 1;
                self.rc
                    .encode_bit(&mut self.model.literal.probs[idx], bit)?;
                symb <<= 1;
            }
        } else {
            // Matched mode: consult the byte the last match would predict.
            // `offs` collapses to zero on the first divergence, after which
            // the indices fall back to the plain half of the cluster.
            let mut symb = u32::from(byte) | 0x100;
            let mut match_byte = u32::from(self.rep0_byte());
            let mut offs = 0x100u32;
            while symb < 0x1_0000 {
                match_byte <<= 1;
                let idx = base + (offs + (match_byte & offs) + (symb >> 8)) as usize;
                let bit = (symb >> 7) & 1;
                self.rc
                    .encode_bit(&mut self.model.literal.probs[idx], bit)?;
                symb <<= 1;
                offs &= !(match_byte ^ symb);
            }
        }

        self.state.update_literal();
        self.advance_literal(byte);
        self.stats.literals += 1;
        Ok(())
    }

    /// Commit a short rep match: one byte at the rep0 distance.
    pub(crate) fn commit_short_rep(&mut self) -> Result<()> {
        let pos_state = self.pos_state();
        let st = self.state.value();
        let sw = &mut self.model.switches;
        self.rc.encode_bit(&mut sw.is_match[st][pos_state], 1)?;
        self.rc.encode_bit(&mut sw.is_rep[st], 1)?;
        self.rc.encode_bit(&mut sw.is_rep_g0[st], 0)?;
        self.rc.encode_bit(&mut sw.is_rep0_long[st][pos_state], 0)?;

        self.state.update_short_rep();
        let byte = self.rep0_byte();
        self.advance_literal(byte);
        self.stats.short_reps += 1;
        Ok(())
    }

    /// Commit a rep match at MRU index `idx`.
    pub(crate) fn commit_rep(&mut self, idx: usize, len: u32) -> Result<()> {
        let pos_state = self.pos_state();
        let st = self.state.value();
        let sw = &mut self.model.switches;
        self.rc.encode_bit(&mut sw.is_match[st][pos_state], 1)?;
        self.rc.encode_bit(&mut sw.is_rep[st], 1)?;

        match idx {
            0 => {
                self.rc.encode_bit(&mut sw.is_rep_g0[st], 0)?;
                self.rc.encode_bit(&mut sw.is_rep0_long[st][pos_state], 1)?;
            }
            1 => {
                self.rc.encode_bit(&mut sw.is_rep_g0[st], 1)?;
                self.rc.encode_bit(&mut sw.is_rep_g1[st], 0)?;
            }
            2 => {
                self.rc.encode_bit(&mut sw.is_rep_g0[st], 1)?;
                self.rc.encode_bit(&mut sw.is_rep_g1[st], 1)?;
                self.rc.encode_bit(&mut sw.is_rep_g2[st], 0)?;
            }
            _ => {
                self.rc.encode_bit(&mut sw.is_rep_g0[st], 1)?;
                self.rc.encode_bit(&mut sw.is_rep_g1[st], 1)?;
                self.rc.encode_bit(&mut sw.is_rep_g2[st], 1)?;
            }
        }

        // Rotate the selected distance to the front of the MRU stack.
        let dist = self.rep[idx];
        for j in (1..=idx).rev() {
            self.rep[j] = self.rep[j - 1];
        }
        self.rep[0] = dist;

        self.encode_length(true, len, pos_state)?;
        self.state.update_rep();
        self.advance_match(len);
        self.stats.rep_matches += 1;
        Ok(())
    }

    /// Commit a simple match with an explicitly coded distance (0-based).
    pub(crate) fn commit_simple(&mut self, dist: u32, len: u32) -> Result<()> {
        let pos_state = self.pos_state();
        let st = self.state.value();
        self.rc
            .encode_bit(&mut self.model.switches.is_match[st][pos_state], 1)?;
        self.rc
            .encode_bit(&mut self.model.switches.is_rep[st], 0)?;

        self.encode_length(false, len, pos_state)?;
        self.encode_distance(dist, len)?;

        self.rep[3] = self.rep[2];
        self.rep[2] = self.rep[1];
        self.rep[1] = self.rep[0];
        self.rep[0] = dist;

        self.state.update_match();
        self.advance_match(len);
        self.stats.simple_matches += 1;
        Ok(())
    }

    /// Commit a DL code without variant scoring: the rep form is used
    /// whenever the distance is on the MRU stack.
    pub(crate) fn commit_dl_plain(&mut self, distance: u32, len: u32) -> Result<()> {
        let dist = distance - 1;
        if let Some(idx) = self.rep.iter().position(|&d| d == dist) {
            self.commit_rep(idx, len)
        } else {
            self.commit_simple(dist, len)
        }
    }

    fn encode_length(&mut self, rep: bool, len: u32, pos_state: usize) -> Result<()> {
        let lm = if rep {
            &mut self.model.rep_len
        } else {
            &mut self.model.match_len
        };
        let l = len - MATCH_LEN_MIN;

        if l < LEN_LOW_SYMBOLS {
            self.rc.encode_bit(&mut lm.choice, 0)?;
            self.rc.encode_bit_tree(&mut lm.low[pos_state], LEN_LOW_BITS, l)
        } else if l < LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS {
            self.rc.encode_bit(&mut lm.choice, 1)?;
            self.rc.encode_bit(&mut lm.choice2, 0)?;
            self.rc
                .encode_bit_tree(&mut lm.mid[pos_state], LEN_MID_BITS, l - LEN_LOW_SYMBOLS)
        } else {
            self.rc.encode_bit(&mut lm.choice, 1)?;
            self.rc.encode_bit(&mut lm.choice2, 1)?;
            self.rc.encode_bit_tree(
                &mut lm.high,
                LEN_HIGH_BITS,
                l - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS,
            )
        }
    }

    fn encode_distance(&mut self, dist: u32, len: u32) -> Result<()> {
        let len_state = ((len - MATCH_LEN_MIN).min(3)) as usize;
        let slot = dist_slot(dist);
        self.rc.encode_bit_tree(
            &mut self.model.distance.slot[len_state],
            DIST_SLOT_BITS,
            slot,
        )?;

        if slot >= START_DIST_MODEL {
            let footer_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << footer_bits;
            let reduced = dist - base;

            if slot < END_DIST_MODEL {
                // Middle bit-tree, LSB first, over the slot's slice of the
                // shared table.
                let mut m = 1u32;
                for i in 0..footer_bits {
                    let bit = (reduced >> i) & 1;
                    let idx = (base + m - slot - 1) as usize;
                    self.rc
                        .encode_bit(&mut self.model.distance.mid[idx], bit)?;
                    m = (m << 1) | bit;
                }
            } else {
                self.rc
                    .encode_direct_bits(reduced >> DIST_ALIGN_BITS, footer_bits - DIST_ALIGN_BITS)?;
                self.rc.encode_bit_tree_reverse(
                    &mut self.model.distance.align,
                    DIST_ALIGN_BITS,
                    reduced & (DIST_ALIGN_SIZE as u32 - 1),
                )?;
            }
        }

        Ok(())
    }
}
