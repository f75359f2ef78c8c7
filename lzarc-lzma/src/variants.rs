//! Variant selection for LZ77 tokens.
//!
//! At levels 2 and up, each event from the producer is not committed
//! verbatim: the optimizer scores alternative encodings of the same bytes
//! under the current probabilities and drives the committed encoder along
//! the most probable path. The alternatives considered are:
//!
//! - plain literal vs. short rep match (when the byte equals the rep0 byte);
//! - strict DL code vs. the same bytes fully expanded as literals;
//! - head byte as literal, then the shorter DL code;
//! - the shorter DL code, then the tail byte as literal.
//!
//! The thresholds and malus terms below are empirical and are part of the
//! observable output; changing them changes every stream the encoder
//! produces.

use crate::encoder::LzmaEncoder;
use crate::model::MATCH_LEN_MIN;
use crate::sim::Simulator;
use lzarc_core::error::Result;
use std::io::Write;

/// Longest match length the optimizer will consider taking apart.
pub(crate) const SHORT_LEN_THRESHOLD: u32 = 79;

/// Head-literal probability above which literal-then-shorter-DL is taken
/// without scoring the alternatives.
const LIT_THEN_DL_THRESHOLD: f64 = 0.875;

/// Flat factor applied to the DL-then-literal variant.
const DL_THEN_LIT_FACTOR: f64 = 0.995;

/// A rep match is preferred over the equivalent simple match as long as its
/// probability is at least this fraction of the simple form's. Rep matches
/// adapt and stay probable over a run, so the comparison is biased their way.
pub(crate) const MALUS_SIMPLE_MATCH_VS_REP: f64 = 0.55;

fn malus_lit_then_dl(distance: u32, len: u32) -> f64 {
    (0.064 - f64::from(distance) * 1e-9 - f64::from(len) * 3e-5).max(0.0)
}

fn malus_dl_then_lit(distance: u32, len: u32) -> f64 {
    (0.135 - f64::from(distance) * 1e-8 - f64::from(len) * 1e-4).max(0.0)
}

/// Greedily simulate emitting `len` window bytes as literals, giving up as
/// soon as the running product drops below `give_up`.
fn expanded_dl(from: &Simulator<'_>, len: u32, give_up: f64) -> f64 {
    let mut sim = from.clone();
    for _ in 0..len {
        let byte = sim.next_byte();
        sim.any_literal(byte);
        if sim.product() < give_up {
            break;
        }
    }
    sim.product()
}

impl<W: Write> LzmaEncoder<W> {
    /// Commit `byte` (already placed at the cursor) as either a literal or a
    /// short rep match, whichever scores higher.
    pub(crate) fn optimize_literal(&mut self, byte: u8) -> Result<()> {
        if self.total_pos > u64::from(self.rep[0]) + 1 && byte == self.rep0_byte() {
            let mut as_lit = self.simulator();
            as_lit.literal(byte);
            let mut as_srm = self.simulator();
            as_srm.short_rep();
            if as_srm.product() > as_lit.product() {
                return self.commit_short_rep();
            }
        }
        self.commit_literal(byte)
    }

    /// Commit a DL code (bytes already replayed into the window), possibly
    /// as a different mix of tokens covering the same bytes.
    ///
    /// The shrinking variants re-enter the comparison with `len - 1`, so the
    /// loop carries an explicit remaining length; tail literals split off by
    /// the DL-then-literal variant are stacked and committed once the match
    /// core has been written.
    pub(crate) fn optimize_dl(&mut self, distance: u32, mut len: u32) -> Result<()> {
        let mut pending_tails: Vec<u8> = Vec::new();

        loop {
            if len <= MATCH_LEN_MIN || len > SHORT_LEN_THRESHOLD {
                self.commit_dl_strict(distance, len)?;
                break;
            }

            let head = self.text.get(self.r);
            let tail = self.text.get(self.r.wrapping_add(len - 1));

            let p_head = {
                let mut sim = self.simulator();
                sim.any_literal(head);
                sim.product()
            };

            // Literal-then-shorter-DL, fast path.
            if p_head >= LIT_THEN_DL_THRESHOLD {
                self.optimize_literal(head)?;
                len -= 1;
                continue;
            }

            let p_strict = {
                let mut sim = self.simulator();
                sim.strict_dl(distance, len);
                sim.product()
            };
            let p_expand = expanded_dl(&self.simulator(), len, p_strict);
            let p_dl_best = p_strict.max(p_expand);

            // Literal-then-shorter-DL, scored path: the shorter code is
            // rated in the post-literal shadow state.
            let p_after = {
                let mut sim = self.simulator();
                sim.any_literal(head);
                sim.take_product();
                sim.strict_dl(distance, len - 1);
                sim.product()
            };
            if p_head * p_after * malus_lit_then_dl(distance, len) > p_dl_best {
                self.optimize_literal(head)?;
                len -= 1;
                continue;
            }

            // Shorter-DL-then-literal.
            let p_dl_then_lit = {
                let mut sim = self.simulator();
                sim.strict_dl(distance, len - 1);
                sim.any_literal(tail);
                DL_THEN_LIT_FACTOR * sim.product()
            };
            if p_dl_then_lit * malus_dl_then_lit(distance, len) > p_dl_best {
                pending_tails.push(tail);
                len -= 1;
                continue;
            }

            // Full expansion, or the plain DL code.
            if p_expand > p_strict {
                for _ in 0..len {
                    let byte = self.text.get(self.r);
                    self.optimize_literal(byte)?;
                }
            } else {
                self.commit_dl_strict(distance, len)?;
            }
            break;
        }

        while let Some(byte) = pending_tails.pop() {
            self.optimize_literal(byte)?;
        }
        Ok(())
    }

    /// Commit a strict DL code, resolving rep-vs-simple by simulation with
    /// the rep bias applied.
    fn commit_dl_strict(&mut self, distance: u32, len: u32) -> Result<()> {
        let dist = distance - 1;
        if let Some(idx) = self.rep.iter().position(|&d| d == dist) {
            let mut as_rep = self.simulator();
            as_rep.rep_match(idx, len);
            let mut as_simple = self.simulator();
            as_simple.simple_match(dist, len);
            if as_rep.product() >= MALUS_SIMPLE_MATCH_VS_REP * as_simple.product() {
                self.commit_rep(idx, len)
            } else {
                self.commit_simple(dist, len)
            }
        } else {
            self.commit_simple(dist, len)
        }
    }
}
