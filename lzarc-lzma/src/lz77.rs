//! Default LZ77 producer: greedy hash-chain match finding.
//!
//! The encoder core is producer-agnostic; anything that honors the
//! `emit_literal`/`emit_dl_code` contract can drive it. This module supplies
//! the built-in producer used by [`crate::compress`]: a greedy matcher with
//! 3-byte hashing and level-dependent chain depth. Level 0 skips match
//! finding entirely and feeds pure literals.

use crate::encoder::LzmaEncoder;
use crate::model::{MATCH_LEN_MAX, MATCH_LEN_MIN};
use crate::Level;
use lzarc_core::error::Result;
use std::io::Write;

/// Hash table size (64K entries).
const HASH_SIZE: usize = 1 << 16;

/// Chain terminator / empty head marker.
const NO_POS: u32 = u32::MAX;

/// Minimum length the hash-chain matcher reports. Hashing covers three
/// bytes, so shorter matches are never candidates.
const FIND_LEN_MIN: usize = 3;

/// Hash three bytes, FNV-1a style.
#[inline]
fn hash3(data: &[u8]) -> usize {
    let mut h = 2_166_136_261u32;
    h ^= u32::from(data[0]);
    h = h.wrapping_mul(16_777_619);
    h ^= u32::from(data[1]);
    h = h.wrapping_mul(16_777_619);
    h ^= u32::from(data[2]);
    h = h.wrapping_mul(16_777_619);
    (h as usize) & (HASH_SIZE - 1)
}

struct HashChains {
    /// Most recent position per hash bucket.
    head: Vec<u32>,
    /// Previous position with the same hash, per position.
    chain: Vec<u32>,
}

impl HashChains {
    fn new(len: usize) -> Self {
        Self {
            head: vec![NO_POS; HASH_SIZE],
            chain: vec![NO_POS; len],
        }
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + FIND_LEN_MIN > data.len() {
            return;
        }
        let h = hash3(&data[pos..]);
        self.chain[pos] = self.head[h];
        self.head[h] = pos as u32;
    }

    /// Longest match at `pos`, preferring shorter distances on equal length.
    fn find(&self, data: &[u8], pos: usize, depth: usize, max_dist: usize) -> Option<(u32, u32)> {
        if pos + FIND_LEN_MIN > data.len() {
            return None;
        }

        let h = hash3(&data[pos..]);
        let mut cand = self.head[h];
        let max_len = (data.len() - pos).min(MATCH_LEN_MAX as usize);
        let mut best_len = FIND_LEN_MIN - 1;
        let mut best_dist = 0usize;

        for _ in 0..depth {
            if cand == NO_POS {
                break;
            }
            let cand_pos = cand as usize;
            let dist = pos - cand_pos;
            if dist > max_dist {
                break;
            }

            if data[cand_pos] == data[pos]
                && data[cand_pos + 1] == data[pos + 1]
                && data[cand_pos + 2] == data[pos + 2]
            {
                let mut len = FIND_LEN_MIN;
                while len < max_len && data[cand_pos + len] == data[pos + len] {
                    len += 1;
                }

                if len > best_len {
                    best_len = len;
                    best_dist = dist;
                    if len >= max_len {
                        break;
                    }
                }
            }

            cand = self.chain[cand_pos];
        }

        if best_len < FIND_LEN_MIN {
            return None;
        }
        Some((best_dist as u32, best_len as u32))
    }
}

/// Drive the encoder over `data` with the level's match-finding effort.
pub fn run<W: Write>(data: &[u8], enc: &mut LzmaEncoder<W>, level: Level) -> Result<()> {
    let depth = level.match_depth();
    if depth == 0 {
        for &b in data {
            enc.emit_literal(b)?;
        }
        return Ok(());
    }

    let max_dist = enc.dict_size() as usize;
    let mut chains = HashChains::new(data.len());
    let mut pos = 0usize;

    while pos < data.len() {
        match chains.find(data, pos, depth, max_dist) {
            Some((dist, len)) if len >= MATCH_LEN_MIN => {
                for p in pos..pos + len as usize {
                    chains.insert(data, p);
                }
                enc.emit_dl_code(dist, len)?;
                pos += len as usize;
            }
            _ => {
                chains.insert(data, pos);
                enc.emit_literal(data[pos])?;
                pos += 1;
            }
        }
    }

    Ok(())
}
