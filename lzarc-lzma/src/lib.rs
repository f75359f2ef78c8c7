//! # LzArc LZMA
//!
//! A raw LZMA **encoder** producing bitstreams compatible with Igor Pavlov's
//! reference LZMA decoder.
//!
//! The crate is the "machine" half of an LZMA compressor: the adaptive
//! range coder, the literal/match/rep state machine, the length and distance
//! coders, and a variant-selection optimizer that, at the higher levels,
//! compares candidate encodings of each LZ77 token by simulated probability
//! and commits the most compressible one. LZ77 match discovery is a
//! pluggable front end; a greedy hash-chain producer is built in.
//!
//! ## Output format
//!
//! A bare `.lzma` stream: one property byte (`lc + 9*lp + 45*pb`), four
//! little-endian dictionary-size bytes, optionally eight little-endian
//! uncompressed-size bytes, then the range-coded data, optionally terminated
//! by the end-of-stream marker.
//!
//! ## Usage
//!
//! ```ignore
//! use lzarc_lzma::{compress, EncoderParams};
//!
//! let params = EncoderParams::default();
//! let compressed = compress(b"Hello, LZMA!", &params)?;
//! ```
//!
//! Driving the core with an external LZ77 producer:
//!
//! ```ignore
//! use lzarc_lzma::{EncoderParams, LzmaEncoder};
//!
//! let mut enc = LzmaEncoder::new(Vec::new(), &EncoderParams::default())?;
//! enc.emit_literal(b'a')?;
//! enc.emit_literal(b'b')?;
//! enc.emit_dl_code(2, 6)?; // "ababab"
//! let stream = enc.finish()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoder;
pub mod lz77;
pub mod model;
pub mod range_coder;
mod sim;
mod variants;

// Re-exports
pub use encoder::{DICT_SIZE_MAX, DICT_SIZE_MIN, EncoderStats, LzmaEncoder};
pub use lzarc_core::error::{LzArcError, Result};
pub use model::LzmaProperties;

use std::io::{Read, Write};

/// Default dictionary size advertised in the stream header.
pub const DICT_SIZE_DEFAULT: u32 = 1 << 23;

/// LZMA effort level.
///
/// The level selects the match-finding effort of the built-in producer and
/// whether the variant optimizer runs:
///
/// | level | LZ77 search | variant optimization |
/// |---|---|---|
/// | 0 | none (literals only) | off |
/// | 1 | shallow hash chains | off |
/// | 2 | deeper hash chains | on |
/// | 3 | deepest hash chains | on |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level(u8);

impl Level {
    /// Fastest compression (level 1).
    pub const FAST: Self = Self(1);
    /// Default compression (level 2).
    pub const DEFAULT: Self = Self(2);
    /// Best compression (level 3).
    pub const BEST: Self = Self(3);

    /// Create a new level, clamped to `0..=3`.
    pub fn new(level: u8) -> Self {
        Self(level.min(3))
    }

    /// Get the level value.
    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether tokens are routed through the variant optimizer.
    pub fn variants_enabled(self) -> bool {
        self.0 >= 2
    }

    /// Hash-chain search depth of the built-in producer.
    pub fn match_depth(self) -> usize {
        [0, 32, 128, 512][self.0 as usize]
    }
}

impl Default for Level {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Encoder parameters.
#[derive(Debug, Clone)]
pub struct EncoderParams {
    /// Effort level.
    pub level: Level,
    /// Literal context bits (0..=8).
    pub lc: u32,
    /// Literal position bits (0..=4).
    pub lp: u32,
    /// Position state bits (0..=4).
    pub pb: u32,
    /// Requested dictionary size; clamped to
    /// [`DICT_SIZE_MIN`]..=[`DICT_SIZE_MAX`] and, at level 3 only, rounded
    /// up to a power of two.
    pub dict_size: u32,
    /// Emit the end-of-stream marker.
    pub end_marker: bool,
    /// Emit the 8-byte uncompressed-size header field.
    pub header_has_size: bool,
    /// Uncompressed size for the header field, if known.
    pub uncompressed_size: Option<u64>,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            level: Level::DEFAULT,
            lc: 3,
            lp: 0,
            pb: 2,
            dict_size: DICT_SIZE_DEFAULT,
            end_marker: true,
            header_has_size: false,
            uncompressed_size: None,
        }
    }
}

impl EncoderParams {
    /// Parameters for a given level, everything else at its default.
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// The (lc, lp, pb) triple.
    pub fn properties(&self) -> LzmaProperties {
        LzmaProperties::new(self.lc, self.lp, self.pb)
    }

    /// Dictionary size after clamping (and, at level 3, rounding).
    pub fn resolved_dict_size(&self) -> u32 {
        let dict = self.dict_size.clamp(DICT_SIZE_MIN, DICT_SIZE_MAX);
        if self.level.value() >= 3 {
            dict.next_power_of_two()
        } else {
            dict
        }
    }
}

/// Compress a byte slice into a freshly allocated LZMA stream.
pub fn compress(data: &[u8], params: &EncoderParams) -> Result<Vec<u8>> {
    let mut params = params.clone();
    if params.header_has_size && params.uncompressed_size.is_none() {
        params.uncompressed_size = Some(data.len() as u64);
    }

    let mut enc = LzmaEncoder::new(Vec::new(), &params)?;
    lz77::run(data, &mut enc, params.level)?;
    enc.finish()
}

/// Compress everything a reader produces into a writer.
///
/// The reader is drained first; the built-in producer needs lookahead over
/// the input to find matches.
pub fn compress_stream<R: Read, W: Write>(
    mut reader: R,
    writer: W,
    params: &EncoderParams,
) -> Result<()> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;

    let mut params = params.clone();
    if params.header_has_size && params.uncompressed_size.is_none() {
        params.uncompressed_size = Some(data.len() as u64);
    }

    let mut enc = LzmaEncoder::new(writer, &params)?;
    lz77::run(&data, &mut enc, params.level)?;
    enc.finish()?;
    Ok(())
}
