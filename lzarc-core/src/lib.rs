//! # LzArc Core
//!
//! Foundation crate for the LzArc compression library.
//!
//! This crate provides the building blocks shared by the codec layer:
//!
//! - [`error`]: Error types
//! - [`ringbuffer`]: Circular text history window for LZ77-style codecs
//!
//! The codec crates sit on top of this one:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L2: Codec                                               │
//! │     LZMA (range coder + context modeling)               │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Foundation (this crate)                             │
//! │     HistoryBuffer, error types                          │
//! └─────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ringbuffer;

// Re-exports for convenience
pub use error::{LzArcError, Result};
pub use ringbuffer::HistoryBuffer;
