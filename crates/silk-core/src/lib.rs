//! # silk-core: SILK Speech Codec
//!
//! An implementation of the SILK speech-coding layer of the IETF Opus codec
//! (RFC 6716, Sections 4.2 and 5.2): a predictive, range-coded speech codec
//! operating at 8, 12, or 16 kHz internal sampling with 10/20/40/60 ms
//! frames, mono or stereo.
//!
//! The decoder is fixed-point and bit-exact per RFC 6716. The encoder is
//! conforming but free in its analysis, as the RFC allows.
//!
//! ## Usage
//!
//! ```rust
//! use silk_core::{Bandwidth, Decoder, Encoder};
//!
//! // Encode one 20 ms wideband frame (320 samples at 16 kHz).
//! let mut encoder = Encoder::new(Bandwidth::Wide)?;
//! let pcm: Vec<f32> = (0..320)
//!     .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 16000.0).sin())
//!     .collect();
//! let payload = encoder.encode(&pcm, true)?;
//!
//! // Decode it back to 48 kHz.
//! let mut decoder = Decoder::new(1)?;
//! let out = decoder.decode(&payload, Bandwidth::Wide, 960, true)?;
//! assert_eq!(out.len(), 960);
//! # Ok::<(), silk_core::SilkError>(())
//! ```
//!
//! ## Scope
//!
//! This crate is the SILK core only. The outer Opus layer (TOC parsing, mode
//! selection, CELT, hybrid combination) hands it a pre-sliced SILK payload,
//! a bandwidth tag and a frame-duration tag. The range coder lives in
//! [`range`] and can be shared with another layer through the traits there.
//!
//! ## Threading
//!
//! Encoder and decoder instances are not thread-safe; a frame operation
//! requires exclusive use of its instance. All working buffers are owned by
//! the instance and reused across frames.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub mod math;
pub mod range;

pub(crate) mod common;
pub(crate) mod tables;

pub mod decoder;
pub mod encoder;
pub mod resampler;
pub mod stereo;

// Re-export commonly used types
pub use decoder::Decoder;
pub use encoder::{encode_stereo, Encoder};
pub use error::{Result, SilkError};
pub use types::{Bandwidth, FrameDuration, QuantizationOffsetType, SignalType};

/// Version information for the codec library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the codec library
///
/// Installs a default `tracing` subscriber if none is set. Safe to call
/// multiple times; only the first call has any effect.
pub fn init() {
    let _ = tracing_subscriber::fmt::try_init();
    tracing::info!("silk-core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        init();
        init();
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
