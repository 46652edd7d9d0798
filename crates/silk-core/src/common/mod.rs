//! Shared signal-processing routines used by both pipelines
//!
//! Everything here is consumed by the decoder and must therefore stay
//! bit-exact; the encoder reuses the same routines so quantize/dequantize
//! pairs cannot drift apart.

pub mod filters;
pub mod gain;
pub mod nlsf;
