//! Subframe gain quantization tables
//!
//! The log-domain gain quantizer covers 2..88 dB in 64 steps. The scale
//! constants below are exact integer derivations of that range and pair
//! with the `lin2log`/`log2lin` approximations in `math`; substituting IEEE
//! log2 breaks the dequantized values.

/// MSB (3 bits) of an absolutely coded gain index, conditioned on signal
/// type: inactive, unvoiced, voiced
pub static GAIN_ICDF: [[u8; 8]; 3] = [
    [224, 112, 44, 15, 3, 2, 1, 0],
    [254, 237, 192, 132, 70, 23, 4, 0],
    [255, 252, 226, 155, 61, 11, 2, 0],
];

/// Delta-coded gain index, offset by `MIN_DELTA_GAIN_QUANT`
pub static DELTA_GAIN_ICDF: [u8; 41] = [
    250, 245, 234, 203, 71, 50, 42, 38, 35, 33, 31, 29, 28, 27, 26, 25, 24, 23, 22, 21, 20, 19,
    18, 17, 16, 15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0,
];

/// Q7 log-gain offset: `(MIN_QGAIN_DB * 128) / 6 + 16 * 128`
pub const GAIN_OFFSET_Q7: i32 = 2090;

/// Quantizer scale, Q16: `65536 * 63 / (((88 - 2) * 128) / 6)`
pub const GAIN_SCALE_Q16: i32 = 2251;

/// Inverse quantizer scale, Q16: `65536 * (((88 - 2) * 128) / 6) / 63`
pub const GAIN_INV_SCALE_Q16: i32 = 1907825;

/// Largest dequantizable Q7 log gain (`log2lin` saturates above this)
pub const GAIN_LOG_MAX_Q7: i32 = 3967;

/// Excitation quantization offsets, Q10, indexed by
/// `[voiced][quant_offset_type]`
pub static QUANTIZATION_OFFSETS_Q10: [[i16; 2]; 2] = [[100, 240], [32, 100]];
