//! Frame-type, uniform and header-flag ICDFs

/// Frame type (signal type + quantization offset) when the VAD flag is set:
/// symbols 0..=3 map to (unvoiced, low), (unvoiced, high), (voiced, low),
/// (voiced, high)
pub static TYPE_OFFSET_VAD_ICDF: [u8; 4] = [232, 158, 10, 0];

/// Frame type when the VAD flag is clear: symbols 0..=1 map to
/// (inactive, low) and (inactive, high)
pub static TYPE_OFFSET_NO_VAD_ICDF: [u8; 2] = [230, 0];

/// Uniform distribution over 3 symbols
pub static UNIFORM3_ICDF: [u8; 3] = [171, 85, 0];

/// Uniform distribution over 4 symbols
pub static UNIFORM4_ICDF: [u8; 4] = [192, 128, 64, 0];

/// Uniform distribution over 5 symbols
pub static UNIFORM5_ICDF: [u8; 5] = [205, 154, 102, 51, 0];

/// Uniform distribution over 6 symbols
pub static UNIFORM6_ICDF: [u8; 6] = [213, 171, 128, 85, 43, 0];

/// Uniform distribution over 8 symbols
pub static UNIFORM8_ICDF: [u8; 8] = [224, 192, 160, 128, 96, 64, 32, 0];

/// LBRR flag expansion for 40 ms packets (2 redundant frames)
pub static LBRR_FLAGS_2_ICDF: [u8; 3] = [203, 150, 0];

/// LBRR flag expansion for 60 ms packets (3 redundant frames)
pub static LBRR_FLAGS_3_ICDF: [u8; 7] = [215, 195, 166, 125, 110, 82, 0];
