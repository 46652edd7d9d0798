//! Pitch lag and contour tables
//!
//! Absolute lags are coded as a coarse index (half-frame-millisecond
//! resolution) plus a uniform fine index; relative lags as a delta against
//! the previous frame. The contour codebooks perturb the base lag per
//! subframe.

/// Coarse absolute lag index (lag = min_lag + index * fs_khz / 2 + fine)
pub static PITCH_LAG_ICDF: [u8; 32] = [
    253, 250, 244, 233, 212, 182, 150, 131, 120, 110, 98, 85, 72, 60, 49, 40, 32, 25, 19, 15, 13,
    11, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0,
];

/// Lag delta against the previous frame's lag; symbol 0 means "recode
/// absolutely"
pub static PITCH_DELTA_ICDF: [u8; 21] = [
    210, 208, 206, 203, 199, 193, 183, 168, 142, 104, 74, 52, 37, 27, 20, 14, 10, 6, 4, 2, 0,
];

/// Contour index, NB with 4 subframes
pub static PITCH_CONTOUR_NB_ICDF: [u8; 11] = [188, 176, 155, 138, 119, 97, 67, 43, 26, 10, 0];

/// Contour index, MB/WB with 4 subframes
pub static PITCH_CONTOUR_ICDF: [u8; 34] = [
    212, 176, 148, 129, 118, 110, 102, 87, 74, 64, 55, 47, 39, 31, 24, 22, 21, 20, 18, 16, 15,
    14, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 0,
];

/// Contour index, NB with 2 subframes (10 ms frames)
pub static PITCH_CONTOUR_10_MS_NB_ICDF: [u8; 3] = [113, 63, 0];

/// Contour index, MB/WB with 2 subframes (10 ms frames)
pub static PITCH_CONTOUR_10_MS_ICDF: [u8; 12] =
    [165, 119, 80, 61, 47, 35, 27, 20, 14, 9, 4, 0];

/// Per-subframe lag offsets, NB 4-subframe contour codebook
pub static CB_LAGS_STAGE2: [[i8; 11]; 4] = [
    [0, 2, -1, -1, -1, 0, 0, 1, 1, 0, 1],
    [0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0],
    [0, -1, 2, 1, 0, 1, 1, 0, 0, -1, -1],
];

/// Per-subframe lag offsets, NB 2-subframe contour codebook
pub static CB_LAGS_STAGE2_10_MS: [[i8; 3]; 2] = [[0, 1, 0], [0, 0, 1]];

/// Per-subframe lag offsets, MB/WB 4-subframe contour codebook
pub static CB_LAGS_STAGE3: [[i8; 34]; 4] = [
    [
        0, 0, 1, -1, 0, 1, -1, 0, -1, 1, -2, 2, -2, -2, 2, -3, 2, 3, -3, -4, 3, -4, 4, 4, -5, 5,
        -6, -5, 6, -7, 6, 5, 8, -9,
    ],
    [
        0, 0, 1, 0, 0, 0, 0, 0, 0, 0, -1, 1, 0, 0, 1, -1, 0, 1, -1, -1, 1, -1, 2, 1, -1, 2, -2,
        -2, 2, -2, 2, 2, 3, -3,
    ],
    [
        0, 1, 0, 0, 1, 0, 1, -1, 2, -1, 2, -1, 2, 3, -2, 3, -2, -2, 4, 4, -3, 5, -3, -4, 6, -4,
        6, 5, -5, 8, -6, -5, -7, 9,
    ],
    [
        0, 1, 0, 1, 2, 1, 2, 2, -1, 3, -1, 3, 3, -2, 4, -2, -2, 4, 5, 6, -3, -4, 6, 8, -5, 5, 9,
        -6, -7, 9, -8, -9, 10, -10,
    ],
];

/// Per-subframe lag offsets, MB/WB 2-subframe contour codebook
pub static CB_LAGS_STAGE3_10_MS: [[i8; 12]; 2] = [
    [0, 1, 0, 1, 2, -1, 3, -2, 4, -3, 5, -4],
    [0, 0, 1, -1, 1, 2, -1, -2, 2, 3, -3, 4],
];

/// Codebook and ICDF for a given sample rate and subframe count
pub fn contour_tables(fs_khz: usize, nb_subfr: usize) -> (&'static [u8], &'static [i8], usize) {
    if fs_khz == 8 {
        if nb_subfr == 4 {
            (&PITCH_CONTOUR_NB_ICDF, CB_LAGS_STAGE2.as_flattened(), 11)
        } else {
            (
                &PITCH_CONTOUR_10_MS_NB_ICDF,
                CB_LAGS_STAGE2_10_MS.as_flattened(),
                3,
            )
        }
    } else if nb_subfr == 4 {
        (&PITCH_CONTOUR_ICDF, CB_LAGS_STAGE3.as_flattened(), 34)
    } else {
        (
            &PITCH_CONTOUR_10_MS_ICDF,
            CB_LAGS_STAGE3_10_MS.as_flattened(),
            12,
        )
    }
}

/// Uniform ICDF for the fine part of an absolute lag (fs_khz / 2 symbols)
pub fn lag_fine_icdf(fs_khz: usize) -> &'static [u8] {
    use super::frame::{UNIFORM4_ICDF, UNIFORM6_ICDF, UNIFORM8_ICDF};
    match fs_khz {
        8 => &UNIFORM4_ICDF,
        12 => &UNIFORM6_ICDF,
        _ => &UNIFORM8_ICDF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contour_selection() {
        let (icdf, cb, size) = contour_tables(8, 4);
        assert_eq!(icdf.len(), 11);
        assert_eq!(cb.len(), 4 * size);
        let (icdf, cb, size) = contour_tables(16, 4);
        assert_eq!(icdf.len(), 34);
        assert_eq!(cb.len(), 4 * size);
        let (icdf, cb, size) = contour_tables(12, 2);
        assert_eq!(icdf.len(), 12);
        assert_eq!(cb.len(), 2 * size);
    }

    #[test]
    fn test_fine_lag_resolution() {
        assert_eq!(lag_fine_icdf(8).len(), 4);
        assert_eq!(lag_fine_icdf(12).len(), 6);
        assert_eq!(lag_fine_icdf(16).len(), 8);
    }
}
