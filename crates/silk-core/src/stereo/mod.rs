//! Stereo front-end: L/R to M/S prediction and back
//!
//! The side channel is predicted from the mid channel in two bands (a
//! three-tap [1, 2, 1]/4 low pass and its complement), with the two
//! predictor weights quantized on a 16-anchor grid refined by 5 sub-steps.
//! Predictors are interpolated over the first 8 ms of every frame on both
//! sides of the wire to avoid audible steps at frame boundaries.

use once_cell::sync::Lazy;

use crate::common::filters::inner_prod16;
use crate::math::{rshift_round, sat16, smlabb, smlawb, smulbb, smulwb};
use crate::range::{EntropyDecoder, EntropyEncoder, RangeDecoder, RangeEncoder};
use crate::tables::frame::{UNIFORM3_ICDF, UNIFORM5_ICDF};
use crate::tables::stereo::{
    STEREO_ONLY_CODE_MID_ICDF, STEREO_PRED_JOINT_ICDF, STEREO_PRED_QUANT_Q13,
};
use crate::types::{STEREO_INTERP_LEN_MS, STEREO_QUANT_SUB_STEPS};

/// Expanded quantization grid: every (anchor, sub-step) level in Q13,
/// derived from the 16-anchor table at first use
static PRED_LEVELS_Q13: Lazy<[[i16; STEREO_QUANT_SUB_STEPS as usize]; 15]> = Lazy::new(|| {
    let mut grid = [[0i16; STEREO_QUANT_SUB_STEPS as usize]; 15];
    for i in 0..15 {
        let low = STEREO_PRED_QUANT_Q13[i] as i32;
        let step = smulwb(
            STEREO_PRED_QUANT_Q13[i + 1] as i32 - low,
            6554, // 0.5 / STEREO_QUANT_SUB_STEPS in Q16
        );
        for j in 0..STEREO_QUANT_SUB_STEPS as usize {
            grid[i][j] = smlabb(low, step, 2 * j as i32 + 1) as i16;
        }
    }
    grid
});

/// Decoder-side stereo state
#[derive(Default)]
pub struct StereoDecState {
    /// Previous frame's predictors, Q13
    pub pred_prev_q13: [i16; 2],
    /// Two-sample mid history for the low-pass delay
    pub s_mid: [i16; 2],
    /// Two-sample side history for the low-pass delay
    pub s_side: [i16; 2],
}

/// Encoder-side stereo state
pub struct StereoEncState {
    /// Previous frame's quantized predictors, Q13
    pub pred_prev_q13: [i16; 2],
    /// Two-sample mid history
    pub s_mid: [i16; 2],
    /// Two-sample side history
    pub s_side: [i16; 2],
    /// Smoothed width factor, Q14
    pub width_prev_q14: i16,
}

impl Default for StereoEncState {
    fn default() -> Self {
        StereoEncState {
            pred_prev_q13: [0; 2],
            s_mid: [0; 2],
            s_side: [0; 2],
            width_prev_q14: 1 << 14,
        }
    }
}

/// Decode the two stereo predictor weights, Q13
pub fn decode_pred(range_dec: &mut RangeDecoder<'_>, pred_q13: &mut [i32; 2]) {
    let n = range_dec.decode_icdf(&STEREO_PRED_JOINT_ICDF, 8);
    let mut ix = [[0usize; 3]; 2];
    ix[0][2] = n / 5;
    ix[1][2] = n - 5 * ix[0][2];
    for chn in 0..2 {
        ix[chn][0] = range_dec.decode_icdf(&UNIFORM3_ICDF, 8);
        ix[chn][1] = range_dec.decode_icdf(&UNIFORM5_ICDF, 8);
    }
    for chn in 0..2 {
        ix[chn][0] += 3 * ix[chn][2];
        let low = STEREO_PRED_QUANT_Q13[ix[chn][0]] as i32;
        let step = smulwb(
            STEREO_PRED_QUANT_Q13[ix[chn][0] + 1] as i32 - low,
            6554,
        );
        pred_q13[chn] = smlabb(low, step, 2 * ix[chn][1] as i32 + 1);
    }
    // The first predictor is delta-coded against the second
    pred_q13[0] -= pred_q13[1];
}

/// Decode the mid-only flag
pub fn decode_mid_only(range_dec: &mut RangeDecoder<'_>) -> bool {
    range_dec.decode_icdf(&STEREO_ONLY_CODE_MID_ICDF, 8) == 1
}

/// Quantize the two predictor weights in place and return the coded indices
pub fn quant_pred(pred_q13: &mut [i32; 2]) -> [[i8; 3]; 2] {
    let mut ix = [[0i8; 3]; 2];
    for n in 0..2 {
        let mut err_min_q13 = i32::MAX;
        let mut quant_pred_q13 = 0i32;
        'search: for i in 0..15 {
            for j in 0..STEREO_QUANT_SUB_STEPS as usize {
                let lvl_q13 = PRED_LEVELS_Q13[i][j] as i32;
                let err_q13 = (pred_q13[n] - lvl_q13).abs();
                if err_q13 < err_min_q13 {
                    err_min_q13 = err_q13;
                    quant_pred_q13 = lvl_q13;
                    ix[n][0] = i as i8;
                    ix[n][1] = j as i8;
                } else {
                    // Past the optimum on a monotone grid
                    break 'search;
                }
            }
        }
        ix[n][2] = ix[n][0] / 3;
        ix[n][0] -= ix[n][2] * 3;
        pred_q13[n] = quant_pred_q13;
    }
    pred_q13[0] -= pred_q13[1];
    ix
}

/// Encode quantized predictor indices
pub fn encode_pred(range_enc: &mut RangeEncoder, ix: &[[i8; 3]; 2]) {
    let n = (5 * ix[0][2] + ix[1][2]) as usize;
    range_enc.encode_icdf(n, &STEREO_PRED_JOINT_ICDF, 8);
    for chn in 0..2 {
        range_enc.encode_icdf(ix[chn][0] as usize, &UNIFORM3_ICDF, 8);
        range_enc.encode_icdf(ix[chn][1] as usize, &UNIFORM5_ICDF, 8);
    }
}

/// Encode the mid-only flag
pub fn encode_mid_only(range_enc: &mut RangeEncoder, mid_only: bool) {
    range_enc.encode_icdf(mid_only as usize, &STEREO_ONLY_CODE_MID_ICDF, 8);
}

/// Convert a mid/side pair back to left/right with predictor interpolation.
/// `x1` and `x2` carry two history samples ahead of the `frame_length` new
/// samples; outputs are written in place starting at index 1.
pub fn ms_to_lr(
    state: &mut StereoDecState,
    x1: &mut [i16],
    x2: &mut [i16],
    pred_q13: &[i32; 2],
    fs_khz: usize,
    frame_length: usize,
) {
    // Buffering
    x1[..2].copy_from_slice(&state.s_mid);
    x2[..2].copy_from_slice(&state.s_side);
    state.s_mid.copy_from_slice(&x1[frame_length..frame_length + 2]);
    state.s_side.copy_from_slice(&x2[frame_length..frame_length + 2]);

    // Interpolate predictors and add prediction to the side channel
    let mut pred0_q13 = state.pred_prev_q13[0] as i32;
    let mut pred1_q13 = state.pred_prev_q13[1] as i32;
    let interp_len = STEREO_INTERP_LEN_MS * fs_khz;
    let denom_q16 = (1 << 16) / interp_len as i32;
    let delta0_q13 = rshift_round(
        smulbb(pred_q13[0] - state.pred_prev_q13[0] as i32, denom_q16),
        16,
    );
    let delta1_q13 = rshift_round(
        smulbb(pred_q13[1] - state.pred_prev_q13[1] as i32, denom_q16),
        16,
    );
    for n in 0..interp_len {
        pred0_q13 += delta0_q13;
        pred1_q13 += delta1_q13;
        unmix_sample(x1, x2, n, pred0_q13, pred1_q13);
    }
    for n in interp_len..frame_length {
        unmix_sample(x1, x2, n, pred_q13[0], pred_q13[1]);
    }
    state.pred_prev_q13[0] = pred_q13[0] as i16;
    state.pred_prev_q13[1] = pred_q13[1] as i16;

    // Convert mid/side to left/right
    for n in 0..frame_length {
        let sum = x1[n + 1] as i32 + x2[n + 1] as i32;
        let diff = x1[n + 1] as i32 - x2[n + 1] as i32;
        x1[n + 1] = sat16(sum);
        x2[n + 1] = sat16(diff);
    }
}

#[inline]
fn unmix_sample(x1: &[i16], x2: &mut [i16], n: usize, pred0_q13: i32, pred1_q13: i32) {
    let sum = (x1[n] as i32 + x1[n + 2] as i32 + ((x1[n + 1] as i32) << 1)) << 9; // Q11
    let mut acc = smlawb((x2[n + 1] as i32) << 8, sum, pred0_q13); // Q8
    acc = smlawb(acc, (x1[n + 1] as i32) << 11, pred1_q13); // Q8
    x2[n + 1] = sat16(rshift_round(acc, 8));
}

/// Convert left/right input to mid plus predicted-side residual; returns
/// the quantized predictor indices. `mid` and `side` receive
/// `frame_length + 2` samples including the two-sample history.
#[allow(clippy::too_many_arguments)]
pub fn lr_to_ms(
    state: &mut StereoEncState,
    left: &[i16],
    right: &[i16],
    mid: &mut [i16],
    side: &mut [i16],
    residual: &mut [i16],
    fs_khz: usize,
) -> [[i8; 3]; 2] {
    let frame_length = left.len();

    // Basic mid/side with two samples of history
    mid[..2].copy_from_slice(&state.s_mid);
    side[..2].copy_from_slice(&state.s_side);
    for n in 0..frame_length {
        let sum = left[n] as i32 + right[n] as i32;
        let diff = left[n] as i32 - right[n] as i32;
        mid[n + 2] = rshift_round(sum, 1) as i16;
        side[n + 2] = sat16(rshift_round(diff, 1));
    }
    state.s_mid.copy_from_slice(&mid[frame_length..frame_length + 2]);
    state.s_side.copy_from_slice(&side[frame_length..frame_length + 2]);

    // LP/HP band split
    let mut lp_mid = [0i16; crate::types::MAX_FRAME_LENGTH];
    let mut hp_mid = [0i16; crate::types::MAX_FRAME_LENGTH];
    let mut lp_side = [0i16; crate::types::MAX_FRAME_LENGTH];
    let mut hp_side = [0i16; crate::types::MAX_FRAME_LENGTH];
    let (lp_mid, hp_mid) = (&mut lp_mid[..frame_length], &mut hp_mid[..frame_length]);
    let (lp_side, hp_side) = (&mut lp_side[..frame_length], &mut hp_side[..frame_length]);
    for n in 0..frame_length {
        let sum = rshift_round(
            mid[n] as i32 + mid[n + 2] as i32 + ((mid[n + 1] as i32) << 1),
            2,
        );
        lp_mid[n] = sum as i16;
        hp_mid[n] = (mid[n + 1] as i32 - sum) as i16;
        let sum = rshift_round(
            side[n] as i32 + side[n + 2] as i32 + ((side[n + 1] as i32) << 1),
            2,
        );
        lp_side[n] = sum as i16;
        hp_side[n] = (side[n + 1] as i32 - sum) as i16;
    }

    // Least-squares predictors per band
    let mut pred_q13 = [
        find_predictor(&lp_mid, &lp_side),
        find_predictor(&hp_mid, &hp_side),
    ];
    let ix = quant_pred(&mut pred_q13);

    // Subtract the interpolated prediction from the side channel
    let mut pred0_q13 = -(state.pred_prev_q13[0] as i32);
    let mut pred1_q13 = -(state.pred_prev_q13[1] as i32);
    let w_q24 = (state.width_prev_q14 as i32) << 10;
    let interp_len = STEREO_INTERP_LEN_MS * fs_khz;
    let denom_q16 = (1 << 16) / interp_len as i32;
    let delta0_q13 = -rshift_round(
        smulbb(pred_q13[0] - state.pred_prev_q13[0] as i32, denom_q16),
        16,
    );
    let delta1_q13 = -rshift_round(
        smulbb(pred_q13[1] - state.pred_prev_q13[1] as i32, denom_q16),
        16,
    );
    for n in 0..interp_len {
        pred0_q13 += delta0_q13;
        pred1_q13 += delta1_q13;
        residual[n] = mix_residual_sample(mid, side, n, pred0_q13, pred1_q13, w_q24);
    }
    for n in interp_len..frame_length {
        residual[n] =
            mix_residual_sample(mid, side, n, -pred_q13[0], -pred_q13[1], w_q24);
    }
    state.pred_prev_q13[0] = pred_q13[0] as i16;
    state.pred_prev_q13[1] = pred_q13[1] as i16;
    ix
}

#[inline]
fn mix_residual_sample(
    mid: &[i16],
    side: &[i16],
    n: usize,
    pred0_q13: i32,
    pred1_q13: i32,
    w_q24: i32,
) -> i16 {
    let sum = (mid[n] as i32 + mid[n + 2] as i32 + ((mid[n + 1] as i32) << 1)) << 9; // Q11
    let mut acc = smlawb(smulwb(w_q24, side[n + 1] as i32), sum, pred0_q13); // Q8
    acc = smlawb(acc, (mid[n + 1] as i32) << 11, pred1_q13); // Q8
    sat16(rshift_round(acc, 8))
}

/// Least-squares fit of `side ~ w * mid`, returned in Q13 and clamped to
/// [-2, 2]
fn find_predictor(mid: &[i16], side: &[i16]) -> i32 {
    let nrg = inner_prod16(mid, mid) + 1;
    let corr = inner_prod16(mid, side);
    let pred_q13 = (corr << 13) / nrg;
    (pred_q13 as i32).clamp(-(1 << 14), 1 << 14)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pred_round_trip() {
        let mut enc = RangeEncoder::new();
        let mut pred = [6000i32, -2500];
        let ix = quant_pred(&mut pred);
        encode_pred(&mut enc, &ix);
        let data = enc.finish();

        let mut dec = RangeDecoder::new(&data);
        let mut pred_dec = [0i32; 2];
        decode_pred(&mut dec, &mut pred_dec);
        assert_eq!(pred, pred_dec);
    }

    #[test]
    fn test_quant_pred_covers_range() {
        for raw in [-13000i32, -8000, -100, 0, 100, 4000, 13000] {
            let mut pred = [raw, raw / 2];
            quant_pred(&mut pred);
            // pred[0] holds the delta, sum reconstructs the first weight
            let w0 = pred[0] + pred[1];
            assert!((w0 - raw).abs() < 2200, "raw {} quantized to {}", raw, w0);
        }
    }

    #[test]
    fn test_identical_channels_yield_small_side_residual() {
        let mut state = StereoEncState::default();
        let left: Vec<i16> = (0..320)
            .map(|i| (8000.0 * (0.05 * i as f32).sin()) as i16)
            .collect();
        let right = left.clone();
        let mut mid = vec![0i16; 322];
        let mut side = vec![0i16; 322];
        let mut residual = vec![0i16; 320];
        lr_to_ms(&mut state, &left, &right, &mut mid, &mut side, &mut residual, 16);
        // L == R means the side channel and its residual vanish
        assert!(residual.iter().all(|&v| v.abs() <= 1));
        assert!(mid[2..].iter().zip(left.iter()).all(|(&m, &l)| m == l));
    }

    #[test]
    fn test_ms_to_lr_identity_for_zero_side() {
        let mut state = StereoDecState::default();
        let mut x1 = vec![0i16; 322];
        let mut x2 = vec![0i16; 322];
        for i in 0..320 {
            x1[i + 1] = (4000.0 * (0.03 * i as f32).sin()) as i16;
        }
        let orig = x1.clone();
        ms_to_lr(&mut state, &mut x1, &mut x2, &[0, 0], 16, 320);
        // With zero side and zero predictors, left == right == mid
        for n in 0..320 {
            assert_eq!(x1[n + 1], orig[n + 1]);
            assert_eq!(x2[n + 1], orig[n + 1]);
        }
    }
}
