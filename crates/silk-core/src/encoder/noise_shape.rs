//! Noise-shaping analysis
//!
//! Derives the perceptual shaping parameters the quantizer runs with: the
//! warped AR shaping filter, harmonic emphasis, tilt, low-frequency
//! shaping, and the rate-distortion trade-off lambda.

use crate::encoder::burg::burg;
use crate::types::{MAX_NB_SUBFR, MAX_SHAPE_LPC_ORDER, SignalType};

/// High-pass noise floor coefficient
const HP_NOISE_COEF: f32 = 0.25;
/// Harmonic noise floor coefficient, scaled by speech activity
const HARM_HP_NOISE_COEF: f32 = 0.35;
/// Harmonic shaping strength for voiced frames
const HARM_SHAPE_FIR_POINT: f32 = 0.25;
/// Bandwidth expansion of the shaping filter
const SHAPE_BWE: f32 = 0.94;
/// Low-frequency shaping strength
const LOW_FREQ_SHAPING: f32 = 0.3;

const LAMBDA_OFFSET: f32 = 1.2;
const LAMBDA_SPEECH_ACT: f32 = -0.2;
const LAMBDA_INPUT_QUALITY: f32 = -0.1;
const LAMBDA_CODING_QUALITY: f32 = -0.2;
const LAMBDA_QUANT_OFFSET: f32 = 0.8;

/// Per-frame shaping parameters consumed by the NSQ
pub(crate) struct ShapeParams {
    pub tilt_q14: [i32; MAX_NB_SUBFR],
    pub harm_shape_gain_q14: [i32; MAX_NB_SUBFR],
    pub lf_shp_q14: [i32; MAX_NB_SUBFR],
    pub ar_shp_q13: [i16; MAX_NB_SUBFR * MAX_SHAPE_LPC_ORDER],
    pub lambda_q10: i32,
    pub warping_q16: i32,
    pub shape_lpc_order: usize,
    pub n_states: usize,
}

impl Default for ShapeParams {
    fn default() -> Self {
        ShapeParams {
            tilt_q14: [0; MAX_NB_SUBFR],
            harm_shape_gain_q14: [0; MAX_NB_SUBFR],
            lf_shp_q14: [0; MAX_NB_SUBFR],
            ar_shp_q13: [0; MAX_NB_SUBFR * MAX_SHAPE_LPC_ORDER],
            lambda_q10: 1024,
            warping_q16: 0,
            shape_lpc_order: 16,
            n_states: 1,
        }
    }
}

/// Smoothed cross-frame shaping state
#[derive(Default)]
pub(crate) struct ShapeState {
    harm_gain_smth: f32,
    tilt_smth: f32,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn noise_shape_analysis(
    state: &mut ShapeState,
    x_frame: &[f32],
    signal_type: SignalType,
    speech_activity_q8: i32,
    ltp_corr: f32,
    pitch_lags: &[i32],
    fs_khz: usize,
    nb_subfr: usize,
    quant_offset_high: bool,
) -> ShapeParams {
    let mut p = ShapeParams {
        shape_lpc_order: if fs_khz == 16 { 16 } else { 12 },
        warping_q16: if fs_khz == 16 { 983 } else { 0 },
        n_states: if nb_subfr == MAX_NB_SUBFR { 4 } else { 1 },
        ..ShapeParams::default()
    };
    let activity = speech_activity_q8 as f32 / 256.0;
    let voiced = signal_type == SignalType::Voiced;

    // Shaping filter from the input spectrum, bandwidth expanded
    let (a_shape, _) = burg(x_frame, p.shape_lpc_order);
    let mut chirp = SHAPE_BWE;
    let mut a_bwe = [0f32; MAX_SHAPE_LPC_ORDER];
    for j in 0..p.shape_lpc_order {
        a_bwe[j] = a_shape[j] * chirp;
        chirp *= SHAPE_BWE;
    }

    // Harmonic gain follows the pitch correlation, smoothed across frames
    let harm_target = if voiced {
        HARM_SHAPE_FIR_POINT * ltp_corr.max(0.0).sqrt() * (0.5 + 0.5 * activity)
    } else {
        0.0
    };
    state.harm_gain_smth = 0.7 * state.harm_gain_smth + 0.3 * harm_target;

    // Tilt: stronger high-frequency emphasis during active voiced speech
    let tilt_target = if voiced {
        -HP_NOISE_COEF - (1.0 - HP_NOISE_COEF) * HARM_HP_NOISE_COEF * activity
    } else {
        -HP_NOISE_COEF
    };
    state.tilt_smth = 0.8 * state.tilt_smth + 0.2 * tilt_target;

    for k in 0..nb_subfr {
        for j in 0..p.shape_lpc_order {
            p.ar_shp_q13[k * MAX_SHAPE_LPC_ORDER + j] =
                (a_bwe[j] * 8192.0).round().clamp(-32768.0, 32767.0) as i16;
        }
        p.harm_shape_gain_q14[k] = (state.harm_gain_smth * 16384.0) as i32;
        p.tilt_q14[k] = (state.tilt_smth * 16384.0) as i32;

        // Low-frequency shaping: stronger for low-pitched voiced frames
        let b = if voiced {
            0.2 / fs_khz as f32 + 3.0 / pitch_lags[k].max(1) as f32
        } else {
            1.3 / fs_khz as f32
        };
        let b_q14 = (b * 16384.0) as i32;
        let ar_part = ((1 << 14) - b_q14 - ((LOW_FREQ_SHAPING * b * 16384.0) as i32)) << 16;
        let ma_part = (b_q14 - (1 << 14)) & 0xffff;
        p.lf_shp_q14[k] = ar_part | ma_part;
    }

    // Rate-distortion trade-off
    let coding_quality = activity;
    let input_quality = activity;
    let lambda = LAMBDA_OFFSET
        + LAMBDA_SPEECH_ACT * activity
        + LAMBDA_INPUT_QUALITY * input_quality
        + LAMBDA_CODING_QUALITY * coding_quality
        + LAMBDA_QUANT_OFFSET * (quant_offset_high as i32 as f32);
    p.lambda_q10 = (lambda.clamp(0.0, 1.999) * 1024.0) as i32;

    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Vec<f32> {
        (0..320).map(|i| 6000.0 * (0.1 * i as f32).sin()).collect()
    }

    #[test]
    fn test_voiced_enables_harmonic_shaping() {
        let mut st = ShapeState::default();
        let mut p = ShapeParams::default();
        for _ in 0..6 {
            p = noise_shape_analysis(
                &mut st,
                &frame(),
                SignalType::Voiced,
                256,
                0.9,
                &[120, 120, 120, 120],
                16,
                4,
                false,
            );
        }
        assert!(p.harm_shape_gain_q14[0] > 0);
        assert!(p.tilt_q14[0] < 0);
    }

    #[test]
    fn test_unvoiced_has_no_harmonic_shaping() {
        let mut st = ShapeState::default();
        let p = noise_shape_analysis(
            &mut st,
            &frame(),
            SignalType::Unvoiced,
            128,
            0.0,
            &[0, 0, 0, 0],
            12,
            4,
            false,
        );
        assert_eq!(p.harm_shape_gain_q14[0], 0);
        assert_eq!(p.warping_q16, 0);
    }

    #[test]
    fn test_lambda_in_range() {
        let mut st = ShapeState::default();
        for &offset_high in &[false, true] {
            let p = noise_shape_analysis(
                &mut st,
                &frame(),
                SignalType::Inactive,
                0,
                0.0,
                &[0, 0, 0, 0],
                8,
                2,
                offset_high,
            );
            assert!(p.lambda_q10 >= 0 && p.lambda_q10 < 2048);
        }
    }
}
