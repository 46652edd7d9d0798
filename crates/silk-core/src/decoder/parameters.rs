//! Parameter reconstruction: gains, NLSFs, predictors, pitch contour

use crate::common::gain::gains_dequant;
use crate::common::nlsf::{nlsf_decode, nlsf_interpolate, nlsf_to_a};
use crate::range::RangeDecoder;
use crate::tables::ltp::{ltp_gain_vq, LTP_SCALES_TABLE_Q14};
use crate::tables::pitch::contour_tables;
use crate::types::{ConditionalCoding, SignalType, LTP_ORDER, MAX_LPC_ORDER};

use super::{ChannelDecoder, DecoderControl};

/// Reconstruct per-subframe pitch lags from the lag and contour indices
pub(crate) fn decode_pitch(
    lag_index: i32,
    contour_index: i32,
    pitch_lags: &mut [i32],
    fs_khz: usize,
    nb_subfr: usize,
) {
    let (_, cb, cbk_size) = contour_tables(fs_khz, nb_subfr);
    let min_lag = 2 * fs_khz as i32;
    let max_lag = 18 * fs_khz as i32;
    let lag = min_lag + lag_index;
    for (k, pitch) in pitch_lags.iter_mut().enumerate().take(nb_subfr) {
        let offset = cb[k * cbk_size + contour_index as usize] as i32;
        *pitch = (lag + offset).clamp(min_lag, max_lag);
    }
}

/// Dequantize all frame parameters from the decoded indices
pub(crate) fn decode_parameters(
    state: &mut ChannelDecoder,
    _range_dec: &mut RangeDecoder<'_>,
    ctrl: &mut DecoderControl,
    cond_coding: ConditionalCoding,
) {
    // Gains
    gains_dequant(
        &mut ctrl.gains_q16[..state.nb_subfr],
        &state.indices.gains_indices[..state.nb_subfr],
        &mut state.last_gain_index,
        cond_coding == ConditionalCoding::Conditionally,
    );

    // NLSFs and the second-half LPC coefficients
    let cb = crate::tables::nlsf::codebook_for_order(state.lpc_order);
    let mut nlsf_q15 = [0i16; MAX_LPC_ORDER];
    nlsf_decode(&mut nlsf_q15[..state.lpc_order], &state.indices.nlsf_indices, cb);
    nlsf_to_a(&mut ctrl.pred_coef_q12[1][..state.lpc_order], &nlsf_q15[..state.lpc_order]);

    // Interpolation is disabled right after a reset; a packet loss there
    // would otherwise smear the previous stream's spectrum into this one
    if state.first_frame_after_reset {
        state.indices.nlsf_interp_coef_q2 = 4;
    }

    if state.indices.nlsf_interp_coef_q2 < 4 {
        let mut nlsf0_q15 = [0i16; MAX_LPC_ORDER];
        nlsf_interpolate(
            &mut nlsf0_q15[..state.lpc_order],
            &state.prev_nlsf_q15[..state.lpc_order],
            &nlsf_q15[..state.lpc_order],
            state.indices.nlsf_interp_coef_q2 as i32,
        );
        nlsf_to_a(
            &mut ctrl.pred_coef_q12[0][..state.lpc_order],
            &nlsf0_q15[..state.lpc_order],
        );
    } else {
        ctrl.pred_coef_q12[0] = ctrl.pred_coef_q12[1];
    }
    state.prev_nlsf_q15[..state.lpc_order].copy_from_slice(&nlsf_q15[..state.lpc_order]);

    if state.indices.signal_type == SignalType::Voiced {
        decode_pitch(
            state.indices.lag_index as i32,
            state.indices.contour_index as i32,
            &mut ctrl.pitch_lags[..state.nb_subfr],
            state.fs_khz,
            state.nb_subfr,
        );
        let cbk = ltp_gain_vq(state.indices.per_index as usize);
        for k in 0..state.nb_subfr {
            let row = &cbk[state.indices.ltp_index[k] as usize];
            for i in 0..LTP_ORDER {
                ctrl.ltp_coef_q14[k * LTP_ORDER + i] = (row[i] as i16) << 7;
            }
        }
        ctrl.ltp_scale_q14 = LTP_SCALES_TABLE_Q14[state.indices.ltp_scale_index as usize] as i32;
    } else {
        ctrl.pitch_lags[..state.nb_subfr].fill(0);
        ctrl.ltp_coef_q14.fill(0);
        state.indices.per_index = 0;
        ctrl.ltp_scale_q14 = LTP_SCALES_TABLE_Q14[0] as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pitch_clamps_to_range() {
        let mut lags = [0i32; 4];
        decode_pitch(0, 0, &mut lags, 16, 4);
        for &l in &lags {
            assert!(l >= 32 && l <= 288);
        }
        decode_pitch(1000, 0, &mut lags, 16, 4);
        for &l in &lags {
            assert_eq!(l, 288);
        }
    }

    #[test]
    fn test_decode_pitch_contour_perturbs_subframes() {
        let mut lags = [0i32; 4];
        // A contour with non-zero offsets must vary lags across subframes
        decode_pitch(100, 2, &mut lags, 16, 4);
        assert!(lags.iter().any(|&l| l != lags[0]));
    }
}
