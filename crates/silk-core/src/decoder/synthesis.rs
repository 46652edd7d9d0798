//! Core synthesis: excitation reconstruction, LTP and LPC filtering

use crate::common::filters::lpc_analysis_filter;
use crate::math::{
    add32_ovflw, add_sat32, div32_varq, inverse32_varq, lshift_sat32, mla_ovflw, rshift_round,
    sat16, smlawb, smulwb, smulww,
};
use crate::tables::gain::QUANTIZATION_OFFSETS_Q10;
use crate::types::{SignalType, LTP_ORDER, MAX_FRAME_LENGTH, MAX_LPC_ORDER, MAX_LTP_MEM_LENGTH, MAX_NB_SUBFR, MAX_SUB_FRAME_LENGTH};

use super::{ChannelDecoder, DecoderControl};

/// Q10 rounding adjustment applied to non-zero excitation levels
pub(crate) const QUANT_LEVEL_ADJUST_Q10: i32 = 80;

#[inline]
fn lcg(seed: i32) -> i32 {
    mla_ovflw(907633515, seed, 196314165)
}

/// Synthesize one frame from decoded pulses and parameters
pub(crate) fn decode_core(
    state: &mut ChannelDecoder,
    ctrl: &DecoderControl,
    xq: &mut [i16],
    pulses: &[i16],
) {
    debug_assert!(state.prev_gain_q16 != 0);

    let offset_q10 = QUANTIZATION_OFFSETS_Q10[state.indices.signal_type.index() >> 1]
        [state.indices.quant_offset_type.index()] as i32;
    let nlsf_interpolation_flag = state.indices.nlsf_interp_coef_q2 < 4;

    // Reconstruct the excitation with the sign-scrambling LCG
    let mut rand_seed = state.indices.seed as i32;
    for i in 0..state.frame_length {
        rand_seed = lcg(rand_seed);
        let mut exc = (pulses[i] as i32) << 14;
        if exc > 0 {
            exc -= QUANT_LEVEL_ADJUST_Q10 << 4;
        } else if exc < 0 {
            exc += QUANT_LEVEL_ADJUST_Q10 << 4;
        }
        exc += offset_q10 << 4;
        if rand_seed < 0 {
            exc = -exc;
        }
        state.exc_q14[i] = exc;
        rand_seed = add32_ovflw(rand_seed, pulses[i] as i32);
    }

    let mut s_lpc_q14 = [0i32; MAX_SUB_FRAME_LENGTH + MAX_LPC_ORDER];
    s_lpc_q14[..MAX_LPC_ORDER].copy_from_slice(&state.s_lpc_q14_buf);

    let mut s_ltp = [0i16; MAX_LTP_MEM_LENGTH];
    let mut s_ltp_q15 = [0i32; MAX_LTP_MEM_LENGTH + MAX_FRAME_LENGTH];
    let mut res_q14 = [0i32; MAX_SUB_FRAME_LENGTH];

    let mut s_ltp_buf_idx = state.ltp_mem_length;
    let mut b_q14_plc = [0i16; LTP_ORDER];

    for k in 0..state.nb_subfr {
        let mut signal_type = state.indices.signal_type;
        let a_q12 = &ctrl.pred_coef_q12[k >> 1];
        let mut b_q14: &[i16] = &ctrl.ltp_coef_q14[k * LTP_ORDER..(k + 1) * LTP_ORDER];
        let mut lag = ctrl.pitch_lags[k];

        let gain_q10 = ctrl.gains_q16[k] >> 6;
        let mut inv_gain_q31 = inverse32_varq(ctrl.gains_q16[k], 47);

        // Scale the short-term state when the gain changes
        let gain_adj_q16 = if ctrl.gains_q16[k] != state.prev_gain_q16 {
            let adj = div32_varq(state.prev_gain_q16, ctrl.gains_q16[k], 16);
            for s in s_lpc_q14.iter_mut().take(MAX_LPC_ORDER) {
                *s = smulww(adj, *s);
            }
            adj
        } else {
            1 << 16
        };
        state.prev_gain_q16 = ctrl.gains_q16[k];

        // Avoid an abrupt transition from voiced concealment into unvoiced
        // decoding by extending the previous pitch for half a frame
        if state.loss_cnt > 0
            && state.prev_signal_type == SignalType::Voiced
            && state.indices.signal_type != SignalType::Voiced
            && k < MAX_NB_SUBFR / 2
        {
            b_q14_plc.fill(0);
            b_q14_plc[LTP_ORDER / 2] = 4096; // 0.25 in Q14
            b_q14 = &b_q14_plc;
            signal_type = SignalType::Voiced;
            lag = state.lag_prev;
        }

        if signal_type == SignalType::Voiced {
            if k == 0 || (k == 2 && nlsf_interpolation_flag) {
                // Rewhiten the LTP history with the current LPC
                let start_idx =
                    state.ltp_mem_length as i32 - lag - state.lpc_order as i32 - (LTP_ORDER as i32) / 2;
                debug_assert!(start_idx > 0);
                let start_idx = start_idx as usize;
                if k == 2 {
                    state.out_buf[state.ltp_mem_length..state.ltp_mem_length + 2 * state.subfr_length]
                        .copy_from_slice(&xq[..2 * state.subfr_length]);
                }
                lpc_analysis_filter(
                    &mut s_ltp[start_idx..state.ltp_mem_length],
                    &state.out_buf[start_idx + k * state.subfr_length
                        ..start_idx + k * state.subfr_length + (state.ltp_mem_length - start_idx)],
                    &a_q12[..state.lpc_order],
                );
                if k == 0 {
                    // Downscale the LTP state to limit inter-packet dependency
                    inv_gain_q31 = smulwb(inv_gain_q31, ctrl.ltp_scale_q14) << 2;
                }
                for i in 0..(lag as usize + LTP_ORDER / 2) {
                    s_ltp_q15[s_ltp_buf_idx - i - 1] =
                        smulwb(inv_gain_q31, s_ltp[state.ltp_mem_length - i - 1] as i32);
                }
            } else if gain_adj_q16 != 1 << 16 {
                for i in 0..(lag as usize + LTP_ORDER / 2) {
                    s_ltp_q15[s_ltp_buf_idx - i - 1] =
                        smulww(gain_adj_q16, s_ltp_q15[s_ltp_buf_idx - i - 1]);
                }
            }
        }

        // Long-term prediction
        if signal_type == SignalType::Voiced {
            let mut pred_idx = s_ltp_buf_idx - lag as usize + LTP_ORDER / 2;
            for i in 0..state.subfr_length {
                // The constant 2 compensates the truncation bias of the
                // fractional multiplies
                let mut ltp_pred_q13 = 2i32;
                ltp_pred_q13 = smlawb(ltp_pred_q13, s_ltp_q15[pred_idx], b_q14[0] as i32);
                ltp_pred_q13 = smlawb(ltp_pred_q13, s_ltp_q15[pred_idx - 1], b_q14[1] as i32);
                ltp_pred_q13 = smlawb(ltp_pred_q13, s_ltp_q15[pred_idx - 2], b_q14[2] as i32);
                ltp_pred_q13 = smlawb(ltp_pred_q13, s_ltp_q15[pred_idx - 3], b_q14[3] as i32);
                ltp_pred_q13 = smlawb(ltp_pred_q13, s_ltp_q15[pred_idx - 4], b_q14[4] as i32);
                pred_idx += 1;

                res_q14[i] = add32_ovflw(
                    state.exc_q14[k * state.subfr_length + i],
                    ltp_pred_q13 << 1,
                );
                s_ltp_q15[s_ltp_buf_idx] = res_q14[i] << 1;
                s_ltp_buf_idx += 1;
            }
        } else {
            res_q14[..state.subfr_length].copy_from_slice(
                &state.exc_q14[k * state.subfr_length..(k + 1) * state.subfr_length],
            );
        }

        // Short-term prediction and gain scaling
        for i in 0..state.subfr_length {
            let mut lpc_pred_q10 = (state.lpc_order as i32) >> 1;
            for j in 0..state.lpc_order {
                lpc_pred_q10 = smlawb(
                    lpc_pred_q10,
                    s_lpc_q14[MAX_LPC_ORDER + i - 1 - j],
                    a_q12[j] as i32,
                );
            }
            s_lpc_q14[MAX_LPC_ORDER + i] =
                add_sat32(res_q14[i], lshift_sat32(lpc_pred_q10, 4));
            xq[k * state.subfr_length + i] = sat16(rshift_round(
                smulww(s_lpc_q14[MAX_LPC_ORDER + i], gain_q10),
                8,
            ));
        }

        // Carry the last LPC_ORDER samples into the next subframe
        s_lpc_q14.copy_within(
            state.subfr_length..state.subfr_length + MAX_LPC_ORDER,
            0,
        );
    }

    state.s_lpc_q14_buf.copy_from_slice(&s_lpc_q14[..MAX_LPC_ORDER]);
}
