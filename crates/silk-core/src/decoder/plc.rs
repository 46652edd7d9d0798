//! Packet loss concealment
//!
//! LTP-aware concealment replays the last pitch cycle through the stored
//! predictors with a jittered excitation, attenuating the harmonic and
//! noise parts per consecutive loss. The glue pass fades the first decoded
//! frame after a loss up from the concealment energy so the join is
//! inaudible.

use crate::common::filters::{bwexpander, lpc_analysis_filter, lpc_inverse_pred_gain, sum_sqr_shift};
use crate::math::{
    add_sat32, clz32, inverse32_varq, lshift_sat32, mla_ovflw, rshift_round, sat16, smlawb,
    smulbb, smulwb, smulww, sqrt_approx,
};
use crate::types::{
    SignalType, LTP_ORDER, MAX_FRAME_LENGTH, MAX_LPC_ORDER, MAX_LTP_MEM_LENGTH,
};

use super::{ChannelDecoder, DecoderControl};

const RAND_BUF_SIZE: usize = 128;
const RAND_BUF_MASK: i32 = RAND_BUF_SIZE as i32 - 1;

/// Harmonic attenuation per consecutive lost frame (0.99, 0.95 in Q15)
static HARM_ATT_Q15: [i32; 2] = [32440, 31130];
/// Noise attenuation for voiced history (0.95, 0.8 in Q15)
static RAND_ATTENUATE_V_Q15: [i32; 2] = [31130, 26214];
/// Noise attenuation for unvoiced history (0.99, 0.9 in Q15)
static RAND_ATTENUATE_UV_Q15: [i32; 2] = [32440, 29491];

/// Minimum surviving pitch gain at concealment start (0.7 in Q14)
const V_PITCH_GAIN_START_MIN_Q14: i32 = 11469;
/// Maximum pitch gain at concealment start (0.95 in Q14)
const V_PITCH_GAIN_START_MAX_Q14: i32 = 15565;
/// Per-subframe pitch drift during concealment (0.01 in Q16)
const PITCH_DRIFT_FAC_Q16: i32 = 655;

/// Concealment state carried between frames
pub(crate) struct PlcState {
    pub pitch_lag_q8: i32,
    pub ltp_coef_q14: [i16; LTP_ORDER],
    pub prev_lpc_q12: [i16; MAX_LPC_ORDER],
    pub last_frame_lost: bool,
    pub rand_seed: i32,
    pub rand_scale_q14: i16,
    pub conc_energy: i32,
    pub conc_energy_shift: i32,
    pub prev_ltp_scale_q14: i16,
    pub prev_gain_q16: [i32; 2],
}

impl Default for PlcState {
    fn default() -> Self {
        PlcState {
            pitch_lag_q8: 80 << 8,
            ltp_coef_q14: [0; LTP_ORDER],
            prev_lpc_q12: [0; MAX_LPC_ORDER],
            last_frame_lost: false,
            rand_seed: 3482687,
            rand_scale_q14: 1 << 14,
            conc_energy: 0,
            conc_energy_shift: 0,
            prev_ltp_scale_q14: 1 << 14,
            prev_gain_q16: [1 << 16, 1 << 16],
        }
    }
}

/// Refresh the concealment state after a successfully decoded frame
pub(crate) fn plc_update(state: &mut ChannelDecoder, ctrl: &DecoderControl) {
    let nb_subfr = state.nb_subfr;
    if state.indices.signal_type == SignalType::Voiced {
        // Take the parameters of the last subframe containing a full pitch
        // cycle, preferring the strongest LTP filter
        let mut ltp_gain_q14 = 0i32;
        let mut j = 0usize;
        while j < nb_subfr && (j * state.subfr_length) < ctrl.pitch_lags[nb_subfr - 1] as usize {
            let sub = nb_subfr - 1 - j;
            let gain: i32 = ctrl.ltp_coef_q14[sub * LTP_ORDER..(sub + 1) * LTP_ORDER]
                .iter()
                .map(|&c| c as i32)
                .sum();
            if gain > ltp_gain_q14 {
                ltp_gain_q14 = gain;
                state
                    .plc
                    .ltp_coef_q14
                    .copy_from_slice(&ctrl.ltp_coef_q14[sub * LTP_ORDER..(sub + 1) * LTP_ORDER]);
                state.plc.pitch_lag_q8 = ctrl.pitch_lags[sub] << 8;
            }
            j += 1;
        }
        // Concentrate the energy on the middle tap and bound the total gain
        state.plc.ltp_coef_q14.fill(0);
        state.plc.ltp_coef_q14[LTP_ORDER / 2] = ltp_gain_q14 as i16;
        if ltp_gain_q14 < V_PITCH_GAIN_START_MIN_Q14 {
            let scale_q10 = (V_PITCH_GAIN_START_MIN_Q14 << 10) / ltp_gain_q14.max(1);
            let mid = state.plc.ltp_coef_q14[LTP_ORDER / 2] as i32;
            state.plc.ltp_coef_q14[LTP_ORDER / 2] = (smulbb(mid, scale_q10) >> 10) as i16;
        } else if ltp_gain_q14 > V_PITCH_GAIN_START_MAX_Q14 {
            let scale_q14 = (V_PITCH_GAIN_START_MAX_Q14 << 14) / ltp_gain_q14;
            let mid = state.plc.ltp_coef_q14[LTP_ORDER / 2] as i32;
            state.plc.ltp_coef_q14[LTP_ORDER / 2] = (smulbb(mid, scale_q14) >> 14) as i16;
        }
    } else {
        state.plc.pitch_lag_q8 = (18 * state.fs_khz as i32) << 8;
        state.plc.ltp_coef_q14.fill(0);
    }

    state.plc.prev_lpc_q12[..state.lpc_order]
        .copy_from_slice(&ctrl.pred_coef_q12[1][..state.lpc_order]);
    state.plc.prev_ltp_scale_q14 = ctrl.ltp_scale_q14 as i16;
    state.plc.prev_gain_q16[0] = ctrl.gains_q16[nb_subfr - 2];
    state.plc.prev_gain_q16[1] = ctrl.gains_q16[nb_subfr - 1];
}

/// Generate one frame of concealment audio and update the channel state
pub(crate) fn plc_conceal(state: &mut ChannelDecoder, ctrl: &mut DecoderControl, frame: &mut [i16]) {
    let lpc_order = state.lpc_order;
    let prev_gain_q10 = [
        state.plc.prev_gain_q16[0] >> 6,
        state.plc.prev_gain_q16[1] >> 6,
    ];

    if state.first_frame_after_reset {
        state.plc.prev_lpc_q12.fill(0);
    }

    // Pick the quieter of the last two excitation subframes as the random
    // source, so concealment does not amplify a plosive
    let (energy1, shift1) = exc_energy(state, 2);
    let (energy2, shift2) = exc_energy(state, 1);
    let rand_start = if (energy1 >> shift2) < (energy2 >> shift1) {
        ((state.nb_subfr as i32 - 1) * state.subfr_length as i32 - RAND_BUF_SIZE as i32).max(0)
            as usize
    } else {
        (state.nb_subfr as i32 * state.subfr_length as i32 - RAND_BUF_SIZE as i32).max(0) as usize
    };

    let att = (state.loss_cnt as usize).min(1);
    let harm_gain_q15 = HARM_ATT_Q15[att];
    let mut rand_gain_q15 = if state.prev_signal_type == SignalType::Voiced {
        RAND_ATTENUATE_V_Q15[att]
    } else {
        RAND_ATTENUATE_UV_Q15[att]
    };

    // Slowly widen the spectrum of the concealment predictor
    bwexpander(&mut state.plc.prev_lpc_q12[..lpc_order], 64881); // 0.99 in Q16

    let mut b_q14 = state.plc.ltp_coef_q14;
    let mut rand_scale_q14 = state.plc.rand_scale_q14 as i32;

    if state.loss_cnt == 0 {
        rand_scale_q14 = 1 << 14;
        if state.prev_signal_type == SignalType::Voiced {
            for &b in b_q14.iter() {
                rand_scale_q14 -= b as i32;
            }
            rand_scale_q14 = rand_scale_q14.max(3277); // 0.2 in Q14
            rand_scale_q14 =
                smulbb(rand_scale_q14, state.plc.prev_ltp_scale_q14 as i32) >> 14;
        } else {
            // Reduce the noise floor for unvoiced frames with a strong
            // spectral envelope
            let inv_gain_q30 = lpc_inverse_pred_gain(&state.plc.prev_lpc_q12[..lpc_order]);
            let mut down_scale_q30 = inv_gain_q30.min(1 << 27).max(1 << 22);
            down_scale_q30 <<= 3;
            rand_gain_q15 = smulwb(down_scale_q30, rand_gain_q15) >> 14;
        }
    }

    let mut rand_seed = state.plc.rand_seed;
    let mut lag = rshift_round(state.plc.pitch_lag_q8, 8);

    // Rewhiten the LTP state through the stored predictor
    let mut s_ltp = [0i16; MAX_LTP_MEM_LENGTH];
    let mut s_ltp_q14 = [0i32; MAX_LTP_MEM_LENGTH + MAX_FRAME_LENGTH];
    let mut s_ltp_buf_idx = state.ltp_mem_length;
    let idx =
        (state.ltp_mem_length as i32 - lag - lpc_order as i32 - (LTP_ORDER as i32) / 2).max(1)
            as usize;
    lpc_analysis_filter(
        &mut s_ltp[idx..state.ltp_mem_length],
        &state.out_buf[idx..state.ltp_mem_length],
        &state.plc.prev_lpc_q12[..lpc_order],
    );
    let inv_gain_q30 = inverse32_varq(state.plc.prev_gain_q16[1], 46).min(i32::MAX >> 1);
    for i in idx + lpc_order..state.ltp_mem_length {
        s_ltp_q14[i] = smulwb(inv_gain_q30, s_ltp[i] as i32);
    }

    // LTP synthesis with jittered excitation
    for _k in 0..state.nb_subfr {
        let mut pred_idx = s_ltp_buf_idx - lag as usize + LTP_ORDER / 2;
        for _i in 0..state.subfr_length {
            let mut ltp_pred_q12 = 2i32;
            ltp_pred_q12 = smlawb(ltp_pred_q12, s_ltp_q14[pred_idx], b_q14[0] as i32);
            ltp_pred_q12 = smlawb(ltp_pred_q12, s_ltp_q14[pred_idx - 1], b_q14[1] as i32);
            ltp_pred_q12 = smlawb(ltp_pred_q12, s_ltp_q14[pred_idx - 2], b_q14[2] as i32);
            ltp_pred_q12 = smlawb(ltp_pred_q12, s_ltp_q14[pred_idx - 3], b_q14[3] as i32);
            ltp_pred_q12 = smlawb(ltp_pred_q12, s_ltp_q14[pred_idx - 4], b_q14[4] as i32);
            pred_idx += 1;

            rand_seed = mla_ovflw(907633515, rand_seed, 196314165);
            let noise_idx = ((rand_seed >> 25) & RAND_BUF_MASK) as usize;
            let noise = state.exc_q14[rand_start + noise_idx];
            s_ltp_q14[s_ltp_buf_idx] = smlawb(ltp_pred_q12, noise, rand_scale_q14) << 2;
            s_ltp_buf_idx += 1;
        }

        // Attenuate harmonics and noise, drift the lag upward
        for b in b_q14.iter_mut() {
            *b = (smulbb(harm_gain_q15, *b as i32) >> 15) as i16;
        }
        rand_scale_q14 = smulbb(rand_scale_q14, rand_gain_q15) >> 15;
        state.plc.pitch_lag_q8 = smlawb(
            state.plc.pitch_lag_q8,
            state.plc.pitch_lag_q8,
            PITCH_DRIFT_FAC_Q16,
        )
        .min((18 * state.fs_khz as i32) << 8);
        lag = rshift_round(state.plc.pitch_lag_q8, 8);
    }

    // LPC synthesis over the whole frame
    let lpc_base = state.ltp_mem_length - MAX_LPC_ORDER;
    s_ltp_q14[lpc_base..lpc_base + MAX_LPC_ORDER].copy_from_slice(&state.s_lpc_q14_buf);
    for i in 0..state.frame_length {
        let mut lpc_pred_q10 = (lpc_order as i32) >> 1;
        for j in 0..lpc_order {
            lpc_pred_q10 = smlawb(
                lpc_pred_q10,
                s_ltp_q14[lpc_base + MAX_LPC_ORDER + i - 1 - j],
                state.plc.prev_lpc_q12[j] as i32,
            );
        }
        s_ltp_q14[lpc_base + MAX_LPC_ORDER + i] = add_sat32(
            s_ltp_q14[lpc_base + MAX_LPC_ORDER + i],
            lshift_sat32(lpc_pred_q10, 4),
        );
        frame[i] = sat16(rshift_round(
            smulww(s_ltp_q14[lpc_base + MAX_LPC_ORDER + i], prev_gain_q10[1]),
            8,
        ));
    }
    state
        .s_lpc_q14_buf
        .copy_from_slice(&s_ltp_q14[lpc_base + state.frame_length..lpc_base + state.frame_length + MAX_LPC_ORDER]);

    state.plc.rand_seed = rand_seed;
    state.plc.rand_scale_q14 = rand_scale_q14 as i16;
    for l in ctrl.pitch_lags.iter_mut() {
        *l = lag;
    }
}

fn exc_energy(state: &ChannelDecoder, subframes_back: usize) -> (i32, i32) {
    let len = state.subfr_length;
    let start = state.frame_length - subframes_back * len;
    let mut buf = [0i16; MAX_FRAME_LENGTH];
    for i in 0..len {
        buf[i] = sat16(state.exc_q14[start + i] >> 8);
    }
    sum_sqr_shift(&buf[..len])
}

/// Track concealment energy and fade the first good frame in after losses
pub(crate) fn plc_glue_frames(state: &mut ChannelDecoder, frame: &mut [i16]) {
    if state.loss_cnt > 0 {
        let (energy, shift) = sum_sqr_shift(frame);
        state.plc.conc_energy = energy;
        state.plc.conc_energy_shift = shift;
        state.plc.last_frame_lost = true;
        return;
    }
    if state.plc.last_frame_lost {
        let (mut energy, energy_shift) = sum_sqr_shift(frame);
        let mut conc_energy = state.plc.conc_energy;
        if energy_shift > state.plc.conc_energy_shift {
            conc_energy >>= energy_shift - state.plc.conc_energy_shift;
        } else if energy_shift < state.plc.conc_energy_shift {
            energy >>= state.plc.conc_energy_shift - energy_shift;
        }
        if energy > conc_energy {
            let lz = clz32(conc_energy) - 1;
            conc_energy <<= lz;
            energy >>= (24 - lz).max(0);
            let frac_q24 = conc_energy / energy.max(1);
            let mut gain_q16 = sqrt_approx(frac_q24) << 4;
            // 4x steeper than a full-frame ramp, to not miss onsets
            let slope_q16 = (((1i32 << 16) - gain_q16) / frame.len() as i32) << 2;
            for v in frame.iter_mut() {
                *v = smulwb(gain_q16, *v as i32) as i16;
                gain_q16 += slope_q16;
                if gain_q16 > 1 << 16 {
                    break;
                }
            }
        }
    }
    state.plc.last_frame_lost = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plc_state_defaults() {
        let plc = PlcState::default();
        assert_eq!(plc.rand_scale_q14, 1 << 14);
        assert!(!plc.last_frame_lost);
        assert_eq!(plc.prev_gain_q16, [1 << 16, 1 << 16]);
    }
}
