//! Log-domain subframe gain quantization
//!
//! Quantize and dequantize share the accumulation rules exactly, including
//! the asymmetric double-step remapping for large upward deltas; any
//! mismatch there desynchronizes the two sides for the rest of the stream.

use crate::math::{lin2log, log2lin, smulwb};
use crate::tables::gain::{GAIN_INV_SCALE_Q16, GAIN_LOG_MAX_Q7, GAIN_OFFSET_Q7, GAIN_SCALE_Q16};
use crate::types::{MAX_DELTA_GAIN_QUANT, MIN_DELTA_GAIN_QUANT, N_LEVELS_QGAIN};

#[inline]
fn dequant_level(prev_ind: i32) -> i32 {
    log2lin((smulwb(GAIN_INV_SCALE_Q16, prev_ind) + GAIN_OFFSET_Q7).min(GAIN_LOG_MAX_Q7))
}

/// Dequantize subframe gain indices into linear Q16 gains, accumulating
/// into the running index `prev_ind`
pub fn gains_dequant(
    gains_q16: &mut [i32],
    indices: &[i8],
    prev_ind: &mut i8,
    conditional: bool,
) {
    for (k, &ind) in indices.iter().enumerate() {
        if k == 0 && !conditional {
            // Absolute index; gain is not allowed to drop more than 16
            // steps below the previous frame's last gain
            *prev_ind = (ind).max(*prev_ind - 16);
        } else {
            let ind_tmp = ind as i32 + MIN_DELTA_GAIN_QUANT;
            let double_step_threshold = 2 * MAX_DELTA_GAIN_QUANT - N_LEVELS_QGAIN + *prev_ind as i32;
            if ind_tmp > double_step_threshold {
                *prev_ind = (*prev_ind as i32 + ((ind_tmp << 1) - double_step_threshold)) as i8;
            } else {
                *prev_ind = (*prev_ind as i32 + ind_tmp) as i8;
            }
        }
        *prev_ind = (*prev_ind).clamp(0, (N_LEVELS_QGAIN - 1) as i8);
        gains_q16[k] = dequant_level(*prev_ind as i32);
    }
}

/// Quantize linear Q16 subframe gains, producing the coded indices and the
/// dequantized gains the encoder must run with
pub fn gains_quant(
    indices: &mut [i8],
    gains_q16: &mut [i32],
    prev_ind: &mut i8,
    conditional: bool,
) {
    let nb_subfr = gains_q16.len();
    for k in 0..nb_subfr {
        // Log scale, scale to index domain, floor
        let mut ind = smulwb(GAIN_SCALE_Q16, lin2log(gains_q16[k]) - GAIN_OFFSET_Q7);
        // Round toward the previous quantized gain (hysteresis)
        if ind < *prev_ind as i32 {
            ind += 1;
        }
        ind = ind.clamp(0, N_LEVELS_QGAIN - 1);

        if k == 0 && !conditional {
            ind = ind.clamp(*prev_ind as i32 + MIN_DELTA_GAIN_QUANT, N_LEVELS_QGAIN - 1);
            *prev_ind = ind as i8;
            indices[k] = ind as i8;
        } else {
            let mut delta = ind - *prev_ind as i32;
            let double_step_threshold = 2 * MAX_DELTA_GAIN_QUANT - N_LEVELS_QGAIN + *prev_ind as i32;
            if delta > double_step_threshold {
                // Double the step size for large gain increases
                delta = double_step_threshold + ((delta - double_step_threshold + 1) >> 1);
            }
            delta = delta.clamp(MIN_DELTA_GAIN_QUANT, MAX_DELTA_GAIN_QUANT);
            if delta > double_step_threshold {
                *prev_ind = ((*prev_ind as i32 + ((delta << 1) - double_step_threshold))
                    .min(N_LEVELS_QGAIN - 1)) as i8;
            } else {
                *prev_ind = (*prev_ind as i32 + delta) as i8;
            }
            indices[k] = (delta - MIN_DELTA_GAIN_QUANT) as i8;
        }
        *prev_ind = (*prev_ind).clamp(0, (N_LEVELS_QGAIN - 1) as i8);
        gains_q16[k] = dequant_level(*prev_ind as i32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dequant_is_monotone_and_positive() {
        let mut prev = 0i32;
        for ind in 0..N_LEVELS_QGAIN {
            let g = dequant_level(ind);
            assert!(g >= 1, "gain index {} must dequantize to a usable gain", ind);
            assert!(g > prev, "gains must grow with the index");
            prev = g;
        }
    }

    #[test]
    fn test_quant_round_trip_within_hysteresis() {
        // quantize(dequantize(idx)) stays within one step of idx
        for idx in 0..64i8 {
            let mut prev = idx;
            let mut gains = [0i32; 1];
            gains_dequant(&mut gains, &[idx], &mut { prev }, false);

            let mut indices = [0i8; 1];
            prev = idx;
            let mut gains2 = gains;
            gains_quant(&mut indices, &mut gains2, &mut prev, false);
            assert!(
                (indices[0] as i32 - idx as i32).abs() <= 1,
                "idx {} re-quantized to {}",
                idx,
                indices[0]
            );
        }
    }

    #[test]
    fn test_delta_round_trip() {
        // A sequence of gains must survive a quantize/dequantize pair using
        // the shared accumulation rules
        let gains_in: [i32; 4] = [1 << 16, 5 << 16, 60 << 16, 2 << 16];
        let mut gains = gains_in;
        let mut indices = [0i8; 4];
        let mut prev_enc = 10i8;
        gains_quant(&mut indices, &mut gains, &mut prev_enc, false);

        let mut gains_dec = [0i32; 4];
        let mut prev_dec = 10i8;
        gains_dequant(&mut gains_dec, &indices, &mut prev_dec, false);

        assert_eq!(gains, gains_dec);
        assert_eq!(prev_enc, prev_dec);
    }
}
