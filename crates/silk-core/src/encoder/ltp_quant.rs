//! Long-term predictor analysis and quantization
//!
//! Fits the 5-tap LTP filters per subframe on the LPC residual: per-subframe
//! correlation matrices, then a joint search over the three codebooks where
//! the periodicity index trades codebook size against fit.

use crate::math::lin2log;
use crate::tables::ltp::{ltp_gain_icdf, ltp_gain_vq};
use crate::types::{MAX_NB_SUBFR, LTP_ORDER};

/// Result of the LTP quantization
pub(crate) struct LtpResult {
    pub per_index: i8,
    pub ltp_index: [i8; MAX_NB_SUBFR],
    pub b_q14: [i16; MAX_NB_SUBFR * LTP_ORDER],
    /// Prediction gain of the chosen filters in Q7 log2 units
    pub pred_gain_q7: i32,
}

/// Approximate Q5 bit cost of a codebook symbol
fn icdf_bits_q5(icdf: &[u8], symbol: usize) -> i32 {
    let hi = if symbol == 0 { 256 } else { icdf[symbol - 1] as i32 };
    let prob = (hi - icdf[symbol] as i32).max(1);
    ((8 << 7) - lin2log(prob)) >> 2
}

/// Quantize the LTP filters for all subframes of a voiced frame.
/// `residual` holds the whitened signal for the whole analysis buffer;
/// `sub_starts[k]` indexes the first target sample of subframe `k`.
pub(crate) fn quantize_ltp(
    residual: &[f32],
    sub_starts: &[usize],
    subfr_length: usize,
    pitch_lags: &[i32],
    mu_q5: i32,
) -> LtpResult {
    let nb_subfr = sub_starts.len();

    // Correlations per subframe
    let mut xx = [[[0f64; LTP_ORDER]; LTP_ORDER]; MAX_NB_SUBFR];
    let mut x_x = [[0f64; LTP_ORDER]; MAX_NB_SUBFR];
    let mut res_energy = [0f64; MAX_NB_SUBFR];
    for k in 0..nb_subfr {
        let start = sub_starts[k];
        let lag = pitch_lags[k] as usize;
        let target = &residual[start..start + subfr_length];
        res_energy[k] = target.iter().map(|&v| (v * v) as f64).sum();
        // Basis vectors around the lag; index 2 is the lag itself
        for i in 0..LTP_ORDER {
            let b_i = &residual[start + 2 - lag - i..start + 2 - lag - i + subfr_length];
            x_x[k][i] = target
                .iter()
                .zip(b_i.iter())
                .map(|(&t, &b)| (t * b) as f64)
                .sum();
            for j in 0..=i {
                let b_j = &residual[start + 2 - lag - j..start + 2 - lag - j + subfr_length];
                let c: f64 = b_i
                    .iter()
                    .zip(b_j.iter())
                    .map(|(&a, &b)| (a * b) as f64)
                    .sum();
                xx[k][i][j] = c;
                xx[k][j][i] = c;
            }
        }
    }

    // Joint search: per codebook, best entry per subframe; keep the
    // codebook with the smallest distortion-plus-rate total
    let mut best = LtpResult {
        per_index: 0,
        ltp_index: [0; MAX_NB_SUBFR],
        b_q14: [0; MAX_NB_SUBFR * LTP_ORDER],
        pred_gain_q7: 0,
    };
    let mut best_total = f64::MAX;
    let mut best_err_total = 0f64;

    for per in 0..3usize {
        let cbk = ltp_gain_vq(per);
        let icdf = ltp_gain_icdf(per);
        let mut total = 0f64;
        let mut err_total = 0f64;
        let mut indices = [0i8; MAX_NB_SUBFR];
        for k in 0..nb_subfr {
            let mut best_cost = f64::MAX;
            let mut best_err = res_energy[k];
            for (ci, taps) in cbk.iter().enumerate() {
                // err = |t|^2 - 2 b'xX + b'XXb with b in Q7
                let mut err = res_energy[k];
                for i in 0..LTP_ORDER {
                    let bi = taps[i] as f64 / 128.0;
                    err -= 2.0 * bi * x_x[k][i];
                    for j in 0..LTP_ORDER {
                        let bj = taps[j] as f64 / 128.0;
                        err += bi * bj * xx[k][i][j];
                    }
                }
                let rate = icdf_bits_q5(icdf, ci) as f64 / 32.0;
                let cost = err + mu_q5 as f64 / 32.0 * rate * res_energy[k].max(1.0) * 1e-4;
                if cost < best_cost {
                    best_cost = cost;
                    best_err = err.max(0.0);
                    indices[k] = ci as i8;
                }
            }
            total += best_cost;
            err_total += best_err;
        }
        // Rate of the periodicity index itself
        total += icdf_bits_q5(&crate::tables::ltp::LTP_PER_INDEX_ICDF, per) as f64 / 32.0;
        if total < best_total {
            best_total = total;
            best_err_total = err_total;
            best.per_index = per as i8;
            best.ltp_index = indices;
        }
    }

    // Materialize the chosen filters in Q14
    let cbk = ltp_gain_vq(best.per_index as usize);
    for k in 0..nb_subfr {
        let taps = &cbk[best.ltp_index[k] as usize];
        for i in 0..LTP_ORDER {
            best.b_q14[k * LTP_ORDER + i] = (taps[i] as i16) << 7;
        }
    }

    // Prediction gain in Q7 log2 units
    let total_res: f64 = res_energy[..nb_subfr].iter().sum();
    if best_err_total > 0.0 && total_res > 0.0 {
        let ratio = (total_res / best_err_total).max(1.0);
        best.pred_gain_q7 = (128.0 * ratio.log2()) as i32;
    }
    best
}

/// Choose the LTP state scaling index from the expected packet loss and
/// the achieved prediction gain
pub(crate) fn ltp_scale_index(packet_loss_pct: i32, frames_per_packet: usize, pred_gain_q7: i32) -> i8 {
    let round_loss = packet_loss_pct + frames_per_packet as i32;
    // 0.1 in Q9; higher loss and stronger LTP push toward heavier scaling
    let scaled = (round_loss * pred_gain_q7 * 51) >> 16;
    scaled.clamp(0, 2) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ltp_fits_periodic_residual() {
        // A residual that repeats with period 80 should be well predicted
        let period = 80usize;
        let mut res = vec![0f32; 720];
        for (i, v) in res.iter_mut().enumerate() {
            *v = ((i % period) as f32 * 0.7).sin() * 800.0;
        }
        let sub_starts = [400usize, 480];
        let r = quantize_ltp(&res, &sub_starts, 80, &[80, 80], 16);
        assert!(r.pred_gain_q7 > 128, "gain {} too low", r.pred_gain_q7);
        // Middle tap should dominate for a perfectly periodic signal
        let mid = r.b_q14[LTP_ORDER / 2];
        assert!(mid > 0);
    }

    #[test]
    fn test_ltp_scale_index_bounds() {
        assert_eq!(ltp_scale_index(0, 1, 0), 0);
        assert!(ltp_scale_index(40, 3, 800) <= 2);
        assert!(ltp_scale_index(100, 3, 2000) >= 1);
    }
}
