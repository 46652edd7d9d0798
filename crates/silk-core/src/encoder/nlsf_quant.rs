//! NLSF multi-stage vector quantization
//!
//! Stage 1 keeps several survivor vectors from a Laroia-weighted search;
//! for each survivor the stage-2 residuals are quantized in reverse order
//! with the same back-prediction the decoder inverts, and the survivor with
//! the lowest weighted-error-plus-rate total wins.

use crate::common::nlsf::{nlsf_decode, NLSF_QUANT_LEVEL_ADJ_Q10};
use crate::math::{lin2log, smulbb};
use crate::tables::NlsfCodebook;
use crate::types::{
    MAX_LPC_ORDER, NLSF_QUANT_MAX_AMPLITUDE, NLSF_QUANT_MAX_AMPLITUDE_EXT,
};

const N_SURVIVORS: usize = 4;

fn icdf_bits_q5(icdf: &[u8], symbol: usize) -> i32 {
    let hi = if symbol == 0 { 256 } else { icdf[symbol - 1] as i32 };
    let prob = (hi - icdf[symbol] as i32).max(1);
    ((8 << 7) - lin2log(prob)) >> 2
}

/// Rate in Q5 bits of one residual index including the extension symbol
fn residual_bits_q5(cb: &NlsfCodebook, cb1: usize, i: usize, res: i32) -> i32 {
    let icdf = cb.ec_icdf_for(cb1, i);
    let sym = (res + NLSF_QUANT_MAX_AMPLITUDE).clamp(0, 2 * NLSF_QUANT_MAX_AMPLITUDE);
    let mut bits = icdf_bits_q5(icdf, sym as usize);
    if sym == 0 || sym == 2 * NLSF_QUANT_MAX_AMPLITUDE {
        let ext = (res.abs() - NLSF_QUANT_MAX_AMPLITUDE).max(0);
        bits += icdf_bits_q5(&crate::tables::nlsf::NLSF_EXT_ICDF, ext as usize);
    }
    bits
}

/// Quantize the stage-2 residuals of one survivor in reverse order with
/// back-prediction; returns the coded indices and total rate
fn quantize_residuals(
    cb: &NlsfCodebook,
    cb1: usize,
    res_target_q10: &[i32],
    indices_out: &mut [i8],
) -> i32 {
    let order = cb.order;
    let mut rate_q5 = 0;
    let mut out_q10 = 0i32;
    for i in (0..order).rev() {
        let pred_q10 = if i + 1 < order {
            smulbb(out_q10, cb.pred_q8_for(cb1, i)) >> 8
        } else {
            0
        };
        let r_q10 = res_target_q10[i] - pred_q10;
        // Invert the dequantizer's step and level adjustment
        let val_q10 = ((r_q10 as i64) << 16) / cb.quant_step_size_q16 as i64;
        let ind = if val_q10 > 0 {
            ((val_q10 + NLSF_QUANT_LEVEL_ADJ_Q10 as i64 + 512) >> 10) as i32
        } else {
            -(((-val_q10 + NLSF_QUANT_LEVEL_ADJ_Q10 as i64 + 512) >> 10) as i32)
        };
        let ind = ind.clamp(-NLSF_QUANT_MAX_AMPLITUDE_EXT, NLSF_QUANT_MAX_AMPLITUDE_EXT);
        indices_out[i] = ind as i8;
        rate_q5 += residual_bits_q5(cb, cb1, i, ind);

        // Dequantize exactly as the decoder will, feeding the prediction of
        // the next (lower) coefficient
        let mut dq = ind << 10;
        if dq > 0 {
            dq -= NLSF_QUANT_LEVEL_ADJ_Q10;
        } else if dq < 0 {
            dq += NLSF_QUANT_LEVEL_ADJ_Q10;
        }
        out_q10 = crate::math::smlawb(pred_q10, dq, cb.quant_step_size_q16);
    }
    rate_q5
}

/// Quantize an NLSF vector; writes the codebook indices and replaces
/// `nlsf_q15` with the quantized vector the decoder will reconstruct
pub(crate) fn nlsf_encode(
    indices: &mut [i8],
    nlsf_q15: &mut [i16],
    cb: &NlsfCodebook,
    w_q2: &[i16],
    mu_q20: i32,
    signal_type_band: usize,
) {
    let order = cb.order;

    // Stage 1: weighted distance to every codebook vector
    let mut dist: Vec<(i64, usize)> = (0..cb.n_vectors)
        .map(|v| {
            let base = &cb.cb1_nlsf_q8[v * order..(v + 1) * order];
            let mut err = 0i64;
            for i in 0..order {
                let diff = nlsf_q15[i] as i64 - ((base[i] as i64) << 7);
                err += (w_q2[i] as i64 * diff * diff) >> 16;
            }
            (err, v)
        })
        .collect();
    dist.sort_unstable();

    let stage1_icdf =
        &cb.cb1_icdf[signal_type_band * cb.n_vectors..(signal_type_band + 1) * cb.n_vectors];

    // Stage 2 for each survivor
    let mut best_cost = i64::MAX;
    let mut best_indices = [0i8; MAX_LPC_ORDER + 1];
    for &(_, v) in dist.iter().take(N_SURVIVORS) {
        let base = &cb.cb1_nlsf_q8[v * order..(v + 1) * order];
        let wght = &cb.cb1_wght_q9[v * order..(v + 1) * order];

        // Residual targets in the weighted Q10 domain the decoder inverts
        let mut res_q10 = [0i32; MAX_LPC_ORDER];
        for i in 0..order {
            let diff_q15 = nlsf_q15[i] as i32 - ((base[i] as i32) << 7);
            // nlsf = base + (res * w >> 14)  =>  res = (diff << 14) / w
            res_q10[i] = (((diff_q15 as i64) << 14) / wght[i] as i64) as i32;
        }

        let mut trial = [0i8; MAX_LPC_ORDER + 1];
        trial[0] = v as i8;
        let mut rate_q5 = quantize_residuals(cb, v, &res_q10[..order], &mut trial[1..1 + order]);
        rate_q5 += icdf_bits_q5(stage1_icdf, v);

        // Reconstruct and measure the weighted error
        let mut rec = [0i16; MAX_LPC_ORDER];
        nlsf_decode(&mut rec[..order], &trial, cb);
        let mut err = 0i64;
        for i in 0..order {
            let diff = nlsf_q15[i] as i64 - rec[i] as i64;
            err += (w_q2[i] as i64 * diff * diff) >> 2;
        }
        let cost = err + ((mu_q20 as i64 * rate_q5 as i64) >> 10);
        if cost < best_cost {
            best_cost = cost;
            best_indices = trial;
        }
    }

    indices[..=order].copy_from_slice(&best_indices[..=order]);
    nlsf_decode(&mut nlsf_q15[..order], &best_indices, cb);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::nlsf::{nlsf_stabilize, vq_weights_laroia};
    use crate::tables::nlsf::{NLSF_CB_NB_MB, NLSF_CB_WB};

    fn quantize(target: &[i16], cb: &'static NlsfCodebook) -> (Vec<i16>, Vec<i8>) {
        let order = cb.order;
        let mut nlsf = target.to_vec();
        nlsf_stabilize(&mut nlsf, cb.delta_min_q15);
        let mut w = vec![0i16; order];
        vq_weights_laroia(&mut w, &nlsf);
        let mut indices = vec![0i8; order + 1];
        nlsf_encode(&mut indices, &mut nlsf, cb, &w, 1 << 15, 0);
        (nlsf, indices)
    }

    #[test]
    fn test_quantized_nlsf_close_to_target() {
        let target: Vec<i16> = (1..=10).map(|i| (i * 2800) as i16).collect();
        let (quant, _) = quantize(&target, &NLSF_CB_NB_MB);
        for (t, q) in target.iter().zip(quant.iter()) {
            assert!(
                (*t as i32 - *q as i32).abs() < 3000,
                "target {:?} quantized {:?}",
                target,
                quant
            );
        }
    }

    #[test]
    fn test_residual_indices_in_coded_range() {
        let target: Vec<i16> = (1..=16).map(|i| (i * 1800 + 200) as i16).collect();
        let (_, indices) = quantize(&target, &NLSF_CB_WB);
        assert!((indices[0] as usize) < NLSF_CB_WB.n_vectors);
        for &r in &indices[1..] {
            assert!((r as i32).abs() <= NLSF_QUANT_MAX_AMPLITUDE_EXT);
        }
    }

    #[test]
    fn test_quantizer_matches_decoder_reconstruction() {
        // The quantized NLSFs written back must equal a fresh decode of the
        // indices
        let target: Vec<i16> = (1..=10).map(|i| (i * 2500 + 700) as i16).collect();
        let (quant, indices) = quantize(&target, &NLSF_CB_NB_MB);
        let mut rec = [0i16; 10];
        nlsf_decode(&mut rec, &indices, &NLSF_CB_NB_MB);
        assert_eq!(&rec[..], &quant[..]);
    }
}
