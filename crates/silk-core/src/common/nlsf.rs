//! NLSF processing shared by encoder and decoder
//!
//! Stage-2 residual dequantization, stabilization, Laroia error weights and
//! the NLSF-to-LPC conversion with its stability enforcement.

use crate::common::filters::{bwexpander_32, lpc_fit, lpc_inverse_pred_gain};
use crate::math::{rshift_round, rshift_round64, smlawb, smulbb};
use crate::tables::nlsf::LSF_COS_TAB_Q12;
use crate::tables::NlsfCodebook;
use crate::types::MAX_LPC_ORDER;

/// Q-domain of the residual level adjustment (0.1 in Q10)
pub const NLSF_QUANT_LEVEL_ADJ_Q10: i32 = 102;

const QA: i32 = 16;
const MAX_LPC_STABILIZE_ITERATIONS: usize = 16;

/// Polynomial evaluation order for NLSF-to-LPC; found to maximize the
/// numerical accuracy of the Q16 convolution
static ORDERING_16: [usize; 16] = [0, 15, 8, 7, 4, 11, 12, 3, 2, 13, 10, 5, 6, 9, 14, 1];
static ORDERING_10: [usize; 10] = [0, 9, 6, 3, 4, 5, 8, 1, 2, 7];

/// Dequantize stage-2 residuals in reverse order with back-prediction
pub fn residual_dequant(
    res_q10: &mut [i16],
    indices: &[i8],
    cb: &NlsfCodebook,
    cb1_index: usize,
) {
    let order = cb.order;
    let mut out_q10 = 0i32;
    for i in (0..order).rev() {
        let pred_q10 = if i + 1 < order {
            (smulbb(out_q10, cb.pred_q8_for(cb1_index, i))) >> 8
        } else {
            0
        };
        out_q10 = (indices[i] as i32) << 10;
        if out_q10 > 0 {
            out_q10 -= NLSF_QUANT_LEVEL_ADJ_Q10;
        } else if out_q10 < 0 {
            out_q10 += NLSF_QUANT_LEVEL_ADJ_Q10;
        }
        out_q10 = smlawb(pred_q10, out_q10, cb.quant_step_size_q16);
        res_q10[i] = out_q10 as i16;
    }
}

/// Reconstruct NLSFs from coded indices: stage-1 base vector plus weighted
/// stage-2 residuals, then stabilization
pub fn nlsf_decode(nlsf_q15: &mut [i16], indices: &[i8], cb: &NlsfCodebook) {
    let order = cb.order;
    let cb1 = indices[0] as usize;
    let mut res_q10 = [0i16; MAX_LPC_ORDER];
    residual_dequant(&mut res_q10[..order], &indices[1..1 + order], cb, cb1);

    let base = &cb.cb1_nlsf_q8[cb1 * order..(cb1 + 1) * order];
    let wght = &cb.cb1_wght_q9[cb1 * order..(cb1 + 1) * order];
    for i in 0..order {
        let v = ((base[i] as i32) << 7) + (smulbb(res_q10[i] as i32, wght[i] as i32) >> 14);
        nlsf_q15[i] = v.clamp(0, 32767) as i16;
    }
    nlsf_stabilize(&mut nlsf_q15[..order], cb.delta_min_q15);
}

/// Enforce monotonicity and minimum spacing on an NLSF vector
pub fn nlsf_stabilize(nlsf_q15: &mut [i16], delta_min_q15: &[i32]) {
    let l = nlsf_q15.len();
    for _ in 0..20 {
        // Find the most violated spacing constraint
        let mut min_diff = nlsf_q15[0] as i32 - delta_min_q15[0];
        let mut i_min = 0usize;
        for i in 1..l {
            let diff = nlsf_q15[i] as i32 - (nlsf_q15[i - 1] as i32 + delta_min_q15[i]);
            if diff < min_diff {
                min_diff = diff;
                i_min = i;
            }
        }
        let end_diff = (1 << 15) - delta_min_q15[l] - nlsf_q15[l - 1] as i32;
        if end_diff < min_diff {
            min_diff = end_diff;
            i_min = l;
        }
        if min_diff >= 0 {
            return;
        }

        if i_min == 0 {
            nlsf_q15[0] = delta_min_q15[0] as i16;
        } else if i_min == l {
            nlsf_q15[l - 1] = ((1 << 15) - delta_min_q15[l]) as i16;
        } else {
            // Move the adjacent pair symmetrically about a center frequency
            // bounded by the neighbours' own spacing requirements
            let mut min_center_q15 = delta_min_q15[i_min] >> 1;
            for k in 0..i_min {
                min_center_q15 += delta_min_q15[k];
            }
            let mut max_center_q15 = (1 << 15) - (delta_min_q15[i_min] >> 1);
            for k in i_min + 1..=l {
                max_center_q15 -= delta_min_q15[k];
            }
            let center_freq = rshift_round(
                nlsf_q15[i_min - 1] as i32 + nlsf_q15[i_min] as i32,
                1,
            )
            .clamp(min_center_q15, max_center_q15);
            nlsf_q15[i_min - 1] = (center_freq - (delta_min_q15[i_min] >> 1)) as i16;
            nlsf_q15[i_min] = (nlsf_q15[i_min - 1] as i32 + delta_min_q15[i_min]) as i16;
        }
    }

    // Fallback: sort and force the spacing from both ends
    nlsf_q15.sort_unstable();
    nlsf_q15[0] = nlsf_q15[0].max(delta_min_q15[0] as i16);
    for i in 1..l {
        let floor = (nlsf_q15[i - 1] as i32 + delta_min_q15[i]).min(32767);
        nlsf_q15[i] = nlsf_q15[i].max(floor as i16);
    }
    nlsf_q15[l - 1] = nlsf_q15[l - 1].min(((1 << 15) - delta_min_q15[l]) as i16);
    for i in (0..l - 1).rev() {
        nlsf_q15[i] = nlsf_q15[i].min((nlsf_q15[i + 1] as i32 - delta_min_q15[i + 1]) as i16);
    }
}

/// Laroia error weights for NLSF quantization, Q2
pub fn vq_weights_laroia(weights_q2: &mut [i16], nlsf_q15: &[i16]) {
    let d = nlsf_q15.len();
    let inv = |x: i32| -> i32 { (1 << 17) / x.max(1) };

    let mut tmp1 = inv(nlsf_q15[0] as i32);
    let mut tmp2 = inv(nlsf_q15[1] as i32 - nlsf_q15[0] as i32);
    weights_q2[0] = (tmp1 + tmp2).min(i16::MAX as i32) as i16;

    let mut k = 1;
    while k < d - 1 {
        tmp1 = inv(nlsf_q15[k + 1] as i32 - nlsf_q15[k] as i32);
        weights_q2[k] = (tmp1 + tmp2).min(i16::MAX as i32) as i16;
        tmp2 = inv(nlsf_q15[k + 2].min(i16::MAX) as i32 - nlsf_q15[k + 1] as i32);
        weights_q2[k + 1] = (tmp1 + tmp2).min(i16::MAX as i32) as i16;
        k += 2;
    }
    tmp1 = inv((1 << 15) - nlsf_q15[d - 1] as i32);
    weights_q2[d - 1] = (tmp1 + tmp2).min(i16::MAX as i32) as i16;
}

fn find_poly(out: &mut [i32], c_lsf: &[i32], dd: usize) {
    out[0] = 1 << QA;
    out[1] = -c_lsf[0];
    for k in 1..dd {
        let ftmp = c_lsf[2 * k] as i64;
        out[k + 1] =
            (out[k - 1] << 1) - rshift_round64(ftmp * out[k] as i64, QA) as i32;
        for n in (2..=k).rev() {
            out[n] += out[n - 2] - rshift_round64(ftmp * out[n - 1] as i64, QA) as i32;
        }
        out[1] -= ftmp as i32;
    }
}

/// Convert an NLSF vector to Q12 LPC prediction coefficients, bandwidth
/// expanding until the filter is numerically stable
pub fn nlsf_to_a(a_q12: &mut [i16], nlsf_q15: &[i16]) {
    let d = nlsf_q15.len();
    debug_assert!(d == 10 || d == 16);
    let ordering: &[usize] = if d == 16 { &ORDERING_16 } else { &ORDERING_10 };

    // Cosine interpolation of the NLSF angles
    let mut cos_lsf_qa = [0i32; MAX_LPC_ORDER];
    for k in 0..d {
        let f_int = (nlsf_q15[k] >> 8) as usize;
        let f_frac = nlsf_q15[k] as i32 - ((f_int as i32) << 8);
        let lo = LSF_COS_TAB_Q12[f_int] as i32;
        let hi = LSF_COS_TAB_Q12[f_int + 1] as i32;
        cos_lsf_qa[ordering[k]] = rshift_round((lo << 8) + (hi - lo) * f_frac, 20 - QA);
    }

    // Even and odd polynomials by convolution
    let dd = d / 2;
    let mut p = [0i32; MAX_LPC_ORDER / 2 + 1];
    let mut q = [0i32; MAX_LPC_ORDER / 2 + 1];
    let mut even = [0i32; MAX_LPC_ORDER / 2];
    let mut odd = [0i32; MAX_LPC_ORDER / 2];
    for i in 0..dd {
        even[i] = cos_lsf_qa[2 * i];
        odd[i] = cos_lsf_qa[2 * i + 1];
    }
    find_poly(&mut p, &even[..dd], dd);
    find_poly(&mut q, &odd[..dd], dd);

    let mut a32_qa1 = [0i32; MAX_LPC_ORDER];
    for k in 0..dd {
        let ptmp = p[k + 1] + p[k];
        let qtmp = q[k + 1] - q[k];
        a32_qa1[k] = -qtmp - ptmp;
        a32_qa1[d - k - 1] = qtmp - ptmp;
    }

    lpc_fit(&mut a_q12[..d], &mut a32_qa1[..d], 12, QA + 1);

    let mut i = 0;
    while lpc_inverse_pred_gain(&a_q12[..d]) == 0 && i < MAX_LPC_STABILIZE_ITERATIONS {
        // Coefficients are (too close to) unstable
        bwexpander_32(&mut a32_qa1[..d], 65536 - (2 << i));
        for k in 0..d {
            a_q12[k] = rshift_round(a32_qa1[k], QA + 1 - 12) as i16;
        }
        i += 1;
    }
}

/// NLSF interpolation for the first half of the frame
pub fn nlsf_interpolate(out_q15: &mut [i16], prev_q15: &[i16], curr_q15: &[i16], coef_q2: i32) {
    for i in 0..out_q15.len() {
        out_q15[i] = (prev_q15[i] as i32
            + ((coef_q2 * (curr_q15[i] as i32 - prev_q15[i] as i32)) >> 2))
            as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::nlsf::{NLSF_CB_NB_MB, NLSF_CB_WB};
    use proptest::prelude::*;

    fn spacing_holds(nlsf: &[i16], delta: &[i32]) -> bool {
        if (nlsf[0] as i32) < delta[0] {
            return false;
        }
        for i in 1..nlsf.len() {
            if (nlsf[i] as i32 - nlsf[i - 1] as i32) < delta[i] {
                return false;
            }
        }
        (1 << 15) - nlsf[nlsf.len() - 1] as i32 >= delta[nlsf.len()]
    }

    #[test]
    fn test_stabilize_ordered_input_untouched() {
        let mut nlsf: Vec<i16> = (1..=10).map(|i| (i * 2900) as i16).collect();
        let orig = nlsf.clone();
        nlsf_stabilize(&mut nlsf, NLSF_CB_NB_MB.delta_min_q15);
        assert_eq!(nlsf, orig);
    }

    proptest! {
        #[test]
        fn prop_stabilize_enforces_spacing(values in prop::collection::vec(0i16..=32767, 10)) {
            let mut nlsf = values.clone();
            nlsf_stabilize(&mut nlsf, NLSF_CB_NB_MB.delta_min_q15);
            prop_assert!(spacing_holds(&nlsf, NLSF_CB_NB_MB.delta_min_q15), "input {:?} output {:?}", values, nlsf);
        }

        #[test]
        fn prop_stabilize_enforces_spacing_wb(values in prop::collection::vec(0i16..=32767, 16)) {
            let mut nlsf = values.clone();
            nlsf_stabilize(&mut nlsf, NLSF_CB_WB.delta_min_q15);
            prop_assert!(spacing_holds(&nlsf, NLSF_CB_WB.delta_min_q15));
        }
    }

    #[test]
    fn test_nlsf_to_a_produces_stable_filter() {
        use crate::common::filters::lpc_inverse_pred_gain;
        let nlsf: Vec<i16> = (1..=16).map(|i| (i * 1900) as i16).collect();
        let mut a = [0i16; 16];
        nlsf_to_a(&mut a, &nlsf);
        assert!(lpc_inverse_pred_gain(&a) > 0, "coefficients: {:?}", a);
    }

    #[test]
    fn test_laroia_weights_emphasize_close_pairs() {
        let wide: Vec<i16> = (1..=10).map(|i| (i * 2900) as i16).collect();
        let mut narrow = wide.clone();
        narrow[4] = narrow[3] + 40; // near-coincident pair
        let mut w_wide = [0i16; 10];
        let mut w_narrow = [0i16; 10];
        vq_weights_laroia(&mut w_wide, &wide);
        vq_weights_laroia(&mut w_narrow, &narrow);
        assert!(w_narrow[3] > w_wide[3]);
        assert!(w_narrow[4] > w_wide[4]);
    }
}
