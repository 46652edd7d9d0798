//! Short-term prediction analysis
//!
//! Burg's method in single-precision float (the analysis side is not
//! required to be bit-exact), followed by the fixed-point conversion of
//! prediction coefficients to NLSFs used for quantization.

use crate::common::nlsf::{nlsf_interpolate, nlsf_to_a};
use crate::math::{clz32, rshift_round, smlaww};
use crate::tables::nlsf::LSF_COS_TAB_Q12;
use crate::types::MAX_LPC_ORDER;

/// Burg's method: returns prediction coefficients (`x[n] ~ sum a[j] *
/// x[n-1-j]`) and the inverse prediction gain (residual over signal energy)
pub(crate) fn burg(x: &[f32], order: usize) -> ([f32; MAX_LPC_ORDER], f32) {
    let n = x.len();
    let mut a = [0f32; MAX_LPC_ORDER];
    let mut f: Vec<f32> = x.to_vec();
    let mut b: Vec<f32> = x.to_vec();

    let total_energy: f32 = x.iter().map(|v| v * v).sum::<f32>().max(1e-9);
    let mut err_energy = total_energy;

    for m in 0..order {
        let mut num = 0f32;
        let mut den = 0f32;
        for i in m + 1..n {
            num += f[i] * b[i - 1];
            den += f[i] * f[i] + b[i - 1] * b[i - 1];
        }
        let k = if den > 1e-9 { -2.0 * num / den } else { 0.0 };
        let k = k.clamp(-0.999_9, 0.999_9);

        // Update forward and backward residuals
        for i in (m + 1..n).rev() {
            let f_prev = f[i];
            f[i] = f_prev + k * b[i - 1];
            b[i] = b[i - 1] + k * f_prev;
        }

        // Levinson update, kept directly in prediction-coefficient form
        let mut a_new = a;
        a_new[m] = -k;
        for j in 0..m {
            a_new[j] = a[j] + k * a[m - 1 - j];
        }
        a = a_new;
        err_energy *= 1.0 - k * k;
    }
    (a, (err_energy / total_energy).max(1e-9))
}

/// Bandwidth-expand float coefficients until their inverse prediction gain
/// reaches `min_inv_gain`
pub(crate) fn limit_coefs(a: &mut [f32], inv_gain: &mut f32, min_inv_gain: f32) {
    let mut iterations = 0;
    while *inv_gain < min_inv_gain && iterations < 16 {
        let chirp = 0.995f32 - 0.004 * iterations as f32;
        let mut c = chirp;
        for v in a.iter_mut() {
            *v *= c;
            c *= chirp;
        }
        // Chirping by rho scales the prediction gain roughly by rho^2 per
        // pole; recompute conservatively
        *inv_gain /= chirp * chirp;
        iterations += 1;
    }
}

#[inline]
fn eval_poly_q16(p: &[i32], x_q12: i32, dd: usize) -> i32 {
    let x_q16 = x_q12 << 4;
    let mut y32 = p[dd];
    for n in (0..dd).rev() {
        y32 = smlaww(p[n], y32, x_q16);
    }
    y32
}

fn a2nlsf_init(a_q16: &[i32], p: &mut [i32], q: &mut [i32], dd: usize) {
    p[dd] = 1 << 16;
    q[dd] = 1 << 16;
    for k in 0..dd {
        p[k] = -a_q16[dd - k - 1] - a_q16[dd + k];
        q[k] = -a_q16[dd - k - 1] + a_q16[dd + k];
    }
    // Divide out the roots at z = 1 (Q) and z = -1 (P)
    for k in (1..=dd).rev() {
        p[k - 1] -= p[k];
        q[k - 1] += q[k];
    }
    // Transform from cos(n f) to powers of cos(f)
    trans_poly(p, dd);
    trans_poly(q, dd);
}

fn trans_poly(p: &mut [i32], dd: usize) {
    for k in 2..=dd {
        for n in (k + 1..=dd).rev() {
            p[n - 2] -= p[n];
        }
        p[k - 2] -= p[k] << 1;
    }
}

/// Convert prediction coefficients (Q16) to NLSFs by locating the
/// interleaved roots of the symmetric and antisymmetric LSP polynomials on
/// the cosine grid
pub(crate) fn a2nlsf(nlsf_q15: &mut [i16], a_q16: &mut [i32]) {
    const BIN_DIV_STEPS: i32 = 3;
    const MAX_ITERATIONS: usize = 16;

    let d = nlsf_q15.len();
    let dd = d / 2;
    let mut p = [0i32; MAX_LPC_ORDER / 2 + 1];
    let mut q = [0i32; MAX_LPC_ORDER / 2 + 1];
    a2nlsf_init(a_q16, &mut p, &mut q, dd);

    let mut use_p = true;
    let mut root_ix = 0usize;
    let mut k = 1usize;
    let mut i = 0usize;
    let mut thr = 0;
    let mut xlo = LSF_COS_TAB_Q12[0] as i32;
    let mut ylo = eval_poly_q16(&p, xlo, dd);
    if ylo < 0 {
        // Set the first NLSF to zero and use the antisymmetric polynomial
        nlsf_q15[0] = 0;
        root_ix = 1;
        use_p = false;
        ylo = eval_poly_q16(&q, xlo, dd);
    }

    loop {
        let xhi = LSF_COS_TAB_Q12[k] as i32;
        let poly: &[i32] = if use_p { &p } else { &q };
        let yhi = eval_poly_q16(poly, xhi, dd);

        if (ylo <= 0 && yhi >= thr) || (ylo >= 0 && yhi <= -thr) {
            thr = if yhi == 0 { 1 } else { 0 };
            // Binary subdivision of the bracketing interval
            let mut ffrac = -256i32;
            let mut xlo2 = xlo;
            let mut xhi2 = xhi;
            let mut ylo2 = ylo;
            let mut yhi2 = yhi;
            for m in 0..BIN_DIV_STEPS {
                let xmid = rshift_round(xlo2 + xhi2, 1);
                let ymid = eval_poly_q16(poly, xmid, dd);
                if (ylo2 <= 0 && ymid >= 0) || (ylo2 >= 0 && ymid <= 0) {
                    xhi2 = xmid;
                    yhi2 = ymid;
                } else {
                    xlo2 = xmid;
                    ylo2 = ymid;
                    ffrac += 128 >> m;
                }
            }
            // Linear interpolation within the final interval
            if ylo2.abs() < 65536 {
                let den = ylo2 - yhi2;
                let nom = (ylo2 << (8 - BIN_DIV_STEPS)) + (den >> 1);
                if den != 0 {
                    ffrac += nom / den;
                }
            } else if ylo2 != yhi2 {
                ffrac += ylo2 / ((ylo2 - yhi2) >> (8 - BIN_DIV_STEPS));
            }
            nlsf_q15[root_ix] = (((k as i32) << 8) + ffrac).clamp(0, 32767) as i16;

            root_ix += 1;
            if root_ix >= d {
                return;
            }
            // Alternate polynomials, restart from the previous grid point
            use_p = !use_p;
            xlo = LSF_COS_TAB_Q12[k - 1] as i32;
            ylo = (1 - ((root_ix as i32) & 2)) << 12;
        } else {
            k += 1;
            xlo = xhi;
            ylo = yhi;
            thr = 0;
            if k > 128 {
                i += 1;
                if i > MAX_ITERATIONS {
                    // Give up and return a white spectrum
                    nlsf_q15[0] = ((1 << 15) / (d as i32 + 1)) as i16;
                    for n in 1..d {
                        nlsf_q15[n] = nlsf_q15[n - 1] + nlsf_q15[0];
                    }
                    return;
                }
                // Not all roots found; expand the bandwidth and retry
                crate::common::filters::bwexpander_32(&mut a_q16[..d], 65536 - (1 << i));
                a2nlsf_init(a_q16, &mut p, &mut q, dd);
                use_p = true;
                root_ix = 0;
                k = 1;
                xlo = LSF_COS_TAB_Q12[0] as i32;
                ylo = eval_poly_q16(&p, xlo, dd);
                if ylo < 0 {
                    nlsf_q15[0] = 0;
                    root_ix = 1;
                    use_p = false;
                    ylo = eval_poly_q16(&q, xlo, dd);
                }
            }
        }
    }
}

/// Convert float prediction coefficients to NLSFs in Q15
pub(crate) fn float_a_to_nlsf(nlsf_q15: &mut [i16], a: &[f32]) {
    let mut a_q16 = [0i32; MAX_LPC_ORDER];
    for (dst, &src) in a_q16.iter_mut().zip(a.iter()) {
        *dst = (src * 65536.0).round() as i32;
    }
    a2nlsf(nlsf_q15, &mut a_q16[..nlsf_q15.len()]);
}

/// Residual energy of `x` through the Q12 predictor `a_q12`
pub(crate) fn residual_energy(x: &[i16], a_q12: &[i16]) -> f32 {
    let order = a_q12.len();
    let mut energy = 0f32;
    for n in order..x.len() {
        let mut pred = 0i64;
        for j in 0..order {
            pred += a_q12[j] as i64 * x[n - 1 - j] as i64;
        }
        let res = x[n] as f32 - (pred >> 12) as f32;
        energy += res * res;
    }
    energy
}

/// Pick the NLSF interpolation factor: the smallest blend of previous and
/// current NLSFs whose first-half residual energy is not worse than using
/// the current coefficients throughout
pub(crate) fn find_interp_factor(
    x_first_half: &[i16],
    prev_nlsf_q15: &[i16],
    curr_nlsf_q15: &[i16],
) -> i8 {
    let order = curr_nlsf_q15.len();
    let mut a_q12 = [0i16; MAX_LPC_ORDER];
    nlsf_to_a(&mut a_q12[..order], curr_nlsf_q15);
    let baseline = residual_energy(x_first_half, &a_q12[..order]);

    let mut best = 4i8;
    let mut best_energy = baseline;
    let mut interp = [0i16; MAX_LPC_ORDER];
    for k in (0..4).rev() {
        nlsf_interpolate(
            &mut interp[..order],
            prev_nlsf_q15,
            curr_nlsf_q15,
            k as i32,
        );
        nlsf_to_a(&mut a_q12[..order], &interp[..order]);
        let energy = residual_energy(x_first_half, &a_q12[..order]);
        // Require a clear win before introducing interpolation
        if energy < best_energy * 0.98 {
            best_energy = energy;
            best = k;
        }
    }
    best
}

/// Headroom-aware conversion of int16 samples to float for analysis
pub(crate) fn to_float(x: &[i16], out: &mut [f32]) {
    for (dst, &src) in out.iter_mut().zip(x.iter()) {
        *dst = src as f32;
    }
}

#[allow(dead_code)]
fn ilog2(x: i32) -> i32 {
    31 - clz32(x.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_ar(coefs: &[f32], len: usize) -> Vec<f32> {
        let mut x = vec![0f32; len];
        let mut seed = 22222u32;
        for n in 0..len {
            seed = seed.wrapping_mul(196314165).wrapping_add(907633515);
            let noise = (seed >> 16) as f32 / 65536.0 - 0.5;
            let mut v = noise * 100.0;
            for (j, &c) in coefs.iter().enumerate() {
                if n > j {
                    v += c * x[n - 1 - j];
                }
            }
            x[n] = v;
        }
        x
    }

    #[test]
    fn test_burg_recovers_ar2_model() {
        let x = synth_ar(&[1.5, -0.7], 640);
        let (a, inv_gain) = burg(&x, 2);
        assert!((a[0] - 1.5).abs() < 0.1, "a0 = {}", a[0]);
        assert!((a[1] + 0.7).abs() < 0.1, "a1 = {}", a[1]);
        assert!(inv_gain < 0.2, "prediction should remove most energy");
    }

    #[test]
    fn test_burg_on_noise_has_low_gain() {
        let x = synth_ar(&[], 640);
        let (_, inv_gain) = burg(&x, 10);
        assert!(inv_gain > 0.5, "white noise is unpredictable: {}", inv_gain);
    }

    #[test]
    fn test_a2nlsf_monotone_output() {
        let x = synth_ar(&[1.2, -0.5, 0.1], 640);
        let (a, _) = burg(&x, 10);
        let mut nlsf = [0i16; 10];
        float_a_to_nlsf(&mut nlsf, &a[..10]);
        for w in nlsf.windows(2) {
            assert!(w[0] < w[1], "NLSFs must be sorted: {:?}", nlsf);
        }
    }

    #[test]
    fn test_a2nlsf_round_trip_through_synthesis() {
        // NLSF -> A -> NLSF must approximately preserve the frequencies
        let nlsf_in: Vec<i16> = (1..=10).map(|i| (i * 2800) as i16).collect();
        let mut a_q12 = [0i16; 10];
        nlsf_to_a(&mut a_q12, &nlsf_in);
        let mut a_q16: Vec<i32> = a_q12.iter().map(|&v| (v as i32) << 4).collect();
        let mut nlsf_out = [0i16; 10];
        a2nlsf(&mut nlsf_out, &mut a_q16);
        for (i, (&a, &b)) in nlsf_in.iter().zip(nlsf_out.iter()).enumerate() {
            assert!((a as i32 - b as i32).abs() < 400, "root {}: {} vs {}", i, a, b);
        }
    }
}
