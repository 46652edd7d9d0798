//! Pitch analysis
//!
//! Coarse-to-fine search: a decimated 4 kHz stage proposes candidate lags
//! from whole-frame normalized correlation, a native-rate stage refines
//! them per subframe, and the final stage fits the lag/contour codebooks so
//! the quantized lags reproduce the measured track as closely as possible.

use crate::tables::pitch::contour_tables;
use crate::types::MAX_NB_SUBFR;

/// Result of the pitch search
pub(crate) struct PitchResult {
    pub lag_index: i16,
    pub contour_index: i8,
    pub pitch_lags: [i32; MAX_NB_SUBFR],
    /// Best whole-frame normalized correlation, in [0, 1]
    pub ltp_corr: f32,
}

const N_STAGE1_CANDIDATES: usize = 4;

fn decimate_to_4k(x: &[i16], fs_khz: usize) -> Vec<f32> {
    let factor = fs_khz / 4;
    let mut out = Vec::with_capacity(x.len() / factor);
    let mut acc = 0f32;
    let mut n = 0usize;
    for &v in x {
        acc += v as f32;
        n += 1;
        if n == factor {
            out.push(acc / factor as f32);
            acc = 0.0;
            n = 0;
        }
    }
    out
}

fn norm_corr(target: &[f32], basis: &[f32], bias: f32) -> f32 {
    let mut xcorr = 0f32;
    let mut tgt_e = 0f32;
    let mut bas_e = 0f32;
    for (&t, &b) in target.iter().zip(basis.iter()) {
        xcorr += t * b;
        tgt_e += t * t;
        bas_e += b * b;
    }
    2.0 * xcorr / (tgt_e + bas_e + bias)
}

/// Run the full pitch search over `x` (history plus current frame, the
/// frame being the last `frame_length` samples)
pub(crate) fn pitch_analysis(
    x: &[i16],
    fs_khz: usize,
    nb_subfr: usize,
    frame_length: usize,
) -> PitchResult {
    let min_lag = 2 * fs_khz as i32;
    let max_lag = 18 * fs_khz as i32 - 1;
    let subfr_length = frame_length / nb_subfr;
    let frame_start = x.len() - frame_length;

    // Stage 1: coarse search on the 4 kHz decimated signal
    let x4 = decimate_to_4k(x, fs_khz);
    let frame4 = frame_length * 4 / fs_khz;
    let start4 = x4.len() - frame4;
    let bias = frame4 as f32 * 4000.0;

    let mut coarse: Vec<(f32, i32)> = Vec::with_capacity(72 - 8 + 1);
    for d in 8..=72i32 {
        if start4 as i32 - d < 0 {
            break;
        }
        let target = &x4[start4..];
        let basis = &x4[start4 - d as usize..x4.len() - d as usize];
        coarse.push((norm_corr(target, basis, bias), d));
    }
    coarse.sort_by(|a, b| b.0.total_cmp(&a.0));

    // Keep spread-out candidates so harmonics do not crowd out the true lag
    let mut candidates: Vec<i32> = Vec::new();
    for &(_, d) in &coarse {
        if candidates.iter().all(|&c| (c - d).abs() > 3) {
            candidates.push(d);
        }
        if candidates.len() == N_STAGE1_CANDIDATES {
            break;
        }
    }
    if candidates.is_empty() {
        candidates.push(100 * 4 / fs_khz as i32);
    }

    // Stages 2 and 3: refine each candidate at the native rate, whole frame
    let xf: Vec<f32> = x.iter().map(|&v| v as f32).collect();
    let native_bias = frame_length as f32 * 1000.0;
    let mut best_lag = min_lag;
    let mut best_corr = -1f32;
    for &c4 in &candidates {
        let center = c4 * fs_khz as i32 / 4;
        let lo = (center - 4).max(min_lag);
        let hi = (center + 4).min(max_lag);
        for lag in lo..=hi {
            let target = &xf[frame_start..];
            let basis = &xf[frame_start - lag as usize..xf.len() - lag as usize];
            let corr = norm_corr(target, basis, native_bias);
            if corr > best_corr {
                best_corr = corr;
                best_lag = lag;
            }
        }
    }

    // Per-subframe refinement within +-3 of the frame lag
    let mut sub_lags = [best_lag; MAX_NB_SUBFR];
    for k in 0..nb_subfr {
        let sub_start = frame_start + k * subfr_length;
        let mut best_sub = best_lag;
        let mut best_sub_corr = -1f32;
        for lag in (best_lag - 3).max(min_lag)..=(best_lag + 3).min(max_lag) {
            let target = &xf[sub_start..sub_start + subfr_length];
            let basis = &xf[sub_start - lag as usize..sub_start - lag as usize + subfr_length];
            let corr = norm_corr(target, basis, native_bias / nb_subfr as f32);
            if corr > best_sub_corr {
                best_sub_corr = corr;
                best_sub = lag;
            }
        }
        sub_lags[k] = best_sub;
    }

    // Fit the lag/contour codebooks to the measured track
    let (_, cb, cbk_size) = contour_tables(fs_khz, nb_subfr);
    let mut best_fit = (i64::MAX, 0i16, 0i8);
    for base in (best_lag - 2).max(min_lag)..=(best_lag + 2).min(max_lag) {
        let lag_index = base - min_lag;
        if lag_index < 0 || lag_index > 16 * fs_khz as i32 - 1 {
            continue;
        }
        for contour in 0..cbk_size {
            let mut err = 0i64;
            for k in 0..nb_subfr {
                let rec = (base + cb[k * cbk_size + contour] as i32)
                    .clamp(min_lag, 18 * fs_khz as i32);
                let diff = (rec - sub_lags[k]) as i64;
                err += diff * diff;
            }
            if err < best_fit.0 {
                best_fit = (err, lag_index as i16, contour as i8);
            }
        }
    }

    let (_, lag_index, contour_index) = best_fit;
    let mut pitch_lags = [0i32; MAX_NB_SUBFR];
    crate::decoder::decode_pitch(
        lag_index as i32,
        contour_index as i32,
        &mut pitch_lags[..nb_subfr],
        fs_khz,
        nb_subfr,
    );

    PitchResult {
        lag_index,
        contour_index,
        pitch_lags,
        ltp_corr: best_corr.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse_train(fs_khz: usize, period: usize, len: usize) -> Vec<i16> {
        let _ = fs_khz;
        let mut x = vec![0i16; len];
        let mut i = 7;
        while i < len {
            x[i] = 12000;
            if i + 1 < len {
                x[i + 1] = -6000;
            }
            i += period;
        }
        x
    }

    #[test]
    fn test_pitch_finds_pulse_train_period() {
        let fs = 16;
        let frame = 320;
        let period = 80; // 200 Hz at 16 kHz
        let x = pulse_train(fs, period, 320 + frame);
        let r = pitch_analysis(&x, fs, 4, frame);
        assert!(
            (r.pitch_lags[0] - period as i32).abs() <= 3
                || (r.pitch_lags[0] - 2 * period as i32).abs() <= 3,
            "found lag {} for period {}",
            r.pitch_lags[0],
            period
        );
        assert!(r.ltp_corr > 0.5, "correlation {} too low", r.ltp_corr);
    }

    #[test]
    fn test_pitch_on_noise_has_low_correlation() {
        let mut seed = 0x12345u32;
        let x: Vec<i16> = (0..640)
            .map(|_| {
                seed = seed.wrapping_mul(196314165).wrapping_add(907633515);
                ((seed >> 17) as i32 - 16384) as i16
            })
            .collect();
        let r = pitch_analysis(&x, 16, 4, 320);
        assert!(r.ltp_corr < 0.5, "noise correlated at {}", r.ltp_corr);
    }

    #[test]
    fn test_quantized_lags_stay_in_range() {
        let x = pulse_train(8, 40, 320);
        let r = pitch_analysis(&x, 8, 4, 160);
        for &lag in &r.pitch_lags {
            assert!(lag >= 16 && lag <= 144);
        }
    }
}
