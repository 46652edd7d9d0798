//! Variable-cutoff low-pass filter for bandwidth transitions
//!
//! When the target bandwidth drops below the coded bandwidth, the input is
//! low-passed with a second-order filter whose cutoff ramps over
//! `TRANSITION_FRAMES` frames, so the spectral content fades rather than
//! switching. The coefficient sets below span the ramp from widest to
//! narrowest cutoff; between sets the coefficients are interpolated
//! per frame.

use crate::common::filters::biquad_alt;
use crate::math::smulwb;

/// Frames over which a bandwidth transition is smoothed
pub(crate) const TRANSITION_FRAMES: i32 = 64;

const TRANSITION_INT_NUM: usize = 5;
const TRANSITION_INT_STEPS: i32 = TRANSITION_FRAMES / (TRANSITION_INT_NUM as i32 - 1);

/// Numerator coefficient sets, Q28, widest to narrowest cutoff
static TRANSITION_LP_B_Q28: [[i32; 3]; TRANSITION_INT_NUM] = [
    [250767114, 501534038, 250767114],
    [209867381, 419732057, 209867381],
    [170987846, 341967853, 170987846],
    [131531482, 263046905, 131531482],
    [110440130, 220874953, 110440130],
];

/// Denominator coefficient sets, Q28
static TRANSITION_LP_A_Q28: [[i32; 2]; TRANSITION_INT_NUM] = [
    [506393414, 239854379],
    [411067935, 169683996],
    [306733530, 116694253],
    [185807084, 77959395],
    [35497197, 57401098],
];

/// Transition filter state
#[derive(Default)]
pub(crate) struct LpState {
    in_lp_state: [i32; 2],
    /// Frame counter within the ramp; 0 means idle
    pub transition_frame_no: i32,
    /// Ramp direction: positive narrows the cutoff, negative widens it
    pub mode: i32,
}

impl LpState {
    /// Start (or reverse) a cutoff ramp
    pub fn start_transition(&mut self, narrowing: bool) {
        self.mode = if narrowing { 1 } else { -1 };
        if self.transition_frame_no == 0 {
            self.transition_frame_no = if narrowing { 1 } else { TRANSITION_FRAMES };
        }
    }

    /// Filter one frame in place when a transition is active
    pub fn process(&mut self, frame: &mut [i16]) {
        if self.mode == 0 || self.transition_frame_no == 0 {
            return;
        }
        let fno = self.transition_frame_no.clamp(0, TRANSITION_FRAMES);

        // Interpolate the coefficient sets at the current ramp position
        let ind = ((fno - 1) / TRANSITION_INT_STEPS).clamp(0, TRANSITION_INT_NUM as i32 - 2) as usize;
        let frac_q16 = ((fno - 1) - ind as i32 * TRANSITION_INT_STEPS) * (65536 / TRANSITION_INT_STEPS);
        let mut b_q28 = [0i32; 3];
        let mut a_q28 = [0i32; 2];
        for i in 0..3 {
            b_q28[i] = TRANSITION_LP_B_Q28[ind][i]
                + smulwb(
                    TRANSITION_LP_B_Q28[ind + 1][i] - TRANSITION_LP_B_Q28[ind][i],
                    frac_q16,
                );
        }
        for i in 0..2 {
            a_q28[i] = TRANSITION_LP_A_Q28[ind][i]
                + smulwb(
                    TRANSITION_LP_A_Q28[ind + 1][i] - TRANSITION_LP_A_Q28[ind][i],
                    frac_q16,
                );
        }

        let mut out = [0i16; crate::types::MAX_FRAME_LENGTH];
        biquad_alt(frame, &b_q28, &a_q28, &mut self.in_lp_state, &mut out[..frame.len()]);
        frame.copy_from_slice(&out[..frame.len()]);

        // Advance the ramp and go idle at either end
        self.transition_frame_no += self.mode;
        if self.transition_frame_no <= 0 {
            self.transition_frame_no = 0;
            self.mode = 0;
        } else if self.transition_frame_no > TRANSITION_FRAMES {
            self.transition_frame_no = 0;
            self.mode = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hf_energy(x: &[i16]) -> f64 {
        x.windows(2)
            .map(|w| {
                let d = (w[1] - w[0]) as f64;
                d * d
            })
            .sum()
    }

    #[test]
    fn test_idle_filter_is_identity() {
        let mut lp = LpState::default();
        let mut frame: Vec<i16> = (0..160).map(|i| ((i * 37) % 2048) as i16 - 1024).collect();
        let orig = frame.clone();
        lp.process(&mut frame);
        assert_eq!(frame, orig);
    }

    #[test]
    fn test_transition_attenuates_high_frequencies() {
        let mut lp = LpState::default();
        lp.start_transition(true);
        let make = || -> Vec<i16> {
            (0..320)
                .map(|i| if i % 2 == 0 { 6000i16 } else { -6000 })
                .collect()
        };
        let raw = make();
        let mut filtered = make();
        // Run a few frames into the ramp
        for _ in 0..8 {
            filtered = make();
            lp.process(&mut filtered);
        }
        assert!(hf_energy(&filtered) < hf_energy(&raw) * 0.5);
    }

    #[test]
    fn test_ramp_terminates() {
        let mut lp = LpState::default();
        lp.start_transition(false);
        let mut frame = vec![100i16; 160];
        for _ in 0..(TRANSITION_FRAMES + 4) {
            lp.process(&mut frame);
        }
        assert_eq!(lp.mode, 0);
        assert_eq!(lp.transition_frame_no, 0);
    }
}
