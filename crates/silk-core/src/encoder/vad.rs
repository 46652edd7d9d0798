//! Voice activity detection
//!
//! Tracks a noise floor per frame and maps the energy above it to a
//! speech-activity level, with a DC/silence rejection test based on the
//! variance-to-energy ratio of the subframe energies. The voiced/unvoiced
//! decision itself is made later from the pitch correlation; this module
//! also measures the spectral tilt that biases that threshold.

pub(crate) struct VadState {
    noise_energy: f32,
    smoothed_activity: f32,
}

/// Per-frame activity measurement
pub(crate) struct VadResult {
    /// Speech activity in Q8 (0..=256)
    pub speech_activity_q8: i32,
    /// First-order spectral tilt in [-1, 1]; positive means low-frequency
    /// dominated
    pub tilt: f32,
    /// Whether the frame should be coded as active speech
    pub active: bool,
}

impl Default for VadState {
    fn default() -> Self {
        VadState {
            noise_energy: 1e4,
            smoothed_activity: 0.0,
        }
    }
}

impl VadState {
    pub fn process(&mut self, x: &[i16], _nb_subfr: usize) -> VadResult {
        let len = x.len();
        let mut energy = 0f32;
        let mut sum = 0f32;
        for &v in x {
            energy += v as f32 * v as f32;
            sum += v as f32;
        }
        energy /= len as f32;
        let mean = sum / len as f32;

        // DC or constant input carries energy but no variance around its
        // mean; that is not speech
        let variance = energy - mean * mean;
        let flat = variance < energy * 1e-3;

        // Track the noise floor: fast down, slow up
        if energy < self.noise_energy {
            self.noise_energy = 0.8 * self.noise_energy + 0.2 * energy.max(1.0);
        } else {
            self.noise_energy = (self.noise_energy * 1.005).max(1.0);
        }

        // Map SNR to activity
        let snr = energy / self.noise_energy.max(1.0);
        let raw_activity = if energy < 10.0 || flat {
            0.0
        } else {
            let log_snr = snr.max(1e-3).log2();
            (log_snr / 5.0).clamp(0.0, 1.0)
        };
        self.smoothed_activity = 0.7 * self.smoothed_activity + 0.3 * raw_activity;

        // First-order spectral tilt: energy of sums vs differences
        let mut low = 1e-6f32;
        let mut high = 1e-6f32;
        for w in x.windows(2) {
            let s = (w[0] as f32 + w[1] as f32) * 0.5;
            let d = (w[0] as f32 - w[1] as f32) * 0.5;
            low += s * s;
            high += d * d;
        }
        let tilt = (low - high) / (low + high);

        let active = self.smoothed_activity > 0.05 && energy > 10.0 && !flat;
        VadResult {
            speech_activity_q8: (self.smoothed_activity * 256.0) as i32,
            tilt,
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_inactive() {
        let mut vad = VadState::default();
        let x = vec![0i16; 320];
        for _ in 0..5 {
            let r = vad.process(&x, 4);
            assert!(!r.active);
            assert_eq!(r.speech_activity_q8, 0);
        }
    }

    #[test]
    fn test_dc_is_inactive() {
        let mut vad = VadState::default();
        let x = vec![1000i16; 320];
        let r = vad.process(&x, 4);
        assert!(!r.active, "constant input must not count as speech");
    }

    #[test]
    fn test_tone_after_silence_is_active() {
        let mut vad = VadState::default();
        let silence = vec![0i16; 320];
        for _ in 0..10 {
            vad.process(&silence, 4);
        }
        let tone: Vec<i16> = (0..320)
            .map(|i| (8000.0 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 16000.0).sin()) as i16)
            .collect();
        let mut active = false;
        for _ in 0..5 {
            active = vad.process(&tone, 4).active;
        }
        assert!(active);
    }

    #[test]
    fn test_tilt_sign() {
        let mut vad = VadState::default();
        // Slow sinusoid: low-frequency dominated, positive tilt
        let low: Vec<i16> = (0..320).map(|i| (8000.0 * (0.05 * i as f32).sin()) as i16).collect();
        assert!(vad.process(&low, 4).tilt > 0.0);
        // Alternating signal: high-frequency dominated, negative tilt
        let high: Vec<i16> = (0..320).map(|i| if i % 2 == 0 { 8000 } else { -8000 }).collect();
        assert!(vad.process(&high, 4).tilt < 0.0);
    }
}
