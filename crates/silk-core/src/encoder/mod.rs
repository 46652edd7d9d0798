//! SILK encoder
//!
//! Per-frame flow: VAD and voicing classification, pitch analysis, Burg
//! LPC with NLSF quantization, LTP quantization, noise-shape analysis, gain
//! quantization, then noise-shaped quantization of the residual and range
//! coding of all indices and pulses. An outer loop re-runs the quantizer
//! with scaled gains until the frame fits its bit budget. Header flags are
//! back-patched once every frame of the packet is coded.

mod burg;
mod indices;
mod lp_filter;
mod ltp_quant;
mod nlsf_quant;
mod noise_shape;
mod nsq;
mod pitch;
mod pulses;
mod vad;

use crate::common::gain::gains_quant;
use crate::common::nlsf::{nlsf_interpolate, nlsf_stabilize, nlsf_to_a, vq_weights_laroia};
use crate::decoder::SideInfoIndices;
use crate::error::{Result, SilkError};
use crate::math::lin2log;
use crate::range::{EntropyEncoder, RangeEncoder};
use crate::stereo::{self, StereoEncState};
use crate::tables::ltp::LTP_SCALES_TABLE_Q14;
use crate::types::{
    Bandwidth, ConditionalCoding, FrameDuration, QuantizationOffsetType, SignalType,
    MAX_FRAME_LENGTH, MAX_LPC_ORDER, MAX_LTP_MEM_LENGTH, MAX_NB_SUBFR,
    MAX_PREDICTION_POWER_GAIN, MAX_PREDICTION_POWER_GAIN_AFTER_RESET,
};

use lp_filter::LpState;
use noise_shape::ShapeState;
use nsq::{NsqConfig, NsqState};
use vad::VadState;

/// Cap on the rate-control loop
const MAX_RATE_LOOPS: usize = 6;

/// Voicing decision: base correlation threshold and its reductions
const VOICED_THRESHOLD: f32 = 0.45;
const VOICED_THRESHOLD_HYSTERESIS: f32 = 0.15;
const VOICED_THRESHOLD_TILT: f32 = 0.1;

/// SILK encoder instance for one channel
pub struct Encoder {
    pub(crate) bandwidth: Bandwidth,
    pub(crate) fs_khz: usize,
    pub(crate) nb_subfr: usize,
    pub(crate) frame_length: usize,
    pub(crate) subfr_length: usize,
    pub(crate) ltp_mem_length: usize,
    pub(crate) lpc_order: usize,

    x_buf: [i16; MAX_LTP_MEM_LENGTH + MAX_FRAME_LENGTH],

    pub(crate) indices: SideInfoIndices,
    prev_nlsf_q15: [i16; MAX_LPC_ORDER],
    prev_signal_type: SignalType,
    pub(crate) ec_prev_signal_type: SignalType,
    pub(crate) ec_prev_lag_index: i16,
    prev_gain_index: i8,
    frame_counter: i32,
    sum_log_gain_q7: i32,
    packet_loss_pct: i32,
    first_frame_after_reset: bool,

    vad: VadState,
    shape_state: ShapeState,
    nsq_state: NsqState,
    stereo: StereoEncState,
    prev_mid_only: bool,
    lp: LpState,

    target_rate_bps: i32,
    final_range: u32,
}

impl Encoder {
    /// Create an encoder for the given bandwidth
    pub fn new(bandwidth: Bandwidth) -> Result<Self> {
        Ok(Encoder {
            bandwidth,
            fs_khz: bandwidth.fs_khz(),
            nb_subfr: MAX_NB_SUBFR,
            frame_length: bandwidth.frame_length(),
            subfr_length: bandwidth.subframe_length(),
            ltp_mem_length: bandwidth.ltp_mem_length(),
            lpc_order: bandwidth.lpc_order(),
            x_buf: [0; MAX_LTP_MEM_LENGTH + MAX_FRAME_LENGTH],
            indices: SideInfoIndices::default(),
            prev_nlsf_q15: [0; MAX_LPC_ORDER],
            prev_signal_type: SignalType::Inactive,
            ec_prev_signal_type: SignalType::Inactive,
            ec_prev_lag_index: 0,
            prev_gain_index: 10,
            frame_counter: 0,
            sum_log_gain_q7: 0,
            packet_loss_pct: 0,
            first_frame_after_reset: true,
            vad: VadState::default(),
            shape_state: ShapeState::default(),
            nsq_state: NsqState::default(),
            stereo: StereoEncState::default(),
            prev_mid_only: false,
            lp: LpState::default(),
            target_rate_bps: match bandwidth {
                Bandwidth::Narrow => 16_000,
                Bandwidth::Medium => 20_000,
                Bandwidth::Wide => 24_000,
            },
            final_range: 0,
        })
    }

    /// Range value after the last encode, for bitstream parity validation
    pub fn final_range(&self) -> u32 {
        self.final_range
    }

    /// Expected number of lost packets per hundred, used by the LTP scaling
    /// decision
    pub fn set_packet_loss(&mut self, pct: i32) {
        self.packet_loss_pct = pct.clamp(0, 100);
    }

    /// Target rate in bits per second for the rate-control loop
    pub fn set_bitrate(&mut self, bps: i32) {
        self.target_rate_bps = bps.clamp(5_000, 80_000);
    }

    /// Announce the bandwidth the outer layer intends to switch to. A
    /// narrower target starts a smooth low-pass ramp on the input so the
    /// eventual switch is not an audible step; the configured bandwidth
    /// itself cancels any ramp in progress.
    pub fn set_target_bandwidth(&mut self, target: Bandwidth) {
        if target.fs_khz() < self.fs_khz {
            self.lp.start_transition(true);
        } else if self.lp.mode != 0 {
            self.lp.start_transition(false);
        }
    }

    /// Reset all encoding state, keeping the configuration
    pub fn reset(&mut self) {
        let bandwidth = self.bandwidth;
        let target = self.target_rate_bps;
        let loss = self.packet_loss_pct;
        *self = Encoder::new(bandwidth).expect("configuration was valid");
        self.target_rate_bps = target;
        self.packet_loss_pct = loss;
    }

    /// Encode one packet of native-rate samples (10, 20, 40 or 60 ms)
    /// into a SILK payload
    pub fn encode(&mut self, pcm: &[f32], vad_flag: bool) -> Result<Vec<u8>> {
        let duration = self.duration_for_len(pcm.len())?;
        let frames = duration.frames_per_packet();
        self.nb_subfr = duration.subframes_per_frame();
        let frame_native = self.fs_khz * duration.ms() / frames;

        let mut range_enc = RangeEncoder::new();
        reserve_header_bits(&mut range_enc, (frames + 1) as u32);

        let mut vad_flags = [false; 3];
        for (i, flags) in vad_flags.iter_mut().enumerate().take(frames) {
            let frame = &pcm[i * frame_native..(i + 1) * frame_native];
            let x16 = to_i16(frame);
            let cond = if i == 0 {
                ConditionalCoding::Independently
            } else {
                ConditionalCoding::Conditionally
            };
            *flags = self.encode_frame(&mut range_enc, &x16, vad_flag, None, cond)?;
        }

        // Patch VAD flags and the (always clear) LBRR flag
        let mut flags = 0u32;
        for &v in vad_flags.iter().take(frames) {
            flags = (flags << 1) | v as u32;
        }
        flags <<= 1; // LBRR = 0
        range_enc.patch_initial_bits(flags, (frames + 1) as u32);

        self.final_range = range_enc.range();
        Ok(range_enc.finish())
    }

    fn duration_for_len(&self, len: usize) -> Result<FrameDuration> {
        let ms = len / self.fs_khz;
        if ms * self.fs_khz != len {
            return Err(SilkError::InvalidFrameSize {
                expected: self.frame_length,
                actual: len,
            });
        }
        FrameDuration::from_ms(ms)
    }

    /// Encode one 20 ms (or 10 ms) frame; returns the VAD flag that goes in
    /// the header. `forced_vad` pins the header flag (used for the side
    /// channel, whose activity the stereo layer decides before the frame is
    /// coded); otherwise the internal VAD decides.
    fn encode_frame(
        &mut self,
        range_enc: &mut RangeEncoder,
        x16: &[i16],
        vad_hint: bool,
        forced_vad: Option<bool>,
        cond_coding: ConditionalCoding,
    ) -> Result<bool> {
        let frame_length = x16.len();
        debug_assert_eq!(frame_length, self.subfr_length * self.nb_subfr);

        // Variable-cutoff low pass during bandwidth transitions
        let mut x_in = [0i16; MAX_FRAME_LENGTH];
        x_in[..frame_length].copy_from_slice(x16);
        self.lp.process(&mut x_in[..frame_length]);
        let x16 = &x_in[..frame_length];

        // Slide the analysis buffer and append the new frame
        let keep = self.ltp_mem_length;
        self.x_buf.copy_within(frame_length..keep + frame_length, 0);
        self.x_buf[keep..keep + frame_length].copy_from_slice(x16);

        // Classification
        let vad_res = self.vad.process(x16, self.nb_subfr);
        let active = match forced_vad {
            Some(v) => v,
            None => vad_hint && vad_res.active,
        };
        let vad_flag = active;

        let pitch_res = pitch::pitch_analysis(
            &self.x_buf[..keep + frame_length],
            self.fs_khz,
            self.nb_subfr,
            frame_length,
        );
        let mut threshold = VOICED_THRESHOLD - VOICED_THRESHOLD_TILT * vad_res.tilt.max(0.0);
        if self.prev_signal_type == SignalType::Voiced {
            threshold -= VOICED_THRESHOLD_HYSTERESIS;
        }
        let voiced = active && pitch_res.ltp_corr > threshold;

        self.indices.signal_type = if !active {
            SignalType::Inactive
        } else if voiced {
            SignalType::Voiced
        } else {
            SignalType::Unvoiced
        };
        self.indices.quant_offset_type = if voiced || vad_res.speech_activity_q8 > 180 {
            QuantizationOffsetType::Low
        } else {
            QuantizationOffsetType::High
        };
        self.indices.seed = (self.frame_counter & 3) as i8;
        self.frame_counter += 1;

        if voiced {
            self.indices.lag_index = pitch_res.lag_index;
            self.indices.contour_index = pitch_res.contour_index;
        }

        // Short-term prediction analysis on the frame plus a little history
        let analysis_start = keep - self.subfr_length.min(keep);
        let mut x_flt = vec![0f32; keep + frame_length - analysis_start];
        burg::to_float(&self.x_buf[analysis_start..keep + frame_length], &mut x_flt);
        let (mut a_flt, mut inv_gain) = burg::burg(&x_flt, self.lpc_order);
        let min_inv_gain = if self.first_frame_after_reset {
            1.0 / MAX_PREDICTION_POWER_GAIN_AFTER_RESET
        } else {
            let coding_quality = (vad_res.speech_activity_q8 as f32 / 256.0).clamp(0.0, 1.0);
            (1.0 + (1.0 - coding_quality) * 3.0) / MAX_PREDICTION_POWER_GAIN
        };
        burg::limit_coefs(&mut a_flt[..self.lpc_order], &mut inv_gain, min_inv_gain);

        let mut nlsf_q15 = [0i16; MAX_LPC_ORDER];
        burg::float_a_to_nlsf(&mut nlsf_q15[..self.lpc_order], &a_flt[..self.lpc_order]);
        let cb = crate::tables::nlsf::codebook_for_order(self.lpc_order);
        nlsf_stabilize(&mut nlsf_q15[..self.lpc_order], cb.delta_min_q15);

        // Interpolation factor against the previous frame's quantized NLSFs
        self.indices.nlsf_interp_coef_q2 = if self.nb_subfr == MAX_NB_SUBFR
            && !self.first_frame_after_reset
        {
            burg::find_interp_factor(
                &self.x_buf[keep..keep + frame_length / 2],
                &self.prev_nlsf_q15[..self.lpc_order],
                &nlsf_q15[..self.lpc_order],
            )
        } else {
            4
        };

        // NLSF quantization
        let mut w_q2 = [0i16; MAX_LPC_ORDER];
        vq_weights_laroia(&mut w_q2[..self.lpc_order], &nlsf_q15[..self.lpc_order]);
        let mu_q20 = 1 << 15; // rate/distortion exchange rate for NLSFs
        nlsf_quant::nlsf_encode(
            &mut self.indices.nlsf_indices,
            &mut nlsf_q15[..self.lpc_order],
            cb,
            &w_q2[..self.lpc_order],
            mu_q20,
            self.indices.signal_type.index() >> 1,
        );

        // Prediction coefficients the decoder will reconstruct
        let mut pred_coef_q12 = [[0i16; MAX_LPC_ORDER]; 2];
        nlsf_to_a(&mut pred_coef_q12[1][..self.lpc_order], &nlsf_q15[..self.lpc_order]);
        if self.indices.nlsf_interp_coef_q2 < 4 {
            let mut nlsf0 = [0i16; MAX_LPC_ORDER];
            nlsf_interpolate(
                &mut nlsf0[..self.lpc_order],
                &self.prev_nlsf_q15[..self.lpc_order],
                &nlsf_q15[..self.lpc_order],
                self.indices.nlsf_interp_coef_q2 as i32,
            );
            nlsf_to_a(&mut pred_coef_q12[0][..self.lpc_order], &nlsf0[..self.lpc_order]);
        } else {
            pred_coef_q12[0] = pred_coef_q12[1];
        }
        self.prev_nlsf_q15[..self.lpc_order].copy_from_slice(&nlsf_q15[..self.lpc_order]);

        // Whitened residual over the whole analysis buffer, for LTP and the
        // gain computation
        let residual = self.whitened_residual(&pred_coef_q12[1][..self.lpc_order]);

        // LTP quantization
        let mut ltp_coef_q14 = [0i16; MAX_NB_SUBFR * crate::types::LTP_ORDER];
        let mut ltp_scale_q14 = LTP_SCALES_TABLE_Q14[0] as i32;
        if voiced {
            let sub_starts: Vec<usize> = (0..self.nb_subfr)
                .map(|k| keep + k * self.subfr_length)
                .collect();
            let ltp = ltp_quant::quantize_ltp(
                &residual,
                &sub_starts,
                self.subfr_length,
                &pitch_res.pitch_lags[..self.nb_subfr],
                16,
            );
            self.indices.per_index = ltp.per_index;
            self.indices.ltp_index = ltp.ltp_index;
            ltp_coef_q14 = ltp.b_q14;
            self.indices.ltp_scale_index =
                if cond_coding == ConditionalCoding::Independently {
                    ltp_quant::ltp_scale_index(self.packet_loss_pct, 1, ltp.pred_gain_q7)
                } else {
                    0
                };
            ltp_scale_q14 = LTP_SCALES_TABLE_Q14[self.indices.ltp_scale_index as usize] as i32;
        }

        // Noise shaping parameters
        let mut frame_flt = vec![0f32; frame_length];
        burg::to_float(&self.x_buf[keep..keep + frame_length], &mut frame_flt);
        let shape = noise_shape::noise_shape_analysis(
            &mut self.shape_state,
            &frame_flt,
            self.indices.signal_type,
            vad_res.speech_activity_q8,
            pitch_res.ltp_corr,
            &pitch_res.pitch_lags,
            self.fs_khz,
            self.nb_subfr,
            self.indices.quant_offset_type == QuantizationOffsetType::High,
        );

        // Unquantized subframe gains from the residual level
        let mut gains_base = [0f32; MAX_NB_SUBFR];
        for k in 0..self.nb_subfr {
            let start = keep + k * self.subfr_length;
            let energy: f32 = residual[start..start + self.subfr_length]
                .iter()
                .map(|&v| v * v)
                .sum();
            let mut rms = (energy / self.subfr_length as f32).sqrt();
            if voiced {
                // LTP removes a large share of the periodic residual
                rms *= (1.0 - 0.5 * pitch_res.ltp_corr).max(0.3);
            }
            gains_base[k] = rms.max(1.0) * 1.6;
        }

        // Rate loop: quantize gains, run the NSQ, trial-encode; scale the
        // gains up when over budget
        let budget_bits = (self.target_rate_bps as i64 * frame_length as i64
            / (self.fs_khz as i64 * 1000)) as u32;
        let mut gain_mult = 1.0f32;
        let mut pulses = [0i8; MAX_FRAME_LENGTH];
        let cfg = NsqConfig {
            nb_subfr: self.nb_subfr,
            subfr_length: self.subfr_length,
            frame_length,
            ltp_mem_length: self.ltp_mem_length,
            lpc_order: self.lpc_order,
        };

        for iteration in 0..MAX_RATE_LOOPS {
            // Snapshot everything the trial mutates
            let saved_enc = range_enc.clone();
            let saved_nsq = self.nsq_state.clone();
            let saved_gain_index = self.prev_gain_index;
            let saved_ec_type = self.ec_prev_signal_type;
            let saved_ec_lag = self.ec_prev_lag_index;
            let saved_indices = self.indices.clone();
            let tell_before = range_enc.tell();

            let mut gains_q16 = [0i32; MAX_NB_SUBFR];
            for k in 0..self.nb_subfr {
                let g = (gains_base[k] * gain_mult).min(32_767.0);
                gains_q16[k] = ((g * 65_536.0) as i64).clamp(1 << 16, i32::MAX as i64) as i32;
            }
            gains_quant(
                &mut self.indices.gains_indices[..self.nb_subfr],
                &mut gains_q16[..self.nb_subfr],
                &mut self.prev_gain_index,
                cond_coding == ConditionalCoding::Conditionally,
            );

            nsq::nsq(
                &cfg,
                &mut self.nsq_state,
                &mut self.indices,
                &self.x_buf[keep..keep + frame_length],
                &mut pulses[..frame_length],
                &pred_coef_q12,
                &ltp_coef_q14,
                &shape,
                &gains_q16[..self.nb_subfr],
                &pitch_res.pitch_lags,
                ltp_scale_q14,
            );

            indices::encode_indices(self, range_enc, vad_flag, cond_coding);
            pulses::encode_pulses(
                range_enc,
                self.indices.signal_type,
                self.indices.quant_offset_type,
                &mut pulses[..frame_length],
            );

            let bits_used = range_enc.tell() - tell_before;
            if bits_used <= budget_bits || iteration == MAX_RATE_LOOPS - 1 {
                self.sum_log_gain_q7 = gains_q16[..self.nb_subfr]
                    .iter()
                    .map(|&g| lin2log(g))
                    .sum();
                break;
            }

            // Over budget: restore and coarsen the quantization
            *range_enc = saved_enc;
            self.nsq_state = saved_nsq;
            self.prev_gain_index = saved_gain_index;
            self.ec_prev_signal_type = saved_ec_type;
            self.ec_prev_lag_index = saved_ec_lag;
            self.indices = saved_indices;
            gain_mult *= 1.0 + (bits_used as f32 / budget_bits as f32 - 1.0).clamp(0.125, 1.0);
        }

        self.prev_signal_type = self.indices.signal_type;
        self.first_frame_after_reset = false;
        tracing::trace!(
            signal_type = ?self.indices.signal_type,
            bits = range_enc.tell(),
            sum_log_gain_q7 = self.sum_log_gain_q7,
            "frame encoded"
        );
        Ok(vad_flag)
    }

    fn whitened_residual(&self, a_q12: &[i16]) -> Vec<f32> {
        let len = self.ltp_mem_length + self.frame_length;
        let mut res_i16 = vec![0i16; len];
        crate::common::filters::lpc_analysis_filter(&mut res_i16, &self.x_buf[..len], a_q12);
        res_i16.iter().map(|&v| v as f32).collect()
    }
}

/// Reserve the header bits that are patched in after the frames are coded
fn reserve_header_bits(range_enc: &mut RangeEncoder, nbits: u32) {
    let icdf = [(256 - (256 >> nbits)) as u8, 0u8];
    range_enc.encode_icdf(0, &icdf, 8);
}

fn to_i16(pcm: &[f32]) -> Vec<i16> {
    pcm.iter()
        .map(|&v| (v * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16)
        .collect()
}

/// Encode one stereo packet: mid/side conversion, stereo prediction
/// indices, then the mid frame and (unless mid-only) the side frame
pub fn encode_stereo(
    enc_mid: &mut Encoder,
    enc_side: &mut Encoder,
    left: &[f32],
    right: &[f32],
    bandwidth: Bandwidth,
    vad_flags: [bool; 2],
) -> Result<Vec<u8>> {
    if left.len() != right.len() {
        return Err(SilkError::InvalidFrameSize {
            expected: left.len(),
            actual: right.len(),
        });
    }
    if enc_mid.bandwidth != bandwidth || enc_side.bandwidth != bandwidth {
        return Err(SilkError::InvalidBandwidth(bandwidth.fs_khz() as u32));
    }
    let duration = enc_mid.duration_for_len(left.len())?;
    let frames = duration.frames_per_packet();
    enc_mid.nb_subfr = duration.subframes_per_frame();
    enc_side.nb_subfr = enc_mid.nb_subfr;
    let frame_native = enc_mid.fs_khz * duration.ms() / frames;
    let fs_khz = enc_mid.fs_khz;

    let left_i16 = to_i16(left);
    let right_i16 = to_i16(right);

    let mut range_enc = RangeEncoder::new();
    reserve_header_bits(&mut range_enc, ((frames + 1) * 2) as u32);

    let mut mid_vad = [false; 3];
    let mut side_vad = [false; 3];
    let mut side_coded = [false; 3];

    for i in 0..frames {
        let l = &left_i16[i * frame_native..(i + 1) * frame_native];
        let r = &right_i16[i * frame_native..(i + 1) * frame_native];

        let mut mid = vec![0i16; frame_native + 2];
        let mut side = vec![0i16; frame_native + 2];
        let mut side_residual = vec![0i16; frame_native];
        let ix = stereo::lr_to_ms(
            &mut enc_mid.stereo,
            l,
            r,
            &mut mid,
            &mut side,
            &mut side_residual,
            fs_khz,
        );

        // Mid-only when the side channel is inactive and the packet holds a
        // single frame; multi-frame packets keep conditional coding aligned
        let side_energy: i64 = side_residual.iter().map(|&v| v as i64 * v as i64).sum();
        let side_active = vad_flags[1] && side_energy > frame_native as i64 * 16;
        let mid_only = !side_active && frames == 1;
        side_vad[i] = side_active;
        side_coded[i] = !mid_only;

        stereo::encode_pred(&mut range_enc, &ix);
        if !side_vad[i] {
            stereo::encode_mid_only(&mut range_enc, mid_only);
        }

        let cond_mid = if i == 0 {
            ConditionalCoding::Independently
        } else {
            ConditionalCoding::Conditionally
        };
        mid_vad[i] = enc_mid.encode_frame(
            &mut range_enc,
            &mid[2..2 + frame_native],
            vad_flags[0],
            None,
            cond_mid,
        )?;

        if !mid_only {
            let cond_side = if i > 0 && side_coded[i - 1] {
                ConditionalCoding::Conditionally
            } else if enc_mid.prev_mid_only {
                ConditionalCoding::IndependentlyNoLtpScaling
            } else {
                ConditionalCoding::Independently
            };
            if i == 0 && enc_mid.prev_mid_only {
                // The decoder restarts its side predictors when the side
                // channel resumes; mirror that here
                enc_side.nsq_state = NsqState::default();
                enc_side.prev_gain_index = 10;
                enc_side.prev_signal_type = SignalType::Inactive;
                enc_side.first_frame_after_reset = true;
            }
            enc_side.encode_frame(&mut range_enc, &side_residual, side_active, Some(side_active), cond_side)?;
        }
        enc_mid.prev_mid_only = mid_only;
    }

    // Patch the per-channel VAD and LBRR flags
    let mut flags = 0u32;
    for &v in mid_vad.iter().take(frames) {
        flags = (flags << 1) | v as u32;
    }
    flags <<= 1; // mid LBRR
    for &v in side_vad.iter().take(frames) {
        flags = (flags << 1) | v as u32;
    }
    flags <<= 1; // side LBRR
    range_enc.patch_initial_bits(flags, ((frames + 1) * 2) as u32);

    let range = range_enc.range();
    enc_mid.final_range = range;
    enc_side.final_range = range;
    Ok(range_enc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_rejects_bad_lengths() {
        let mut enc = Encoder::new(Bandwidth::Wide).unwrap();
        let pcm = vec![0f32; 100];
        assert!(enc.encode(&pcm, false).is_err());
    }

    #[test]
    fn test_silence_encodes_small() {
        let mut enc = Encoder::new(Bandwidth::Wide).unwrap();
        let pcm = vec![0f32; 320];
        let payload = enc.encode(&pcm, false).unwrap();
        assert!(!payload.is_empty());
        assert!(payload.len() <= 40, "silence used {} bytes", payload.len());
    }

    #[test]
    fn test_tone_fits_budget_window() {
        let mut enc = Encoder::new(Bandwidth::Wide).unwrap();
        for _ in 0..10 {
            let pcm: Vec<f32> = (0..320)
                .map(|i| 0.4 * (2.0 * std::f32::consts::PI * 400.0 * i as f32 / 16000.0).sin())
                .collect();
            let payload = enc.encode(&pcm, true).unwrap();
            assert!(
                payload.len() >= 10 && payload.len() <= 400,
                "payload size {}",
                payload.len()
            );
        }
    }

    #[test]
    fn test_all_durations_accepted() {
        for &(ms, bw) in &[
            (10usize, Bandwidth::Narrow),
            (20, Bandwidth::Medium),
            (40, Bandwidth::Wide),
            (60, Bandwidth::Wide),
        ] {
            let mut enc = Encoder::new(bw).unwrap();
            let pcm = vec![0f32; bw.fs_khz() * ms];
            let payload = enc.encode(&pcm, false).unwrap();
            assert!(!payload.is_empty(), "{} ms at {:?}", ms, bw);
        }
    }
}
