//! SILK decoder
//!
//! Per-packet flow: header flags, optional LBRR frames (parsed to keep the
//! range coder in sync, audio discarded), then per 20 ms frame and channel
//! the side-information indices, shell-coded pulses, parameter
//! reconstruction and synthesis. Stereo packets decode mid before side and
//! unmix with interpolated predictors; output is resampled to 48 kHz.

mod indices;
mod parameters;
mod plc;
mod pulses;
mod synthesis;

pub(crate) use parameters::decode_pitch;
pub(crate) use plc::PlcState;
pub(crate) use pulses::{decode_pulses, shell_blocks};

use crate::error::{Result, SilkError};
use crate::range::{EntropyDecoder, RangeDecoder};
use crate::resampler::Resampler;
use crate::stereo::{self, StereoDecState};
use crate::tables::frame::{LBRR_FLAGS_2_ICDF, LBRR_FLAGS_3_ICDF};
use crate::types::{
    Bandwidth, ConditionalCoding, FrameDuration, QuantizationOffsetType, SignalType, LTP_ORDER,
    MAX_FRAME_LENGTH, MAX_LPC_ORDER, MAX_LTP_MEM_LENGTH, MAX_NB_SUBFR,
};

/// Frames per packet upper bound (60 ms packets)
pub(crate) const MAX_FRAMES_PER_PACKET: usize = 3;

/// Side-information indices of one 20 ms frame
#[derive(Clone)]
pub(crate) struct SideInfoIndices {
    pub gains_indices: [i8; MAX_NB_SUBFR],
    pub ltp_index: [i8; MAX_NB_SUBFR],
    pub nlsf_indices: [i8; MAX_LPC_ORDER + 1],
    pub lag_index: i16,
    pub contour_index: i8,
    pub signal_type: SignalType,
    pub quant_offset_type: QuantizationOffsetType,
    pub nlsf_interp_coef_q2: i8,
    pub per_index: i8,
    pub ltp_scale_index: i8,
    pub seed: i8,
}

impl Default for SideInfoIndices {
    fn default() -> Self {
        SideInfoIndices {
            gains_indices: [0; MAX_NB_SUBFR],
            ltp_index: [0; MAX_NB_SUBFR],
            nlsf_indices: [0; MAX_LPC_ORDER + 1],
            lag_index: 0,
            contour_index: 0,
            signal_type: SignalType::Inactive,
            quant_offset_type: QuantizationOffsetType::Low,
            nlsf_interp_coef_q2: 4,
            per_index: 0,
            ltp_scale_index: 0,
            seed: 0,
        }
    }
}

/// Dequantized parameters of one frame
pub(crate) struct DecoderControl {
    pub pitch_lags: [i32; MAX_NB_SUBFR],
    pub gains_q16: [i32; MAX_NB_SUBFR],
    pub pred_coef_q12: [[i16; MAX_LPC_ORDER]; 2],
    pub ltp_coef_q14: [i16; LTP_ORDER * MAX_NB_SUBFR],
    pub ltp_scale_q14: i32,
}

impl Default for DecoderControl {
    fn default() -> Self {
        DecoderControl {
            pitch_lags: [0; MAX_NB_SUBFR],
            gains_q16: [0; MAX_NB_SUBFR],
            pred_coef_q12: [[0; MAX_LPC_ORDER]; 2],
            ltp_coef_q14: [0; LTP_ORDER * MAX_NB_SUBFR],
            ltp_scale_q14: 0,
        }
    }
}

/// Per-channel decoder state
pub(crate) struct ChannelDecoder {
    pub fs_khz: usize,
    pub nb_subfr: usize,
    pub frame_length: usize,
    pub subfr_length: usize,
    pub ltp_mem_length: usize,
    pub lpc_order: usize,

    pub prev_nlsf_q15: [i16; MAX_LPC_ORDER],
    pub first_frame_after_reset: bool,

    // Header flags of the packet being decoded
    pub vad_flags: [bool; MAX_FRAMES_PER_PACKET],
    pub lbrr_flag: bool,
    pub lbrr_flags: [bool; MAX_FRAMES_PER_PACKET],

    pub out_buf: [i16; MAX_LTP_MEM_LENGTH + MAX_FRAME_LENGTH],
    pub lag_prev: i32,
    pub last_gain_index: i8,
    pub s_lpc_q14_buf: [i32; MAX_LPC_ORDER],
    pub exc_q14: [i32; MAX_FRAME_LENGTH],
    pub prev_gain_q16: i32,
    pub prev_signal_type: SignalType,
    pub ec_prev_signal_type: SignalType,
    pub ec_prev_lag_index: i16,
    pub loss_cnt: i32,

    pub indices: SideInfoIndices,
    pub plc: PlcState,
    pub resampler: Resampler,
}

impl ChannelDecoder {
    fn new() -> Result<Self> {
        let mut d = ChannelDecoder {
            fs_khz: 0,
            nb_subfr: 0,
            frame_length: 0,
            subfr_length: 0,
            ltp_mem_length: 0,
            lpc_order: 0,
            prev_nlsf_q15: [0; MAX_LPC_ORDER],
            first_frame_after_reset: true,
            vad_flags: [false; MAX_FRAMES_PER_PACKET],
            lbrr_flag: false,
            lbrr_flags: [false; MAX_FRAMES_PER_PACKET],
            out_buf: [0; MAX_LTP_MEM_LENGTH + MAX_FRAME_LENGTH],
            lag_prev: 100,
            last_gain_index: 10,
            s_lpc_q14_buf: [0; MAX_LPC_ORDER],
            exc_q14: [0; MAX_FRAME_LENGTH],
            prev_gain_q16: 1 << 16,
            prev_signal_type: SignalType::Inactive,
            ec_prev_signal_type: SignalType::Inactive,
            ec_prev_lag_index: 0,
            loss_cnt: 0,
            indices: SideInfoIndices::default(),
            plc: PlcState::default(),
            resampler: Resampler::new(16_000, 48_000)?,
        };
        d.set_sample_rate(Bandwidth::Wide, FrameDuration::Ms20)?;
        Ok(d)
    }

    /// Configure for a bandwidth and duration; resets decode state when the
    /// internal rate changes
    pub fn set_sample_rate(&mut self, bandwidth: Bandwidth, duration: FrameDuration) -> Result<()> {
        let fs_khz = bandwidth.fs_khz();
        let nb_subfr = duration.subframes_per_frame();
        if self.fs_khz == fs_khz && self.nb_subfr == nb_subfr {
            return Ok(());
        }
        let rate_changed = self.fs_khz != fs_khz;
        self.fs_khz = fs_khz;
        self.nb_subfr = nb_subfr;
        self.subfr_length = bandwidth.subframe_length();
        self.frame_length = self.subfr_length * nb_subfr;
        self.ltp_mem_length = bandwidth.ltp_mem_length();
        self.lpc_order = bandwidth.lpc_order();
        if rate_changed {
            self.resampler = Resampler::new(bandwidth.fs_hz(), 48_000)?;
            self.reset_decode_state();
        }
        Ok(())
    }

    /// Reset everything that tracks past audio
    pub fn reset_decode_state(&mut self) {
        self.out_buf.fill(0);
        self.s_lpc_q14_buf.fill(0);
        self.exc_q14.fill(0);
        self.prev_nlsf_q15.fill(0);
        self.lag_prev = 100;
        self.last_gain_index = 10;
        self.prev_gain_q16 = 1 << 16;
        self.prev_signal_type = SignalType::Inactive;
        self.ec_prev_signal_type = SignalType::Inactive;
        self.ec_prev_lag_index = 0;
        self.loss_cnt = 0;
        self.first_frame_after_reset = true;
        self.plc = PlcState::default();
        self.resampler.reset();
    }

    /// Decode one regular 20 ms frame into `xq`
    fn decode_frame(
        &mut self,
        range_dec: &mut RangeDecoder<'_>,
        xq: &mut [i16],
        frame_index: usize,
        cond_coding: ConditionalCoding,
    ) -> Result<()> {
        let mut ctrl = DecoderControl::default();
        let mut pulses = [0i16; MAX_FRAME_LENGTH];

        indices::decode_indices(self, range_dec, frame_index, false, cond_coding);
        pulses::decode_pulses(
            range_dec,
            &mut pulses[..self.frame_length],
            self.indices.signal_type,
            self.indices.quant_offset_type,
        );
        parameters::decode_parameters(self, range_dec, &mut ctrl, cond_coding);
        synthesis::decode_core(self, &ctrl, xq, &pulses);
        plc::plc_update(self, &ctrl);
        self.loss_cnt = 0;
        self.prev_signal_type = self.indices.signal_type;
        self.first_frame_after_reset = false;

        // Slide the synthesis history and append this frame
        self.out_buf.copy_within(
            self.frame_length..self.ltp_mem_length + self.frame_length,
            0,
        );
        self.out_buf[self.ltp_mem_length..self.ltp_mem_length + self.frame_length]
            .copy_from_slice(&xq[..self.frame_length]);

        plc::plc_glue_frames(self, xq);

        self.lag_prev = ctrl.pitch_lags[self.nb_subfr - 1];

        if range_dec.tell() > range_dec.storage_bits() + 8 {
            return Err(SilkError::decode_failed("payload exhausted mid-frame"));
        }
        Ok(())
    }

    /// Generate one frame of concealment audio
    fn conceal_frame(&mut self, xq: &mut [i16]) {
        let mut ctrl = DecoderControl::default();
        plc::plc_conceal(self, &mut ctrl, xq);
        self.loss_cnt += 1;

        self.out_buf.copy_within(
            self.frame_length..self.ltp_mem_length + self.frame_length,
            0,
        );
        self.out_buf[self.ltp_mem_length..self.ltp_mem_length + self.frame_length]
            .copy_from_slice(&xq[..self.frame_length]);
        plc::plc_glue_frames(self, xq);
    }
}

/// SILK decoder instance (one or two channels)
pub struct Decoder {
    channels: usize,
    channel_state: Vec<ChannelDecoder>,
    stereo_state: StereoDecState,
    prev_decode_only_middle: bool,
    prev_channels_internal: usize,
    final_range: u32,
}

impl Decoder {
    /// Create a decoder for 1 or 2 output channels
    pub fn new(channels: usize) -> Result<Self> {
        if channels == 0 || channels > 2 {
            return Err(SilkError::InvalidChannelCount { channels });
        }
        let mut channel_state = Vec::with_capacity(2);
        for _ in 0..2 {
            channel_state.push(ChannelDecoder::new()?);
        }
        Ok(Decoder {
            channels,
            channel_state,
            stereo_state: StereoDecState::default(),
            prev_decode_only_middle: false,
            prev_channels_internal: channels,
            final_range: 0,
        })
    }

    /// Range value after the last decode, for bitstream parity validation
    pub fn final_range(&self) -> u32 {
        self.final_range
    }

    /// Reset all decoding state, keeping the configuration
    pub fn reset(&mut self) {
        for ch in &mut self.channel_state {
            ch.reset_decode_state();
        }
        self.stereo_state = StereoDecState::default();
        self.prev_decode_only_middle = false;
    }

    /// Decode one SILK payload into 48 kHz output samples (interleaved for
    /// stereo). `frame_size_48k` is the per-channel output length and
    /// selects the packet duration; `vad_hint` is the outer layer's
    /// activity hint and is diagnostic only, the in-stream VAD bits govern.
    pub fn decode(
        &mut self,
        data: &[u8],
        bandwidth: Bandwidth,
        frame_size_48k: usize,
        vad_hint: bool,
    ) -> Result<Vec<f32>> {
        if data.is_empty() {
            return Err(SilkError::invalid_packet("empty payload"));
        }
        let duration = FrameDuration::from_frame_size_48k(frame_size_48k)?;
        let frames = duration.frames_per_packet();
        for ch in 0..self.channels {
            self.channel_state[ch].set_sample_rate(bandwidth, duration)?;
        }
        if self.channels == 2 && self.prev_channels_internal == 1 {
            // Mono to stereo: restart the side predictors but keep the
            // stereo smoother for continuity
            self.stereo_state.pred_prev_q13 = [0; 2];
            self.channel_state[1].reset_decode_state();
        }
        self.prev_channels_internal = self.channels;

        let mut range_dec = RangeDecoder::new(data);

        // Header bits: VAD per frame plus the LBRR flag, per channel
        for ch in 0..self.channels {
            let state = &mut self.channel_state[ch];
            for i in 0..frames {
                state.vad_flags[i] = range_dec.decode_bit(1);
            }
            state.lbrr_flag = range_dec.decode_bit(1);
            state.lbrr_flags = [false; MAX_FRAMES_PER_PACKET];
        }
        if self.channels == 1 && frames >= 1 && !self.channel_state[0].vad_flags[0] && vad_hint {
            tracing::debug!("outer VAD hint active but stream flags frame 0 inactive");
        }

        // LBRR flag expansion
        for ch in 0..self.channels {
            let state = &mut self.channel_state[ch];
            if !state.lbrr_flag {
                continue;
            }
            match frames {
                1 => state.lbrr_flags[0] = true,
                2 => {
                    let sym = range_dec.decode_icdf(&LBRR_FLAGS_2_ICDF, 8) + 1;
                    state.lbrr_flags[0] = sym & 1 != 0;
                    state.lbrr_flags[1] = sym & 2 != 0;
                }
                _ => {
                    let sym = range_dec.decode_icdf(&LBRR_FLAGS_3_ICDF, 8) + 1;
                    state.lbrr_flags[0] = sym & 1 != 0;
                    state.lbrr_flags[1] = sym & 2 != 0;
                    state.lbrr_flags[2] = sym & 4 != 0;
                }
            }
        }

        // Parse LBRR frames so the coder stays in sync; their audio is not
        // used (FEC selection is the caller's concern)
        let mut lbrr_pulses = [0i16; MAX_FRAME_LENGTH];
        for i in 0..frames {
            for ch in 0..self.channels {
                if !self.channel_state[ch].lbrr_flags[i] {
                    continue;
                }
                if ch == 0 && self.channels == 2 {
                    let mut pred = [0i32; 2];
                    stereo::decode_pred(&mut range_dec, &mut pred);
                    if !self.channel_state[1].lbrr_flags[i] {
                        stereo::decode_mid_only(&mut range_dec);
                    }
                }
                let cond = if i > 0 && self.channel_state[ch].lbrr_flags[i - 1] {
                    ConditionalCoding::Conditionally
                } else {
                    ConditionalCoding::Independently
                };
                let state = &mut self.channel_state[ch];
                indices::decode_indices(state, &mut range_dec, i, true, cond);
                let frame_length = state.frame_length;
                pulses::decode_pulses(
                    &mut range_dec,
                    &mut lbrr_pulses[..frame_length],
                    state.indices.signal_type,
                    state.indices.quant_offset_type,
                );
            }
        }

        // Regular frames
        let frame_length = self.channel_state[0].frame_length;
        let fs_khz = self.channel_state[0].fs_khz;
        let mut out = vec![0f32; frame_size_48k * self.channels];
        let mut x_mid = [0i16; MAX_FRAME_LENGTH + 2];
        let mut x_side = [0i16; MAX_FRAME_LENGTH + 2];
        let out_per_frame = frame_size_48k / frames;

        for i in 0..frames {
            let mut pred_q13 = [0i32; 2];
            let mut decode_only_middle = false;
            if self.channels == 2 {
                stereo::decode_pred(&mut range_dec, &mut pred_q13);
                if !self.channel_state[1].vad_flags[i] {
                    decode_only_middle = stereo::decode_mid_only(&mut range_dec);
                }
                if !decode_only_middle && self.prev_decode_only_middle {
                    // Side channel resumes: restart its predictors, keep
                    // the stereo unmix state for continuity
                    let side = &mut self.channel_state[1];
                    side.out_buf.fill(0);
                    side.s_lpc_q14_buf.fill(0);
                    side.lag_prev = 100;
                    side.last_gain_index = 10;
                    side.prev_signal_type = SignalType::Inactive;
                    side.first_frame_after_reset = true;
                }
            }

            // Mid (or mono) channel
            let cond_mid = if i == 0 {
                ConditionalCoding::Independently
            } else {
                ConditionalCoding::Conditionally
            };
            self.channel_state[0].decode_frame(
                &mut range_dec,
                &mut x_mid[2..2 + frame_length],
                i,
                cond_mid,
            )?;

            // Side channel
            if self.channels == 2 {
                if !decode_only_middle {
                    let cond_side = if i > 0 {
                        ConditionalCoding::Conditionally
                    } else if self.prev_decode_only_middle {
                        ConditionalCoding::IndependentlyNoLtpScaling
                    } else {
                        ConditionalCoding::Independently
                    };
                    self.channel_state[1].decode_frame(
                        &mut range_dec,
                        &mut x_side[2..2 + frame_length],
                        i,
                        cond_side,
                    )?;
                } else {
                    x_side[2..2 + frame_length].fill(0);
                }
                self.prev_decode_only_middle = decode_only_middle;
                stereo::ms_to_lr(
                    &mut self.stereo_state,
                    &mut x_mid,
                    &mut x_side,
                    &pred_q13,
                    fs_khz,
                    frame_length,
                );
            } else {
                // Mono: keep the same one-sample delay as the stereo path
                let mut s_mid = self.stereo_state.s_mid;
                x_mid[..2].copy_from_slice(&s_mid);
                s_mid.copy_from_slice(&x_mid[frame_length..frame_length + 2]);
                self.stereo_state.s_mid = s_mid;
            }

            self.resample_and_interleave(&x_mid, &x_side, frame_length, i * out_per_frame, &mut out);
        }

        self.final_range = range_dec.range();
        if range_dec.tell() > range_dec.storage_bits() + 8 {
            return Err(SilkError::invalid_packet("truncated payload"));
        }
        Ok(out)
    }

    /// Produce concealment audio for one lost packet
    pub fn decode_plc(&mut self, bandwidth: Bandwidth, frame_size_48k: usize) -> Result<Vec<f32>> {
        let duration = FrameDuration::from_frame_size_48k(frame_size_48k)?;
        let frames = duration.frames_per_packet();
        for ch in 0..self.channels {
            self.channel_state[ch].set_sample_rate(bandwidth, duration)?;
        }
        let frame_length = self.channel_state[0].frame_length;
        let fs_khz = self.channel_state[0].fs_khz;

        let mut out = vec![0f32; frame_size_48k * self.channels];
        let mut x_mid = [0i16; MAX_FRAME_LENGTH + 2];
        let mut x_side = [0i16; MAX_FRAME_LENGTH + 2];
        let out_per_frame = frame_size_48k / frames;

        for i in 0..frames {
            self.channel_state[0].conceal_frame(&mut x_mid[2..2 + frame_length]);
            if self.channels == 2 {
                if !self.prev_decode_only_middle {
                    self.channel_state[1].conceal_frame(&mut x_side[2..2 + frame_length]);
                } else {
                    x_side[2..2 + frame_length].fill(0);
                }
                let pred_q13 = [
                    self.stereo_state.pred_prev_q13[0] as i32,
                    self.stereo_state.pred_prev_q13[1] as i32,
                ];
                stereo::ms_to_lr(
                    &mut self.stereo_state,
                    &mut x_mid,
                    &mut x_side,
                    &pred_q13,
                    fs_khz,
                    frame_length,
                );
            } else {
                let mut s_mid = self.stereo_state.s_mid;
                x_mid[..2].copy_from_slice(&s_mid);
                s_mid.copy_from_slice(&x_mid[frame_length..frame_length + 2]);
                self.stereo_state.s_mid = s_mid;
            }
            self.resample_and_interleave(&x_mid, &x_side, frame_length, i * out_per_frame, &mut out);
        }
        Ok(out)
    }

    fn resample_and_interleave(
        &mut self,
        x_mid: &[i16],
        x_side: &[i16],
        frame_length: usize,
        out_offset: usize,
        out: &mut [f32],
    ) {
        let ratio = 48_000 / (self.channel_state[0].fs_khz as u32 * 1000);
        let n_out = frame_length * ratio as usize;
        let mut resampled = [0i16; MAX_FRAME_LENGTH * 6];
        for ch in 0..self.channels {
            let src = if ch == 0 { x_mid } else { x_side };
            self.channel_state[ch]
                .resampler
                .process(&src[1..1 + frame_length], &mut resampled[..n_out]);
            for (n, &v) in resampled[..n_out].iter().enumerate() {
                out[(out_offset + n) * self.channels + ch] = v as f32 / 32768.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_decoder_validates_channels() {
        assert!(Decoder::new(1).is_ok());
        assert!(Decoder::new(2).is_ok());
        assert!(Decoder::new(0).is_err());
        assert!(Decoder::new(3).is_err());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut d = Decoder::new(1).unwrap();
        assert!(d.decode(&[], Bandwidth::Wide, 960, false).is_err());
    }

    #[test]
    fn test_decoder_determinism_on_arbitrary_bytes() {
        // Any byte sequence decodes deterministically
        let data: Vec<u8> = (0..60u8).map(|i| i.wrapping_mul(37).wrapping_add(11)).collect();
        let mut d1 = Decoder::new(1).unwrap();
        let mut d2 = Decoder::new(1).unwrap();
        let out1 = d1.decode(&data, Bandwidth::Wide, 960, true);
        let out2 = d2.decode(&data, Bandwidth::Wide, 960, true);
        match (out1, out2) {
            (Ok(a), Ok(b)) => {
                assert_eq!(a, b);
                assert_eq!(d1.final_range(), d2.final_range());
            }
            (Err(a), Err(b)) => assert_eq!(a, b),
            other => panic!("decoders disagreed: {:?}", other.0.map(|v| v.len())),
        }
    }

    #[test]
    fn test_plc_without_history_is_quiet() {
        let mut d = Decoder::new(1).unwrap();
        let out = d.decode_plc(Bandwidth::Wide, 960).unwrap();
        assert_eq!(out.len(), 960);
        assert!(out.iter().all(|v| v.abs() < 0.01));
    }
}
