//! Core types for the SILK codec
//!
//! Packet-level configuration enums and the structural constants shared
//! across the decode and encode pipelines. All of these are sum types and
//! are matched exhaustively; there are no default fallbacks.

use crate::error::{Result, SilkError};

/// Audio bandwidth, selecting the internal SILK sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bandwidth {
    /// Narrowband, 8 kHz internal sampling
    Narrow,
    /// Mediumband, 12 kHz internal sampling
    Medium,
    /// Wideband, 16 kHz internal sampling
    Wide,
}

impl Bandwidth {
    /// Internal sample rate in kHz (8, 12 or 16)
    pub fn fs_khz(self) -> usize {
        match self {
            Self::Narrow => 8,
            Self::Medium => 12,
            Self::Wide => 16,
        }
    }

    /// Internal sample rate in Hz
    pub fn fs_hz(self) -> u32 {
        self.fs_khz() as u32 * 1000
    }

    /// Short-term predictor order (10 for NB/MB, 16 for WB)
    pub fn lpc_order(self) -> usize {
        match self {
            Self::Narrow | Self::Medium => 10,
            Self::Wide => 16,
        }
    }

    /// Subframe length in samples (5 ms at the internal rate)
    pub fn subframe_length(self) -> usize {
        SUB_FRAME_LENGTH_MS * self.fs_khz()
    }

    /// 20 ms frame length in samples at the internal rate
    pub fn frame_length(self) -> usize {
        FRAME_LENGTH_MS * self.fs_khz()
    }

    /// LTP memory in samples (20 ms at the internal rate)
    pub fn ltp_mem_length(self) -> usize {
        LTP_MEM_LENGTH_MS * self.fs_khz()
    }

    /// Minimum pitch lag in samples (2 ms)
    pub fn pitch_lag_min(self) -> i32 {
        (PE_MIN_LAG_MS * self.fs_khz()) as i32
    }

    /// Maximum pitch lag in samples (18 ms)
    pub fn pitch_lag_max(self) -> i32 {
        (PE_MAX_LAG_MS * self.fs_khz()) as i32
    }

    /// Upsampling factor to 48 kHz
    pub fn upsample_ratio(self) -> usize {
        48 / self.fs_khz()
    }

    /// Map an internal rate in kHz back to a bandwidth tag
    pub fn from_fs_khz(fs_khz: usize) -> Result<Self> {
        match fs_khz {
            8 => Ok(Self::Narrow),
            12 => Ok(Self::Medium),
            16 => Ok(Self::Wide),
            other => Err(SilkError::InvalidBandwidth(other as u32)),
        }
    }
}

/// SILK payload duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDuration {
    /// 10 ms: one frame of two subframes
    Ms10,
    /// 20 ms: one frame of four subframes
    Ms20,
    /// 40 ms: two 20 ms frames
    Ms40,
    /// 60 ms: three 20 ms frames
    Ms60,
}

impl FrameDuration {
    /// Number of 20 ms SILK frames in the payload (10 ms packets carry a
    /// single shortened frame)
    pub fn frames_per_packet(self) -> usize {
        match self {
            Self::Ms10 | Self::Ms20 => 1,
            Self::Ms40 => 2,
            Self::Ms60 => 3,
        }
    }

    /// Subframes per SILK frame (2 for 10 ms, else 4)
    pub fn subframes_per_frame(self) -> usize {
        match self {
            Self::Ms10 => 2,
            Self::Ms20 | Self::Ms40 | Self::Ms60 => MAX_NB_SUBFR,
        }
    }

    /// Duration in milliseconds
    pub fn ms(self) -> usize {
        match self {
            Self::Ms10 => 10,
            Self::Ms20 => 20,
            Self::Ms40 => 40,
            Self::Ms60 => 60,
        }
    }

    /// Map a duration in milliseconds to a tag
    pub fn from_ms(ms: usize) -> Result<Self> {
        match ms {
            10 => Ok(Self::Ms10),
            20 => Ok(Self::Ms20),
            40 => Ok(Self::Ms40),
            60 => Ok(Self::Ms60),
            other => Err(SilkError::InvalidDuration(other as u32)),
        }
    }

    /// Infer the duration tag from a 48 kHz frame size
    pub fn from_frame_size_48k(frame_size: usize) -> Result<Self> {
        match frame_size {
            480 => Ok(Self::Ms10),
            960 => Ok(Self::Ms20),
            1920 => Ok(Self::Ms40),
            2880 => Ok(Self::Ms60),
            other => Err(SilkError::InvalidDuration((other / 48) as u32)),
        }
    }
}

/// Per-frame signal classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub enum SignalType {
    /// No speech activity
    Inactive,
    /// Active but not periodic
    Unvoiced,
    /// Periodic speech; LTP is active
    Voiced,
}

impl SignalType {
    /// Index used by the frame-type and rate-level tables (0..=2)
    pub fn index(self) -> usize {
        match self {
            Self::Inactive => 0,
            Self::Unvoiced => 1,
            Self::Voiced => 2,
        }
    }

    /// Inverse of [`SignalType::index`]
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Inactive,
            1 => Self::Unvoiced,
            _ => Self::Voiced,
        }
    }

    /// Whether LTP synthesis runs for this frame
    pub fn is_voiced(self) -> bool {
        self == Self::Voiced
    }
}

/// Excitation quantization offset selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationOffsetType {
    /// Low offset
    Low,
    /// High offset
    High,
}

impl QuantizationOffsetType {
    /// Table index (0 or 1)
    pub fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }

    /// Inverse of [`QuantizationOffsetType::index`]
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            Self::Low
        } else {
            Self::High
        }
    }
}

/// How a frame's parameters relate to the previous frame's
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalCoding {
    /// Self-contained frame
    Independently,
    /// Self-contained, but without LTP scaling (first side-channel frame
    /// after stereo activation)
    IndependentlyNoLtpScaling,
    /// Delta-coded against the previous frame
    Conditionally,
}

/// Subframe duration in milliseconds
pub const SUB_FRAME_LENGTH_MS: usize = 5;
/// SILK frame duration in milliseconds
pub const FRAME_LENGTH_MS: usize = 20;
/// LTP history kept per channel, in milliseconds
pub const LTP_MEM_LENGTH_MS: usize = 20;
/// Maximum internal rate in kHz
pub const MAX_FS_KHZ: usize = 16;
/// Maximum subframes per frame
pub const MAX_NB_SUBFR: usize = 4;
/// Maximum 20 ms frame length in samples
pub const MAX_FRAME_LENGTH: usize = FRAME_LENGTH_MS * MAX_FS_KHZ;
/// Maximum subframe length in samples
pub const MAX_SUB_FRAME_LENGTH: usize = SUB_FRAME_LENGTH_MS * MAX_FS_KHZ;
/// Maximum LTP memory in samples
pub const MAX_LTP_MEM_LENGTH: usize = LTP_MEM_LENGTH_MS * MAX_FS_KHZ;

/// Maximum short-term predictor order
pub const MAX_LPC_ORDER: usize = 16;
/// Minimum short-term predictor order
pub const MIN_LPC_ORDER: usize = 10;
/// Long-term predictor taps
pub const LTP_ORDER: usize = 5;

/// Minimum pitch lag in milliseconds
pub const PE_MIN_LAG_MS: usize = 2;
/// Maximum pitch lag in milliseconds
pub const PE_MAX_LAG_MS: usize = 18;

/// Shell coding block size in samples
pub const SHELL_CODEC_FRAME_LENGTH: usize = 16;
/// log2 of [`SHELL_CODEC_FRAME_LENGTH`]
pub const LOG2_SHELL_CODEC_FRAME_LENGTH: usize = 4;
/// Maximum pulses per shell block before LSB shifting
pub const MAX_PULSES: usize = 16;
/// Number of excitation rate levels
pub const N_RATE_LEVELS: usize = 10;

/// Gain quantization levels
pub const N_LEVELS_QGAIN: i32 = 64;
/// Largest negative gain delta index
pub const MIN_DELTA_GAIN_QUANT: i32 = -4;
/// Largest positive gain delta index
pub const MAX_DELTA_GAIN_QUANT: i32 = 36;

/// Largest stage-2 NLSF residual coded without the extension symbol
pub const NLSF_QUANT_MAX_AMPLITUDE: i32 = 4;
/// Largest stage-2 NLSF residual reachable with the extension symbol
pub const NLSF_QUANT_MAX_AMPLITUDE_EXT: i32 = 10;
/// Stage-1 survivors kept in the NLSF codebook search
pub const MAX_NLSF_MSVQ_SURVIVORS: usize = 16;

/// Delayed-decision NSQ lookahead in samples
pub const DECISION_DELAY: usize = 32;
/// Maximum delayed-decision survivor states
pub const MAX_DEL_DEC_STATES: usize = 4;
/// Maximum noise-shaping filter order
pub const MAX_SHAPE_LPC_ORDER: usize = 24;

/// Stereo predictor quantization sub-steps
pub const STEREO_QUANT_SUB_STEPS: i32 = 5;
/// Stereo predictor/width interpolation span in milliseconds
pub const STEREO_INTERP_LEN_MS: usize = 8;

/// Maximum prediction power gain admitted by the LPC limiter
pub const MAX_PREDICTION_POWER_GAIN: f32 = 1e4;
/// Stricter limit used on the first frame after a reset
pub const MAX_PREDICTION_POWER_GAIN_AFTER_RESET: f32 = 1e2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandwidth_accessors() {
        assert_eq!(Bandwidth::Narrow.fs_khz(), 8);
        assert_eq!(Bandwidth::Medium.fs_khz(), 12);
        assert_eq!(Bandwidth::Wide.fs_khz(), 16);
        assert_eq!(Bandwidth::Narrow.lpc_order(), 10);
        assert_eq!(Bandwidth::Wide.lpc_order(), 16);
        assert_eq!(Bandwidth::Wide.frame_length(), 320);
        assert_eq!(Bandwidth::Medium.subframe_length(), 60);
        assert_eq!(Bandwidth::Narrow.upsample_ratio(), 6);
    }

    #[test]
    fn test_bandwidth_round_trip() {
        for bw in [Bandwidth::Narrow, Bandwidth::Medium, Bandwidth::Wide] {
            assert_eq!(Bandwidth::from_fs_khz(bw.fs_khz()).unwrap(), bw);
        }
        assert!(Bandwidth::from_fs_khz(44).is_err());
    }

    #[test]
    fn test_duration_layout() {
        assert_eq!(FrameDuration::Ms10.frames_per_packet(), 1);
        assert_eq!(FrameDuration::Ms10.subframes_per_frame(), 2);
        assert_eq!(FrameDuration::Ms60.frames_per_packet(), 3);
        assert_eq!(FrameDuration::Ms60.subframes_per_frame(), 4);
        assert_eq!(
            FrameDuration::from_frame_size_48k(960).unwrap(),
            FrameDuration::Ms20
        );
        assert!(FrameDuration::from_frame_size_48k(961).is_err());
    }

    #[test]
    fn test_signal_type_index_round_trip() {
        for st in [
            SignalType::Inactive,
            SignalType::Unvoiced,
            SignalType::Voiced,
        ] {
            assert_eq!(SignalType::from_index(st.index()), st);
        }
        assert!(SignalType::Voiced.is_voiced());
        assert!(!SignalType::Unvoiced.is_voiced());
    }
}
