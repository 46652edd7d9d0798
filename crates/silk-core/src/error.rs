//! Error handling for the SILK codec
//!
//! All failures are surfaced to the caller; nothing is retried inside the
//! core. A failed decode leaves the channel state in a shape where `reset()`
//! followed by normal decoding produces correct audio.

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, SilkError>;

/// Error type for SILK encode/decode operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SilkError {
    /// Bandwidth outside {NB, MB, WB}
    #[error("Invalid bandwidth: {0} kHz internal rate is not one of 8/12/16")]
    InvalidBandwidth(u32),

    /// Frame duration not in {10, 20, 40, 60} ms
    #[error("Invalid frame duration: {0} ms (supported: 10, 20, 40, 60)")]
    InvalidDuration(u32),

    /// Invalid channel count
    #[error("Invalid channel count: {channels} (supported: 1, 2)")]
    InvalidChannelCount {
        /// The channel count that was requested
        channels: usize,
    },

    /// Frame size does not match the configured bandwidth and duration
    #[error("Invalid frame size: expected {expected} samples, got {actual}")]
    InvalidFrameSize {
        /// Sample count the configuration requires
        expected: usize,
        /// Sample count that was supplied
        actual: usize,
    },

    /// Truncated or malformed packet bytes
    #[error("Invalid packet: {reason}")]
    InvalidPacket {
        /// What made the payload unusable
        reason: &'static str,
    },

    /// Internal inconsistency detected during decode
    #[error("Decode failed: {reason}")]
    DecodeFailed {
        /// What went wrong
        reason: &'static str,
    },
}

impl SilkError {
    /// Create a new invalid packet error
    pub fn invalid_packet(reason: &'static str) -> Self {
        Self::InvalidPacket { reason }
    }

    /// Create a new decode failure error
    pub fn decode_failed(reason: &'static str) -> Self {
        Self::DecodeFailed { reason }
    }

    /// Whether normal operation may continue on the same instance after a
    /// `reset()`, as opposed to a configuration error the caller must fix.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidBandwidth(_)
            | Self::InvalidDuration(_)
            | Self::InvalidChannelCount { .. } => false,
            Self::InvalidFrameSize { .. }
            | Self::InvalidPacket { .. }
            | Self::DecodeFailed { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SilkError::InvalidFrameSize {
            expected: 320,
            actual: 160,
        };
        let display = format!("{}", err);
        assert!(display.contains("expected 320"));
        assert!(display.contains("got 160"));
    }

    #[test]
    fn test_error_recoverability() {
        assert!(SilkError::invalid_packet("truncated").is_recoverable());
        assert!(SilkError::decode_failed("range coder underflow").is_recoverable());
        assert!(!SilkError::InvalidBandwidth(44).is_recoverable());
        assert!(!SilkError::InvalidChannelCount { channels: 3 }.is_recoverable());
    }
}
