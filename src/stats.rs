//! Receive-side link statistics

use crate::decoder::DecodeOutcome;
use crate::error::DecodeError;

/// Link health as seen by a receiver
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkStats {
    /// Frames that passed the signature gate
    pub valid_frames: u32,
    /// Attempts dropped for bad timing
    pub desync_count: u32,
    /// Attempts dropped because the line went idle mid-frame
    pub premature_idle_count: u32,
    /// Attempts dropped for an invalid Manchester pattern
    pub invalid_symbol_count: u32,
    /// Attempts dropped at the signature gate
    pub signature_mismatch_count: u32,
    /// Waits that ended without any frame
    pub timeout_count: u32,
    /// Capture attempts with an unusable edge list
    pub capture_error_count: u32,
    /// Receiver timestamp of the last valid frame
    pub last_valid_ns: Option<u64>,
}

impl LinkStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a valid frame seen at `t_ns`
    pub fn record_success(&mut self, t_ns: u64) {
        self.valid_frames += 1;
        self.last_valid_ns = Some(t_ns);
    }

    /// Record a dropped attempt
    pub fn record_error(&mut self, err: &DecodeError) {
        let counter = match err {
            DecodeError::TimingDesync(_) => &mut self.desync_count,
            DecodeError::PrematureIdle(_) => &mut self.premature_idle_count,
            DecodeError::InvalidSymbol(_) => &mut self.invalid_symbol_count,
            DecodeError::SignatureMismatch { .. } => &mut self.signature_mismatch_count,
            DecodeError::Timeout(_) => &mut self.timeout_count,
            DecodeError::TooManyEdges(_)
            | DecodeError::TooFewEdges(_)
            | DecodeError::PrematureEnd(_) => &mut self.capture_error_count,
        };
        *counter += 1;
    }

    /// Record a decoder outcome observed at `t_ns`
    pub fn record(&mut self, outcome: &DecodeOutcome, t_ns: u64) {
        match outcome {
            DecodeOutcome::Valid(_) => self.record_success(t_ns),
            DecodeOutcome::Invalid(e) => self.record_error(e),
        }
    }

    /// Frame attempts that were dropped (timeouts excluded)
    pub fn invalid_frames(&self) -> u32 {
        self.desync_count
            + self.premature_idle_count
            + self.invalid_symbol_count
            + self.signature_mismatch_count
            + self.capture_error_count
    }

    /// Fraction of frame attempts that were dropped (0.0 to 1.0)
    pub fn error_rate(&self) -> f32 {
        let total = self.valid_frames + self.invalid_frames();
        if total > 0 {
            self.invalid_frames() as f32 / total as f32
        } else {
            0.0
        }
    }

    /// Whether a valid frame arrived within `window_ns` of `now_ns`
    pub fn is_active(&self, now_ns: u64, window_ns: u64) -> bool {
        match self.last_valid_ns {
            Some(t) => now_ns.saturating_sub(t) < window_ns,
            None => false,
        }
    }
}

impl std::fmt::Display for LinkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "valid={} invalid={} timeouts={} error_rate={:.3}",
            self.valid_frames,
            self.invalid_frames(),
            self.timeout_count,
            self.error_rate()
        )
    }
}
