//! Link timing configuration shared by transmitter and receiver

use crate::error::{LinkError, Result};
use crate::wire;

/// Timing parameters both ends of the link must agree on
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// Duration of one half-symbol in microseconds
    pub half_bit_us: u32,
    /// Low time between frames in microseconds
    pub idle_gap_us: u32,
    /// Accepted half-symbol deviation as a fraction of the half-bit period
    pub tolerance: f32,
    /// How long a receiver waits for a valid frame, in milliseconds
    pub frame_timeout_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            half_bit_us: wire::HALF_BIT_US,
            idle_gap_us: wire::IDLE_GAP_US,
            tolerance: wire::DEFAULT_TOLERANCE,
            frame_timeout_ms: wire::FRAME_TIMEOUT_MS,
        }
    }
}

impl LinkConfig {
    /// Check that the parameters describe a decodable link
    pub fn validate(&self) -> Result<()> {
        if self.half_bit_us == 0 {
            return Err(LinkError::invalid_config("Half-bit period must be non-zero"));
        }
        if !(self.tolerance > 0.0 && self.tolerance < 0.5) {
            return Err(LinkError::invalid_config(format!(
                "Tolerance {} outside (0, 0.5)",
                self.tolerance
            )));
        }
        // The receiver only arms after this much quiet, so the gap must cover it.
        if u64::from(self.idle_gap_us) * 1_000 <= self.quiet_threshold_ns() {
            return Err(LinkError::invalid_config(format!(
                "Idle gap {} us too short for half-bit {} us",
                self.idle_gap_us, self.half_bit_us
            )));
        }
        if self.frame_timeout_ms == 0 {
            return Err(LinkError::invalid_config("Frame timeout must be non-zero"));
        }
        Ok(())
    }

    /// Half-bit period in nanoseconds
    pub fn half_bit_ns(&self) -> u64 {
        u64::from(self.half_bit_us) * 1_000
    }

    /// Bit period in nanoseconds
    pub fn bit_period_ns(&self) -> u64 {
        2 * self.half_bit_ns()
    }

    /// Maximum deviation of one half-symbol in nanoseconds
    pub fn tolerance_ns(&self) -> u64 {
        (self.half_bit_ns() as f64 * f64::from(self.tolerance)) as u64
    }

    /// Low time that cannot occur inside a frame
    ///
    /// The longest in-frame run is two half-symbols (a 1 followed by a 0).
    pub fn quiet_threshold_ns(&self) -> u64 {
        self.bit_period_ns() + 2 * self.tolerance_ns()
    }

    /// Time a whole transmission takes on the wire
    pub fn frame_duration_ns(&self) -> u64 {
        self.bit_period_ns() * wire::FRAME_BITS as u64
    }

    /// Edge recording window for capture decoding, twice the ideal frame
    /// time to absorb clock mismatch
    pub fn record_window_ns(&self) -> u64 {
        2 * self.frame_duration_ns()
    }

    /// Frame timeout in nanoseconds
    pub fn frame_timeout_ns(&self) -> u64 {
        u64::from(self.frame_timeout_ms) * 1_000_000
    }

    /// Load a configuration from JSON, filling missing fields with defaults
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LinkConfig =
            serde_json::from_str(json).map_err(|e| LinkError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`LinkConfig`]
#[derive(Debug, Clone, Default)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    /// Create a new builder with the default wire timing
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the half-bit period
    pub fn with_half_bit_us(mut self, half_bit_us: u32) -> Self {
        self.config.half_bit_us = half_bit_us;
        self
    }

    /// Set the inter-frame idle gap
    pub fn with_idle_gap_us(mut self, idle_gap_us: u32) -> Self {
        self.config.idle_gap_us = idle_gap_us;
        self
    }

    /// Set the jitter tolerance
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Set the frame timeout
    pub fn with_frame_timeout_ms(mut self, frame_timeout_ms: u32) -> Self {
        self.config.frame_timeout_ms = frame_timeout_ms;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<LinkConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
