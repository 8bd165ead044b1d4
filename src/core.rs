//! Core types for the Manchester telemetry link

use bitfield::bitfield;

use crate::error::{DecodeError, LinkError, Result};
use crate::wire;

/// Electrical level of the line during one half-symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    /// Line driven low (also the idle level)
    Low,
    /// Line driven high
    High,
}

impl Level {
    /// Convert a raw pin reading to a level
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Whether this is the high level
    pub fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::High => write!(f, "high"),
        }
    }
}

/// One converter reading (0-1023)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample(u16);

impl Sample {
    /// Maximum sample value
    pub const MAX: u16 = wire::SAMPLE_MAX;

    /// Create a new sample, rejecting any value that would overlap the
    /// signature bits of a frame
    pub fn new(value: u16) -> Result<Self> {
        if value & wire::SIGNATURE_MASK != 0 {
            return Err(LinkError::sample_out_of_range(format!(
                "Sample {} exceeds {} bits (max {})",
                value,
                wire::SAMPLE_BITS,
                Self::MAX
            )));
        }
        Ok(Sample(value))
    }

    /// Get the raw sample value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitfield! {
    /// A 16-bit frame as it travels on the wire
    ///
    /// Format:
    /// - Bits 9-0: sample
    /// - Bits 15-10: signature (`0b101101`)
    ///
    /// The sample and signature are combined with a bitwise OR, so a sample
    /// must never set a signature bit. [`Sample::new`] enforces that.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Frame(u16);
    impl Debug;
    /// Low 10 bits carrying the reading
    pub u16, sample_bits, _: 9, 0;
    /// High 6 bits carrying the signature
    pub u8, signature_bits, _: 15, 10;
}

impl Frame {
    /// Build the frame for a sample
    pub fn build(sample: Sample) -> Self {
        Frame(sample.value() | wire::SIGNATURE)
    }

    /// Wrap an arbitrary 16-bit pattern, e.g. one just received
    pub fn from_raw(raw: u16) -> Self {
        Frame(raw)
    }

    /// Get the raw 16-bit value
    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Check the fixed signature bits
    pub fn has_valid_signature(&self) -> bool {
        self.0 & wire::SIGNATURE_MASK == wire::SIGNATURE
    }

    /// Extract the sample, rejecting frames without the signature
    pub fn sample(&self) -> std::result::Result<Sample, DecodeError> {
        if !self.has_valid_signature() {
            return Err(DecodeError::SignatureMismatch { found: self.0 });
        }
        Ok(Sample(self.0 & !wire::SIGNATURE_MASK))
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({:#06X})", self.0)
    }
}
