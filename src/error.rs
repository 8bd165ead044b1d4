//! Error types for the Manchester telemetry link

use thiserror::Error;

/// Result type for link setup and caller-facing operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors surfaced to the owner of a transmitter or receiver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// The GPIO register window could not be opened or mapped
    #[error("Hardware init failed: {0}")]
    HardwareInit(String),

    /// A reading uses bits reserved for the frame signature
    #[error("Sample out of range: {0}")]
    SampleOutOfRange(String),

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Realtime scheduling could not be entered
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// Gave up collecting frames
    #[error("Too many bad frames ({count}), last error: {last}")]
    TooManyBadFrames {
        /// Number of failed attempts
        count: usize,
        /// The most recent failure
        last: DecodeError,
    },

    /// Configuration document could not be parsed
    #[cfg(feature = "serde")]
    #[error("Config parse error: {0}")]
    ConfigParse(String),
}

impl LinkError {
    /// Create a new HardwareInit error
    pub fn hardware_init(msg: impl Into<String>) -> Self {
        LinkError::HardwareInit(msg.into())
    }

    /// Create a new SampleOutOfRange error
    pub fn sample_out_of_range(msg: impl Into<String>) -> Self {
        LinkError::SampleOutOfRange(msg.into())
    }

    /// Create a new InvalidConfig error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        LinkError::InvalidConfig(msg.into())
    }

    /// Create a new Scheduling error
    pub fn scheduling(msg: impl Into<String>) -> Self {
        LinkError::Scheduling(msg.into())
    }
}

/// Reasons a single frame attempt was dropped
///
/// None of these are fatal. The receiver resynchronizes on the next preamble.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A half-symbol lasted outside the jitter tolerance
    #[error("Timing desync: {0}")]
    TimingDesync(String),

    /// The line went idle before all bits arrived
    #[error("Premature idle: {0}")]
    PrematureIdle(String),

    /// Two half-symbols matched neither bit pattern
    #[error("Invalid Manchester symbol: {0}")]
    InvalidSymbol(String),

    /// The decoded frame does not carry the fixed signature
    #[error("Signature mismatch: frame {found:#06X}")]
    SignatureMismatch {
        /// The complete 16-bit pattern that was received
        found: u16,
    },

    /// Nothing usable arrived in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// More edges than a frame can contain (noise)
    #[error("Too many edges: {0}")]
    TooManyEdges(usize),

    /// Fewer edges than a frame must contain
    #[error("Too few edges: {0}")]
    TooFewEdges(usize),

    /// Ran out of recorded edges while sampling bits
    #[error("Premature end of capture at bit {0}")]
    PrematureEnd(usize),
}

impl DecodeError {
    /// Create a new TimingDesync error
    pub fn timing_desync(msg: impl Into<String>) -> Self {
        DecodeError::TimingDesync(msg.into())
    }

    /// Create a new PrematureIdle error
    pub fn premature_idle(msg: impl Into<String>) -> Self {
        DecodeError::PrematureIdle(msg.into())
    }

    /// Create a new InvalidSymbol error
    pub fn invalid_symbol(msg: impl Into<String>) -> Self {
        DecodeError::InvalidSymbol(msg.into())
    }

    /// Create a new Timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        DecodeError::Timeout(msg.into())
    }
}
