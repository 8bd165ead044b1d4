//! # Manchester Telemetry Link
//!
//! A one-way, single-wire link that carries 10-bit converter readings from a
//! microcontroller to a host. Each reading travels as a 16-bit frame:
//!
//! - a fixed `0xB400` signature in the top six bits, the reading in the low ten
//! - one preamble bit (`1`) followed by the 16 data bits, least significant first
//! - Manchester encoded, 500 µs per half-bit (`1` = high-low, `0` = low-high)
//! - at least 100 ms of low idle between frames
//!
//! The host side has no clock line, so the receiver recovers timing from
//! each frame's preamble and tolerates jitter in its own polling loop.
//!
//! ## Features
//!
//! - `serde`: Enable serialization/deserialization support and JSON configs
//!
//! ## Example
//!
//! ```
//! use manchester_link::{Frame, Sample};
//!
//! let frame = Frame::build(Sample::new(300)?);
//! assert_eq!(frame.raw(), 0xB52C);
//! assert_eq!(frame.sample()?.value(), 300);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod decoder;
pub mod driver;
pub mod encoding;
pub mod error;
#[cfg(target_os = "linux")]
pub mod gpio;
pub mod monitor;
pub mod pin;
pub mod receiver;
pub mod sched;
pub mod sim;
pub mod stats;
pub mod transmitter;

pub use capture::CaptureReceiver;
pub use config::{LinkConfig, LinkConfigBuilder};
pub use core::{Frame, Level, Sample};
pub use decoder::{DecodeOutcome, DecoderState, FrameDecoder};
pub use driver::LineDriver;
pub use error::{DecodeError, LinkError, Result};
pub use monitor::{BatteryMonitor, FrameSource, MonitorConfig, VoltageDivider};
pub use pin::{Clock, LinePin, MonotonicClock};
pub use receiver::Receiver;
pub use stats::LinkStats;
pub use transmitter::{Sampler, Transmitter};

/// Wire format and timing constants
pub mod wire {
    /// Half-bit period in microseconds
    pub const HALF_BIT_US: u32 = 500;

    /// Minimum low time between frames in microseconds
    pub const IDLE_GAP_US: u32 = 100_000;

    /// Allowed deviation of a half-bit run, as a fraction of the half-bit
    pub const DEFAULT_TOLERANCE: f32 = 0.25;

    /// How long a receiver waits for a frame before giving up
    pub const FRAME_TIMEOUT_MS: u32 = 1000;

    /// Value of the preamble bit
    pub const PREAMBLE: bool = true;

    /// Number of preamble bits
    pub const PREAMBLE_BITS: usize = 1;

    /// Data bits per frame
    pub const DATA_BITS: usize = 16;

    /// Bits on the wire per frame, preamble included
    pub const FRAME_BITS: usize = PREAMBLE_BITS + DATA_BITS;

    /// Manchester uses 2 half-symbols per bit
    pub const HALF_SYMBOLS: usize = FRAME_BITS * 2;

    /// Fixed pattern in the high bits of every frame
    pub const SIGNATURE: u16 = 0xB400;

    /// Bits covered by the signature
    pub const SIGNATURE_MASK: u16 = 0xFC00;

    /// Width of a converter reading
    pub const SAMPLE_BITS: u32 = 10;

    /// Largest converter reading
    pub const SAMPLE_MAX: u16 = (1 << SAMPLE_BITS) - 1;
}

#[cfg(test)]
mod tests {
    use super::wire;

    #[test]
    fn test_wire_constants_agree() {
        assert_eq!(wire::HALF_SYMBOLS, 34);
        assert_eq!(wire::SAMPLE_MAX, 1023);
        assert_eq!(wire::SAMPLE_MAX & wire::SIGNATURE_MASK, 0);
        assert_eq!(wire::SIGNATURE & !wire::SIGNATURE_MASK, 0);
    }
}
