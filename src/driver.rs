//! Line driver: puts encoded frames on the wire

use embedded_hal::delay::DelayNs;

use crate::config::LinkConfig;
use crate::core::{Frame, Level};
use crate::encoding::ManchesterEncoder;
use crate::error::Result;
use crate::pin::LinePin;

/// Drives Manchester half-symbols onto a [`LinePin`] with busy-wait timing
#[derive(Debug)]
pub struct LineDriver<P, D> {
    pin: P,
    delay: D,
    half_bit_us: u32,
    idle_gap_us: u32,
}

impl<P, D> LineDriver<P, D>
where
    P: LinePin,
    D: DelayNs,
{
    /// Take ownership of the pin and park the line at the idle level
    ///
    /// Fails if `config` does not validate; the pin is left untouched then.
    pub fn new(mut pin: P, delay: D, config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        pin.set_low();
        Ok(LineDriver {
            pin,
            delay,
            half_bit_us: config.half_bit_us,
            idle_gap_us: config.idle_gap_us,
        })
    }

    /// Drive the preamble and 16 data bits, then return the line to low
    pub fn transmit(&mut self, frame: Frame) {
        for level in ManchesterEncoder::encode_frame(frame) {
            match level {
                Level::High => self.pin.set_high(),
                Level::Low => self.pin.set_low(),
            }
            self.delay.delay_us(self.half_bit_us);
        }
        self.pin.set_low();
    }

    /// Hold the line low for the inter-frame gap
    pub fn idle(&mut self) {
        self.pin.set_low();
        self.delay.delay_us(self.idle_gap_us);
    }

    /// One full cycle: transmit the frame, then idle
    pub fn send(&mut self, frame: Frame) {
        self.transmit(frame);
        self.idle();
    }

    /// Release the pin and delay
    pub fn into_parts(self) -> (P, D) {
        (self.pin, self.delay)
    }
}
