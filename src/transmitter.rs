//! Microcontroller-side transmit loop

use embedded_hal::delay::DelayNs;

use crate::config::LinkConfig;
use crate::core::{Frame, Sample};
use crate::driver::LineDriver;
use crate::error::Result;
use crate::pin::LinePin;

/// Source of one converter reading per cycle
///
/// Blocks until the conversion completes.
pub trait Sampler {
    /// Take one reading
    fn sample(&mut self) -> u16;
}

impl<F> Sampler for F
where
    F: FnMut() -> u16,
{
    fn sample(&mut self) -> u16 {
        self()
    }
}

/// Sample, frame, encode and drive, forever
#[derive(Debug)]
pub struct Transmitter<S, P, D> {
    sampler: S,
    driver: LineDriver<P, D>,
}

impl<S, P, D> Transmitter<S, P, D>
where
    S: Sampler,
    P: LinePin,
    D: DelayNs,
{
    /// Create a transmitter; the line is parked low immediately
    pub fn new(sampler: S, pin: P, delay: D, config: &LinkConfig) -> Result<Self> {
        Ok(Transmitter {
            sampler,
            driver: LineDriver::new(pin, delay, config)?,
        })
    }

    /// One cycle: read, frame, send, idle
    ///
    /// A reading that would overwrite signature bits is never put on the
    /// wire; the cycle only idles. Returns the frame that was sent.
    pub fn run_cycle(&mut self) -> Option<Frame> {
        let reading = self.sampler.sample();
        match Sample::new(reading) {
            Ok(sample) => {
                let frame = Frame::build(sample);
                self.driver.send(frame);
                Some(frame)
            }
            Err(e) => {
                log::warn!("skipping cycle: {}", e);
                self.driver.idle();
                None
            }
        }
    }

    /// Transmit forever
    pub fn run(&mut self) -> ! {
        loop {
            self.run_cycle();
        }
    }

    /// Release the sampler and driver
    pub fn into_parts(self) -> (S, LineDriver<P, D>) {
        (self.sampler, self.driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimLine;

    #[test]
    fn test_run_cycle_sends_frames() -> Result<()> {
        let config = LinkConfig::default();
        let line = SimLine::new();
        let mut readings = vec![300u16, 7].into_iter();
        let mut tx = Transmitter::new(move || readings.next().unwrap_or(0), line.pin(), line.delay(), &config)?;

        assert_eq!(tx.run_cycle(), Some(Frame::from_raw(0xB52C)));
        assert_eq!(tx.run_cycle(), Some(Frame::from_raw(0xB407)));
        assert_eq!(line.clock().now(), 2 * (17_000_000 + 100_000_000));
        Ok(())
    }

    #[test]
    fn test_out_of_range_reading_is_not_sent() -> Result<()> {
        let config = LinkConfig::default();
        let line = SimLine::new();
        let mut tx = Transmitter::new(|| 0x0400u16, line.pin(), line.delay(), &config)?;

        assert_eq!(tx.run_cycle(), None);
        assert_eq!(line.waveform().edges().count(), 0);
        assert_eq!(line.clock().now(), 100_000_000);
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LinkConfig {
            half_bit_us: 0,
            ..LinkConfig::default()
        };
        let line = SimLine::new();
        assert!(Transmitter::new(|| 0u16, line.pin(), line.delay(), &config).is_err());
    }
}
