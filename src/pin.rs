//! Line access primitives: pin handle, clock and busy-wait delay

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Owned handle to the single telemetry wire
///
/// A transmitter uses the setters, a receiver uses [`read_level`](LinePin::read_level).
/// Register writes are assumed to always succeed.
pub trait LinePin {
    /// Drive the line high
    fn set_high(&mut self);

    /// Drive the line low
    fn set_low(&mut self);

    /// Instantaneous line level, `true` when high
    ///
    /// Non-blocking and unbuffered: each call reflects only the current voltage.
    fn read_level(&mut self) -> bool;
}

/// Monotonic timestamp source in nanoseconds
pub trait Clock {
    /// Nanoseconds since an arbitrary fixed origin
    fn now_ns(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Precise sleep by spinning on [`Instant`]
///
/// Blocks the thread for the full duration and does nothing else. Its accuracy
/// bounds how reliably the far end can decode, since every microsecond of
/// overshoot lands directly in a half-symbol.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl SpinDelay {
    /// Spin until `duration` has elapsed
    pub fn spin(duration: Duration) {
        let start = Instant::now();
        while start.elapsed() < duration {
            std::hint::spin_loop();
        }
    }
}

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        Self::spin(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        Self::spin(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        Self::spin(Duration::from_millis(u64::from(ms)));
    }
}

/// Adapter turning an `embedded-hal` pin into a [`LinePin`]
///
/// HAL errors are logged and otherwise ignored; a failed read reports the idle level.
#[derive(Debug)]
pub struct HalLine<P> {
    pin: P,
}

impl<P> HalLine<P>
where
    P: InputPin + OutputPin,
{
    /// Wrap a pin
    pub fn new(pin: P) -> Self {
        HalLine { pin }
    }

    /// Release the wrapped pin
    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P> LinePin for HalLine<P>
where
    P: InputPin + OutputPin,
{
    fn set_high(&mut self) {
        if let Err(e) = self.pin.set_high() {
            log::warn!("set_high failed: {:?}", e);
        }
    }

    fn set_low(&mut self) {
        if let Err(e) = self.pin.set_low() {
            log::warn!("set_low failed: {:?}", e);
        }
    }

    fn read_level(&mut self) -> bool {
        match self.pin.is_high() {
            Ok(level) => level,
            Err(e) => {
                log::warn!("read failed: {:?}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    #[derive(Debug, Default)]
    struct FakePin {
        high: bool,
    }

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            Ok(())
        }
    }

    impl InputPin for FakePin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.high)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.high)
        }
    }

    #[test]
    fn test_hal_line_adapter() {
        let mut line = HalLine::new(FakePin::default());
        assert!(!line.read_level());
        line.set_high();
        assert!(line.read_level());
        line.set_low();
        assert!(!line.into_inner().high);
    }

    #[test]
    fn test_spin_delay_blocks_at_least_duration() {
        let start = Instant::now();
        SpinDelay.delay_us(200);
        assert!(start.elapsed() >= Duration::from_micros(200));
    }

    #[test]
    fn test_monotonic_clock() {
        let clock = MonotonicClock::new();
        let a = clock.now_ns();
        SpinDelay.delay_us(10);
        assert!(clock.now_ns() > a);
    }
}
