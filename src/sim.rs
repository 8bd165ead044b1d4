//! Simulated wire for exercising both ends of the link without hardware
//!
//! Time is virtual and measured in nanoseconds. [`SimLine`] records what a
//! [`LineDriver`](crate::driver::LineDriver) puts on the wire into a
//! [`Waveform`]; [`PolledLine`] plays a waveform back to a
//! [`Receiver`](crate::receiver::Receiver) at a chosen poll cadence.
//!
//! Everything here is single-threaded and shares state through `Rc`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use crate::config::LinkConfig;
use crate::core::{Frame, Level};
use crate::driver::LineDriver;
use crate::encoding::ManchesterEncoder;
use crate::error::Result;
use crate::pin::{Clock, LinePin};

/// Shared virtual clock
#[derive(Debug, Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    /// Create a clock at t=0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> u64 {
        self.0.get()
    }

    /// Move time forward
    pub fn advance(&self, ns: u64) {
        self.0.set(self.0.get() + ns);
    }
}

impl Clock for SimClock {
    fn now_ns(&self) -> u64 {
        self.now()
    }
}

/// Line level over time, low before the first transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Waveform {
    transitions: Vec<(u64, bool)>,
}

impl Waveform {
    /// An idle (always low) line
    pub fn new() -> Self {
        Self::default()
    }

    /// Timed half-symbols of one frame at a fixed half-bit period
    pub fn frame_halves(frame: Frame, half_ns: u64) -> Vec<(Level, u64)> {
        ManchesterEncoder::encode_frame(frame)
            .into_iter()
            .map(|level| (level, half_ns))
            .collect()
    }

    /// Level at the end of the recorded history
    pub fn final_level(&self) -> bool {
        self.transitions.last().map_or(false, |&(_, high)| high)
    }

    /// Time of the last level change
    pub fn last_transition_ns(&self) -> u64 {
        self.transitions.last().map_or(0, |&(at, _)| at)
    }

    /// Change the level at time `at`; times must not go backwards
    pub fn set(&mut self, at: u64, high: bool) {
        if self.final_level() == high {
            return;
        }
        if let Some(&(last, _)) = self.transitions.last() {
            if last == at {
                self.transitions.pop();
                if self.final_level() == high {
                    return;
                }
            }
        }
        self.transitions.push((at, high));
    }

    /// Lay out half-symbols back to back from `start`, then return the
    /// line to low. Returns the end time.
    pub fn append_halves(&mut self, start: u64, halves: &[(Level, u64)]) -> u64 {
        let mut at = start;
        for &(level, duration) in halves {
            self.set(at, level.is_high());
            at += duration;
        }
        self.set(at, false);
        at
    }

    /// Level at time `at`
    pub fn level_at(&self, at: u64) -> bool {
        let idx = self.transitions.partition_point(|&(t, _)| t <= at);
        if idx == 0 {
            false
        } else {
            self.transitions[idx - 1].1
        }
    }

    /// Timestamps where the level changes
    pub fn edges(&self) -> impl Iterator<Item = u64> + '_ {
        self.transitions.iter().map(|&(at, _)| at)
    }

    /// Observations a poller would make between `start` and `end`, polling
    /// every `interval_ns` plus whatever `jitter` adds to each poll
    pub fn poll<J>(&self, start: u64, end: u64, interval_ns: u64, mut jitter: J) -> Vec<(u64, bool)>
    where
        J: FnMut() -> u64,
    {
        let mut observations = Vec::new();
        let mut at = start;
        while at < end {
            let t = at + jitter();
            observations.push((t, self.level_at(t)));
            at += interval_ns;
        }
        observations
    }
}

/// Transmit-side simulation: a pin and delay sharing one virtual clock
#[derive(Debug, Clone, Default)]
pub struct SimLine {
    clock: SimClock,
    waveform: Rc<RefCell<Waveform>>,
}

impl SimLine {
    /// Create an idle line at t=0
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin handle that records levels
    pub fn pin(&self) -> SimPin {
        SimPin {
            clock: self.clock.clone(),
            waveform: Rc::clone(&self.waveform),
        }
    }

    /// Delay that advances the virtual clock
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            clock: self.clock.clone(),
        }
    }

    /// The shared clock
    pub fn clock(&self) -> SimClock {
        self.clock.clone()
    }

    /// Snapshot of everything driven so far
    pub fn waveform(&self) -> Waveform {
        self.waveform.borrow().clone()
    }
}

/// [`LinePin`] that writes into a [`SimLine`] waveform
#[derive(Debug, Clone)]
pub struct SimPin {
    clock: SimClock,
    waveform: Rc<RefCell<Waveform>>,
}

impl LinePin for SimPin {
    fn set_high(&mut self) {
        self.waveform.borrow_mut().set(self.clock.now(), true);
    }

    fn set_low(&mut self) {
        self.waveform.borrow_mut().set(self.clock.now(), false);
    }

    fn read_level(&mut self) -> bool {
        self.waveform.borrow().level_at(self.clock.now())
    }
}

/// Delay that moves virtual time instead of blocking
#[derive(Debug, Clone)]
pub struct SimDelay {
    clock: SimClock,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(u64::from(ns));
    }

    fn delay_us(&mut self, us: u32) {
        self.clock.advance(u64::from(us) * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.advance(u64::from(ms) * 1_000_000);
    }
}

/// Run frames through a real [`LineDriver`] on a simulated line
///
/// The line idles for one gap before the first frame so a receiver starts
/// from a quiet wire.
pub fn record_frames(config: &LinkConfig, frames: &[Frame]) -> Result<Waveform> {
    let line = SimLine::new();
    let mut driver = LineDriver::new(line.pin(), line.delay(), config)?;
    driver.idle();
    for &frame in frames {
        driver.send(frame);
    }
    Ok(line.waveform())
}

/// Receive-side simulation: reading the level advances virtual time by
/// one poll interval
pub struct PolledLine {
    waveform: Waveform,
    clock: SimClock,
    interval_ns: u64,
    jitter: Box<dyn FnMut() -> u64>,
}

impl PolledLine {
    /// Poll `waveform` every `interval_ns` starting at t=0
    pub fn new(waveform: Waveform, interval_ns: u64) -> Self {
        PolledLine {
            waveform,
            clock: SimClock::new(),
            interval_ns,
            jitter: Box::new(|| 0),
        }
    }

    /// Add a per-poll delay on top of the interval
    pub fn with_jitter(mut self, jitter: impl FnMut() -> u64 + 'static) -> Self {
        self.jitter = Box::new(jitter);
        self
    }

    /// Shift the first poll
    pub fn with_phase(self, phase_ns: u64) -> Self {
        self.clock.advance(phase_ns);
        self
    }

    /// The clock a receiver should timestamp with
    pub fn clock(&self) -> SimClock {
        self.clock.clone()
    }
}

impl std::fmt::Debug for PolledLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolledLine")
            .field("now", &self.clock.now())
            .field("interval_ns", &self.interval_ns)
            .finish()
    }
}

impl LinePin for PolledLine {
    /// Receive-only; ignored
    fn set_high(&mut self) {}

    /// Receive-only; ignored
    fn set_low(&mut self) {}

    fn read_level(&mut self) -> bool {
        let level = self.waveform.level_at(self.clock.now());
        let step = self.interval_ns + (self.jitter)();
        self.clock.advance(step);
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_levels() {
        let mut waveform = Waveform::new();
        let end = waveform.append_halves(100, &[(Level::High, 10), (Level::Low, 10), (Level::High, 5)]);
        assert_eq!(end, 125);
        assert!(!waveform.level_at(99));
        assert!(waveform.level_at(100));
        assert!(!waveform.level_at(110));
        assert!(waveform.level_at(124));
        assert!(!waveform.level_at(125));
        assert_eq!(waveform.edges().collect::<Vec<_>>(), vec![100, 110, 120, 125]);
    }

    #[test]
    fn test_waveform_merges_equal_levels() {
        let mut waveform = Waveform::new();
        waveform.append_halves(0, &[(Level::Low, 10), (Level::High, 10), (Level::High, 10)]);
        assert_eq!(waveform.edges().collect::<Vec<_>>(), vec![10, 30]);
    }

    #[test]
    fn test_poll_with_jitter() {
        let mut waveform = Waveform::new();
        waveform.append_halves(10, &[(Level::High, 10)]);
        let observations = waveform.poll(0, 30, 5, || 1);
        assert_eq!(observations.len(), 6);
        assert_eq!(observations[2], (11, true));
        assert_eq!(observations[4], (21, false));
    }

    #[test]
    fn test_record_frames_starts_with_quiet_line() -> Result<()> {
        let config = LinkConfig::default();
        let waveform = record_frames(&config, &[Frame::from_raw(0xB400)])?;
        let first_edge = waveform.edges().next();
        assert_eq!(first_edge, Some(100_000_000));
        Ok(())
    }

    #[test]
    fn test_polled_line_advances_clock() {
        let mut waveform = Waveform::new();
        waveform.append_halves(0, &[(Level::High, 100)]);
        let mut line = PolledLine::new(waveform, 60).with_phase(10);
        let clock = line.clock();
        assert!(line.read_level());
        assert_eq!(clock.now(), 70);
        assert!(line.read_level());
        assert!(!line.read_level());
    }
}
