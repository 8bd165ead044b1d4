//! Clock recovery and framing state machine
//!
//! [`FrameDecoder`] consumes timestamped line observations, as produced by a
//! tight polling loop, and turns them into validated frames. It never sees
//! edges directly: an edge is inferred when an observation differs from the
//! previous one, so its timestamp is late by up to one poll interval. The
//! poll interval therefore has to be small against the half-bit period
//! (eight polls per half-bit is comfortable, two is not).
//!
//! Every frame re-derives its own timing from the preamble:
//!
//! 1. **Idle**: the line must stay low for longer than any in-frame low run
//!    before a rising edge is trusted as a preamble.
//! 2. **Armed / Syncing**: the preamble's high half is timed. If it is within
//!    tolerance of the nominal half-bit, it seeds the locked half-bit estimate.
//! 3. **Receiving**: each run of constant level between two edges is cut into
//!    windows of the locked estimate. A run must cover one or two windows
//!    (Manchester never holds a level longer), each window is one
//!    half-symbol, and consecutive pairs must read high-low (1) or low-high (0).
//!    The estimate is the mean of the nominal half-bit and every half-symbol
//!    received since the preamble rise, so it follows a slow or fast
//!    transmitter while a single quantized or distorted edge moves it by at
//!    most a fraction of its error.
//! 4. After 16 data bits the signature is checked.
//!
//! Any violation drops the whole frame and the machine goes back to idle to
//! wait for the next preamble.

use crate::config::LinkConfig;
use crate::core::{Frame, Level};
use crate::encoding::ManchesterDecoder;
use crate::error::DecodeError;
use crate::wire;

/// Result of one frame attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A frame with a valid signature
    Valid(Frame),
    /// The attempt was dropped
    Invalid(DecodeError),
}

/// Externally visible decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for a quiet line followed by a rising edge
    Idle,
    /// Preamble rising edge seen
    Armed,
    /// Timing the preamble's high half
    Syncing,
    /// Locked; number of data bits completed so far
    Receiving(usize),
}

#[derive(Debug)]
enum State {
    Idle {
        low_since: Option<u64>,
    },
    Armed {
        rise_at: u64,
    },
    Syncing {
        rise_at: u64,
    },
    Receiving {
        rise_at: u64,
        halves: Vec<Level>,
        run_level: Level,
        run_start: u64,
    },
}

/// Manchester frame decoder over polled line levels
#[derive(Debug)]
pub struct FrameDecoder {
    half_ns: u64,
    tolerance_ns: u64,
    quiet_ns: u64,
    state: State,
}

impl FrameDecoder {
    /// Create a decoder for the given link timing
    pub fn new(config: &LinkConfig) -> Self {
        FrameDecoder {
            half_ns: config.half_bit_ns(),
            tolerance_ns: config.tolerance_ns(),
            quiet_ns: config.quiet_threshold_ns(),
            state: State::Idle { low_since: None },
        }
    }

    /// Current state
    pub fn state(&self) -> DecoderState {
        match &self.state {
            State::Idle { .. } => DecoderState::Idle,
            State::Armed { .. } => DecoderState::Armed,
            State::Syncing { .. } => DecoderState::Syncing,
            State::Receiving { halves, .. } => {
                DecoderState::Receiving((halves.len() / 2).saturating_sub(wire::PREAMBLE_BITS))
            }
        }
    }

    /// Forget any partial frame and wait for a fresh quiet period
    pub fn reset(&mut self) {
        self.state = State::Idle { low_since: None };
    }

    /// Feed one observation taken at `t_ns`
    ///
    /// Returns an outcome when a frame attempt ends, either way.
    pub fn observe(&mut self, t_ns: u64, high: bool) -> Option<DecodeOutcome> {
        match self.state {
            State::Idle { low_since } => {
                if !high {
                    if low_since.is_none() {
                        self.state = State::Idle { low_since: Some(t_ns) };
                    }
                    return None;
                }
                match low_since {
                    Some(since) if t_ns.saturating_sub(since) >= self.quiet_ns => {
                        log::trace!("preamble edge at {} ns", t_ns);
                        self.state = State::Armed { rise_at: t_ns };
                    }
                    _ => self.state = State::Idle { low_since: None },
                }
                None
            }
            State::Armed { rise_at } => {
                if high {
                    self.state = State::Syncing { rise_at };
                    None
                } else {
                    self.lock(rise_at, t_ns)
                }
            }
            State::Syncing { rise_at } => {
                if !high {
                    return self.lock(rise_at, t_ns);
                }
                if t_ns - rise_at > self.half_ns + self.tolerance_ns {
                    return self.abort(
                        t_ns,
                        high,
                        DecodeError::timing_desync(format!(
                            "preamble high for {} ns",
                            t_ns - rise_at
                        )),
                    );
                }
                None
            }
            State::Receiving { .. } => self.receive(t_ns, high),
        }
    }

    /// Time the preamble's high half and lock onto it
    fn lock(&mut self, rise_at: u64, fall_at: u64) -> Option<DecodeOutcome> {
        let measured = fall_at - rise_at;
        if measured.abs_diff(self.half_ns) > self.tolerance_ns {
            return self.abort(
                fall_at,
                false,
                DecodeError::timing_desync(format!(
                    "preamble high for {} ns, expected {} ns",
                    measured, self.half_ns
                )),
            );
        }
        log::trace!("preamble high for {} ns, locking", measured);
        let mut halves = Vec::with_capacity(wire::HALF_SYMBOLS);
        halves.push(Level::High);
        self.state = State::Receiving {
            rise_at,
            halves,
            run_level: Level::Low,
            run_start: fall_at,
        };
        None
    }

    fn receive(&mut self, t_ns: u64, high: bool) -> Option<DecodeOutcome> {
        let nominal_ns = self.half_ns;
        let tolerance_ns = self.tolerance_ns;
        let State::Receiving {
            rise_at,
            halves,
            run_level,
            run_start,
        } = &mut self.state
        else {
            return None;
        };
        let half_ns = locked_half_ns(nominal_ns, *run_start - *rise_at, halves.len());
        let level = Level::from_bool(high);
        let elapsed = t_ns - *run_start;

        if level == *run_level {
            // The trailing low of a final 1 bit runs straight into idle.
            if level == Level::Low
                && halves.len() == wire::HALF_SYMBOLS - 1
                && elapsed > half_ns + tolerance_ns
            {
                let low_since = *run_start;
                halves.push(Level::Low);
                let halves = std::mem::take(halves);
                return self.finish(&halves, Some(low_since));
            }
            if elapsed > 2 * half_ns + tolerance_ns {
                let err = if level == Level::Low {
                    DecodeError::premature_idle(format!(
                        "line idle after {} of {} half-symbols",
                        halves.len(),
                        wire::HALF_SYMBOLS
                    ))
                } else {
                    DecodeError::timing_desync(format!("line stuck high for {} ns", elapsed))
                };
                return self.abort(t_ns, high, err);
            }
            return None;
        }

        // Edge: the run that just ended is complete.
        let windows = match run_windows(elapsed, half_ns, tolerance_ns) {
            Ok(windows) => windows,
            Err(e) => return self.abort(t_ns, high, e),
        };
        for _ in 0..windows {
            halves.push(*run_level);
            let n = halves.len();
            if n % 2 == 0 {
                if let Err(e) = ManchesterDecoder::decode_bit(halves[n - 2], halves[n - 1]) {
                    return self.abort(t_ns, high, e);
                }
            }
        }

        let n = halves.len();
        if n < wire::HALF_SYMBOLS {
            *run_level = level;
            *run_start = t_ns;
            return None;
        }
        if n == wire::HALF_SYMBOLS {
            // Last bit was a 0: its high half just fell back to idle.
            let halves = std::mem::take(halves);
            return self.finish(&halves, (!high).then_some(t_ns));
        }
        self.abort(
            t_ns,
            high,
            DecodeError::timing_desync(format!("{} half-symbols in one frame", n)),
        )
    }

    fn finish(&mut self, halves: &[Level], low_since: Option<u64>) -> Option<DecodeOutcome> {
        self.state = State::Idle { low_since };
        let outcome = match ManchesterDecoder::decode_half_symbols(halves) {
            Ok(frame) if frame.has_valid_signature() => DecodeOutcome::Valid(frame),
            Ok(frame) => DecodeOutcome::Invalid(DecodeError::SignatureMismatch { found: frame.raw() }),
            Err(e) => DecodeOutcome::Invalid(e),
        };
        match &outcome {
            DecodeOutcome::Valid(frame) => log::trace!("decoded {}", frame),
            DecodeOutcome::Invalid(e) => log::debug!("dropped frame: {}", e),
        }
        Some(outcome)
    }

    fn abort(&mut self, t_ns: u64, high: bool, err: DecodeError) -> Option<DecodeOutcome> {
        log::debug!("dropped frame: {}", err);
        self.state = State::Idle {
            low_since: (!high).then_some(t_ns),
        };
        Some(DecodeOutcome::Invalid(err))
    }
}

/// Mean of the nominal half-bit and `received` half-symbols spanning `elapsed_ns`
fn locked_half_ns(nominal_ns: u64, elapsed_ns: u64, received: usize) -> u64 {
    (nominal_ns + elapsed_ns) / (received as u64 + 1)
}

/// How many half-bit windows a run of `run_ns` covers
fn run_windows(run_ns: u64, half_ns: u64, tolerance_ns: u64) -> Result<usize, DecodeError> {
    let windows = (run_ns + half_ns / 2) / half_ns;
    if windows == 0 || windows > 2 || run_ns.abs_diff(windows * half_ns) > tolerance_ns {
        return Err(DecodeError::timing_desync(format!(
            "half-symbol run of {} ns with half-bit {} ns",
            run_ns, half_ns
        )));
    }
    Ok(windows as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Sample;
    use crate::sim::Waveform;

    const HALF: u64 = 500_000;
    const POLL: u64 = HALF / 8;

    fn decode_all(decoder: &mut FrameDecoder, waveform: &Waveform, end: u64) -> Vec<DecodeOutcome> {
        waveform
            .poll(0, end, POLL, || 0)
            .into_iter()
            .filter_map(|(t, level)| decoder.observe(t, level))
            .collect()
    }

    fn single_frame(halves: &[(Level, u64)]) -> (Waveform, u64) {
        let mut waveform = Waveform::new();
        let end = waveform.append_halves(5_000_000, halves);
        (waveform, end + 5_000_000)
    }

    #[test]
    fn test_decodes_clean_frame() -> crate::Result<()> {
        let frame = Frame::build(Sample::new(300)?);
        let (waveform, end) = single_frame(&Waveform::frame_halves(frame, HALF));
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        assert_eq!(decode_all(&mut decoder, &waveform, end), vec![DecodeOutcome::Valid(frame)]);
        assert_eq!(decoder.state(), DecoderState::Idle);
        Ok(())
    }

    #[test]
    fn test_frame_ending_in_zero_bit() {
        // Bit 15 clear: the frame ends on a falling edge rather than in idle.
        let frame = Frame::from_raw(0x3400);
        let (waveform, end) = single_frame(&Waveform::frame_halves(frame, HALF));
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        assert_eq!(
            decode_all(&mut decoder, &waveform, end),
            vec![DecodeOutcome::Invalid(DecodeError::SignatureMismatch { found: 0x3400 })]
        );
    }

    #[test]
    fn test_state_progression() {
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        assert_eq!(decoder.observe(0, false), None);
        assert_eq!(decoder.observe(2_000_000, true), None);
        assert_eq!(decoder.state(), DecoderState::Armed);
        decoder.observe(2_100_000, true);
        assert_eq!(decoder.state(), DecoderState::Syncing);
        decoder.observe(2_500_000, false);
        assert_eq!(decoder.state(), DecoderState::Receiving(0));
    }

    #[test]
    fn test_rising_edge_without_quiet_is_ignored() {
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        decoder.observe(0, false);
        decoder.observe(1_000_000, true);
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_preamble_out_of_tolerance() {
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        decoder.observe(0, false);
        decoder.observe(2_000_000, true);
        let outcome = decoder.observe(2_300_000, false);
        assert!(matches!(
            outcome,
            Some(DecodeOutcome::Invalid(DecodeError::TimingDesync(_)))
        ));
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_stuck_high_preamble() {
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        decoder.observe(0, false);
        decoder.observe(2_000_000, true);
        decoder.observe(2_100_000, true);
        let outcome = decoder.observe(2_700_000, true);
        assert!(matches!(
            outcome,
            Some(DecodeOutcome::Invalid(DecodeError::TimingDesync(_)))
        ));
    }

    #[test]
    fn test_premature_idle() -> crate::Result<()> {
        let frame = Frame::build(Sample::new(0x155)?);
        let halves = Waveform::frame_halves(frame, HALF);
        let (waveform, end) = single_frame(&halves[..20]);
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        let outcomes = decode_all(&mut decoder, &waveform, end);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            DecodeOutcome::Invalid(DecodeError::PrematureIdle(_))
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_symbol() {
        let mut halves = Waveform::frame_halves(Frame::from_raw(0xB401), HALF);
        // Bit 0 becomes high-high; every level run still spans one or two windows.
        halves[3].0 = Level::High;
        let (waveform, end) = single_frame(&halves);
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        let outcomes = decode_all(&mut decoder, &waveform, end);
        assert!(matches!(
            outcomes.first(),
            Some(DecodeOutcome::Invalid(DecodeError::InvalidSymbol(_)))
        ));
    }

    #[test]
    fn test_estimate_follows_slow_transmitter() {
        // Transmitter clock 10% slow: every half-symbol is 550 us.
        let frame = Frame::from_raw(0xB4A5);
        let (waveform, end) = single_frame(&Waveform::frame_halves(frame, 550_000));
        let mut decoder = FrameDecoder::new(&LinkConfig::default());
        assert_eq!(decode_all(&mut decoder, &waveform, end), vec![DecodeOutcome::Valid(frame)]);
    }

    #[test]
    fn test_distorted_preamble_high_still_decodes() -> crate::Result<()> {
        let frame = Frame::build(Sample::new(0x155)?);
        for preamble_ns in [400_000, 425_000, 575_000, 600_000] {
            let mut halves = Waveform::frame_halves(frame, HALF);
            halves[0].1 = preamble_ns;
            let (waveform, end) = single_frame(&halves);
            let mut decoder = FrameDecoder::new(&LinkConfig::default());
            let outcomes: Vec<DecodeOutcome> = waveform
                .poll(0, end, 10_000, || 0)
                .into_iter()
                .filter_map(|(t, level)| decoder.observe(t, level))
                .collect();
            assert_eq!(outcomes, vec![DecodeOutcome::Valid(frame)], "preamble {} ns", preamble_ns);
        }
        Ok(())
    }

    #[test]
    fn test_locked_half_ns() {
        // Preamble alone: halfway between nominal and measured.
        assert_eq!(locked_half_ns(HALF, 600_000, 1), 550_000);
        // Later half-symbols dilute a single long one.
        assert_eq!(locked_half_ns(HALF, 600_000 + 9 * HALF, 10), 509_090);
    }

    #[test]
    fn test_run_windows() {
        assert_eq!(run_windows(500_000, HALF, 125_000), Ok(1));
        assert_eq!(run_windows(1_100_000, HALF, 125_000), Ok(2));
        assert!(run_windows(700_000, HALF, 125_000).is_err());
        assert!(run_windows(1_500_000, HALF, 125_000).is_err());
        assert!(run_windows(100_000, HALF, 125_000).is_err());
    }
}
