//! Host-side polling loop

use crate::config::LinkConfig;
use crate::core::{Frame, Sample};
use crate::decoder::{DecodeOutcome, FrameDecoder};
use crate::error::DecodeError;
use crate::monitor::FrameSource;
use crate::pin::{Clock, LinePin};
use crate::stats::LinkStats;

/// Busy-polls a line and decodes frames from it
///
/// The loop never sleeps; its overhead per poll must stay small next to the
/// half-bit period or edges are timed late.
#[derive(Debug)]
pub struct Receiver<P, C> {
    line: P,
    clock: C,
    decoder: FrameDecoder,
    frame_timeout_ns: u64,
    stats: LinkStats,
}

impl<P, C> Receiver<P, C>
where
    P: LinePin,
    C: Clock,
{
    /// Create a receiver owning the line handle
    pub fn new(line: P, clock: C, config: &LinkConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Receiver {
            line,
            clock,
            decoder: FrameDecoder::new(config),
            frame_timeout_ns: config.frame_timeout_ns(),
            stats: LinkStats::new(),
        })
    }

    /// Take one observation; returns a frame if one just completed
    pub fn poll(&mut self) -> Option<Frame> {
        let t = self.clock.now_ns();
        let high = self.line.read_level();
        let outcome = self.decoder.observe(t, high)?;
        self.stats.record(&outcome, t);
        match outcome {
            DecodeOutcome::Valid(frame) => Some(frame),
            DecodeOutcome::Invalid(_) => None,
        }
    }

    /// Poll until a valid frame arrives or `timeout_ns` passes
    pub fn next_frame_within(&mut self, timeout_ns: u64) -> Result<Frame, DecodeError> {
        let start = self.clock.now_ns();
        loop {
            if let Some(frame) = self.poll() {
                return Ok(frame);
            }
            if self.clock.now_ns().saturating_sub(start) >= timeout_ns {
                let err = DecodeError::timeout(format!("no valid frame within {} ns", timeout_ns));
                self.stats.record_error(&err);
                return Err(err);
            }
        }
    }

    /// Poll until a valid frame arrives or the configured frame timeout passes
    pub fn next_frame(&mut self) -> Result<Frame, DecodeError> {
        self.next_frame_within(self.frame_timeout_ns)
    }

    /// Decode forever, handing every valid sample to `on_sample`
    pub fn run<F>(&mut self, mut on_sample: F) -> !
    where
        F: FnMut(Sample),
    {
        loop {
            if let Some(frame) = self.poll() {
                // The decoder only emits frames that passed the signature gate.
                if let Ok(sample) = frame.sample() {
                    on_sample(sample);
                }
            }
        }
    }

    /// Statistics since creation
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// The decoder, for state inspection
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Release the line and clock
    pub fn into_parts(self) -> (P, C) {
        (self.line, self.clock)
    }
}

impl<P, C> FrameSource for Receiver<P, C>
where
    P: LinePin,
    C: Clock,
{
    fn next_frame(&mut self) -> Result<Frame, DecodeError> {
        Receiver::next_frame(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecoderState;
    use crate::sim::{record_frames, PolledLine, Waveform};

    #[test]
    fn test_receives_consecutive_frames() -> crate::Result<()> {
        let config = LinkConfig::default();
        let frames: Vec<Frame> = [1, 512, 1023]
            .iter()
            .map(|&v| Sample::new(v).map(Frame::build))
            .collect::<crate::Result<_>>()?;
        let line = PolledLine::new(record_frames(&config, &frames)?, 62_500);
        let clock = line.clock();
        let mut receiver = Receiver::new(line, clock, &config)?;

        for &expected in &frames {
            assert_eq!(receiver.next_frame(), Ok(expected));
        }
        assert_eq!(receiver.stats().valid_frames, 3);
        assert_eq!(receiver.stats().invalid_frames(), 0);
        Ok(())
    }

    #[test]
    fn test_timeout_on_silent_line() -> crate::Result<()> {
        let config = LinkConfig::default();
        let line = PolledLine::new(record_frames(&config, &[])?, 100_000);
        let clock = line.clock();
        let mut receiver = Receiver::new(line, clock.clone(), &config)?;

        let result = receiver.next_frame_within(5_000_000);
        assert!(matches!(result, Err(DecodeError::Timeout(_))));
        assert!(clock.now() >= 5_000_000);
        assert_eq!(receiver.stats().timeout_count, 1);
        assert_eq!(receiver.decoder().state(), DecoderState::Idle);
        Ok(())
    }

    #[test]
    fn test_invalid_frames_are_counted_not_returned() -> crate::Result<()> {
        let config = LinkConfig::default();
        let good = Frame::build(Sample::new(42)?);
        let waveform = record_frames(&config, &[Frame::from_raw(0x1234), good])?;
        let line = PolledLine::new(waveform, 62_500);
        let clock = line.clock();
        let mut receiver = Receiver::new(line, clock, &config)?;

        assert_eq!(receiver.next_frame(), Ok(good));
        assert_eq!(receiver.stats().signature_mismatch_count, 1);
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = LinkConfig {
            tolerance: 0.6,
            ..LinkConfig::default()
        };
        let line = PolledLine::new(Waveform::new(), 62_500);
        let clock = line.clock();
        assert!(Receiver::new(line, clock, &config).is_err());
    }
}
