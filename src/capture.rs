//! Edge-capture decoding
//!
//! Instead of decoding on the fly, this receiver records every edge of one
//! transmission in a tight loop and recovers the clock afterwards. Intervals
//! between Manchester edges are either one or two half-bits, so averaging the
//! short ones gives the transmitter's half-bit period without trusting any
//! nominal value.

use crate::config::LinkConfig;
use crate::core::Frame;
use crate::error::DecodeError;
use crate::monitor::FrameSource;
use crate::pin::{Clock, LinePin};
use crate::sched::RealtimeGuard;
use crate::stats::LinkStats;
use crate::wire;

type Result<T> = std::result::Result<T, DecodeError>;

/// Upper bound on edges in one recording; more means noise
pub const MAX_EDGES: usize = 3 * wire::FRAME_BITS;

/// Recover a frame from edge timestamps
///
/// `edges` are nanoseconds relative to the preamble's rising edge, which is
/// itself the first entry (0).
pub fn recover_frame(edges: &[u64]) -> Result<Frame> {
    if edges.len() < wire::FRAME_BITS {
        return Err(DecodeError::TooFewEdges(edges.len()));
    }

    let clock = recover_clock(edges);
    if clock == 0 {
        return Err(DecodeError::timing_desync("zero-length edge interval"));
    }

    // Sample the middle of the first half of each data bit:
    // 2*clock + clock/2, 4*clock + clock/2, ...
    let mut raw = 0u16;
    let mut level = false;
    let mut t = 5 * clock / 2;
    let mut it = edges.iter().peekable();
    for bit in 0..wire::DATA_BITS {
        while let Some(&&edge) = it.peek() {
            if edge > t {
                break;
            }
            level = !level;
            it.next();
        }
        if it.peek().is_none() {
            return Err(DecodeError::PrematureEnd(bit));
        }
        if level {
            raw |= 1 << bit;
        }
        t += 2 * clock;
    }

    let frame = Frame::from_raw(raw);
    if !frame.has_valid_signature() {
        return Err(DecodeError::SignatureMismatch { found: raw });
    }
    Ok(frame)
}

/// Average length of the short (one half-bit) edge intervals
fn recover_clock(edges: &[u64]) -> u64 {
    let deltas: Vec<u64> = edges.windows(2).map(|w| w[1].saturating_sub(w[0])).collect();
    let (Some(&min), Some(&max)) = (deltas.iter().min(), deltas.iter().max()) else {
        return 0;
    };
    // All intervals alike means all are single half-bits (e.g. 0xFFFF).
    if max < min + min / 2 {
        return deltas.iter().sum::<u64>() / deltas.len() as u64;
    }
    let threshold = (max + min) / 2;
    let (sum, count) = deltas
        .iter()
        .filter(|&&d| d < threshold)
        .fold((0u64, 0u64), |(sum, count), &d| (sum + d, count + 1));
    if count == 0 {
        0
    } else {
        sum / count
    }
}

/// Receiver that records one transmission at a time and decodes it offline
#[derive(Debug)]
pub struct CaptureReceiver<P, C> {
    line: P,
    clock: C,
    quiet_ns: u64,
    timeout_ns: u64,
    record_ns: u64,
    realtime_priority: Option<i32>,
    stats: LinkStats,
}

impl<P, C> CaptureReceiver<P, C>
where
    P: LinePin,
    C: Clock,
{
    /// Create a capture receiver owning the line handle
    pub fn new(line: P, clock: C, config: &LinkConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(CaptureReceiver {
            line,
            clock,
            quiet_ns: config.quiet_threshold_ns(),
            timeout_ns: config.frame_timeout_ns(),
            record_ns: config.record_window_ns(),
            realtime_priority: None,
            stats: LinkStats::new(),
        })
    }

    /// Run each recording under `SCHED_FIFO` at `priority`
    pub fn with_realtime(mut self, priority: i32) -> Self {
        self.realtime_priority = Some(priority);
        self
    }

    /// Record the edges of the next transmission
    pub fn capture(&mut self) -> Result<Vec<u64>> {
        let mut edges = Vec::with_capacity(MAX_EDGES + 1);
        edges.push(0);

        // Keep the section below tight; every poll's latency lands in the edge times.
        let _realtime = self.realtime_priority.and_then(|priority| {
            RealtimeGuard::enter(priority)
                .map_err(|e| log::warn!("capturing without realtime priority: {}", e))
                .ok()
        });

        // Wait for an idle line.
        let t0 = self.clock.now_ns();
        let mut last_high = t0;
        loop {
            let t = self.clock.now_ns();
            if t - t0 >= self.timeout_ns {
                return Err(DecodeError::timeout("line never went idle"));
            }
            if self.line.read_level() {
                last_high = t;
            } else if t - last_high >= self.quiet_ns {
                break;
            }
        }

        // Wait for the preamble.
        let t0 = self.clock.now_ns();
        let rise = loop {
            let t = self.clock.now_ns();
            if t - t0 >= self.timeout_ns {
                return Err(DecodeError::timeout("no preamble"));
            }
            if self.line.read_level() {
                break t;
            }
        };

        // Record for the whole window.
        let mut level = true;
        loop {
            let t = self.clock.now_ns();
            if t - rise >= self.record_ns {
                break;
            }
            if self.line.read_level() != level {
                edges.push(t - rise);
                if edges.len() > MAX_EDGES {
                    return Err(DecodeError::TooManyEdges(edges.len()));
                }
                level = !level;
            }
        }

        Ok(edges)
    }

    /// Capture and decode one transmission
    pub fn receive(&mut self) -> Result<Frame> {
        let result = self.capture().and_then(|edges| recover_frame(&edges));
        match &result {
            Ok(_) => self.stats.record_success(self.clock.now_ns()),
            Err(e) => {
                log::debug!("capture failed: {}", e);
                self.stats.record_error(e);
            }
        }
        result
    }

    /// Statistics since creation
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}

impl<P, C> FrameSource for CaptureReceiver<P, C>
where
    P: LinePin,
    C: Clock,
{
    fn next_frame(&mut self) -> Result<Frame> {
        self.receive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Sample;
    use crate::sim::{record_frames, PolledLine, Waveform};

    fn ideal_edges(frame: Frame, half_ns: u64) -> Vec<u64> {
        let mut waveform = Waveform::new();
        waveform.append_halves(0, &Waveform::frame_halves(frame, half_ns));
        waveform.edges().collect()
    }

    #[test]
    fn test_recover_ideal_edges() -> crate::Result<()> {
        let frame = Frame::build(Sample::new(300)?);
        assert_eq!(recover_frame(&ideal_edges(frame, 500_000)), Ok(frame));
        Ok(())
    }

    #[test]
    fn test_recover_ignores_nominal_rate() {
        // Any half-bit works; the clock comes from the edges themselves.
        let frame = Frame::from_raw(0xB7FF);
        assert_eq!(recover_frame(&ideal_edges(frame, 333_000)), Ok(frame));
    }

    #[test]
    fn test_recover_without_long_intervals() {
        // All ones: every interval is a single half-bit.
        let frame = Frame::from_raw(0xFFFF);
        assert_eq!(
            recover_frame(&ideal_edges(frame, 500_000)),
            Err(DecodeError::SignatureMismatch { found: 0xFFFF })
        );
    }

    #[test]
    fn test_recover_rejects_short_capture() {
        assert_eq!(recover_frame(&[0, 500, 1000]), Err(DecodeError::TooFewEdges(3)));
    }

    #[test]
    fn test_recover_rejects_truncated_edges() -> crate::Result<()> {
        let frame = Frame::build(Sample::new(0)?);
        let edges = ideal_edges(frame, 500_000);
        assert!(matches!(
            recover_frame(&edges[..edges.len() - 4]),
            Err(DecodeError::PrematureEnd(_))
        ));
        Ok(())
    }

    #[test]
    fn test_capture_receiver() -> crate::Result<()> {
        let config = LinkConfig::default();
        let frame = Frame::build(Sample::new(777)?);
        let line = PolledLine::new(record_frames(&config, &[frame])?, 50_000);
        let clock = line.clock();
        let mut receiver = CaptureReceiver::new(line, clock, &config)?;

        assert_eq!(receiver.receive(), Ok(frame));
        assert_eq!(receiver.stats().valid_frames, 1);
        Ok(())
    }

    #[test]
    fn test_capture_times_out_on_stuck_line() -> crate::Result<()> {
        let config = LinkConfig::default();
        let mut waveform = Waveform::new();
        waveform.set(0, true);
        let line = PolledLine::new(waveform, 1_000_000);
        let clock = line.clock();
        let mut receiver = CaptureReceiver::new(line, clock, &config)?;

        assert!(matches!(receiver.receive(), Err(DecodeError::Timeout(_))));
        assert_eq!(receiver.stats().timeout_count, 1);
        Ok(())
    }
}
