//! Battery voltage monitor built on top of a frame source

use crate::core::{Frame, Sample};
use crate::error::{DecodeError, LinkError, Result};
use crate::wire;

/// Anything that yields received frames
pub trait FrameSource {
    /// Block until the next valid frame or a failed attempt
    fn next_frame(&mut self) -> std::result::Result<Frame, DecodeError>;
}

/// Resistor divider between the battery and the converter input
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoltageDivider {
    /// Battery to input, in ohms
    pub r1_ohms: f64,
    /// Input to ground, in ohms
    pub r2_ohms: f64,
    /// Converter reference voltage (top of the range)
    pub vcc: f64,
    /// Reading at the reference voltage
    pub max_adc: f64,
}

impl Default for VoltageDivider {
    fn default() -> Self {
        VoltageDivider {
            r1_ohms: 477_000.0,
            r2_ohms: 118_400.0,
            vcc: 3.30,
            max_adc: f64::from(wire::SAMPLE_MAX),
        }
    }
}

impl VoltageDivider {
    /// Battery voltage for a reading
    pub fn volts(&self, sample: Sample) -> f64 {
        (f64::from(sample.value()) / self.max_adc) * ((self.r1_ohms + self.r2_ohms) / self.r2_ohms) * self.vcc
    }
}

/// Averaging and failure policy for [`BatteryMonitor`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorConfig {
    /// Good frames averaged per reading
    pub samples: usize,
    /// Failed attempts tolerated per reading
    pub max_bad_frames: usize,
    /// Conversion from samples to volts
    pub divider: VoltageDivider,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            samples: 10,
            max_bad_frames: 20,
            divider: VoltageDivider::default(),
        }
    }
}

/// Averages several received samples into one voltage reading
#[derive(Debug)]
pub struct BatteryMonitor<S> {
    source: S,
    config: MonitorConfig,
}

impl<S: FrameSource> BatteryMonitor<S> {
    /// Create a monitor reading from `source`
    pub fn new(source: S, config: MonitorConfig) -> Result<Self> {
        if config.samples == 0 {
            return Err(LinkError::invalid_config("Monitor needs at least one sample"));
        }
        Ok(BatteryMonitor { source, config })
    }

    /// Collect the configured number of good frames and average their voltage
    pub fn read_average(&mut self) -> Result<f64> {
        let mut sum = 0.0;
        let mut good = 0;
        let mut bad = 0;
        while good < self.config.samples {
            match self.source.next_frame().and_then(|frame| frame.sample()) {
                Ok(sample) => {
                    sum += self.config.divider.volts(sample);
                    good += 1;
                }
                Err(e) => {
                    bad += 1;
                    if bad > self.config.max_bad_frames {
                        return Err(LinkError::TooManyBadFrames { count: bad, last: e });
                    }
                }
            }
        }
        Ok(sum / good as f64)
    }

    /// The underlying frame source
    pub fn source(&self) -> &S {
        &self.source
    }
}
