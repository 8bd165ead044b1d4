//! Manchester encoding and decoding of frames

use crate::core::{Frame, Level};
use crate::error::DecodeError;
use crate::wire;

type Result<T> = std::result::Result<T, DecodeError>;

/// Manchester encoder for the telemetry link
pub struct ManchesterEncoder;

impl ManchesterEncoder {
    /// Encode a single bit into its two half-symbols
    ///
    /// 1 = high then low
    /// 0 = low then high
    pub fn encode_bit(bit: bool) -> [Level; 2] {
        match bit {
            true => [Level::High, Level::Low],
            false => [Level::Low, Level::High],
        }
    }

    /// The 17 bits sent for a frame: the preamble, then the frame
    /// least-significant bit first
    pub fn frame_bits(frame: Frame) -> [bool; wire::FRAME_BITS] {
        let mut bits = [wire::PREAMBLE; wire::FRAME_BITS];
        let raw = frame.raw();
        for i in 0..wire::DATA_BITS {
            bits[wire::PREAMBLE_BITS + i] = (raw >> i) & 1 != 0;
        }
        bits
    }

    /// Encode a frame into its 34 half-symbols
    pub fn encode_frame(frame: Frame) -> Vec<Level> {
        Self::frame_bits(frame)
            .iter()
            .flat_map(|&bit| Self::encode_bit(bit))
            .collect()
    }
}

/// Manchester decoder for the telemetry link
pub struct ManchesterDecoder;

impl ManchesterDecoder {
    /// Decode one bit from its two half-symbols
    pub fn decode_bit(first: Level, second: Level) -> Result<bool> {
        match (first, second) {
            (Level::High, Level::Low) => Ok(true),
            (Level::Low, Level::High) => Ok(false),
            _ => Err(DecodeError::invalid_symbol(format!(
                "{first}-{second} is not a Manchester bit"
            ))),
        }
    }

    /// Decode a complete transmission of 34 half-symbols, preamble included
    ///
    /// The signature is not checked here.
    pub fn decode_half_symbols(halves: &[Level]) -> Result<Frame> {
        if halves.len() != wire::HALF_SYMBOLS {
            return Err(DecodeError::premature_idle(format!(
                "Expected {} half-symbols, got {}",
                wire::HALF_SYMBOLS,
                halves.len()
            )));
        }

        let mut pairs = halves.chunks_exact(2);
        let preamble = match pairs.next() {
            Some(pair) => Self::decode_bit(pair[0], pair[1])?,
            None => return Err(DecodeError::premature_idle("Empty transmission")),
        };
        if preamble != wire::PREAMBLE {
            return Err(DecodeError::invalid_symbol("Missing preamble"));
        }

        let mut raw = 0u16;
        for (i, pair) in pairs.enumerate() {
            if Self::decode_bit(pair[0], pair[1])? {
                raw |= 1 << i;
            }
        }

        Ok(Frame::from_raw(raw))
    }
}
