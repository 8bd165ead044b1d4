//! Memory-mapped GPIO on BCM283x boards
//!
//! Maps the GPIO register block from `/dev/mem` and drives one pin through
//! its function-select, set, clear and level registers. Needs root.

use std::ffi::CString;
use std::ptr;

use crate::error::{LinkError, Result};
use crate::pin::LinePin;

/// Offset of the GPIO block from the peripheral base
pub const GPIO_OFFSET: u64 = 0x20_0000;
/// Bytes mapped from `/dev/mem`
pub const BLOCK_SIZE: usize = 4096;

const GPSET0: usize = 7;
const GPCLR0: usize = 10;
const GPLEV0: usize = 13;

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Receive side
    Input,
    /// Transmit side
    Output,
}

/// Which pin to map and how
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpioConfig {
    /// Physical peripheral base (0x3F00_0000 on Pi 2/3)
    pub peripheral_base: u64,
    /// BCM pin number
    pub pin: u8,
    /// Input or output
    pub direction: Direction,
}

impl Default for GpioConfig {
    fn default() -> Self {
        GpioConfig {
            peripheral_base: 0x3F00_0000,
            pin: 4,
            direction: Direction::Input,
        }
    }
}

/// Word index and bit shift of a pin's function-select field
fn function_select(pin: u8) -> (usize, u32) {
    (usize::from(pin / 10), u32::from(pin % 10) * 3)
}

/// File offset of the GPIO block for `mmap`
///
/// `off_t` is 32 bits on 32-bit ARM, where a high peripheral base does not fit.
fn map_offset(peripheral_base: u64) -> Result<libc::off_t> {
    peripheral_base
        .checked_add(GPIO_OFFSET)
        .and_then(|offset| libc::off_t::try_from(offset).ok())
        .ok_or_else(|| {
            LinkError::hardware_init(format!(
                "GPIO block at {:#X} + {:#X} is outside the mmap offset range",
                peripheral_base, GPIO_OFFSET
            ))
        })
}

/// Word index and mask of a pin in the set/clear/level banks
fn bank_bit(pin: u8) -> (usize, u32) {
    (usize::from(pin / 32), 1 << (pin % 32))
}

/// One GPIO pin driven through mapped registers
#[derive(Debug)]
pub struct MappedGpio {
    base: *mut u32,
    pin: u8,
}

impl MappedGpio {
    /// Map the GPIO block and configure the pin
    pub fn open(config: &GpioConfig) -> Result<Self> {
        if config.pin > 53 {
            return Err(LinkError::invalid_config(format!("No GPIO pin {}", config.pin)));
        }
        let offset = map_offset(config.peripheral_base)?;
        let path = CString::new("/dev/mem").map_err(|e| LinkError::hardware_init(e.to_string()))?;

        // SAFETY: `path` is a valid NUL-terminated string.
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_SYNC) };
        if fd < 0 {
            return Err(LinkError::hardware_init(format!(
                "can't open /dev/mem: {}",
                std::io::Error::last_os_error()
            )));
        }

        // SAFETY: a fresh shared mapping; the kernel validates fd and offset.
        let map = unsafe {
            libc::mmap(
                ptr::null_mut(),
                BLOCK_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset,
            )
        };
        // The mapping stays valid after the descriptor is closed.
        // SAFETY: `fd` came from open above and is not used again.
        unsafe { libc::close(fd) };
        if map == libc::MAP_FAILED {
            return Err(LinkError::hardware_init(format!(
                "mmap of {:#X} failed: {}",
                offset,
                std::io::Error::last_os_error()
            )));
        }

        let gpio = MappedGpio {
            base: map.cast::<u32>(),
            pin: config.pin,
        };
        gpio.set_direction(config.direction);
        log::info!("mapped GPIO {} as {:?}", config.pin, config.direction);
        Ok(gpio)
    }

    fn set_direction(&self, direction: Direction) {
        let (word, shift) = function_select(self.pin);
        // Input first clears the field; output then sets it to 0b001.
        let mut value = self.read(word) & !(7 << shift);
        if direction == Direction::Output {
            value |= 1 << shift;
        }
        self.write(word, value);
    }

    fn read(&self, word: usize) -> u32 {
        debug_assert!(word * 4 < BLOCK_SIZE);
        // SAFETY: `word` is inside the mapped block; registers need volatile access.
        unsafe { ptr::read_volatile(self.base.add(word)) }
    }

    fn write(&self, word: usize, value: u32) {
        debug_assert!(word * 4 < BLOCK_SIZE);
        // SAFETY: as for `read`.
        unsafe { ptr::write_volatile(self.base.add(word), value) }
    }
}

impl LinePin for MappedGpio {
    fn set_high(&mut self) {
        let (word, mask) = bank_bit(self.pin);
        self.write(GPSET0 + word, mask);
    }

    fn set_low(&mut self) {
        let (word, mask) = bank_bit(self.pin);
        self.write(GPCLR0 + word, mask);
    }

    fn read_level(&mut self) -> bool {
        let (word, mask) = bank_bit(self.pin);
        self.read(GPLEV0 + word) & mask != 0
    }
}

impl Drop for MappedGpio {
    fn drop(&mut self) {
        // SAFETY: `base` is the start of a BLOCK_SIZE mapping made in `open`.
        if unsafe { libc::munmap(self.base.cast(), BLOCK_SIZE) } != 0 {
            log::warn!("munmap failed: {}", std::io::Error::last_os_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_select_layout() {
        assert_eq!(function_select(4), (0, 12));
        assert_eq!(function_select(17), (1, 21));
        assert_eq!(function_select(53), (5, 9));
    }

    #[test]
    fn test_bank_bit_layout() {
        assert_eq!(bank_bit(4), (0, 1 << 4));
        assert_eq!(bank_bit(31), (0, 1 << 31));
        assert_eq!(bank_bit(32), (1, 1));
    }

    #[test]
    fn test_map_offset() -> Result<()> {
        assert_eq!(map_offset(0x3F00_0000)?, 0x3F20_0000);
        assert_eq!(map_offset(0x2000_0000)?, 0x2020_0000);
        assert!(map_offset(u64::MAX).is_err());
        assert!(map_offset(i64::MAX as u64).is_err());
        Ok(())
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_map_offset_high_peripheral_base() -> Result<()> {
        assert_eq!(map_offset(0xFE00_0000)?, 0xFE20_0000);
        Ok(())
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_map_offset_rejects_base_beyond_off_t() {
        assert!(matches!(map_offset(0xFE00_0000), Err(LinkError::HardwareInit(_))));
    }

    #[test]
    fn test_default_config() {
        let config = GpioConfig::default();
        assert_eq!(config.peripheral_base + GPIO_OFFSET, 0x3F20_0000);
        assert_eq!(config.pin, 4);
    }

    #[test]
    fn test_rejects_unknown_pin() {
        let config = GpioConfig {
            pin: 60,
            ..GpioConfig::default()
        };
        assert!(matches!(MappedGpio::open(&config), Err(LinkError::InvalidConfig(_))));
    }
}
