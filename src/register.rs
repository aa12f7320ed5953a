//! A single byte-wide register on a transactional bus.

use crate::error::{Error, Result};
use crate::i2c::I2cDevice;
use log::{trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// One addressable byte inside a chip, reached through its bus slave.
///
/// Every read is a real bus round trip. The last value seen is kept for
/// diagnostics only and is never used in place of a read.
pub struct Register {
    bus: Arc<dyn I2cDevice>,
    address: u8,
    last_value: AtomicU8,
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Register")
            .field("slave", &self.bus.address())
            .field("address", &format_args!("0x{:02X}", self.address))
            .field("last_value", &format_args!("0x{:02X}", self.last_value()))
            .finish()
    }
}

impl Register {
    pub fn new(bus: Arc<dyn I2cDevice>, address: u8) -> Self {
        Register {
            bus,
            address,
            last_value: AtomicU8::new(0),
        }
    }

    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Value of the last completed read or write. Advisory only.
    #[inline]
    pub fn last_value(&self) -> u8 {
        self.last_value.load(Ordering::Relaxed)
    }

    /// Reads the byte: writes the register address, then reads one byte back.
    pub fn read(&self) -> Result<u8> {
        let mut buffer = [0u8; 1];
        self.bus.write_read(&[self.address], &mut buffer)?;
        trace!(
            "Read {} reg 0x{:02X} = 0x{:02X}",
            self.bus.address(),
            self.address,
            buffer[0]
        );
        self.last_value.store(buffer[0], Ordering::Relaxed);
        Ok(buffer[0])
    }

    /// Writes the byte, then reads it back.
    ///
    /// Returns `Ok(false)` when the read-back differs from `value`.
    pub fn write(&self, value: u8) -> Result<bool> {
        self.write_unverified(value)?;
        let actual = self.read()?;
        if actual != value {
            warn!(
                "Write verification failed on {} reg 0x{:02X}: wrote 0x{:02X}, read 0x{:02X}",
                self.bus.address(),
                self.address,
                value,
                actual
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn write_unverified(&self, value: u8) -> Result<()> {
        trace!(
            "Write {} reg 0x{:02X} = 0x{:02X}",
            self.bus.address(),
            self.address,
            value
        );
        self.bus.write(&[self.address, value])?;
        self.last_value.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Reads bit `pos` (0-7).
    pub fn read_bit(&self, pos: u8) -> Result<bool> {
        let mask = bit_mask(pos)?;
        Ok(self.read()? & mask != 0)
    }

    /// Sets or clears bit `pos` (0-7) with a read-modify-write, leaving the
    /// other bits untouched, then verifies the bit by reading it back.
    ///
    /// Returns `Ok(false)` when the read-back bit does not match.
    pub fn write_bit(&self, pos: u8, set: bool) -> Result<bool> {
        let mask = bit_mask(pos)?;
        let current = self.read()?;
        let new = if set { current | mask } else { current & !mask };
        self.write_unverified(new)?;
        let verified = (self.read()? & mask != 0) == set;
        if !verified {
            warn!(
                "Bit {} of {} reg 0x{:02X} did not read back as {}",
                pos,
                self.bus.address(),
                self.address,
                set
            );
        }
        Ok(verified)
    }
}

fn bit_mask(pos: u8) -> Result<u8> {
    if pos < 8 {
        Ok(1 << pos)
    } else {
        Err(Error::ArgumentOutOfRange(format!(
            "Bit position must be 0-7 (got {})",
            pos
        )))
    }
}
