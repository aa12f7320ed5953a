//! I2C bus access: the per-slave [`I2cDevice`] seam and its XR2280x implementation.

use crate::consts;
use crate::device::Xr2280x;
use crate::error::{Error, Result};
use log::{debug, trace, warn};
use std::fmt;
use std::sync::Arc;

/// A 7-bit I2C slave address (0x00 - 0x7F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct I2cAddress(u8);

impl I2cAddress {
    pub fn new(addr: u8) -> Result<Self> {
        if addr <= 0x7F {
            Ok(I2cAddress(addr))
        } else {
            Err(Error::ArgumentOutOfRange(format!(
                "7-bit I2C address must be 0-127 (got 0x{:02X})",
                addr
            )))
        }
    }

    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// One slave on a transactional bus.
///
/// Implementations block until the transaction completes; there is no timeout
/// beyond whatever the underlying controller imposes.
pub trait I2cDevice: Send + Sync {
    fn address(&self) -> I2cAddress;

    fn write(&self, data: &[u8]) -> Result<()>;

    /// Writes `data`, then reads `buffer.len()` bytes in the same transaction.
    fn write_read(&self, data: &[u8], buffer: &mut [u8]) -> Result<()>;
}

/// A slave reached through the I2C interface of an XR2280x bridge.
#[derive(Debug, Clone)]
pub struct BridgeI2c {
    bridge: Arc<Xr2280x>,
    address: I2cAddress,
}

impl BridgeI2c {
    pub fn new(bridge: Arc<Xr2280x>, address: I2cAddress) -> Result<Self> {
        if !bridge.has_i2c() {
            return Err(Error::DeviceNotFound);
        }
        Ok(BridgeI2c { bridge, address })
    }
}

impl I2cDevice for BridgeI2c {
    fn address(&self) -> I2cAddress {
        self.address
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.bridge.i2c_transfer(self.address, Some(data), None)
    }

    fn write_read(&self, data: &[u8], buffer: &mut [u8]) -> Result<()> {
        self.bridge.i2c_transfer(self.address, Some(data), Some(buffer))
    }
}

impl Xr2280x {
    /// Sets the I2C bus speed (approximated). Max supported is 400 kHz.
    pub fn i2c_set_speed_khz(&self, speed_khz: u32) -> Result<()> {
        if speed_khz == 0 || speed_khz > 400 {
            return Err(Error::ArgumentOutOfRange(format!(
                "I2C speed {} kHz out of range (1-400)",
                speed_khz
            )));
        }
        let total_cycles = 60_000 / speed_khz;
        let (min_low, min_high) = if speed_khz <= 100 {
            (252, 240)
        } else {
            (78, 36)
        };
        let low = (total_cycles / 2).max(min_low);
        let high = (total_cycles - total_cycles / 2).max(min_high);
        debug!(
            "Setting I2C speed ~{}kHz: SCL_LOW=0x{:04X}, SCL_HIGH=0x{:04X}",
            speed_khz, low, high
        );
        self.write_i2c_register(consts::i2c::REG_SCL_LOW, low as u16)?;
        self.write_i2c_register(consts::i2c::REG_SCL_HIGH, high as u16)?;
        Ok(())
    }

    /// One START..STOP transaction: optional write phase, then optional read phase.
    pub(crate) fn i2c_transfer(
        &self,
        address: I2cAddress,
        write_data: Option<&[u8]>,
        read_buffer: Option<&mut [u8]>,
    ) -> Result<()> {
        let device = self.i2c_interface()?;
        let write_len = write_data.map_or(0, |d| d.len());
        let read_len = read_buffer.as_ref().map_or(0, |b| b.len());
        if write_len.max(read_len) > consts::i2c::REPORT_MAX_DATA_SIZE {
            return Err(Error::OperationTooLarge {
                max: consts::i2c::REPORT_MAX_DATA_SIZE,
                actual: write_len.max(read_len),
            });
        }

        let out_buf = encode_out_report(address, write_data.unwrap_or(&[]), read_len);
        trace!(
            "I2C OUT report (addr={}): {:02X?}",
            address,
            &out_buf[..4 + write_len]
        );

        let mut in_buf = [0u8; consts::i2c::IN_REPORT_READ_BUF_SIZE];
        let bytes_read = {
            let device = self.lock(device);
            let written = device.write(&out_buf)?;
            if written != out_buf.len() {
                warn!(
                    "hidapi write returned unexpected length: {} (expected {})",
                    written,
                    out_buf.len()
                );
                return Err(Error::Io(std::io::Error::other("Incomplete HID write")));
            }
            device.read_timeout(&mut in_buf, consts::i2c::DEFAULT_TIMEOUT_MS)?
        };
        if bytes_read == 0 {
            return Err(Error::I2cTimeout { address });
        }
        trace!("I2C IN report ({} bytes): {:02X?}", bytes_read, &in_buf[..bytes_read]);
        parse_in_report(address, &in_buf[..bytes_read], read_buffer)
    }
}

/// Builds a START..STOP OUT report. The slave address goes out in 8-bit wire
/// form, R/W bit clear.
fn encode_out_report(
    address: I2cAddress,
    data: &[u8],
    read_len: usize,
) -> [u8; consts::i2c::OUT_REPORT_WRITE_BUF_SIZE] {
    let mut out_buf = [0u8; consts::i2c::OUT_REPORT_WRITE_BUF_SIZE];
    out_buf[0] = consts::i2c::out_flags::START_BIT | consts::i2c::out_flags::STOP_BIT;
    out_buf[1] = data.len() as u8;
    out_buf[2] = read_len as u8;
    out_buf[3] = address.value() << 1;
    out_buf[4..4 + data.len()].copy_from_slice(data);
    out_buf
}

/// Checks the status flags of an IN report and copies the read phase into
/// `read_buffer`, which must be filled completely.
fn parse_in_report(
    address: I2cAddress,
    report: &[u8],
    read_buffer: Option<&mut [u8]>,
) -> Result<()> {
    if report.len() < 4 {
        return Err(Error::InvalidReport(report.len()));
    }
    check_i2c_status(address, report[0])?;

    if let Some(buffer) = read_buffer {
        let actual = report[2] as usize;
        if actual != buffer.len() || report.len() < 4 + actual {
            warn!(
                "I2C read length mismatch from {}: expected {}, got {} (report {} bytes)",
                address,
                buffer.len(),
                actual,
                report.len()
            );
            return Err(Error::InvalidReport(report.len()));
        }
        buffer.copy_from_slice(&report[4..4 + actual]);
    }
    Ok(())
}

fn check_i2c_status(address: I2cAddress, flags: u8) -> Result<()> {
    use consts::i2c::in_flags;
    if flags & in_flags::REQUEST_ERROR != 0 {
        Err(Error::I2cRequestError { address })
    } else if flags & in_flags::NAK_RECEIVED != 0 {
        Err(Error::I2cNack { address })
    } else if flags & in_flags::ARBITRATION_LOST != 0 {
        Err(Error::I2cArbitrationLost { address })
    } else if flags & in_flags::TIMEOUT != 0 {
        Err(Error::I2cTimeout { address })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert_eq!(I2cAddress::new(0x20).unwrap().value(), 0x20);
        assert!(I2cAddress::new(0x80).is_err());
        assert_eq!(I2cAddress::new(0x27).unwrap().to_string(), "0x27");
    }

    #[test]
    fn test_status_flag_mapping() {
        let addr = I2cAddress::new(0x20).unwrap();
        assert!(check_i2c_status(addr, 0).is_ok());
        assert!(matches!(
            check_i2c_status(addr, consts::i2c::in_flags::NAK_RECEIVED),
            Err(Error::I2cNack { .. })
        ));
        assert!(matches!(
            check_i2c_status(addr, consts::i2c::in_flags::ARBITRATION_LOST),
            Err(Error::I2cArbitrationLost { .. })
        ));
        assert!(matches!(
            check_i2c_status(addr, consts::i2c::in_flags::TIMEOUT),
            Err(Error::I2cTimeout { .. })
        ));
        // Request error wins when several flags are set.
        assert!(matches!(
            check_i2c_status(addr, 0x0F),
            Err(Error::I2cRequestError { .. })
        ));
    }

    #[test]
    fn test_out_report_uses_wire_address() {
        let addr = I2cAddress::new(0x20).unwrap();
        let report = encode_out_report(addr, &[0x09, 0xA5], 0);
        assert_eq!(report[0], 0x03);
        assert_eq!(report[1], 2);
        assert_eq!(report[2], 0);
        assert_eq!(report[3], 0x40);
        assert_eq!(&report[4..6], &[0x09, 0xA5]);

        let report = encode_out_report(I2cAddress::new(0x7F).unwrap(), &[0x00], 1);
        assert_eq!(report[2], 1);
        assert_eq!(report[3], 0xFE);
    }

    #[test]
    fn test_in_report_copies_read_phase() {
        let addr = I2cAddress::new(0x20).unwrap();
        let mut buffer = [0u8; 2];
        let report = [0x00, 0x01, 0x02, 0x00, 0x12, 0x34];
        parse_in_report(addr, &report, Some(&mut buffer)).unwrap();
        assert_eq!(buffer, [0x12, 0x34]);

        let nack = [consts::i2c::in_flags::NAK_RECEIVED, 0x01, 0x00, 0x00];
        assert!(matches!(
            parse_in_report(addr, &nack, None),
            Err(Error::I2cNack { .. })
        ));
        assert!(matches!(
            parse_in_report(addr, &[0x00, 0x01], None),
            Err(Error::InvalidReport(2))
        ));
    }

    #[test]
    fn test_in_report_short_read_is_error() {
        let addr = I2cAddress::new(0x20).unwrap();
        let mut buffer = [0xEEu8; 2];
        // Chip returned one byte of the two requested.
        let report = [0x00, 0x01, 0x01, 0x00, 0x12, 0x00];
        assert!(matches!(
            parse_in_report(addr, &report, Some(&mut buffer)),
            Err(Error::InvalidReport(6))
        ));
        assert_eq!(buffer, [0xEE, 0xEE]);

        // Length byte claims more than the report carries.
        let report = [0x00, 0x01, 0x02, 0x00, 0x12];
        assert!(matches!(
            parse_in_report(addr, &report, Some(&mut buffer)),
            Err(Error::InvalidReport(5))
        ));
    }
}
