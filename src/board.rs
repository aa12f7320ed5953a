//! Seams to the platform: the on-board GPIO driver and its I2C controller.
//!
//! [`crate::bridge::BridgeBoard`] implements these over an XR2280x USB bridge;
//! anything else (a SoC's sysfs/cdev GPIO, a test double) plugs in the same way.

use crate::error::Result;
use crate::gpio::{DriveMode, EdgeHandler, GpioLevel, SharingMode, SubscriptionId};
use crate::i2c::I2cDevice;
use std::sync::Arc;

/// A platform-native digital pin.
pub trait NativePin: Send {
    /// Pin number as the platform knows it.
    fn pin_number(&self) -> u32;

    fn sharing_mode(&self) -> SharingMode;

    /// Last drive mode set through this handle.
    fn drive_mode(&self) -> DriveMode;

    fn is_drive_mode_supported(&self, mode: DriveMode) -> bool;

    fn set_drive_mode(&mut self, mode: DriveMode) -> Result<()>;

    fn read(&self) -> Result<GpioLevel>;

    fn write(&mut self, level: GpioLevel) -> Result<()>;

    /// Registers `handler` for every edge detected on the pin.
    fn subscribe(&mut self, handler: EdgeHandler) -> Result<SubscriptionId>;

    /// Returns `false` when `id` was not subscribed on this pin.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
}

/// The platform's on-board GPIO controller plus the I2C bus expanders hang off.
pub trait Board: Send + Sync {
    /// Number of on-board pins, counted from 0.
    fn pin_count(&self) -> u32;

    fn open_pin(&self, pin: u32, sharing: SharingMode) -> Result<Box<dyn NativePin>>;

    /// Opens the slave at 7-bit `address`, clocking the bus at `speed_khz`.
    /// Fails with `DeviceNotFound` when the board has no I2C controller.
    fn open_i2c(&self, address: u8, speed_khz: u32) -> Result<Arc<dyn I2cDevice>>;
}
