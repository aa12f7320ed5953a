//! # gpio-components
//!
//! One flat pin-number space over a board's own GPIO pins and the pins of
//! MCP23008/MCP23017 I2C port expanders, plus a software PWM generator for pins
//! without PWM hardware.
//!
//! The board is reached through the [`Board`] trait. The crate ships one
//! implementation, [`BridgeBoard`], over a MaxLinear/Exar XR22800/1/2/4 USB
//! bridge: its EDGE interface provides the on-board pins (8 or 32) and its I2C
//! interface is the bus the expanders hang off. Communication uses `hidapi`.
//!
//! ## Features
//!
//! *   Virtual pin controller ([`GpioController`]):
//!     *   Pins 0-63 go to the on-board driver.
//!     *   Expanders are registered at caller-chosen, non-overlapping ranges from 64 up.
//!     *   Process-wide default instance (`install_default`, `get_default`).
//! *   MCP230xx driver ([`Mcp230xx`]):
//!     *   Register-level access with read-back verification.
//!     *   Drive modes Input, InputPullUp, Output. Every input is interrupt-armed.
//!     *   One shared interrupt line fanned out to per-pin edge handlers.
//! *   Software PWM ([`SoftPwm`]) driven by a spin-waiting worker thread.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use gpio_components::{DriveMode, GpioController, GpioLevel, PinEdge, Result, SharingMode};
//!
//! fn main() -> Result<()> {
//!     // env_logger::init();
//!     let controller = GpioController::get_default()?;
//!     let mut controller = controller.lock().unwrap();
//!
//!     // MCP23008 at 0x20, pins 64-71, interrupt output wired to on-board pin 4.
//!     controller.register_mcp23008(64, 0x20, Some(4))?;
//!
//!     let mut led = controller.open_pin(64, SharingMode::Exclusive)?;
//!     led.write(GpioLevel::High)?;
//!
//!     let mut button = controller.open_pin(65, SharingMode::Exclusive)?;
//!     button.set_drive_mode(DriveMode::InputPullUp)?;
//!     button.on_value_changed(Box::new(|edge: PinEdge| println!("Button: {:?}", edge)))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Write verification
//!
//! The expander bus is treated as unreliable. Register writes read the value
//! back, and pin writes and drive-mode changes return `Ok(false)` on mismatch
//! instead of failing; the caller decides whether to retry. See
//! [`ExpanderConfig::reliable`] for automatic retries.
//!
//! ## Concurrency
//!
//! Edge handlers run on the thread that detected the edge: the bridge's edge
//! watcher for on-board pins. Handlers must not block for long. Opening the
//! same physical pin twice is not detected.

pub mod board;
pub mod bridge;
pub mod consts;
pub mod controller;
pub mod device;
mod error;
pub mod gpio;
pub mod i2c;
pub mod interrupt;
pub mod mcp230xx;
pub mod pin;
pub mod pwm;
pub mod register;
pub mod timer;

pub use board::{Board, NativePin};
pub use bridge::{BridgeBoard, GpioPull};
pub use controller::{GpioController, VirtualPinRange};
pub use device::{Capabilities, Xr2280x, XrDeviceDetails, XrDeviceInfo};
pub use error::{Error, Result};
pub use gpio::{DriveMode, EdgeHandler, GpioLevel, GpioPin, PinEdge, SharingMode, SubscriptionId};
pub use i2c::{I2cAddress, I2cDevice};
pub use interrupt::{InterruptLine, InterruptPolarity, InterruptSnapshot, Observers, PinInterrupt};
pub use mcp230xx::{ExpanderConfig, ExpanderState, Mcp230xx, RegisterKind};
pub use pin::{ExpanderPin, OnboardPin, Pin, PinExpander};
pub use pwm::SoftPwm;
pub use register::Register;
pub use timer::HighResolutionTimer;
