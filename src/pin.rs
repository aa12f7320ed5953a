//! The common pin type handed out by the controller.

use crate::board::NativePin;
use crate::consts;
use crate::error::{Error, Result};
use crate::gpio::{DriveMode, EdgeHandler, GpioLevel, PinEdge, SharingMode, SubscriptionId};
use crate::interrupt::{InterruptSnapshot, Observers};
use crate::mcp230xx::Mcp230xx;
use log::{trace, warn};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A chip that exposes a fixed number of pins, addressed by local index.
pub trait PinExpander: Send + Sync {
    fn pin_count(&self) -> u32;

    /// Opens local pin `pin` (0-based).
    fn open_pin(self: Arc<Self>, pin: u32) -> Result<Pin>;
}

impl PinExpander for Mcp230xx {
    fn pin_count(&self) -> u32 {
        Mcp230xx::pin_count(self)
    }

    fn open_pin(self: Arc<Self>, pin: u32) -> Result<Pin> {
        Ok(Pin::Expander(ExpanderPin::new(self, pin)?))
    }
}

/// A digital pin, on-board or on an expander.
///
/// Each open call creates a new `Pin`; opening the same physical pin twice is
/// not detected.
pub enum Pin {
    Onboard(OnboardPin),
    Expander(ExpanderPin),
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Onboard(pin) => f
                .debug_struct("OnboardPin")
                .field("pin", &pin.native.pin_number())
                .field("drive_mode", &pin.native.drive_mode())
                .finish(),
            Pin::Expander(pin) => f
                .debug_struct("ExpanderPin")
                .field("expander", &pin.expander.name())
                .field("pin", &pin.index)
                .field("drive_mode", &pin.drive_mode)
                .finish(),
        }
    }
}

impl Pin {
    /// Pin number as known to its driver: the platform number on-board, the
    /// local index (0-7) on an expander.
    pub fn pin_number(&self) -> u32 {
        match self {
            Pin::Onboard(pin) => pin.native.pin_number(),
            Pin::Expander(pin) => pin.index as u32,
        }
    }

    pub fn sharing_mode(&self) -> SharingMode {
        match self {
            Pin::Onboard(pin) => pin.native.sharing_mode(),
            Pin::Expander(_) => SharingMode::Exclusive,
        }
    }

    pub fn drive_mode(&self) -> DriveMode {
        match self {
            Pin::Onboard(pin) => pin.native.drive_mode(),
            Pin::Expander(pin) => pin.drive_mode,
        }
    }

    pub fn is_drive_mode_supported(&self, mode: DriveMode) -> bool {
        match self {
            Pin::Onboard(pin) => pin.native.is_drive_mode_supported(mode),
            Pin::Expander(_) => ExpanderPin::SUPPORTED_DRIVE_MODES.contains(&mode),
        }
    }

    /// Sets the drive mode. Fails with `UnsupportedMode` for a mode outside
    /// this pin's supported set.
    ///
    /// Returns `Ok(false)` when an expander register write did not verify.
    pub fn set_drive_mode(&mut self, mode: DriveMode) -> Result<bool> {
        if !self.is_drive_mode_supported(mode) {
            return Err(Error::UnsupportedMode {
                pin: self.pin_number(),
                mode,
            });
        }
        match self {
            Pin::Onboard(pin) => pin.native.set_drive_mode(mode).map(|()| true),
            Pin::Expander(pin) => pin.set_drive_mode(mode),
        }
    }

    pub fn read(&self) -> Result<GpioLevel> {
        match self {
            Pin::Onboard(pin) => pin.native.read(),
            Pin::Expander(pin) => pin.expander.read_pin(pin.index),
        }
    }

    /// Drives the pin. Returns `Ok(false)` when an expander write did not verify.
    pub fn write(&mut self, level: GpioLevel) -> Result<bool> {
        match self {
            Pin::Onboard(pin) => pin.native.write(level).map(|()| true),
            Pin::Expander(pin) => pin.expander.write_pin(pin.index, level),
        }
    }

    /// Registers `handler` for every edge on this pin.
    pub fn on_value_changed(&mut self, handler: EdgeHandler) -> Result<SubscriptionId> {
        match self {
            Pin::Onboard(pin) => pin.native.subscribe(handler),
            Pin::Expander(pin) => Ok(pin
                .observers
                .subscribe(move |edge: &PinEdge| handler(*edge))),
        }
    }

    /// Returns `false` when `id` was not registered on this pin.
    pub fn remove_handler(&mut self, id: SubscriptionId) -> bool {
        match self {
            Pin::Onboard(pin) => pin.native.unsubscribe(id),
            Pin::Expander(pin) => pin.observers.unsubscribe(id),
        }
    }

    /// Polls the pin until it reads `level`.
    ///
    /// Fails with `Timeout` after `timeout`, or after 4 s when `None`.
    pub fn wait_for(&self, level: GpioLevel, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(consts::DEFAULT_WAIT_TIMEOUT);
        let deadline = Instant::now() + timeout;
        while self.read()? != level {
            if Instant::now() > deadline {
                return Err(Error::Timeout(format!(
                    "pin {} to read {:?} ({:?})",
                    self.pin_number(),
                    level,
                    timeout
                )));
            }
        }
        Ok(())
    }
}

/// A pin served directly by the platform.
pub struct OnboardPin {
    native: Box<dyn NativePin>,
}

impl OnboardPin {
    pub fn new(native: Box<dyn NativePin>) -> Self {
        OnboardPin { native }
    }
}

/// A pin on one bank of an MCP230xx.
///
/// Receives every snapshot its bank captures and raises an edge only when the
/// snapshot flags its own index.
pub struct ExpanderPin {
    expander: Arc<Mcp230xx>,
    index: u8,
    drive_mode: DriveMode,
    observers: Arc<Observers<PinEdge>>,
    subscription: SubscriptionId,
}

impl ExpanderPin {
    pub const SUPPORTED_DRIVE_MODES: [DriveMode; 3] =
        [DriveMode::Input, DriveMode::InputPullUp, DriveMode::Output];

    /// Opens local pin `pin` and drives it as a low output.
    pub fn new(expander: Arc<Mcp230xx>, pin: u32) -> Result<Self> {
        if pin >= expander.pin_count() {
            return Err(Error::PinArgumentOutOfRange {
                pin,
                message: format!("{} has {} pins", expander.name(), expander.pin_count()),
            });
        }
        let index = pin as u8;
        let observers = Arc::new(Observers::<PinEdge>::new());
        let fanout = Arc::clone(&observers);
        let subscription = expander.subscribe(move |snapshot: &InterruptSnapshot| {
            match snapshot.decode(index) {
                Ok(interrupt) if interrupt.occurred => {
                    trace!("Expander pin {} {:?}", index, interrupt.edge);
                    fanout.notify(&interrupt.edge);
                }
                Ok(_) => {}
                Err(e) => warn!("Expander pin {}: {}", index, e),
            }
        });
        let mut pin = ExpanderPin {
            expander,
            index,
            drive_mode: DriveMode::Output,
            observers,
            subscription,
        };
        let mut verified = pin.set_drive_mode(DriveMode::Output)?;
        verified &= pin.expander.write_pin(index, GpioLevel::Low)?;
        if !verified {
            warn!(
                "{} pin {}: initial output state could not be verified",
                pin.expander.name(),
                index
            );
        }
        Ok(pin)
    }

    fn set_drive_mode(&mut self, mode: DriveMode) -> Result<bool> {
        let verified = self.expander.set_drive_mode(self.index, mode)?;
        self.drive_mode = mode;
        Ok(verified)
    }

    pub fn expander(&self) -> &Arc<Mcp230xx> {
        &self.expander
    }
}

impl Drop for ExpanderPin {
    fn drop(&mut self) {
        self.expander.unsubscribe(self.subscription);
    }
}
