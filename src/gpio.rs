//! Pin value types shared by every driver in the crate.

use crate::error::{Error, Result};

/// Logic level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpioLevel {
    Low,
    High,
}

impl GpioLevel {
    /// Returns the opposite level.
    #[inline]
    pub fn toggle(self) -> Self {
        match self {
            GpioLevel::Low => GpioLevel::High,
            GpioLevel::High => GpioLevel::Low,
        }
    }

    /// Returns the edge that ends at this level.
    #[inline]
    pub fn edge(self) -> PinEdge {
        match self {
            GpioLevel::High => PinEdge::Rising,
            GpioLevel::Low => PinEdge::Falling,
        }
    }

    #[inline]
    pub(crate) fn from_bit(set: bool) -> Self {
        if set {
            GpioLevel::High
        } else {
            GpioLevel::Low
        }
    }
}

impl From<bool> for GpioLevel {
    fn from(value: bool) -> Self {
        GpioLevel::from_bit(value)
    }
}

impl From<GpioLevel> for bool {
    fn from(value: GpioLevel) -> Self {
        value == GpioLevel::High
    }
}

/// Drive mode of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveMode {
    Input,
    InputPullUp,
    InputPullDown,
    Output,
}

impl DriveMode {
    /// True for every input mode, whatever its pull resistor.
    #[inline]
    pub fn is_input(self) -> bool {
        !matches!(self, DriveMode::Output)
    }
}

/// A detected transition on a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinEdge {
    /// Low to high.
    Rising,
    /// High to low.
    Falling,
}

impl PinEdge {
    /// Level the pin is at after the transition.
    #[inline]
    pub fn level(self) -> GpioLevel {
        match self {
            PinEdge::Rising => GpioLevel::High,
            PinEdge::Falling => GpioLevel::Low,
        }
    }
}

/// How a pin is shared with other openers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharingMode {
    #[default]
    Exclusive,
    SharedReadOnly,
}

/// Callback raised for every edge reported on a pin.
pub type EdgeHandler = Box<dyn Fn(PinEdge) + Send + Sync>;

/// Handle returned by every subscribe call, used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Represents a valid on-board pin number of an XR2280x bridge (0-31).
/// Use `GpioPin::new(num)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin(pub(crate) u8);

impl GpioPin {
    /// Creates a new GpioPin, returning an error if the number is out of range (0-31).
    pub fn new(pin_num: u32) -> Result<Self> {
        if pin_num <= 31 {
            Ok(GpioPin(pin_num as u8))
        } else {
            Err(Error::PinArgumentOutOfRange {
                pin: pin_num,
                message: "Bridge pin number must be 0-31".to_string(),
            })
        }
    }

    #[inline]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Register group (0 or 1) the pin belongs to.
    #[inline]
    pub fn group_index(&self) -> u8 {
        self.0 / 16
    }

    /// Bit mask within the group's 16-bit register.
    #[inline]
    pub fn mask(&self) -> u16 {
        1u16 << (self.0 % 16)
    }
}
