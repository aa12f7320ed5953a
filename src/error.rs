use crate::i2c::I2cAddress;
use crate::gpio::DriveMode;
use thiserror::Error;

/// Errors that can occur when opening, configuring or driving pins.
///
/// Write-verification mismatches on the expander bus are not errors:
/// they come back as a `false` from the write call and the caller decides
/// whether to retry.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the underlying HID API layer.
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),
    /// No bridge or bus controller was discovered.
    #[error("Device not found: no XR2280x bridge or I2C controller available")]
    DeviceNotFound,
    /// A discovered interface could not be opened.
    #[error("Device not found at path '{path}': {message}")]
    DeviceNotFoundByPath {
        /// The device path that was opened.
        path: String,
        /// Additional error details.
        message: String,
    },
    /// General I/O error during device communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid or malformed HID report received from the bridge.
    #[error("Invalid HID report received or unexpected size ({0} bytes)")]
    InvalidReport(usize),
    /// A bounded wait ran out of time.
    #[error("Timeout waiting for {0}")]
    Timeout(String),
    /// Function argument (bit position, PWM range or value) is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// Pin index is outside the range of the driver it was handed to.
    #[error("Pin {pin} argument out of range: {message}")]
    PinArgumentOutOfRange {
        /// The invalid pin index.
        pin: u32,
        /// Detailed error message explaining the constraint.
        message: String,
    },
    /// No driver serves this virtual pin number.
    #[error("Pin {0} is not served by the on-board driver or any registered expander")]
    UnsupportedPin(u32),
    /// The pin variant does not support the requested drive mode.
    #[error("Drive mode {mode:?} is not supported by pin {pin}")]
    UnsupportedMode {
        /// Pin number as known to its driver.
        pin: u32,
        /// The rejected drive mode.
        mode: DriveMode,
    },
    /// The pin was opened shared read-only.
    #[error("Pin {0} was opened read-only")]
    ReadOnlyPin(u32),
    /// A virtual pin range collides with one already registered.
    #[error(
        "Pin range {start}..{end} overlaps with the range {existing_start}..{existing_end}",
        end = .start + .width,
        existing_end = .existing_start + .existing_width
    )]
    Overlap {
        /// Start of the rejected range.
        start: u32,
        /// Width of the rejected range.
        width: u32,
        /// Start of the range it collides with.
        existing_start: u32,
        /// Width of the range it collides with.
        existing_width: u32,
    },
    /// The process-wide default controller was already set.
    #[error("The default GPIO controller is already installed")]
    DefaultAlreadyInstalled,
    /// I2C slave device responded with NACK.
    #[error("No device acknowledged at I2C address {address}")]
    I2cNack {
        /// The I2C address that sent the NACK.
        address: I2cAddress,
    },
    /// I2C bus arbitration was lost during the transaction.
    #[error("I2C arbitration lost at address {address}: another master is driving the bus")]
    I2cArbitrationLost {
        /// The I2C address being accessed.
        address: I2cAddress,
    },
    /// I2C bus timeout occurred during the transaction.
    #[error("I2C timeout at address {address}: check device power and pull-ups")]
    I2cTimeout {
        /// The I2C address being accessed.
        address: I2cAddress,
    },
    /// The bridge firmware rejected the request parameters.
    #[error("I2C request error at address {address}: invalid parameters sent to the bridge")]
    I2cRequestError {
        /// The I2C address being accessed.
        address: I2cAddress,
    },
    /// HID feature report operation failed.
    #[error("Feature report error while accessing register 0x{reg_addr:04X}")]
    FeatureReportError {
        /// The bridge register that was being accessed.
        reg_addr: u16,
    },
    /// Requested operation exceeds protocol limits.
    #[error("Requested operation size is too large (max {max}, got {actual})")]
    OperationTooLarge {
        /// Maximum allowed size for this operation.
        max: usize,
        /// Actual size requested.
        actual: usize,
    },
    /// Feature is not available on this bridge model.
    #[error("Feature not supported by this chip model: {0}")]
    UnsupportedFeature(String),
    /// The software PWM worker thread panicked.
    #[error("PWM worker thread panicked")]
    WorkerPanicked,
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn unsupported_bridge_group1() -> Error {
    Error::UnsupportedFeature("GPIO Group 1 (pins 8-31) requires XR22802/XR22804".to_string())
}
