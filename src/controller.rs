//! The virtual pin controller: one flat pin-number space over the on-board
//! driver and any number of registered expanders.
//!
//! Numbers below 64 always go to the on-board driver. Everything else is
//! looked up in the registered expander ranges.

use crate::board::Board;
use crate::bridge::BridgeBoard;
use crate::consts;
use crate::error::{Error, Result};
use crate::gpio::SharingMode;
use crate::interrupt::{InterruptLine, InterruptPolarity};
use crate::mcp230xx::{
    ExpanderConfig, Mcp230xx, MCP23008_INTERRUPT_POLARITY, MCP23017_INTERRUPT_POLARITY,
};
use crate::pin::{OnboardPin, Pin, PinExpander};
use crate::pwm::SoftPwm;
use log::{debug, info};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

static DEFAULT_CONTROLLER: OnceLock<Mutex<GpioController>> = OnceLock::new();

/// A block of virtual pin numbers served by one expander.
pub struct VirtualPinRange {
    start: u32,
    width: u32,
    expander: Arc<dyn PinExpander>,
}

impl VirtualPinRange {
    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// One past the last pin number.
    pub fn end(&self) -> u32 {
        self.start + self.width
    }

    pub fn contains(&self, pin: u32) -> bool {
        pin >= self.start && pin < self.end()
    }
}

impl fmt::Debug for VirtualPinRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPinRange({}..{})", self.start, self.end())
    }
}

/// Routes virtual pin numbers to the on-board driver or a registered expander.
///
/// Registration and opening take no locks of their own: callers that share a
/// controller between threads wrap it in a `Mutex`, as the process-wide
/// default does.
pub struct GpioController {
    board: Arc<dyn Board>,
    ranges: Vec<VirtualPinRange>,
    expander_config: ExpanderConfig,
}

impl fmt::Debug for GpioController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpioController")
            .field("onboard_pins", &self.board.pin_count())
            .field("ranges", &self.ranges)
            .field("expander_config", &self.expander_config)
            .finish()
    }
}

impl GpioController {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self::with_expander_config(board, ExpanderConfig::default())
    }

    /// Creates a controller whose `register_mcp*` calls use `config`.
    pub fn with_expander_config(board: Arc<dyn Board>, config: ExpanderConfig) -> Self {
        GpioController {
            board,
            ranges: Vec::new(),
            expander_config: config,
        }
    }

    pub fn board(&self) -> &Arc<dyn Board> {
        &self.board
    }

    pub fn expander_config(&self) -> &ExpanderConfig {
        &self.expander_config
    }

    pub fn set_expander_config(&mut self, config: ExpanderConfig) {
        self.expander_config = config;
    }

    /// Makes `controller` the process-wide default.
    ///
    /// Fails with `DefaultAlreadyInstalled` once a default exists, including one
    /// built lazily by [`GpioController::get_default`].
    pub fn install_default(controller: GpioController) -> Result<()> {
        DEFAULT_CONTROLLER
            .set(Mutex::new(controller))
            .map_err(|_| Error::DefaultAlreadyInstalled)
    }

    /// The process-wide default controller, built over the first XR2280x bridge
    /// on first use unless one was installed.
    pub fn get_default() -> Result<&'static Mutex<GpioController>> {
        if let Some(controller) = DEFAULT_CONTROLLER.get() {
            return Ok(controller);
        }
        let board = BridgeBoard::open_first()?;
        info!("Default GPIO controller created over the first XR2280x bridge");
        // A concurrent first call may win the race; its controller is kept.
        Ok(DEFAULT_CONTROLLER.get_or_init(|| Mutex::new(GpioController::new(Arc::new(board)))))
    }

    /// Opens virtual pin `pin`.
    ///
    /// Fails with `UnsupportedPin` when neither the on-board driver nor a
    /// registered expander serves the number.
    pub fn open_pin(&self, pin: u32, sharing: SharingMode) -> Result<Pin> {
        if pin < consts::ONBOARD_PIN_RESERVE {
            return Ok(Pin::Onboard(OnboardPin::new(
                self.board.open_pin(pin, sharing)?,
            )));
        }
        let range = self
            .ranges
            .iter()
            .find(|range| range.contains(pin))
            .ok_or(Error::UnsupportedPin(pin))?;
        debug!("Opening virtual pin {} on {:?}", pin, range);
        Arc::clone(&range.expander).open_pin(pin - range.start)
    }

    /// Checks `[start, start + width)` against the on-board reserve and every
    /// registered range.
    fn check_range(&self, start: u32, width: u32) -> Result<()> {
        let end = start.checked_add(width).ok_or_else(|| {
            Error::ArgumentOutOfRange(format!("Pin range {}+{} overflows", start, width))
        })?;
        if start < consts::ONBOARD_PIN_RESERVE {
            return Err(Error::Overlap {
                start,
                width,
                existing_start: 0,
                existing_width: consts::ONBOARD_PIN_RESERVE,
            });
        }
        for range in &self.ranges {
            let new_inside_existing = start >= range.start && start < range.end();
            let existing_inside_new = range.start >= start && range.start < end;
            if new_inside_existing || existing_inside_new {
                return Err(Error::Overlap {
                    start,
                    width,
                    existing_start: range.start,
                    existing_width: range.width,
                });
            }
        }
        Ok(())
    }

    /// Maps `expander`'s pins to `start..start + expander.pin_count()`.
    ///
    /// Fails with `Overlap` if the range intersects the on-board reserve or a
    /// registered range; the registry is left unchanged.
    pub fn register_expander(&mut self, start: u32, expander: Arc<dyn PinExpander>) -> Result<()> {
        let width = expander.pin_count();
        self.check_range(start, width)?;
        debug!("Registered expander at pins {}..{}", start, start + width);
        self.ranges.push(VirtualPinRange {
            start,
            width,
            expander,
        });
        Ok(())
    }

    /// `(start, width)` of every registered range, in registration order.
    pub fn registered_ranges(&self) -> Vec<(u32, u32)> {
        self.ranges.iter().map(|r| (r.start, r.width)).collect()
    }

    fn open_interrupt_line(
        &self,
        interrupt_pin: Option<u32>,
        polarity: InterruptPolarity,
    ) -> Result<Option<Arc<InterruptLine>>> {
        interrupt_pin
            .map(|number| {
                let pin = self.open_pin(number, SharingMode::Exclusive)?;
                InterruptLine::new(pin, polarity)
            })
            .transpose()
    }

    /// Initialises an MCP23008 at `slave_address` and maps it to `start..start + 8`.
    pub fn register_mcp23008(
        &mut self,
        start: u32,
        slave_address: u8,
        interrupt_pin: Option<u32>,
    ) -> Result<Arc<Mcp230xx>> {
        let width = consts::mcp230xx::BANK_PIN_COUNT;
        self.check_range(start, width)?;

        let bus = self
            .board
            .open_i2c(slave_address, self.expander_config.bus_speed_khz)?;
        let line = self.open_interrupt_line(interrupt_pin, MCP23008_INTERRUPT_POLARITY)?;
        let expander = Mcp230xx::mcp23008(bus, line, self.expander_config.clone())?;
        self.register_expander(start, Arc::clone(&expander) as Arc<dyn PinExpander>)?;
        Ok(expander)
    }

    /// Initialises an MCP23017 at `slave_address`; bank A maps to `start..start + 8`
    /// and bank B to `start + 8..start + 16`.
    pub fn register_mcp23017(
        &mut self,
        start: u32,
        slave_address: u8,
        interrupt_pin: Option<u32>,
    ) -> Result<[Arc<Mcp230xx>; 2]> {
        let width = consts::mcp230xx::BANK_PIN_COUNT;
        self.check_range(start, width * 2)?;

        let bus = self
            .board
            .open_i2c(slave_address, self.expander_config.bus_speed_khz)?;
        let line = self.open_interrupt_line(interrupt_pin, MCP23017_INTERRUPT_POLARITY)?;
        let banks = Mcp230xx::mcp23017(bus, line, self.expander_config.clone())?;
        for (offset, bank) in [0, width].into_iter().zip(&banks) {
            self.register_expander(start + offset, Arc::clone(bank) as Arc<dyn PinExpander>)?;
        }
        Ok(banks)
    }

    /// Opens `pin` exclusively and hands it to a new software PWM channel.
    pub fn open_soft_pwm(&self, pin: u32, range: u32) -> Result<SoftPwm> {
        SoftPwm::new(self.open_pin(pin, SharingMode::Exclusive)?, range)
    }
}
