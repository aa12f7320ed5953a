//! MCP23008 / MCP23017 I2C port expander driver.
//!
//! Each instance drives one 8-pin bank. The single-bank MCP23008 lays its
//! eleven registers out back to back; the dual-bank MCP23017 interleaves the
//! A and B registers, so each bank sees a stride of two.

use crate::consts::mcp230xx::{self as mcp, iocon};
use crate::error::{Error, Result};
use crate::gpio::{DriveMode, GpioLevel, PinEdge, SubscriptionId};
use crate::i2c::I2cDevice;
use crate::interrupt::{InterruptLine, InterruptPolarity, InterruptSnapshot, Observers};
use crate::register::Register;
use log::{debug, trace, warn};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// Interrupt polarity the MCP23008 is configured with when the caller has no preference.
pub const MCP23008_INTERRUPT_POLARITY: InterruptPolarity = InterruptPolarity::ActiveHigh;
/// Interrupt polarity the MCP23017 is configured with when the caller has no preference.
pub const MCP23017_INTERRUPT_POLARITY: InterruptPolarity = InterruptPolarity::ActiveLow;

/// The eleven registers of a bank, in address order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    /// I/O direction, 1 = input.
    Iodir,
    /// Input polarity.
    Ipol,
    /// Interrupt-on-change enable.
    Gpinten,
    /// Default compare value for interrupt-on-change.
    Defval,
    /// Interrupt control, 0 = compare against previous value.
    Intcon,
    /// Chip configuration.
    Iocon,
    /// Pull-up enable.
    Gppu,
    /// Interrupt flags.
    Intf,
    /// Port value captured at interrupt time.
    Intcap,
    /// Port value.
    Gpio,
    /// Output latch.
    Olat,
}

impl RegisterKind {
    pub const ALL: [RegisterKind; mcp::REGISTER_COUNT] = [
        RegisterKind::Iodir,
        RegisterKind::Ipol,
        RegisterKind::Gpinten,
        RegisterKind::Defval,
        RegisterKind::Intcon,
        RegisterKind::Iocon,
        RegisterKind::Gppu,
        RegisterKind::Intf,
        RegisterKind::Intcap,
        RegisterKind::Gpio,
        RegisterKind::Olat,
    ];

    /// Position in the register map.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Bus and write-retry settings applied to every expander a controller registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpanderConfig {
    /// I2C clock in kHz (1-400).
    pub bus_speed_khz: u32,
    /// Extra attempts for a bit write whose read-back did not match.
    pub write_retries: u32,
    /// Pause before each retry.
    pub retry_delay: Duration,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            bus_speed_khz: 400,
            write_retries: 0,
            retry_delay: Duration::from_millis(10),
        }
    }
}

impl ExpanderConfig {
    /// Retries mismatched writes, for long or noisy bus wiring.
    pub fn reliable() -> Self {
        Self {
            write_retries: 3,
            retry_delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    /// 100 kHz standard-mode bus clock.
    pub fn standard_mode() -> Self {
        Self {
            bus_speed_khz: 100,
            ..Default::default()
        }
    }
}

/// All eleven registers of a bank, read one after another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpanderState {
    pub iodir: u8,
    pub ipol: u8,
    pub gpinten: u8,
    pub defval: u8,
    pub intcon: u8,
    pub iocon: u8,
    pub gppu: u8,
    pub intf: u8,
    pub intcap: u8,
    pub gpio: u8,
    pub olat: u8,
}

impl ExpanderState {
    fn from_registers(values: [u8; mcp::REGISTER_COUNT]) -> Self {
        let [iodir, ipol, gpinten, defval, intcon, iocon, gppu, intf, intcap, gpio, olat] = values;
        ExpanderState {
            iodir,
            ipol,
            gpinten,
            defval,
            intcon,
            iocon,
            gppu,
            intf,
            intcap,
            gpio,
            olat,
        }
    }

    /// True when every pin configured as input has interrupt-on-change enabled.
    pub fn inputs_armed(&self) -> bool {
        self.iodir & !self.gpinten == 0
    }
}

struct BankLayout {
    name: &'static str,
    base: u8,
    stride: u8,
    mirror: bool,
}

/// One 8-pin bank of an MCP230xx expander.
pub struct Mcp230xx {
    name: &'static str,
    registers: [Register; mcp::REGISTER_COUNT],
    config: ExpanderConfig,
    polarity: InterruptPolarity,
    observers: Observers<InterruptSnapshot>,
    line: Option<(Arc<InterruptLine>, SubscriptionId)>,
}

impl fmt::Debug for Mcp230xx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mcp230xx")
            .field("name", &self.name)
            .field("base", &self.register_address(RegisterKind::Iodir))
            .field("polarity", &self.polarity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Mcp230xx {
    /// Initialises a single-bank MCP23008 behind `bus`.
    ///
    /// With a `line`, the chip's interrupt output is programmed to the line's
    /// polarity and the bank starts servicing interrupts.
    pub fn mcp23008(
        bus: Arc<dyn I2cDevice>,
        line: Option<Arc<InterruptLine>>,
        config: ExpanderConfig,
    ) -> Result<Arc<Self>> {
        let layout = BankLayout {
            name: "MCP23008",
            base: 0x00,
            stride: mcp::MCP23008_STRIDE,
            mirror: false,
        };
        Self::new_bank(layout, bus, line, MCP23008_INTERRUPT_POLARITY, config)
    }

    /// Initialises both banks (A, B) of an MCP23017 behind `bus`, sharing `line`.
    ///
    /// Interrupt mirroring is enabled so either bank's interrupt shows on the line.
    pub fn mcp23017(
        bus: Arc<dyn I2cDevice>,
        line: Option<Arc<InterruptLine>>,
        config: ExpanderConfig,
    ) -> Result<[Arc<Self>; 2]> {
        let [base_a, base_b] = mcp::MCP23017_BANK_BASES;
        let bank_a = Self::new_bank(
            BankLayout {
                name: "MCP23017/A",
                base: base_a,
                stride: mcp::MCP23017_STRIDE,
                mirror: true,
            },
            Arc::clone(&bus),
            line.clone(),
            MCP23017_INTERRUPT_POLARITY,
            config.clone(),
        )?;
        let bank_b = Self::new_bank(
            BankLayout {
                name: "MCP23017/B",
                base: base_b,
                stride: mcp::MCP23017_STRIDE,
                mirror: true,
            },
            bus,
            line,
            MCP23017_INTERRUPT_POLARITY,
            config,
        )?;
        Ok([bank_a, bank_b])
    }

    fn new_bank(
        layout: BankLayout,
        bus: Arc<dyn I2cDevice>,
        line: Option<Arc<InterruptLine>>,
        default_polarity: InterruptPolarity,
        config: ExpanderConfig,
    ) -> Result<Arc<Self>> {
        let registers = std::array::from_fn(|i| {
            Register::new(Arc::clone(&bus), layout.base + i as u8 * layout.stride)
        });
        let polarity = line.as_ref().map_or(default_polarity, |l| l.polarity());

        let mut bank = Mcp230xx {
            name: layout.name,
            registers,
            config,
            polarity,
            observers: Observers::new(),
            line: None,
        };
        bank.initialize(layout.mirror)?;

        let name = bank.name;
        Ok(Arc::new_cyclic(|weak: &Weak<Mcp230xx>| {
            bank.line = line.map(|line| {
                let weak = weak.clone();
                let id = line.subscribe(move |edge: &PinEdge| {
                    if let Some(bank) = weak.upgrade() {
                        bank.handle_edge(*edge);
                    }
                });
                debug!("{} listening on interrupt pin {}", name, line.pin_number());
                (line, id)
            });
            bank
        }))
    }

    /// All pins output and low, no interrupts armed, compare against previous value.
    fn initialize(&self, mirror: bool) -> Result<()> {
        debug!(
            "Initializing {} (base 0x{:02X}, {:?})",
            self.name,
            self.register_address(RegisterKind::Iodir),
            self.polarity
        );
        let mut verified = true;
        for kind in [
            RegisterKind::Iodir,
            RegisterKind::Gpio,
            RegisterKind::Olat,
            RegisterKind::Intcon,
            RegisterKind::Gpinten,
        ] {
            verified &= self.register(kind).write(0x00)?;
        }
        verified &= self.write_bit(
            RegisterKind::Iocon,
            iocon::INTPOL,
            self.polarity == InterruptPolarity::ActiveHigh,
        )?;
        if mirror {
            verified &= self.write_bit(RegisterKind::Iocon, iocon::MIRROR, true)?;
        }
        if !verified {
            warn!("{}: initial register state could not be verified", self.name);
        }
        Ok(())
    }

    #[inline]
    fn register(&self, kind: RegisterKind) -> &Register {
        &self.registers[kind.index()]
    }

    /// Bus address of register `kind` in this bank.
    pub fn register_address(&self, kind: RegisterKind) -> u8 {
        self.register(kind).address()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pin_count(&self) -> u32 {
        mcp::BANK_PIN_COUNT
    }

    pub fn config(&self) -> &ExpanderConfig {
        &self.config
    }

    pub fn interrupt_polarity(&self) -> InterruptPolarity {
        self.polarity
    }

    /// Reads register `kind`.
    pub fn read_register(&self, kind: RegisterKind) -> Result<u8> {
        self.register(kind).read()
    }

    /// Reads all eleven registers.
    pub fn state(&self) -> Result<ExpanderState> {
        let mut values = [0u8; mcp::REGISTER_COUNT];
        for (value, register) in values.iter_mut().zip(&self.registers) {
            *value = register.read()?;
        }
        Ok(ExpanderState::from_registers(values))
    }

    pub fn interrupt_mirror_enabled(&self) -> Result<bool> {
        self.register(RegisterKind::Iocon).read_bit(iocon::MIRROR)
    }

    pub fn set_interrupt_mirror(&self, enabled: bool) -> Result<bool> {
        self.write_bit(RegisterKind::Iocon, iocon::MIRROR, enabled)
    }

    fn check_pin(pin: u8) -> Result<()> {
        if (pin as u32) < mcp::BANK_PIN_COUNT {
            Ok(())
        } else {
            Err(Error::PinArgumentOutOfRange {
                pin: pin as u32,
                message: "Expander pin index must be 0-7".to_string(),
            })
        }
    }

    /// Bit write with up to `write_retries` extra attempts on mismatch.
    fn write_bit(&self, kind: RegisterKind, pos: u8, set: bool) -> Result<bool> {
        let register = self.register(kind);
        for attempt in 0..=self.config.write_retries {
            if attempt > 0 {
                debug!(
                    "{}: retrying {:?} bit {} (attempt {})",
                    self.name,
                    kind,
                    pos,
                    attempt + 1
                );
                thread::sleep(self.config.retry_delay);
            }
            if register.write_bit(pos, set)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Configures local `pin` (0-7).
    ///
    /// The chip has no pull-down resistors, so `InputPullDown` fails with
    /// `UnsupportedMode`. Every input mode arms interrupt-on-change for the pin.
    /// Returns `Ok(false)` when a register write did not verify.
    pub fn set_drive_mode(&self, pin: u8, mode: DriveMode) -> Result<bool> {
        Self::check_pin(pin)?;
        if mode == DriveMode::InputPullDown {
            return Err(Error::UnsupportedMode {
                pin: pin as u32,
                mode,
            });
        }
        debug!("{}: pin {} -> {:?}", self.name, pin, mode);
        let input = mode.is_input();
        let mut verified = self.write_bit(RegisterKind::Iodir, pin, input)?;
        verified &= self.write_bit(RegisterKind::Gppu, pin, mode == DriveMode::InputPullUp)?;
        if input {
            verified &= self.write_bit(RegisterKind::Gpinten, pin, true)?;
        }
        Ok(verified)
    }

    /// Drives local `pin` through the GPIO register.
    pub fn write_pin(&self, pin: u8, level: GpioLevel) -> Result<bool> {
        Self::check_pin(pin)?;
        self.write_bit(RegisterKind::Gpio, pin, level.into())
    }

    pub fn read_pin(&self, pin: u8) -> Result<GpioLevel> {
        Self::check_pin(pin)?;
        Ok(self.register(RegisterKind::Gpio).read_bit(pin)?.into())
    }

    /// Registers `handler` for every interrupt snapshot this bank captures.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&InterruptSnapshot) + Send + Sync + 'static,
    {
        self.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Reads the pending interrupt, if any, and fans it out to subscribers.
    ///
    /// Returns `Ok(None)` when no pin is armed or no flag is set. Usable without
    /// an interrupt line, by polling.
    pub fn poll_interrupt(&self) -> Result<Option<InterruptSnapshot>> {
        let snapshot = self.capture_interrupt()?;
        if let Some(snapshot) = &snapshot {
            trace!("{}: {:?}", self.name, snapshot);
            self.observers.notify(snapshot);
        }
        Ok(snapshot)
    }

    fn capture_interrupt(&self) -> Result<Option<InterruptSnapshot>> {
        if self.read_register(RegisterKind::Gpinten)? == 0x00 {
            return Ok(None);
        }
        let interrupt_flags = self.read_register(RegisterKind::Intf)?;
        if interrupt_flags == 0x00 {
            return Ok(None);
        }
        let captured_values = self.read_register(RegisterKind::Intcap)?;
        let current_values = self.read_register(RegisterKind::Gpio)?;
        Ok(Some(InterruptSnapshot::new(
            interrupt_flags,
            captured_values,
            current_values,
        )))
    }

    fn handle_edge(&self, edge: PinEdge) {
        if edge != self.polarity.active_edge() {
            return;
        }
        match self.poll_interrupt() {
            Ok(Some(_)) => {}
            Ok(None) => trace!("{}: spurious interrupt ignored", self.name),
            Err(e) => warn!("{}: interrupt dropped: {}", self.name, e),
        }
    }
}

impl Drop for Mcp230xx {
    fn drop(&mut self) {
        if let Some((line, id)) = self.line.take() {
            line.unsubscribe(id);
        }
    }
}
