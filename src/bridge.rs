//! On-board pins of an XR2280x bridge, exposed through the [`Board`] seam.

use crate::board::{Board, NativePin};
use crate::consts;
use crate::device::Xr2280x;
use crate::error::{self, Error, Result};
use crate::gpio::{DriveMode, EdgeHandler, GpioLevel, GpioPin, PinEdge, SharingMode, SubscriptionId};
use crate::i2c::{BridgeI2c, I2cAddress, I2cDevice};
use crate::interrupt::Observers;
use hidapi::HidApi;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pull resistor setting of a bridge pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioPull {
    None,
    Up,
    Down,
}

impl Xr2280x {
    #[inline]
    fn group_register(pin: GpioPin, reg0: u16) -> u16 {
        reg0 + pin.group_index() as u16 * consts::edge::GROUP1_OFFSET
    }

    #[inline]
    fn check_gpio_pin_support(&self, pin: GpioPin) -> Result<()> {
        if pin.number() >= self.get_capabilities().gpio_count {
            Err(error::unsupported_bridge_group1())
        } else {
            Ok(())
        }
    }

    /// Read-modify-write of one pin's bit; skips the write when nothing changes.
    fn update_pin_bit(&self, pin: GpioPin, reg0: u16, set: bool) -> Result<()> {
        let reg = Self::group_register(pin, reg0);
        let current = self.read_edge_register(reg)?;
        let new = if set {
            current | pin.mask()
        } else {
            current & !pin.mask()
        };
        if new != current {
            trace!(
                "Reg 0x{:04X} pin {}: 0x{:04X} -> 0x{:04X}",
                reg,
                pin.number(),
                current,
                new
            );
            self.write_edge_register(reg, new)?;
        }
        Ok(())
    }

    /// Hands a pin to the EDGE controller.
    pub fn gpio_assign_to_edge(&self, pin: GpioPin) -> Result<()> {
        self.check_gpio_pin_support(pin)?;
        self.update_pin_bit(pin, consts::edge::REG_FUNC_SEL_0, true)
    }

    pub fn gpio_set_output(&self, pin: GpioPin, output: bool) -> Result<()> {
        self.check_gpio_pin_support(pin)?;
        debug!("Setting EDGE_DIR pin {}: output={}", pin.number(), output);
        self.update_pin_bit(pin, consts::edge::REG_DIR_0, output)
    }

    pub fn gpio_set_pull(&self, pin: GpioPin, pull: GpioPull) -> Result<()> {
        self.check_gpio_pin_support(pin)?;
        debug!("Setting EDGE Pull pin {}: {:?}", pin.number(), pull);
        // Clear the opposite resistor first so both are never enabled together.
        match pull {
            GpioPull::Up => {
                self.update_pin_bit(pin, consts::edge::REG_PULL_DOWN_0, false)?;
                self.update_pin_bit(pin, consts::edge::REG_PULL_UP_0, true)
            }
            GpioPull::Down => {
                self.update_pin_bit(pin, consts::edge::REG_PULL_UP_0, false)?;
                self.update_pin_bit(pin, consts::edge::REG_PULL_DOWN_0, true)
            }
            GpioPull::None => {
                self.update_pin_bit(pin, consts::edge::REG_PULL_UP_0, false)?;
                self.update_pin_bit(pin, consts::edge::REG_PULL_DOWN_0, false)
            }
        }
    }

    pub fn gpio_write(&self, pin: GpioPin, level: GpioLevel) -> Result<()> {
        self.check_gpio_pin_support(pin)?;
        let reg0 = match level {
            GpioLevel::High => consts::edge::REG_SET_0,
            GpioLevel::Low => consts::edge::REG_CLEAR_0,
        };
        let reg = Self::group_register(pin, reg0);
        trace!("EDGE pin {} {:?} (reg 0x{:04X})", pin.number(), level, reg);
        self.write_edge_register(reg, pin.mask())
    }

    pub fn gpio_read(&self, pin: GpioPin) -> Result<GpioLevel> {
        self.check_gpio_pin_support(pin)?;
        let reg = Self::group_register(pin, consts::edge::REG_STATE_0);
        let value = self.read_edge_register(reg)?;
        Ok(GpioLevel::from_bit(value & pin.mask() != 0))
    }

    /// Enables or disables interrupt generation on both edges of a pin.
    pub fn gpio_configure_interrupt(&self, pin: GpioPin, enable: bool) -> Result<()> {
        self.check_gpio_pin_support(pin)?;
        debug!("Configuring EDGE interrupt pin {}: enable={}", pin.number(), enable);
        self.update_pin_bit(pin, consts::edge::REG_INTR_MASK_0, enable)?;
        self.update_pin_bit(pin, consts::edge::REG_INTR_POS_EDGE_0, enable)?;
        self.update_pin_bit(pin, consts::edge::REG_INTR_NEG_EDGE_0, enable)
    }

    /// Waits up to `timeout_ms` for an EDGE interrupt report and returns the
    /// pin levels it carries (bit n = pin n). `None` on timeout.
    pub fn read_gpio_interrupt_levels(&self, timeout_ms: i32) -> Result<Option<u32>> {
        let mut buffer = [0u8; consts::edge::INTERRUPT_REPORT_SIZE];
        let size = self
            .lock(self.edge_interface()?)
            .read_timeout(&mut buffer, timeout_ms)?;
        if size == 0 {
            return Ok(None);
        }
        trace!("Received interrupt report: {:02X?}", &buffer[..size]);
        parse_interrupt_levels(&buffer[..size]).map(Some)
    }
}

/// The report starts with the current state of group 0 and group 1, little endian.
fn parse_interrupt_levels(report: &[u8]) -> Result<u32> {
    if report.len() < 4 {
        return Err(Error::InvalidReport(report.len()));
    }
    let group0 = u16::from_le_bytes([report[0], report[1]]) as u32;
    let group1 = u16::from_le_bytes([report[2], report[3]]) as u32;
    Ok(group0 | (group1 << 16))
}

/// Background thread turning EDGE interrupt reports into per-pin edges.
struct EdgeWatcher {
    bridge: Arc<Xr2280x>,
    pins: Mutex<HashMap<u8, WatchedPin>>,
    stop: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct WatchedPin {
    last: GpioLevel,
    observers: Arc<Observers<PinEdge>>,
}

impl EdgeWatcher {
    fn new(bridge: Arc<Xr2280x>) -> Arc<Self> {
        Arc::new(EdgeWatcher {
            bridge,
            pins: Mutex::new(HashMap::new()),
            stop: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    fn pins(&self) -> MutexGuard<'_, HashMap<u8, WatchedPin>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the observer list of `pin`, arming its interrupt on first use.
    fn watch(self: &Arc<Self>, pin: GpioPin) -> Result<Arc<Observers<PinEdge>>> {
        if let Some(watched) = self.pins().get(&pin.number()) {
            return Ok(Arc::clone(&watched.observers));
        }
        self.bridge.gpio_configure_interrupt(pin, true)?;
        let last = self.bridge.gpio_read(pin)?;
        let observers = Arc::clone(
            &self
                .pins()
                .entry(pin.number())
                .or_insert_with(|| WatchedPin {
                    last,
                    observers: Arc::new(Observers::new()),
                })
                .observers,
        );
        self.ensure_running()?;
        Ok(observers)
    }

    fn ensure_running(self: &Arc<Self>) -> Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        *handle = Some(
            thread::Builder::new()
                .name("gpio-edge-watcher".to_string())
                .spawn(move || Self::run(weak))?,
        );
        debug!("Edge watcher started");
        Ok(())
    }

    fn run(weak: Weak<Self>) {
        while let Some(watcher) = weak.upgrade() {
            if watcher.stop.load(Ordering::Acquire) {
                break;
            }
            match watcher
                .bridge
                .read_gpio_interrupt_levels(consts::edge::INTERRUPT_POLL_MS)
            {
                Ok(Some(levels)) => watcher.dispatch(levels),
                Ok(None) => {}
                Err(e) => {
                    warn!("Edge watcher failed to read interrupt report: {}", e);
                    thread::sleep(Duration::from_millis(
                        consts::edge::INTERRUPT_POLL_MS as u64,
                    ));
                }
            }
        }
        debug!("Edge watcher stopped");
    }

    fn dispatch(&self, levels: u32) {
        let mut fired = Vec::new();
        for (&number, watched) in self.pins().iter_mut() {
            let level = GpioLevel::from_bit(levels & (1 << number) != 0);
            if level != watched.last {
                watched.last = level;
                fired.push((level.edge(), Arc::clone(&watched.observers)));
            }
        }
        for (edge, observers) in fired {
            observers.notify(&edge);
        }
    }

    fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Edge watcher thread panicked");
            }
        }
    }
}

/// On-board pins and I2C bus of an XR2280x bridge.
pub struct BridgeBoard {
    bridge: Arc<Xr2280x>,
    watcher: Arc<EdgeWatcher>,
}

impl BridgeBoard {
    pub fn new(bridge: Xr2280x) -> Self {
        let bridge = Arc::new(bridge);
        BridgeBoard {
            watcher: EdgeWatcher::new(Arc::clone(&bridge)),
            bridge,
        }
    }

    /// Opens the first bridge found. Fails with `DeviceNotFound` when none is connected.
    pub fn open_first() -> Result<Self> {
        let hid_api = HidApi::new()?;
        Ok(Self::new(Xr2280x::device_open_first(&hid_api)?))
    }

    pub fn bridge(&self) -> &Arc<Xr2280x> {
        &self.bridge
    }
}

impl Drop for BridgeBoard {
    fn drop(&mut self) {
        self.watcher.shutdown();
    }
}

impl Board for BridgeBoard {
    fn pin_count(&self) -> u32 {
        if self.bridge.has_edge() {
            self.bridge.get_capabilities().gpio_count as u32
        } else {
            0
        }
    }

    fn open_pin(&self, pin: u32, sharing: SharingMode) -> Result<Box<dyn NativePin>> {
        if pin >= self.pin_count() {
            return Err(Error::UnsupportedPin(pin));
        }
        let gpio = GpioPin::new(pin)?;
        self.bridge.gpio_assign_to_edge(gpio)?;
        debug!("Opened bridge pin {} ({:?})", pin, sharing);
        Ok(Box::new(BridgePin {
            bridge: Arc::clone(&self.bridge),
            watcher: Arc::clone(&self.watcher),
            pin: gpio,
            sharing,
            drive_mode: DriveMode::Input,
            observers: None,
            subscriptions: Vec::new(),
        }))
    }

    fn open_i2c(&self, address: u8, speed_khz: u32) -> Result<Arc<dyn I2cDevice>> {
        let device = BridgeI2c::new(Arc::clone(&self.bridge), I2cAddress::new(address)?)?;
        self.bridge.i2c_set_speed_khz(speed_khz)?;
        Ok(Arc::new(device))
    }
}

struct BridgePin {
    bridge: Arc<Xr2280x>,
    watcher: Arc<EdgeWatcher>,
    pin: GpioPin,
    sharing: SharingMode,
    drive_mode: DriveMode,
    observers: Option<Arc<Observers<PinEdge>>>,
    subscriptions: Vec<SubscriptionId>,
}

impl BridgePin {
    fn check_writable(&self) -> Result<()> {
        match self.sharing {
            SharingMode::Exclusive => Ok(()),
            SharingMode::SharedReadOnly => Err(Error::ReadOnlyPin(self.pin.number() as u32)),
        }
    }
}

impl NativePin for BridgePin {
    fn pin_number(&self) -> u32 {
        self.pin.number() as u32
    }

    fn sharing_mode(&self) -> SharingMode {
        self.sharing
    }

    fn drive_mode(&self) -> DriveMode {
        self.drive_mode
    }

    fn is_drive_mode_supported(&self, _mode: DriveMode) -> bool {
        true
    }

    fn set_drive_mode(&mut self, mode: DriveMode) -> Result<()> {
        self.check_writable()?;
        let pull = match mode {
            DriveMode::InputPullUp => GpioPull::Up,
            DriveMode::InputPullDown => GpioPull::Down,
            DriveMode::Input | DriveMode::Output => GpioPull::None,
        };
        self.bridge.gpio_set_pull(self.pin, pull)?;
        self.bridge.gpio_set_output(self.pin, mode == DriveMode::Output)?;
        self.drive_mode = mode;
        Ok(())
    }

    fn read(&self) -> Result<GpioLevel> {
        self.bridge.gpio_read(self.pin)
    }

    fn write(&mut self, level: GpioLevel) -> Result<()> {
        self.check_writable()?;
        self.bridge.gpio_write(self.pin, level)
    }

    fn subscribe(&mut self, handler: EdgeHandler) -> Result<SubscriptionId> {
        let observers = match &self.observers {
            Some(observers) => Arc::clone(observers),
            None => {
                let observers = self.watcher.watch(self.pin)?;
                self.observers = Some(Arc::clone(&observers));
                observers
            }
        };
        let id = observers.subscribe(move |edge: &PinEdge| handler(*edge));
        self.subscriptions.push(id);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(position) = self.subscriptions.iter().position(|s| *s == id) else {
            return false;
        };
        self.subscriptions.swap_remove(position);
        self.observers
            .as_ref()
            .is_some_and(|observers| observers.unsubscribe(id))
    }
}

impl Drop for BridgePin {
    fn drop(&mut self) {
        if let Some(observers) = &self.observers {
            for id in self.subscriptions.drain(..) {
                observers.unsubscribe(id);
            }
        }
    }
}
