//! In-memory stand-ins for the board, its pins and an MCP230xx on the bus.

#![allow(dead_code)]

use gpio_components::{
    Board, DriveMode, EdgeHandler, Error, GpioLevel, I2cAddress, I2cDevice, NativePin, Observers,
    PinEdge, Result, SharingMode, SubscriptionId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One bus transaction as the chip saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Write(Vec<u8>),
    WriteRead(Vec<u8>, usize),
}

/// An MCP230xx register file behind an I2C address.
pub struct FakeChip {
    address: I2cAddress,
    registers: Mutex<[u8; 0x20]>,
    stuck: Mutex<HashMap<u8, u8>>,
    log: Mutex<Vec<Transaction>>,
    fail: AtomicBool,
}

impl FakeChip {
    pub fn new(address: u8) -> Arc<Self> {
        Arc::new(FakeChip {
            address: I2cAddress::new(address).unwrap(),
            // Power-on state: all inputs.
            registers: Mutex::new({
                let mut registers = [0u8; 0x20];
                registers[0x00] = 0xFF;
                registers[0x01] = 0xFF;
                registers
            }),
            stuck: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn register(&self, address: u8) -> u8 {
        self.registers.lock().unwrap()[address as usize]
    }

    /// Chip-side change, not logged as a transaction.
    pub fn set_register(&self, address: u8, value: u8) {
        self.registers.lock().unwrap()[address as usize] = value;
    }

    /// Makes `address` ignore writes and always read `value`.
    pub fn stick_register(&self, address: u8, value: u8) {
        self.stuck.lock().unwrap().insert(address, value);
        self.set_register(address, value);
    }

    pub fn unstick_register(&self, address: u8) {
        self.stuck.lock().unwrap().remove(&address);
    }

    /// Makes every following transaction fail with a NACK.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_transactions(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Register addresses written, in order.
    pub fn written_registers(&self) -> Vec<u8> {
        self.transactions()
            .into_iter()
            .filter_map(|t| match t {
                Transaction::Write(data) => data.first().copied(),
                Transaction::WriteRead(..) => None,
            })
            .collect()
    }

    /// Register addresses read, in order.
    pub fn read_registers(&self) -> Vec<u8> {
        self.transactions()
            .into_iter()
            .filter_map(|t| match t {
                Transaction::WriteRead(data, _) => data.first().copied(),
                Transaction::Write(_) => None,
            })
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(Error::I2cNack {
                address: self.address,
            })
        } else {
            Ok(())
        }
    }
}

impl I2cDevice for FakeChip {
    fn address(&self) -> I2cAddress {
        self.address
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.check()?;
        self.log.lock().unwrap().push(Transaction::Write(data.to_vec()));
        if let [address, value] = *data {
            if !self.stuck.lock().unwrap().contains_key(&address) {
                self.set_register(address, value);
            }
        }
        Ok(())
    }

    fn write_read(&self, data: &[u8], buffer: &mut [u8]) -> Result<()> {
        self.check()?;
        self.log
            .lock()
            .unwrap()
            .push(Transaction::WriteRead(data.to_vec(), buffer.len()));
        let start = data[0];
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.register(start + i as u8);
        }
        Ok(())
    }
}

/// State of one board pin, shared between the board and every handle to it.
pub struct FakePinState {
    level: Mutex<GpioLevel>,
    drive_mode: Mutex<DriveMode>,
    observers: Observers<PinEdge>,
    writes: Mutex<Vec<(Instant, GpioLevel)>>,
    fail_writes: AtomicBool,
}

impl FakePinState {
    fn new() -> Arc<Self> {
        Arc::new(FakePinState {
            level: Mutex::new(GpioLevel::Low),
            drive_mode: Mutex::new(DriveMode::Input),
            observers: Observers::new(),
            writes: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn level(&self) -> GpioLevel {
        *self.level.lock().unwrap()
    }

    pub fn set_level(&self, level: GpioLevel) {
        *self.level.lock().unwrap() = level;
    }

    pub fn drive_mode(&self) -> DriveMode {
        *self.drive_mode.lock().unwrap()
    }

    /// Moves the pin to the edge's level and raises the edge to subscribers.
    pub fn fire(&self, edge: PinEdge) {
        self.set_level(edge.level());
        self.observers.notify(&edge);
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    /// Every level written, with the time it was written.
    pub fn writes(&self) -> Vec<(Instant, GpioLevel)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn set_failing_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

pub struct FakePin {
    number: u32,
    sharing: SharingMode,
    state: Arc<FakePinState>,
    subscriptions: Vec<SubscriptionId>,
}

impl NativePin for FakePin {
    fn pin_number(&self) -> u32 {
        self.number
    }

    fn sharing_mode(&self) -> SharingMode {
        self.sharing
    }

    fn drive_mode(&self) -> DriveMode {
        self.state.drive_mode()
    }

    fn is_drive_mode_supported(&self, _mode: DriveMode) -> bool {
        true
    }

    fn set_drive_mode(&mut self, mode: DriveMode) -> Result<()> {
        if self.sharing == SharingMode::SharedReadOnly {
            return Err(Error::ReadOnlyPin(self.number));
        }
        *self.state.drive_mode.lock().unwrap() = mode;
        Ok(())
    }

    fn read(&self) -> Result<GpioLevel> {
        Ok(self.state.level())
    }

    fn write(&mut self, level: GpioLevel) -> Result<()> {
        if self.sharing == SharingMode::SharedReadOnly {
            return Err(Error::ReadOnlyPin(self.number));
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("pin write failed")));
        }
        self.state.set_level(level);
        self.state.writes.lock().unwrap().push((Instant::now(), level));
        Ok(())
    }

    fn subscribe(&mut self, handler: EdgeHandler) -> Result<SubscriptionId> {
        let id = self
            .state
            .observers
            .subscribe(move |edge: &PinEdge| handler(*edge));
        self.subscriptions.push(id);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.retain(|s| *s != id);
        self.state.observers.unsubscribe(id)
    }
}

impl Drop for FakePin {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.state.observers.unsubscribe(id);
        }
    }
}

/// A board with 32 pins and any number of chips on its bus.
pub struct FakeBoard {
    pins: Mutex<HashMap<u32, Arc<FakePinState>>>,
    chips: Mutex<HashMap<u8, Arc<FakeChip>>>,
    bus_speeds: Mutex<Vec<u32>>,
}

impl FakeBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeBoard {
            pins: Mutex::new(HashMap::new()),
            chips: Mutex::new(HashMap::new()),
            bus_speeds: Mutex::new(Vec::new()),
        })
    }

    pub fn attach_chip(&self, chip: Arc<FakeChip>) {
        self.chips
            .lock()
            .unwrap()
            .insert(chip.address().value(), chip);
    }

    pub fn pin(&self, number: u32) -> Arc<FakePinState> {
        Arc::clone(
            self.pins
                .lock()
                .unwrap()
                .entry(number)
                .or_insert_with(FakePinState::new),
        )
    }

    /// Bus clock passed to every `open_i2c` call.
    pub fn bus_speeds(&self) -> Vec<u32> {
        self.bus_speeds.lock().unwrap().clone()
    }
}

impl Board for FakeBoard {
    fn pin_count(&self) -> u32 {
        32
    }

    fn open_pin(&self, pin: u32, sharing: SharingMode) -> Result<Box<dyn NativePin>> {
        if pin >= self.pin_count() {
            return Err(Error::UnsupportedPin(pin));
        }
        Ok(Box::new(FakePin {
            number: pin,
            sharing,
            state: self.pin(pin),
            subscriptions: Vec::new(),
        }))
    }

    fn open_i2c(&self, address: u8, speed_khz: u32) -> Result<Arc<dyn I2cDevice>> {
        self.bus_speeds.lock().unwrap().push(speed_khz);
        match self.chips.lock().unwrap().get(&address) {
            Some(chip) => Ok(Arc::clone(chip) as Arc<dyn I2cDevice>),
            None => Err(Error::DeviceNotFound),
        }
    }
}
