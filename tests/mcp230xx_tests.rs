//! MCP23008/MCP23017 register protocol against an in-memory chip.

mod common;

use common::FakeChip;
use gpio_components::{
    DriveMode, Error, ExpanderConfig, GpioLevel, I2cDevice, InterruptSnapshot, Mcp230xx,
    RegisterKind,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// MCP23008 register addresses.
const IODIR: u8 = 0x00;
const GPINTEN: u8 = 0x02;
const INTCON: u8 = 0x04;
const IOCON: u8 = 0x05;
const GPPU: u8 = 0x06;
const INTF: u8 = 0x07;
const INTCAP: u8 = 0x08;
const GPIO: u8 = 0x09;
const OLAT: u8 = 0x0A;

fn mcp23008(chip: &Arc<FakeChip>) -> Arc<Mcp230xx> {
    mcp23008_with(chip, ExpanderConfig::default())
}

fn mcp23008_with(chip: &Arc<FakeChip>, config: ExpanderConfig) -> Arc<Mcp230xx> {
    common::init_logging();
    Mcp230xx::mcp23008(Arc::clone(chip) as Arc<dyn I2cDevice>, None, config).unwrap()
}

#[test]
fn test_mcp23008_initialization() {
    let chip = FakeChip::new(0x20);
    chip.set_register(GPIO, 0xFF);
    chip.set_register(GPINTEN, 0xFF);
    let expander = mcp23008(&chip);

    assert_eq!(chip.register(IODIR), 0x00);
    assert_eq!(chip.register(GPIO), 0x00);
    assert_eq!(chip.register(OLAT), 0x00);
    assert_eq!(chip.register(GPINTEN), 0x00);
    assert_eq!(chip.register(INTCON), 0x00);
    // Active-high interrupt output, no mirroring on the single-bank chip.
    assert_eq!(chip.register(IOCON), 0b0000_0010);
    assert_eq!(expander.pin_count(), 8);

    let written = chip.written_registers();
    assert_eq!(&written[..5], &[IODIR, GPIO, OLAT, INTCON, GPINTEN]);
}

#[test]
fn test_mcp23017_banks_interleave() {
    let chip = FakeChip::new(0x21);
    let [bank_a, bank_b] = Mcp230xx::mcp23017(
        Arc::clone(&chip) as Arc<dyn I2cDevice>,
        None,
        ExpanderConfig::default(),
    )
    .unwrap();

    assert_eq!(bank_a.register_address(RegisterKind::Iodir), 0x00);
    assert_eq!(bank_b.register_address(RegisterKind::Iodir), 0x01);
    assert_eq!(bank_a.register_address(RegisterKind::Gpio), 0x12);
    assert_eq!(bank_b.register_address(RegisterKind::Gpio), 0x13);
    assert_eq!(bank_b.register_address(RegisterKind::Olat), 0x15);

    assert_eq!(chip.register(0x00), 0x00);
    assert_eq!(chip.register(0x01), 0x00);
    // Mirror on, active-low interrupt output.
    assert!(bank_a.interrupt_mirror_enabled().unwrap());
    assert_eq!(chip.register(0x0A) & 0b0000_0010, 0);
    assert_eq!(chip.register(0x0A) & 0b0100_0000, 0b0100_0000);
}

#[test]
fn test_construction_fails_on_dead_bus() {
    let chip = FakeChip::new(0x20);
    chip.set_failing(true);
    let result = Mcp230xx::mcp23008(
        Arc::clone(&chip) as Arc<dyn I2cDevice>,
        None,
        ExpanderConfig::default(),
    );
    assert!(matches!(result, Err(Error::I2cNack { .. })));
}

#[test]
fn test_set_drive_mode_bits() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);

    assert!(expander.set_drive_mode(0, DriveMode::Input).unwrap());
    assert!(expander.set_drive_mode(3, DriveMode::InputPullUp).unwrap());
    assert!(expander.set_drive_mode(5, DriveMode::Output).unwrap());

    assert_eq!(chip.register(IODIR), 0b0000_1001);
    assert_eq!(chip.register(GPPU), 0b0000_1000);
    assert_eq!(chip.register(GPINTEN), 0b0000_1001);

    // Back to output drops the pull-up.
    expander.set_drive_mode(3, DriveMode::Output).unwrap();
    assert_eq!(chip.register(IODIR), 0b0000_0001);
    assert_eq!(chip.register(GPPU), 0b0000_0000);
}

#[test]
fn test_every_input_is_armed() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);

    for (pin, mode) in [
        (0, DriveMode::Input),
        (1, DriveMode::Output),
        (2, DriveMode::InputPullUp),
        (7, DriveMode::Input),
    ] {
        expander.set_drive_mode(pin, mode).unwrap();
        assert!(expander.state().unwrap().inputs_armed());
    }
    let state = expander.state().unwrap();
    assert_eq!(state.iodir, 0b1000_0101);
    assert_eq!(state.gpinten & state.iodir, state.iodir);
}

#[test]
fn test_pull_down_is_rejected_without_bus_traffic() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);
    chip.clear_transactions();

    assert!(matches!(
        expander.set_drive_mode(1, DriveMode::InputPullDown),
        Err(Error::UnsupportedMode {
            pin: 1,
            mode: DriveMode::InputPullDown
        })
    ));
    assert!(chip.transactions().is_empty());
}

#[test]
fn test_pin_index_out_of_range() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);

    assert!(matches!(
        expander.write_pin(8, GpioLevel::High),
        Err(Error::PinArgumentOutOfRange { pin: 8, .. })
    ));
    assert!(matches!(
        expander.read_pin(9),
        Err(Error::PinArgumentOutOfRange { pin: 9, .. })
    ));
    assert!(expander.set_drive_mode(8, DriveMode::Output).is_err());
}

#[test]
fn test_write_and_read_pin() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);

    assert!(expander.write_pin(6, GpioLevel::High).unwrap());
    assert_eq!(chip.register(GPIO), 0b0100_0000);
    assert_eq!(expander.read_pin(6).unwrap(), GpioLevel::High);
    assert_eq!(expander.read_pin(5).unwrap(), GpioLevel::Low);

    chip.set_register(GPIO, 0b0010_0000);
    assert_eq!(expander.read_pin(5).unwrap(), GpioLevel::High);
}

#[test]
fn test_unverified_write_without_retries() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);
    chip.stick_register(GPIO, 0x00);
    chip.clear_transactions();

    assert!(!expander.write_pin(2, GpioLevel::High).unwrap());
    assert_eq!(chip.written_registers(), vec![GPIO]);
}

#[test]
fn test_unverified_write_is_retried() {
    let chip = FakeChip::new(0x20);
    let config = ExpanderConfig {
        write_retries: 2,
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    };
    let expander = mcp23008_with(&chip, config);
    chip.stick_register(GPIO, 0x00);
    chip.clear_transactions();

    assert!(!expander.write_pin(2, GpioLevel::High).unwrap());
    assert_eq!(chip.written_registers(), vec![GPIO, GPIO, GPIO]);

    chip.unstick_register(GPIO);
    assert!(expander.write_pin(2, GpioLevel::High).unwrap());
}

#[test]
fn test_interrupt_mirror_toggle() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);

    assert!(!expander.interrupt_mirror_enabled().unwrap());
    assert!(expander.set_interrupt_mirror(true).unwrap());
    assert!(expander.interrupt_mirror_enabled().unwrap());
    assert_eq!(chip.register(IOCON) & 0b0100_0000, 0b0100_0000);
}

#[test]
fn test_poll_without_armed_pins_reads_only_gpinten() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);
    chip.set_register(INTF, 0xFF);
    chip.clear_transactions();

    assert_eq!(expander.poll_interrupt().unwrap(), None);
    assert_eq!(chip.read_registers(), vec![GPINTEN]);
}

#[test]
fn test_poll_without_flags_is_ignored() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);
    expander.set_drive_mode(0, DriveMode::Input).unwrap();
    chip.clear_transactions();

    assert_eq!(expander.poll_interrupt().unwrap(), None);
    assert_eq!(chip.read_registers(), vec![GPINTEN, INTF]);
}

#[test]
fn test_poll_captures_and_fans_out_snapshot() {
    let chip = FakeChip::new(0x20);
    let expander = mcp23008(&chip);
    expander.set_drive_mode(2, DriveMode::Input).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = expander.subscribe(move |snapshot: &InterruptSnapshot| {
        sink.lock().unwrap().push(*snapshot);
    });

    chip.set_register(INTF, 0x04);
    chip.set_register(INTCAP, 0x04);
    chip.set_register(GPIO, 0x00);
    chip.clear_transactions();

    let snapshot = expander.poll_interrupt().unwrap();
    assert_eq!(snapshot, Some(InterruptSnapshot::new(0x04, 0x04, 0x00)));
    assert_eq!(chip.read_registers(), vec![GPINTEN, INTF, INTCAP, GPIO]);
    assert_eq!(seen.lock().unwrap().len(), 1);

    assert!(expander.unsubscribe(id));
    assert!(!expander.unsubscribe(id));
    expander.poll_interrupt().unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}
