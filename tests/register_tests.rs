//! Register wire protocol, bit isolation and write verification.

mod common;

use common::{FakeChip, Transaction};
use gpio_components::{Error, I2cDevice, Register};
use std::sync::Arc;

fn register_on(chip: &Arc<FakeChip>, address: u8) -> Register {
    Register::new(Arc::clone(chip) as Arc<dyn I2cDevice>, address)
}

#[test]
fn test_read_is_address_write_then_one_byte_read() {
    let chip = FakeChip::new(0x20);
    chip.set_register(0x09, 0x5A);
    let register = register_on(&chip, 0x09);

    assert_eq!(register.read().unwrap(), 0x5A);
    assert_eq!(
        chip.transactions(),
        vec![Transaction::WriteRead(vec![0x09], 1)]
    );
    assert_eq!(register.last_value(), 0x5A);
}

#[test]
fn test_write_sends_address_and_value_then_verifies() {
    let chip = FakeChip::new(0x20);
    let register = register_on(&chip, 0x0A);

    assert!(register.write(0x3C).unwrap());
    assert_eq!(
        chip.transactions(),
        vec![
            Transaction::Write(vec![0x0A, 0x3C]),
            Transaction::WriteRead(vec![0x0A], 1),
        ]
    );
    assert_eq!(chip.register(0x0A), 0x3C);
}

#[test]
fn test_every_read_goes_to_the_bus() {
    let chip = FakeChip::new(0x20);
    let register = register_on(&chip, 0x09);

    register.read().unwrap();
    chip.set_register(0x09, 0xFF);
    assert_eq!(register.read().unwrap(), 0xFF);
    assert_eq!(chip.read_registers(), vec![0x09, 0x09]);
}

#[test]
fn test_write_bit_set_isolates_other_bits() {
    for pattern in [0x00u8, 0xA5, 0x5A, 0xFF] {
        for pos in 0..8u8 {
            let chip = FakeChip::new(0x20);
            chip.set_register(0x06, pattern);
            let register = register_on(&chip, 0x06);

            assert!(register.write_bit(pos, true).unwrap());
            assert!(register.read_bit(pos).unwrap());
            assert_eq!(
                chip.register(0x06),
                pattern | (1 << pos),
                "pattern 0x{:02X}, bit {}",
                pattern,
                pos
            );
        }
    }
}

#[test]
fn test_write_bit_clear_isolates_other_bits() {
    for pos in 0..8u8 {
        let chip = FakeChip::new(0x20);
        chip.set_register(0x06, 0xFF);
        let register = register_on(&chip, 0x06);

        assert!(register.write_bit(pos, false).unwrap());
        assert!(!register.read_bit(pos).unwrap());
        assert_eq!(chip.register(0x06), 0xFF & !(1 << pos));
    }
}

#[test]
fn test_write_bit_is_read_modify_write_verify() {
    let chip = FakeChip::new(0x20);
    chip.set_register(0x00, 0x01);
    let register = register_on(&chip, 0x00);

    register.write_bit(3, true).unwrap();
    assert_eq!(
        chip.transactions(),
        vec![
            Transaction::WriteRead(vec![0x00], 1),
            Transaction::Write(vec![0x00, 0x09]),
            Transaction::WriteRead(vec![0x00], 1),
        ]
    );
}

#[test]
fn test_bit_position_out_of_range() {
    let chip = FakeChip::new(0x20);
    let register = register_on(&chip, 0x00);

    assert!(matches!(
        register.write_bit(8, true),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert!(matches!(
        register.read_bit(200),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert!(chip.transactions().is_empty());
}

#[test]
fn test_verification_mismatch_is_reported_not_raised() {
    let chip = FakeChip::new(0x20);
    chip.stick_register(0x09, 0x00);
    let register = register_on(&chip, 0x09);

    assert!(!register.write(0x10).unwrap());
    assert!(!register.write_bit(4, true).unwrap());
    // Clearing an already clear bit still verifies.
    assert!(register.write_bit(4, false).unwrap());
}

#[test]
fn test_bus_error_propagates() {
    let chip = FakeChip::new(0x20);
    chip.set_failing(true);
    let register = register_on(&chip, 0x09);

    assert!(matches!(register.read(), Err(Error::I2cNack { .. })));
    assert!(matches!(register.write(0x01), Err(Error::I2cNack { .. })));
}
