//! Internal constants, register addresses, and bit definitions.

use std::time::Duration;

/// Virtual pin numbers below this value always belong to the on-board driver.
pub const ONBOARD_PIN_RESERVE: u32 = 64;

/// Default timeout used by `Pin::wait_for` when none is given.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(4000);

// --- XR2280x USB bridge (on-board pins and I2C bus) ---

/// Exar Corporation vendor ID for XR2280x devices.
pub const EXAR_VID: u16 = 0x04E2;
/// Product ID for the XR2280x I2C interface (common for XR22800/1/2/4).
pub const XR2280X_I2C_PID: u16 = 0x1100;
/// Product ID for the XR2280x EDGE (GPIO/Interrupt) interface.
pub const XR2280X_EDGE_PID: u16 = 0x1200;

pub const REPORT_ID_WRITE_HID_REGISTER: u8 = 0x3C;
pub const REPORT_ID_SET_HID_READ_ADDRESS: u8 = 0x4B;
pub const REPORT_ID_READ_HID_REGISTER: u8 = 0x5A;

pub mod i2c {
    pub const DEFAULT_TIMEOUT_MS: i32 = 500;
    pub const REPORT_MAX_DATA_SIZE: usize = 32;
    // Flags(1) + WrSize(1) + RdSize(1) + SlaveAddr(1) + Data(32)
    pub const OUT_REPORT_WRITE_BUF_SIZE: usize = 36;
    // Flags(1) + WrSize(1) + RdSize(1) + Reserved(1) + Data(32)
    pub const IN_REPORT_READ_BUF_SIZE: usize = 36;

    pub const REG_SCL_LOW: u16 = 0x0341;
    pub const REG_SCL_HIGH: u16 = 0x0342;

    pub mod out_flags {
        pub const START_BIT: u8 = 1 << 0;
        pub const STOP_BIT: u8 = 1 << 1;
    }

    pub mod in_flags {
        pub const REQUEST_ERROR: u8 = 1 << 0;
        pub const NAK_RECEIVED: u8 = 1 << 1;
        pub const ARBITRATION_LOST: u8 = 1 << 2;
        pub const TIMEOUT: u8 = 1 << 3;
    }
}

pub mod edge {
    /// Poll interval of the on-board edge watcher.
    pub const INTERRUPT_POLL_MS: i32 = 10;
    pub const INTERRUPT_REPORT_SIZE: usize = 64;

    // Group 0 (E0-E15) and group 1 (E16-E31, XR22802/4 only) share a layout:
    // group 1 registers sit at a fixed offset from group 0.
    pub const GROUP1_OFFSET: u16 = 0x000C;

    pub const REG_FUNC_SEL_0: u16 = 0x03C0;
    pub const REG_DIR_0: u16 = 0x03C1;
    pub const REG_SET_0: u16 = 0x03C2;
    pub const REG_CLEAR_0: u16 = 0x03C3;
    pub const REG_STATE_0: u16 = 0x03C4;
    pub const REG_PULL_UP_0: u16 = 0x03C7;
    pub const REG_PULL_DOWN_0: u16 = 0x03C8;
    pub const REG_INTR_MASK_0: u16 = 0x03C9;
    pub const REG_INTR_POS_EDGE_0: u16 = 0x03CA;
    pub const REG_INTR_NEG_EDGE_0: u16 = 0x03CB;

    pub const REG_FUNC_SEL_1: u16 = REG_FUNC_SEL_0 + GROUP1_OFFSET;
}

// --- MCP23008 / MCP23017 port expander ---

pub mod mcp230xx {
    /// Pins per bank.
    pub const BANK_PIN_COUNT: u32 = 8;
    /// Registers per bank, in address order.
    pub const REGISTER_COUNT: usize = 11;

    /// Register stride of the single-bank MCP23008.
    pub const MCP23008_STRIDE: u8 = 1;
    /// Register stride of the dual-bank MCP23017 (IOCON.BANK = 0, interleaved A/B).
    pub const MCP23017_STRIDE: u8 = 2;
    pub const MCP23017_BANK_BASES: [u8; 2] = [0x00, 0x01];

    pub const DEFAULT_SLAVE_ADDRESS: u8 = 0x20;

    pub mod iocon {
        /// INTPOL: interrupt output is active-high when set.
        pub const INTPOL: u8 = 1;
        /// MIRROR: INTA and INTB are internally connected when set.
        pub const MIRROR: u8 = 6;
    }
}

pub mod pwm {
    use std::time::Duration;

    /// Smallest pulse the software PWM generates; one step of the duty cycle.
    pub const MINIMAL_PULSE_WIDTH: Duration = Duration::from_micros(100);
    pub const DEFAULT_RANGE: u32 = 100;
}
