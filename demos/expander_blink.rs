use gpio_components::{consts, BridgeBoard, GpioController, GpioLevel, Result, SharingMode};
use std::sync::Arc;
use std::{thread, time::Duration};

// MCP23008 with all address pins low, mapped to virtual pins 64-71.
const EXPANDER_ADDRESS: u8 = consts::mcp230xx::DEFAULT_SLAVE_ADDRESS;
const FIRST_PIN: u32 = 64;
const BLINK_PIN: u32 = FIRST_PIN;

fn main() -> Result<()> {
    env_logger::init();
    println!("Opening first XR2280x device...");
    let board = BridgeBoard::open_first()?;
    println!("Device opened: {:?}", board.bridge().get_device_info());

    let mut controller = GpioController::new(Arc::new(board));
    controller.register_mcp23008(FIRST_PIN, EXPANDER_ADDRESS, None)?;

    let mut led = controller.open_pin(BLINK_PIN, SharingMode::Exclusive)?;
    println!("Blinking virtual pin {} (Press Ctrl+C to stop)", BLINK_PIN);
    let mut level = GpioLevel::Low;
    loop {
        level = level.toggle();
        if !led.write(level)? {
            eprintln!("Write of {:?} did not verify", level);
        }
        thread::sleep(Duration::from_millis(250));
    }
}
