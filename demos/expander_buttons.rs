use gpio_components::{
    BridgeBoard, DriveMode, ExpanderConfig, GpioController, PinEdge, Result, SharingMode,
};
use std::sync::Arc;
use std::{thread, time::Duration};

// MCP23017 at 0x21 on virtual pins 100-115, INTA/INTB wired to bridge pin E5.
const EXPANDER_ADDRESS: u8 = 0x21;
const FIRST_PIN: u32 = 100;
const INTERRUPT_PIN: u32 = 5;

fn main() -> Result<()> {
    env_logger::init();
    let board = BridgeBoard::open_first()?;
    let mut controller =
        GpioController::with_expander_config(Arc::new(board), ExpanderConfig::reliable());
    let banks = controller.register_mcp23017(FIRST_PIN, EXPANDER_ADDRESS, Some(INTERRUPT_PIN))?;
    for bank in &banks {
        println!("{}: {:?}", bank.name(), bank.state()?);
    }

    // Buttons to ground on every pin of bank B.
    let mut buttons = Vec::new();
    for number in FIRST_PIN + 8..FIRST_PIN + 16 {
        let mut button = controller.open_pin(number, SharingMode::Exclusive)?;
        button.set_drive_mode(DriveMode::InputPullUp)?;
        button.on_value_changed(Box::new(move |edge: PinEdge| {
            let state = match edge {
                PinEdge::Falling => "pressed",
                PinEdge::Rising => "released",
            };
            println!("Button on pin {} {}", number, state);
        }))?;
        buttons.push(button);
    }

    println!("Listening for buttons for 60 s...");
    thread::sleep(Duration::from_secs(60));
    Ok(())
}
