use gpio_components::{GpioController, Result};
use std::{thread, time::Duration};

// On-board pin E2 of the bridge.
const PWM_PIN: u32 = 2;
const RANGE: u32 = 100;

fn main() -> Result<()> {
    env_logger::init();
    let controller = GpioController::get_default()?;
    let mut pwm = controller
        .lock()
        .unwrap()
        .open_soft_pwm(PWM_PIN, RANGE)?;

    println!(
        "Fading pin {} with a {:?} period",
        PWM_PIN,
        gpio_components::pwm::period(RANGE)
    );
    pwm.enable()?;
    for _ in 0..3 {
        for value in (0..=RANGE).chain((0..RANGE).rev()) {
            pwm.set_value(value)?;
            thread::sleep(Duration::from_millis(10));
        }
    }
    pwm.disable();
    println!("Done.");
    Ok(())
}
