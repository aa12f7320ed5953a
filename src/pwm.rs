//! Software PWM for pins without PWM hardware.
//!
//! A dedicated worker thread toggles the pin and spin-waits each phase, one
//! [`consts::pwm::MINIMAL_PULSE_WIDTH`] per step of the duty cycle. The carrier
//! period is `range * MINIMAL_PULSE_WIDTH`.

use crate::consts;
use crate::error::{Error, Result};
use crate::gpio::{DriveMode, GpioLevel};
use crate::pin::Pin;
use crate::timer::HighResolutionTimer;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct PwmShared {
    enabled: AtomicBool,
    value: AtomicU32,
    range: u32,
}

/// A software PWM channel that owns its pin.
pub struct SoftPwm {
    shared: Arc<PwmShared>,
    pin: Option<Pin>,
    worker: Option<JoinHandle<Pin>>,
}

impl SoftPwm {
    /// Configures `pin` as output. `range` is the number of duty-cycle steps (>= 1).
    pub fn new(mut pin: Pin, range: u32) -> Result<Self> {
        if range < 1 {
            return Err(Error::ArgumentOutOfRange(
                "PWM range must be a positive value".to_string(),
            ));
        }
        if !pin.set_drive_mode(DriveMode::Output)? {
            warn!("PWM pin {} drive mode could not be verified", pin.pin_number());
        }
        debug!("Soft PWM on pin {} with range {}", pin.pin_number(), range);
        Ok(SoftPwm {
            shared: Arc::new(PwmShared {
                enabled: AtomicBool::new(false),
                value: AtomicU32::new(0),
                range,
            }),
            pin: Some(pin),
            worker: None,
        })
    }

    /// Opens with the default range of 100 steps.
    pub fn with_default_range(pin: Pin) -> Result<Self> {
        Self::new(pin, consts::pwm::DEFAULT_RANGE)
    }

    pub fn range(&self) -> u32 {
        self.shared.range
    }

    pub fn value(&self) -> u32 {
        self.shared.value.load(Ordering::Relaxed)
    }

    /// Sets the number of high steps per period, `0..=range`.
    ///
    /// Takes effect at the worker's next phase.
    pub fn set_value(&self, value: u32) -> Result<()> {
        if value > self.shared.range {
            return Err(Error::ArgumentOutOfRange(format!(
                "PWM value must be between 0 and {} (got {})",
                self.shared.range, value
            )));
        }
        self.shared.value.store(value, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// True while the worker thread has not exited.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Starts the worker if not enabled already.
    ///
    /// After a `disable()` this first waits for the previous worker to hand the
    /// pin back, which takes at most one phase.
    pub fn enable(&mut self) -> Result<()> {
        if self.is_enabled() {
            return Ok(());
        }
        self.reclaim()?;
        let pin = self.pin.take().ok_or(Error::WorkerPanicked)?;
        self.shared.enabled.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("soft-pwm".to_string())
            .spawn(move || run(pin, shared));
        match spawned {
            Ok(handle) => {
                debug!("Soft PWM enabled");
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.enabled.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Asks the worker to stop. It exits after finishing its current phase.
    pub fn disable(&self) {
        if self.shared.enabled.swap(false, Ordering::AcqRel) {
            debug!("Soft PWM disabled");
        }
    }

    /// Stops the worker and returns the pin.
    pub fn into_pin(mut self) -> Result<Pin> {
        self.disable();
        self.reclaim()?;
        self.pin.take().ok_or(Error::WorkerPanicked)
    }

    /// Joins a finished or stopping worker and takes the pin back.
    fn reclaim(&mut self) -> Result<()> {
        if let Some(handle) = self.worker.take() {
            let pin = handle.join().map_err(|_| Error::WorkerPanicked)?;
            self.pin = Some(pin);
        }
        Ok(())
    }
}

impl Drop for SoftPwm {
    fn drop(&mut self) {
        self.disable();
        if self.reclaim().is_err() {
            warn!("Soft PWM worker panicked");
        }
    }
}

fn run(mut pin: Pin, shared: Arc<PwmShared>) -> Pin {
    let timer = HighResolutionTimer::new();
    let step = consts::pwm::MINIMAL_PULSE_WIDTH;
    let phase = |pin: &mut Pin, level: GpioLevel, steps: u32| -> bool {
        if let Err(e) = pin.write(level) {
            warn!("Soft PWM write failed on pin {}: {}", pin.pin_number(), e);
            return false;
        }
        timer.sleep(step * steps);
        true
    };

    if !phase(&mut pin, GpioLevel::Low, 0) {
        shared.enabled.store(false, Ordering::Release);
        return pin;
    }
    while shared.enabled.load(Ordering::Acquire) {
        let high = shared.value.load(Ordering::Relaxed);
        if high > 0 && !phase(&mut pin, GpioLevel::High, high) {
            break;
        }
        if !shared.enabled.load(Ordering::Acquire) {
            break;
        }
        let low = shared.range - shared.value.load(Ordering::Relaxed);
        if low > 0 && !phase(&mut pin, GpioLevel::Low, low) {
            break;
        }
    }
    shared.enabled.store(false, Ordering::Release);
    trace!("Soft PWM worker exiting");
    pin
}

/// Carrier period for `range` steps.
pub fn period(range: u32) -> Duration {
    consts::pwm::MINIMAL_PULSE_WIDTH * range
}
