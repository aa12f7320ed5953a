//! Interrupt capture and fan-out.
//!
//! One physical interrupt line fans out to any number of bank drivers, and each
//! bank fans an [`InterruptSnapshot`] out to its open pins. Every hop is an
//! explicit observer list, and the events are plain `Copy` values.

use crate::error::{Error, Result};
use crate::gpio::{DriveMode, GpioLevel, PinEdge, SubscriptionId};
use crate::pin::Pin;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered list of event handlers.
///
/// Handlers are invoked outside the internal lock, so a handler may subscribe
/// or unsubscribe without deadlocking.
pub struct Observers<T> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Observers {
            next_id: AtomicU64::new(0),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns `false` when the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every handler with `event`, in subscription order.
    pub fn notify(&self, event: &T) {
        let handlers: Vec<Handler<T>> = self.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in handlers {
            handler(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Handler<T>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The (INTF, INTCAP, GPIO) register triple read right after an interrupt edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSnapshot {
    /// INTF: which pins raised the interrupt.
    pub interrupt_flags: u8,
    /// INTCAP: pin values latched when the interrupt fired.
    pub captured_values: u8,
    /// GPIO: pin values at the time of the read.
    pub current_values: u8,
}

/// One pin's share of an [`InterruptSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinInterrupt {
    pub pin: u8,
    pub occurred: bool,
    pub edge: PinEdge,
    pub value: GpioLevel,
}

impl InterruptSnapshot {
    pub fn new(interrupt_flags: u8, captured_values: u8, current_values: u8) -> Self {
        InterruptSnapshot {
            interrupt_flags,
            captured_values,
            current_values,
        }
    }

    /// Decodes the bits of local pin `pin` (0-7).
    pub fn decode(&self, pin: u8) -> Result<PinInterrupt> {
        if pin >= 8 {
            return Err(Error::PinArgumentOutOfRange {
                pin: pin as u32,
                message: "Expander pin index must be 0-7".to_string(),
            });
        }
        let mask = 1u8 << pin;
        Ok(PinInterrupt {
            pin,
            occurred: self.interrupt_flags & mask != 0,
            edge: if self.captured_values & mask != 0 {
                PinEdge::Rising
            } else {
                PinEdge::Falling
            },
            value: GpioLevel::from_bit(self.current_values & mask != 0),
        })
    }
}

/// Electrical polarity of an expander's interrupt output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptPolarity {
    /// Line idles high and is pulled low on interrupt.
    ActiveLow,
    /// Line idles low and is driven high on interrupt.
    ActiveHigh,
}

impl InterruptPolarity {
    /// Drive mode the receiving pin needs so the line idles at its inactive level.
    pub fn drive_mode(self) -> DriveMode {
        match self {
            InterruptPolarity::ActiveLow => DriveMode::InputPullUp,
            InterruptPolarity::ActiveHigh => DriveMode::InputPullDown,
        }
    }

    /// Edge that signals an interrupt.
    pub fn active_edge(self) -> PinEdge {
        self.active_level().edge()
    }

    pub fn active_level(self) -> GpioLevel {
        match self {
            InterruptPolarity::ActiveLow => GpioLevel::Low,
            InterruptPolarity::ActiveHigh => GpioLevel::High,
        }
    }
}

/// A physical interrupt input shared by one or more expander banks.
pub struct InterruptLine {
    pin: Mutex<Pin>,
    pin_number: u32,
    polarity: InterruptPolarity,
    observers: Arc<Observers<PinEdge>>,
    subscription: SubscriptionId,
}

impl InterruptLine {
    /// Takes ownership of `pin`, configures its pull for `polarity` and starts
    /// listening for edges.
    pub fn new(mut pin: Pin, polarity: InterruptPolarity) -> Result<Arc<Self>> {
        if !pin.set_drive_mode(polarity.drive_mode())? {
            warn!(
                "Interrupt pin {} drive mode could not be verified",
                pin.pin_number()
            );
        }
        let observers = Arc::new(Observers::<PinEdge>::new());
        let fanout = Arc::clone(&observers);
        let subscription = pin.on_value_changed(Box::new(move |edge: PinEdge| {
            trace!("Interrupt line edge: {:?}", edge);
            fanout.notify(&edge);
        }))?;
        let pin_number = pin.pin_number();
        debug!(
            "Interrupt line on pin {} configured {:?}",
            pin_number, polarity
        );
        Ok(Arc::new(InterruptLine {
            pin: Mutex::new(pin),
            pin_number,
            polarity,
            observers,
            subscription,
        }))
    }

    pub fn polarity(&self) -> InterruptPolarity {
        self.polarity
    }

    pub fn pin_number(&self) -> u32 {
        self.pin_number
    }

    /// Current level of the line.
    pub fn read(&self) -> Result<GpioLevel> {
        self.pin.lock().unwrap_or_else(PoisonError::into_inner).read()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PinEdge) + Send + Sync + 'static,
    {
        self.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }
}

impl Drop for InterruptLine {
    fn drop(&mut self) {
        let pin = self.pin.get_mut().unwrap_or_else(PoisonError::into_inner);
        pin.remove_handler(self.subscription);
    }
}
