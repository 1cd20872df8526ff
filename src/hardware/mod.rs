//! Digital pin seams for the stepper backend.
//!
//! The pulse engine talks to the rig exclusively through the embedded-hal 1.0
//! digital traits: [`StatefulOutputPin`] for the step/direction lines and
//! [`InputPin`] for the four endstop switches. A deployment implements those
//! two traits over its platform's GPIO and hands a [`RigPins`] bundle to
//! [`crate::machine::stepper::StepperMachine`]. The in-memory implementation
//! below backs the hardware-absent dry-run backend and the test suite.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};

/// Step, direction and endstop lines for one axis.
#[derive(Debug)]
pub struct AxisPins<O, I> {
    pub step: O,
    pub dir: O,
    pub min_stop: I,
    pub max_stop: I,
}

/// The full pin set of the two-axis rig.
#[derive(Debug)]
pub struct RigPins<O, I> {
    pub x: AxisPins<O, I>,
    pub y: AxisPins<O, I>,
}

impl RigPins<MemoryPin, MemoryPin> {
    /// A rig wired to in-memory pins, plus probes for the endstop inputs.
    pub fn in_memory() -> (Self, RigProbe) {
        let x_min = MemoryPin::new();
        let x_max = MemoryPin::new();
        let y_min = MemoryPin::new();
        let y_max = MemoryPin::new();
        let probe = RigProbe {
            x_min: x_min.probe(),
            x_max: x_max.probe(),
            y_min: y_min.probe(),
            y_max: y_max.probe(),
        };
        let pins = RigPins {
            x: AxisPins {
                step: MemoryPin::new(),
                dir: MemoryPin::new(),
                min_stop: x_min,
                max_stop: x_max,
            },
            y: AxisPins {
                step: MemoryPin::new(),
                dir: MemoryPin::new(),
                min_stop: y_min,
                max_stop: y_max,
            },
        };
        (pins, probe)
    }
}

/// External handles onto an in-memory rig's endstop levels.
#[derive(Debug, Clone)]
pub struct RigProbe {
    pub x_min: PinProbe,
    pub x_max: PinProbe,
    pub y_min: PinProbe,
    pub y_max: PinProbe,
}

/// A digital line held in shared memory. Clones observe the same level.
#[derive(Debug, Clone, Default)]
pub struct MemoryPin {
    level: Arc<AtomicBool>,
}

impl MemoryPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that can read and drive this pin from outside the machine.
    pub fn probe(&self) -> PinProbe {
        PinProbe {
            level: Arc::clone(&self.level),
        }
    }
}

impl ErrorType for MemoryPin {
    type Error = Infallible;
}

impl OutputPin for MemoryPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.level.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl StatefulOutputPin for MemoryPin {
    fn is_set_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level.load(Ordering::SeqCst))
    }

    fn is_set_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level.load(Ordering::SeqCst))
    }
}

impl InputPin for MemoryPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level.load(Ordering::SeqCst))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
pub struct PinProbe {
    level: Arc<AtomicBool>,
}

impl PinProbe {
    pub fn set(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }

    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}
