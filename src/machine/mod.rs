//! The machine capability interface and its backends.
//!
//! A [`Machine`] is anything that can execute the movement language: the
//! [`simulated`] backend advances a virtual position for tests and
//! hardware-absent builds, the [`stepper`] backend generates timed step
//! pulses on real pins. Which one runs is decided once at startup by
//! [`probe`].

pub mod arc;
pub mod ramp;
pub mod simulated;
pub mod stepper;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;

use crate::config::{Backend, Config};
use crate::hardware::RigPins;
use crate::recorder::Recorder;

pub use arc::ArcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("X"),
            Axis::Y => f.write_str("Y"),
        }
    }
}

/// How a motion operation ended.
///
/// `SafetyStopped` is deliberately not an error: the backend recovered on
/// its own and the machine is safe, but the target was not reached. Callers
/// must not treat it as arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The target position was reached.
    Completed,
    /// A pause request was observed; position is partway to the target.
    Paused,
    /// An endstop tripped; the axis backed off and the move was abandoned.
    SafetyStopped,
}

#[derive(Debug, Error)]
pub enum MachineError {
    /// The requested target lies outside the configured travel limits.
    /// Fatal for the move: nothing moved.
    #[error("{axis} target of {target_steps} steps is outside travel limits")]
    OutOfBounds { axis: Axis, target_steps: i64 },
    #[error("arc rejected: {0}")]
    Arc(#[from] ArcError),
    #[error("pin fault: {0}")]
    Pin(String),
}

/// Coordinate mode selected by G90/G91. Parsed and tracked, but motion
/// commands are interpreted as absolute regardless; see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordMode {
    #[default]
    Absolute,
    Relative,
}

/// Shared machine flags and live position, readable without taking the
/// machine lock.
///
/// One instance is cloned into the backend, the play loop, and whatever
/// supervises them. The pause request is the only way to interrupt a move
/// in flight: the backend polls it between pulses and clears it on
/// observation.
#[derive(Debug, Default)]
pub struct MachineState {
    pause_requested: AtomicBool,
    emergency_stop: AtomicBool,
    calibrated: AtomicBool,
    x_mm_bits: AtomicU64,
    y_mm_bits: AtomicU64,
}

impl MachineState {
    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_pause(&self) {
        self.pause_requested.store(false, Ordering::SeqCst);
    }

    pub fn pause_pending(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    /// Consume a pending pause request. Backends call this at their
    /// suspension points; observing the request clears it.
    pub fn take_pause(&self) -> bool {
        self.pause_requested.swap(false, Ordering::SeqCst)
    }

    pub fn set_emergency_stop(&self, engaged: bool) {
        self.emergency_stop.store(engaged, Ordering::SeqCst);
    }

    pub fn emergency_stop(&self) -> bool {
        self.emergency_stop.load(Ordering::SeqCst)
    }

    pub fn set_calibrated(&self, calibrated: bool) {
        self.calibrated.store(calibrated, Ordering::SeqCst);
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated.load(Ordering::SeqCst)
    }

    pub fn publish_position(&self, x_mm: f64, y_mm: f64) {
        self.x_mm_bits.store(x_mm.to_bits(), Ordering::SeqCst);
        self.y_mm_bits.store(y_mm.to_bits(), Ordering::SeqCst);
    }

    pub fn position(&self) -> (f64, f64) {
        (
            f64::from_bits(self.x_mm_bits.load(Ordering::SeqCst)),
            f64::from_bits(self.y_mm_bits.load(Ordering::SeqCst)),
        )
    }
}

/// The contract every motion backend satisfies.
///
/// Motion operations return a [`MoveOutcome`] (or a fatal [`MachineError`]);
/// auxiliary operations are fire-and-forget. Pause and the position/
/// calibration queries route through [`MachineState`] so they stay usable
/// while a move is blocking the backend itself.
pub trait Machine: Send {
    fn rapid_move(&mut self, x: f64, y: f64) -> Result<MoveOutcome, MachineError>;
    fn linear_move(&mut self, x: f64, y: f64, feed: f64) -> Result<MoveOutcome, MachineError>;
    fn arc_move(
        &mut self,
        x: f64,
        y: f64,
        feed: f64,
        radius: f64,
        clockwise: bool,
    ) -> Result<MoveOutcome, MachineError>;
    fn home(&mut self) -> Result<MoveOutcome, MachineError>;

    fn dwell(&mut self, millis: u64);
    fn set_absolute(&mut self);
    fn set_relative(&mut self);

    fn start_acquisition(&mut self, pulses_per_sec: u32, label: &str);
    fn stop_acquisition(&mut self);
    fn stream_on(&mut self);
    fn stream_off(&mut self);
    fn set_exposure(&mut self, microseconds: u32);

    fn state(&self) -> &Arc<MachineState>;

    fn pause(&self) {
        self.state().request_pause();
    }

    fn get_position(&self) -> (f64, f64) {
        self.state().position()
    }

    fn is_calibrated(&self) -> bool {
        self.state().is_calibrated()
    }
}

/// Select the motion backend once at startup.
///
/// `stepper` gets the in-memory pin rig; a deployment with real GPIO
/// constructs [`stepper::StepperMachine`] directly over its own pin types.
pub fn probe(
    config: &Config,
    state: Arc<MachineState>,
    recorder: Box<dyn Recorder>,
) -> Box<dyn Machine> {
    match config.machine.backend {
        Backend::Simulated => {
            tracing::info!("backend: simulated machine");
            Box::new(simulated::SimulatedMachine::new(config, state, recorder))
        }
        Backend::Stepper => {
            tracing::info!("backend: stepper machine on in-memory pins");
            let (pins, _probe) = RigPins::in_memory();
            Box::new(stepper::StepperMachine::new(pins, config, state, recorder))
        }
    }
}
