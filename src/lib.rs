// gantry-host: G-code motion control for a two-axis stepper positioning rig

pub mod config;
pub mod control;
pub mod gcode;
pub mod hardware;
pub mod machine;
pub mod recorder;

pub use config::Config;
pub use control::{ControlError, Controller, StatusSnapshot};
pub use gcode::{Command, Interpreter, Program, StepError, StepOutcome, parse};
pub use machine::{Machine, MachineError, MachineState, MoveOutcome};
pub use machine::simulated::SimulatedMachine;
pub use machine::stepper::StepperMachine;
pub use recorder::{LogRecorder, Recorder};
