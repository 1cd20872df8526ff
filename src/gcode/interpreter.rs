//! Incremental executor: one command-step per call.
//!
//! The interpreter owns the command queue and drives a [`Machine`] one unit
//! of work at a time. A motion command stays at the front of the queue until
//! the machine reports it complete, which is what makes pause/resume work:
//! the retried command is re-dispatched against the machine's *current*
//! position, never a cached start point.

use std::collections::VecDeque;

use thiserror::Error;

use crate::machine::{Machine, MachineError, MoveOutcome};

use super::parser::{Command, Program};

/// What one `step()` call accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The queue is empty; nothing was dispatched and nothing moved.
    Idle,
    /// The front command ran to completion and was dequeued.
    Advanced,
    /// The front command made progress but is not finished (a pause was
    /// observed mid-move). It stays queued and is retried next step.
    Pending,
    /// An endstop ended the front command early. The command is dequeued;
    /// the target was not reached.
    SafetyStopped,
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("{keyword} failed: {source}")]
    Execution {
        keyword: &'static str,
        source: MachineError,
    },
}

pub struct Interpreter {
    queue: VecDeque<Command>,
}

impl Interpreter {
    pub fn new(program: Program) -> Self {
        Self {
            queue: program.commands,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Advance exactly one unit of work.
    ///
    /// A machine error dequeues the offending command before propagating,
    /// so a failing command cannot wedge the queue; the interpreter stays
    /// usable for the commands behind it.
    pub fn step(&mut self, machine: &mut dyn Machine) -> Result<StepOutcome, StepError> {
        let Some(command) = self.queue.front().cloned() else {
            return Ok(StepOutcome::Idle);
        };

        // Motion commands report progress; everything else is fire-and-forget
        // and finishes in one step, unconditionally.
        let motion = match &command {
            Command::RapidMove { x, y } => Some(machine.rapid_move(*x, *y)),
            Command::LinearMove { x, y, feed } => Some(machine.linear_move(*x, *y, *feed)),
            Command::ArcMove {
                clockwise,
                x,
                y,
                feed,
                radius,
            } => Some(machine.arc_move(*x, *y, *feed, *radius, *clockwise)),
            Command::Home => Some(machine.home()),
            Command::Dwell { millis } => {
                machine.dwell(*millis);
                None
            }
            Command::SetAbsolute => {
                machine.set_absolute();
                None
            }
            Command::SetRelative => {
                machine.set_relative();
                None
            }
            Command::StartAcquisition {
                pulses_per_sec,
                label,
            } => {
                machine.start_acquisition(*pulses_per_sec, label);
                None
            }
            Command::StopAcquisition => {
                machine.stop_acquisition();
                None
            }
            Command::StreamOn => {
                machine.stream_on();
                None
            }
            Command::StreamOff => {
                machine.stream_off();
                None
            }
            Command::SetExposure { microseconds } => {
                machine.set_exposure(*microseconds);
                None
            }
        };

        let Some(motion) = motion else {
            self.queue.pop_front();
            return Ok(StepOutcome::Advanced);
        };

        match motion {
            Ok(MoveOutcome::Completed) => {
                self.queue.pop_front();
                Ok(StepOutcome::Advanced)
            }
            Ok(MoveOutcome::Paused) => Ok(StepOutcome::Pending),
            Ok(MoveOutcome::SafetyStopped) => {
                tracing::warn!(keyword = command.keyword(), "move ended by safety stop");
                self.queue.pop_front();
                Ok(StepOutcome::SafetyStopped)
            }
            Err(source) => {
                self.queue.pop_front();
                Err(StepError::Execution {
                    keyword: command.keyword(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::gcode::parse;
    use crate::machine::MachineState;

    /// Machine double that replays a scripted list of motion outcomes.
    struct ScriptedMachine {
        state: Arc<MachineState>,
        script: Vec<Result<MoveOutcome, MachineError>>,
        motion_calls: usize,
        aux_calls: usize,
    }

    impl ScriptedMachine {
        fn new(script: Vec<Result<MoveOutcome, MachineError>>) -> Self {
            Self {
                state: Arc::new(MachineState::default()),
                script,
                motion_calls: 0,
                aux_calls: 0,
            }
        }

        fn next_outcome(&mut self) -> Result<MoveOutcome, MachineError> {
            let outcome = self.script.remove(0);
            self.motion_calls += 1;
            outcome
        }
    }

    impl Machine for ScriptedMachine {
        fn rapid_move(&mut self, _x: f64, _y: f64) -> Result<MoveOutcome, MachineError> {
            self.next_outcome()
        }

        fn linear_move(
            &mut self,
            _x: f64,
            _y: f64,
            _feed: f64,
        ) -> Result<MoveOutcome, MachineError> {
            self.next_outcome()
        }

        fn arc_move(
            &mut self,
            _x: f64,
            _y: f64,
            _feed: f64,
            _radius: f64,
            _clockwise: bool,
        ) -> Result<MoveOutcome, MachineError> {
            self.next_outcome()
        }

        fn home(&mut self) -> Result<MoveOutcome, MachineError> {
            self.next_outcome()
        }

        fn dwell(&mut self, _millis: u64) {
            self.aux_calls += 1;
        }

        fn set_absolute(&mut self) {
            self.aux_calls += 1;
        }

        fn set_relative(&mut self) {
            self.aux_calls += 1;
        }

        fn start_acquisition(&mut self, _pulses_per_sec: u32, _label: &str) {
            self.aux_calls += 1;
        }

        fn stop_acquisition(&mut self) {
            self.aux_calls += 1;
        }

        fn stream_on(&mut self) {
            self.aux_calls += 1;
        }

        fn stream_off(&mut self) {
            self.aux_calls += 1;
        }

        fn set_exposure(&mut self, _microseconds: u32) {
            self.aux_calls += 1;
        }

        fn state(&self) -> &Arc<MachineState> {
            &self.state
        }
    }

    #[test]
    fn empty_queue_reports_idle() {
        let mut machine = ScriptedMachine::new(vec![]);
        let mut interpreter = Interpreter::new(parse(""));
        assert!(interpreter.is_finished());
        assert!(matches!(
            interpreter.step(&mut machine),
            Ok(StepOutcome::Idle)
        ));
        assert_eq!(machine.motion_calls, 0);
    }

    #[test]
    fn completed_move_is_dequeued() {
        let mut machine = ScriptedMachine::new(vec![Ok(MoveOutcome::Completed)]);
        let mut interpreter = Interpreter::new(parse("G0 X1 Y2"));
        assert!(matches!(
            interpreter.step(&mut machine),
            Ok(StepOutcome::Advanced)
        ));
        assert!(interpreter.is_finished());
    }

    #[test]
    fn paused_move_stays_at_front_and_is_retried() {
        let mut machine = ScriptedMachine::new(vec![
            Ok(MoveOutcome::Paused),
            Ok(MoveOutcome::Completed),
        ]);
        let mut interpreter = Interpreter::new(parse("G1 X5 Y0 S2"));

        assert!(matches!(
            interpreter.step(&mut machine),
            Ok(StepOutcome::Pending)
        ));
        assert_eq!(interpreter.remaining(), 1);

        assert!(matches!(
            interpreter.step(&mut machine),
            Ok(StepOutcome::Advanced)
        ));
        assert!(interpreter.is_finished());
        assert_eq!(machine.motion_calls, 2);
    }

    #[test]
    fn safety_stop_dequeues_without_error() {
        let mut machine = ScriptedMachine::new(vec![Ok(MoveOutcome::SafetyStopped)]);
        let mut interpreter = Interpreter::new(parse("G1 X5 Y0 S2"));
        assert!(matches!(
            interpreter.step(&mut machine),
            Ok(StepOutcome::SafetyStopped)
        ));
        assert!(interpreter.is_finished());
    }

    #[test]
    fn machine_error_pops_command_and_propagates() {
        let mut machine = ScriptedMachine::new(vec![
            Err(MachineError::OutOfBounds {
                axis: crate::machine::Axis::X,
                target_steps: 99,
            }),
            Ok(MoveOutcome::Completed),
        ]);
        let mut interpreter = Interpreter::new(parse("G0 X999 Y0 G0 X1 Y0"));

        assert!(interpreter.step(&mut machine).is_err());
        // The failing command is gone; the next one still runs.
        assert_eq!(interpreter.remaining(), 1);
        assert!(matches!(
            interpreter.step(&mut machine),
            Ok(StepOutcome::Advanced)
        ));
    }

    #[test]
    fn auxiliary_commands_complete_in_one_step() {
        let mut machine = ScriptedMachine::new(vec![]);
        let mut interpreter = Interpreter::new(parse("M1000 F20 \"a\" M1001 M1002 M1003 M1004 E100 G90 G91"));
        let mut advanced = 0;
        while let Ok(StepOutcome::Advanced) = interpreter.step(&mut machine) {
            advanced += 1;
        }
        assert_eq!(advanced, 7);
        assert_eq!(machine.aux_calls, 7);
        assert_eq!(machine.motion_calls, 0);
    }
}
