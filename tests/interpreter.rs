// End-to-end scenarios: parsed programs stepped against the simulated
// machine.

use std::sync::Arc;
use std::time::Duration;

use gantry_host::config::Config;
use gantry_host::gcode::{Interpreter, StepOutcome, parse};
use gantry_host::machine::{Machine, MachineState, simulated::SimulatedMachine};
use gantry_host::recorder::LogRecorder;

fn simulated(realtime_factor: f64) -> (SimulatedMachine, Arc<MachineState>) {
    let mut config = Config::default();
    config.simulated.realtime_factor = realtime_factor;
    let state = Arc::new(MachineState::default());
    let machine = SimulatedMachine::new(&config, Arc::clone(&state), Box::new(LogRecorder));
    (machine, state)
}

fn run_to_completion(interpreter: &mut Interpreter, machine: &mut dyn Machine) {
    while !interpreter.is_finished() {
        interpreter.step(machine).expect("step failed");
    }
}

#[test]
fn homing_a_fresh_machine_calibrates_at_origin() {
    let (mut machine, _state) = simulated(10_000.0);
    let mut interpreter = Interpreter::new(parse("G28"));

    run_to_completion(&mut interpreter, &mut machine);

    assert!(machine.is_calibrated());
    assert_eq!(machine.get_position(), (0.0, 0.0));
}

#[test]
fn linear_move_runs_to_its_target() {
    let (mut machine, _state) = simulated(10_000.0);
    let mut interpreter = Interpreter::new(parse("G1 X10 Y0 S5"));

    run_to_completion(&mut interpreter, &mut machine);

    assert_eq!(machine.get_position(), (10.0, 0.0));
}

#[test]
fn malformed_program_finishes_immediately_without_motion() {
    let (mut machine, _state) = simulated(10_000.0);
    let program = parse("G1 X10 Y0");
    assert_eq!(program.diagnostics.len(), 1);

    let mut interpreter = Interpreter::new(program);
    assert!(interpreter.is_finished());
    assert!(matches!(
        interpreter.step(&mut machine),
        Ok(StepOutcome::Idle)
    ));
    assert_eq!(machine.get_position(), (0.0, 0.0));
}

#[test]
fn stepping_an_empty_queue_never_mutates_position() {
    let (mut machine, _state) = simulated(10_000.0);
    let mut interpreter = Interpreter::new(parse(""));
    for _ in 0..5 {
        assert!(matches!(
            interpreter.step(&mut machine),
            Ok(StepOutcome::Idle)
        ));
    }
    assert_eq!(machine.get_position(), (0.0, 0.0));
}

#[test]
fn pause_midway_leaves_the_command_queued_and_position_partial() {
    // 20 increments of 0.5 mm at ~10 ms each; the pause lands a few
    // increments in.
    let (mut machine, state) = simulated(10.0);
    let mut interpreter = Interpreter::new(parse("G1 X10 Y0 S5"));

    let pauser = {
        let state = Arc::clone(&state);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(35));
            state.request_pause();
        })
    };

    let outcome = interpreter.step(&mut machine).expect("step failed");
    pauser.join().expect("pauser thread");

    assert_eq!(outcome, StepOutcome::Pending);
    assert_eq!(interpreter.remaining(), 1);
    let (x, _) = machine.get_position();
    assert!(x > 0.0 && x < 10.0, "position should be partway, got {x}");

    // Resume: the same command completes the move to the commanded target.
    let outcome = interpreter.step(&mut machine).expect("step failed");
    assert_eq!(outcome, StepOutcome::Advanced);
    assert!(interpreter.is_finished());
    assert_eq!(machine.get_position(), (10.0, 0.0));
}

#[test]
fn impossible_arc_surfaces_as_step_error_and_is_dropped() {
    let (mut machine, _state) = simulated(10_000.0);
    // Chord of 10 mm but radius of only 2 mm, followed by a valid home.
    let mut interpreter = Interpreter::new(parse("G2 X10 Y0 S5 R2 G28"));

    assert!(interpreter.step(&mut machine).is_err());
    assert_eq!(machine.get_position(), (0.0, 0.0));

    // The queue advanced past the bad arc; homing still runs.
    run_to_completion(&mut interpreter, &mut machine);
    assert!(machine.is_calibrated());
}
