//! Real backend: timed step pulses on two independent axes.
//!
//! One loop drives both axes concurrently. Per axis it keeps a step count,
//! a direction, and a regenerated [`MotionRamp`]; on every tick an axis
//! whose interval has elapsed gets its step pin toggled, a rising edge
//! counting as one completed step. Endstops are polled every tick and trip
//! a fixed-length reversal that abandons the move.
//!
//! Step timing is sub-millisecond, so the loop is a deliberate busy-wait:
//! no sleeping or yielding between ticks.

use std::fmt::Debug;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::digital::{InputPin, StatefulOutputPin};

use crate::config::Config;
use crate::hardware::{AxisPins, RigPins};
use crate::recorder::Recorder;

use super::ramp::{MotionRamp, RampPhase};
use super::{Axis, CoordMode, Machine, MachineError, MachineState, MoveOutcome, arc};

/// Commanded speeds at or below zero still have to tick; clamp in steps/s.
const MIN_SPEED_STEPS: f64 = 0.1;

pub struct StepperMachine<O, I> {
    pins: RigPins<O, I>,
    steps_per_mm: f64,
    min_position: i64,
    max_position: i64,
    accel_fraction: f64,
    rapid_feed: f64,
    reversal_steps: u32,
    reversal_half_period: Duration,
    homing_feed: f64,
    homing_target: f64,
    position_x: i64,
    position_y: i64,
    mode: CoordMode,
    state: Arc<MachineState>,
    recorder: Box<dyn Recorder>,
}

/// Per-axis drive state for one move. Built fresh every call: total
/// distance and speed differ per move, so the ramp does too.
#[derive(Debug)]
struct AxisDrive {
    forward: bool,
    total: u64,
    remaining: u64,
    /// Effective speed in steps/s, already clamped.
    speed: f64,
    interval: Duration,
    last_toggle: Instant,
    ramp: MotionRamp,
    phase: AxisPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisPhase {
    Accelerating,
    Cruising,
    Decelerating,
    Done,
}

impl AxisDrive {
    fn new(current: i64, target: i64, speed_steps: f64, accel_fraction: f64, now: Instant) -> Self {
        let forward = target > current;
        let total = current.abs_diff(target);
        let speed = speed_steps.max(MIN_SPEED_STEPS);
        let ramp = MotionRamp::new((accel_fraction * speed) as usize);
        Self {
            forward,
            total,
            remaining: total,
            speed,
            interval: Duration::from_secs_f64(1.0 / speed),
            last_toggle: now,
            ramp,
            phase: if total == 0 {
                AxisPhase::Done
            } else {
                AxisPhase::Accelerating
            },
        }
    }

    fn done(&self) -> bool {
        self.phase == AxisPhase::Done
    }

    fn delta(&self) -> i64 {
        if self.forward { 1 } else { -1 }
    }

    /// Transition after a completed step: advance the phase and recompute
    /// the interval from whichever ramp segment the step count now falls in.
    fn on_step_completed(&mut self) {
        self.remaining -= 1;
        if self.remaining == 0 {
            self.phase = AxisPhase::Done;
            return;
        }
        let done = self.total - self.remaining;
        self.phase = match self.ramp.phase(done, self.total) {
            RampPhase::Accelerating => AxisPhase::Accelerating,
            RampPhase::Cruising => AxisPhase::Cruising,
            RampPhase::Decelerating => AxisPhase::Decelerating,
        };
        let factor = self.ramp.factor(done, self.total);
        self.interval = Duration::from_secs_f64(1.0 / (self.speed * factor));
    }
}

fn pin_err<E: Debug>(e: E) -> MachineError {
    MachineError::Pin(format!("{e:?}"))
}

fn set_level<P: StatefulOutputPin>(pin: &mut P, high: bool) -> Result<(), MachineError> {
    if high {
        pin.set_high().map_err(pin_err)
    } else {
        pin.set_low().map_err(pin_err)
    }
}

fn endstop_tripped<O, I: InputPin>(pins: &mut AxisPins<O, I>) -> Result<bool, MachineError> {
    Ok(pins.min_stop.is_high().map_err(pin_err)? || pins.max_stop.is_high().map_err(pin_err)?)
}

/// Toggle the axis's step pin if its interval has elapsed. Returns whether
/// a full step completed (rising edge).
fn service_axis<O: StatefulOutputPin, I>(
    drive: &mut AxisDrive,
    pins: &mut AxisPins<O, I>,
    position: &mut i64,
    now: Instant,
) -> Result<bool, MachineError> {
    if drive.done() || now.duration_since(drive.last_toggle) < drive.interval {
        return Ok(false);
    }
    pins.step.toggle().map_err(pin_err)?;
    drive.last_toggle = now;
    if pins.step.is_set_high().map_err(pin_err)? {
        *position += drive.delta();
        drive.on_step_completed();
        return Ok(true);
    }
    Ok(false)
}

impl<O, I> StepperMachine<O, I>
where
    O: StatefulOutputPin,
    I: InputPin,
{
    pub fn new(
        pins: RigPins<O, I>,
        config: &Config,
        state: Arc<MachineState>,
        recorder: Box<dyn Recorder>,
    ) -> Self {
        state.publish_position(0.0, 0.0);
        Self {
            pins,
            steps_per_mm: config.machine.steps_per_mm,
            min_position: config.machine.min_position,
            max_position: config.machine.max_position,
            accel_fraction: config.stepper.accel_fraction,
            rapid_feed: config.machine.rapid_feed,
            reversal_steps: config.stepper.reversal_steps,
            reversal_half_period: Duration::from_micros(config.stepper.pulse_interval_us / 2),
            homing_feed: config.stepper.homing_feed,
            homing_target: config.stepper.homing_target,
            position_x: 0,
            position_y: 0,
            mode: CoordMode::default(),
            state,
            recorder,
        }
    }

    // The X axis is wired mirrored: positive millimeters run toward
    // negative step counts. Y keeps its sign.
    fn x_steps(&self, mm: f64) -> i64 {
        (-mm * self.steps_per_mm).round() as i64
    }

    fn y_steps(&self, mm: f64) -> i64 {
        (mm * self.steps_per_mm).round() as i64
    }

    /// Millimeter position derived from the authoritative step counts.
    fn position_mm(&self) -> (f64, f64) {
        (
            -(self.position_x as f64) / self.steps_per_mm,
            self.position_y as f64 / self.steps_per_mm,
        )
    }

    fn publish(&self) {
        let (x, y) = self.position_mm();
        self.state.publish_position(x, y);
    }

    fn check_bounds(&self, axis: Axis, target_steps: i64) -> Result<(), MachineError> {
        if target_steps > self.max_position || target_steps < self.min_position {
            return Err(MachineError::OutOfBounds { axis, target_steps });
        }
        Ok(())
    }

    /// Run one dual-axis move: per-axis speeds in mm/s, targets in mm.
    fn drive(
        &mut self,
        speed_x: f64,
        target_x_mm: f64,
        speed_y: f64,
        target_y_mm: f64,
    ) -> Result<MoveOutcome, MachineError> {
        let target_x = self.x_steps(target_x_mm);
        let target_y = self.y_steps(target_y_mm);
        self.check_bounds(Axis::X, target_x)?;
        self.check_bounds(Axis::Y, target_y)?;

        // Starting a move re-arms a machine stopped at an endstop; a switch
        // that is still pressed re-trips on the first tick.
        self.state.set_emergency_stop(false);

        let now = Instant::now();
        let mut x = AxisDrive::new(
            self.position_x,
            target_x,
            speed_x * self.steps_per_mm,
            self.accel_fraction,
            now,
        );
        let mut y = AxisDrive::new(
            self.position_y,
            target_y,
            speed_y * self.steps_per_mm,
            self.accel_fraction,
            now,
        );
        set_level(&mut self.pins.x.dir, x.forward)?;
        set_level(&mut self.pins.y.dir, y.forward)?;
        tracing::debug!(
            target_x,
            target_y,
            x_steps = x.total,
            y_steps = y.total,
            "starting move"
        );

        let outcome = self.pulse_loop(&mut x, &mut y);
        set_level(&mut self.pins.x.step, false)?;
        set_level(&mut self.pins.y.step, false)?;
        outcome
    }

    /// The tick loop. Exits on exactly one of: both axes done (Completed),
    /// emergency stop observed (SafetyStopped), pause observed (Paused), or
    /// an endstop trip after its reversal (SafetyStopped).
    fn pulse_loop(
        &mut self,
        x: &mut AxisDrive,
        y: &mut AxisDrive,
    ) -> Result<MoveOutcome, MachineError> {
        loop {
            if x.done() && y.done() {
                return Ok(MoveOutcome::Completed);
            }
            if self.state.emergency_stop() {
                return Ok(MoveOutcome::SafetyStopped);
            }
            if self.state.take_pause() {
                tracing::debug!(position = ?self.position_mm(), "pause observed mid-move");
                return Ok(MoveOutcome::Paused);
            }
            if endstop_tripped(&mut self.pins.x)? {
                self.reverse(Axis::X)?;
                return Ok(MoveOutcome::SafetyStopped);
            }
            if endstop_tripped(&mut self.pins.y)? {
                self.reverse(Axis::Y)?;
                return Ok(MoveOutcome::SafetyStopped);
            }

            let now = Instant::now();
            let stepped_x = service_axis(x, &mut self.pins.x, &mut self.position_x, now)?;
            let stepped_y = service_axis(y, &mut self.pins.y, &mut self.position_y, now)?;
            if stepped_x || stepped_y {
                self.publish();
            }
        }
    }

    /// Fixed-length back-off after an endstop trip: toggle direction, step
    /// back at the safe interval, engage the emergency stop.
    fn reverse(&mut self, axis: Axis) -> Result<(), MachineError> {
        tracing::warn!(%axis, "endstop triggered, reversing");
        let half_period = self.reversal_half_period;
        let steps = self.reversal_steps;
        let (pins, position) = match axis {
            Axis::X => (&mut self.pins.x, &mut self.position_x),
            Axis::Y => (&mut self.pins.y, &mut self.position_y),
        };

        let now_forward = pins.dir.is_set_low().map_err(pin_err)?;
        set_level(&mut pins.dir, now_forward)?;
        let delta = if now_forward { 1 } else { -1 };

        for _ in 0..steps {
            pins.step.set_high().map_err(pin_err)?;
            thread::sleep(half_period);
            pins.step.set_low().map_err(pin_err)?;
            thread::sleep(half_period);
            *position += delta;
        }

        self.publish();
        self.state.set_emergency_stop(true);
        tracing::info!(%axis, "reversal complete, emergency stop engaged");
        Ok(())
    }
}

impl<O, I> Machine for StepperMachine<O, I>
where
    O: StatefulOutputPin + Send,
    I: InputPin + Send,
{
    fn rapid_move(&mut self, x: f64, y: f64) -> Result<MoveOutcome, MachineError> {
        self.linear_move(x, y, self.rapid_feed)
    }

    fn linear_move(&mut self, x: f64, y: f64, feed: f64) -> Result<MoveOutcome, MachineError> {
        let (current_x, current_y) = self.position_mm();
        let dx = x - current_x;
        let dy = y - current_y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance == 0.0 {
            return Ok(MoveOutcome::Completed);
        }
        // Split the feed so both axes arrive together.
        let speed_x = dx.abs() / distance * feed;
        let speed_y = dy.abs() / distance * feed;
        self.drive(speed_x, x, speed_y, y)
    }

    fn arc_move(
        &mut self,
        x: f64,
        y: f64,
        feed: f64,
        radius: f64,
        clockwise: bool,
    ) -> Result<MoveOutcome, MachineError> {
        // Planned before anything moves; a rejected arc leaves the position
        // untouched. Re-planning from the current position on each call is
        // what resumes a paused arc at the interrupted segment.
        let quantum = 1.0 / self.steps_per_mm;
        let plan = arc::plan(self.position_mm(), (x, y), radius, clockwise, quantum)?;
        tracing::debug!(
            waypoints = plan.waypoints.len(),
            center = ?plan.center,
            "arc planned"
        );
        for waypoint in &plan.waypoints {
            match self.linear_move(waypoint.x, waypoint.y, feed * waypoint.feed_share)? {
                MoveOutcome::Completed => {}
                other => return Ok(other),
            }
        }
        Ok(MoveOutcome::Completed)
    }

    fn home(&mut self) -> Result<MoveOutcome, MachineError> {
        tracing::info!("homing: sweeping to the reference corner");
        // Y sweep first, then X, as the rig is cabled; each sweep is a
        // bounded move that the endstop reversal ends.
        let first = self.drive(0.0, 0.0, self.homing_feed, self.homing_target)?;
        if first == MoveOutcome::Paused {
            return Ok(MoveOutcome::Paused);
        }
        let second = self.drive(self.homing_feed, self.homing_target, 0.0, 0.0)?;
        if second == MoveOutcome::Paused {
            return Ok(MoveOutcome::Paused);
        }

        self.position_x = 0;
        self.position_y = 0;
        self.publish();
        self.state.set_emergency_stop(false);
        self.state.set_calibrated(true);
        tracing::info!("homing complete, origin established");
        Ok(MoveOutcome::Completed)
    }

    fn dwell(&mut self, millis: u64) {
        tracing::debug!(millis, "dwell");
        thread::sleep(Duration::from_millis(millis));
    }

    fn set_absolute(&mut self) {
        self.mode = CoordMode::Absolute;
        tracing::debug!(mode = ?self.mode, "coordinate mode recorded, not applied to motion");
    }

    fn set_relative(&mut self) {
        self.mode = CoordMode::Relative;
        tracing::debug!(mode = ?self.mode, "coordinate mode recorded, not applied to motion");
    }

    fn start_acquisition(&mut self, pulses_per_sec: u32, label: &str) {
        self.recorder.start_acquisition(pulses_per_sec, label);
    }

    fn stop_acquisition(&mut self) {
        self.recorder.stop_acquisition();
    }

    fn stream_on(&mut self) {
        self.recorder.stream_on();
    }

    fn stream_off(&mut self) {
        self.recorder.stream_off();
    }

    fn set_exposure(&mut self, microseconds: u32) {
        self.recorder.set_exposure(microseconds);
    }

    fn state(&self) -> &Arc<MachineState> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::LogRecorder;

    fn machine() -> StepperMachine<crate::hardware::MemoryPin, crate::hardware::MemoryPin> {
        let (pins, _probe) = RigPins::in_memory();
        StepperMachine::new(
            pins,
            &Config::default(),
            Arc::new(MachineState::default()),
            Box::new(LogRecorder),
        )
    }

    #[test]
    fn millimeters_convert_to_mirrored_step_counts() {
        let m = machine();
        assert_eq!(m.x_steps(10.0), -800);
        assert_eq!(m.y_steps(10.0), 800);
        assert_eq!(m.x_steps(-2.5), 200);
    }

    #[test]
    fn derived_millimeters_round_trip_the_step_counts() {
        let mut m = machine();
        m.position_x = m.x_steps(12.0);
        m.position_y = m.y_steps(-7.0);
        let (x, y) = m.position_mm();
        assert!((x - 12.0).abs() < 1e-12);
        assert!((y + 7.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_bounds_target_is_fatal_and_motionless() {
        let mut m = machine();
        let err = m.linear_move(200_000.0, 0.0, 50.0).unwrap_err();
        assert!(matches!(
            err,
            MachineError::OutOfBounds { axis: Axis::X, .. }
        ));
        assert_eq!((m.position_x, m.position_y), (0, 0));
        assert!(!m.state.emergency_stop());
    }

    #[test]
    fn zero_distance_move_completes_immediately() {
        let mut m = machine();
        assert_eq!(
            m.linear_move(0.0, 0.0, 50.0).unwrap(),
            MoveOutcome::Completed
        );
    }
}
