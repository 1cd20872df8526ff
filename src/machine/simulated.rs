//! Reference backend: a virtual linear-motion machine.
//!
//! Keeps position as plain floats with no step quantization and advances
//! toward each target in fixed-size increments timed to approximate the
//! requested feed rate. Serves as the test double and as the backend for
//! builds without the rig attached.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::recorder::Recorder;

use super::{CoordMode, Machine, MachineError, MachineState, MoveOutcome, arc};

/// Feeds at or below zero would stall the increment timer; clamp them.
const MIN_FEED: f64 = 0.1;

pub struct SimulatedMachine {
    position: (f64, f64),
    mode: CoordMode,
    increment_mm: f64,
    epsilon_mm: f64,
    realtime_factor: f64,
    rapid_feed: f64,
    state: Arc<MachineState>,
    recorder: Box<dyn Recorder>,
}

impl SimulatedMachine {
    pub fn new(config: &Config, state: Arc<MachineState>, recorder: Box<dyn Recorder>) -> Self {
        state.publish_position(0.0, 0.0);
        Self {
            position: (0.0, 0.0),
            mode: CoordMode::default(),
            increment_mm: config.simulated.increment_mm,
            epsilon_mm: config.simulated.epsilon_mm,
            realtime_factor: config.simulated.realtime_factor,
            rapid_feed: config.machine.rapid_feed,
            state,
            recorder,
        }
    }

    /// Walk toward `target` one increment at a time, honoring pause
    /// requests between increments.
    fn seek(&mut self, target: (f64, f64), feed: f64) -> MoveOutcome {
        let feed = feed.max(MIN_FEED);
        loop {
            if self.state.take_pause() {
                tracing::debug!(position = ?self.position, "pause observed mid-move");
                return MoveOutcome::Paused;
            }

            let dx = target.0 - self.position.0;
            let dy = target.1 - self.position.1;
            let remaining = (dx * dx + dy * dy).sqrt();
            if remaining <= self.epsilon_mm {
                self.position = target;
                self.state.publish_position(target.0, target.1);
                return MoveOutcome::Completed;
            }

            let step = remaining.min(self.increment_mm);
            self.position.0 += dx / remaining * step;
            self.position.1 += dy / remaining * step;
            self.state.publish_position(self.position.0, self.position.1);

            thread::sleep(Duration::from_secs_f64(step / feed / self.realtime_factor));
        }
    }
}

impl Machine for SimulatedMachine {
    fn rapid_move(&mut self, x: f64, y: f64) -> Result<MoveOutcome, MachineError> {
        Ok(self.seek((x, y), self.rapid_feed))
    }

    fn linear_move(&mut self, x: f64, y: f64, feed: f64) -> Result<MoveOutcome, MachineError> {
        Ok(self.seek((x, y), feed))
    }

    fn arc_move(
        &mut self,
        x: f64,
        y: f64,
        feed: f64,
        radius: f64,
        clockwise: bool,
    ) -> Result<MoveOutcome, MachineError> {
        // Planned before anything moves; a rejected arc leaves position
        // untouched. Re-planning from the current position on each call is
        // what resumes a paused arc at its interrupted segment.
        let plan = arc::plan(self.position, (x, y), radius, clockwise, 0.0)?;
        for waypoint in &plan.waypoints {
            let segment_feed = feed * waypoint.feed_share;
            match self.seek((waypoint.x, waypoint.y), segment_feed) {
                MoveOutcome::Completed => {}
                other => return Ok(other),
            }
        }
        Ok(MoveOutcome::Completed)
    }

    fn home(&mut self) -> Result<MoveOutcome, MachineError> {
        let outcome = self.seek((0.0, 0.0), self.rapid_feed);
        if outcome == MoveOutcome::Completed {
            self.state.set_calibrated(true);
            tracing::info!("simulated machine homed");
        }
        Ok(outcome)
    }

    fn dwell(&mut self, millis: u64) {
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

    fn fast_machine() -> SimulatedMachine {
        let mut config = Config::default();
        config.simulated.realtime_factor = 10_000.0;
        SimulatedMachine::new(
            &config,
            Arc::new(MachineState::default()),
            Box::new(LogRecorder),
        )
    }

    #[test]
    fn linear_move_lands_on_target() {
        let mut machine = fast_machine();
        let outcome = machine.linear_move(10.0, 0.0, 5.0).unwrap();
        assert_eq!(outcome, MoveOutcome::Completed);
        assert_eq!(machine.get_position(), (10.0, 0.0));
    }

    #[test]
    fn home_reaches_origin_and_calibrates() {
        let mut machine = fast_machine();
        machine.linear_move(3.0, 4.0, 50.0).unwrap();
        assert!(!machine.is_calibrated());

        let outcome = machine.home().unwrap();
        assert_eq!(outcome, MoveOutcome::Completed);
        assert_eq!(machine.get_position(), (0.0, 0.0));
        assert!(machine.is_calibrated());
    }

    #[test]
    fn pending_pause_stops_before_the_first_increment() {
        let mut machine = fast_machine();
        machine.state().request_pause();
        let outcome = machine.linear_move(10.0, 0.0, 5.0).unwrap();
        assert_eq!(outcome, MoveOutcome::Paused);
        assert_eq!(machine.get_position(), (0.0, 0.0));
        // The request was consumed; the retry completes.
        let outcome = machine.linear_move(10.0, 0.0, 5.0).unwrap();
        assert_eq!(outcome, MoveOutcome::Completed);
    }

    #[test]
    fn impossible_arc_fails_without_moving() {
        let mut machine = fast_machine();
        let err = machine.arc_move(10.0, 0.0, 5.0, 2.0, true).unwrap_err();
        assert!(matches!(err, MachineError::Arc(_)));
        assert_eq!(machine.get_position(), (0.0, 0.0));
    }

    #[test]
    fn arc_move_traverses_to_the_endpoint() {
        let mut machine = fast_machine();
        let outcome = machine.arc_move(10.0, 0.0, 20.0, 5.0, true).unwrap();
        assert_eq!(outcome, MoveOutcome::Completed);
        let (x, y) = machine.get_position();
        assert!((x - 10.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }
}
