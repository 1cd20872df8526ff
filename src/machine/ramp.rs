//! Acceleration/deceleration ramp profiles.
//!
//! A move regenerates its ramps every time, because total distance and
//! commanded speed differ per call. The profile is exponential rather than
//! linear: stepper torque falls off with speed, so the low-speed end of the
//! ramp needs more dwell per step than the high-speed end.

/// Base of the exponential profile. `logspace(-1, 0)` over this base spans
/// multipliers from 1/6 up to 1.
const PROFILE_BASE: f64 = 6.0;

/// Multipliers never drop below this, including outside the profile range.
const SPEED_FLOOR: f64 = 0.1;

/// Where the current step count falls within a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPhase {
    Accelerating,
    Cruising,
    Decelerating,
}

/// Precomputed per-move speed multiplier arrays: a rising profile into the
/// move and a falling profile out of it.
#[derive(Debug, Clone)]
pub struct MotionRamp {
    rising: Vec<f64>,
    falling: Vec<f64>,
}

impl MotionRamp {
    /// Build profiles of `ramp_steps` entries (at least one).
    pub fn new(ramp_steps: usize) -> Self {
        let n = ramp_steps.max(1);
        let rising: Vec<f64> = if n == 1 {
            vec![1.0]
        } else {
            (0..n)
                .map(|i| PROFILE_BASE.powf(-1.0 + i as f64 / (n - 1) as f64))
                .collect()
        };
        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        Self { rising, falling }
    }

    pub fn ramp_steps(&self) -> u64 {
        self.rising.len() as u64
    }

    /// Which phase a move is in after `steps_done` of `total_steps`.
    ///
    /// When the move is shorter than two full ramps the rising profile wins,
    /// matching the reference rig: short moves never reach cruise speed.
    pub fn phase(&self, steps_done: u64, total_steps: u64) -> RampPhase {
        if steps_done <= self.ramp_steps() {
            RampPhase::Accelerating
        } else if steps_done >= total_steps.saturating_sub(self.ramp_steps()) {
            RampPhase::Decelerating
        } else {
            RampPhase::Cruising
        }
    }

    /// Speed multiplier for the step after `steps_done` of `total_steps`,
    /// clamped to `[SPEED_FLOOR, 1.0]`.
    pub fn factor(&self, steps_done: u64, total_steps: u64) -> f64 {
        let raw = match self.phase(steps_done, total_steps) {
            RampPhase::Accelerating => {
                let i = (steps_done as usize).min(self.rising.len() - 1);
                self.rising[i]
            }
            RampPhase::Decelerating => {
                let progress = steps_done - total_steps.saturating_sub(self.ramp_steps());
                let i = (progress as usize).min(self.falling.len() - 1);
                self.falling[i]
            }
            RampPhase::Cruising => 1.0,
        };
        raw.max(SPEED_FLOOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_entry_ramp_runs_at_full_speed() {
        let ramp = MotionRamp::new(0);
        assert_eq!(ramp.ramp_steps(), 1);
        assert_eq!(ramp.factor(0, 10), 1.0);
    }

    #[test]
    fn rising_profile_is_monotonic_and_normalized() {
        let ramp = MotionRamp::new(20);
        let factors: Vec<f64> = (0..20).map(|i| ramp.factor(i, 1000)).collect();
        for pair in factors.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(factors[0] >= 0.1 && factors[0] < 0.2);
        assert!((factors[19] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn factor_selects_phase_by_step_count() {
        let ramp = MotionRamp::new(10);
        assert_eq!(ramp.phase(5, 100), RampPhase::Accelerating);
        assert_eq!(ramp.phase(50, 100), RampPhase::Cruising);
        assert_eq!(ramp.phase(95, 100), RampPhase::Decelerating);
        assert_eq!(ramp.factor(50, 100), 1.0);
        // Tail of the move mirrors the head.
        assert!(ramp.factor(99, 100) < 0.2);
    }

    #[test]
    fn short_moves_never_cruise() {
        let ramp = MotionRamp::new(50);
        for done in 0..10 {
            assert_eq!(ramp.phase(done, 10), RampPhase::Accelerating);
        }
    }

    #[test]
    fn factor_never_drops_below_floor() {
        let ramp = MotionRamp::new(100);
        for done in 0..100 {
            let f = ramp.factor(done, 100);
            assert!((0.1..=1.0).contains(&f));
        }
    }
}
