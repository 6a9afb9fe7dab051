use tracing::debug;

use crate::error::GestureError;

/// Sequencer checking that the postures of a gesture are detected in order,
/// with a trained time interval between consecutive postures.
///
/// States run from 0 (waiting for the first posture) to `state_count`.
/// Reaching `state_count` reports the gesture and resets to 0 in the same call.
#[derive(Debug, Clone)]
pub struct Fsm {
    state_count: usize,
    state: usize,
    state_start_time: f32,
    state_elapsed: f32,
    /// `intervals[i]` is the expected time between posture i+1 and i+2
    intervals: Vec<f32>,
    tolerances: Vec<f32>,
    tolerance_mul: f32,
}

impl Fsm {
    pub fn new(
        state_count: usize,
        intervals: &[f32],
        tolerances: &[f32],
        tolerance_mul: f32,
    ) -> Result<Self, GestureError> {
        if state_count == 0 {
            return Err(GestureError::EmptySequence);
        }
        let expected = state_count - 1;
        if intervals.len() != expected {
            return Err(GestureError::LengthMismatch {
                what: "intervals",
                expected,
                actual: intervals.len(),
            });
        }
        if tolerances.len() != expected {
            return Err(GestureError::LengthMismatch {
                what: "interval tolerances",
                expected,
                actual: tolerances.len(),
            });
        }
        Ok(Self {
            state_count,
            state: 0,
            state_start_time: 0.0,
            state_elapsed: 0.0,
            intervals: intervals.to_vec(),
            tolerances: tolerances.to_vec(),
            tolerance_mul,
        })
    }

    pub fn state(&self) -> usize {
        self.state
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    /// Seconds spent in the current state as of the last update
    pub fn state_elapsed(&self) -> f32 {
        self.state_elapsed
    }

    /// Advance with this frame's posture detections. `triggers[i]` is true if
    /// posture i+1 was detected. Returns true when the last posture completes
    /// the sequence.
    pub fn update(&mut self, triggers: &[bool], now: f32) -> bool {
        let triggered = |i: usize| triggers.get(i).copied().unwrap_or(false);
        self.state_elapsed = now - self.state_start_time;

        match self.state {
            0 => {
                self.state_start_time = now;
                self.state_elapsed = 0.0;
                if !triggered(0) {
                    return false;
                }
                self.next_state(now);
            }
            1 => {
                if triggered(1) && self.not_too_fast() {
                    self.next_state(now);
                } else if triggered(0) {
                    // The first posture may be held as long as it keeps matching
                    self.state_start_time = now;
                } else {
                    self.check_timeout();
                }
            }
            s if s < self.state_count => {
                if triggered(s) && self.not_too_fast() {
                    self.next_state(now);
                } else {
                    self.check_timeout();
                }
            }
            _ => {}
        }

        if self.state == self.state_count {
            debug!("sequence of {} postures completed", self.state_count);
            self.reset();
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.state = 0;
        self.state_start_time = 0.0;
        self.state_elapsed = 0.0;
    }

    fn next_state(&mut self, now: f32) {
        self.state += 1;
        self.state_start_time = now;
        debug!("sequencer -> state {} at {:.3}s", self.state, now);
    }

    fn window(&self) -> (f32, f32) {
        let i = self.state - 1;
        let slack = self.tolerances[i] * self.tolerance_mul;
        (self.intervals[i] - slack, self.intervals[i] + slack)
    }

    fn check_timeout(&mut self) {
        let (_, latest) = self.window();
        if self.state_elapsed > latest {
            debug!(
                "sequencer timed out in state {} after {:.3}s",
                self.state, self.state_elapsed
            );
            self.reset();
        }
    }

    fn not_too_fast(&self) -> bool {
        let (earliest, _) = self.window();
        self.state_elapsed >= earliest
    }
}
