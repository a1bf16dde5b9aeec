//! [`MovementMonitor`] – per-tick completion check for a grasp goal.
//!
//! Each tick compares the freshly sampled joint angles against two things:
//!
//! 1. **The target.**  When every joint is within `goal_tolerance` of its
//!    target the goal is [`Verdict::Reached`] with
//!    [`CompletionReason::GoalReached`].
//! 2. **The previous sample.**  A joint whose angle changed by less than
//!    `no_move_tolerance` since the last tick has its no-move counter bumped;
//!    any larger change bumps its move counter and clears the no-move
//!    counter.  Once every joint has been still for `stall_ticks`
//!    consecutive ticks the fingers are taken to have closed on an object
//!    and the goal is [`Verdict::Reached`] with [`CompletionReason::Stalled`].
//!
//! Ticks without usable sensor data yield [`Verdict::SensorError`] and are
//! counted; the controller decides when too many in a row end the goal.
//!
//! The monitor is plain data with no clock or I/O of its own.  All buffers
//! are sized once at construction and reused across goals.
//!
//! # Example
//!
//! ```rust
//! use grasp_control::monitor::{MovementMonitor, Verdict};
//! use grasp_types::{CompletionReason, Thresholds};
//! use tokio::time::Instant;
//!
//! let thresholds = Thresholds::new(0.05, 0.01, 10.0);
//! let mut monitor = MovementMonitor::new(2, &thresholds);
//! monitor.reset(&[0.0, 0.0], Some(&[0.5, 0.5]), Instant::now());
//!
//! assert_eq!(monitor.evaluate(&[0.2, 0.2], Instant::now()), Verdict::Pending);
//! assert_eq!(
//!     monitor.evaluate(&[0.03, 0.04], Instant::now()),
//!     Verdict::Reached(CompletionReason::GoalReached),
//! );
//! ```

use grasp_types::{CompletionReason, Thresholds};
use tokio::time::Instant;

/// Result of one monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep ticking.
    Pending,
    /// The goal is complete and successful.
    Reached(CompletionReason),
    /// No usable sensor data this tick.
    SensorError,
}

/// Completion state of the current goal: target, last sample, and per-joint
/// movement counters.
#[derive(Debug, Clone)]
pub struct MovementMonitor {
    goal_tolerance: f32,
    no_move_tolerance: f32,
    stall_ticks: u32,
    target: Vec<f32>,
    last_angles: Vec<f32>,
    /// Time of `last_angles`; `None` until the first sample of a goal.
    last_sample_at: Option<Instant>,
    move_count: Vec<u32>,
    no_move_count: Vec<u32>,
    sensor_errors: u32,
}

impl MovementMonitor {
    /// Create a monitor for `joint_count` joints.
    pub fn new(joint_count: usize, thresholds: &Thresholds) -> Self {
        Self {
            goal_tolerance: thresholds.goal_tolerance,
            no_move_tolerance: thresholds.no_move_tolerance,
            stall_ticks: thresholds.stall_ticks.max(1),
            target: vec![0.0; joint_count],
            last_angles: vec![0.0; joint_count],
            last_sample_at: None,
            move_count: vec![0; joint_count],
            no_move_count: vec![0; joint_count],
            sensor_errors: 0,
        }
    }

    /// Prepare for a new goal: store `target`, zero every counter, and seed
    /// the last sample with `initial` when it is known.
    ///
    /// Without an initial sample the first successful tick only seeds the
    /// snapshot and counts no movement.
    ///
    /// Both slices must have one entry per joint.
    pub fn reset(&mut self, target: &[f32], initial: Option<&[f32]>, now: Instant) {
        self.target.copy_from_slice(target);
        self.move_count.fill(0);
        self.no_move_count.fill(0);
        self.sensor_errors = 0;
        match initial {
            Some(angles) => {
                self.last_angles.copy_from_slice(angles);
                self.last_sample_at = Some(now);
            }
            None => {
                self.last_angles.fill(0.0);
                self.last_sample_at = None;
            }
        }
    }

    /// Run one tick against `current` (one angle per joint).
    pub fn evaluate(&mut self, current: &[f32], now: Instant) -> Verdict {
        self.sensor_errors = 0;

        let at_goal = current
            .iter()
            .zip(&self.target)
            .all(|(c, t)| (c - t).abs() <= self.goal_tolerance);
        if at_goal {
            return Verdict::Reached(CompletionReason::GoalReached);
        }

        if self.last_sample_at.is_none() {
            self.last_angles.copy_from_slice(current);
            self.last_sample_at = Some(now);
            return Verdict::Pending;
        }

        for (i, (c, last)) in current.iter().zip(&self.last_angles).enumerate() {
            if (c - last).abs() < self.no_move_tolerance {
                self.no_move_count[i] += 1;
            } else {
                self.move_count[i] += 1;
                self.no_move_count[i] = 0;
            }
        }
        self.last_angles.copy_from_slice(current);
        self.last_sample_at = Some(now);

        if self.no_move_count.iter().all(|&n| n >= self.stall_ticks) {
            return Verdict::Reached(CompletionReason::Stalled);
        }
        Verdict::Pending
    }

    /// Record a tick without sensor data.  Counters and the last sample are
    /// left untouched.
    pub fn sensor_gap(&mut self) -> Verdict {
        self.sensor_errors = self.sensor_errors.saturating_add(1);
        Verdict::SensorError
    }

    /// Consecutive ticks without sensor data.
    pub fn sensor_errors(&self) -> u32 {
        self.sensor_errors
    }

    /// Largest absolute distance of any joint in `current` from its target.
    pub fn max_error(&self, current: &[f32]) -> f32 {
        current
            .iter()
            .zip(&self.target)
            .map(|(c, t)| (c - t).abs())
            .fold(0.0, f32::max)
    }

    /// Joints with a non-zero no-move streak.
    pub fn stalled_joints(&self) -> usize {
        self.no_move_count.iter().filter(|&&n| n > 0).count()
    }

    pub fn target(&self) -> &[f32] {
        &self.target
    }

    pub fn last_angles(&self) -> &[f32] {
        &self.last_angles
    }

    pub fn last_sample_at(&self) -> Option<Instant> {
        self.last_sample_at
    }

    pub fn move_counts(&self) -> &[u32] {
        &self.move_count
    }

    pub fn no_move_counts(&self) -> &[u32] {
        &self.no_move_count
    }
}
