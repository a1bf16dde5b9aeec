//! In-process simulated gripper for tests and headless runs.
//!
//! [`SimGripper`] is a [`JointCommandSink`] that behaves like a slow position
//! servo: every published command moves each joint at most `step_rad`
//! toward its target, and the resulting angles are pushed into a
//! [`SensorMirror`] exactly as a joint-state subscriber would.  Per-joint
//! contact limits model an object between the fingers: a joint cannot travel
//! past its limit, so a closing command stalls there.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use grasp_hal::{AngleProvider, JointCommandSink, SensorMirror, SimGripper};
//! use grasp_types::JointSet;
//!
//! let joints = JointSet::new(["f1", "f2"]).unwrap();
//! let mirror = Arc::new(SensorMirror::new(joints.clone(), Duration::from_secs(1)));
//! let gripper = SimGripper::new(Arc::clone(&mirror), 0.1).with_contact(0, 0.25);
//!
//! for _ in 0..10 {
//!     gripper.publish(&joints, &[1.0, 1.0]).unwrap();
//! }
//! let mut angles = [0.0; 2];
//! mirror.latest_angles(&mut angles).unwrap();
//! assert!((angles[0] - 0.25).abs() < 1e-6); // blocked by the object
//! assert!((angles[1] - 1.0).abs() < 1e-6);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use grasp_types::{GraspError, JointSet};

use crate::actuator::JointCommandSink;
use crate::sensor::SensorMirror;

/// A simulated gripper that reports its motion through a [`SensorMirror`].
pub struct SimGripper {
    mirror: Arc<SensorMirror>,
    step_rad: f32,
    contact: Vec<Option<f32>>,
    positions: Mutex<Vec<f32>>,
    publishes: AtomicUsize,
}

impl SimGripper {
    /// Create a gripper with every joint at `0.0` rad that moves at most
    /// `step_rad` per published command.  The initial angles are written to
    /// `mirror` immediately.
    pub fn new(mirror: Arc<SensorMirror>, step_rad: f32) -> Self {
        let n = mirror.joints().len();
        let gripper = Self {
            mirror,
            step_rad: step_rad.abs(),
            contact: vec![None; n],
            positions: Mutex::new(vec![0.0; n]),
            publishes: AtomicUsize::new(0),
        };
        gripper.report(&vec![0.0; n]);
        gripper
    }

    /// Start from `angles` instead of all zeros.  Extra values are ignored.
    pub fn with_initial(self, angles: &[f32]) -> Self {
        {
            let mut positions = self.positions.lock().unwrap_or_else(PoisonError::into_inner);
            for (p, a) in positions.iter_mut().zip(angles) {
                *p = *a;
            }
            self.report(&positions);
        }
        self
    }

    /// Place an obstacle that stops `joint` at `limit_rad`.
    pub fn with_contact(mut self, joint: usize, limit_rad: f32) -> Self {
        if let Some(slot) = self.contact.get_mut(joint) {
            *slot = Some(limit_rad);
        }
        self
    }

    /// Current simulated joint angles.
    pub fn positions(&self) -> Vec<f32> {
        self.positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of commands accepted so far.
    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    fn report(&self, positions: &[f32]) {
        for (name, &angle) in self.mirror.joints().names().iter().zip(positions) {
            self.mirror.update(name, angle);
        }
    }

    fn advance(&self, current: f32, target: f32, contact: Option<f32>) -> f32 {
        let delta = (target - current).clamp(-self.step_rad, self.step_rad);
        let next = current + delta;
        match contact {
            // The obstacle sits between the finger and its destination.
            Some(limit) if (current <= limit && limit <= next) || (next <= limit && limit <= current) => {
                limit
            }
            _ => next,
        }
    }
}

impl JointCommandSink for SimGripper {
    fn publish(&self, joints: &JointSet, target: &[f32]) -> Result<(), GraspError> {
        let mut positions = self.positions.lock().unwrap_or_else(PoisonError::into_inner);
        if target.len() != positions.len() || joints.len() != positions.len() {
            return Err(GraspError::ActuatorFault {
                joint: "sim_gripper".to_string(),
                details: format!(
                    "expected {} targets, got {}",
                    positions.len(),
                    target.len()
                ),
            });
        }
        for ((pos, &goal), &contact) in positions.iter_mut().zip(target).zip(&self.contact) {
            *pos = self.advance(*pos, goal, contact);
        }
        self.report(&positions);
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
