//! [`JointCommandSink`] – the actuator output seam.
//!
//! The controller never talks to a motor driver directly.  While a goal is
//! executing it hands the target vector to a sink at a fixed publish rate;
//! drivers (a joint-control topic publisher, a serial bus, the
//! [`SimGripper`][crate::sim::SimGripper]) implement this trait.

use grasp_types::{GraspError, JointSet};

/// Accepts position targets for the gripper joints.
///
/// `target` is indexed by `joints`; the two always have the same length when
/// called by the controller.  Implementations are shared across tasks, so
/// `publish` takes `&self` and drivers keep any mutable state behind their
/// own synchronisation.
pub trait JointCommandSink: Send + Sync {
    /// Send one target-position command to the actuator driver.
    ///
    /// # Errors
    ///
    /// Returns [`GraspError::ActuatorFault`] if the command cannot be
    /// delivered.  The controller logs the fault and retries on the next
    /// publish tick.
    fn publish(&self, joints: &JointSet, target: &[f32]) -> Result<(), GraspError>;
}
