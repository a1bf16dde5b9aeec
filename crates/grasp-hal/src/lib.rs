//! `grasp-hal` – Hardware seams of the grasp controller.
//!
//! # Modules
//!
//! - [`actuator`] – [`JointCommandSink`]: where target-position commands go
//!   while a goal executes.
//! - [`sensor`] – [`AngleProvider`] and [`SensorMirror`]: the latest-angle
//!   cache fed by the joint-state subscription, with missing and stale
//!   samples reported as [`SensorGap`]s.
//! - [`sim`] – [`SimGripper`]: a simulated servo gripper with optional
//!   contact limits, for CI and headless demos.

pub mod actuator;
pub mod sensor;
pub mod sim;

pub use actuator::JointCommandSink;
pub use sensor::{AngleProvider, GapKind, JointStateSample, SensorGap, SensorMirror};
pub use sim::SimGripper;
