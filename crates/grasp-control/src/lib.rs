//! `grasp-control` – grasp goal execution.
//!
//! # Modules
//!
//! - [`monitor`] – [`MovementMonitor`]: the per-tick completion check.  Pure
//!   data; decides between "keep going", "target reached", "stalled on an
//!   object", and "no sensor data".
//! - [`controller`] – [`GoalController`]: owns the single guarded goal
//!   record, runs one tokio task per executing goal, and finalizes every
//!   goal exactly once (success, cancel, preemption, sensor loss, shutdown).
//! - [`action_server`] – [`ActionServer`] / [`ActionClient`]: an mpsc
//!   command front end that forwards grasp, cancel, and query requests to a
//!   controller.
//! - [`telemetry`] – [`init_tracing`]: `tracing` subscriber setup with an
//!   optional OTLP span exporter.

pub mod action_server;
pub mod controller;
pub mod monitor;
pub mod telemetry;

pub use action_server::{ActionClient, ActionRequest, ActionServer};
pub use controller::{GoalController, GoalTicket};
pub use monitor::{MovementMonitor, Verdict};
pub use telemetry::{TracerProviderGuard, init_tracing};
