//! `grasp-middleware` – The transport side of the grasp controller.
//!
//! Routes goal notifications and sensor samples between the controller and
//! the outside world without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe [`EventBus`] for
//!   [`GraspEvent`][grasp_types::GraspEvent]s, built on Tokio broadcast
//!   channels.
//! - [`reporter`] – the [`GoalReporter`] callback trait the controller
//!   reports through, plus [`BusReporter`] which forwards onto the bus.
//! - [`feed`] – [`JointStateFeed`]: copies incoming joint-state samples into
//!   a [`SensorMirror`][grasp_hal::SensorMirror].

pub mod bus;
pub mod feed;
pub mod reporter;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use feed::JointStateFeed;
pub use reporter::{BusReporter, GoalReporter, GraspFeedback, NullReporter};
