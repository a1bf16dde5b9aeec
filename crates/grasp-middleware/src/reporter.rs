//! The transport callback seam.
//!
//! The controller never holds transport-specific handles.  It identifies a
//! goal by its opaque [`GoalId`] and tells a [`GoalReporter`] what happened;
//! the transport (an action server, a bus bridge, a test probe) decides how
//! to deliver that to the remote caller.
//!
//! Callbacks are invoked from the controller's command path or from the
//! monitor task, never while the goal lock is held.  They are serialized per
//! controller, so they must not block and must not call back into the
//! controller.

use grasp_types::{GoalId, GoalOutcome, GraspEvent, GraspPayload};
use tracing::warn;

use crate::bus::EventBus;

/// Progress of an executing goal, borrowed from the monitor's buffers.
#[derive(Debug, Clone, Copy)]
pub struct GraspFeedback<'a> {
    /// Joint angles sampled on this tick, indexed by the joint set.
    pub angles: &'a [f32],
    /// Largest absolute distance of any joint from its target.
    pub max_error: f32,
    /// Joints that did not move on this tick.
    pub stalled_joints: usize,
}

/// Receives goal lifecycle notifications from the controller.
///
/// `finished` is called exactly once for every goal that `accepted` was
/// called for.
pub trait GoalReporter: Send + Sync {
    fn accepted(&self, _goal: GoalId, _target: &[f32]) {}

    fn feedback(&self, _goal: GoalId, _feedback: &GraspFeedback<'_>) {}

    fn finished(&self, goal: GoalId, outcome: GoalOutcome);
}

/// A reporter that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl GoalReporter for NullReporter {
    fn finished(&self, _goal: GoalId, _outcome: GoalOutcome) {}
}

/// Forwards goal notifications onto an [`EventBus`] as [`GraspEvent`]s.
#[derive(Debug, Clone)]
pub struct BusReporter {
    bus: EventBus,
    source: String,
    forward_feedback: bool,
}

impl BusReporter {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            source: "grasp-control".to_string(),
            forward_feedback: true,
        }
    }

    /// Disable per-tick feedback events (acceptance and results still flow).
    pub fn without_feedback(mut self) -> Self {
        self.forward_feedback = false;
        self
    }

    fn emit(&self, goal: GoalId, payload: GraspPayload) {
        let event = GraspEvent::new(self.source.clone(), goal, payload);
        if let Err(e) = self.bus.publish(event) {
            warn!(goal = %goal, error = %e, "failed to publish grasp event");
        }
    }
}

impl GoalReporter for BusReporter {
    fn accepted(&self, goal: GoalId, target: &[f32]) {
        self.emit(
            goal,
            GraspPayload::Accepted {
                target: target.to_vec(),
            },
        );
    }

    fn feedback(&self, goal: GoalId, feedback: &GraspFeedback<'_>) {
        if !self.forward_feedback {
            return;
        }
        self.emit(
            goal,
            GraspPayload::Feedback {
                angles: feedback.angles.to_vec(),
                max_error: feedback.max_error,
                stalled_joints: feedback.stalled_joints,
            },
        );
    }

    fn finished(&self, goal: GoalId, outcome: GoalOutcome) {
        self.emit(goal, GraspPayload::Finished(outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Topic;
    use grasp_types::CompletionReason;

    #[tokio::test]
    async fn bus_reporter_publishes_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut goals = bus.subscribe_to(Topic::Goals);
        let mut feedback = bus.subscribe_to(Topic::Feedback);
        let mut results = bus.subscribe_to(Topic::Results);
        let reporter = BusReporter::new(bus.clone());
        let goal = GoalId::new();

        reporter.accepted(goal, &[0.0, 0.5]);
        reporter.feedback(
            goal,
            &GraspFeedback {
                angles: &[0.1, 0.4],
                max_error: 0.1,
                stalled_joints: 1,
            },
        );
        reporter.finished(goal, GoalOutcome::Succeeded(CompletionReason::GoalReached));

        match goals.recv().await?.payload {
            GraspPayload::Accepted { target } => assert_eq!(target, vec![0.0, 0.5]),
            other => panic!("unexpected payload {other:?}"),
        }
        match feedback.recv().await?.payload {
            GraspPayload::Feedback { stalled_joints, .. } => assert_eq!(stalled_joints, 1),
            other => panic!("unexpected payload {other:?}"),
        }
        let done = results.recv().await?;
        assert_eq!(done.goal, goal);
        assert_eq!(done.source, "grasp-control");
        assert!(matches!(
            done.payload,
            GraspPayload::Finished(GoalOutcome::Succeeded(CompletionReason::GoalReached))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn feedback_can_be_disabled() {
        let bus = EventBus::default();
        let mut feedback = bus.subscribe_to(Topic::Feedback);
        let reporter = BusReporter::new(bus.clone()).without_feedback();
        reporter.feedback(
            GoalId::new(),
            &GraspFeedback {
                angles: &[0.0],
                max_error: 0.0,
                stalled_joints: 0,
            },
        );
        assert!(feedback.try_recv().is_err());
    }
}
