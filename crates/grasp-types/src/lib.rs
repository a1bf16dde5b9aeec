use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Joints
// ────────────────────────────────────────────────────────────────────────────

/// Ordered, immutable list of the joints that take part in a grasp.
///
/// The position of a name in the set is the index used by every per-joint
/// vector in the system (targets, sampled angles, movement counters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct JointSet(Vec<String>);

impl JointSet {
    /// Build a joint set from `names`.
    ///
    /// # Errors
    ///
    /// Returns [`GraspError::InvalidConfig`] when the list is empty or a name
    /// appears more than once.
    pub fn new<I, S>(names: I) -> Result<Self, GraspError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(GraspError::InvalidConfig(
                "joint set must name at least one joint".to_string(),
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(GraspError::InvalidConfig(format!(
                    "joint '{name}' listed more than once"
                )));
            }
        }
        Ok(Self(names))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of `name` within the set.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for JointSet {
    type Error = GraspError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<JointSet> for Vec<String> {
    fn from(set: JointSet) -> Self {
        set.0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Thresholds
// ────────────────────────────────────────────────────────────────────────────

/// Immutable tuning values for goal completion.
///
/// Build with [`Thresholds::new`] and adjust the optional tunables with the
/// `with_*` methods before handing the value to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Distance (rad) from the target at which a joint counts as arrived.
    pub goal_tolerance: f32,
    /// Per-tick angular change (rad) below which a joint counts as not moving.
    pub no_move_tolerance: f32,
    /// Monitor tick frequency in Hz.
    pub check_rate_hz: f32,
    /// Consecutive no-move ticks every joint must show before the grasp is
    /// treated as closed on an object.
    pub stall_ticks: u32,
    /// Consecutive ticks without usable sensor data tolerated before the goal
    /// is aborted.
    pub max_sensor_errors: u32,
    /// Rate at which the target is re-published to the actuator, in Hz.
    pub publish_rate_hz: f32,
    /// Age after which a joint sample is considered stale, in milliseconds.
    pub sample_timeout_ms: u64,
}

impl Thresholds {
    pub const DEFAULT_MAX_SENSOR_ERRORS: u32 = 5;
    pub const DEFAULT_PUBLISH_RATE_HZ: f32 = 20.0;
    pub const DEFAULT_SAMPLE_TIMEOUT_MS: u64 = 500;

    /// Create thresholds with the stall window defaulting to one second's
    /// worth of ticks at `check_rate_hz`.
    pub fn new(goal_tolerance: f32, no_move_tolerance: f32, check_rate_hz: f32) -> Self {
        Self {
            goal_tolerance,
            no_move_tolerance,
            check_rate_hz,
            stall_ticks: Self::ticks_per_second(check_rate_hz),
            max_sensor_errors: Self::DEFAULT_MAX_SENSOR_ERRORS,
            publish_rate_hz: Self::DEFAULT_PUBLISH_RATE_HZ,
            sample_timeout_ms: Self::DEFAULT_SAMPLE_TIMEOUT_MS,
        }
    }

    pub fn with_stall_ticks(mut self, ticks: u32) -> Self {
        self.stall_ticks = ticks;
        self
    }

    pub fn with_max_sensor_errors(mut self, errors: u32) -> Self {
        self.max_sensor_errors = errors;
        self
    }

    pub fn with_publish_rate(mut self, hz: f32) -> Self {
        self.publish_rate_hz = hz;
        self
    }

    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Interval between two monitor ticks.
    pub fn check_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.check_rate_hz))
    }

    /// Interval between two actuator publishes.
    pub fn publish_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.publish_rate_hz))
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    /// Reject values the monitor cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`GraspError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), GraspError> {
        // The rate must give a non-zero period that fits in a `Duration`.
        let positive_rate = |hz: f32| {
            hz.is_finite()
                && hz > 0.0
                && Duration::try_from_secs_f64(1.0 / f64::from(hz)).is_ok_and(|p| !p.is_zero())
        };
        if !(self.goal_tolerance.is_finite() && self.goal_tolerance >= 0.0) {
            return Err(GraspError::InvalidConfig(format!(
                "goal_tolerance must be a non-negative number, got {}",
                self.goal_tolerance
            )));
        }
        if !(self.no_move_tolerance.is_finite() && self.no_move_tolerance >= 0.0) {
            return Err(GraspError::InvalidConfig(format!(
                "no_move_tolerance must be a non-negative number, got {}",
                self.no_move_tolerance
            )));
        }
        if !positive_rate(self.check_rate_hz) {
            return Err(GraspError::InvalidConfig(format!(
                "check_rate_hz must be a positive rate with a non-zero period, got {}",
                self.check_rate_hz
            )));
        }
        if !positive_rate(self.publish_rate_hz) {
            return Err(GraspError::InvalidConfig(format!(
                "publish_rate_hz must be a positive rate with a non-zero period, got {}",
                self.publish_rate_hz
            )));
        }
        if self.stall_ticks == 0 {
            return Err(GraspError::InvalidConfig(
                "stall_ticks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn ticks_per_second(check_rate_hz: f32) -> u32 {
        if check_rate_hz.is_finite() && check_rate_hz >= 1.0 {
            check_rate_hz.round() as u32
        } else {
            1
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Goal lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// Opaque identity of an accepted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalId(Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Controller-side state of the current (or most recent) goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GoalState {
    #[default]
    Idle,
    Executing,
    Finished { success: bool },
}

impl GoalState {
    /// The success flag of a finished goal, `None` otherwise.
    pub fn success(&self) -> Option<bool> {
        match self {
            GoalState::Finished { success } => Some(*success),
            _ => None,
        }
    }
}

/// Why a goal completed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Every joint arrived within `goal_tolerance` of its target.
    GoalReached,
    /// Every joint stopped moving: the fingers met resistance.
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Sensor data stayed unavailable past `max_sensor_errors` ticks.
    SensorUnavailable,
    /// The controller was shut down while the goal was executing.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller asked for cancellation.
    Requested,
    /// A newer goal replaced this one.
    Preempted,
}

/// The single terminal result of an accepted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum GoalOutcome {
    Succeeded(CompletionReason),
    Aborted(AbortReason),
    Cancelled(CancelReason),
}

impl GoalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GoalOutcome::Succeeded(_))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// Envelope for everything the controller reports about a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraspEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"grasp-control::monitor"`
    pub source: String,
    pub goal: GoalId,
    pub payload: GraspPayload,
}

impl GraspEvent {
    pub fn new(source: impl Into<String>, goal: GoalId, payload: GraspPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            goal,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GraspPayload {
    Accepted {
        target: Vec<f32>,
    },
    /// Periodic progress while the goal executes.
    Feedback {
        angles: Vec<f32>,
        max_error: f32,
        stalled_joints: usize,
    },
    Finished(GoalOutcome),
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every grasp crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraspError {
    #[error("Invalid goal: expected {expected} joint targets, got {got}")]
    InvalidGoal { expected: usize, got: usize },

    #[error("No goal is currently executing")]
    NoActiveGoal,

    #[error("Sensor data unavailable for joint {joint}: {detail}")]
    SensorUnavailable { joint: String, detail: String },

    #[error("Failed to start movement monitor: {0}")]
    MonitorStart(String),

    #[error("Actuator fault on {joint}: {details}")]
    ActuatorFault { joint: String, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_set_rejects_empty_and_duplicates() {
        assert!(matches!(
            JointSet::new(Vec::<String>::new()),
            Err(GraspError::InvalidConfig(_))
        ));
        assert!(matches!(
            JointSet::new(["f1", "f2", "f1"]),
            Err(GraspError::InvalidConfig(_))
        ));
    }

    #[test]
    fn joint_set_indexing() {
        let joints = JointSet::new(["f1", "f2"]).unwrap();
        assert_eq!(joints.len(), 2);
        assert_eq!(joints.index_of("f2"), Some(1));
        assert_eq!(joints.index_of("wrist"), None);
        assert_eq!(joints.name(0), Some("f1"));
    }

    #[test]
    fn joint_set_deserialization_validates() {
        let ok: JointSet = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(ok.names(), ["a".to_string(), "b".to_string()]);
        assert!(serde_json::from_str::<JointSet>(r#"["a","a"]"#).is_err());
    }

    #[test]
    fn stall_window_defaults_to_one_second() {
        assert_eq!(Thresholds::new(0.05, 0.01, 10.0).stall_ticks, 10);
        assert_eq!(Thresholds::new(0.05, 0.01, 0.5).stall_ticks, 1);
    }

    #[test]
    fn thresholds_validate() {
        assert!(Thresholds::new(0.05, 0.01, 10.0).validate().is_ok());
        assert!(Thresholds::new(-0.1, 0.01, 10.0).validate().is_err());
        assert!(Thresholds::new(0.05, 0.01, 0.0).validate().is_err());
        assert!(
            Thresholds::new(0.05, 0.01, 10.0)
                .with_stall_ticks(0)
                .validate()
                .is_err()
        );
        assert!(
            Thresholds::new(0.05, 0.01, 10.0)
                .with_publish_rate(f32::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn rates_without_a_usable_period_are_rejected() {
        // Period rounds to zero nanoseconds.
        assert!(Thresholds::new(0.01, 0.01, 1.0e10).validate().is_err());
        // Period overflows a Duration.
        assert!(Thresholds::new(0.01, 0.01, 1.0e-20).validate().is_err());
        assert!(
            Thresholds::new(0.01, 0.01, 10.0)
                .with_publish_rate(1.0e10)
                .validate()
                .is_err()
        );
        // Fast and slow rates that still have a period are fine.
        assert!(Thresholds::new(0.01, 0.01, 1.0e6).validate().is_ok());
        let slow = Thresholds::new(0.01, 0.01, 1.0e-3);
        assert!(slow.validate().is_ok());
        assert_eq!(slow.check_period(), Duration::from_secs(1000));
    }

    #[test]
    fn check_period_matches_rate() {
        let t = Thresholds::new(0.05, 0.01, 20.0);
        assert_eq!(t.check_period(), Duration::from_millis(50));
    }

    #[test]
    fn goal_state_success_flag() {
        assert_eq!(GoalState::Idle.success(), None);
        assert_eq!(GoalState::Executing.success(), None);
        assert_eq!(GoalState::Finished { success: false }.success(), Some(false));
    }

    #[test]
    fn outcome_serializes_with_reason() {
        let json =
            serde_json::to_string(&GoalOutcome::Succeeded(CompletionReason::Stalled)).unwrap();
        assert_eq!(json, r#"{"outcome":"succeeded","reason":"stalled"}"#);
        assert!(!GoalOutcome::Cancelled(CancelReason::Preempted).is_success());
    }

    #[test]
    fn event_roundtrip_keeps_goal_identity() {
        let goal = GoalId::new();
        let event = GraspEvent::new(
            "grasp-control::monitor",
            goal,
            GraspPayload::Finished(GoalOutcome::Aborted(AbortReason::SensorUnavailable)),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: GraspEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.goal, goal);
        assert_eq!(back.id, event.id);
    }

    #[test]
    fn grasp_error_display() {
        let err = GraspError::InvalidGoal {
            expected: 2,
            got: 3,
        };
        assert!(err.to_string().contains("expected 2"));

        let err = GraspError::SensorUnavailable {
            joint: "f1".to_string(),
            detail: "no sample received".to_string(),
        };
        assert!(err.to_string().contains("f1"));
    }
}
