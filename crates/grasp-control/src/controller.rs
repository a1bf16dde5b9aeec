//! [`GoalController`] – accepts grasp goals and decides when they finish.
//!
//! The controller owns one guarded record holding the goal state, the
//! [`MovementMonitor`] (target, last sample, counters), and the resources of
//! the executing goal.  Two execution contexts touch that record:
//!
//! * the **command path** – [`accept_goal`][GoalController::accept_goal],
//!   [`cancel_goal`][GoalController::cancel_goal] and the state queries, called
//!   from whatever context delivers commands;
//! * one **goal task** per executing goal – a tokio task that ticks the
//!   monitor at `check_rate_hz` and re-publishes the target to the actuator at
//!   `publish_rate_hz`.
//!
//! # Locking
//!
//! A single mutex guards the record.  Every read-modify-write sequence runs
//! entirely under it, and it is never held across an `.await`, a sensor read,
//! an actuator publish, or a reporter callback.
//!
//! Reporter callbacks are ordered by a second, separate lock taken *before*
//! the goal lock (never the other way round).  A goal's `accepted` therefore
//! always precedes its `feedback`, and no `feedback` follows its `finished`,
//! even when commands and ticks run on different threads.
//!
//! # Finalization
//!
//! A goal moves `Executing → Finished` exactly once.  Whoever gets there
//! first under the lock (monitor verdict, cancel, preemption, shutdown) takes
//! the goal's resources out of the record; everyone else finds the goal no
//! longer executing and does nothing.  The winner then stops the goal task
//! and delivers the outcome to both the [`GoalTicket`] and the
//! [`GoalReporter`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use grasp_control::GoalController;
//! use grasp_hal::{SensorMirror, SimGripper};
//! use grasp_types::{CompletionReason, GoalOutcome, JointSet, Thresholds};
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() -> Result<(), grasp_types::GraspError> {
//! let joints = JointSet::new(["f1", "f2"])?;
//! let thresholds = Thresholds::new(0.05, 0.005, 10.0);
//! let mirror = Arc::new(SensorMirror::new(joints.clone(), Duration::from_secs(1)));
//! let gripper = Arc::new(SimGripper::new(Arc::clone(&mirror), 0.05));
//!
//! let controller = GoalController::new(joints, thresholds, mirror, gripper)?;
//! let ticket = controller.accept_goal(vec![0.5, 0.5])?;
//! assert_eq!(
//!     ticket.outcome().await?,
//!     GoalOutcome::Succeeded(CompletionReason::GoalReached)
//! );
//! # Ok(())
//! # }
//! ```

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use grasp_hal::{AngleProvider, JointCommandSink};
use grasp_middleware::{GoalReporter, GraspFeedback, NullReporter};
use grasp_types::{
    AbortReason, CancelReason, GoalId, GoalOutcome, GoalState, GraspError, JointSet, Thresholds,
};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::monitor::{MovementMonitor, Verdict};

// ─────────────────────────────────────────────────────────────────────────────
// GoalTicket
// ─────────────────────────────────────────────────────────────────────────────

/// Handed back by [`GoalController::accept_goal`]; resolves to the goal's
/// terminal outcome.
#[derive(Debug)]
pub struct GoalTicket {
    id: GoalId,
    outcome: oneshot::Receiver<GoalOutcome>,
}

impl GoalTicket {
    pub fn id(&self) -> GoalId {
        self.id
    }

    /// Wait for the terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`GraspError::Channel`] only if the controller disappeared
    /// without finalizing the goal.
    pub async fn outcome(self) -> Result<GoalOutcome, GraspError> {
        self.outcome
            .await
            .map_err(|_| GraspError::Channel(format!("goal {} dropped without an outcome", self.id)))
    }

    /// The outcome if the goal has already finished.
    pub fn try_outcome(&mut self) -> Option<GoalOutcome> {
        self.outcome.try_recv().ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared record
// ─────────────────────────────────────────────────────────────────────────────

/// Resources that exist only while a goal executes.
struct ActiveGoal {
    id: GoalId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    outcome_tx: oneshot::Sender<GoalOutcome>,
}

/// Everything guarded by the goal lock.
struct GoalRecord {
    state: GoalState,
    /// The executing goal, or the most recently finished one.
    current: Option<GoalId>,
    active: Option<ActiveGoal>,
    monitor: MovementMonitor,
}

impl GoalRecord {
    fn is_executing(&self, id: GoalId) -> bool {
        self.state == GoalState::Executing && self.current == Some(id)
    }

    /// Move goal `id` to `Finished` if it is still executing.
    fn finalize(&mut self, id: GoalId, outcome: GoalOutcome) -> Option<Finalized> {
        if !self.is_executing(id) {
            return None;
        }
        let active = self.active.take()?;
        self.state = GoalState::Finished {
            success: outcome.is_success(),
        };
        Some(Finalized { active, outcome })
    }
}

/// A goal taken out of the record by the winner of the finalization race.
struct Finalized {
    active: ActiveGoal,
    outcome: GoalOutcome,
}

impl Finalized {
    /// Stop the goal task and take its handle.
    fn stop(&mut self) -> Option<JoinHandle<()>> {
        self.active.cancel.cancel();
        self.active.task.take()
    }

    /// Report the outcome.  The caller holds the notification lock.
    fn deliver(self, reporter: &dyn GoalReporter, _order: &NotifyOrder<'_>) {
        let id = self.active.id;
        info!(goal = %id, outcome = ?self.outcome, "grasp goal finished");
        reporter.finished(id, self.outcome);
        // The ticket may have been dropped.
        let _ = self.active.outcome_tx.send(self.outcome);
    }
}

struct Inner {
    joints: JointSet,
    thresholds: Thresholds,
    sensors: Arc<dyn AngleProvider>,
    actuator: Arc<dyn JointCommandSink>,
    reporter: Arc<dyn GoalReporter>,
    /// Serializes reporter callbacks.  Taken before `record`, never after.
    notify: Mutex<()>,
    record: Mutex<GoalRecord>,
}

type NotifyOrder<'a> = MutexGuard<'a, ()>;

impl Inner {
    fn lock(&self) -> MutexGuard<'_, GoalRecord> {
        // Every critical section leaves the record consistent, so a panic
        // elsewhere does not invalidate it.
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_order(&self) -> NotifyOrder<'_> {
        self.notify.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop a finalized goal's task and report its outcome.
    fn finish(&self, mut finalized: Finalized) {
        if let Some(task) = finalized.stop() {
            task.abort();
        }
        let order = self.notify_order();
        finalized.deliver(self.reporter.as_ref(), &order);
    }

    /// One monitor tick for goal `id`.  `current` is the task's sample
    /// buffer.
    fn check(&self, id: GoalId, current: &mut [f32]) -> ControlFlow<()> {
        let reading = self.sensors.latest_angles(current);
        let now = Instant::now();

        // Held until this tick's callbacks are done, so a concurrent cancel
        // reports `finished` only after them.
        let order = self.notify_order();
        let (verdict, max_error, stalled_joints, finalized) = {
            let mut record = self.lock();
            if !record.is_executing(id) {
                return ControlFlow::Break(());
            }
            let verdict = match reading {
                Ok(()) => record.monitor.evaluate(current, now),
                Err(_) => record.monitor.sensor_gap(),
            };
            let outcome = match verdict {
                Verdict::Reached(reason) => Some(GoalOutcome::Succeeded(reason)),
                Verdict::SensorError
                    if record.monitor.sensor_errors() > self.thresholds.max_sensor_errors =>
                {
                    Some(GoalOutcome::Aborted(AbortReason::SensorUnavailable))
                }
                Verdict::SensorError | Verdict::Pending => None,
            };
            let max_error = record.monitor.max_error(current);
            let stalled_joints = record.monitor.stalled_joints();
            let finalized = outcome.and_then(|outcome| record.finalize(id, outcome));
            (verdict, max_error, stalled_joints, finalized)
        };

        match reading {
            Ok(()) => {
                debug!(goal = %id, ?verdict, max_error, stalled_joints, "grasp tick");
                self.reporter.feedback(
                    id,
                    &GraspFeedback {
                        angles: current,
                        max_error,
                        stalled_joints,
                    },
                );
            }
            Err(gap) => {
                warn!(goal = %id, error = %gap.into_error(&self.joints), "grasp tick without sensor data");
            }
        }

        match finalized {
            Some(mut finalized) => {
                // Our own handle: dropping it detaches, the loop exits next.
                drop(finalized.stop());
                finalized.deliver(self.reporter.as_ref(), &order);
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    }

    fn publish(&self, id: GoalId, target: &[f32]) {
        if let Err(e) = self.actuator.publish(&self.joints, target) {
            warn!(goal = %id, error = %e, "failed to publish grasp target");
        }
    }
}

/// Body of the per-goal task: tick the monitor and re-publish the target
/// until the goal is finalized or the token fires.
async fn run_goal(
    inner: Arc<Inner>,
    id: GoalId,
    cancel: CancellationToken,
    target: Vec<f32>,
    mut current: Vec<f32>,
) {
    let mut check = tokio::time::interval(inner.thresholds.check_period());
    check.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut publish = tokio::time::interval(inner.thresholds.publish_period());
    publish.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = publish.tick() => inner.publish(id, &target),
            _ = check.tick() => {
                if inner.check(id, &mut current).is_break() {
                    break;
                }
            }
        }
    }
    debug!(goal = %id, "grasp goal task exited");
}

// ─────────────────────────────────────────────────────────────────────────────
// GoalController
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts grasp goals, drives the actuator, and finalizes each goal exactly
/// once.
///
/// Dropping the controller aborts an executing goal with
/// [`AbortReason::Shutdown`].
pub struct GoalController {
    inner: Arc<Inner>,
    runtime: Option<Handle>,
}

impl GoalController {
    /// Build a controller for `joints`.
    ///
    /// The tokio runtime current at construction (if any) hosts the goal
    /// tasks; see [`with_runtime`][Self::with_runtime].
    ///
    /// # Errors
    ///
    /// Returns [`GraspError::InvalidConfig`] when `thresholds` fail
    /// validation.
    pub fn new(
        joints: JointSet,
        thresholds: Thresholds,
        sensors: Arc<dyn AngleProvider>,
        actuator: Arc<dyn JointCommandSink>,
    ) -> Result<Self, GraspError> {
        thresholds.validate()?;
        let monitor = MovementMonitor::new(joints.len(), &thresholds);
        Ok(Self {
            inner: Arc::new(Inner {
                joints,
                thresholds,
                sensors,
                actuator,
                reporter: Arc::new(NullReporter),
                notify: Mutex::new(()),
                record: Mutex::new(GoalRecord {
                    state: GoalState::Idle,
                    current: None,
                    active: None,
                    monitor,
                }),
            }),
            runtime: Handle::try_current().ok(),
        })
    }

    /// Report goal lifecycle events to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn GoalReporter>) -> Self {
        // Only possible before any goal task holds a clone of `inner`.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.reporter = reporter;
        }
        self
    }

    /// Run goal tasks on `runtime`.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn joints(&self) -> &JointSet {
        &self.inner.joints
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.inner.thresholds
    }

    /// Accept a new goal and start executing it.
    ///
    /// A goal that is still executing is finalized as
    /// [`CancelReason::Preempted`] before the new one starts.  Returns
    /// immediately; completion is reported through the returned ticket and
    /// the reporter.
    ///
    /// # Errors
    ///
    /// * [`GraspError::InvalidGoal`] – `target` does not have one entry per
    ///   joint.  Nothing changes.
    /// * [`GraspError::MonitorStart`] – no tokio runtime is available to run
    ///   the goal task.  Nothing changes.
    pub fn accept_goal(&self, target: Vec<f32>) -> Result<GoalTicket, GraspError> {
        let expected = self.inner.joints.len();
        if target.len() != expected {
            return Err(GraspError::InvalidGoal {
                expected,
                got: target.len(),
            });
        }
        let runtime = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or_else(|| GraspError::MonitorStart("no tokio runtime available".to_string()))?;

        // Sample outside the lock; this buffer then becomes the task's.
        let mut current = vec![0.0; expected];
        let seeded = match self.inner.sensors.latest_angles(&mut current) {
            Ok(()) => true,
            Err(gap) => {
                warn!(error = %gap.into_error(&self.inner.joints), "accepting grasp goal without an initial sample");
                false
            }
        };

        let id = GoalId::new();
        let cancel = CancellationToken::new();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        // Held until `accepted` is reported: nothing can report this goal's
        // `finished` (or a tick) ahead of it.
        let order = self.inner.notify_order();
        let preempted = {
            let mut record = self.inner.lock();
            let preempted = record
                .current
                .and_then(|old| record.finalize(old, GoalOutcome::Cancelled(CancelReason::Preempted)));
            record
                .monitor
                .reset(&target, seeded.then_some(current.as_slice()), Instant::now());
            record.state = GoalState::Executing;
            record.current = Some(id);
            record.active = Some(ActiveGoal {
                id,
                cancel: cancel.clone(),
                task: None,
                outcome_tx,
            });
            preempted
        };

        if let Some(mut old) = preempted {
            if let Some(task) = old.stop() {
                task.abort();
            }
            info!(goal = %old.active.id, by = %id, "grasp goal preempted");
            old.deliver(self.inner.reporter.as_ref(), &order);
        }

        info!(goal = %id, ?target, "grasp goal accepted");
        self.inner.reporter.accepted(id, &target);
        drop(order);

        let task = runtime.spawn(run_goal(Arc::clone(&self.inner), id, cancel, target, current));
        {
            let mut record = self.inner.lock();
            match record.active.as_mut() {
                Some(active) if active.id == id => active.task = Some(task),
                // Already finalized; the task sees that on its next tick.
                _ => {}
            }
        }

        Ok(GoalTicket {
            id,
            outcome: outcome_rx,
        })
    }

    /// Cancel the executing goal.
    ///
    /// Returns the id of the cancelled goal.
    ///
    /// # Errors
    ///
    /// Returns [`GraspError::NoActiveGoal`] when nothing is executing,
    /// including when the goal finished a moment earlier.
    pub fn cancel_goal(&self) -> Result<GoalId, GraspError> {
        let finalized = {
            let mut record = self.inner.lock();
            record
                .current
                .and_then(|id| record.finalize(id, GoalOutcome::Cancelled(CancelReason::Requested)))
                .ok_or(GraspError::NoActiveGoal)?
        };
        let id = finalized.active.id;
        self.inner.finish(finalized);
        Ok(id)
    }

    /// Abort the executing goal (if any) and wait for its task to exit.
    pub async fn shutdown(&self) {
        let Some(mut finalized) = self.abort_for_shutdown() else {
            return;
        };
        let task = finalized.stop();
        {
            let order = self.inner.notify_order();
            finalized.deliver(self.inner.reporter.as_ref(), &order);
        }
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn abort_for_shutdown(&self) -> Option<Finalized> {
        let mut record = self.inner.lock();
        record
            .current
            .and_then(|id| record.finalize(id, GoalOutcome::Aborted(AbortReason::Shutdown)))
    }

    /// Snapshot of the goal state.
    pub fn query_state(&self) -> GoalState {
        self.inner.lock().state
    }

    /// The executing goal, or the most recently finished one.
    pub fn current_goal(&self) -> Option<GoalId> {
        self.inner.lock().current
    }

    pub fn is_executing(&self) -> bool {
        self.query_state() == GoalState::Executing
    }

    /// `true` once any goal has been accepted.
    pub fn has_goal(&self) -> bool {
        self.query_state() != GoalState::Idle
    }
}

impl Drop for GoalController {
    fn drop(&mut self) {
        if let Some(finalized) = self.abort_for_shutdown() {
            self.inner.finish(finalized);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
