//! [`SensorMirror`] – latest-angle cache for the gripper joints.
//!
//! A joint-state subscriber pushes samples into the mirror with
//! [`SensorMirror::ingest`] (whole joint-state messages, non-gripper joints
//! are ignored) or [`SensorMirror::update`].  Readers go through the
//! [`AngleProvider`] capability, which reports a [`SensorGap`] instead of a
//! value whenever a joint has never been seen or its newest sample is older
//! than the configured timeout.  A gap is never reported as "zero movement".
//!
//! Every joint slot carries its own receipt timestamp.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use grasp_types::{GraspError, JointSet};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Capability: "give me the latest known angle of every gripper joint".
///
/// Hardware drivers and simulators both expose angles through this trait;
/// the monitor does not care which one it is reading.
pub trait AngleProvider: Send + Sync {
    /// Fill `out` (indexed like the controller's [`JointSet`]) with the most
    /// recent angles.
    ///
    /// # Errors
    ///
    /// Returns the first joint whose sample is missing or stale.  The
    /// contents of `out` are unspecified in that case.
    fn latest_angles(&self, out: &mut [f32]) -> Result<(), SensorGap>;
}

/// Why a joint has no usable sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    /// No sample has ever been received for the joint.
    Missing,
    /// The newest sample is older than the mirror's timeout.
    Stale { age: Duration },
}

/// A joint without usable sensor data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorGap {
    /// Index of the joint within the [`JointSet`].
    pub joint: usize,
    pub kind: GapKind,
}

impl SensorGap {
    /// Convert into a [`GraspError::SensorUnavailable`] naming the joint.
    pub fn into_error(self, joints: &JointSet) -> GraspError {
        let joint = joints
            .name(self.joint)
            .map_or_else(|| format!("#{}", self.joint), str::to_string);
        let detail = match self.kind {
            GapKind::Missing => "no sample received".to_string(),
            GapKind::Stale { age } => format!("last sample is {} ms old", age.as_millis()),
        };
        GraspError::SensorUnavailable { joint, detail }
    }
}

/// One joint-state message as delivered by the sensor feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointStateSample {
    pub names: Vec<String>,
    pub positions: Vec<f32>,
}

// ────────────────────────────────────────────────────────────────────────────
// SensorMirror
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct Slot {
    angle: f32,
    received: Instant,
}

/// Thread-safe cache of the newest angle per gripper joint.
pub struct SensorMirror {
    joints: JointSet,
    timeout: Duration,
    slots: Mutex<Vec<Option<Slot>>>,
}

impl SensorMirror {
    /// Create an empty mirror for `joints`.  Samples older than `timeout`
    /// are reported as stale.
    pub fn new(joints: JointSet, timeout: Duration) -> Self {
        let slots = vec![None; joints.len()];
        Self {
            joints,
            timeout,
            slots: Mutex::new(slots),
        }
    }

    pub fn joints(&self) -> &JointSet {
        &self.joints
    }

    /// Record a sample for `joint`.
    ///
    /// Returns `false` (and records nothing) when `joint` is not one of the
    /// gripper joints.
    pub fn update(&self, joint: &str, angle: f32) -> bool {
        let Some(index) = self.joints.index_of(joint) else {
            return false;
        };
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots[index] = Some(Slot {
            angle,
            received: Instant::now(),
        });
        true
    }

    /// Record every gripper joint found in `sample`.
    ///
    /// Returns the number of gripper joints updated.
    pub fn ingest(&self, sample: &JointStateSample) -> usize {
        if sample.names.len() != sample.positions.len() {
            warn!(
                names = sample.names.len(),
                positions = sample.positions.len(),
                "joint state sample has mismatched name/position counts"
            );
        }
        let now = Instant::now();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = 0;
        for (name, &angle) in sample.names.iter().zip(&sample.positions) {
            if let Some(index) = self.joints.index_of(name) {
                slots[index] = Some(Slot {
                    angle,
                    received: now,
                });
                updated += 1;
            }
        }
        updated
    }

    /// Forget every sample.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl AngleProvider for SensorMirror {
    fn latest_angles(&self, out: &mut [f32]) -> Result<(), SensorGap> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        for (joint, value) in out.iter_mut().enumerate() {
            let slot = slots.get(joint).copied().flatten().ok_or(SensorGap {
                joint,
                kind: GapKind::Missing,
            })?;
            let age = now.saturating_duration_since(slot.received);
            if age > self.timeout {
                return Err(SensorGap {
                    joint,
                    kind: GapKind::Stale { age },
                });
            }
            *value = slot.angle;
        }
        Ok(())
    }
}
