//! Inbound joint-state feed.
//!
//! [`JointStateFeed`] drains [`JointStateSample`]s from an mpsc channel (fed
//! by whatever subscription delivers joint states: a ROS topic bridge, a CAN
//! reader, a simulator) into a [`SensorMirror`].  Arrival jitter does not
//! matter; the mirror only keeps the newest sample per joint.
//!
//! This is the entry point for an external joint-state subscriber.  In-process
//! drivers such as `SimGripper` write to the mirror directly and do not go
//! through a feed.

use std::sync::Arc;

use grasp_hal::{JointStateSample, SensorMirror};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Background task copying joint-state samples into a [`SensorMirror`].
pub struct JointStateFeed {
    cancel: CancellationToken,
    handle: JoinHandle<u64>,
}

impl JointStateFeed {
    /// Spawn the feed task on the current tokio runtime.
    ///
    /// The task ends when the sender side is dropped or [`stop`][Self::stop]
    /// is called.
    pub fn spawn(mut rx: mpsc::Receiver<JointStateSample>, mirror: Arc<SensorMirror>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ingested = 0u64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    sample = rx.recv() => match sample {
                        Some(sample) => {
                            let updated = mirror.ingest(&sample);
                            debug!(updated, "joint state ingested");
                            ingested += 1;
                        }
                        None => break,
                    },
                }
            }
            info!(ingested, "joint state feed stopped");
            ingested
        });
        Self { cancel, handle }
    }

    /// Stop the task and return how many samples it ingested.
    pub async fn stop(self) -> u64 {
        self.cancel.cancel();
        self.handle.await.unwrap_or(0)
    }
}
