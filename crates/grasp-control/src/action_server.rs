//! In-process command front end for a [`GoalController`].
//!
//! [`ActionServer`] is a tokio task that drains [`ActionRequest`]s from an
//! mpsc channel and answers each one on its own oneshot.  [`ActionClient`]
//! is the cloneable sending side with one async method per request kind.
//!
//! Stopping the server (or dropping every client) shuts the controller down,
//! so an executing goal ends with [`AbortReason::Shutdown`][grasp_types::AbortReason::Shutdown].

use std::sync::Arc;

use grasp_types::{GoalId, GoalState, GraspError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::{GoalController, GoalTicket};

/// A command for the controller, carrying its reply channel.
#[derive(Debug)]
pub enum ActionRequest {
    Grasp {
        target: Vec<f32>,
        reply: oneshot::Sender<Result<GoalTicket, GraspError>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<GoalId, GraspError>>,
    },
    Query {
        reply: oneshot::Sender<GoalState>,
    },
}

/// Handle to the running command task.
pub struct ActionServer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActionServer {
    /// Spawn the command task on the current runtime.
    ///
    /// `capacity` bounds the number of queued requests.
    pub fn spawn(controller: Arc<GoalController>, capacity: usize) -> (ActionClient, Self) {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    request = rx.recv() => match request {
                        Some(request) => serve(&controller, request),
                        None => break,
                    },
                }
            }
            controller.shutdown().await;
            info!("grasp action server stopped");
        });

        (ActionClient { tx }, Self { cancel, handle })
    }

    /// Stop serving, shut the controller down, and wait for the task.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

fn serve(controller: &GoalController, request: ActionRequest) {
    // A caller that gave up on its reply is not an error.
    match request {
        ActionRequest::Grasp { target, reply } => {
            debug!(?target, "grasp request");
            let _ = reply.send(controller.accept_goal(target));
        }
        ActionRequest::Cancel { reply } => {
            debug!("cancel request");
            let _ = reply.send(controller.cancel_goal());
        }
        ActionRequest::Query { reply } => {
            let _ = reply.send(controller.query_state());
        }
    }
}

/// Sending side of an [`ActionServer`].
#[derive(Debug, Clone)]
pub struct ActionClient {
    tx: mpsc::Sender<ActionRequest>,
}

impl ActionClient {
    /// Submit a new goal, preempting any executing one.
    pub async fn grasp(&self, target: Vec<f32>) -> Result<GoalTicket, GraspError> {
        self.call(|reply| ActionRequest::Grasp { target, reply })
            .await?
    }

    /// Cancel the executing goal.
    pub async fn cancel(&self) -> Result<GoalId, GraspError> {
        self.call(|reply| ActionRequest::Cancel { reply }).await?
    }

    pub async fn state(&self) -> Result<GoalState, GraspError> {
        self.call(|reply| ActionRequest::Query { reply }).await
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> ActionRequest,
    ) -> Result<T, GraspError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(request(reply))
            .await
            .map_err(|_| GraspError::Channel("grasp action server is not running".to_string()))?;
        response
            .await
            .map_err(|_| GraspError::Channel("grasp action server dropped the request".to_string()))
    }
}
