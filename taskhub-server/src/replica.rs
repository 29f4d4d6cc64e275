//! Replica Lifecycle Controller
//!
//! The hosting runtime reports role changes and the "became writable
//! primary" hook through a [`ReplicaHandle`]. A single consumer task applies
//! them in arrival order, so the worker only dispatches while this replica
//! is the writable primary.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use taskhub_core::{cancelled, OrchestrationProvider, Worker, WorkerError};
use taskhub_models::ReplicaRole;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Notifications delivered by the hosting runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaEvent {
    RoleChanged(ReplicaRole),
    /// Replica became primary with write authority and is runnable
    PrimaryWritable,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    NotPrimary,
    Primary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Nothing,
    StartWorker,
    StopWorker,
    /// Writable hook arrived after a demotion already won
    SkipStart,
}

/// Transition table. Pure: the caller acts first and stores `next` afterwards.
pub fn decide(state: ControllerState, event: ReplicaEvent) -> (Action, ControllerState) {
    use ControllerState::*;

    match (state, event) {
        (NotPrimary, ReplicaEvent::RoleChanged(ReplicaRole::Primary)) => (Action::Nothing, Primary),
        (NotPrimary, ReplicaEvent::RoleChanged(_)) => (Action::Nothing, NotPrimary),
        (Primary, ReplicaEvent::RoleChanged(ReplicaRole::Primary)) => (Action::Nothing, Primary),
        (Primary, ReplicaEvent::RoleChanged(_)) => (Action::StopWorker, NotPrimary),
        (Primary, ReplicaEvent::PrimaryWritable) => (Action::StartWorker, Primary),
        (NotPrimary, ReplicaEvent::PrimaryWritable) => (Action::SkipStart, NotPrimary),
        (_, ReplicaEvent::Shutdown) => (Action::StopWorker, NotPrimary),
    }
}

/// What the controller needs from a worker
#[async_trait]
pub trait DispatchWorker: Send + Sync {
    async fn start(&self) -> Result<(), WorkerError>;
    async fn stop(&self, forced: bool) -> Result<(), WorkerError>;
}

#[async_trait]
impl DispatchWorker for Worker {
    async fn start(&self) -> Result<(), WorkerError> {
        Worker::start(self).await
    }

    async fn stop(&self, forced: bool) -> Result<(), WorkerError> {
        Worker::stop(self, forced).await
    }
}

/// Last role and state applied by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    pub role: ReplicaRole,
    pub state: ControllerState,
}

#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("replica controller is no longer running")]
    ControllerStopped,
}

/// Sending side of the controller's event channel
#[derive(Clone)]
pub struct ReplicaHandle {
    events: mpsc::Sender<ReplicaEvent>,
    snapshot: watch::Receiver<ControllerSnapshot>,
}

impl ReplicaHandle {
    pub async fn change_role(&self, role: ReplicaRole) -> Result<(), ReplicaError> {
        self.send(ReplicaEvent::RoleChanged(role)).await
    }

    pub async fn primary_writable(&self) -> Result<(), ReplicaError> {
        self.send(ReplicaEvent::PrimaryWritable).await
    }

    pub async fn shutdown(&self) -> Result<(), ReplicaError> {
        self.send(ReplicaEvent::Shutdown).await
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        *self.snapshot.borrow()
    }

    /// Observe snapshots as the controller applies events
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.clone()
    }

    async fn send(&self, event: ReplicaEvent) -> Result<(), ReplicaError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ReplicaError::ControllerStopped)
    }
}

pub struct LifecycleController {
    worker: Arc<dyn DispatchWorker>,
    provider: Arc<dyn OrchestrationProvider>,
    events: mpsc::Receiver<ReplicaEvent>,
    snapshot: watch::Sender<ControllerSnapshot>,
    state: ControllerState,
    role: ReplicaRole,
}

impl LifecycleController {
    pub fn new(
        worker: Arc<dyn DispatchWorker>,
        provider: Arc<dyn OrchestrationProvider>,
    ) -> (Self, ReplicaHandle) {
        let (events_tx, events) = mpsc::channel(64);
        let initial = ControllerSnapshot {
            role: ReplicaRole::None,
            state: ControllerState::NotPrimary,
        };
        let (snapshot, snapshot_rx) = watch::channel(initial);

        let controller = Self {
            worker,
            provider,
            events,
            snapshot,
            state: initial.state,
            role: initial.role,
        };
        let handle = ReplicaHandle {
            events: events_tx,
            snapshot: snapshot_rx,
        };
        (controller, handle)
    }

    /// Consume events until shutdown. A worker start failure ends the loop
    /// with the error; stop failures are only logged.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!("Replica lifecycle controller started");
        loop {
            let event = tokio::select! {
                event = self.events.recv() => event.unwrap_or(ReplicaEvent::Shutdown),
                _ = cancelled(&mut cancel) => ReplicaEvent::Shutdown,
            };
            self.apply(event).await?;
            if event == ReplicaEvent::Shutdown {
                break;
            }
        }
        info!("Replica lifecycle controller stopped");
        Ok(())
    }

    async fn apply(&mut self, event: ReplicaEvent) -> Result<(), WorkerError> {
        let (action, next) = decide(self.state, event);
        debug!(?event, state = ?self.state, ?action, next = ?next, "Applying replica event");

        match action {
            Action::Nothing => {}
            Action::SkipStart => {
                warn!(role = %self.role, "Primary writable hook arrived after demotion, not starting worker");
            }
            Action::StartWorker => {
                self.worker.start().await.map_err(|e| {
                    error!(error = %e, "Failed to start worker on primary");
                    e
                })?;
            }
            Action::StopWorker => {
                // no client writes while the worker winds down
                self.provider.set_writable(false);
                if let Err(e) = self.worker.stop(true).await {
                    error!(error = %e, "Worker stop failed, continuing role transition");
                }
            }
        }

        match event {
            ReplicaEvent::RoleChanged(role) => {
                self.provider.set_writable(role == ReplicaRole::Primary);
                if role != self.role {
                    info!(from = %self.role, to = %role, "Replica role changed");
                }
                self.role = role;
            }
            ReplicaEvent::Shutdown => self.provider.set_writable(false),
            ReplicaEvent::PrimaryWritable => {}
        }

        self.state = next;
        self.snapshot.send_replace(ControllerSnapshot {
            role: self.role,
            state: self.state,
        });
        Ok(())
    }
}
