//! Worker: owns the orchestration and activity dispatcher lanes
//!
//! Orchestration lanes run one replay turn per item and let go of the
//! execution as soon as it waits on something, so a lane is never parked on
//! a child or an activity. Activity lanes run activities inline, and a timer
//! lane fires due durable timers. Aborting a lane cancels the item it was
//! running; locks held by aborted lanes are abandoned, which makes those
//! items visible to the next worker that starts.

use chrono::Utc;
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskhub_models::OrchestrationStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::{ActivityContext, OrchestrationContext};
use crate::error::{ProviderError, WorkerError};
use crate::provider::{
    ActivityWorkItem, LockToken, OrchestrationProvider, OrchestrationWorkItem, QueueKind,
};
use crate::registry::TypeRegistry;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Concurrent orchestration dispatcher lanes
    pub orchestration_dispatchers: usize,
    /// Concurrent activity dispatcher lanes
    pub activity_dispatchers: usize,
    /// Sleep between fetches when a queue is empty
    pub idle_poll_interval: Duration,
    /// Upper bound for a non-forced stop before falling back to a forced one
    pub graceful_stop_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            orchestration_dispatchers: 5,
            activity_dispatchers: 5,
            idle_poll_interval: Duration::from_millis(10),
            graceful_stop_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerOptions {
    fn validate(&self) -> Result<(), WorkerError> {
        if self.orchestration_dispatchers == 0 {
            return Err(WorkerError::InvalidOptions(
                "orchestration_dispatchers must be at least 1".to_string(),
            ));
        }
        if self.activity_dispatchers == 0 {
            return Err(WorkerError::InvalidOptions(
                "activity_dispatchers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

type InFlight = Arc<Mutex<HashSet<(QueueKind, LockToken)>>>;

struct Lanes {
    orchestration: Vec<JoinHandle<()>>,
    activity: Vec<JoinHandle<()>>,
    timer: JoinHandle<()>,
    stop_orchestrations: watch::Sender<bool>,
    stop_activities: watch::Sender<bool>,
    in_flight: InFlight,
}

/// Shared pieces every lane needs
#[derive(Clone)]
struct LaneEnv {
    provider: Arc<dyn OrchestrationProvider>,
    registry: TypeRegistry,
    idle_poll_interval: Duration,
    in_flight: InFlight,
}

pub struct Worker {
    provider: Arc<dyn OrchestrationProvider>,
    registry: TypeRegistry,
    options: WorkerOptions,
    /// Serializes start/stop; `Some` while lanes exist
    lanes: tokio::sync::Mutex<Option<Lanes>>,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    pub fn new(
        provider: Arc<dyn OrchestrationProvider>,
        registry: TypeRegistry,
        options: WorkerOptions,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Stopped);
        Self {
            provider,
            registry,
            options,
            lanes: tokio::sync::Mutex::new(None),
            state,
        }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Number of live dispatcher lane tasks
    pub async fn active_lanes(&self) -> usize {
        let lanes = self.lanes.lock().await;
        lanes
            .as_ref()
            .map(|l| {
                l.orchestration
                    .iter()
                    .chain(l.activity.iter())
                    .filter(|h| !h.is_finished())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Start the dispatcher lanes. A no-op when already started.
    pub async fn start(&self) -> Result<(), WorkerError> {
        let mut lanes = self.lanes.lock().await;
        if lanes.is_some() {
            debug!("Worker already running, ignoring start");
            return Ok(());
        }

        self.options.validate()?;
        self.state.send_replace(WorkerState::Starting);

        if let Err(e) = self.provider.ping().await {
            self.state.send_replace(WorkerState::Stopped);
            return Err(WorkerError::ProviderUnavailable(e.to_string()));
        }

        info!(
            orchestrations = ?self.registry.orchestration_names(),
            activities = ?self.registry.activity_names(),
            "Registering orchestration and activity types with dispatcher"
        );

        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
        let env = LaneEnv {
            provider: self.provider.clone(),
            registry: self.registry.clone(),
            idle_poll_interval: self.options.idle_poll_interval,
            in_flight: in_flight.clone(),
        };
        let (stop_orchestrations, orchestration_rx) = watch::channel(false);
        let (stop_activities, activity_rx) = watch::channel(false);

        let orchestration = (0..self.options.orchestration_dispatchers)
            .map(|lane| tokio::spawn(orchestration_lane(lane, env.clone(), orchestration_rx.clone())))
            .collect();
        let activity = (0..self.options.activity_dispatchers)
            .map(|lane| tokio::spawn(activity_lane(lane, env.clone(), activity_rx.clone())))
            .collect();
        let timer = tokio::spawn(timer_lane(env, activity_rx));

        *lanes = Some(Lanes {
            orchestration,
            activity,
            timer,
            stop_orchestrations,
            stop_activities,
            in_flight,
        });
        self.state.send_replace(WorkerState::Running);

        info!(
            orchestration_dispatchers = self.options.orchestration_dispatchers,
            activity_dispatchers = self.options.activity_dispatchers,
            "✓ Worker started"
        );
        Ok(())
    }

    /// Stop the dispatcher lanes. A no-op when not started.
    ///
    /// `forced` aborts in-flight work right away; otherwise in-flight items
    /// finish first, bounded by `graceful_stop_timeout`.
    pub async fn stop(&self, forced: bool) -> Result<(), WorkerError> {
        let mut guard = self.lanes.lock().await;
        let Some(mut lanes) = guard.take() else {
            debug!("Worker not running, ignoring stop");
            return Ok(());
        };
        self.state.send_replace(WorkerState::Stopping);
        info!(forced, "Stopping worker");

        let mut failures = Vec::new();
        if forced {
            abort_all(&mut lanes.orchestration, &mut failures).await;
            abort_all(&mut lanes.activity, &mut failures).await;
        } else {
            // turns in flight may still enqueue activities, so drain them first
            let _ = lanes.stop_orchestrations.send(true);
            let drained = self
                .drain(&mut lanes.orchestration, &mut failures)
                .await;
            let _ = lanes.stop_activities.send(true);
            if drained {
                self.drain(&mut lanes.activity, &mut failures).await;
            } else {
                abort_all(&mut lanes.activity, &mut failures).await;
            }
        }
        lanes.timer.abort();
        if let Err(e) = (&mut lanes.timer).await {
            if !e.is_cancelled() {
                failures.push(e.to_string());
            }
        }

        let leftover: Vec<(QueueKind, LockToken)> = match lanes.in_flight.lock() {
            Ok(mut held) => held.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };
        for (kind, token) in leftover {
            match self.provider.abandon(kind, token).await {
                Ok(()) => debug!(?kind, token, "Abandoned in-flight work item"),
                Err(e) => {
                    warn!(?kind, token, error = %e, "Failed to abandon work item");
                    failures.push(e.to_string());
                }
            }
        }

        self.state.send_replace(WorkerState::Stopped);
        info!("✓ Worker stopped");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WorkerError::LaneFailed(failures.join("; ")))
        }
    }

    /// Wait for lanes to exit; aborts them once the graceful timeout passes.
    /// Returns false when the timeout was hit.
    async fn drain(&self, handles: &mut Vec<JoinHandle<()>>, failures: &mut Vec<String>) -> bool {
        // finished handles are popped so the abort path never polls them twice
        let wait_all = async {
            while let Some(handle) = handles.last_mut() {
                if let Err(e) = handle.await {
                    failures.push(e.to_string());
                }
                handles.pop();
            }
        };
        match tokio::time::timeout(self.options.graceful_stop_timeout, wait_all).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    timeout = ?self.options.graceful_stop_timeout,
                    "Graceful stop timed out, cancelling in-flight work"
                );
                abort_all(handles, failures).await;
                false
            }
        }
    }
}

async fn abort_all(handles: &mut Vec<JoinHandle<()>>, failures: &mut Vec<String>) {
    for handle in handles.iter() {
        handle.abort();
    }
    for handle in handles.drain(..) {
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => failures.push(e.to_string()),
        }
    }
}

/// Resolves when the stop flag is raised or its sender is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

fn track(in_flight: &InFlight, kind: QueueKind, token: LockToken, held: bool) {
    let mut set = match in_flight.lock() {
        Ok(set) => set,
        Err(poisoned) => poisoned.into_inner(),
    };
    if held {
        set.insert((kind, token));
    } else {
        set.remove(&(kind, token));
    }
}

async fn orchestration_lane(lane: usize, env: LaneEnv, mut stop: watch::Receiver<bool>) {
    debug!(lane, "Orchestration dispatcher started");
    loop {
        if *stop.borrow() {
            break;
        }
        match env.provider.fetch_orchestration_item().await {
            Ok(Some((item, token))) => {
                track(&env.in_flight, QueueKind::Orchestration, token, true);
                if run_turn(lane, &env, item, token).await {
                    track(&env.in_flight, QueueKind::Orchestration, token, false);
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = stop_requested(&mut stop) => {}
                    _ = tokio::time::sleep(env.idle_poll_interval) => {}
                }
            }
            Err(e) => {
                warn!(lane, error = %e, "Failed to fetch orchestration work item");
                tokio::select! {
                    _ = stop_requested(&mut stop) => {}
                    _ = tokio::time::sleep(env.idle_poll_interval * 10) => {}
                }
            }
        }
    }
    debug!(lane, "Orchestration dispatcher exited");
}

/// Run one replay turn. Returns false when the lock could not be released
/// and must stay tracked so `stop` abandons it.
async fn run_turn(lane: usize, env: &LaneEnv, item: OrchestrationWorkItem, token: LockToken) -> bool {
    let provider = &env.provider;
    let instance = item.instance.clone();

    match provider.read_state(&instance).await {
        Ok(Some(state)) if state.status.is_terminal() => {
            debug!(lane, %instance, "Execution already terminal, dropping work item");
            return release(env, QueueKind::Orchestration, token).await;
        }
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(lane, %instance, "Work item refers to a purged execution, dropping it");
            return release(env, QueueKind::Orchestration, token).await;
        }
        Err(e) => {
            warn!(lane, %instance, error = %e, "Failed to read execution state");
            return give_back(env, QueueKind::Orchestration, token).await;
        }
    }

    if let Err(e) = provider.set_status(&instance, OrchestrationStatus::Running).await {
        warn!(lane, %instance, error = %e, "Failed to mark execution running");
    }
    let history = match provider.read_history(&instance).await {
        Ok(history) => history,
        Err(e) => {
            warn!(lane, %instance, error = %e, "Failed to read execution history");
            return give_back(env, QueueKind::Orchestration, token).await;
        }
    };
    debug!(lane, %instance, orchestration = %item.name, recorded = history.len(), "Running orchestration turn");

    let outcome = match env.registry.resolve(&item.name) {
        Ok(handler) => {
            let ctx = OrchestrationContext::new(instance.clone(), item.name.clone(), env.registry.clone(), history);
            let polled = AssertUnwindSafe(handler.invoke(ctx.clone(), item.input.clone()))
                .catch_unwind()
                .now_or_never();
            match polled {
                Some(Ok(result)) => Some(result),
                Some(Err(_)) => Some(Err(format!("orchestration {} panicked", item.name))),
                None => {
                    let actions = ctx.take_actions();
                    let started = actions.len();
                    for action in actions {
                        if let Err(e) = action.enact(&instance, provider.as_ref()).await {
                            warn!(lane, %instance, error = %e, "Failed to start scheduled work");
                            return give_back(env, QueueKind::Orchestration, token).await;
                        }
                    }
                    debug!(lane, %instance, started, "Orchestration waiting on scheduled work");
                    None
                }
            }
        }
        Err(e) => Some(Err(e.to_string())),
    };

    let Some(outcome) = outcome else {
        return release(env, QueueKind::Orchestration, token).await;
    };
    let (status, output) = match outcome {
        Ok(output) => (OrchestrationStatus::Completed, Some(output)),
        Err(error) => {
            warn!(lane, %instance, orchestration = %item.name, %error, "Orchestration failed");
            (OrchestrationStatus::Failed, Some(error))
        }
    };

    match provider.complete_orchestration(&instance, status, output).await {
        Ok(()) => {
            info!(lane, %instance, orchestration = %item.name, %status, "Orchestration finished");
            release(env, QueueKind::Orchestration, token).await
        }
        Err(e) => {
            error!(lane, %instance, error = %e, "Failed to record orchestration outcome");
            give_back(env, QueueKind::Orchestration, token).await
        }
    }
}

async fn activity_lane(lane: usize, env: LaneEnv, mut stop: watch::Receiver<bool>) {
    debug!(lane, "Activity dispatcher started");
    loop {
        if *stop.borrow() {
            break;
        }
        match env.provider.fetch_activity_item().await {
            Ok(Some((item, token))) => {
                track(&env.in_flight, QueueKind::Activity, token, true);
                if execute_activity(lane, &env, item, token).await {
                    track(&env.in_flight, QueueKind::Activity, token, false);
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = stop_requested(&mut stop) => {}
                    _ = tokio::time::sleep(env.idle_poll_interval) => {}
                }
            }
            Err(e) => {
                warn!(lane, error = %e, "Failed to fetch activity work item");
                tokio::select! {
                    _ = stop_requested(&mut stop) => {}
                    _ = tokio::time::sleep(env.idle_poll_interval * 10) => {}
                }
            }
        }
    }
    debug!(lane, "Activity dispatcher exited");
}

async fn execute_activity(lane: usize, env: &LaneEnv, item: ActivityWorkItem, token: LockToken) -> bool {
    let result = match env.registry.activity(&item.name) {
        Some(handler) => {
            let ctx = ActivityContext::new(&item.key, item.name.clone());
            AssertUnwindSafe(handler.invoke(ctx, item.input.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(format!("activity {} panicked", item.name)))
        }
        None => Err(format!("unregistered activity: {}", item.name)),
    };

    if let Err(error) = &result {
        debug!(lane, instance = %item.key.instance, activity = %item.name, %error, "Activity failed");
    }

    match env.provider.complete_activity(&item.key, result).await {
        Ok(()) => release(env, QueueKind::Activity, token).await,
        Err(e) => {
            error!(lane, activity = %item.name, error = %e, "Failed to record activity result");
            give_back(env, QueueKind::Activity, token).await
        }
    }
}

async fn timer_lane(env: LaneEnv, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }
        match env.provider.fire_due_timers(Utc::now()).await {
            Ok(0) => {}
            Ok(fired) => debug!(fired, "Fired durable timers"),
            Err(e) => warn!(error = %e, "Failed to fire durable timers"),
        }
        tokio::select! {
            _ = stop_requested(&mut stop) => {}
            _ = tokio::time::sleep(env.idle_poll_interval) => {}
        }
    }
}

/// Ack a processed item. False when the lock is still held.
async fn release(env: &LaneEnv, kind: QueueKind, token: LockToken) -> bool {
    match env.provider.ack(kind, token).await {
        Ok(()) | Err(ProviderError::LockLost(_)) => true,
        Err(e) => {
            warn!(?kind, token, error = %e, "Failed to ack work item, keeping it for stop");
            false
        }
    }
}

/// Abandon an item so it is dispatched again. False when the lock is still held.
async fn give_back(env: &LaneEnv, kind: QueueKind, token: LockToken) -> bool {
    match env.provider.abandon(kind, token).await {
        Ok(()) | Err(ProviderError::LockLost(_)) => true,
        Err(e) => {
            error!(?kind, token, error = %e, "Failed to abandon work item, keeping it for stop");
            false
        }
    }
}
