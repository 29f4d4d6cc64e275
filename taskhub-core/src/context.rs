//! Execution contexts handed to orchestration and activity code
//!
//! An orchestration runs in replay turns. Each turn re-runs the handler from
//! the top against the outcomes recorded so far: a scheduled call whose
//! outcome is in the history resolves at once, any other call records what
//! must be started and stays pending. When the handler cannot finish, the
//! turn ends and the worker starts the recorded calls. The execution then
//! holds no lane until one of those calls reports back.

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use taskhub_models::OrchestrationInstance;
use tracing::{error, info, warn};

use crate::provider::{ActivityWorkItem, History, OrchestrationProvider, TaskKey, TaskResult};
use crate::registry::{decode, encode, TypeRegistry};

/// Work a turn asked for but that has no outcome yet
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    CallActivity {
        sequence: u64,
        name: String,
        input: String,
    },
    CreateTimer {
        sequence: u64,
        delay: Duration,
    },
    StartSubOrchestration {
        sequence: u64,
        instance: OrchestrationInstance,
        name: String,
        input: String,
    },
}

impl Action {
    /// Start the requested work. Every start is idempotent per sequence, so
    /// a later turn asking again is harmless.
    pub(crate) async fn enact(
        self,
        parent: &OrchestrationInstance,
        provider: &dyn OrchestrationProvider,
    ) -> Result<(), crate::error::ProviderError> {
        match self {
            Action::CallActivity { sequence, name, input } => {
                provider
                    .enqueue_activity(ActivityWorkItem {
                        key: TaskKey {
                            instance: parent.clone(),
                            sequence,
                        },
                        name,
                        input,
                    })
                    .await
            }
            Action::CreateTimer { sequence, delay } => {
                let fire_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|delay| Utc::now().checked_add_signed(delay))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                let key = TaskKey {
                    instance: parent.clone(),
                    sequence,
                };
                provider.schedule_timer(&key, fire_at).await
            }
            Action::StartSubOrchestration {
                sequence,
                instance,
                name,
                input,
            } => {
                let key = TaskKey {
                    instance: parent.clone(),
                    sequence,
                };
                provider.create_sub_orchestration(&key, &instance, &name, &input).await
            }
        }
    }
}

#[derive(Default)]
struct Turn {
    history: History,
    /// Distinct history entries the handler has consumed this turn
    replayed: usize,
    actions: Vec<Action>,
    next_sequence: u64,
}

fn lock(turn: &Mutex<Turn>) -> MutexGuard<'_, Turn> {
    match turn.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Future of one scheduled call. Resolves from the turn's history, or
/// records its action on first poll and stays pending.
struct ScheduledCall {
    turn: Arc<Mutex<Turn>>,
    sequence: u64,
    request: Option<Action>,
    resolved: bool,
}

impl Future for ScheduledCall {
    type Output = TaskResult;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<TaskResult> {
        let this = self.get_mut();
        let mut turn = lock(&this.turn);
        if let Some(result) = turn.history.get(&this.sequence).cloned() {
            if !this.resolved {
                this.resolved = true;
                turn.replayed += 1;
            }
            return Poll::Ready(result);
        }
        if let Some(action) = this.request.take() {
            turn.actions.push(action);
        }
        Poll::Pending
    }
}

/// Handle through which orchestration code schedules work.
///
/// Every scheduled call takes the next sequence number synchronously, so the
/// numbering follows program order even when futures are awaited together.
/// Orchestration code must therefore be deterministic: the same history has
/// to lead to the same calls in the same order.
#[derive(Clone)]
pub struct OrchestrationContext {
    instance: OrchestrationInstance,
    name: String,
    registry: TypeRegistry,
    turn: Arc<Mutex<Turn>>,
}

impl OrchestrationContext {
    pub(crate) fn new(
        instance: OrchestrationInstance,
        name: String,
        registry: TypeRegistry,
        history: History,
    ) -> Self {
        Self {
            instance,
            name,
            registry,
            turn: Arc::new(Mutex::new(Turn {
                history,
                ..Turn::default()
            })),
        }
    }

    pub fn instance(&self) -> &OrchestrationInstance {
        &self.instance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the handler is still catching up on recorded outcomes
    pub fn is_replaying(&self) -> bool {
        let turn = lock(&self.turn);
        turn.replayed < turn.history.len()
    }

    pub(crate) fn take_actions(&self) -> Vec<Action> {
        std::mem::take(&mut lock(&self.turn).actions)
    }

    fn next_sequence(&self) -> u64 {
        let mut turn = lock(&self.turn);
        let sequence = turn.next_sequence;
        turn.next_sequence += 1;
        sequence
    }

    fn call(&self, sequence: u64, action: Action) -> ScheduledCall {
        ScheduledCall {
            turn: self.turn.clone(),
            sequence,
            request: Some(action),
            resolved: false,
        }
    }

    /// Schedule an activity and get a future for its raw JSON result
    pub fn schedule_activity(
        &self,
        name: impl Into<String>,
        input: impl Into<String>,
    ) -> BoxFuture<'static, Result<String, String>> {
        let sequence = self.next_sequence();
        self.call(
            sequence,
            Action::CallActivity {
                sequence,
                name: name.into(),
                input: input.into(),
            },
        )
        .boxed()
    }

    /// Typed variant of [`Self::schedule_activity`]
    pub fn schedule_activity_typed<In, Out>(
        &self,
        name: impl Into<String>,
        input: &In,
    ) -> BoxFuture<'static, Result<Out, String>>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned + Send + 'static,
    {
        let input = match encode(input) {
            Ok(input) => input,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        self.schedule_activity(name, input)
            .map(|result| result.and_then(|output| decode::<Out>(&output)))
            .boxed()
    }

    /// Durable timer. The fire time is fixed when the timer is first armed,
    /// so a re-dispatched execution does not wait again.
    pub fn schedule_timer(&self, delay: Duration) -> BoxFuture<'static, ()> {
        let sequence = self.next_sequence();
        self.call(sequence, Action::CreateTimer { sequence, delay })
            .map(|_| ())
            .boxed()
    }

    /// Start a child orchestration and get a future for its output.
    ///
    /// The child instance id is derived from this execution and the call's
    /// sequence number, so every execution of a re-run instance gets its own
    /// children.
    pub fn schedule_sub_orchestration(
        &self,
        name: impl Into<String>,
        input: impl Into<String>,
    ) -> BoxFuture<'static, Result<String, String>> {
        let sequence = self.next_sequence();
        let name = name.into();
        if !self.registry.contains_orchestration(&name) {
            return future::ready(Err(format!("Unknown Orchestration Type Name : {}", name))).boxed();
        }
        let child = OrchestrationInstance::new_execution(format!(
            "{}:{}:{}",
            self.instance.instance_id, self.instance.execution_id, sequence
        ));
        self.call(
            sequence,
            Action::StartSubOrchestration {
                sequence,
                instance: child,
                name,
                input: input.into(),
            },
        )
        .boxed()
    }

    /// Typed variant of [`Self::schedule_sub_orchestration`]
    pub fn schedule_sub_orchestration_typed<In, Out>(
        &self,
        name: impl Into<String>,
        input: &In,
    ) -> BoxFuture<'static, Result<Out, String>>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned + Send + 'static,
    {
        let input = match encode(input) {
            Ok(input) => input,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        self.schedule_sub_orchestration(name, input)
            .map(|result| result.and_then(|output| decode::<Out>(&output)))
            .boxed()
    }

    /// Logs once per execution: suppressed while replaying
    pub fn trace_info(&self, message: impl Into<String>) {
        if self.is_replaying() {
            return;
        }
        info!(
            instance_id = %self.instance.instance_id,
            execution_id = %self.instance.execution_id,
            orchestration = %self.name,
            "{}",
            message.into()
        );
    }

    pub fn trace_warn(&self, message: impl Into<String>) {
        if self.is_replaying() {
            return;
        }
        warn!(
            instance_id = %self.instance.instance_id,
            execution_id = %self.instance.execution_id,
            orchestration = %self.name,
            "{}",
            message.into()
        );
    }

    pub fn trace_error(&self, message: impl Into<String>) {
        if self.is_replaying() {
            return;
        }
        error!(
            instance_id = %self.instance.instance_id,
            execution_id = %self.instance.execution_id,
            orchestration = %self.name,
            "{}",
            message.into()
        );
    }
}

/// Context of one activity invocation
#[derive(Debug, Clone)]
pub struct ActivityContext {
    instance: OrchestrationInstance,
    activity_name: String,
    sequence: u64,
}

impl ActivityContext {
    pub fn new(key: &TaskKey, activity_name: String) -> Self {
        Self {
            instance: key.instance.clone(),
            activity_name,
            sequence: key.sequence,
        }
    }

    /// Orchestration execution that scheduled this activity
    pub fn instance(&self) -> &OrchestrationInstance {
        &self.instance
    }

    pub fn activity_name(&self) -> &str {
        &self.activity_name
    }

    pub fn trace_info(&self, message: impl Into<String>) {
        info!(
            instance_id = %self.instance.instance_id,
            activity = %self.activity_name,
            sequence = self.sequence,
            "{}",
            message.into()
        );
    }

    pub fn trace_warn(&self, message: impl Into<String>) {
        warn!(
            instance_id = %self.instance.instance_id,
            activity = %self.activity_name,
            sequence = self.sequence,
            "{}",
            message.into()
        );
    }

    pub fn trace_error(&self, message: impl Into<String>) {
        error!(
            instance_id = %self.instance.instance_id,
            activity = %self.activity_name,
            sequence = self.sequence,
            "{}",
            message.into()
        );
    }
}
