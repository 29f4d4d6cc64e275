//! Backing orchestration provider seam
//!
//! The provider owns instance state, per-execution history, durable timers
//! and the two work queues. The worker pulls from the queues, the client
//! reads and writes instance state. Both share one
//! `Arc<dyn OrchestrationProvider>`.
//!
//! An orchestration item is one replay turn, not a whole run. Recording an
//! outcome for an execution (activity result, fired timer, finished child)
//! queues its next turn.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use taskhub_models::{OrchestrationInstance, OrchestrationState, OrchestrationStatus};

use crate::error::ProviderError;

pub mod in_memory;

pub use in_memory::InMemoryProvider;

/// Opaque handle of a peek-locked work item
pub type LockToken = u64;

/// Which queue a lock token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Orchestration,
    Activity,
}

/// Request to run one replay turn of an orchestration execution
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationWorkItem {
    pub instance: OrchestrationInstance,
    pub name: String,
    pub input: String,
}

/// Identifies one scheduled call (activity, timer or sub-orchestration)
/// inside an execution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub instance: OrchestrationInstance,
    /// Position of the call in the orchestration's schedule order
    pub sequence: u64,
}

/// Request to run one activity on behalf of an orchestration
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityWorkItem {
    pub key: TaskKey,
    pub name: String,
    pub input: String,
}

/// Outcome of a scheduled call: output on success, error text on failure
pub type TaskResult = Result<String, String>;

/// Recorded outcomes of one execution, keyed by sequence
pub type History = HashMap<u64, TaskResult>;

/// Point-in-time counters used by health reporting and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProviderStats {
    pub instances: usize,
    pub executions: usize,
    pub pending_orchestrations: usize,
    pub pending_activities: usize,
    pub pending_timers: usize,
    pub locked_orchestrations: usize,
    pub locked_activities: usize,
}

#[async_trait]
pub trait OrchestrationProvider: Send + Sync {
    /// Cheap availability check, used before the worker starts dispatching
    async fn ping(&self) -> Result<(), ProviderError>;

    /// Whether this replica currently holds write status
    fn is_writable(&self) -> bool;

    /// Granted or revoked by the host as the replica role changes
    fn set_writable(&self, writable: bool);

    // ---- client side ----

    /// Record a new pending execution and queue its first turn
    async fn create_instance(
        &self,
        instance: &OrchestrationInstance,
        name: &str,
        input: &str,
    ) -> Result<(), ProviderError>;

    async fn read_state(
        &self,
        instance: &OrchestrationInstance,
    ) -> Result<Option<OrchestrationState>, ProviderError>;

    /// Latest execution of `instance_id`, ignoring earlier executions
    async fn read_latest_state(
        &self,
        instance_id: &str,
    ) -> Result<Option<OrchestrationState>, ProviderError>;

    /// Drop terminal executions completed strictly before `threshold`.
    /// Returns how many executions were removed.
    async fn purge_completed_before(&self, threshold: DateTime<Utc>) -> Result<usize, ProviderError>;

    // ---- dispatch side ----

    async fn fetch_orchestration_item(
        &self,
    ) -> Result<Option<(OrchestrationWorkItem, LockToken)>, ProviderError>;

    async fn set_status(
        &self,
        instance: &OrchestrationInstance,
        status: OrchestrationStatus,
    ) -> Result<(), ProviderError>;

    /// Mark an execution terminal. A sub-orchestration's outcome is recorded
    /// in its parent's history, which queues a parent turn.
    async fn complete_orchestration(
        &self,
        instance: &OrchestrationInstance,
        status: OrchestrationStatus,
        output: Option<String>,
    ) -> Result<(), ProviderError>;

    /// Outcomes recorded so far for `instance`
    async fn read_history(&self, instance: &OrchestrationInstance) -> Result<History, ProviderError>;

    /// Queue an activity call. Re-enqueueing an already scheduled key is a no-op.
    async fn enqueue_activity(&self, item: ActivityWorkItem) -> Result<(), ProviderError>;

    async fn fetch_activity_item(&self) -> Result<Option<(ActivityWorkItem, LockToken)>, ProviderError>;

    /// Record an activity outcome and queue a turn for the owning execution.
    /// The first outcome recorded for a key wins.
    async fn complete_activity(&self, key: &TaskKey, result: TaskResult) -> Result<(), ProviderError>;

    /// Arm a durable timer. Re-arming an already scheduled key is a no-op.
    async fn schedule_timer(&self, key: &TaskKey, fire_at: DateTime<Utc>) -> Result<(), ProviderError>;

    /// Fire every timer due at `now`, queueing turns for their executions.
    /// Returns how many fired.
    async fn fire_due_timers(&self, now: DateTime<Utc>) -> Result<usize, ProviderError>;

    /// Create `child` as a sub-orchestration linked to the `parent` call.
    /// A no-op when the parent call already started its child.
    async fn create_sub_orchestration(
        &self,
        parent: &TaskKey,
        child: &OrchestrationInstance,
        name: &str,
        input: &str,
    ) -> Result<(), ProviderError>;

    /// Release a lock after the item was fully processed
    async fn ack(&self, kind: QueueKind, token: LockToken) -> Result<(), ProviderError>;

    /// Release a lock and make the item visible again
    async fn abandon(&self, kind: QueueKind, token: LockToken) -> Result<(), ProviderError>;

    async fn stats(&self) -> Result<ProviderStats, ProviderError>;
}
