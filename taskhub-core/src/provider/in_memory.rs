//! Process-local provider backed by plain collections

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use taskhub_models::{OrchestrationInstance, OrchestrationState, OrchestrationStatus};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    ActivityWorkItem, History, LockToken, OrchestrationProvider, OrchestrationWorkItem, ProviderStats,
    QueueKind, TaskKey, TaskResult,
};
use crate::error::ProviderError;

#[derive(Default)]
struct Inner {
    /// Executions per instance id, oldest first
    instances: HashMap<String, Vec<OrchestrationState>>,
    orchestration_queue: VecDeque<OrchestrationWorkItem>,
    activity_queue: VecDeque<ActivityWorkItem>,
    locked_orchestrations: HashMap<LockToken, OrchestrationWorkItem>,
    locked_activities: HashMap<LockToken, ActivityWorkItem>,
    /// Executions with a turn sitting in `orchestration_queue`
    queued: HashSet<OrchestrationInstance>,
    /// Executions woken while one of their turns held a lock
    rewake: HashSet<OrchestrationInstance>,
    /// Every activity, timer and child call that was started
    scheduled: HashSet<TaskKey>,
    timers: Vec<(DateTime<Utc>, TaskKey)>,
    history: HashMap<OrchestrationInstance, History>,
    /// Child execution to the parent call waiting on it
    parents: HashMap<OrchestrationInstance, TaskKey>,
    next_token: LockToken,
}

impl Inner {
    fn execution(&self, instance: &OrchestrationInstance) -> Option<&OrchestrationState> {
        self.instances
            .get(&instance.instance_id)?
            .iter()
            .find(|s| s.instance.execution_id == instance.execution_id)
    }

    fn execution_mut(&mut self, instance: &OrchestrationInstance) -> Option<&mut OrchestrationState> {
        self.instances
            .get_mut(&instance.instance_id)?
            .iter_mut()
            .find(|s| s.instance.execution_id == instance.execution_id)
    }

    fn next_token(&mut self) -> LockToken {
        self.next_token += 1;
        self.next_token
    }

    fn insert_execution(&mut self, instance: &OrchestrationInstance, name: &str, input: &str) {
        let now = Utc::now();
        self.instances
            .entry(instance.instance_id.clone())
            .or_default()
            .push(OrchestrationState {
                instance: instance.clone(),
                name: name.to_string(),
                status: OrchestrationStatus::Pending,
                input: input.to_string(),
                output: None,
                created_at: now,
                last_updated_at: now,
                completed_at: None,
            });
        self.orchestration_queue.push_back(OrchestrationWorkItem {
            instance: instance.clone(),
            name: name.to_string(),
            input: input.to_string(),
        });
        self.queued.insert(instance.clone());
    }

    /// Queue a turn for a live execution, unless one is already queued.
    /// A turn that is running right now gets a follow-up once it is acked.
    fn wake(&mut self, instance: &OrchestrationInstance) {
        let item = match self.execution(instance) {
            Some(state) if !state.status.is_terminal() => OrchestrationWorkItem {
                instance: instance.clone(),
                name: state.name.clone(),
                input: state.input.clone(),
            },
            _ => return,
        };
        if self.queued.contains(instance) {
            return;
        }
        if self.locked_orchestrations.values().any(|held| held.instance == *instance) {
            self.rewake.insert(instance.clone());
            return;
        }
        self.queued.insert(instance.clone());
        self.orchestration_queue.push_back(item);
    }

    fn record(&mut self, key: &TaskKey, result: TaskResult) {
        if self.execution(&key.instance).is_none() {
            return;
        }
        // first outcome wins when an abandoned activity ran twice
        self.history
            .entry(key.instance.clone())
            .or_default()
            .entry(key.sequence)
            .or_insert(result);
        self.wake(&key.instance);
    }
}

/// Provider that keeps every instance, queue and lock in memory.
///
/// Starts writable and available; the host flips write status as the
/// replica role changes.
pub struct InMemoryProvider {
    inner: Mutex<Inner>,
    writable: AtomicBool,
    available: AtomicBool,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            writable: AtomicBool::new(true),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backing store going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Unavailable("in-memory store is offline".to_string()))
        }
    }

    fn check_writable(&self) -> Result<(), ProviderError> {
        self.check_available()?;
        if self.is_writable() {
            Ok(())
        } else {
            Err(ProviderError::NotWritable)
        }
    }
}

#[async_trait]
impl OrchestrationProvider for InMemoryProvider {
    async fn ping(&self) -> Result<(), ProviderError> {
        self.check_available()
    }

    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn set_writable(&self, writable: bool) {
        let previous = self.writable.swap(writable, Ordering::SeqCst);
        if previous != writable {
            debug!(writable, "Provider write status changed");
        }
    }

    async fn create_instance(
        &self,
        instance: &OrchestrationInstance,
        name: &str,
        input: &str,
    ) -> Result<(), ProviderError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;

        if let Some(latest) = inner.instances.get(&instance.instance_id).and_then(|e| e.last()) {
            if !latest.status.is_terminal() {
                return Err(ProviderError::InstanceAlreadyExists(instance.instance_id.clone()));
            }
        }
        inner.insert_execution(instance, name, input);
        Ok(())
    }

    async fn read_state(
        &self,
        instance: &OrchestrationInstance,
    ) -> Result<Option<OrchestrationState>, ProviderError> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        Ok(inner.execution(instance).cloned())
    }

    async fn read_latest_state(
        &self,
        instance_id: &str,
    ) -> Result<Option<OrchestrationState>, ProviderError> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .instances
            .get(instance_id)
            .and_then(|executions| executions.last().cloned()))
    }

    async fn purge_completed_before(&self, threshold: DateTime<Utc>) -> Result<usize, ProviderError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;

        let mut purged: Vec<OrchestrationInstance> = Vec::new();
        for executions in inner.instances.values_mut() {
            executions.retain(|s| {
                let expired = s.status.is_terminal()
                    && s.completed_at.map(|at| at < threshold).unwrap_or(false);
                if expired {
                    purged.push(s.instance.clone());
                }
                !expired
            });
        }
        inner.instances.retain(|_, executions| !executions.is_empty());

        if !purged.is_empty() {
            let gone: HashSet<&OrchestrationInstance> = purged.iter().collect();
            inner.history.retain(|instance, _| !gone.contains(instance));
            inner.scheduled.retain(|key| !gone.contains(&key.instance));
            inner.timers.retain(|(_, key)| !gone.contains(&key.instance));
            inner.parents.retain(|child, _| !gone.contains(child));
        }

        Ok(purged.len())
    }

    async fn fetch_orchestration_item(
        &self,
    ) -> Result<Option<(OrchestrationWorkItem, LockToken)>, ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let Some(item) = inner.orchestration_queue.pop_front() else {
            return Ok(None);
        };
        inner.queued.remove(&item.instance);
        let token = inner.next_token();
        inner.locked_orchestrations.insert(token, item.clone());
        Ok(Some((item, token)))
    }

    async fn set_status(
        &self,
        instance: &OrchestrationInstance,
        status: OrchestrationStatus,
    ) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let state = inner
            .execution_mut(instance)
            .ok_or_else(|| ProviderError::ExecutionNotFound(instance.to_string()))?;
        if !state.status.is_terminal() {
            state.status = status;
            state.last_updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_orchestration(
        &self,
        instance: &OrchestrationInstance,
        status: OrchestrationStatus,
        output: Option<String>,
    ) -> Result<(), ProviderError> {
        self.check_available()?;
        if !status.is_terminal() {
            return Err(ProviderError::Internal(format!(
                "cannot complete {} with non-terminal status {}",
                instance, status
            )));
        }
        let mut inner = self.inner.lock().await;
        let state = inner
            .execution_mut(instance)
            .ok_or_else(|| ProviderError::ExecutionNotFound(instance.to_string()))?;
        let now = Utc::now();
        state.status = status;
        state.output = output.clone();
        state.last_updated_at = now;
        state.completed_at = Some(now);

        if let Some(parent) = inner.parents.get(instance).cloned() {
            let outcome = match status {
                OrchestrationStatus::Completed => Ok(output.unwrap_or_default()),
                _ => Err(output.unwrap_or_else(|| format!("sub-orchestration {} {}", instance, status))),
            };
            inner.record(&parent, outcome);
        }
        Ok(())
    }

    async fn read_history(&self, instance: &OrchestrationInstance) -> Result<History, ProviderError> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        Ok(inner.history.get(instance).cloned().unwrap_or_default())
    }

    async fn enqueue_activity(&self, item: ActivityWorkItem) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        if inner.scheduled.insert(item.key.clone()) {
            inner.activity_queue.push_back(item);
        }
        Ok(())
    }

    async fn fetch_activity_item(&self) -> Result<Option<(ActivityWorkItem, LockToken)>, ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let Some(item) = inner.activity_queue.pop_front() else {
            return Ok(None);
        };
        let token = inner.next_token();
        inner.locked_activities.insert(token, item.clone());
        Ok(Some((item, token)))
    }

    async fn complete_activity(&self, key: &TaskKey, result: TaskResult) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        inner.record(key, result);
        Ok(())
    }

    async fn schedule_timer(&self, key: &TaskKey, fire_at: DateTime<Utc>) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        if inner.scheduled.insert(key.clone()) {
            inner.timers.push((fire_at, key.clone()));
        }
        Ok(())
    }

    async fn fire_due_timers(&self, now: DateTime<Utc>) -> Result<usize, ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.timers)
            .into_iter()
            .partition(|(fire_at, _)| *fire_at <= now);
        inner.timers = waiting;
        for (_, key) in &due {
            inner.record(key, Ok(String::new()));
        }
        Ok(due.len())
    }

    async fn create_sub_orchestration(
        &self,
        parent: &TaskKey,
        child: &OrchestrationInstance,
        name: &str,
        input: &str,
    ) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        if !inner.scheduled.insert(parent.clone()) {
            return Ok(());
        }
        if inner.instances.contains_key(&child.instance_id) {
            inner.scheduled.remove(parent);
            return Err(ProviderError::InstanceAlreadyExists(child.instance_id.clone()));
        }
        inner.parents.insert(child.clone(), parent.clone());
        inner.insert_execution(child, name, input);
        Ok(())
    }

    async fn ack(&self, kind: QueueKind, token: LockToken) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        match kind {
            QueueKind::Orchestration => {
                let item = inner
                    .locked_orchestrations
                    .remove(&token)
                    .ok_or(ProviderError::LockLost(token))?;
                if inner.rewake.remove(&item.instance) {
                    inner.wake(&item.instance);
                }
            }
            QueueKind::Activity => {
                inner
                    .locked_activities
                    .remove(&token)
                    .ok_or(ProviderError::LockLost(token))?;
            }
        }
        Ok(())
    }

    async fn abandon(&self, kind: QueueKind, token: LockToken) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        match kind {
            QueueKind::Orchestration => {
                let item = inner
                    .locked_orchestrations
                    .remove(&token)
                    .ok_or(ProviderError::LockLost(token))?;
                inner.rewake.remove(&item.instance);
                if let Some(state) = inner.execution_mut(&item.instance) {
                    if !state.status.is_terminal() {
                        state.status = OrchestrationStatus::Pending;
                        state.last_updated_at = Utc::now();
                    }
                }
                if inner.queued.insert(item.instance.clone()) {
                    inner.orchestration_queue.push_front(item);
                }
            }
            QueueKind::Activity => {
                let item = inner
                    .locked_activities
                    .remove(&token)
                    .ok_or(ProviderError::LockLost(token))?;
                inner.activity_queue.push_front(item);
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<ProviderStats, ProviderError> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        Ok(ProviderStats {
            instances: inner.instances.len(),
            executions: inner.instances.values().map(Vec::len).sum(),
            pending_orchestrations: inner.orchestration_queue.len(),
            pending_activities: inner.activity_queue.len(),
            pending_timers: inner.timers.len(),
            locked_orchestrations: inner.locked_orchestrations.len(),
            locked_activities: inner.locked_activities.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str) -> OrchestrationInstance {
        OrchestrationInstance::new_execution(id)
    }

    #[tokio::test]
    async fn test_create_then_read_latest() {
        let provider = InMemoryProvider::new();
        let first = instance("id-1");
        provider.create_instance(&first, "Orch", "null").await.unwrap();

        let state = provider.read_latest_state("id-1").await.unwrap().unwrap();
        assert_eq!(state.instance, first);
        assert_eq!(state.status, OrchestrationStatus::Pending);
        assert!(provider.read_latest_state("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_active_instance_is_rejected() {
        let provider = InMemoryProvider::new();
        provider.create_instance(&instance("id-1"), "Orch", "null").await.unwrap();

        let err = provider
            .create_instance(&instance("id-1"), "Orch", "null")
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::InstanceAlreadyExists("id-1".to_string()));
    }

    #[tokio::test]
    async fn test_rerun_after_completion_appends_execution() {
        let provider = InMemoryProvider::new();
        let first = instance("id-1");
        provider.create_instance(&first, "Orch", "null").await.unwrap();
        provider
            .complete_orchestration(&first, OrchestrationStatus::Completed, Some("1".into()))
            .await
            .unwrap();

        let second = instance("id-1");
        provider.create_instance(&second, "Orch", "null").await.unwrap();

        let latest = provider.read_latest_state("id-1").await.unwrap().unwrap();
        assert_eq!(latest.instance, second);
        let old = provider.read_state(&first).await.unwrap().unwrap();
        assert_eq!(old.status, OrchestrationStatus::Completed);
        assert_eq!(provider.stats().await.unwrap().executions, 2);
    }

    #[tokio::test]
    async fn test_writes_rejected_without_write_status() {
        let provider = InMemoryProvider::new();
        provider.set_writable(false);

        let err = provider
            .create_instance(&instance("id-1"), "Orch", "null")
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NotWritable);
        assert_eq!(
            provider.purge_completed_before(Utc::now()).await.unwrap_err(),
            ProviderError::NotWritable
        );
        // reads still work off-primary
        assert!(provider.read_latest_state("id-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_keeps_running_and_recent_executions() {
        let provider = InMemoryProvider::new();
        let done = instance("done");
        let running = instance("running");
        provider.create_instance(&done, "Orch", "null").await.unwrap();
        provider.create_instance(&running, "Orch", "null").await.unwrap();
        provider
            .complete_orchestration(&done, OrchestrationStatus::Completed, None)
            .await
            .unwrap();
        provider.set_status(&running, OrchestrationStatus::Running).await.unwrap();

        let before_completion = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(provider.purge_completed_before(before_completion).await.unwrap(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        assert_eq!(provider.purge_completed_before(Utc::now()).await.unwrap(), 1);
        assert!(provider.read_state(&done).await.unwrap().is_none());
        assert_eq!(
            provider.read_state(&running).await.unwrap().unwrap().status,
            OrchestrationStatus::Running
        );
    }

    #[tokio::test]
    async fn test_abandon_makes_item_visible_again() {
        let provider = InMemoryProvider::new();
        let inst = instance("id-1");
        provider.create_instance(&inst, "Orch", "null").await.unwrap();

        let (item, token) = provider.fetch_orchestration_item().await.unwrap().unwrap();
        assert!(provider.fetch_orchestration_item().await.unwrap().is_none());
        provider.set_status(&inst, OrchestrationStatus::Running).await.unwrap();

        provider.abandon(QueueKind::Orchestration, token).await.unwrap();
        assert_eq!(
            provider.read_state(&inst).await.unwrap().unwrap().status,
            OrchestrationStatus::Pending
        );
        let (again, token) = provider.fetch_orchestration_item().await.unwrap().unwrap();
        assert_eq!(again, item);
        provider.ack(QueueKind::Orchestration, token).await.unwrap();
        assert_eq!(
            provider.ack(QueueKind::Orchestration, token).await.unwrap_err(),
            ProviderError::LockLost(token)
        );
    }

    #[tokio::test]
    async fn test_activity_enqueue_is_deduplicated() {
        let provider = InMemoryProvider::new();
        let inst = instance("id-1");
        provider.create_instance(&inst, "Orch", "null").await.unwrap();
        let key = TaskKey {
            instance: inst.clone(),
            sequence: 0,
        };
        let item = ActivityWorkItem {
            key: key.clone(),
            name: "Act".into(),
            input: "null".into(),
        };
        provider.enqueue_activity(item.clone()).await.unwrap();
        provider.enqueue_activity(item).await.unwrap();
        assert_eq!(provider.stats().await.unwrap().pending_activities, 1);

        provider.complete_activity(&key, Ok("a".into())).await.unwrap();
        provider.complete_activity(&key, Ok("b".into())).await.unwrap();
        let history = provider.read_history(&inst).await.unwrap();
        assert_eq!(history.get(&0), Some(&Ok("a".to_string())));
    }

    #[tokio::test]
    async fn test_outcomes_queue_one_turn_per_execution() {
        let provider = InMemoryProvider::new();
        let inst = instance("id-1");
        provider.create_instance(&inst, "Orch", "null").await.unwrap();
        let key = |sequence| TaskKey {
            instance: inst.clone(),
            sequence,
        };

        // first turn still queued, so outcomes do not add more
        provider.complete_activity(&key(0), Ok("a".into())).await.unwrap();
        assert_eq!(provider.stats().await.unwrap().pending_orchestrations, 1);

        // an outcome during a running turn queues a follow-up on ack
        let (_, token) = provider.fetch_orchestration_item().await.unwrap().unwrap();
        provider.complete_activity(&key(1), Ok("b".into())).await.unwrap();
        assert_eq!(provider.stats().await.unwrap().pending_orchestrations, 0);
        provider.ack(QueueKind::Orchestration, token).await.unwrap();
        assert_eq!(provider.stats().await.unwrap().pending_orchestrations, 1);

        // terminal executions are never woken
        let (_, token) = provider.fetch_orchestration_item().await.unwrap().unwrap();
        provider
            .complete_orchestration(&inst, OrchestrationStatus::Completed, None)
            .await
            .unwrap();
        provider.ack(QueueKind::Orchestration, token).await.unwrap();
        provider.complete_activity(&key(2), Ok("c".into())).await.unwrap();
        assert_eq!(provider.stats().await.unwrap().pending_orchestrations, 0);
    }

    #[tokio::test]
    async fn test_due_timers_fire_into_history() {
        let provider = InMemoryProvider::new();
        let inst = instance("id-1");
        provider.create_instance(&inst, "Orch", "null").await.unwrap();
        let (_, token) = provider.fetch_orchestration_item().await.unwrap().unwrap();
        provider.ack(QueueKind::Orchestration, token).await.unwrap();

        let now = Utc::now();
        let soon = TaskKey {
            instance: inst.clone(),
            sequence: 0,
        };
        let later = TaskKey {
            instance: inst.clone(),
            sequence: 1,
        };
        provider.schedule_timer(&soon, now).await.unwrap();
        provider.schedule_timer(&soon, now).await.unwrap();
        provider
            .schedule_timer(&later, now + chrono::Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(provider.stats().await.unwrap().pending_timers, 2);

        assert_eq!(provider.fire_due_timers(now).await.unwrap(), 1);
        let history = provider.read_history(&inst).await.unwrap();
        assert_eq!(history.get(&0), Some(&Ok(String::new())));
        assert!(!history.contains_key(&1));

        let stats = provider.stats().await.unwrap();
        assert_eq!(stats.pending_timers, 1);
        assert_eq!(stats.pending_orchestrations, 1);
    }

    #[tokio::test]
    async fn test_child_outcome_survives_child_purge() {
        let provider = InMemoryProvider::new();
        let parent = instance("parent");
        provider.create_instance(&parent, "Parent", "null").await.unwrap();
        let call = TaskKey {
            instance: parent.clone(),
            sequence: 0,
        };
        let child = instance("parent:child");
        provider
            .create_sub_orchestration(&call, &child, "Child", "1")
            .await
            .unwrap();
        // the parent call already owns its child
        provider
            .create_sub_orchestration(&call, &instance("parent:child"), "Child", "1")
            .await
            .unwrap();
        assert_eq!(provider.stats().await.unwrap().executions, 2);

        provider
            .complete_orchestration(&child, OrchestrationStatus::Completed, Some("42".into()))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        assert_eq!(provider.purge_completed_before(Utc::now()).await.unwrap(), 1);
        assert!(provider.read_state(&child).await.unwrap().is_none());

        let history = provider.read_history(&parent).await.unwrap();
        assert_eq!(history.get(&0), Some(&Ok("42".to_string())));
    }

    #[tokio::test]
    async fn test_failed_child_reports_error_to_parent() {
        let provider = InMemoryProvider::new();
        let parent = instance("parent");
        provider.create_instance(&parent, "Parent", "null").await.unwrap();
        let call = TaskKey {
            instance: parent.clone(),
            sequence: 3,
        };
        let child = instance("parent:child");
        provider
            .create_sub_orchestration(&call, &child, "Child", "null")
            .await
            .unwrap();
        provider
            .complete_orchestration(&child, OrchestrationStatus::Failed, Some("broken".into()))
            .await
            .unwrap();

        let history = provider.read_history(&parent).await.unwrap();
        assert_eq!(history.get(&3), Some(&Err("broken".to_string())));
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let provider = InMemoryProvider::new();
        provider.set_available(false);
        assert!(matches!(provider.ping().await, Err(ProviderError::Unavailable(_))));
        assert!(matches!(
            provider.read_latest_state("id").await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
