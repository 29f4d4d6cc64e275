//! Client facade over the backing provider
//!
//! Validation happens here (unknown types never reach the provider); state
//! is never cached, every query is a fresh provider read.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use taskhub_models::{new_id, OrchestrationInstance, OrchestrationState};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::HubError;
use crate::provider::OrchestrationProvider;
use crate::registry::TypeRegistry;

const WAIT_POLL_INITIAL: Duration = Duration::from_millis(5);
const WAIT_POLL_MAX: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct Client {
    provider: Arc<dyn OrchestrationProvider>,
    registry: TypeRegistry,
    cancel: Option<watch::Receiver<bool>>,
}

impl Client {
    pub fn new(provider: Arc<dyn OrchestrationProvider>, registry: TypeRegistry) -> Self {
        Self {
            provider,
            registry,
            cancel: None,
        }
    }

    /// Make long waits observe the host's shutdown signal
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Create an instance with a generated instance id
    pub async fn create_instance<T>(&self, type_name: &str, input: &T) -> Result<OrchestrationInstance, HubError>
    where
        T: Serialize + ?Sized,
    {
        self.create_instance_with_id(type_name, &new_id(), input).await
    }

    /// Create an instance with a caller-supplied instance id
    pub async fn create_instance_with_id<T>(
        &self,
        type_name: &str,
        instance_id: &str,
        input: &T,
    ) -> Result<OrchestrationInstance, HubError>
    where
        T: Serialize + ?Sized,
    {
        self.registry.resolve(type_name)?;
        if instance_id.trim().is_empty() {
            return Err(HubError::InvalidInput("instance id must not be empty".to_string()));
        }
        let input = serde_json::to_string(input)
            .map_err(|e| HubError::InvalidInput(format!("failed to serialize input: {}", e)))?;

        let instance = OrchestrationInstance::new_execution(instance_id);
        self.provider.create_instance(&instance, type_name, &input).await?;

        info!(%instance, orchestration = type_name, "Created orchestration instance");
        Ok(instance)
    }

    /// Fresh read of one execution; `None` when it does not exist
    pub async fn get_state(&self, instance: &OrchestrationInstance) -> Result<Option<OrchestrationState>, HubError> {
        Ok(self.provider.read_state(instance).await?)
    }

    /// Latest execution of `instance_id`; `None` when there is none
    pub async fn get_state_by_instance_id(&self, instance_id: &str) -> Result<Option<OrchestrationState>, HubError> {
        Ok(self.provider.read_latest_state(instance_id).await?)
    }

    /// Wait until the execution reaches a terminal status.
    ///
    /// Returns [`HubError::Timeout`] once `timeout` elapses and
    /// [`HubError::Cancelled`] when the host shuts down first.
    pub async fn wait_for_completion(
        &self,
        instance: &OrchestrationInstance,
        timeout: Duration,
    ) -> Result<OrchestrationState, HubError> {
        let poll = async {
            let mut delay = WAIT_POLL_INITIAL;
            loop {
                if let Some(state) = self.provider.read_state(instance).await? {
                    if state.status.is_terminal() {
                        return Ok::<_, HubError>(state);
                    }
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(WAIT_POLL_MAX);
            }
        };
        let bounded = async {
            match tokio::time::timeout(timeout, poll).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(%instance, ?timeout, "Wait for orchestration timed out");
                    Err(HubError::Timeout {
                        instance: instance.clone(),
                        timeout,
                    })
                }
            }
        };

        match &self.cancel {
            Some(cancel) => {
                let mut cancel = cancel.clone();
                tokio::select! {
                    result = bounded => result,
                    _ = cancelled(&mut cancel) => Err(HubError::Cancelled),
                }
            }
            None => bounded.await,
        }
    }

    /// Remove history of executions completed strictly before now
    pub async fn purge_completed_history(&self) -> Result<usize, HubError> {
        self.purge_completed_before(Utc::now()).await
    }

    pub async fn purge_completed_before(&self, threshold: DateTime<Utc>) -> Result<usize, HubError> {
        let purged = self.provider.purge_completed_before(threshold).await?;
        info!(purged, %threshold, "Purged completed orchestration history");
        Ok(purged)
    }

    /// Create then wait. Not transactional: if the wait fails the instance
    /// still exists and can be waited on again by id.
    pub async fn run_and_wait<T>(
        &self,
        type_name: &str,
        input: &T,
        timeout: Duration,
    ) -> Result<OrchestrationState, HubError>
    where
        T: Serialize + ?Sized,
    {
        let instance = self.create_instance(type_name, input).await?;
        debug!(%instance, "Waiting for orchestration to complete");
        self.wait_for_completion(&instance, timeout).await
    }
}

/// Resolves once the shutdown flag is raised; never resolves if the sender
/// is dropped unraised
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
