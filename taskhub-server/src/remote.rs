//! Remote Control Surface
//!
//! The operations external test drivers call on the primary replica.

use async_trait::async_trait;
use std::time::Duration;
use taskhub_core::{Client, HubError};
use taskhub_models::{DriverOrchestrationData, OrchestrationInstance, OrchestrationState, TestOrchestrationData};
use taskhub_orchestrations::names::orchestrations;

#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Start `orchestration_type` and wait for it to finish
    async fn run_orchestration(
        &self,
        orchestration_type: &str,
        input: serde_json::Value,
        wait_timeout: Duration,
    ) -> Result<OrchestrationState, HubError>;

    async fn run_driver_orchestration(
        &self,
        input: DriverOrchestrationData,
        wait_timeout: Duration,
    ) -> Result<OrchestrationState, HubError>;

    async fn start_test_orchestration(&self, input: TestOrchestrationData) -> Result<OrchestrationInstance, HubError>;

    async fn start_test_orchestration_with_instance_id(
        &self,
        instance_id: &str,
        input: TestOrchestrationData,
    ) -> Result<OrchestrationInstance, HubError>;

    async fn get_orchestration_state(
        &self,
        instance: &OrchestrationInstance,
    ) -> Result<Option<OrchestrationState>, HubError>;

    /// Latest execution only; `None` when the id has never run
    async fn get_orchestration_state_with_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Option<OrchestrationState>, HubError>;

    async fn wait_for_orchestration(
        &self,
        instance: &OrchestrationInstance,
        wait_timeout: Duration,
    ) -> Result<OrchestrationState, HubError>;

    /// Purge everything completed strictly before the call
    async fn purge_orchestration_history(&self) -> Result<usize, HubError>;
}

/// [`RemoteClient`] over the hub's client facade
#[derive(Clone)]
pub struct TestService {
    client: Client,
}

impl TestService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteClient for TestService {
    async fn run_orchestration(
        &self,
        orchestration_type: &str,
        input: serde_json::Value,
        wait_timeout: Duration,
    ) -> Result<OrchestrationState, HubError> {
        self.client.run_and_wait(orchestration_type, &input, wait_timeout).await
    }

    async fn run_driver_orchestration(
        &self,
        input: DriverOrchestrationData,
        wait_timeout: Duration,
    ) -> Result<OrchestrationState, HubError> {
        self.client
            .run_and_wait(orchestrations::DRIVER, &input, wait_timeout)
            .await
    }

    async fn start_test_orchestration(&self, input: TestOrchestrationData) -> Result<OrchestrationInstance, HubError> {
        self.client
            .create_instance(orchestrations::TEST_ORCHESTRATION, &input)
            .await
    }

    async fn start_test_orchestration_with_instance_id(
        &self,
        instance_id: &str,
        input: TestOrchestrationData,
    ) -> Result<OrchestrationInstance, HubError> {
        self.client
            .create_instance_with_id(orchestrations::TEST_ORCHESTRATION, instance_id, &input)
            .await
    }

    async fn get_orchestration_state(
        &self,
        instance: &OrchestrationInstance,
    ) -> Result<Option<OrchestrationState>, HubError> {
        self.client.get_state(instance).await
    }

    async fn get_orchestration_state_with_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Option<OrchestrationState>, HubError> {
        self.client.get_state_by_instance_id(instance_id).await
    }

    async fn wait_for_orchestration(
        &self,
        instance: &OrchestrationInstance,
        wait_timeout: Duration,
    ) -> Result<OrchestrationState, HubError> {
        self.client.wait_for_completion(instance, wait_timeout).await
    }

    async fn purge_orchestration_history(&self) -> Result<usize, HubError> {
        self.client.purge_completed_history().await
    }
}
