//! Error taxonomy shared by the worker, the client and the remote surface

use std::fmt;
use std::time::Duration;
use taskhub_models::OrchestrationInstance;
use thiserror::Error;

/// Errors raised by an [`crate::provider::OrchestrationProvider`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("instance '{0}' already has an active execution")]
    InstanceAlreadyExists(String),

    #[error("write status is not granted on this replica")]
    NotWritable,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("lock token {0} is not held")]
    LockLost(u64),

    #[error("execution {0} not found")]
    ExecutionNotFound(String),

    #[error("{0}")]
    Internal(String),
}

/// Errors surfaced by the client facade and the remote control surface
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Unknown Orchestration Type Name : {0}")]
    UnknownOrchestrationType(String),

    #[error("orchestration instance '{0}' already exists and is still active")]
    InstanceAlreadyExists(String),

    #[error("timed out after {timeout:?} waiting for orchestration {instance}")]
    Timeout {
        instance: OrchestrationInstance,
        timeout: Duration,
    },

    #[error("write rejected: this replica is not primary")]
    NotPrimary,

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("operation cancelled by shutdown")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Coarse classification carried in structured error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownOrchestrationType,
    InstanceAlreadyExists,
    Timeout,
    NotPrimary,
    ProviderUnavailable,
    Cancelled,
    InvalidInput,
    Provider,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownOrchestrationType => "unknown_orchestration_type",
            ErrorKind::InstanceAlreadyExists => "instance_already_exists",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotPrimary => "not_primary",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Provider => "provider",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::UnknownOrchestrationType(_) => ErrorKind::UnknownOrchestrationType,
            HubError::InstanceAlreadyExists(_) => ErrorKind::InstanceAlreadyExists,
            HubError::Timeout { .. } => ErrorKind::Timeout,
            HubError::NotPrimary => ErrorKind::NotPrimary,
            HubError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            HubError::Cancelled => ErrorKind::Cancelled,
            HubError::InvalidInput(_) => ErrorKind::InvalidInput,
            HubError::Provider(_) => ErrorKind::Provider,
        }
    }

    /// Whether a caller may reasonably retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::Timeout { .. } | HubError::NotPrimary | HubError::ProviderUnavailable(_)
        )
    }
}

impl From<ProviderError> for HubError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InstanceAlreadyExists(id) => HubError::InstanceAlreadyExists(id),
            ProviderError::NotWritable => HubError::NotPrimary,
            ProviderError::Unavailable(msg) => HubError::ProviderUnavailable(msg),
            other => HubError::Provider(other.to_string()),
        }
    }
}

/// Errors raised while starting or stopping the [`crate::worker::Worker`]
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid worker options: {0}")]
    InvalidOptions(String),

    #[error("cannot start worker, provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("dispatcher lane failed during stop: {0}")]
    LaneFailed(String),
}
