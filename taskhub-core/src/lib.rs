//! Orchestration hub core: type registry, dispatcher worker, client facade
//! and the provider seam they share.

pub mod client;
pub mod context;
pub mod error;
pub mod provider;
pub mod registry;
pub mod worker;

pub use client::{cancelled, Client};
pub use context::{ActivityContext, OrchestrationContext};
pub use error::{ErrorKind, HubError, ProviderError, WorkerError};
pub use provider::{
    ActivityWorkItem, History, InMemoryProvider, LockToken, OrchestrationProvider, OrchestrationWorkItem,
    ProviderStats, QueueKind, TaskKey, TaskResult,
};
pub use registry::{ActivityHandler, OrchestrationHandler, RegistryError, TypeRegistry, TypeRegistryBuilder};
pub use worker::{Worker, WorkerOptions, WorkerState};
