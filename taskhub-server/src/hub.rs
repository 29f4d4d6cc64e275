use anyhow::{Context, Result};
use std::sync::Arc;
use taskhub_core::{Client, InMemoryProvider, OrchestrationProvider, Worker, WorkerOptions};
use taskhub_orchestrations::registry::create_type_registry;

/// Everything the host shares between the controller and the API
#[derive(Clone)]
pub struct Hub {
    pub provider: Arc<dyn OrchestrationProvider>,
    pub worker: Arc<Worker>,
    pub client: Client,
}

/// Initialize provider, registry, worker and client
pub async fn initialize(options: WorkerOptions) -> Result<Hub> {
    tracing::info!("Initializing in-memory orchestration provider");
    let provider: Arc<dyn OrchestrationProvider> = Arc::new(InMemoryProvider::new());
    provider
        .ping()
        .await
        .context("Orchestration provider is not reachable")?;

    // Writes are granted by the replica controller once this replica is primary
    provider.set_writable(false);

    let registry = create_type_registry().context("Failed to build orchestration type registry")?;
    tracing::info!(
        orchestrations = ?registry.orchestration_names(),
        activities = ?registry.activity_names(),
        "✓ Type registry built"
    );

    let worker = Arc::new(Worker::new(provider.clone(), registry.clone(), options));
    let client = Client::new(provider.clone(), registry);

    Ok(Hub {
        provider,
        worker,
        client,
    })
}
