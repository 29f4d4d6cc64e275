use anyhow::{Context, Result};
use std::sync::Arc;
use taskhub_models::ReplicaRole;
use tokio::sync::watch;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::remote::TestService;
use crate::replica::LifecycleController;

pub async fn run_standalone_mode(config: Config, port: Option<u16>, role: Option<ReplicaRole>) -> Result<()> {
    let port = port.unwrap_or(config.server_port);
    let role = role.unwrap_or(config.initial_role);

    tracing::info!("Starting Taskhub in standalone mode (API + replica controller + worker)");
    tracing::info!("API port: {}", port);

    let hub = crate::hub::initialize(config.worker_options()).await?;

    // Cancellation signal shared by the controller, client waits and the API server
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let (controller, replica) = LifecycleController::new(hub.worker.clone(), hub.provider.clone());
    let mut controller_handle = tokio::spawn(controller.run(cancel_rx.clone()));

    let client = hub.client.clone().with_cancellation(cancel_rx.clone());
    let state = AppState {
        service: Arc::new(TestService::new(client)),
        replica: replica.clone(),
        worker: hub.worker.clone(),
        provider: hub.provider.clone(),
    };

    let addr = format!("{}:{}", config.server_host, port);
    tracing::info!("Starting API server on {}", addr);

    let mut api_shutdown = cancel_rx.clone();
    let api_handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = api_shutdown.wait_for(|cancelled| *cancelled).await;
        };
        if let Err(e) = api::start_server(&addr, state, shutdown).await {
            tracing::error!("API server error: {}", e);
        }
    });

    // No hosting runtime here: deliver the configured role ourselves
    replica
        .change_role(role)
        .await
        .context("Replica controller exited before the initial role was delivered")?;
    if role == ReplicaRole::Primary {
        replica
            .primary_writable()
            .await
            .context("Replica controller exited before the worker could start")?;
    }

    tracing::info!("✓ Taskhub server ready");
    tracing::info!("  API: http://{}:{}", config.server_host, port);
    tracing::info!("  Role: {}", role);
    tracing::info!("  Press Ctrl+C to stop");

    let finished_early = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
        result = &mut controller_handle => Some(result),
    };
    let _ = cancel_tx.send(true);
    let controller_result = match finished_early {
        Some(result) => result,
        None => {
            tracing::info!("Shutting down...");
            controller_handle.await
        }
    };

    if let Err(e) = api_handle.await {
        tracing::warn!("API server task ended abnormally: {}", e);
    }

    controller_result
        .context("Replica controller task panicked")?
        .context("Replica controller failed")?;

    tracing::info!("✓ Taskhub server stopped");
    Ok(())
}
