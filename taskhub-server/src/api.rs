use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use taskhub_core::{HubError, OrchestrationProvider, Worker};
use taskhub_models::{DriverOrchestrationData, OrchestrationInstance, OrchestrationState, ReplicaRole, TestOrchestrationData};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::remote::RemoteClient;
use crate::replica::{ReplicaError, ReplicaHandle};

const DEFAULT_WAIT_TIMEOUT_MS: u64 = 60_000;

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn RemoteClient>,
    pub replica: ReplicaHandle,
    pub worker: Arc<Worker>,
    pub provider: Arc<dyn OrchestrationProvider>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/orchestrations/run", post(run_orchestration))
        .route("/api/orchestrations/run-driver", post(run_driver_orchestration))
        .route("/api/test-orchestrations", post(start_test_orchestration))
        .route("/api/test-orchestrations/:instance_id", put(start_test_orchestration_with_id))
        .route("/api/orchestrations/:instance_id", get(get_latest_state))
        .route(
            "/api/orchestrations/:instance_id/executions/:execution_id",
            get(get_execution_state),
        )
        .route(
            "/api/orchestrations/:instance_id/executions/:execution_id/wait",
            post(wait_for_orchestration),
        )
        .route("/api/history/purge", post(purge_history))
        .route("/api/replica/role", post(change_role))
        .route("/api/replica/primary-writable", post(primary_writable))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server; returns once `shutdown` resolves
pub async fn start_server(
    addr: &str,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("✓ API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

// ============================================================================
// Health Check
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let queues = state.provider.stats().await.ok();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "taskhub",
        "version": env!("CARGO_PKG_VERSION"),
        "replica": state.replica.snapshot(),
        "worker": state.worker.state(),
        "writable": state.provider.is_writable(),
        "queues": queues,
    }))
}

// ============================================================================
// Orchestrations
// ============================================================================

fn wait_timeout(ms: Option<u64>) -> Duration {
    Duration::from_millis(ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS))
}

#[derive(Debug, Deserialize)]
struct RunOrchestrationRequest {
    orchestration_type: String,
    #[serde(default)]
    input: serde_json::Value,
    wait_timeout_ms: Option<u64>,
}

async fn run_orchestration(
    State(state): State<AppState>,
    Json(request): Json<RunOrchestrationRequest>,
) -> Result<Json<OrchestrationState>, AppError> {
    let result = state
        .service
        .run_orchestration(
            &request.orchestration_type,
            request.input,
            wait_timeout(request.wait_timeout_ms),
        )
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct RunDriverRequest {
    input: DriverOrchestrationData,
    wait_timeout_ms: Option<u64>,
}

async fn run_driver_orchestration(
    State(state): State<AppState>,
    Json(request): Json<RunDriverRequest>,
) -> Result<Json<OrchestrationState>, AppError> {
    let result = state
        .service
        .run_driver_orchestration(request.input, wait_timeout(request.wait_timeout_ms))
        .await?;
    Ok(Json(result))
}

async fn start_test_orchestration(
    State(state): State<AppState>,
    Json(input): Json<TestOrchestrationData>,
) -> Result<(StatusCode, Json<OrchestrationInstance>), AppError> {
    let instance = state.service.start_test_orchestration(input).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn start_test_orchestration_with_id(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Json(input): Json<TestOrchestrationData>,
) -> Result<(StatusCode, Json<OrchestrationInstance>), AppError> {
    let instance = state
        .service
        .start_test_orchestration_with_instance_id(&instance_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn get_latest_state(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Result<Json<OrchestrationState>, AppError> {
    state
        .service
        .get_orchestration_state_with_instance_id(&instance_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Orchestration '{}' not found", instance_id)))
}

async fn get_execution_state(
    State(state): State<AppState>,
    Path((instance_id, execution_id)): Path<(String, String)>,
) -> Result<Json<OrchestrationState>, AppError> {
    let instance = OrchestrationInstance {
        instance_id,
        execution_id,
    };
    state
        .service
        .get_orchestration_state(&instance)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Execution '{}' not found", instance)))
}

#[derive(Debug, Default, Deserialize)]
struct WaitRequest {
    wait_timeout_ms: Option<u64>,
}

async fn wait_for_orchestration(
    State(state): State<AppState>,
    Path((instance_id, execution_id)): Path<(String, String)>,
    request: Option<Json<WaitRequest>>,
) -> Result<Json<OrchestrationState>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let instance = OrchestrationInstance {
        instance_id,
        execution_id,
    };
    let result = state
        .service
        .wait_for_orchestration(&instance, wait_timeout(request.wait_timeout_ms))
        .await?;
    Ok(Json(result))
}

async fn purge_history(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let purged = state.service.purge_orchestration_history().await?;
    Ok(Json(serde_json::json!({ "purged": purged })))
}

// ============================================================================
// Replica administration
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChangeRoleRequest {
    role: ReplicaRole,
}

async fn change_role(
    State(state): State<AppState>,
    Json(request): Json<ChangeRoleRequest>,
) -> Result<StatusCode, AppError> {
    state.replica.change_role(request.role).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn primary_writable(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.replica.primary_writable().await?;
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Hub(HubError),
    NotFound(String),
    Unavailable(String),
}

impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        AppError::Hub(err)
    }
}

impl From<ReplicaError> for AppError {
    fn from(err: ReplicaError) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind, message) = match self {
            AppError::Hub(err) => {
                let status = match &err {
                    HubError::UnknownOrchestrationType(_) | HubError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    HubError::InstanceAlreadyExists(_) => StatusCode::CONFLICT,
                    HubError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
                    HubError::NotPrimary | HubError::ProviderUnavailable(_) | HubError::Cancelled => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    HubError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind().as_str(), err.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
        };

        if status.is_server_error() {
            tracing::warn!(%status, kind, "{}", message);
        }

        (status, Json(serde_json::json!({ "error": message, "kind": kind }))).into_response()
    }
}
