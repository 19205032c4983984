use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, instrument};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    api::{DeploymentInfo, DeploymentRequest, DeploymentResponse},
    config::DeploymentConfig,
    deployment::{Deployment, DeploymentError},
};

/// The URL path to POST JSON generation requests to.
pub const GENERATE_PATH: &str = "/";
/// The URL path the orchestrator health checks.
pub const HEALTH_PATH: &str = "/-/healthz";
/// The URL path describing the deployment.
pub const DEPLOYMENT_INFO_PATH: &str = "/-/deployment";
/// The URL path Prometheus scrapes.
pub const METRICS_PATH: &str = "/metrics";

/// Represents the shared state of the application.
#[derive(Clone)]
pub struct AppState {
    /// The request adapter, owning the shared engine handle.
    pub deployment: Deployment,
    /// Handle used to render the process metrics.
    pub metrics_handle: PrometheusHandle,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_handler,
        health_handler,
        deployment_info_handler
    ),
    components(schemas(DeploymentRequest, DeploymentResponse, DeploymentInfo)),
    tags(
        (name = "Deployment", description = "LLM deployment API")
    )
)]
pub struct ApiDoc;

/// Builds the deployment from `config` and serves it on `listener` until Ctrl+C.
pub async fn app_start(
    listener: TcpListener,
    config: DeploymentConfig,
    metrics_handle: PrometheusHandle,
) -> anyhow::Result<()> {
    let deployment = Deployment::new(config.engine, config.deployment)
        .map_err(|e| anyhow::anyhow!("Failed to start `Deployment`, with error: {e}"))?;
    run_server(
        listener,
        AppState {
            deployment,
            metrics_handle,
        },
    )
    .await
}

/// Builds the HTTP router
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route(GENERATE_PATH, post(generate_handler))
        .route(HEALTH_PATH, get(health_handler))
        .route(DEPLOYMENT_INFO_PATH, get(deployment_info_handler))
        .route(METRICS_PATH, get(metrics_handler))
        .with_state(app_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Runs the Axum server and manages its lifecycle, including graceful shutdown.
///
/// # Arguments
///
/// * `listener` - A `TcpListener` that the server will bind to.
/// * `app_state` - The `AppState` containing shared application data.
///
/// # Returns
///
/// Returns `Ok(())` once the server has shut down after Ctrl+C, or an error
/// if the server fails while running.
pub async fn run_server(listener: TcpListener, app_state: AppState) -> anyhow::Result<()> {
    let http_router = router(app_state);

    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {e}");
        }
        info!("Shutting down server...");
    };

    let server = axum::serve(listener, http_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal);

    info!("Deployment server running, press Ctrl+C to shut it down");
    server.await?;
    info!("Server shutdown complete");

    Ok(())
}

/// Handles generation requests by forwarding them to the `Deployment`.
///
/// # Returns
///
/// - `Ok(Json<DeploymentResponse>)`: the final generated text and its request id.
/// - `Err((StatusCode, Json<Value>))`: a 500 Internal Server Error when the engine
///   fails, carrying the engine's error message.
#[utoipa::path(
    post,
    path = GENERATE_PATH,
    request_body = DeploymentRequest,
    responses(
        (status = 200, description = "Final generated text", body = DeploymentResponse),
        (status = 500, description = "Internal server error", body = serde_json::Value)
    ),
    tag = "Deployment"
)]
#[instrument(skip_all)]
pub async fn generate_handler(
    State(app_state): State<AppState>,
    Json(request): Json<DeploymentRequest>,
) -> Result<Json<DeploymentResponse>, (StatusCode, Json<Value>)> {
    match app_state.deployment.handle(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!("Failed to handle request: {e}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, error_body(&e)))
        }
    }
}

/// Reports whether the engine can serve requests, within the health check timeout.
#[utoipa::path(
    get,
    path = HEALTH_PATH,
    responses(
        (status = 200, description = "Engine is healthy", body = serde_json::Value),
        (status = 503, description = "Engine is unhealthy", body = serde_json::Value)
    ),
    tag = "Deployment"
)]
#[instrument(skip_all)]
pub async fn health_handler(
    State(app_state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match app_state.deployment.check_health().await {
        Ok(()) => Ok(Json(json!({"status": "success"}))),
        Err(e) => {
            error!("Health check failed: {e}");
            Err((StatusCode::SERVICE_UNAVAILABLE, error_body(&e)))
        }
    }
}

#[utoipa::path(
    get,
    path = DEPLOYMENT_INFO_PATH,
    responses(
        (status = 200, description = "Deployment description", body = DeploymentInfo)
    ),
    tag = "Deployment"
)]
pub async fn deployment_info_handler(State(app_state): State<AppState>) -> Json<DeploymentInfo> {
    Json(DeploymentInfo::from(&app_state.deployment))
}

pub async fn metrics_handler(State(app_state): State<AppState>) -> String {
    app_state.metrics_handle.render()
}

fn error_body(error: &DeploymentError) -> Json<Value> {
    Json(json!({
        "error": {
            "message": error.to_string(),
            "type": "internal_error",
        }
    }))
}
