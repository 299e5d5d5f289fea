use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use sitedrop_core::{
    CredentialHeaders, CredentialSource, DeployBody, DeploySuccess, PipelineError,
    resolve::TOKEN_HEADER,
};
use sitedrop_deployer::Pipeline;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::load_config;

/// Command-line overrides for `sitedrop serve`
#[derive(Debug, Default)]
pub struct ServeOptions {
    pub config: Option<PathBuf>,
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    pub credential_source: Option<CredentialSource>,
    pub site_id: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// JSON error response for a failed deployment
struct ApiError(PipelineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_body())).into_response()
    }
}

/// Start the deploy service.
pub async fn run(options: ServeOptions) -> Result<()> {
    let mut config = load_config(options.config.as_deref())?;
    if let Some(port) = options.port {
        config.port = port;
    }
    if let Some(bind) = options.bind {
        config.bind = bind;
    }
    if let Some(source) = options.credential_source {
        config.credential_source = source;
    }
    if let Some(site_id) = options.site_id {
        config.site_id = Some(site_id);
    }
    config.validate().context("Invalid configuration")?;

    let addr = SocketAddr::new(config.bind, config.port);
    info!(
        credential_source = %config.credential_source,
        site_id = config.site_id.as_deref().unwrap_or("<new site per deploy>"),
        api_base = %config.api_base,
        staging_dir = %config.staging_dir.display(),
        "Configuration loaded"
    );

    let pipeline = Pipeline::from_config(config).context("Failed to build HTTP client")?;
    let app = router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n✅ Server running on http://{}", addr);
    println!("   POST /deploy with JSON like: {{ \"url\": \"https://example.com\" }}\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/deploy", post(deploy_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn credential_headers(headers: &HeaderMap) -> CredentialHeaders {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    CredentialHeaders {
        token: header(TOKEN_HEADER),
        authorization: header("authorization"),
    }
}

/// POST /deploy
async fn deploy_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DeployBody>, JsonRejection>,
) -> Result<Json<DeploySuccess>, ApiError> {
    let credentials = credential_headers(&headers);

    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            // A missing credential is reported ahead of a bad body
            let err = match state.pipeline.resolver().credential(&credentials) {
                Err(missing) => missing,
                Ok(_) => PipelineError::InvalidRequest(format!(
                    "Invalid JSON body: {}",
                    rejection.body_text()
                )),
            };
            warn!(error = %err, "Rejected deploy request");
            return Err(ApiError(err));
        }
    };

    let result = state
        .pipeline
        .run(&credentials, &body)
        .await
        .map_err(ApiError)?;

    Ok(Json(DeploySuccess::from(&result)))
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
