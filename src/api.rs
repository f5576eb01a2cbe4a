use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::connection::{ConnectionProvider, ConnectionState};
use crate::error::{ApiError, ApiResult, DataSourceError};
use crate::models::FlowGraph;
use crate::pipeline::{self, FlowParams, FlowRequest};

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<ConnectionProvider>,
    pub query_timeout: Duration,
}

fn cors_layer(webhost: Option<&str>) -> CorsLayer {
    let origin = match webhost.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            warn!("Ignoring invalid WEBHOST origin: {}", e);
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn router(cfg: &Config, state: AppState) -> Router {
    Router::new()
        .route("/data", get(get_flow))
        .route("/health", get(get_health))
        .fallback_service(ServeDir::new(&cfg.static_dir))
        .layer(cors_layer(cfg.webhost.as_deref()))
        .with_state(state)
}

pub async fn serve(cfg: Config, provider: Arc<ConnectionProvider>) -> eyre::Result<()> {
    let state = AppState {
        provider,
        query_timeout: cfg.query_timeout,
    };
    let app = router(&cfg, state);

    let addr = SocketAddr::new(cfg.bind_addr, cfg.port);
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn get_flow(
    State(state): State<AppState>,
    Query(params): Query<FlowParams>,
) -> ApiResult<Json<FlowGraph>> {
    let request = FlowRequest::parse(&params).map_err(|e| {
        warn!("Rejected flow request: {}", e);
        e
    })?;

    // dropping the pipeline future on timeout also stops the store worker
    let provider = Arc::clone(&state.provider);
    let graph = tokio::time::timeout(state.query_timeout, async move {
        let extractor = provider.extractor().await?;
        let graph = pipeline::run(extractor.as_ref(), &request).await?;
        Ok::<_, ApiError>(graph)
    })
    .await
    .map_err(|_| DataSourceError::Timeout(state.query_timeout.as_secs()))??;

    Ok(Json(graph))
}

async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    // actively check the store; the reported state reflects this attempt
    match tokio::time::timeout(state.query_timeout, state.provider.extractor()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Health check failed: {}", e),
        Err(_) => warn!(
            "Health check timed out after {}s",
            state.query_timeout.as_secs()
        ),
    }

    let status = state.provider.status();
    let code = match status.state {
        ConnectionState::Connected => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    let reason = match &status.state {
        ConnectionState::Failed(reason) => Some(reason.clone()),
        _ => None,
    };

    (
        code,
        Json(json!({
            "state": status.state.label(),
            "since": status.since,
            "reason": reason,
        })),
    )
}
