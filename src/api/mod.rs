//! HTTP API serving service graphs and trace summaries.
//!
//! Endpoints:
//! - `GET /health`
//! - `GET /api/serviceInsights?service=&from=&to=` (times in milliseconds)
//! - `GET /api/traces?service=&operation=&from=&to=`

use crate::core::{Config, Result, ServerConfig, Trace, TracemapError};
use crate::search::{self, SearchQuery};
use crate::source::{now_micros, ServiceInsights, SpanQuery};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// API server state.
#[derive(Clone)]
pub struct ApiState {
    insights: ServiceInsights,
    lookback: Duration,
}

impl ApiState {
    pub fn new(insights: ServiceInsights, lookback: Duration) -> Self {
        Self { insights, lookback }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    source: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            code: status.as_u16(),
        }),
    )
        .into_response()
}

/// Recoverable failures (source or network trouble) are reported as 503 so
/// callers may retry; anything else is a 500.
fn failure_response(context: &str, e: &TracemapError) -> Response {
    let status = if e.is_recoverable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    tracing::error!(category = e.category(), status = status.as_u16(), "{}: {}", context, e);
    error_response(status, format!("{}: {}", context, e))
}

/// Query parameters shared by graph and trace endpoints.
#[derive(Debug, Deserialize)]
struct WindowQuery {
    service: Option<String>,
    operation: Option<String>,
    /// Window start (unix milliseconds)
    from: Option<u64>,
    /// Window end (unix milliseconds)
    to: Option<u64>,
}

impl WindowQuery {
    /// Missing bounds default to the configured lookback ending now.
    fn to_span_query(&self, lookback: Duration) -> std::result::Result<SpanQuery, Response> {
        let service = match self.service.as_deref() {
            Some(service) if !service.is_empty() => service,
            _ => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Query parameter 'service' is required".to_string(),
                ))
            },
        };

        let to = self.to.map_or_else(now_micros, |ms| ms.saturating_mul(1000));
        let from = self.from.map_or_else(
            || to.saturating_sub(u64::try_from(lookback.as_micros()).unwrap_or(u64::MAX)),
            |ms| ms.saturating_mul(1000),
        );

        SpanQuery::new(service, from, to).map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
    }
}

/// Build the router without binding a socket.
pub fn router(state: ApiState, server: &ServerConfig) -> Router {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/serviceInsights", get(service_insights_handler))
        .route("/api/traces", get(traces_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if server.enable_cors {
        app.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
    } else {
        app
    }
}

/// Start the API server.
pub async fn start_server(insights: ServiceInsights, config: &Config) -> Result<()> {
    let state = ApiState::new(insights, config.source.lookback);
    let app = router(state, &config.server);

    let addr = SocketAddr::new(config.server.bind_address, config.server.port);
    tracing::info!("Starting API server on http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TracemapError::network(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TracemapError::network(format!("API server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Received shutdown signal, stopping...");
}

/// GET /health
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        source: state.insights.source().name().to_string(),
    })
}

/// GET /api/serviceInsights - dependency graph around one service
async fn service_insights_handler(
    State(state): State<ApiState>,
    Query(params): Query<WindowQuery>,
) -> Response {
    let query = match params.to_span_query(state.lookback) {
        Ok(query) => query,
        Err(response) => return response,
    };

    match state.insights.for_service(&query).await {
        Ok(graph) => Json(graph).into_response(),
        Err(e) => failure_response(&format!("Failed to build service graph for {}", query.service), &e),
    }
}

/// GET /api/traces - trace summaries for one service
async fn traces_handler(State(state): State<ApiState>, Query(params): Query<WindowQuery>) -> Response {
    let query = match params.to_span_query(state.lookback) {
        Ok(query) => query,
        Err(response) => return response,
    };

    let batch = match state.insights.source().fetch(&query).await {
        Ok(batch) => batch,
        Err(e) => return failure_response("Failed to fetch spans", &e),
    };

    let search_query = SearchQuery {
        service_name: Some(query.service),
        operation_name: params.operation,
    };
    let traces = Trace::group(batch.spans);
    Json(search::summarize_all(&traces, &search_query)).into_response()
}
