use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::proxy::{self, ProxyResult};
use crate::registry::ModelRegistry;
use crate::translate::types::{ChatRequest, ErrorBody};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Process-wide, read-only state shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub registry: ModelRegistry,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

impl AppState {
    /// Build the registry and HTTP client from a fully resolved config.
    pub fn from_config(config: ProxyConfig, logger: SharedLogger) -> Result<Self> {
        let registry = ModelRegistry::new(&config.models);
        let client = config.http_client()?;
        Ok(Self {
            config,
            registry,
            client,
            logger,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

async fn handle_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    // Checked before the body so a missing credential is reported for any input.
    if let Err(e) = state.config.require_api_key() {
        state
            .logger
            .request(LogLevel::Error, "server", &request_id, e.to_string());
        return with_request_id(e.into_response(), &request_id);
    }

    let req: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state.logger.request(
                LogLevel::Warn,
                "server",
                &request_id,
                format!("Failed to parse request: {}", e),
            );
            let err = ProxyError::translation(format!("Invalid request body: {}", e));
            return with_request_id(err.into_response(), &request_id);
        }
    };

    state.logger.request(
        LogLevel::Info,
        "server",
        &request_id,
        format!(
            "Request: model={} stream={} messages={} disable_reasoning={}",
            req.model.as_deref().unwrap_or("<default>"),
            req.stream.unwrap_or(false),
            req.messages.len(),
            req.disable_reasoning
        ),
    );

    let response = match proxy::proxy_chat(&req, &state, &request_id).await {
        Ok(ProxyResult::Complete(resp)) => Json(resp).into_response(),
        Ok(ProxyResult::Stream(stream)) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(stream))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            let level = if matches!(e, ProxyError::Upstream { .. }) {
                LogLevel::Warn
            } else {
                LogLevel::Error
            };
            state.logger.request(
                level,
                "server",
                &request_id,
                format!("{} ({})", e, e.kind()),
            );
            e.into_response()
        }
    };

    with_request_id(response, &request_id)
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models: Vec<&str> = state.registry.iter().map(|m| m.id.as_str()).collect();
    Json(serde_json::json!({
        "message": "NVIDIA NIM → OpenAI-compatible proxy",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/v1/chat/completions", "/v1/models", "/health"],
        "models": models,
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Response {
    Json(state.registry.to_model_list()).into_response()
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(detail, "Handler panicked");

    ProxyError::other(format!("Internal error: {detail}")).into_response()
}
