//! Rate limit HTTP handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::error::TurnstileError;
use crate::persist::ConfigFile;
use crate::ratelimit::{LimitConfig, RateLimiter};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter instance
    pub limiter: Arc<RateLimiter>,
    /// Where accepted configurations are saved, if anywhere
    pub config_file: Option<ConfigFile>,
}

impl AppState {
    /// Create state without configuration persistence.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            config_file: None,
        }
    }

    /// Save accepted configurations to `file`.
    pub fn with_config_file(mut self, file: ConfigFile) -> Self {
        self.config_file = Some(file);
        self
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/configure", get(current_config).post(configure))
        .route("/api/is_rate_limited/:unique_token", get(is_rate_limited))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

/// Replace the rate limit configuration and persist it.
#[instrument(skip_all)]
async fn configure(
    State(state): State<AppState>,
    payload: Result<Json<LimitConfig>, JsonRejection>,
) -> Result<Json<LimitConfig>, ApiError> {
    let Json(body) = payload?;
    let accepted = state.limiter.configure(body.interval, body.limit)?;

    if let Some(file) = &state.config_file {
        file.save(&accepted).await?;
    }

    Ok(Json(accepted))
}

async fn current_config(State(state): State<AppState>) -> Json<LimitConfig> {
    Json(state.limiter.config())
}

/// Count a request for the token and report whether it is over the limit.
#[instrument(skip(state))]
async fn is_rate_limited(
    State(state): State<AppState>,
    Path(unique_token): Path<String>,
) -> Result<Json<bool>, ApiError> {
    let limited = state.limiter.is_rate_limited(&unique_token).await?;
    Ok(Json(limited))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<AppState>) -> Response {
    match state.limiter.store().ping().await {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

/// A [`TurnstileError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TurnstileError);

impl From<TurnstileError> for ApiError {
    fn from(e: TurnstileError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(TurnstileError::InvalidConfig(rejection.body_text()))
    }
}

impl ApiError {
    /// Get the HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            TurnstileError::InvalidConfig(_) | TurnstileError::InvalidToken(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TurnstileError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self.0 {
            TurnstileError::InvalidConfig(_) => "INVALID_CONFIG",
            TurnstileError::InvalidToken(_) => "INVALID_TOKEN",
            TurnstileError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            _ => "INTERNAL",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self.0, code = self.error_code(), "Request failed");
        } else {
            info!(error = %self.0, code = self.error_code(), "Request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.0.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}
