//! HTTP API handlers: health check and language-model connectivity probe.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::probe::{PROBE_PROMPT, ProbeError};
use crate::server::SharedState;

/// Body of `GET /api/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"OK"` while the process is serving requests.
    pub status: &'static str,
    /// Current time, RFC 3339 with millisecond precision.
    pub timestamp: String,
    /// Seconds since the server state was created.
    pub uptime: f64,
}

/// Body of a successful `POST /api/test-openai`.
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    /// Always `true`.
    pub success: bool,
    /// Human-readable confirmation.
    pub message: &'static str,
    /// The model's reply to the probe prompt.
    pub response: String,
}

/// Errors surfaced by the HTTP API as JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The language-model probe failed.
    #[error("Failed to connect to OpenAI: {0}")]
    Probe(#[from] ProbeError),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Probe(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// GET /api/health
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// POST /api/test-openai
pub async fn test_openai(
    State(state): State<SharedState>,
) -> Result<Json<ProbeResponse>, ApiError> {
    match state.model.complete(PROBE_PROMPT).await {
        Ok(reply) => {
            tracing::info!(provider = state.model.name(), "language model probe succeeded");
            Ok(Json(ProbeResponse {
                success: true,
                message: "OpenAI connection succeeded",
                response: reply,
            }))
        }
        Err(e) => {
            tracing::warn!(provider = state.model.name(), error = %e, "language model probe failed");
            Err(e.into())
        }
    }
}
