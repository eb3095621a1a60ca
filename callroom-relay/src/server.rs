//! Shared server state, router construction, and startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::CallroomConfig;
use crate::probe::{LanguageModel, OpenAiModel};
use crate::rate_limit::{self, RateLimiter};
use crate::relay::{self, SocketHub};

/// Errors that can occur while building or starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured CORS origin is not a valid header value.
    #[error("invalid frontend origin {origin:?}")]
    InvalidOrigin {
        /// The rejected origin string.
        origin: String,
    },
    /// The TCP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Shared application state passed to all handlers via axum's `State`.
pub struct AppState {
    /// Room membership and fan-out for WebSocket clients.
    pub hub: Arc<SocketHub>,
    /// Language model used by the connectivity probe.
    pub model: Arc<dyn LanguageModel>,
    /// Maximum WebSocket message size in bytes.
    pub max_frame_size: usize,
    /// Outbound frames buffered per WebSocket client.
    pub outbound_queue: usize,
    /// When the state was created; the health check reports uptime from it.
    pub started_at: Instant,
}

/// Handle to the [`AppState`] shared between handlers.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Creates state for `config`, using the OpenAI-compatible probe client.
    #[must_use]
    pub fn new(config: &CallroomConfig) -> SharedState {
        Self::with_model(config, Arc::new(OpenAiModel::new(config.openai.clone())))
    }

    /// Creates state with a caller-supplied language model.
    #[must_use]
    pub fn with_model(config: &CallroomConfig, model: Arc<dyn LanguageModel>) -> SharedState {
        Arc::new(Self {
            hub: Arc::new(SocketHub::new()),
            model,
            max_frame_size: config.max_frame_size,
            // tokio's bounded channel panics on a zero capacity.
            outbound_queue: config.outbound_queue.max(1),
            started_at: Instant::now(),
        })
    }
}

/// Security headers added to every response unless a handler set them.
const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
    (header::REFERRER_POLICY, "no-referrer"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=15552000; includeSubDomains",
    ),
    (
        HeaderName::from_static("cross-origin-opener-policy"),
        "same-origin",
    ),
];

/// Build the router with all routes and middleware.
///
/// # Errors
///
/// Returns [`ServerError::InvalidOrigin`] if `config.frontend_url` cannot be
/// used as a CORS origin.
pub fn create_router(state: SharedState, config: &CallroomConfig) -> Result<Router, ServerError> {
    let origin = HeaderValue::from_str(&config.frontend_url).map_err(|_| {
        ServerError::InvalidOrigin {
            origin: config.frontend_url.clone(),
        }
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let api_routes = Router::new()
        .route("/health", get(api::health))
        .route("/test-openai", post(api::test_openai))
        .layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit::enforce,
        ));

    let mut router = Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(relay::ws_handler))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(DefaultBodyLimit::max(config.max_frame_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            name,
            HeaderValue::from_static(value),
        ));
    }

    Ok(router.with_state(state))
}

/// Starts the server on `config.bind_addr` with fresh state.
///
/// # Errors
///
/// Returns an error if the router cannot be built or the listener cannot bind.
pub async fn start_server(
    config: &CallroomConfig,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), ServerError> {
    start_server_with_state(config, AppState::new(config)).await
}

/// Starts the server with pre-built [`AppState`].
///
/// This is the entry point used by both `main.rs` and test code; tests keep
/// a clone of the state to inspect the hub. Returns the bound address and the
/// serving task.
///
/// # Errors
///
/// Returns an error if the router cannot be built or the listener cannot bind.
pub async fn start_server_with_state(
    config: &CallroomConfig,
    state: SharedState,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), ServerError> {
    let app = create_router(state, config)?;

    let bind_err = |source| ServerError::Bind {
        addr: config.bind_addr.clone(),
        source,
    };
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(bind_err)?;
    let bound_addr = listener.local_addr().map_err(bind_err)?;

    let handle = tokio::spawn(async move {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
