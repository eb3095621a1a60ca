//! Per-client fixed-window rate limiting for the HTTP API.
//!
//! Each client IP gets a counter that resets when its window expires. Once
//! the counter reaches the configured maximum, further requests in the same
//! window are answered with `429 Too Many Requests`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Message returned with a `429` response.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Number of tracked clients above which expired windows are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is within the limit.
    Allowed {
        /// Requests left in the current window.
        remaining: u32,
    },
    /// The client has exhausted its window.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// In-memory fixed-window counter keyed by client IP.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    /// Creates a limiter with the given window and request cap.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// The configured request cap per window.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.config.max_requests
    }

    /// Counts one request from `client` at the current time.
    pub fn check(&self, client: IpAddr) -> Decision {
        self.check_at(client, Instant::now())
    }

    /// Counts one request from `client` at `now`.
    pub fn check_at(&self, client: IpAddr, now: Instant) -> Decision {
        let mut windows = self.windows.lock();
        if windows.len() > PRUNE_THRESHOLD {
            let window_len = self.config.window;
            windows.retain(|_, w| now.duration_since(w.started) < window_len);
        }

        let window = windows.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        let elapsed = now.duration_since(window.started);
        if elapsed >= self.config.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.config.max_requests {
            let retry_after = self
                .config
                .window
                .saturating_sub(now.duration_since(window.started));
            return Decision::Limited { retry_after };
        }

        window.count += 1;
        let remaining = self.config.max_requests - window.count;
        drop(windows);
        Decision::Allowed { remaining }
    }
}

/// axum middleware enforcing the limiter on every request it wraps.
///
/// The client is identified by the peer address from [`ConnectInfo`]; when it
/// is absent (e.g. in-process tests) all requests share one bucket.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip());

    match limiter.check(client) {
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.max_requests()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(client = %client, "rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "error": RATE_LIMIT_MESSAGE })),
            )
                .into_response();
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.max_requests()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(0u32));
            headers.insert(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
            response
        }
    }
}
