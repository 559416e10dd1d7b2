//! Rate limiting middleware
//!
//! Per-client-IP token buckets built on governor. Public authentication
//! routes get a strict quota, authenticated API routes a generous one.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::utils::error::ErrorResponse;

/// Quota of one limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Burst capacity (maximum requests allowed at once)
    pub burst_size: u32,
}

impl RateLimitConfig {
    /// Quota for registration, login and e-mail verification
    pub fn auth(settings: &RateLimitSettings) -> Self {
        Self {
            requests_per_second: settings.auth_requests_per_second,
            burst_size: settings.auth_burst_size,
        }
    }

    /// Quota for authenticated API calls
    pub fn api(settings: &RateLimitSettings) -> Self {
        Self {
            requests_per_second: settings.api_requests_per_second,
            burst_size: settings.api_burst_size,
        }
    }
}

/// Per-IP rate limiter using governor
pub type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// IP address to limiter map shared by all requests of one route group
#[derive(Clone)]
pub struct RateLimitState {
    /// Map of IP to rate limiter
    limiters: Arc<RwLock<HashMap<IpAddr, Arc<IpRateLimiter>>>>,
    /// Quota for newly created limiters
    config: RateLimitConfig,
}

impl RateLimitState {
    /// Create an empty state whose limiters all use `config`
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiters: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Get or create the limiter for `ip`
    async fn get_limiter(&self, ip: IpAddr) -> Arc<IpRateLimiter> {
        // Fast path under the read lock
        {
            let limiters = self.limiters.read().await;
            if let Some(limiter) = limiters.get(&ip) {
                return limiter.clone();
            }
        }

        let mut limiters = self.limiters.write().await;

        // Double-check after acquiring write lock
        if let Some(limiter) = limiters.get(&ip) {
            return limiter.clone();
        }

        // Zero in the settings means one, never unlimited
        let quota = Quota::per_second(
            NonZeroU32::new(self.config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(self.config.burst_size).unwrap_or(NonZeroU32::MIN));

        let limiter = Arc::new(RateLimiter::direct(quota));
        limiters.insert(ip, limiter.clone());
        limiter
    }

    /// Bound the number of tracked addresses
    ///
    /// Governor limiters have no idle notion, so once the map grows past the
    /// cap half of it is dropped. Called hourly by [`spawn_rate_limit_cleanup`].
    pub async fn cleanup(&self) {
        const MAX_TRACKED_IPS: usize = 10000;

        let mut limiters = self.limiters.write().await;
        let initial_count = limiters.len();

        if limiters.len() > MAX_TRACKED_IPS {
            let to_remove: Vec<_> = limiters
                .keys()
                .take(limiters.len() / 2)
                .cloned()
                .collect();
            for ip in to_remove {
                limiters.remove(&ip);
            }

            debug!(
                "Rate limiter cleanup: {} -> {} entries",
                initial_count,
                limiters.len()
            );
        }
    }
}

/// Client address: the socket peer, else the first X-Forwarded-For hop
fn client_ip(request: &Request<Body>) -> IpAddr {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    forwarded_ip(request.headers()).unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Only consulted when no socket address is attached, e.g. behind a proxy
/// that terminates the connection or under `oneshot` in tests
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Reject the request with 429 once the caller's bucket is empty
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    let limiter = rate_limit.get_limiter(ip).await;

    match limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            RateLimitExceeded.into_response()
        }
    }
}

/// 429 response with a one-second `Retry-After`
pub struct RateLimitExceeded;

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, "1")],
            Json(ErrorResponse::new(
                "too_many_requests",
                "Too many requests. Please try again later.",
            )),
        )
            .into_response()
    }
}

/// Spawn a background task to periodically clean up rate limiters
pub fn spawn_rate_limit_cleanup(state: RateLimitState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            state.cleanup().await;
        }
    });
}
