//! Per-IP request rate limiting.
//!
//! Uses a token bucket keyed by client IP, refilled at the configured number
//! of requests per minute.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use crate::api::ApiError;
use crate::auth::{IpSource, extract_client_ip};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Interval between sweeps of idle client keys.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RateLimitConfig {
    limiter: Arc<IpLimiter>,
    ip_source: IpSource,
}

impl RateLimitConfig {
    /// Returns None when `requests_per_minute` is 0 (limiting disabled).
    pub fn per_minute(requests_per_minute: u32, ip_source: IpSource) -> Option<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute)?);
        Some(Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            ip_source,
        })
    }

    /// Spawn a background task that periodically drops keys whose bucket has
    /// fully refilled. The task stops once every clone of this config is gone.
    pub fn spawn_pruning(&self, period: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(&self.limiter);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                prune(&limiter);
            }
        })
    }
}

/// Forget clients that are back to a full bucket.
fn prune(limiter: &IpLimiter) {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    tracing::debug!(keys = limiter.len(), "Pruned rate limiter state");
}

/// Middleware rejecting clients that exceed their quota with 429.
pub async fn rate_limit(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = extract_client_ip(&request, config.ip_source).map_err(|reason| {
        tracing::warn!(reason, "Unable to determine client IP");
        ApiError::forbidden("Unable to determine client IP")
    })?;

    if config.limiter.check_key(&ip).is_err() {
        tracing::debug!(ip = %ip, "Rate limit exceeded");
        return Err(ApiError::too_many_requests(
            "Too many requests. Please try again later.",
        ));
    }
    Ok(next.run(request).await)
}
