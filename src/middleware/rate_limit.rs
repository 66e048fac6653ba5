use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::AppError;

/// Caps the number of conversions in flight. Excess requests are rejected
/// immediately rather than queued.
#[derive(Debug)]
pub struct RequestLimiter {
    semaphore: Semaphore,
    total: AtomicU64,
    rejected: AtomicU64,
}

impl RequestLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        info!(max_concurrent_requests = max_concurrent, "Initializing request limiter");
        Self {
            semaphore: Semaphore::new(max_concurrent),
            total: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RequestLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();

    if path == "/health" {
        return Ok(next.run(request).await);
    }

    let total_requests = limiter.total.fetch_add(1, Ordering::Relaxed) + 1;

    let _permit = limiter.semaphore.try_acquire().map_err(|_| {
        let rejected = limiter.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            path = %path,
            total_requests = total_requests,
            rejected_requests = rejected,
            "Rate limit exceeded - too many concurrent requests"
        );
        AppError::RateLimitExceeded
    })?;

    debug!(
        path = %path,
        available_permits = limiter.semaphore.available_permits(),
        "Request permit acquired"
    );

    Ok(next.run(request).await)
}
