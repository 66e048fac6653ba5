pub mod convert;
pub mod health;

pub use convert::*;
pub use health::*;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::middleware::{logging_middleware, rate_limit_middleware, RequestLimiter};
use crate::services::ConversionService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConversionService>,
    pub limiter: Arc<RequestLimiter>,
    pub max_file_size_mb: usize,
}

impl AppState {
    pub fn new(config: &Config, service: ConversionService) -> Self {
        Self {
            service: Arc::new(service),
            limiter: Arc::new(RequestLimiter::new(config.max_concurrent_requests)),
            max_file_size_mb: config.max_file_size_mb,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_file_size_mb * 1024 * 1024);

    Router::new()
        .route("/health", get(health_handler))
        .route("/convert", post(convert_handler).layer(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(axum::middleware::from_fn(logging_middleware))
                .layer(axum::middleware::from_fn_with_state(
                    state.limiter.clone(),
                    rate_limit_middleware,
                )),
        )
        .with_state(state)
}
