/// HTTP handlers for the recommendation API
pub mod health;
pub mod recommendations;

use actix_web::web;
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::metrics;
use crate::services::RecommendationEngine;

pub use health::{health_check, readiness_check};
pub use recommendations::get_recommendations;

/// Shared state for all handlers
pub struct RecommendationHandlerState {
    pub engine: Arc<RecommendationEngine>,
    pub service_name: String,
    pub include_text: bool,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl RecommendationHandlerState {
    pub fn new(engine: Arc<RecommendationEngine>, config: &Config) -> Self {
        Self {
            engine,
            service_name: config.service_name.clone(),
            include_text: config.include_post_text,
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }

    /// Requested limit, defaulted and capped
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}

/// Malformed query strings become a JSON 400 instead of actix's plain text
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(query_config())
        .route(
            "/post/recommendations/",
            web::get().to(recommendations::get_recommendations),
        )
        .route(
            "/post/recommendations",
            web::get().to(recommendations::get_recommendations),
        )
        .route("/health", web::get().to(health::health_check))
        .route("/ready", web::get().to(health::readiness_check))
        .route("/metrics", web::get().to(metrics::serve_metrics));
}
