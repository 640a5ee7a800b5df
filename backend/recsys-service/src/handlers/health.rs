use actix_web::{web, HttpResponse};
use serde_json::json;

use super::RecommendationHandlerState;

pub async fn health_check(state: web::Data<RecommendationHandlerState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": state.service_name,
    }))
}

/// Ready once the snapshot and model are loaded, which is before the
/// server binds; reports what was loaded
pub async fn readiness_check(state: web::Data<RecommendationHandlerState>) -> HttpResponse {
    let engine = &state.engine;
    HttpResponse::Ok().json(json!({
        "status": "ready",
        "service": state.service_name,
        "snapshot": engine.snapshot().stats(),
        "model": {
            "trees": engine.model().tree_count(),
            "features": engine.model().features().len(),
        },
    }))
}
