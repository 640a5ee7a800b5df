/// Recommendation API Handlers
use actix_web::{web, HttpResponse};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use super::RecommendationHandlerState;
use crate::error::{AppError, Result};
use crate::metrics::{self, Outcome};
use crate::models::{PostGet, RecommendationQuery};

/// GET /post/recommendations/
/// Top posts for a user at the given time, most likely to be liked first
pub async fn get_recommendations(
    query: web::Query<RecommendationQuery>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let RecommendationQuery { id, time, limit } = query.into_inner();
    let limit = state.effective_limit(limit);

    debug!(user_id = id, %time, limit, "Getting recommendations");

    let engine = Arc::clone(&state.engine);
    let known_user = engine.snapshot().users().features(id).is_some();
    let start = Instant::now();

    // scoring is CPU-bound; keep it off the actix worker
    let ranked = tokio::task::spawn_blocking(move || engine.rank(id, time, limit))
        .await
        .map_err(|e| AppError::Internal(format!("Ranking task failed: {}", e)))
        .and_then(|result| result.map_err(AppError::from));
    let elapsed = start.elapsed();

    let recommendations = match ranked {
        Ok(recommendations) => recommendations,
        Err(err) => {
            error!(user_id = id, "Failed to rank posts: {}", err);
            metrics::record_recommendation(Outcome::Error, elapsed);
            return Err(err);
        }
    };

    let outcome = if known_user {
        Outcome::Ok
    } else {
        Outcome::UnknownUser
    };
    metrics::record_recommendation(outcome, elapsed);

    let posts: Vec<PostGet> = recommendations
        .into_iter()
        .map(|rec| PostGet::from_recommendation(rec, state.include_text))
        .collect();

    Ok(HttpResponse::Ok().json(posts))
}
