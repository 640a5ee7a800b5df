/// Ranking Module
///
/// Scores every candidate post for one user with a pretrained
/// gradient-boosted classifier and keeps the most likely to be liked.
///
/// # Workflow
/// 1. Look up the user's feature row (unknown user: empty result)
/// 2. Drop posts the user already liked
/// 3. Broadcast the user row across the remaining posts, add hour and month
///    of the request time, order columns as the model was trained
/// 4. Predict like probabilities, sort descending (ties by post id), cut to limit
pub mod engine;
pub mod model;
pub mod plan;

pub use engine::{Recommendation, RecommendationEngine, ScoredCandidate};
pub use model::{FeatureKind, FeatureMatrix, FeatureSpec, ModelDefinition, RankingModel};
pub use plan::FeaturePlan;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Model feature '{0}' is not provided by the request time, user features or post features")]
    MissingFeature(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model inference failed: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, RankingError>;
