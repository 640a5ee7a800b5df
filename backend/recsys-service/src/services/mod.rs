pub mod ranking;

pub use ranking::{RankingModel, RecommendationEngine};
