pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
pub use handlers::{register_routes, RecommendationHandlerState};
pub use services::{RankingModel, RecommendationEngine};
