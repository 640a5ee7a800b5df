use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use db_pool::{create_pool, record_pool_state, DbConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recsys_service::db::{FeatureRepository, FeatureSources};
use recsys_service::metrics::MetricsMiddleware;
use recsys_service::{
    register_routes, Config, RankingModel, RecommendationEngine, RecommendationHandlerState,
};

#[actix_web::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.json_logs());

    info!("Starting {}", config.service_name);

    config
        .validate()
        .context("Configuration validation failed")?;
    info!("Configuration loaded and validated");

    // Model
    let model_path = config.resolved_model_path();
    info!("Loading ranking model from {}", model_path.display());
    let model = RankingModel::load(&model_path)
        .with_context(|| format!("Failed to load model from {}", model_path.display()))?;
    info!(
        trees = model.tree_count(),
        features = model.features().len(),
        "Ranking model loaded"
    );

    // Feature snapshot
    let db_cfg = DbConfig::from_env(&config.service_name)
        .map_err(anyhow::Error::msg)
        .context("Failed to read database configuration")?;
    db_cfg.log_config();

    let pool = create_pool(db_cfg)
        .await
        .context("Failed to create PostgreSQL pool")?;
    info!("PostgreSQL connection pool created");

    let repository = FeatureRepository::new(pool.clone(), FeatureSources::from(&config));
    let snapshot = repository
        .load_snapshot()
        .await
        .context("Failed to load feature snapshot")?;
    record_pool_state(&pool, &config.service_name);

    // tables are in memory; the pool is not needed past startup
    pool.close().await;

    let engine = RecommendationEngine::new(Arc::new(model), Arc::new(snapshot))
        .context("Model features do not match the feature tables")?;
    let state = web::Data::new(RecommendationHandlerState::new(Arc::new(engine), &config));

    let bind_addr = (config.http_host.clone(), config.http_port);
    info!("Starting HTTP server on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(MetricsMiddleware)
            .configure(register_routes)
    })
    .bind(bind_addr)
    .context("Failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server error")
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,recsys_service=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
