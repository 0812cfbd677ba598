use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use worth_core::{Embedder, Predictor, ReferenceGallery};
use worth_models::{OnnxEmbedder, OnnxFaceNormalizer};

mod api;
mod config;
mod engine;
mod state;

use config::Config;
use state::AppState;

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "worthd starting");

    let config = Config::load().context("loading configuration")?;

    // Fail fast: the service must not start without its gallery and models.
    let gallery = Arc::new(
        ReferenceGallery::load(&config.gallery_path, config.norm_policy)
            .context("loading reference gallery")?,
    );

    let options = config.model_options();
    let normalizer = OnnxFaceNormalizer::load(&options).context("loading face detector")?;
    let embedder = OnnxEmbedder::load(&options).context("loading face embedder")?;
    let model_version = embedder.model_version().to_string();

    let predictor =
        Predictor::new(normalizer, embedder, Arc::clone(&gallery)).with_top_k(config.top_k);
    let engine = engine::spawn_engine(predictor, engine::ENGINE_QUEUE_DEPTH)?;

    let state = web::Data::new(AppState {
        engine,
        gallery,
        top_k: config.top_k,
        model_version,
        loaded_at: chrono::Utc::now(),
        max_upload_bytes: config.max_upload_bytes,
        request_timeout: config.request_timeout,
    });

    tracing::info!(bind = %config.bind, top_k = config.top_k, "worthd ready");

    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind(&config.bind)
        .with_context(|| format!("binding {}", config.bind))?
        .run()
        .await?;

    tracing::info!("worthd shutting down");
    Ok(())
}
