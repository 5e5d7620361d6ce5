/// Backend for the NASA imagery viewer: view state over the public NASA APIs
mod cache;
mod clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod loader;
mod repo;
mod routes;
mod services;
mod utils;

use crate::clients::NasaClient;
use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::repo::{init_db, FavoritesRepo, LocalStore};
use crate::routes::build_router;
use crate::services::{ApodService, EpicService, RoverService};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load configuration
    let config = AppConfig::from_env()?;
    info!("Configuration loaded (upstream {})", config.nasa_api_url);

    // Local storage for favorites
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    init_db(&pool).await?;
    info!("Local storage ready at {}", config.database_url);

    let favorites = Arc::new(FavoritesRepo::load(LocalStore::new(pool)).await?);

    // Upstream client shared by every view
    let nasa_client = Arc::new(NasaClient::new(
        config.nasa_api_url.clone(),
        config.nasa_api_key.clone(),
        config.http_timeout,
    )?);

    let state = AppState {
        apod_service: Arc::new(ApodService::new(
            nasa_client.clone(),
            favorites,
            config.cache.metadata_entries,
            config.recent_days,
        )),
        rover_service: Arc::new(RoverService::new(
            nasa_client.clone(),
            config.cache.metadata_entries,
        )),
        epic_service: Arc::new(EpicService::new(
            nasa_client.clone(),
            config.cache.metadata_entries,
            config.cache.image_entries,
        )),
        nasa_client,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("nasa_viewer listening on {}", config.bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
