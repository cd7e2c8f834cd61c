// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Devboard integrations API server
//!
//! Links developer accounts on external providers to leaderboard users and
//! runs the Cloud Tasks handlers that keep their stats fresh.

use devboard_integrations::{
    cache::{CacheBackend, MemoryCache, RedisCache},
    config::{Config, StorageBackend},
    db::{ConnectionStore, FirestoreDb, MemoryDb},
    providers::ProviderRegistry,
    services::{RecordingScheduler, TaskScheduler, TasksService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting devboard integrations API");

    // Storage and scheduler
    let (store, scheduler): (Arc<dyn ConnectionStore>, Arc<dyn TaskScheduler>) =
        match config.storage_backend {
            StorageBackend::Firestore => {
                let db = FirestoreDb::new(&config.gcp_project_id)
                    .await
                    .expect("Failed to connect to Firestore");
                let tasks = TasksService::new(
                    &config.gcp_project_id,
                    &config.gcp_region,
                    &config.service_url,
                );
                tracing::info!(
                    project = %config.gcp_project_id,
                    "Cloud Tasks service initialized"
                );
                (Arc::new(db), Arc::new(tasks))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; tasks are recorded, not delivered");
                (Arc::new(MemoryDb::new()), Arc::new(RecordingScheduler::new()))
            }
        };

    // Shared cache for rate-limit flags and task staging
    let cache: Arc<dyn CacheBackend> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(
            RedisCache::connect(url)
                .await
                .expect("Failed to connect to Redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set, using process-local cache");
            Arc::new(MemoryCache::new())
        }
    };

    let registry = ProviderRegistry::from_env();

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        registry,
        store,
        cache,
        scheduler,
    ));

    // Build router
    let app = devboard_integrations::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("devboard_integrations=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
