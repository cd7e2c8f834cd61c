// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Devboard integrations: linked developer accounts for the leaderboard.
//!
//! This crate connects external provider accounts (GitHub, GitLab, WakaTime,
//! social networks and a few manually verified sites) to leaderboard users,
//! keeps their tokens fresh, and runs the scheduled scrapes that feed badge
//! scores, repository timelines and milestones.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod routes;
pub mod services;

use cache::CacheBackend;
use config::Config;
use db::ConnectionStore;
use providers::ProviderRegistry;
use services::{HttpClient, Scraper, SyncService, TaskScheduler, TokenManager};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ProviderRegistry>,
    pub http: HttpClient,
    pub store: Arc<dyn ConnectionStore>,
    pub cache: Arc<dyn CacheBackend>,
    pub scheduler: Arc<dyn TaskScheduler>,
    pub tokens: TokenManager,
    pub sync: SyncService,
}

impl AppState {
    /// Wire the services on top of the given adapters.
    pub fn new(
        config: Config,
        registry: ProviderRegistry,
        store: Arc<dyn ConnectionStore>,
        cache: Arc<dyn CacheBackend>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        let registry = Arc::new(registry);
        let http = HttpClient::new();
        let tokens = TokenManager::new(http.clone(), store.clone());
        let scraper = Scraper::new(http.clone(), cache.clone(), store.clone());
        let sync = SyncService::new(
            store.clone(),
            cache.clone(),
            scheduler.clone(),
            registry.clone(),
            tokens.clone(),
            scraper,
        );

        Self {
            config,
            registry,
            http,
            store,
            cache,
            scheduler,
            tokens,
            sync,
        }
    }

    /// Replace the sync service (tests swap in a short-TTL gate).
    pub fn with_sync(mut self, sync: SyncService) -> Self {
        self.sync = sync;
        self
    }
}
