// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::Utc;
use devboard_integrations::cache::MemoryCache;
use devboard_integrations::config::Config;
use devboard_integrations::db::{FirestoreDb, MemoryDb};
use devboard_integrations::middleware::auth::create_jwt;
use devboard_integrations::models::Connection;
use devboard_integrations::providers::{ProviderId, ProviderRegistry};
use devboard_integrations::routes::create_router;
use devboard_integrations::services::RecordingScheduler;
use devboard_integrations::AppState;
use std::collections::HashMap;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// In-memory app plus typed handles on its adapters.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryDb>,
    pub cache: Arc<MemoryCache>,
    pub scheduler: Arc<RecordingScheduler>,
}

/// Create a test app on in-memory adapters with no provider overrides.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(ProviderRegistry::with_overrides(HashMap::new()))
}

/// Create a test app with a custom registry (e.g. API URLs pointing at mockito).
#[allow(dead_code)]
pub fn create_test_app_with(registry: ProviderRegistry) -> TestApp {
    let store = Arc::new(MemoryDb::new());
    let cache = Arc::new(MemoryCache::new());
    let scheduler = Arc::new(RecordingScheduler::new());

    let state = Arc::new(AppState::new(
        Config::test_default(),
        registry,
        store.clone(),
        cache.clone(),
        scheduler.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        cache,
        scheduler,
    }
}

/// Registry whose `INTEGRATION_*` overrides come from `pairs`.
#[allow(dead_code)]
pub fn registry_with(pairs: &[(&str, &str)]) -> ProviderRegistry {
    ProviderRegistry::with_overrides(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Session JWT for `user_id` signed with the test key.
#[allow(dead_code)]
pub fn session_token(state: &AppState, user_id: &str) -> String {
    create_jwt(user_id, &state.config.jwt_signing_key).unwrap()
}

/// Fresh connection with a bearer token and an empty payload.
#[allow(dead_code)]
pub fn test_connection(user_id: &str, provider: ProviderId, external_id: &str) -> Connection {
    Connection::new(
        user_id,
        provider,
        external_id,
        external_id,
        "access-token".to_string(),
        serde_json::json!({}),
        Utc::now(),
    )
}
