// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence layer.
//!
//! [`ConnectionStore`] is the contract the sync pipeline depends on.
//! Writes are keyed by document ID so concurrent duplicates are upserts.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{Connection, ScrapeSnapshot, ScrapeType};
use crate::providers::ProviderId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    /// Linked provider accounts (keyed by connection id)
    pub const CONNECTIONS: &str = "connections";
    /// Last payload per (user, provider, scrape type)
    pub const SNAPSHOTS: &str = "scrape_snapshots";
}

/// New credentials after a token refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    // ─── Connections ─────────────────────────────────────────

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, AppError>;

    async fn list_connections_for_user(&self, user_id: &str) -> Result<Vec<Connection>, AppError>;

    /// Create or replace a connection.
    async fn upsert_connection(&self, conn: &Connection) -> Result<(), AppError>;

    async fn delete_connection(&self, id: &str) -> Result<(), AppError>;

    /// Delete every connection and snapshot of a user. Returns documents deleted.
    async fn delete_user_connections(&self, user_id: &str) -> Result<usize, AppError>;

    async fn set_tokens(&self, id: &str, tokens: &TokenUpdate) -> Result<(), AppError>;

    /// Returns the new error count.
    async fn increment_error_count(&self, id: &str) -> Result<u32, AppError>;

    async fn reset_error_count(&self, id: &str) -> Result<(), AppError>;

    async fn mark_scraped(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn mark_timeline_synced(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn mark_milestones_synced(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn update_provider_info(&self, id: &str, info: &serde_json::Value) -> Result<(), AppError>;

    async fn set_paused(&self, id: &str, paused: bool) -> Result<(), AppError>;

    // ─── Snapshots ───────────────────────────────────────────

    /// Insert or replace the snapshot at its composite key.
    async fn upsert_snapshot(&self, snapshot: &ScrapeSnapshot) -> Result<(), AppError>;

    async fn get_snapshot(
        &self,
        user_id: &str,
        provider: ProviderId,
        scrape_type: ScrapeType,
    ) -> Result<Option<ScrapeSnapshot>, AppError>;

    /// Remove every snapshot one provider holds for a user.
    async fn delete_snapshots(&self, user_id: &str, provider: ProviderId) -> Result<(), AppError>;
}
