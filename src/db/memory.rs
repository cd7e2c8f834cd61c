// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory [`ConnectionStore`] for tests and local development.

use super::{ConnectionStore, TokenUpdate};
use crate::error::AppError;
use crate::models::{Connection, ScrapeSnapshot, ScrapeType};
use crate::providers::ProviderId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryDb {
    connections: Arc<DashMap<String, Connection>>,
    snapshots: Arc<DashMap<String, ScrapeSnapshot>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    fn update<T>(&self, id: &str, f: impl FnOnce(&mut Connection) -> T) -> Result<T, AppError> {
        let mut conn = self
            .connections
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Connection {}", id)))?;
        let out = f(&mut conn);
        conn.updated_at = Utc::now();
        Ok(out)
    }
}

#[async_trait]
impl ConnectionStore for MemoryDb {
    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, AppError> {
        Ok(self.connections.get(id).map(|c| c.clone()))
    }

    async fn list_connections_for_user(&self, user_id: &str) -> Result<Vec<Connection>, AppError> {
        let mut conns: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone())
            .collect();
        conns.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(conns)
    }

    async fn upsert_connection(&self, conn: &Connection) -> Result<(), AppError> {
        self.connections.insert(conn.id.clone(), conn.clone());
        Ok(())
    }

    async fn delete_connection(&self, id: &str) -> Result<(), AppError> {
        self.connections.remove(id);
        Ok(())
    }

    async fn delete_user_connections(&self, user_id: &str) -> Result<usize, AppError> {
        let before = self.connections.len() + self.snapshots.len();
        self.connections.retain(|_, c| c.user_id != user_id);
        self.snapshots.retain(|_, s| s.user_id != user_id);
        Ok(before - self.connections.len() - self.snapshots.len())
    }

    async fn set_tokens(&self, id: &str, tokens: &TokenUpdate) -> Result<(), AppError> {
        self.update(id, |c| {
            c.access_token = tokens.access_token.clone();
            c.refresh_token = tokens.refresh_token.clone();
            c.expires_at = tokens.expires_at;
        })
    }

    async fn increment_error_count(&self, id: &str) -> Result<u32, AppError> {
        self.update(id, |c| {
            c.error_count += 1;
            c.error_count
        })
    }

    async fn reset_error_count(&self, id: &str) -> Result<(), AppError> {
        self.update(id, |c| c.error_count = 0)
    }

    async fn mark_scraped(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update(id, |c| c.last_scraped_at = Some(at))
    }

    async fn mark_timeline_synced(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update(id, |c| c.last_timeline_sync_at = Some(at))
    }

    async fn mark_milestones_synced(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update(id, |c| c.last_milestones_sync_at = Some(at))
    }

    async fn update_provider_info(&self, id: &str, info: &serde_json::Value) -> Result<(), AppError> {
        self.update(id, |c| c.provider_info = info.clone())
    }

    async fn set_paused(&self, id: &str, paused: bool) -> Result<(), AppError> {
        self.update(id, |c| c.paused = paused)
    }

    async fn upsert_snapshot(&self, snapshot: &ScrapeSnapshot) -> Result<(), AppError> {
        self.snapshots.insert(snapshot.doc_id(), snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(
        &self,
        user_id: &str,
        provider: ProviderId,
        scrape_type: ScrapeType,
    ) -> Result<Option<ScrapeSnapshot>, AppError> {
        let key = ScrapeSnapshot::key(user_id, provider, scrape_type);
        Ok(self.snapshots.get(&key).map(|s| s.clone()))
    }

    async fn delete_snapshots(&self, user_id: &str, provider: ProviderId) -> Result<(), AppError> {
        self.snapshots
            .retain(|_, s| !(s.user_id == user_id && s.provider == provider));
        Ok(())
    }
}
