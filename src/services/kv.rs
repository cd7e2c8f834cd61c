// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ephemeral per-task storage.
//!
//! Multi-step scrapes (paginated walks) stage progress here between task
//! invocations. Keys are `{task}-{connection_id}-{key}` and expire on their
//! own if a walk is abandoned. Every write refreshes the key's TTL.

use crate::cache::CacheBackend;
use crate::error::AppError;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Cache handle scoped to one task and connection.
#[derive(Clone)]
pub struct TaskStore {
    cache: Arc<dyn CacheBackend>,
    task: String,
    connection_id: String,
    ttl: Duration,
}

fn encode<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))
}

/// Decode a stored value. Undecodable values read as missing.
fn decode<T: DeserializeOwned>(key: &str, raw: String) -> Option<T> {
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Discarding undecodable task store value");
            None
        }
    }
}

impl TaskStore {
    pub fn new(cache: Arc<dyn CacheBackend>, task: &str, connection_id: &str) -> Self {
        Self {
            cache,
            task: task.to_string(),
            connection_id: connection_id.to_string(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Full cache key for `key`.
    pub fn key(&self, key: &str) -> String {
        format!("{}-{}-{}", self.task, self.connection_id, key)
    }

    // ─── Single values ───────────────────────────────────────

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let full = self.key(key);
        Ok(self
            .cache
            .get(&full)
            .await?
            .and_then(|raw| decode(&full, raw)))
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        self.cache.set(&self.key(key), &encode(value)?, self.ttl).await
    }

    pub async fn del(&self, key: &str) -> Result<(), AppError> {
        self.cache.del(&self.key(key)).await
    }

    // ─── Hashes ──────────────────────────────────────────────

    pub async fn hget<T: DeserializeOwned>(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<T>, AppError> {
        let full = self.key(key);
        Ok(self
            .cache
            .hget(&full, field)
            .await?
            .and_then(|raw| decode(&full, raw)))
    }

    pub async fn hset<T: Serialize>(&self, key: &str, field: &str, value: &T) -> Result<(), AppError> {
        let full = self.key(key);
        self.cache.hset(&full, field, &encode(value)?).await?;
        self.cache.expire(&full, self.ttl).await
    }

    // ─── Lists ───────────────────────────────────────────────

    pub async fn lpop<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let full = self.key(key);
        Ok(self
            .cache
            .lpop(&full)
            .await?
            .and_then(|raw| decode(&full, raw)))
    }

    /// Append and return the new length.
    pub async fn rpush<T: Serialize>(&self, key: &str, value: &T) -> Result<u64, AppError> {
        let full = self.key(key);
        let len = self.cache.rpush(&full, &encode(value)?).await?;
        self.cache.expire(&full, self.ttl).await?;
        Ok(len)
    }

    /// All list values in order.
    pub async fn lvalues<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, AppError> {
        let full = self.key(key);
        Ok(self
            .cache
            .lrange_all(&full)
            .await?
            .into_iter()
            .filter_map(|raw| decode(&full, raw))
            .collect())
    }

    pub async fn llen(&self, key: &str) -> Result<u64, AppError> {
        self.cache.llen(&self.key(key)).await
    }

    // ─── Counters ────────────────────────────────────────────

    pub async fn incr(&self, key: &str) -> Result<i64, AppError> {
        let full = self.key(key);
        let n = self.cache.incr(&full).await?;
        self.cache.expire(&full, self.ttl).await?;
        Ok(n)
    }
}
