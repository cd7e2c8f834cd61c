// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local cache for tests and single-instance development.
//!
//! Expired entries are dropped lazily when touched.

use super::CacheBackend;
use crate::error::AppError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::Cache(format!("WRONGTYPE operation against key {}", key))
}

/// In-memory [`CacheBackend`].
#[derive(Clone, Default)]
pub struct MemoryCache {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry for `key`, removing it first if expired.
    fn live(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.store.get(key).map(|e| e.clone())?;
        if entry.is_expired() {
            self.store.remove(key);
            return None;
        }
        Some(entry)
    }

    /// Mutate the entry at `key`, creating it with `init` if missing or expired.
    fn with_entry<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut CacheEntry) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occ) => {
                if occ.get().is_expired() {
                    occ.insert(CacheEntry::new(init()));
                }
                f(occ.get_mut())
            }
            Entry::Vacant(vac) => {
                let mut entry = CacheEntry::new(init());
                let out = f(&mut entry)?;
                vac.insert(entry);
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match self.live(key).map(|e| e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        self.store.insert(
            key.to_string(),
            CacheEntry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), AppError> {
        self.store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), AppError> {
        if self.live(key).is_some() {
            if let Some(mut entry) = self.store.get_mut(key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AppError> {
        match self.live(key).map(|e| e.value) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(h.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AppError> {
        self.with_entry(
            key,
            || Value::Hash(HashMap::new()),
            |entry| match &mut entry.value {
                Value::Hash(h) => {
                    h.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, AppError> {
        self.with_entry(
            key,
            || Value::List(VecDeque::new()),
            |entry| match &mut entry.value {
                Value::List(l) => {
                    l.push_back(value.to_string());
                    Ok(l.len() as u64)
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, AppError> {
        if self.live(key).is_none() {
            return Ok(None);
        }
        let Some(mut entry) = self.store.get_mut(key) else {
            return Ok(None);
        };
        match &mut entry.value {
            Value::List(l) => Ok(l.pop_front()),
            _ => Err(wrong_type(key)),
        }
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, AppError> {
        match self.live(key).map(|e| e.value) {
            None => Ok(Vec::new()),
            Some(Value::List(l)) => Ok(l.into_iter().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn llen(&self, key: &str) -> Result<u64, AppError> {
        match self.live(key).map(|e| e.value) {
            None => Ok(0),
            Some(Value::List(l)) => Ok(l.len() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        self.with_entry(
            key,
            || Value::Str("0".to_string()),
            |entry| match &mut entry.value {
                Value::Str(s) => {
                    let n: i64 = s
                        .parse()
                        .map_err(|_| AppError::Cache(format!("value at {} is not an integer", key)))?;
                    *s = (n + 1).to_string();
                    Ok(n + 1)
                }
                _ => Err(wrong_type(key)),
            },
        )
    }
}
