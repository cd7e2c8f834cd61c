// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared cache used for rate-limit flags and task staging data.
//!
//! Values are strings; callers serialize. Every key carries its own TTL.

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

use crate::error::AppError;
use async_trait::async_trait;
use std::time::Duration;

/// String, hash and list primitives with per-key TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Set a value and its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError>;

    async fn del(&self, key: &str) -> Result<(), AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Reset the TTL of an existing key. No-op for missing keys.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), AppError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AppError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AppError>;

    /// Append to a list; returns the new length.
    async fn rpush(&self, key: &str, value: &str) -> Result<u64, AppError>;

    async fn lpop(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, AppError>;

    async fn llen(&self, key: &str) -> Result<u64, AppError>;

    /// Atomic increment; missing keys start at 0.
    async fn incr(&self, key: &str) -> Result<i64, AppError>;
}
