// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Distributed flags with TTL.
//!
//! A 429 or 5xx from a provider raises that provider's rate-limit flag. Every
//! task for the provider checks the flag first and reschedules itself while
//! it is raised, so one rate-limit signal pauses all pending work for that
//! provider instead of only the task that saw it.

use crate::cache::CacheBackend;
use crate::error::AppError;
use crate::providers::ProviderId;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// How long a rate-limit signal pauses a provider.
pub const RATE_LIMIT_TTL: Duration = Duration::from_secs(60);
/// Upper bound of the random delay before a paused task runs again.
pub const MAX_REQUEUE_JITTER: Duration = Duration::from_secs(10 * 60);

const TASKS_DISABLED_KEY: &str = "tasks-disabled";

/// Boolean flag stored in the shared cache, cleared by TTL.
#[derive(Clone)]
pub struct DistributedFlag {
    cache: Arc<dyn CacheBackend>,
    key: String,
}

impl DistributedFlag {
    pub fn new(cache: Arc<dyn CacheBackend>, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn raise(&self, ttl: Duration) -> Result<(), AppError> {
        self.cache.set(&self.key, "1", ttl).await
    }

    pub async fn is_raised(&self) -> Result<bool, AppError> {
        self.cache.exists(&self.key).await
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.cache.del(&self.key).await
    }
}

/// Provider-wide rate-limit gate.
#[derive(Clone)]
pub struct RateLimitGate {
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl RateLimitGate {
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self::with_ttl(cache, RATE_LIMIT_TTL)
    }

    pub fn with_ttl(cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn flag(&self, provider: ProviderId) -> DistributedFlag {
        DistributedFlag::new(self.cache.clone(), format!("ratelimit-{}", provider.slug()))
    }

    /// Pause all tasks for `provider` for the gate's TTL.
    pub async fn trip(&self, provider: ProviderId) -> Result<(), AppError> {
        tracing::warn!(provider = %provider, ttl_secs = self.ttl.as_secs_f64(), "Rate-limit gate tripped");
        self.flag(provider).raise(self.ttl).await
    }

    pub async fn is_tripped(&self, provider: ProviderId) -> Result<bool, AppError> {
        self.flag(provider).is_raised().await
    }

    pub async fn reset(&self, provider: ProviderId) -> Result<(), AppError> {
        self.flag(provider).clear().await
    }
}

/// Global kill switch for sync tasks.
pub fn tasks_disabled_flag(cache: Arc<dyn CacheBackend>) -> DistributedFlag {
    DistributedFlag::new(cache, TASKS_DISABLED_KEY)
}

/// Random delay in `[0, MAX_REQUEUE_JITTER]`.
pub fn requeue_jitter() -> Duration {
    let secs = rand::thread_rng().gen_range(0..=MAX_REQUEUE_JITTER.as_secs());
    Duration::from_secs(secs)
}
