// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scrape/sync orchestration for one connection at a time.
//!
//! A sync task runs: load → skip checks → rate-limit gate → health guards →
//! token refresh → scrape → record outcome. Tasks are idempotent; two
//! concurrent runs for the same connection race harmlessly because every
//! write is an upsert on a composite key.

use crate::cache::CacheBackend;
use crate::db::ConnectionStore;
use crate::error::AppError;
use crate::models::{Connection, ScrapeSnapshot, ScrapeType};
use crate::providers::{available_scrapes, ProviderRegistry};
use crate::services::backoff::{requeue_jitter, tasks_disabled_flag, RateLimitGate};
use crate::services::scrape::Scraper;
use crate::services::tasks::{
    enqueue_all, FanOutResult, SyncConnectionPayload, TaskRequest, TaskScheduler,
};
use crate::services::tokens::{RefreshOutcome, TokenManager};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Connections with more consecutive failures than this are not scraped.
pub const MAX_INTEGRATION_ERRORS: u32 = 5;
/// Minimum time between timeline or milestones syncs of one connection.
pub const SYNC_COOLDOWN_HOURS: i64 = 10;

// ─── Guards ──────────────────────────────────────────────────

pub fn can_scrape_connection(conn: &Connection) -> bool {
    conn.error_count <= MAX_INTEGRATION_ERRORS
}

fn cooled_down(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last.is_none_or(|t| now - t >= chrono::Duration::hours(SYNC_COOLDOWN_HOURS))
}

pub fn can_sync_timeline_for_connection(conn: &Connection, now: DateTime<Utc>) -> bool {
    can_scrape_connection(conn) && cooled_down(conn.last_timeline_sync_at, now)
}

pub fn can_sync_milestones_for_connection(conn: &Connection, now: DateTime<Utc>) -> bool {
    can_scrape_connection(conn) && cooled_down(conn.last_milestones_sync_at, now)
}

// ─── Outcome recording ───────────────────────────────────────

/// Store a successful scrape. Returns true when this is the connection's
/// first successful scrape.
pub async fn record_scrape_success(
    store: &dyn ConnectionStore,
    conn: &Connection,
    scrape_type: ScrapeType,
    payload: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let snapshot = ScrapeSnapshot::new(&conn.user_id, conn.provider, scrape_type, payload, now);
    store.upsert_snapshot(&snapshot).await?;

    if conn.error_count > 0 {
        store.reset_error_count(&conn.id).await?;
    }

    let first = conn.last_scraped_at.is_none();
    if first {
        store.mark_scraped(&conn.id, now).await?;
    }
    Ok(first)
}

/// Count a failed scrape. Returns the new error count.
pub async fn record_scrape_failure(
    store: &dyn ConnectionStore,
    conn: &Connection,
) -> Result<u32, AppError> {
    let count = store.increment_error_count(&conn.id).await?;
    if count == MAX_INTEGRATION_ERRORS + 1 {
        tracing::warn!(
            connection_id = %conn.id,
            provider = %conn.provider,
            error_count = count,
            "Connection disabled after repeated failures"
        );
    }
    Ok(count)
}

// ─── Sync service ────────────────────────────────────────────

/// Why a sync did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    Paused,
    TasksDisabled,
    Unsupported,
    Disabled,
    CoolingDown,
}

/// Result of one sync task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced { first_scrape: bool },
    Rescheduled { delay_secs: u64 },
    Skipped { reason: SkipReason },
    Failed { error_count: u32 },
    TokenInvalidated,
    ConnectionDeleted,
}

#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn ConnectionStore>,
    cache: Arc<dyn CacheBackend>,
    scheduler: Arc<dyn TaskScheduler>,
    registry: Arc<ProviderRegistry>,
    tokens: TokenManager,
    scraper: Scraper,
    gate: RateLimitGate,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        cache: Arc<dyn CacheBackend>,
        scheduler: Arc<dyn TaskScheduler>,
        registry: Arc<ProviderRegistry>,
        tokens: TokenManager,
        scraper: Scraper,
    ) -> Self {
        let gate = RateLimitGate::new(cache.clone());
        Self {
            store,
            cache,
            scheduler,
            registry,
            tokens,
            scraper,
            gate,
        }
    }

    /// Replace the rate-limit gate (tests use a short TTL).
    pub fn with_gate(mut self, gate: RateLimitGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &RateLimitGate {
        &self.gate
    }

    async fn reschedule(&self, payload: &SyncConnectionPayload) -> Result<SyncOutcome, AppError> {
        let delay = requeue_jitter();
        let task = TaskRequest::SyncConnection(SyncConnectionPayload {
            attempt: payload.attempt + 1,
            ..payload.clone()
        });
        self.scheduler.enqueue_after_delay(delay, task).await?;
        Ok(SyncOutcome::Rescheduled {
            delay_secs: delay.as_secs(),
        })
    }

    /// Run one `sync-connection` task.
    ///
    /// Provider failures are absorbed into the outcome. Only infrastructure
    /// errors (store, cache, scheduler) propagate so the task queue retries.
    pub async fn sync_connection(
        &self,
        payload: &SyncConnectionPayload,
    ) -> Result<SyncOutcome, AppError> {
        let scrape_type = payload.scrape_type;
        let skipped = |reason| Ok(SyncOutcome::Skipped { reason });

        let Some(mut conn) = self.store.get_connection(&payload.connection_id).await? else {
            return skipped(SkipReason::NotFound);
        };
        if conn.paused {
            return skipped(SkipReason::Paused);
        }
        if tasks_disabled_flag(self.cache.clone()).is_raised().await? {
            return skipped(SkipReason::TasksDisabled);
        }
        if !available_scrapes(conn.provider).contains(&scrape_type) {
            return skipped(SkipReason::Unsupported);
        }
        if !can_scrape_connection(&conn) {
            return skipped(SkipReason::Disabled);
        }

        if self.gate.is_tripped(conn.provider).await? {
            tracing::info!(
                connection_id = %conn.id,
                provider = %conn.provider,
                attempt = payload.attempt,
                "Provider rate limited, rescheduling"
            );
            return self.reschedule(payload).await;
        }

        let now = Utc::now();
        let cooled = match scrape_type {
            ScrapeType::Timeline => can_sync_timeline_for_connection(&conn, now),
            ScrapeType::Milestones => can_sync_milestones_for_connection(&conn, now),
            _ => true,
        };
        if !cooled {
            return skipped(SkipReason::CoolingDown);
        }

        let descriptor = self.registry.lookup(conn.provider);

        match self.tokens.refresh_if_needed(&descriptor, &conn, now).await? {
            RefreshOutcome::Refreshed(updated) => conn = updated,
            RefreshOutcome::NotNeeded | RefreshOutcome::Failed => {}
            RefreshOutcome::TokenInvalidated => return Ok(SyncOutcome::TokenInvalidated),
            RefreshOutcome::AccountDeleted => return Ok(SyncOutcome::ConnectionDeleted),
        }

        match self.scraper.scrape(&descriptor, &conn, scrape_type).await {
            Ok(output) => {
                if let Some(info) = &output.provider_info {
                    self.store.update_provider_info(&conn.id, info).await?;
                }
                let first_scrape = record_scrape_success(
                    self.store.as_ref(),
                    &conn,
                    scrape_type,
                    &output.payload,
                    now,
                )
                .await?;
                match scrape_type {
                    ScrapeType::Timeline => self.store.mark_timeline_synced(&conn.id, now).await?,
                    ScrapeType::Milestones => {
                        self.store.mark_milestones_synced(&conn.id, now).await?
                    }
                    _ => {}
                }

                tracing::info!(
                    connection_id = %conn.id,
                    provider = %conn.provider,
                    scrape_type = %scrape_type,
                    first_scrape,
                    "Scrape succeeded"
                );
                Ok(SyncOutcome::Synced { first_scrape })
            }
            Err(e) if e.is_transient() => {
                self.gate.trip(conn.provider).await?;
                tracing::warn!(
                    connection_id = %conn.id,
                    provider = %conn.provider,
                    error = %e,
                    "Transient provider error, rescheduling"
                );
                self.reschedule(payload).await
            }
            Err(e @ (AppError::Provider { .. } | AppError::BadRequest(_))) => {
                let error_count = record_scrape_failure(self.store.as_ref(), &conn).await?;
                tracing::warn!(
                    connection_id = %conn.id,
                    provider = %conn.provider,
                    scrape_type = %scrape_type,
                    error_count,
                    token_rejected = e.is_token_error(),
                    error = %e,
                    "Scrape failed"
                );
                Ok(SyncOutcome::Failed { error_count })
            }
            Err(e) => Err(e),
        }
    }

    /// Sync tasks for one connection, one per supported scrape type.
    pub fn tasks_for_connection(conn: &Connection) -> Vec<TaskRequest> {
        available_scrapes(conn.provider)
            .iter()
            .map(|t| TaskRequest::sync_connection(&conn.id, *t))
            .collect()
    }

    /// Enqueue every scrape for one connection (after connecting).
    pub async fn enqueue_connection(&self, conn: &Connection) -> FanOutResult {
        enqueue_all(self.scheduler.as_ref(), Self::tasks_for_connection(conn)).await
    }

    /// Enqueue every supported scrape for each active connection of a user.
    pub async fn enqueue_all_for_user(&self, user_id: &str) -> Result<FanOutResult, AppError> {
        let tasks: Vec<TaskRequest> = self
            .store
            .list_connections_for_user(user_id)
            .await?
            .iter()
            .filter(|c| !c.paused && can_scrape_connection(c))
            .flat_map(Self::tasks_for_connection)
            .collect();

        Ok(enqueue_all(self.scheduler.as_ref(), tasks).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use crate::providers::ProviderId;
    use serde_json::json;

    fn conn() -> Connection {
        Connection::new(
            "u1",
            ProviderId::GitHub,
            "42",
            "octocat",
            "tok".to_string(),
            json!({"login": "octocat", "id": 42}),
            Utc::now(),
        )
    }

    #[test]
    fn test_error_threshold_boundary() {
        let mut c = conn();
        c.error_count = MAX_INTEGRATION_ERRORS;
        assert!(can_scrape_connection(&c));
        c.error_count = MAX_INTEGRATION_ERRORS + 1;
        assert!(!can_scrape_connection(&c));
        assert!(!can_sync_timeline_for_connection(&c, Utc::now()));
        assert!(!can_sync_milestones_for_connection(&c, Utc::now()));
    }

    #[test]
    fn test_cooldown() {
        let now = Utc::now();
        let mut c = conn();
        assert!(can_sync_timeline_for_connection(&c, now));

        c.last_timeline_sync_at = Some(now - chrono::Duration::hours(9));
        assert!(!can_sync_timeline_for_connection(&c, now));
        c.last_timeline_sync_at = Some(now - chrono::Duration::hours(10));
        assert!(can_sync_timeline_for_connection(&c, now));

        c.last_milestones_sync_at = Some(now - chrono::Duration::minutes(5));
        assert!(!can_sync_milestones_for_connection(&c, now));
    }

    #[tokio::test]
    async fn test_first_scrape_flag() {
        let db = MemoryDb::new();
        let c = conn();
        db.upsert_connection(&c).await.unwrap();
        let now = Utc::now();

        assert!(record_scrape_success(&db, &c, ScrapeType::Profile, &json!({}), now)
            .await
            .unwrap());

        let c = db.get_connection(&c.id).await.unwrap().unwrap();
        assert_eq!(c.last_scraped_at, Some(now));
        assert!(!record_scrape_success(&db, &c, ScrapeType::Profile, &json!({}), now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_success_resets_error_count() {
        let db = MemoryDb::new();
        let c = conn();
        db.upsert_connection(&c).await.unwrap();

        assert_eq!(record_scrape_failure(&db, &c).await.unwrap(), 1);
        assert_eq!(record_scrape_failure(&db, &c).await.unwrap(), 2);
        let c = db.get_connection(&c.id).await.unwrap().unwrap();

        record_scrape_success(&db, &c, ScrapeType::Repos, &json!([]), Utc::now())
            .await
            .unwrap();
        assert_eq!(db.get_connection(&c.id).await.unwrap().unwrap().error_count, 0);
    }

    #[test]
    fn test_tasks_for_connection() {
        let tasks = SyncService::tasks_for_connection(&conn());
        assert_eq!(tasks.len(), available_scrapes(ProviderId::GitHub).len());
        assert!(tasks.contains(&TaskRequest::sync_connection(&conn().id, ScrapeType::Repos)));
    }

    #[test]
    fn test_outcome_json() {
        let v = serde_json::to_value(SyncOutcome::Skipped {
            reason: SkipReason::CoolingDown,
        })
        .unwrap();
        assert_eq!(v, json!({"outcome": "skipped", "reason": "cooling_down"}));
    }
}
