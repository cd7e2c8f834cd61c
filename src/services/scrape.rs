// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scrapers: one fetch-and-shape routine per [`ScrapeType`].
//!
//! Scrapers only read from providers and return what should be stored.
//! Persisting snapshots and health counters is the sync service's job.

use crate::cache::CacheBackend;
use crate::db::ConnectionStore;
use crate::error::AppError;
use crate::models::{Connection, RepoSummary, ScrapeType};
use crate::providers::{strategy_for, ProviderDescriptor, ProviderId};
use crate::services::http::{read_json, transport_error, FetchOptions, HttpClient};
use crate::services::kv::TaskStore;
use crate::services::normalize::raw_signal;
use reqwest::header::{HeaderMap, LINK};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Upper bound on repo list pages walked per scrape.
pub const MAX_REPO_PAGES: i64 = 10;
/// Upper bound on contributor lookups per scrape.
pub const MAX_CONTRIBUTOR_LOOKUPS: usize = 30;
/// Score values that count as milestones.
pub const MILESTONE_THRESHOLDS: [u64; 6] = [10, 100, 1_000, 10_000, 100_000, 1_000_000];

/// What a scrape produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOutput {
    /// Snapshot payload
    pub payload: Value,
    /// Replacement `provider_info`, when the scrape refreshed it
    pub provider_info: Option<Value>,
}

// ─── Helpers ─────────────────────────────────────────────────

/// URL for `rel` in an RFC 8288 `Link` header.
pub fn link_url(headers: &HeaderMap, rel: &str) -> Option<String> {
    let value = headers.get(LINK)?.to_str().ok()?;
    let wanted = format!("rel=\"{}\"", rel);
    value.split(',').find_map(|part| {
        let mut pieces = part.split(';').map(str::trim);
        let target = pieces.next()?;
        if !pieces.any(|p| p == wanted) {
            return None;
        }
        Some(target.trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

/// Value of the `page` query parameter.
pub fn page_param(url: &str) -> Option<u64> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

/// Overlay `fresh` onto `old`. Keys added by other scrapes (e.g. `stars`,
/// `total_seconds`) survive a profile refresh that does not return them.
pub fn merge_info(old: &Value, fresh: Value) -> Value {
    match (old, fresh) {
        (Value::Object(old), Value::Object(fresh)) => {
            let mut merged = old.clone();
            merged.extend(fresh);
            Value::Object(merged)
        }
        (_, fresh) => fresh,
    }
}

/// Score used for milestones: hours for WakaTime, the raw count otherwise.
pub fn milestone_value(provider: ProviderId, info: &Value) -> Option<f64> {
    let raw = raw_signal(provider, info)?.max(0.0);
    match provider {
        ProviderId::WakaTime => Some(raw / 3600.0),
        _ => Some(raw),
    }
}

fn repos_from_snapshot(payload: Value) -> Vec<RepoSummary> {
    serde_json::from_value(payload).unwrap_or_default()
}

// ─── Scraper ─────────────────────────────────────────────────

#[derive(Clone)]
pub struct Scraper {
    http: HttpClient,
    cache: Arc<dyn CacheBackend>,
    store: Arc<dyn ConnectionStore>,
}

impl Scraper {
    pub fn new(
        http: HttpClient,
        cache: Arc<dyn CacheBackend>,
        store: Arc<dyn ConnectionStore>,
    ) -> Self {
        Self { http, cache, store }
    }

    pub async fn scrape(
        &self,
        d: &ProviderDescriptor,
        conn: &Connection,
        scrape_type: ScrapeType,
    ) -> Result<ScrapeOutput, AppError> {
        match scrape_type {
            ScrapeType::Profile => self.profile(d, conn).await,
            ScrapeType::Repos => self.repos(d, conn).await,
            ScrapeType::Timeline => self.timeline(conn).await,
            ScrapeType::Milestones => self.milestones(conn).await,
            ScrapeType::Summary => self.summary(d, conn).await,
        }
    }

    async fn profile(&self, d: &ProviderDescriptor, conn: &Connection) -> Result<ScrapeOutput, AppError> {
        let fresh = strategy_for(d.id).refresh_profile(&self.http, d, conn).await?;
        let merged = merge_info(&conn.provider_info, fresh);
        Ok(ScrapeOutput {
            payload: merged.clone(),
            provider_info: Some(merged),
        })
    }

    // ─── Repos ───────────────────────────────────────────────

    async fn repos(&self, d: &ProviderDescriptor, conn: &Connection) -> Result<ScrapeOutput, AppError> {
        let (first_url, parse): (String, fn(&Value) -> Option<RepoSummary>) = match d.id {
            ProviderId::GitHub => (
                format!("{}/user/repos?per_page=100&type=owner&sort=pushed", d.api_url),
                RepoSummary::from_github,
            ),
            ProviderId::GitLab => (
                format!(
                    "{}/users/{}/projects?per_page=100&owned=true",
                    d.api_url,
                    urlencoding::encode(&conn.external_id)
                ),
                RepoSummary::from_gitlab,
            ),
            other => {
                return Err(AppError::BadRequest(format!(
                    "{} has no repositories",
                    other
                )))
            }
        };

        let mut repos = self.walk_repo_pages(d, conn, first_url, parse).await?;

        if d.id == ProviderId::GitHub {
            self.fill_contributor_counts(d, conn, &mut repos).await?;
        }

        let significant = repos.iter().filter(|r| r.is_significant()).count();
        tracing::info!(
            connection_id = %conn.id,
            total = repos.len(),
            significant,
            "Repos scraped"
        );

        let provider_info = (d.id == ProviderId::GitHub).then(|| {
            let stars: u64 = repos
                .iter()
                .filter(|r| !r.fork && !r.private)
                .map(|r| r.stargazers)
                .sum();
            merge_info(&conn.provider_info, json!({ "stars": stars }))
        });

        let payload = serde_json::to_value(&repos)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;
        Ok(ScrapeOutput {
            payload,
            provider_info,
        })
    }

    /// Follow `Link: rel="next"` pages. Progress is staged in the task
    /// store, so a walk interrupted by a provider error resumes where it
    /// stopped on the next run.
    async fn walk_repo_pages(
        &self,
        d: &ProviderDescriptor,
        conn: &Connection,
        first_url: String,
        parse: fn(&Value) -> Option<RepoSummary>,
    ) -> Result<Vec<RepoSummary>, AppError> {
        let kv = TaskStore::new(self.cache.clone(), "repos", &conn.id);
        let strategy = strategy_for(d.id);

        let mut url = match kv.get::<String>("next_url").await? {
            Some(next) => {
                tracing::debug!(connection_id = %conn.id, "Resuming repo walk");
                next
            }
            None => first_url,
        };

        loop {
            let opts = strategy.authorize_request(d, &conn.access_token, FetchOptions::get());
            let response = self
                .http
                .fetch(&url, opts)
                .await
                .map_err(|e| transport_error(d.id, e))?;
            let next = link_url(response.headers(), "next");
            let body = read_json(d.id, response).await?;

            for repo in body.as_array().into_iter().flatten().filter_map(parse) {
                kv.rpush("repos", &repo).await?;
            }
            let pages = kv.incr("pages").await?;

            match next {
                Some(next) if pages < MAX_REPO_PAGES => {
                    kv.set("next_url", &next).await?;
                    url = next;
                }
                Some(_) => {
                    tracing::warn!(connection_id = %conn.id, pages, "Repo walk stopped at page limit");
                    break;
                }
                None => break,
            }
        }

        let staged: Vec<RepoSummary> = kv.lvalues("repos").await?;
        kv.del("repos").await?;
        kv.del("next_url").await?;
        kv.del("pages").await?;

        // A page re-fetched after an interruption is pushed twice
        let mut seen = HashSet::new();
        Ok(staged
            .into_iter()
            .filter(|r| seen.insert(r.full_name.clone()))
            .collect())
    }

    async fn fill_contributor_counts(
        &self,
        d: &ProviderDescriptor,
        conn: &Connection,
        repos: &mut [RepoSummary],
    ) -> Result<(), AppError> {
        let kv = TaskStore::new(self.cache.clone(), "contributors", &conn.id);

        for repo in repos
            .iter_mut()
            .filter(|r| r.needs_contributor_count())
            .take(MAX_CONTRIBUTOR_LOOKUPS)
        {
            if let Some(count) = kv.hget::<u64>("counts", &repo.full_name).await? {
                repo.contributors = Some(count);
                continue;
            }
            let count = self.contributor_count(d, conn, &repo.full_name).await?;
            kv.hset("counts", &repo.full_name, &count).await?;
            repo.contributors = Some(count);
        }
        Ok(())
    }

    /// Contributor count from a one-per-page listing: the `last` page
    /// number, or the length of the only page.
    async fn contributor_count(
        &self,
        d: &ProviderDescriptor,
        conn: &Connection,
        full_name: &str,
    ) -> Result<u64, AppError> {
        let url = format!("{}/repos/{}/contributors", d.api_url, full_name);
        let opts = strategy_for(d.id)
            .authorize_request(d, &conn.access_token, FetchOptions::get())
            .query("per_page", "1")
            .query("anon", "1");
        let response = self
            .http
            .fetch(&url, opts)
            .await
            .map_err(|e| transport_error(d.id, e))?;

        // Empty repository
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(0);
        }
        if let Some(last) = link_url(response.headers(), "last").and_then(|u| page_param(&u)) {
            return Ok(last);
        }
        let body = read_json(d.id, response).await?;
        Ok(body.as_array().map(|a| a.len() as u64).unwrap_or(0))
    }

    // ─── Timeline / milestones ───────────────────────────────

    /// Significant repos, most recently pushed first.
    async fn timeline(&self, conn: &Connection) -> Result<ScrapeOutput, AppError> {
        let repos = self
            .store
            .get_snapshot(&conn.user_id, conn.provider, ScrapeType::Repos)
            .await?
            .map(|s| repos_from_snapshot(s.payload_json()))
            .unwrap_or_default();

        let mut significant: Vec<RepoSummary> =
            repos.into_iter().filter(|r| r.is_significant()).collect();
        significant.sort_by(|a, b| b.recency().cmp(a.recency()));

        let payload = serde_json::to_value(&significant)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;
        Ok(ScrapeOutput {
            payload,
            provider_info: None,
        })
    }

    /// Thresholds reached by the current score, and which are new since the
    /// previous milestones snapshot.
    async fn milestones(&self, conn: &Connection) -> Result<ScrapeOutput, AppError> {
        let value = milestone_value(conn.provider, &conn.provider_info);
        let reached: Vec<u64> = match value {
            Some(v) => MILESTONE_THRESHOLDS
                .iter()
                .copied()
                .filter(|t| *t as f64 <= v)
                .collect(),
            None => Vec::new(),
        };

        let previous: Vec<u64> = self
            .store
            .get_snapshot(&conn.user_id, conn.provider, ScrapeType::Milestones)
            .await?
            .and_then(|s| serde_json::from_value(s.payload_json()["reached"].clone()).ok())
            .unwrap_or_default();
        let new: Vec<u64> = reached
            .iter()
            .copied()
            .filter(|t| !previous.contains(t))
            .collect();

        Ok(ScrapeOutput {
            payload: json!({ "value": value, "reached": reached, "new": new }),
            provider_info: None,
        })
    }

    // ─── Summary ─────────────────────────────────────────────

    /// WakaTime all-time coding stats.
    async fn summary(&self, d: &ProviderDescriptor, conn: &Connection) -> Result<ScrapeOutput, AppError> {
        if d.id != ProviderId::WakaTime {
            return Err(AppError::BadRequest(format!("{} has no summary", d.id)));
        }

        let url = format!("{}/users/current/all_time_since_today", d.api_url);
        let opts = strategy_for(d.id).authorize_request(d, &conn.access_token, FetchOptions::get());
        let response = self
            .http
            .fetch(&url, opts)
            .await
            .map_err(|e| transport_error(d.id, e))?;
        let body = read_json(d.id, response).await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);

        let provider_info = data
            .get("total_seconds")
            .and_then(Value::as_f64)
            .map(|secs| merge_info(&conn.provider_info, json!({ "total_seconds": secs })));

        Ok(ScrapeOutput {
            payload: data,
            provider_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_link_url() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://api.github.com/user/repos?page=2>; rel=\"next\", <https://api.github.com/user/repos?page=5>; rel=\"last\"",
            ),
        );
        assert_eq!(
            link_url(&headers, "next").as_deref(),
            Some("https://api.github.com/user/repos?page=2")
        );
        assert_eq!(
            link_url(&headers, "last").and_then(|u| page_param(&u)),
            Some(5)
        );
        assert!(link_url(&headers, "prev").is_none());
    }

    #[test]
    fn test_page_param_ignores_per_page() {
        assert_eq!(page_param("https://x/r?per_page=1&anon=1&page=37"), Some(37));
        assert_eq!(page_param("https://x/r?per_page=1"), None);
    }

    #[test]
    fn test_merge_info_keeps_scraped_keys() {
        let old = json!({"login": "octocat", "followers": 1, "stars": 40});
        let merged = merge_info(&old, json!({"login": "octocat", "followers": 2}));
        assert_eq!(merged, json!({"login": "octocat", "followers": 2, "stars": 40}));
    }

    #[test]
    fn test_milestone_value() {
        assert_eq!(
            milestone_value(ProviderId::WakaTime, &json!({"total_seconds": 36000})),
            Some(10.0)
        );
        assert_eq!(
            milestone_value(ProviderId::GitLab, &json!({"followers": 150})),
            Some(150.0)
        );
        assert_eq!(milestone_value(ProviderId::WakaTime, &json!({})), None);
    }

    #[test]
    fn test_milestone_value_negative_karma_is_present() {
        assert_eq!(
            milestone_value(ProviderId::Reddit, &json!({"total_karma": -1})),
            Some(0.0)
        );
        assert_eq!(milestone_value(ProviderId::Reddit, &json!({"name": "x"})), None);
    }
}
