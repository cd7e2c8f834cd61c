// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scrape snapshots: last fetched payload per (user, provider, scrape type).

use crate::providers::ProviderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of scheduled scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeType {
    /// Re-fetch user info and badge score
    Profile,
    /// Repository list with contributor counts
    Repos,
    /// Significant repos ordered by recency
    Timeline,
    /// Score thresholds crossed
    Milestones,
    /// All-time coding summary
    Summary,
}

impl ScrapeType {
    pub const ALL: [ScrapeType; 5] = [
        ScrapeType::Profile,
        ScrapeType::Repos,
        ScrapeType::Timeline,
        ScrapeType::Milestones,
        ScrapeType::Summary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeType::Profile => "profile",
            ScrapeType::Repos => "repos",
            ScrapeType::Timeline => "timeline",
            ScrapeType::Milestones => "milestones",
            ScrapeType::Summary => "summary",
        }
    }
}

impl fmt::Display for ScrapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeType {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::error::AppError::BadRequest(format!("Unknown scrape type: {}", s)))
    }
}

/// Last successful payload for one scrape key. Replaced wholesale on write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeSnapshot {
    pub user_id: String,
    pub provider: ProviderId,
    pub scrape_type: ScrapeType,
    /// Serialized JSON payload
    pub payload: String,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapeSnapshot {
    pub fn new(
        user_id: &str,
        provider: ProviderId,
        scrape_type: ScrapeType,
        payload: &serde_json::Value,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            provider,
            scrape_type,
            payload: payload.to_string(),
            scraped_at,
        }
    }

    /// Composite key used as the document ID, which makes writes upserts.
    pub fn key(user_id: &str, provider: ProviderId, scrape_type: ScrapeType) -> String {
        format!("{}_{}_{}", user_id, provider.slug(), scrape_type.as_str())
    }

    pub fn doc_id(&self) -> String {
        Self::key(&self.user_id, self.provider, self.scrape_type)
    }

    /// Parsed payload; `Null` when the stored text is not JSON.
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}
