// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection model: one linked external account.

use crate::providers::ProviderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's linked provider account, stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    /// Document ID, see [`Connection::make_id`]
    pub id: String,
    /// Owning user (host application's ID)
    pub user_id: String,
    pub provider: ProviderId,
    /// Account ID on the provider side
    pub external_id: String,
    pub username: String,

    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Consecutive scrape failures
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub last_scraped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_timeline_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_milestones_sync_at: Option<DateTime<Utc>>,
    /// Set by admins; paused connections are skipped without counting errors.
    #[serde(default)]
    pub paused: bool,

    /// Raw provider payload. Shape depends on `provider`.
    #[serde(default, with = "json_text")]
    pub provider_info: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Document ID: `{user_id}_{provider}_{external_id}` with the external
    /// ID percent-encoded so it is safe as a Firestore document ID.
    pub fn make_id(user_id: &str, provider: ProviderId, external_id: &str) -> String {
        format!(
            "{}_{}_{}",
            user_id,
            provider.slug(),
            urlencoding::encode(external_id)
        )
    }

    /// New connection with fresh health counters.
    pub fn new(
        user_id: &str,
        provider: ProviderId,
        external_id: &str,
        username: &str,
        access_token: String,
        provider_info: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::make_id(user_id, provider, external_id),
            user_id: user_id.to_string(),
            provider,
            external_id: external_id.to_string(),
            username: username.to_string(),
            access_token,
            refresh_token: None,
            expires_at: None,
            error_count: 0,
            last_scraped_at: None,
            last_timeline_sync_at: None,
            last_milestones_sync_at: None,
            paused: false,
            provider_info,
            created_at: now,
            updated_at: now,
        }
    }

    /// Carry history over from the stored row this reconnect replaces.
    /// Tokens, payload and health state stay fresh.
    pub fn keep_history_of(&mut self, existing: &Connection) {
        self.created_at = existing.created_at;
        self.last_scraped_at = existing.last_scraped_at;
        self.last_timeline_sync_at = existing.last_timeline_sync_at;
        self.last_milestones_sync_at = existing.last_milestones_sync_at;
    }

    /// True when the access token has a known expiry in the past.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Derived read view of a connection. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
pub struct NormalizedConnection {
    pub id: String,
    pub provider: ProviderId,
    pub provider_name: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub display_name: Option<String>,
    pub website_url: Option<String>,
    pub profile_url: Option<String>,
    pub badge_text: String,
    pub score: f64,
    pub score_raw: f64,
    pub disabled: bool,
    pub last_scraped_at: Option<String>,
}

/// Store a JSON value as a JSON string so any payload shape round-trips
/// through document databases unchanged.
mod json_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &serde_json::Value, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<serde_json::Value, D::Error> {
        let text = Option::<String>::deserialize(d)?;
        Ok(text
            .and_then(|t| serde_json::from_str(&t).ok())
            .unwrap_or(serde_json::Value::Null))
    }
}
