// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth providers with small deviations from the standard flow.

use super::strategy::{ClientAuth, ProviderStrategy};
use super::ProviderDescriptor;
use crate::error::AppError;
use crate::services::http::{get_json, FetchOptions, HttpClient, DEFAULT_USER_AGENT};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Unwrap a `{ "data": ... }` envelope.
fn data_envelope(raw: Value) -> Value {
    match raw {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or_default(),
        other => other,
    }
}

/// Standard OAuth2 with bearer tokens (LinkedIn, Instagram, Wikipedia).
pub struct DefaultStrategy;

impl ProviderStrategy for DefaultStrategy {}

pub struct WakaTimeStrategy;

impl ProviderStrategy for WakaTimeStrategy {
    fn shape_user_info(&self, raw: Value) -> Value {
        data_envelope(raw)
    }
}

/// X uses PKCE (via descriptor flags) and Basic client auth.
pub struct XStrategy;

impl ProviderStrategy for XStrategy {
    fn client_auth(&self) -> ClientAuth {
        ClientAuth::Basic
    }

    fn shape_user_info(&self, raw: Value) -> Value {
        data_envelope(raw)
    }
}

pub struct RedditStrategy;

impl ProviderStrategy for RedditStrategy {
    fn extra_authorize_params(&self) -> &'static [(&'static str, &'static str)] {
        &[("duration", "permanent")]
    }

    fn client_auth(&self) -> ClientAuth {
        ClientAuth::Basic
    }

    /// Reddit throttles generic user agents; it wants `platform:app:version`.
    fn authorize_request(
        &self,
        _d: &ProviderDescriptor,
        token: &str,
        opts: FetchOptions,
    ) -> FetchOptions {
        opts.bearer(token)
            .header("User-Agent", format!("web:{}", DEFAULT_USER_AGENT.replace('/', ":v")))
    }
}

pub struct TwitchStrategy;

#[async_trait]
impl ProviderStrategy for TwitchStrategy {
    fn authorize_request(
        &self,
        d: &ProviderDescriptor,
        token: &str,
        opts: FetchOptions,
    ) -> FetchOptions {
        opts.bearer(token).header("Client-Id", d.client_id.clone())
    }

    fn shape_user_info(&self, raw: Value) -> Value {
        match data_envelope(raw) {
            Value::Array(mut users) if !users.is_empty() => users.swap_remove(0),
            other => other,
        }
    }

    async fn enrich_user_info(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        token: &str,
        mut info: Value,
    ) -> Result<Value, AppError> {
        let Some(id) = info.get("id").and_then(|v| v.as_str()).map(str::to_string) else {
            return Ok(info);
        };

        let url = format!("{}/channels/followers", d.api_url);
        let opts = self.authorize_request(d, token, FetchOptions::get())
            .query("broadcaster_id", id)
            .query("first", "1");
        let body = get_json(http, d.id, &url, opts).await?;

        if let (Some(total), Some(obj)) = (body.get("total").cloned(), info.as_object_mut()) {
            obj.insert("followers_count".to_string(), total);
        }
        Ok(info)
    }
}

pub struct YouTubeStrategy;

impl ProviderStrategy for YouTubeStrategy {
    fn extra_authorize_params(&self) -> &'static [(&'static str, &'static str)] {
        // Without these Google issues no refresh token
        &[("access_type", "offline"), ("prompt", "consent")]
    }

    fn shape_user_info(&self, raw: Value) -> Value {
        raw.get("items")
            .and_then(|items| items.get(0))
            .cloned()
            .unwrap_or(raw)
    }
}

pub struct PatreonStrategy;

impl ProviderStrategy for PatreonStrategy {
    /// Flatten the JSON:API document to user attributes plus the campaign's
    /// patron count.
    fn shape_user_info(&self, raw: Value) -> Value {
        let data = raw.get("data").cloned().unwrap_or_default();
        let mut user = data.get("attributes").cloned().unwrap_or_else(|| json!({}));

        let patrons = raw
            .get("included")
            .and_then(|v| v.as_array())
            .and_then(|inc| {
                inc.iter()
                    .find(|item| item.get("type").and_then(|t| t.as_str()) == Some("campaign"))
            })
            .and_then(|c| c.pointer("/attributes/patron_count"))
            .cloned();

        if let Some(obj) = user.as_object_mut() {
            if let Some(id) = data.get("id") {
                obj.insert("id".to_string(), id.clone());
            }
            if let Some(p) = patrons {
                obj.insert("patron_count".to_string(), p);
            }
        }
        user
    }
}

pub struct TikTokStrategy;

impl ProviderStrategy for TikTokStrategy {
    fn client_id_param(&self) -> &'static str {
        "client_key"
    }

    fn shape_user_info(&self, raw: Value) -> Value {
        raw.pointer("/data/user").cloned().unwrap_or(raw)
    }
}

pub struct UnsplashStrategy;

#[async_trait]
impl ProviderStrategy for UnsplashStrategy {
    /// `/me` has no download totals; those come from the statistics endpoint.
    async fn enrich_user_info(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        token: &str,
        mut info: Value,
    ) -> Result<Value, AppError> {
        let Some(username) = info.get("username").and_then(|v| v.as_str()).map(str::to_string)
        else {
            return Ok(info);
        };

        let url = format!(
            "{}/users/{}/statistics",
            d.api_url,
            urlencoding::encode(&username)
        );
        let opts = self.authorize_request(d, token, FetchOptions::get());
        let stats = get_json(http, d.id, &url, opts).await?;

        if let (Some(total), Some(obj)) = (
            stats.pointer("/downloads/total").cloned(),
            info.as_object_mut(),
        ) {
            obj.insert("downloads".to_string(), total);
        }
        Ok(info)
    }
}
