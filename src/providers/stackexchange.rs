// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stack Exchange: one account spans many sites.
//!
//! The token and application key travel as query parameters. Accounts are
//! listed with `/me/associated` (paged with `has_more`), then the
//! highest-reputation site's `/me` fills in the display fields.

use super::strategy::{identify, ProviderStrategy, UserInfo};
use super::ProviderDescriptor;
use crate::error::AppError;
use crate::services::http::{get_json, FetchOptions, HttpClient};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Upper bound on `/me/associated` pages.
const MAX_ASSOCIATED_PAGES: u32 = 5;

pub struct StackExchangeStrategy;

/// API `site` parameter from a site URL (`https://stackoverflow.com` → `stackoverflow.com`).
pub fn site_param(site_url: &str) -> &str {
    site_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

/// Index of the highest-reputation item.
fn top_index(items: &[Value]) -> Option<usize> {
    items
        .iter()
        .enumerate()
        .max_by_key(|(_, item)| item.get("reputation").and_then(|r| r.as_i64()).unwrap_or(0))
        .map(|(i, _)| i)
}

#[async_trait]
impl ProviderStrategy for StackExchangeStrategy {
    fn authorize_request(
        &self,
        d: &ProviderDescriptor,
        token: &str,
        opts: FetchOptions,
    ) -> FetchOptions {
        let opts = opts.query("access_token", token);
        match &d.api_key {
            Some(key) => opts.query("key", key.clone()),
            None => opts,
        }
    }

    async fn fetch_user_info(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        token: &str,
    ) -> Result<UserInfo, AppError> {
        let url = format!("{}{}", d.api_url, d.user_info_path);
        let mut items: Vec<Value> = Vec::new();

        for page in 1..=MAX_ASSOCIATED_PAGES {
            let opts = self
                .authorize_request(d, token, FetchOptions::get())
                .query("page", page.to_string());
            let body = get_json(http, d.id, &url, opts).await?;

            if let Some(batch) = body.get("items").and_then(|v| v.as_array()) {
                items.extend(batch.iter().cloned());
            }
            if !body.get("has_more").and_then(|v| v.as_bool()).unwrap_or(false) {
                break;
            }
        }

        if let Some(top) = top_index(&items) {
            let site = items[top]
                .get("site_url")
                .and_then(|v| v.as_str())
                .map(|u| site_param(u).to_string());

            if let Some(site) = site {
                let me_url = format!("{}/me", d.api_url);
                let opts = self
                    .authorize_request(d, token, FetchOptions::get())
                    .query("site", site);
                let me = get_json(http, d.id, &me_url, opts).await?;

                if let (Some(profile), Some(obj)) = (
                    me.pointer("/items/0").and_then(|v| v.as_object()),
                    items[top].as_object_mut(),
                ) {
                    for key in ["display_name", "profile_image", "link", "website_url"] {
                        if let Some(v) = profile.get(key) {
                            obj.insert(key.to_string(), v.clone());
                        }
                    }
                }
            }
        }

        identify(d.id, json!({ "items": items }))
    }
}
