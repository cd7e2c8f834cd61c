// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GitHub: stars from owned repos, DELETE-based revoke.

use super::strategy::ProviderStrategy;
use super::ProviderDescriptor;
use crate::error::AppError;
use crate::services::http::{get_json, FetchOptions, HttpClient};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

pub struct GitHubStrategy;

/// Sum of stargazers over owned, non-fork repos in a `/repos` page.
pub fn sum_stars(repos: &Value) -> u64 {
    repos
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|r| !r.get("fork").and_then(|f| f.as_bool()).unwrap_or(false))
                .filter_map(|r| r.get("stargazers_count").and_then(|s| s.as_u64()))
                .sum()
        })
        .unwrap_or(0)
}

#[async_trait]
impl ProviderStrategy for GitHubStrategy {
    /// `DELETE /applications/{client_id}/token` with Basic client auth.
    fn revoke_method(&self) -> Method {
        Method::DELETE
    }

    fn authorize_request(
        &self,
        _d: &ProviderDescriptor,
        token: &str,
        opts: FetchOptions,
    ) -> FetchOptions {
        opts.bearer(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// First page of owned repos is enough for an initial star count; the
    /// repos scrape walks every page later.
    async fn enrich_user_info(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        token: &str,
        mut info: Value,
    ) -> Result<Value, AppError> {
        let Some(login) = info.get("login").and_then(|v| v.as_str()).map(str::to_string) else {
            return Ok(info);
        };

        let url = format!("{}/users/{}/repos", d.api_url, urlencoding::encode(&login));
        let opts = self
            .authorize_request(d, token, FetchOptions::get())
            .query("type", "owner")
            .query("per_page", "100");
        let repos = get_json(http, d.id, &url, opts).await?;

        if let Some(obj) = info.as_object_mut() {
            obj.insert("stars".to_string(), sum_stars(&repos).into());
        }
        Ok(info)
    }
}
