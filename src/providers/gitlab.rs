// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GitLab: follower count comes from the `X-Total` pagination header.

use super::strategy::ProviderStrategy;
use super::ProviderDescriptor;
use crate::error::AppError;
use crate::services::http::{read_json, transport_error, FetchOptions, HttpClient};
use async_trait::async_trait;
use serde_json::Value;

pub struct GitLabStrategy;

/// Parse a numeric pagination header.
pub fn header_count(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl ProviderStrategy for GitLabStrategy {
    async fn enrich_user_info(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        token: &str,
        mut info: Value,
    ) -> Result<Value, AppError> {
        let Some(id) = info.get("id").and_then(|v| v.as_u64()) else {
            return Ok(info);
        };

        let url = format!("{}/users/{}/followers", d.api_url, id);
        let opts = self
            .authorize_request(d, token, FetchOptions::get())
            .query("per_page", "1");
        let response = http
            .fetch(&url, opts)
            .await
            .map_err(|e| transport_error(d.id, e))?;
        let total = header_count(response.headers(), "x-total");
        // Surface errors; the body itself is not needed
        read_json(d.id, response).await?;

        if let (Some(total), Some(obj)) = (total, info.as_object_mut()) {
            obj.insert("followers".to_string(), total.into());
        }
        Ok(info)
    }
}
