// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Providers without OAuth. Ownership is proven by placing a verification
//! code in the account's public bio, and data is read from public pages.

use super::strategy::{identify, ProviderStrategy, UserInfo};
use super::ProviderDescriptor;
use crate::error::AppError;
use crate::models::Connection;
use crate::services::http::{get_json, transport_error, FetchOptions, HttpClient};
use async_trait::async_trait;
use serde_json::{json, Value};

fn user_url(d: &ProviderDescriptor, username: &str) -> String {
    format!(
        "{}{}",
        d.api_url,
        d.user_info_path
            .replace("{username}", &urlencoding::encode(username))
    )
}

fn not_found(d: &ProviderDescriptor, username: &str) -> AppError {
    AppError::VerificationFailed(format!("{} user '{}' was not found", d.name, username))
}

fn code_missing(d: &ProviderDescriptor) -> AppError {
    AppError::VerificationFailed(format!(
        "Verification code not found in your {} profile. Add it to your bio and try again.",
        d.name
    ))
}

// ─── Hacker News ─────────────────────────────────────────────

pub struct HackerNewsStrategy;

impl HackerNewsStrategy {
    async fn fetch_user(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        username: &str,
    ) -> Result<Option<Value>, AppError> {
        let user = get_json(http, d.id, &user_url(d, username), FetchOptions::get()).await?;
        // Firebase answers `null` for unknown users
        Ok((!user.is_null()).then_some(user))
    }
}

#[async_trait]
impl ProviderStrategy for HackerNewsStrategy {
    async fn refresh_profile(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        conn: &Connection,
    ) -> Result<Value, AppError> {
        self.fetch_user(http, d, &conn.username)
            .await?
            .ok_or_else(|| AppError::provider(d.id, Some(404), "User no longer exists"))
    }

    async fn verify_manual(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        username: &str,
        token: &str,
    ) -> Result<UserInfo, AppError> {
        let user = self
            .fetch_user(http, d, username)
            .await?
            .ok_or_else(|| not_found(d, username))?;

        let about = user.get("about").and_then(|v| v.as_str()).unwrap_or("");
        if !about.contains(token) {
            return Err(code_missing(d));
        }
        identify(d.id, user)
    }
}

// ─── Ko-fi ───────────────────────────────────────────────────

pub struct KoFiStrategy;

/// `name="value"` pairs of one tag's attributes, in order. Values may be
/// double-quoted, single-quoted or bare.
fn tag_attrs(tag: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = tag;
    while let Some(eq) = rest.find('=') {
        let name = rest[..eq]
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let after = rest[eq + 1..].trim_start();

        let (value, remaining) = match after.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &after[1..];
                let Some(end) = body.find(quote) else { break };
                (&body[..end], &body[end + 1..])
            }
            _ => {
                let end = after
                    .find(|c: char| c.is_whitespace() || c == '/')
                    .unwrap_or(after.len());
                (&after[..end], &after[end..])
            }
        };
        attrs.push((name, value.to_string()));
        rest = remaining;
    }
    attrs
}

fn unescape(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
}

/// `content` of the `<meta>` tag whose `property` (or `name`) is `property`,
/// whatever order the attributes appear in.
pub fn meta_content(html: &str, property: &str) -> Option<String> {
    html.split("<meta").skip(1).find_map(|chunk| {
        let attrs = tag_attrs(&chunk[..chunk.find('>')?]);
        let wanted = attrs
            .iter()
            .any(|(k, v)| (k == "property" || k == "name") && v == property);
        if !wanted {
            return None;
        }
        attrs
            .into_iter()
            .find(|(k, _)| k == "content")
            .map(|(_, v)| unescape(&v))
    })
}

/// Number immediately before `label`, e.g. `"1,204 supporters"` → 1204.
pub fn count_before(text: &str, label: &str) -> Option<u64> {
    let idx = text.find(label)?;
    let digits: String = text[..idx]
        .trim_end()
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

/// Profile payload scraped from a Ko-fi page.
pub fn parse_kofi_page(username: &str, html: &str) -> Value {
    let name = meta_content(html, "og:title")
        .map(|t| t.trim_end_matches(" - Ko-fi").trim().to_string());
    json!({
        "username": username,
        "name": name,
        "avatar_url": meta_content(html, "og:image"),
        "supporters": count_before(html, "supporter"),
    })
}

impl KoFiStrategy {
    async fn fetch_page(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        username: &str,
    ) -> Result<Option<String>, AppError> {
        let response = http
            .fetch(&user_url(d, username), FetchOptions::get().not_json())
            .await
            .map_err(|e| transport_error(d.id, e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::provider(d.id, Some(status.as_u16()), "Page fetch failed"));
        }
        let html = response
            .text()
            .await
            .map_err(|e| transport_error(d.id, e))?;
        Ok(Some(html))
    }
}

#[async_trait]
impl ProviderStrategy for KoFiStrategy {
    async fn refresh_profile(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        conn: &Connection,
    ) -> Result<Value, AppError> {
        let html = self
            .fetch_page(http, d, &conn.username)
            .await?
            .ok_or_else(|| AppError::provider(d.id, Some(404), "Page no longer exists"))?;
        Ok(parse_kofi_page(&conn.username, &html))
    }

    async fn verify_manual(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        username: &str,
        token: &str,
    ) -> Result<UserInfo, AppError> {
        let html = self
            .fetch_page(http, d, username)
            .await?
            .ok_or_else(|| not_found(d, username))?;

        if !html.contains(token) {
            return Err(code_missing(d));
        }
        identify(d.id, parse_kofi_page(username, &html))
    }
}
