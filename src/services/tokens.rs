// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token lifecycle: code exchange, refresh, revoke.
//!
//! Providers disagree on request and response encodings, so every call
//! tries the common encoding first and falls back to the other one. No
//! retries beyond that single fallback.

use crate::db::{ConnectionStore, TokenUpdate};
use crate::error::AppError;
use crate::models::Connection;
use crate::providers::{strategy_for, ClientAuth, Grant, ProviderDescriptor, ProviderId};
use crate::services::http::{transport_error, FetchOptions, HttpClient};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Written over both tokens once a provider rejects the refresh token.
pub const INVALID_TOKEN_SENTINEL: &str = "invalid";

/// Tokens extracted from a token endpoint response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider account ID when the token response carries one
    pub uid: Option<String>,
}

/// Authorization code callback parameters.
#[derive(Debug, Clone)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
    pub redirect_uri: &'a str,
    /// CSRF cookie value; doubles as the PKCE verifier
    pub csrf: Option<&'a str>,
}

/// Result of [`TokenManager::refresh_if_needed`].
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Token still valid or not refreshable
    NotNeeded,
    /// New tokens persisted; the updated connection
    Refreshed(Connection),
    /// Refresh failed for another reason; the stale token is kept
    Failed,
    /// Provider rejected the refresh token; tokens now hold the sentinel
    TokenInvalidated,
    /// Remote account is gone; the connection was deleted
    AccountDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshFailure {
    InvalidToken,
    AccountDeleted,
    Other,
}

/// Classify a failed refresh response body.
fn classify_refresh_failure(body: &str) -> RefreshFailure {
    let body = body.to_ascii_lowercase();
    if body.contains("refresh_token is invalid") || body.contains("invalid refresh token") {
        RefreshFailure::InvalidToken
    } else if body.contains("account_not_found")
        || body.contains("user_not_found")
        || body.contains("account does not exist")
    {
        RefreshFailure::AccountDeleted
    } else {
        RefreshFailure::Other
    }
}

// ─── Response parsing ────────────────────────────────────────

/// Integer from a JSON number or numeric string.
fn number(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn non_empty_str(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Token response body as a flat field map: JSON first, then form-urlencoded.
fn body_fields(body: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        return Some(map);
    }
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body.trim()).ok()?;
    Some(
        pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    )
}

/// Parse a token endpoint body. `None` when no access token is present.
///
/// `expires_at` (absolute seconds) wins over `expires_in` / `expires`
/// (seconds relative to `now`).
pub fn parse_token_body(provider: ProviderId, body: &str, now: DateTime<Utc>) -> Option<ParsedToken> {
    let Some(fields) = body_fields(body) else {
        tracing::warn!(provider = %provider, "Token response is neither JSON nor form data");
        return None;
    };

    let Some(access_token) = non_empty_str(&fields, "access_token") else {
        tracing::warn!(provider = %provider, "Token response has no access_token");
        return None;
    };

    let expires_at = fields
        .get("expires_at")
        .and_then(number)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| {
            fields
                .get("expires_in")
                .or_else(|| fields.get("expires"))
                .and_then(number)
                .filter(|secs| *secs > 0)
                .map(|secs| now + chrono::Duration::seconds(secs))
        });

    let uid = ["uid", "user_id", "open_id", "x_user_id"]
        .iter()
        .find_map(|key| match fields.get(*key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    Some(ParsedToken {
        access_token,
        refresh_token: non_empty_str(&fields, "refresh_token"),
        expires_at,
        uid,
    })
}

/// Read and parse a token endpoint response.
pub async fn parse_access_token(
    provider: ProviderId,
    response: reqwest::Response,
    now: DateTime<Utc>,
) -> Option<ParsedToken> {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "Failed to read token response");
            return None;
        }
    };
    if !status.is_success() {
        tracing::warn!(provider = %provider, status = status.as_u16(), "Token endpoint returned error");
    }
    parse_token_body(provider, &body, now)
}

// ─── Token manager ───────────────────────────────────────────

/// Token endpoint client.
#[derive(Clone)]
pub struct TokenManager {
    http: HttpClient,
    store: Arc<dyn ConnectionStore>,
}

impl TokenManager {
    pub fn new(http: HttpClient, store: Arc<dyn ConnectionStore>) -> Self {
        Self { http, store }
    }

    fn with_client_auth(&self, d: &ProviderDescriptor, opts: FetchOptions) -> FetchOptions {
        match strategy_for(d.id).client_auth() {
            ClientAuth::Basic => opts.basic(d.client_id.clone(), d.client_secret.clone()),
            ClientAuth::Body => opts,
        }
    }

    /// POST to the token endpoint as multipart, then as urlencoded form if
    /// the provider answers with a status of 300 or above.
    async fn post_token(
        &self,
        d: &ProviderDescriptor,
        params: Vec<(String, String)>,
    ) -> Result<reqwest::Response, AppError> {
        let opts = self.with_client_auth(d, FetchOptions::post().multipart(params.clone()));
        let response = self
            .http
            .fetch(&d.token_url, opts)
            .await
            .map_err(|e| transport_error(d.id, e))?;

        if response.status().as_u16() < 300 {
            return Ok(response);
        }

        tracing::debug!(
            provider = %d.id,
            status = response.status().as_u16(),
            "Multipart token request rejected, retrying as form"
        );

        let opts = self.with_client_auth(d, FetchOptions::post().form(params));
        self.http
            .fetch(&d.token_url, opts)
            .await
            .map_err(|e| transport_error(d.id, e))
    }

    /// Exchange an authorization code.
    pub async fn exchange_code(
        &self,
        d: &ProviderDescriptor,
        req: &ExchangeRequest<'_>,
    ) -> Result<reqwest::Response, AppError> {
        let code_verifier = if d.flags.uses_pkce { req.csrf } else { None };
        let grant = Grant::AuthorizationCode {
            code: req.code,
            redirect_uri: req.redirect_uri,
            code_verifier,
        };
        let params = strategy_for(d.id).token_params(d, &d.client_id, &d.client_secret, &grant);
        self.post_token(d, params).await
    }

    /// Exchange a refresh token.
    pub async fn refresh_token(
        &self,
        d: &ProviderDescriptor,
        refresh_token: &str,
    ) -> Result<reqwest::Response, AppError> {
        let grant = Grant::Refresh { refresh_token };
        let params = strategy_for(d.id).token_params(d, &d.client_id, &d.client_secret, &grant);
        self.post_token(d, params).await
    }

    /// Revoke `token`. Returns whether any attempt succeeded.
    ///
    /// Form encoding first, then JSON with Basic auth. Providers flagged
    /// `revoke_always_both_encodings` answer 200 either way, so both are sent.
    pub async fn revoke(&self, d: &ProviderDescriptor, token: &str) -> bool {
        let Some(url) = d.revoke_url.as_deref() else {
            return false;
        };
        let method = strategy_for(d.id).revoke_method();

        let form = FetchOptions::method(method.clone()).form(vec![
            ("token".to_string(), token.to_string()),
            ("client_id".to_string(), d.client_id.clone()),
            ("client_secret".to_string(), d.client_secret.clone()),
        ]);
        let form_ok = match self.http.fetch(url, form).await {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                tracing::debug!(provider = %d.id, status = r.status().as_u16(), "Form revoke rejected");
                false
            }
            Err(e) => {
                tracing::warn!(provider = %d.id, error = %e, "Form revoke failed");
                false
            }
        };

        if form_ok && !d.flags.revoke_always_both_encodings {
            return true;
        }

        let json = FetchOptions::method(method)
            .json(serde_json::json!({ "token": token, "access_token": token }))
            .basic(d.client_id.clone(), d.client_secret.clone());
        let json_ok = match self.http.fetch(url, json).await {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                tracing::warn!(provider = %d.id, status = r.status().as_u16(), "Token revoke rejected");
                false
            }
            Err(e) => {
                tracing::warn!(provider = %d.id, error = %e, "Token revoke failed");
                false
            }
        };

        form_ok || json_ok
    }

    /// Refresh the connection's token if it has expired.
    ///
    /// Only store errors propagate. Provider failures map to a
    /// [`RefreshOutcome`] and the caller carries on.
    pub async fn refresh_if_needed(
        &self,
        d: &ProviderDescriptor,
        conn: &Connection,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, AppError> {
        if conn.refresh_token.as_deref() == Some(INVALID_TOKEN_SENTINEL)
            || conn.access_token == INVALID_TOKEN_SENTINEL
        {
            return Ok(RefreshOutcome::TokenInvalidated);
        }
        let Some(refresh_token) = conn.refresh_token.as_deref() else {
            return Ok(RefreshOutcome::NotNeeded);
        };
        if !conn.is_expired(now) {
            return Ok(RefreshOutcome::NotNeeded);
        }

        tracing::debug!(connection_id = %conn.id, provider = %d.id, "Refreshing expired token");

        let response = match self.refresh_token(d, refresh_token).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(connection_id = %conn.id, error = %e, "Token refresh request failed");
                return Ok(RefreshOutcome::Failed);
            }
        };
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            if let Some(parsed) = parse_token_body(d.id, &body, now) {
                let update = TokenUpdate {
                    access_token: parsed.access_token,
                    refresh_token: parsed
                        .refresh_token
                        .or_else(|| conn.refresh_token.clone()),
                    expires_at: parsed.expires_at,
                };
                self.store.set_tokens(&conn.id, &update).await?;

                let mut updated = conn.clone();
                updated.access_token = update.access_token;
                updated.refresh_token = update.refresh_token;
                updated.expires_at = update.expires_at;
                tracing::info!(connection_id = %conn.id, provider = %d.id, "Token refreshed");
                return Ok(RefreshOutcome::Refreshed(updated));
            }
        }

        match classify_refresh_failure(&body) {
            RefreshFailure::InvalidToken => {
                tracing::warn!(connection_id = %conn.id, provider = %d.id, "Refresh token rejected, marking invalid");
                let update = TokenUpdate {
                    access_token: INVALID_TOKEN_SENTINEL.to_string(),
                    refresh_token: Some(INVALID_TOKEN_SENTINEL.to_string()),
                    expires_at: None,
                };
                self.store.set_tokens(&conn.id, &update).await?;
                Ok(RefreshOutcome::TokenInvalidated)
            }
            RefreshFailure::AccountDeleted => {
                tracing::warn!(connection_id = %conn.id, provider = %d.id, "Remote account deleted, removing connection");
                self.store.delete_connection(&conn.id).await?;
                Ok(RefreshOutcome::AccountDeleted)
            }
            RefreshFailure::Other => {
                tracing::warn!(
                    connection_id = %conn.id,
                    provider = %d.id,
                    status = status.as_u16(),
                    "Token refresh failed, keeping stale token"
                );
                Ok(RefreshOutcome::Failed)
            }
        }
    }
}
