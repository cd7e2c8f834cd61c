// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-provider protocol behavior.
//!
//! [`ProviderStrategy`] carries the standard OAuth2 behavior as default
//! methods. Providers that deviate override only what differs, and
//! [`strategy_for`] maps every [`ProviderId`] to its implementation.

use super::github::GitHubStrategy;
use super::gitlab::GitLabStrategy;
use super::manual::{HackerNewsStrategy, KoFiStrategy};
use super::oauth::{
    DefaultStrategy, PatreonStrategy, RedditStrategy, TikTokStrategy, TwitchStrategy,
    UnsplashStrategy, WakaTimeStrategy, XStrategy, YouTubeStrategy,
};
use super::stackexchange::StackExchangeStrategy;
use super::{ProviderDescriptor, ProviderId};
use crate::error::AppError;
use crate::models::{Connection, ScrapeType};
use crate::services::http::{get_json, FetchOptions, HttpClient};
use crate::services::normalize::external_identity;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::Method;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Identity and payload returned by a user-info fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub external_id: String,
    pub username: String,
    /// Shaped payload stored as the connection's `provider_info`
    pub info: Value,
}

/// How client credentials are sent to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// `client_id` / `client_secret` form fields
    Body,
    /// HTTP Basic with `client_id:client_secret`
    Basic,
}

/// Token endpoint grant.
#[derive(Debug, Clone)]
pub enum Grant<'a> {
    AuthorizationCode {
        code: &'a str,
        redirect_uri: &'a str,
        code_verifier: Option<&'a str>,
    },
    Refresh {
        refresh_token: &'a str,
    },
}

/// PKCE S256 challenge for a verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Build a [`UserInfo`] from a shaped payload.
pub fn identify(provider: ProviderId, info: Value) -> Result<UserInfo, AppError> {
    let (external_id, username) = external_identity(provider, &info).ok_or_else(|| {
        AppError::provider(provider, None, "User info response has no account id")
    })?;
    Ok(UserInfo {
        external_id,
        username,
        info,
    })
}

#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    // ─── Authorization ───────────────────────────────────────

    /// Browser redirect URL that starts the authorization code flow.
    fn authorize_url(
        &self,
        d: &ProviderDescriptor,
        redirect_uri: &str,
        state: &str,
        csrf: &str,
    ) -> String {
        let mut params: Vec<(&str, String)> = vec![
            (self.client_id_param(), d.client_id.clone()),
            ("redirect_uri", redirect_uri.to_string()),
            ("response_type", "code".to_string()),
            ("scope", d.scope.clone()),
            ("state", state.to_string()),
        ];
        if d.flags.uses_pkce {
            params.push(("code_challenge", pkce_challenge(csrf)));
            params.push(("code_challenge_method", "S256".to_string()));
        }
        params.extend(
            self.extra_authorize_params()
                .iter()
                .map(|(k, v)| (*k, v.to_string())),
        );

        let query = serde_urlencoded::to_string(&params).unwrap_or_default();
        let sep = if d.authorize_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", d.authorize_url, sep, query)
    }

    fn extra_authorize_params(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Name of the client id parameter.
    fn client_id_param(&self) -> &'static str {
        "client_id"
    }

    // ─── Tokens ──────────────────────────────────────────────

    fn client_auth(&self) -> ClientAuth {
        ClientAuth::Body
    }

    /// Form fields for a token endpoint call.
    fn token_params(
        &self,
        _d: &ProviderDescriptor,
        client_id: &str,
        secret: &str,
        grant: &Grant<'_>,
    ) -> Vec<(String, String)> {
        let mut params = match grant {
            Grant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                let mut p = vec![
                    ("grant_type".to_string(), "authorization_code".to_string()),
                    ("code".to_string(), code.to_string()),
                    ("redirect_uri".to_string(), redirect_uri.to_string()),
                ];
                if let Some(v) = code_verifier {
                    p.push(("code_verifier".to_string(), v.to_string()));
                }
                p
            }
            Grant::Refresh { refresh_token } => vec![
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("refresh_token".to_string(), refresh_token.to_string()),
            ],
        };

        if self.client_auth() == ClientAuth::Body {
            params.push((self.client_id_param().to_string(), client_id.to_string()));
            params.push(("client_secret".to_string(), secret.to_string()));
        }
        params
    }

    /// HTTP method for the revoke endpoint.
    fn revoke_method(&self) -> Method {
        Method::POST
    }

    // ─── API calls ───────────────────────────────────────────

    /// Attach the user's token to an API request.
    fn authorize_request(
        &self,
        _d: &ProviderDescriptor,
        token: &str,
        opts: FetchOptions,
    ) -> FetchOptions {
        opts.bearer(token)
    }

    /// Reduce the raw user-info response to the stored payload shape.
    fn shape_user_info(&self, raw: Value) -> Value {
        raw
    }

    /// Extra calls that fill fields the user-info endpoint lacks.
    async fn enrich_user_info(
        &self,
        _http: &HttpClient,
        _d: &ProviderDescriptor,
        _token: &str,
        info: Value,
    ) -> Result<Value, AppError> {
        Ok(info)
    }

    /// Fetch the current user with an access token.
    async fn fetch_user_info(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        token: &str,
    ) -> Result<UserInfo, AppError> {
        let url = format!("{}{}", d.api_url, d.user_info_path);
        let opts = self.authorize_request(d, token, FetchOptions::get());
        let raw = get_json(http, d.id, &url, opts).await?;
        let info = self.shape_user_info(raw);
        let info = self.enrich_user_info(http, d, token, info).await?;
        identify(d.id, info)
    }

    /// Fresh profile payload for an existing connection.
    async fn refresh_profile(
        &self,
        http: &HttpClient,
        d: &ProviderDescriptor,
        conn: &Connection,
    ) -> Result<Value, AppError> {
        Ok(self.fetch_user_info(http, d, &conn.access_token).await?.info)
    }

    /// Prove ownership of `username` by finding `token` in its public bio.
    async fn verify_manual(
        &self,
        _http: &HttpClient,
        d: &ProviderDescriptor,
        _username: &str,
        _token: &str,
    ) -> Result<UserInfo, AppError> {
        Err(AppError::BadRequest(format!(
            "{} does not support manual verification",
            d.name
        )))
    }
}

static DEFAULT: DefaultStrategy = DefaultStrategy;
static GITHUB: GitHubStrategy = GitHubStrategy;
static GITLAB: GitLabStrategy = GitLabStrategy;
static WAKATIME: WakaTimeStrategy = WakaTimeStrategy;
static X: XStrategy = XStrategy;
static TWITCH: TwitchStrategy = TwitchStrategy;
static YOUTUBE: YouTubeStrategy = YouTubeStrategy;
static REDDIT: RedditStrategy = RedditStrategy;
static PATREON: PatreonStrategy = PatreonStrategy;
static TIKTOK: TikTokStrategy = TikTokStrategy;
static HACKERNEWS: HackerNewsStrategy = HackerNewsStrategy;
static KOFI: KoFiStrategy = KoFiStrategy;
static STACKEXCHANGE: StackExchangeStrategy = StackExchangeStrategy;
static UNSPLASH: UnsplashStrategy = UnsplashStrategy;

/// Strategy implementation for a provider.
pub fn strategy_for(provider: ProviderId) -> &'static dyn ProviderStrategy {
    match provider {
        ProviderId::GitHub => &GITHUB,
        ProviderId::GitLab => &GITLAB,
        ProviderId::WakaTime => &WAKATIME,
        ProviderId::X => &X,
        ProviderId::LinkedIn => &DEFAULT,
        ProviderId::Twitch => &TWITCH,
        ProviderId::YouTube => &YOUTUBE,
        ProviderId::Reddit => &REDDIT,
        ProviderId::Patreon => &PATREON,
        ProviderId::TikTok => &TIKTOK,
        ProviderId::Instagram => &DEFAULT,
        ProviderId::Wikipedia => &DEFAULT,
        ProviderId::HackerNews => &HACKERNEWS,
        ProviderId::KoFi => &KOFI,
        ProviderId::StackExchange => &STACKEXCHANGE,
        ProviderId::Unsplash => &UNSPLASH,
    }
}

/// Scrape types a provider supports.
pub fn available_scrapes(provider: ProviderId) -> &'static [ScrapeType] {
    const CODE_HOST: &[ScrapeType] = &[
        ScrapeType::Profile,
        ScrapeType::Repos,
        ScrapeType::Timeline,
        ScrapeType::Milestones,
    ];
    const CODING_TIME: &[ScrapeType] = &[
        ScrapeType::Profile,
        ScrapeType::Summary,
        ScrapeType::Milestones,
    ];
    const BASIC: &[ScrapeType] = &[ScrapeType::Profile, ScrapeType::Milestones];

    match provider {
        ProviderId::GitHub | ProviderId::GitLab => CODE_HOST,
        ProviderId::WakaTime => CODING_TIME,
        ProviderId::X
        | ProviderId::LinkedIn
        | ProviderId::Twitch
        | ProviderId::YouTube
        | ProviderId::Reddit
        | ProviderId::Patreon
        | ProviderId::TikTok
        | ProviderId::Instagram
        | ProviderId::Wikipedia
        | ProviderId::HackerNews
        | ProviderId::KoFi
        | ProviderId::StackExchange
        | ProviderId::Unsplash => BASIC,
    }
}
