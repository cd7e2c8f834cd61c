// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! External integration providers.
//!
//! `ProviderId` is the closed set of integrations. Static endpoint data lives
//! in [`registry`]; per-provider protocol differences are expressed as
//! [`strategy::ProviderStrategy`] implementations.

pub mod registry;
pub mod strategy;

mod github;
mod gitlab;
mod manual;
mod oauth;
mod stackexchange;

pub use registry::{ProviderDescriptor, ProviderFlags, ProviderRegistry};
pub use strategy::{
    available_scrapes, strategy_for, ClientAuth, Grant, ProviderStrategy, UserInfo,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported integration providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(feature = "binding-generation", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    GitHub,
    GitLab,
    WakaTime,
    X,
    LinkedIn,
    Twitch,
    YouTube,
    Reddit,
    Patreon,
    TikTok,
    Instagram,
    Wikipedia,
    HackerNews,
    KoFi,
    StackExchange,
    Unsplash,
}

impl ProviderId {
    pub const ALL: [ProviderId; 16] = [
        ProviderId::GitHub,
        ProviderId::GitLab,
        ProviderId::WakaTime,
        ProviderId::X,
        ProviderId::LinkedIn,
        ProviderId::Twitch,
        ProviderId::YouTube,
        ProviderId::Reddit,
        ProviderId::Patreon,
        ProviderId::TikTok,
        ProviderId::Instagram,
        ProviderId::Wikipedia,
        ProviderId::HackerNews,
        ProviderId::KoFi,
        ProviderId::StackExchange,
        ProviderId::Unsplash,
    ];

    /// Lowercase slug used in URLs, storage keys and serialized form.
    pub fn slug(self) -> &'static str {
        match self {
            ProviderId::GitHub => "github",
            ProviderId::GitLab => "gitlab",
            ProviderId::WakaTime => "wakatime",
            ProviderId::X => "x",
            ProviderId::LinkedIn => "linkedin",
            ProviderId::Twitch => "twitch",
            ProviderId::YouTube => "youtube",
            ProviderId::Reddit => "reddit",
            ProviderId::Patreon => "patreon",
            ProviderId::TikTok => "tiktok",
            ProviderId::Instagram => "instagram",
            ProviderId::Wikipedia => "wikipedia",
            ProviderId::HackerNews => "hackernews",
            ProviderId::KoFi => "kofi",
            ProviderId::StackExchange => "stackexchange",
            ProviderId::Unsplash => "unsplash",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.slug() == slug)
    }

    /// Upper-case name used in `INTEGRATION_<PROVIDER>_<FIELD>` overrides.
    pub fn env_key(self) -> String {
        self.slug().to_ascii_uppercase()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ProviderId {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slug(s)
            .ok_or_else(|| crate::error::AppError::NotFound(format!("Unknown provider: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_roundtrip() {
        for p in ProviderId::ALL {
            assert_eq!(ProviderId::from_slug(p.slug()), Some(p));
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.slug()));
        }
    }

    #[test]
    fn test_unknown_slug() {
        assert!(ProviderId::from_slug("myspace").is_none());
        assert!("myspace".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_env_key() {
        assert_eq!(ProviderId::StackExchange.env_key(), "STACKEXCHANGE");
    }
}
