// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Static provider catalog with per-environment overrides.
//!
//! Descriptors are seeded from [`SEED`] when the registry is built. Lookups
//! return a copy with any `INTEGRATION_<PROVIDER>_<FIELD>` override applied,
//! so credentials can differ per deployment without code changes.

use super::ProviderId;
use std::collections::HashMap;
use std::sync::Arc;

/// Behavior switches for a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderFlags {
    /// Identity has to be read from a public page or API instead of OAuth.
    pub needs_scrape_for_user_info: bool,
    /// Connection is proven by a token placed in the user's public bio.
    pub is_manual_validation: bool,
    /// Authorization code flow uses a PKCE S256 challenge.
    pub uses_pkce: bool,
    /// Revoke endpoint always answers 200, so both encodings are sent.
    pub revoke_always_both_encodings: bool,
}

/// Endpoints, credentials and flags for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub name: String,
    pub icon: String,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: Option<String>,
    /// Base URL for API calls (no trailing slash).
    pub api_url: String,
    /// Path (and query) under `api_url` that returns the current user.
    pub user_info_path: String,
    pub client_id: String,
    pub client_secret: String,
    /// Application key sent alongside the user token (StackExchange).
    pub api_key: Option<String>,
    /// Scopes, already joined with the provider's separator
    pub scope: String,
    pub flags: ProviderFlags,
}

struct Seed {
    id: ProviderId,
    name: &'static str,
    icon: &'static str,
    authorize_url: &'static str,
    token_url: &'static str,
    revoke_url: Option<&'static str>,
    api_url: &'static str,
    user_info_path: &'static str,
    scope: &'static str,
    flags: ProviderFlags,
}

const OAUTH: ProviderFlags = ProviderFlags {
    needs_scrape_for_user_info: false,
    is_manual_validation: false,
    uses_pkce: false,
    revoke_always_both_encodings: false,
};

const MANUAL: ProviderFlags = ProviderFlags {
    needs_scrape_for_user_info: true,
    is_manual_validation: true,
    uses_pkce: false,
    revoke_always_both_encodings: false,
};

const SEED: [Seed; 16] = [
    Seed {
        id: ProviderId::GitHub,
        name: "GitHub",
        icon: "github",
        authorize_url: "https://github.com/login/oauth/authorize",
        token_url: "https://github.com/login/oauth/access_token",
        revoke_url: Some("https://api.github.com/applications/{client_id}/token"),
        api_url: "https://api.github.com",
        user_info_path: "/user",
        scope: "read:user",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::GitLab,
        name: "GitLab",
        icon: "gitlab",
        authorize_url: "https://gitlab.com/oauth/authorize",
        token_url: "https://gitlab.com/oauth/token",
        revoke_url: Some("https://gitlab.com/oauth/revoke"),
        api_url: "https://gitlab.com/api/v4",
        user_info_path: "/user",
        scope: "read_user read_api",
        flags: ProviderFlags {
            revoke_always_both_encodings: true,
            ..OAUTH
        },
    },
    Seed {
        id: ProviderId::WakaTime,
        name: "WakaTime",
        icon: "wakatime",
        authorize_url: "https://wakatime.com/oauth/authorize",
        token_url: "https://wakatime.com/oauth/token",
        revoke_url: Some("https://wakatime.com/oauth/revoke"),
        api_url: "https://wakatime.com/api/v1",
        user_info_path: "/users/current",
        scope: "read_stats",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::X,
        name: "X",
        icon: "x",
        authorize_url: "https://twitter.com/i/oauth2/authorize",
        token_url: "https://api.twitter.com/2/oauth2/token",
        revoke_url: Some("https://api.twitter.com/2/oauth2/revoke"),
        api_url: "https://api.twitter.com/2",
        user_info_path: "/users/me?user.fields=public_metrics,profile_image_url,url,name",
        scope: "tweet.read users.read offline.access",
        flags: ProviderFlags {
            uses_pkce: true,
            ..OAUTH
        },
    },
    Seed {
        id: ProviderId::LinkedIn,
        name: "LinkedIn",
        icon: "linkedin",
        authorize_url: "https://www.linkedin.com/oauth/v2/authorization",
        token_url: "https://www.linkedin.com/oauth/v2/accessToken",
        revoke_url: Some("https://www.linkedin.com/oauth/v2/revoke"),
        api_url: "https://api.linkedin.com/v2",
        user_info_path: "/userinfo",
        scope: "openid profile",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::Twitch,
        name: "Twitch",
        icon: "twitch",
        authorize_url: "https://id.twitch.tv/oauth2/authorize",
        token_url: "https://id.twitch.tv/oauth2/token",
        revoke_url: Some("https://id.twitch.tv/oauth2/revoke"),
        api_url: "https://api.twitch.tv/helix",
        user_info_path: "/users",
        scope: "moderator:read:followers",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::YouTube,
        name: "YouTube",
        icon: "youtube",
        authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
        token_url: "https://oauth2.googleapis.com/token",
        revoke_url: Some("https://oauth2.googleapis.com/revoke"),
        api_url: "https://www.googleapis.com/youtube/v3",
        user_info_path: "/channels?part=snippet,statistics&mine=true",
        scope: "https://www.googleapis.com/auth/youtube.readonly",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::Reddit,
        name: "Reddit",
        icon: "reddit",
        authorize_url: "https://www.reddit.com/api/v1/authorize",
        token_url: "https://www.reddit.com/api/v1/access_token",
        revoke_url: Some("https://www.reddit.com/api/v1/revoke_token"),
        api_url: "https://oauth.reddit.com",
        user_info_path: "/api/v1/me",
        scope: "identity",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::Patreon,
        name: "Patreon",
        icon: "patreon",
        authorize_url: "https://www.patreon.com/oauth2/authorize",
        token_url: "https://www.patreon.com/api/oauth2/token",
        revoke_url: None,
        api_url: "https://www.patreon.com/api/oauth2/v2",
        user_info_path: "/identity?include=campaign&fields%5Buser%5D=full_name,image_url,url,vanity&fields%5Bcampaign%5D=patron_count",
        scope: "identity campaigns",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::TikTok,
        name: "TikTok",
        icon: "tiktok",
        authorize_url: "https://www.tiktok.com/v2/auth/authorize/",
        token_url: "https://open.tiktokapis.com/v2/oauth/token/",
        revoke_url: Some("https://open.tiktokapis.com/v2/oauth/revoke/"),
        api_url: "https://open.tiktokapis.com/v2",
        user_info_path: "/user/info/?fields=open_id,avatar_url,display_name,username,follower_count,profile_deep_link",
        scope: "user.info.basic,user.info.profile,user.info.stats",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::Instagram,
        name: "Instagram",
        icon: "instagram",
        authorize_url: "https://www.instagram.com/oauth/authorize",
        token_url: "https://api.instagram.com/oauth/access_token",
        revoke_url: None,
        api_url: "https://graph.instagram.com/v21.0",
        user_info_path: "/me?fields=user_id,username,name,profile_picture_url,followers_count,website",
        scope: "instagram_business_basic",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::Wikipedia,
        name: "Wikipedia",
        icon: "wikipedia",
        authorize_url: "https://meta.wikimedia.org/w/rest.php/oauth2/authorize",
        token_url: "https://meta.wikimedia.org/w/rest.php/oauth2/access_token",
        revoke_url: None,
        api_url: "https://meta.wikimedia.org/w/rest.php",
        user_info_path: "/oauth2/resource/profile",
        scope: "basic",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::HackerNews,
        name: "Hacker News",
        icon: "hackernews",
        authorize_url: "",
        token_url: "",
        revoke_url: None,
        api_url: "https://hacker-news.firebaseio.com/v0",
        user_info_path: "/user/{username}.json",
        scope: "",
        flags: MANUAL,
    },
    Seed {
        id: ProviderId::KoFi,
        name: "Ko-fi",
        icon: "kofi",
        authorize_url: "",
        token_url: "",
        revoke_url: None,
        api_url: "https://ko-fi.com",
        user_info_path: "/{username}",
        scope: "",
        flags: MANUAL,
    },
    Seed {
        id: ProviderId::StackExchange,
        name: "Stack Exchange",
        icon: "stackexchange",
        authorize_url: "https://stackoverflow.com/oauth",
        token_url: "https://stackoverflow.com/oauth/access_token",
        revoke_url: None,
        api_url: "https://api.stackexchange.com/2.3",
        user_info_path: "/me/associated?pagesize=100&types=main_site",
        scope: "no_expiry",
        flags: OAUTH,
    },
    Seed {
        id: ProviderId::Unsplash,
        name: "Unsplash",
        icon: "unsplash",
        authorize_url: "https://unsplash.com/oauth/authorize",
        token_url: "https://unsplash.com/oauth/token",
        revoke_url: None,
        api_url: "https://api.unsplash.com",
        user_info_path: "/me",
        scope: "public",
        flags: OAUTH,
    },
];

/// Function that resolves an override variable by name.
pub type EnvSource = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Read-only provider catalog.
#[derive(Clone)]
pub struct ProviderRegistry {
    descriptors: HashMap<ProviderId, ProviderDescriptor>,
    env: EnvSource,
}

impl ProviderRegistry {
    /// Registry whose overrides come from the process environment.
    pub fn from_env() -> Self {
        Self::with_source(Arc::new(|key: &str| std::env::var(key).ok()))
    }

    /// Registry with an injected override source.
    pub fn with_source(env: EnvSource) -> Self {
        let descriptors = SEED
            .iter()
            .map(|s| {
                (
                    s.id,
                    ProviderDescriptor {
                        id: s.id,
                        name: s.name.to_string(),
                        icon: s.icon.to_string(),
                        authorize_url: s.authorize_url.to_string(),
                        token_url: s.token_url.to_string(),
                        revoke_url: s.revoke_url.map(str::to_string),
                        api_url: s.api_url.to_string(),
                        user_info_path: s.user_info_path.to_string(),
                        client_id: String::new(),
                        client_secret: String::new(),
                        api_key: None,
                        scope: s.scope.to_string(),
                        flags: s.flags,
                    },
                )
            })
            .collect();

        Self { descriptors, env }
    }

    /// Registry with a fixed override map. Used by tests.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self::with_source(Arc::new(move |key: &str| overrides.get(key).cloned()))
    }

    /// Descriptor for `id` with environment overrides applied.
    pub fn lookup(&self, id: ProviderId) -> ProviderDescriptor {
        // Every ProviderId is seeded, so indexing cannot miss.
        let mut d = self.descriptors[&id].clone();
        let prefix = format!("INTEGRATION_{}_", id.env_key());
        let get = |field: &str| {
            (self.env)(&format!("{}{}", prefix, field)).filter(|v| !v.trim().is_empty())
        };

        if let Some(v) = get("CLIENT_ID") {
            d.client_id = v;
        }
        if let Some(v) = get("SECRET") {
            d.client_secret = v;
        }
        if let Some(v) = get("AUTHORIZE_URL") {
            d.authorize_url = v;
        }
        if let Some(v) = get("TOKEN_URL") {
            d.token_url = v;
        }
        if let Some(v) = get("REVOKE_URL") {
            d.revoke_url = Some(v);
        }
        if let Some(v) = get("API_URL") {
            d.api_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("API_KEY") {
            d.api_key = Some(v);
        }
        if let Some(revoke) = d.revoke_url.as_mut() {
            *revoke = revoke.replace("{client_id}", &d.client_id);
        }

        d
    }

    /// Descriptor by slug; `None` for unknown providers.
    pub fn find(&self, slug: &str) -> Option<ProviderDescriptor> {
        ProviderId::from_slug(slug).map(|id| self.lookup(id))
    }

    /// All descriptors, in `ProviderId::ALL` order.
    pub fn all(&self) -> Vec<ProviderDescriptor> {
        ProviderId::ALL.iter().map(|id| self.lookup(*id)).collect()
    }
}
