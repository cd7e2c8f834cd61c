// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed views over stored provider payloads.
//!
//! Every field is optional and counts accept numbers or numeric strings.
//! A field of the wrong type decodes as `None`; a payload that is not an
//! object decodes to the all-`None` default. Decoding never fails.

use crate::providers::ProviderId;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Accept `12`, `12.0` or `"12"`; anything else is `None`.
pub(crate) fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept strings or numbers as identifiers.
pub(crate) fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubInfo {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub login: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub blog: Option<String>,
    pub html_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub followers: Option<f64>,
    /// Sum of stargazers over owned repos, filled in by the repos scrape
    #[serde(default, deserialize_with = "lenient_count")]
    pub stars: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitLabInfo {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub web_url: Option<String>,
    pub website_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub followers: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WakaTimeInfo {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub photo: Option<String>,
    pub website: Option<String>,
    pub profile_url: Option<String>,
    /// All-time coding seconds, filled in by the summary scrape
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct XPublicMetrics {
    #[serde(default, deserialize_with = "lenient_count")]
    pub followers_count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct XInfo {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
    pub profile_image_url: Option<String>,
    pub url: Option<String>,
    pub public_metrics: Option<XPublicMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkedInInfo {
    pub sub: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub vanity_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub followers: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwitchInfo {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub login: Option<String>,
    pub display_name: Option<String>,
    pub profile_image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub followers_count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YouTubeThumbnail {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YouTubeThumbnails {
    pub high: Option<YouTubeThumbnail>,
    pub default: Option<YouTubeThumbnail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeSnippet {
    pub title: Option<String>,
    pub custom_url: Option<String>,
    pub thumbnails: Option<YouTubeThumbnails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeStatistics {
    #[serde(default, deserialize_with = "lenient_count")]
    pub subscriber_count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YouTubeInfo {
    pub id: Option<String>,
    pub snippet: Option<YouTubeSnippet>,
    pub statistics: Option<YouTubeStatistics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditSubreddit {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub icon_img: Option<String>,
    pub snoovatar_img: Option<String>,
    pub subreddit: Option<RedditSubreddit>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_karma: Option<f64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub link_karma: Option<f64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub comment_karma: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatreonInfo {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub full_name: Option<String>,
    pub vanity: Option<String>,
    pub image_url: Option<String>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub patron_count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TikTokInfo {
    pub open_id: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_deep_link: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub follower_count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstagramInfo {
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub website: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub followers_count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WikipediaInfo {
    #[serde(default, deserialize_with = "lenient_id")]
    pub sub: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub editcount: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HackerNewsInfo {
    pub id: Option<String>,
    pub about: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub karma: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KoFiInfo {
    pub username: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub website: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub supporters: Option<f64>,
}

/// One row of `/me/associated` merged with the site's `/me` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StackExchangeSite {
    #[serde(default, deserialize_with = "lenient_id")]
    pub account_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: Option<String>,
    pub site_name: Option<String>,
    pub site_url: Option<String>,
    pub display_name: Option<String>,
    pub profile_image: Option<String>,
    pub link: Option<String>,
    pub website_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub reputation: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct StackExchangeInfo {
    pub sites: Vec<StackExchangeSite>,
}

impl StackExchangeInfo {
    /// Site with the highest reputation; its fields are shown for the account.
    pub fn top_site(&self) -> Option<&StackExchangeSite> {
        self.sites.iter().max_by(|a, b| {
            a.reputation
                .unwrap_or(0.0)
                .total_cmp(&b.reputation.unwrap_or(0.0))
        })
    }

    /// Reputation summed across sites; `None` when no site reports one.
    pub fn total_reputation(&self) -> Option<f64> {
        let reps: Vec<f64> = self.sites.iter().filter_map(|s| s.reputation).collect();
        (!reps.is_empty()).then(|| reps.iter().sum())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnsplashProfileImage {
    pub large: Option<String>,
    pub medium: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnsplashLinks {
    pub html: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnsplashInfo {
    pub id: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
    pub portfolio_url: Option<String>,
    pub profile_image: Option<UnsplashProfileImage>,
    pub links: Option<UnsplashLinks>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub downloads: Option<f64>,
}

/// Provider payload decoded into its provider's shape.
#[derive(Debug, Clone)]
pub enum ProviderInfo {
    GitHub(GitHubInfo),
    GitLab(GitLabInfo),
    WakaTime(WakaTimeInfo),
    X(XInfo),
    LinkedIn(LinkedInInfo),
    Twitch(TwitchInfo),
    YouTube(YouTubeInfo),
    Reddit(RedditInfo),
    Patreon(PatreonInfo),
    TikTok(TikTokInfo),
    Instagram(InstagramInfo),
    Wikipedia(WikipediaInfo),
    HackerNews(HackerNewsInfo),
    KoFi(KoFiInfo),
    StackExchange(StackExchangeInfo),
    Unsplash(UnsplashInfo),
}

/// Decode `payload`, dropping fields whose type does not match instead of
/// discarding the whole payload.
fn lenient<T: DeserializeOwned + Default>(payload: &Value) -> T {
    if let Ok(decoded) = T::deserialize(payload) {
        return decoded;
    }
    let Value::Object(fields) = payload else {
        return T::default();
    };

    // Every field is optional, so a one-field object decodes iff that field does
    let kept: Map<String, Value> = fields
        .iter()
        .filter(|(key, value)| {
            let mut single = Map::new();
            single.insert((*key).clone(), (*value).clone());
            T::deserialize(&Value::Object(single)).is_ok()
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    T::deserialize(&Value::Object(kept)).unwrap_or_default()
}

impl ProviderInfo {
    /// Decode a stored payload. Never fails.
    pub fn decode(provider: ProviderId, payload: &Value) -> Self {
        match provider {
            ProviderId::GitHub => Self::GitHub(lenient(payload)),
            ProviderId::GitLab => Self::GitLab(lenient(payload)),
            ProviderId::WakaTime => Self::WakaTime(lenient(payload)),
            ProviderId::X => Self::X(lenient(payload)),
            ProviderId::LinkedIn => Self::LinkedIn(lenient(payload)),
            ProviderId::Twitch => Self::Twitch(lenient(payload)),
            ProviderId::YouTube => Self::YouTube(lenient(payload)),
            ProviderId::Reddit => Self::Reddit(lenient(payload)),
            ProviderId::Patreon => Self::Patreon(lenient(payload)),
            ProviderId::TikTok => Self::TikTok(lenient(payload)),
            ProviderId::Instagram => Self::Instagram(lenient(payload)),
            ProviderId::Wikipedia => Self::Wikipedia(lenient(payload)),
            ProviderId::HackerNews => Self::HackerNews(lenient(payload)),
            ProviderId::KoFi => Self::KoFi(lenient(payload)),
            ProviderId::StackExchange => {
                // Stored either as the raw item array or as `{ "items": [...] }`
                let items = payload.get("items").unwrap_or(payload);
                let sites: Vec<StackExchangeSite> = items
                    .as_array()
                    .map(|rows| rows.iter().map(lenient).collect())
                    .unwrap_or_default();
                Self::StackExchange(StackExchangeInfo { sites })
            }
            ProviderId::Unsplash => Self::Unsplash(lenient(payload)),
        }
    }
}
