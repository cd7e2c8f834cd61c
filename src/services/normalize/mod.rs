// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection normalizer.
//!
//! Pure functions from a provider payload to the fields every connection
//! exposes: avatar, display name, website, profile URL and badge score.
//! Dispatch is an exhaustive match on [`ProviderInfo`], so adding a provider
//! fails to compile until it is handled here.

pub mod format;
pub mod payload;

use crate::error::AppError;
use crate::models::{Connection, NormalizedConnection};
use crate::providers::ProviderId;
use format::Unit;
use payload::ProviderInfo;
use serde::Serialize;
use serde_json::Value;

/// Score value used when the provider's signal is missing.
pub const MISSING_SCORE: f64 = -1.0;

/// Badge score and its display parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreInfo {
    /// `"{score_text} {suffix_text}"`, empty when the signal is missing
    pub badge_text: String,
    /// Magnitude in the displayed unit
    pub score: f64,
    /// Raw provider signal
    pub score_raw: f64,
    pub score_text: String,
    pub suffix_text: String,
}

impl ScoreInfo {
    pub fn missing() -> Self {
        Self {
            badge_text: String::new(),
            score: MISSING_SCORE,
            score_raw: MISSING_SCORE,
            score_text: String::new(),
            suffix_text: String::new(),
        }
    }
}

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn first_of(candidates: &[&Option<String>]) -> Option<String> {
    candidates.iter().find_map(|c| non_empty(c))
}

/// Normalize a user-entered website to an absolute URL.
fn absolute_url(s: Option<String>) -> Option<String> {
    s.map(|url| {
        if url.starts_with("http://") || url.starts_with("https://") {
            url
        } else {
            format!("https://{}", url)
        }
    })
}

pub fn avatar_url(provider: ProviderId, payload: &Value) -> Option<String> {
    match ProviderInfo::decode(provider, payload) {
        ProviderInfo::GitHub(i) => non_empty(&i.avatar_url),
        ProviderInfo::GitLab(i) => non_empty(&i.avatar_url),
        ProviderInfo::WakaTime(i) => non_empty(&i.photo),
        ProviderInfo::X(i) => non_empty(&i.profile_image_url),
        ProviderInfo::LinkedIn(i) => non_empty(&i.picture),
        ProviderInfo::Twitch(i) => non_empty(&i.profile_image_url),
        ProviderInfo::YouTube(i) => {
            let thumbs = i.snippet.and_then(|s| s.thumbnails).unwrap_or_default();
            first_of(&[
                &thumbs.high.unwrap_or_default().url,
                &thumbs.default.unwrap_or_default().url,
            ])
        }
        // Reddit escapes `&` in image URLs
        ProviderInfo::Reddit(i) => {
            first_of(&[&i.snoovatar_img, &i.icon_img]).map(|u| u.replace("&amp;", "&"))
        }
        ProviderInfo::Patreon(i) => non_empty(&i.image_url),
        ProviderInfo::TikTok(i) => non_empty(&i.avatar_url),
        ProviderInfo::Instagram(i) => non_empty(&i.profile_picture_url),
        ProviderInfo::Wikipedia(_) => None,
        ProviderInfo::HackerNews(_) => None,
        ProviderInfo::KoFi(i) => non_empty(&i.avatar_url),
        ProviderInfo::StackExchange(i) => i.top_site().and_then(|s| non_empty(&s.profile_image)),
        ProviderInfo::Unsplash(i) => {
            let img = i.profile_image.unwrap_or_default();
            first_of(&[&img.large, &img.medium])
        }
    }
}

pub fn display_name(provider: ProviderId, payload: &Value) -> Option<String> {
    match ProviderInfo::decode(provider, payload) {
        ProviderInfo::GitHub(i) => first_of(&[&i.name, &i.login]),
        ProviderInfo::GitLab(i) => first_of(&[&i.name, &i.username]),
        ProviderInfo::WakaTime(i) => first_of(&[&i.display_name, &i.username]),
        ProviderInfo::X(i) => first_of(&[&i.name, &i.username]),
        ProviderInfo::LinkedIn(i) => non_empty(&i.name),
        ProviderInfo::Twitch(i) => first_of(&[&i.display_name, &i.login]),
        ProviderInfo::YouTube(i) => i.snippet.and_then(|s| non_empty(&s.title)),
        ProviderInfo::Reddit(i) => {
            let title = i.subreddit.and_then(|s| non_empty(&s.title));
            title.or_else(|| non_empty(&i.name))
        }
        ProviderInfo::Patreon(i) => first_of(&[&i.full_name, &i.vanity]),
        ProviderInfo::TikTok(i) => first_of(&[&i.display_name, &i.username]),
        ProviderInfo::Instagram(i) => first_of(&[&i.name, &i.username]),
        ProviderInfo::Wikipedia(i) => first_of(&[&i.realname, &i.username]),
        ProviderInfo::HackerNews(i) => non_empty(&i.id),
        ProviderInfo::KoFi(i) => first_of(&[&i.name, &i.username]),
        ProviderInfo::StackExchange(i) => i.top_site().and_then(|s| non_empty(&s.display_name)),
        ProviderInfo::Unsplash(i) => first_of(&[&i.name, &i.username]),
    }
}

pub fn website_url(provider: ProviderId, payload: &Value) -> Option<String> {
    let site = match ProviderInfo::decode(provider, payload) {
        ProviderInfo::GitHub(i) => non_empty(&i.blog),
        ProviderInfo::GitLab(i) => non_empty(&i.website_url),
        ProviderInfo::WakaTime(i) => non_empty(&i.website),
        ProviderInfo::X(i) => non_empty(&i.url),
        ProviderInfo::LinkedIn(_) => None,
        ProviderInfo::Twitch(_) => None,
        ProviderInfo::YouTube(_) => None,
        ProviderInfo::Reddit(_) => None,
        ProviderInfo::Patreon(_) => None,
        ProviderInfo::TikTok(_) => None,
        ProviderInfo::Instagram(i) => non_empty(&i.website),
        ProviderInfo::Wikipedia(_) => None,
        ProviderInfo::HackerNews(_) => None,
        ProviderInfo::KoFi(i) => non_empty(&i.website),
        ProviderInfo::StackExchange(i) => i.top_site().and_then(|s| non_empty(&s.website_url)),
        ProviderInfo::Unsplash(i) => non_empty(&i.portfolio_url),
    };
    absolute_url(site)
}

/// Public profile URL. Errors when the payload lacks the identifying field.
pub fn profile_url(provider: ProviderId, payload: &Value) -> Result<String, AppError> {
    let url = match ProviderInfo::decode(provider, payload) {
        ProviderInfo::GitHub(i) => non_empty(&i.html_url)
            .or_else(|| non_empty(&i.login).map(|l| format!("https://github.com/{}", l))),
        ProviderInfo::GitLab(i) => non_empty(&i.web_url)
            .or_else(|| non_empty(&i.username).map(|u| format!("https://gitlab.com/{}", u))),
        ProviderInfo::WakaTime(i) => non_empty(&i.profile_url)
            .or_else(|| non_empty(&i.username).map(|u| format!("https://wakatime.com/@{}", u))),
        ProviderInfo::X(i) => non_empty(&i.username).map(|u| format!("https://x.com/{}", u)),
        ProviderInfo::LinkedIn(i) => {
            non_empty(&i.vanity_name).map(|v| format!("https://www.linkedin.com/in/{}", v))
        }
        ProviderInfo::Twitch(i) => {
            non_empty(&i.login).map(|l| format!("https://www.twitch.tv/{}", l))
        }
        ProviderInfo::YouTube(i) => {
            let custom = i.snippet.and_then(|s| non_empty(&s.custom_url));
            match custom {
                Some(handle) => Some(format!("https://www.youtube.com/{}", handle)),
                None => non_empty(&i.id).map(|id| format!("https://www.youtube.com/channel/{}", id)),
            }
        }
        ProviderInfo::Reddit(i) => {
            non_empty(&i.name).map(|n| format!("https://www.reddit.com/user/{}", n))
        }
        ProviderInfo::Patreon(i) => non_empty(&i.url)
            .or_else(|| non_empty(&i.vanity).map(|v| format!("https://www.patreon.com/{}", v))),
        ProviderInfo::TikTok(i) => non_empty(&i.username)
            .map(|u| format!("https://www.tiktok.com/@{}", u))
            .or_else(|| non_empty(&i.profile_deep_link)),
        ProviderInfo::Instagram(i) => {
            non_empty(&i.username).map(|u| format!("https://www.instagram.com/{}", u))
        }
        ProviderInfo::Wikipedia(i) => non_empty(&i.username).map(|u| {
            format!(
                "https://en.wikipedia.org/wiki/User:{}",
                urlencoding::encode(&u.replace(' ', "_"))
            )
        }),
        ProviderInfo::HackerNews(i) => {
            non_empty(&i.id).map(|id| format!("https://news.ycombinator.com/user?id={}", id))
        }
        ProviderInfo::KoFi(i) => non_empty(&i.username).map(|u| format!("https://ko-fi.com/{}", u)),
        ProviderInfo::StackExchange(i) => i.top_site().and_then(|s| non_empty(&s.link)),
        ProviderInfo::Unsplash(i) => i
            .links
            .and_then(|l| non_empty(&l.html))
            .or_else(|| non_empty(&i.username).map(|u| format!("https://unsplash.com/@{}", u))),
    };

    url.ok_or_else(|| {
        AppError::BadRequest(format!("{} payload has no profile identity", provider))
    })
}

/// Raw scoring signal and its unit for a provider.
fn signal(provider: ProviderId, payload: &Value) -> Option<(f64, Unit)> {
    use format::*;

    match ProviderInfo::decode(provider, payload) {
        ProviderInfo::GitHub(i) => match (i.stars, i.followers) {
            (Some(s), Some(f)) if f > s => Some((f, FOLLOWERS)),
            (Some(s), _) => Some((s, STARS)),
            (None, Some(f)) => Some((f, FOLLOWERS)),
            (None, None) => None,
        },
        ProviderInfo::GitLab(i) => i.followers.map(|v| (v, FOLLOWERS)),
        // Time-based; handled by the caller
        ProviderInfo::WakaTime(i) => i.total_seconds.map(|v| (v, SECONDS)),
        ProviderInfo::X(i) => i
            .public_metrics
            .and_then(|m| m.followers_count)
            .map(|v| (v, FOLLOWERS)),
        ProviderInfo::LinkedIn(i) => i.followers.map(|v| (v, FOLLOWERS)),
        ProviderInfo::Twitch(i) => i.followers_count.map(|v| (v, FOLLOWERS)),
        ProviderInfo::YouTube(i) => i
            .statistics
            .and_then(|s| s.subscriber_count)
            .map(|v| (v, SUBSCRIBERS)),
        ProviderInfo::Reddit(i) => i
            .total_karma
            .or_else(|| match (i.link_karma, i.comment_karma) {
                (None, None) => None,
                (l, c) => Some(l.unwrap_or(0.0) + c.unwrap_or(0.0)),
            })
            .map(|v| (v, KARMA)),
        ProviderInfo::Patreon(i) => i.patron_count.map(|v| (v, PATRONS)),
        ProviderInfo::TikTok(i) => i.follower_count.map(|v| (v, FOLLOWERS)),
        ProviderInfo::Instagram(i) => i.followers_count.map(|v| (v, FOLLOWERS)),
        ProviderInfo::Wikipedia(i) => i.editcount.map(|v| (v, EDITS)),
        ProviderInfo::HackerNews(i) => i.karma.map(|v| (v, KARMA)),
        ProviderInfo::KoFi(i) => i.supporters.map(|v| (v, SUPPORTERS)),
        ProviderInfo::StackExchange(i) => i.total_reputation().map(|v| (v, REPUTATION)),
        ProviderInfo::Unsplash(i) => i.downloads.map(|v| (v, DOWNLOADS)),
    }
}

fn finite_signal(provider: ProviderId, payload: &Value) -> Option<(f64, Unit)> {
    signal(provider, payload).filter(|(raw, _)| raw.is_finite())
}

/// Raw scoring signal, `None` when the payload lacks it.
pub fn raw_signal(provider: ProviderId, payload: &Value) -> Option<f64> {
    finite_signal(provider, payload).map(|(raw, _)| raw)
}

/// Badge score for a payload.
///
/// `explicit_suffix` replaces the unit label (e.g. a custom badge caption).
pub fn score_info(provider: ProviderId, payload: &Value, explicit_suffix: Option<&str>) -> ScoreInfo {
    let Some((raw, unit)) = finite_signal(provider, payload) else {
        return ScoreInfo::missing();
    };

    // Karma can go negative; badges floor at zero
    let (score, unit, score_text) = if provider == ProviderId::WakaTime {
        let (value, unit) = format::duration_parts(raw.max(0.0));
        (value, unit, format::one_decimal(value))
    } else {
        let value = raw.max(0.0).round();
        (value, unit, format::compact_number(value))
    };

    let suffix_text = explicit_suffix
        .map(str::to_string)
        .unwrap_or_else(|| unit.label(score).to_string());

    ScoreInfo {
        badge_text: format!("{} {}", score_text, suffix_text),
        score,
        score_raw: raw,
        score_text,
        suffix_text,
    }
}

/// Account identity (external ID, username) from a user-info payload.
pub fn external_identity(provider: ProviderId, payload: &Value) -> Option<(String, String)> {
    let pair = |id: &Option<String>, name: &Option<String>| {
        let id = non_empty(id)?;
        let name = non_empty(name).unwrap_or_else(|| id.clone());
        Some((id, name))
    };

    match ProviderInfo::decode(provider, payload) {
        ProviderInfo::GitHub(i) => pair(&i.id, &i.login),
        ProviderInfo::GitLab(i) => pair(&i.id, &i.username),
        ProviderInfo::WakaTime(i) => pair(&i.id, &i.username),
        ProviderInfo::X(i) => pair(&i.id, &i.username),
        ProviderInfo::LinkedIn(i) => pair(&i.sub, &i.vanity_name.clone().or(i.name.clone())),
        ProviderInfo::Twitch(i) => pair(&i.id, &i.login),
        ProviderInfo::YouTube(i) => {
            let handle = i.snippet.as_ref().and_then(|s| s.custom_url.clone());
            pair(&i.id, &handle)
        }
        ProviderInfo::Reddit(i) => pair(&i.id, &i.name),
        ProviderInfo::Patreon(i) => pair(&i.id, &i.vanity.clone().or(i.full_name.clone())),
        ProviderInfo::TikTok(i) => pair(&i.open_id, &i.username),
        ProviderInfo::Instagram(i) => pair(&i.user_id.clone().or(i.id.clone()), &i.username),
        ProviderInfo::Wikipedia(i) => pair(&i.sub, &i.username),
        ProviderInfo::HackerNews(i) => pair(&i.id, &i.id),
        ProviderInfo::KoFi(i) => pair(&i.username, &i.username),
        ProviderInfo::StackExchange(i) => {
            let top = i.top_site()?;
            pair(&top.account_id, &top.display_name)
        }
        ProviderInfo::Unsplash(i) => pair(&i.id, &i.username),
    }
}

/// Derived read view of a stored connection.
pub fn normalize(
    conn: &Connection,
    provider_name: &str,
    max_errors: u32,
) -> NormalizedConnection {
    let payload = &conn.provider_info;
    let score = score_info(conn.provider, payload, None);

    NormalizedConnection {
        id: conn.id.clone(),
        provider: conn.provider,
        provider_name: provider_name.to_string(),
        username: conn.username.clone(),
        avatar_url: avatar_url(conn.provider, payload),
        display_name: display_name(conn.provider, payload),
        website_url: website_url(conn.provider, payload),
        profile_url: profile_url(conn.provider, payload).ok(),
        badge_text: score.badge_text,
        score: score.score,
        score_raw: score.score_raw,
        disabled: conn.error_count > max_errors,
        last_scraped_at: conn.last_scraped_at.map(|t| t.to_rfc3339()),
    }
}
