// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Repository summaries collected by the repos scrape.

use serde::{Deserialize, Serialize};

/// Stars, watchers or forks at or above this make a repo significant.
pub const SIGNIFICANT_POPULARITY: u64 = 10;
/// Contributors at or above this make a public non-fork repo significant.
pub const SIGNIFICANT_CONTRIBUTORS: u64 = 3;

/// Provider-neutral repository record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RepoSummary {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub stargazers: u64,
    #[serde(default)]
    pub watchers: u64,
    #[serde(default)]
    pub forks: u64,
    /// Unknown for private repos and before the contributor lookup runs
    #[serde(default)]
    pub contributors: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub pushed_at: Option<String>,
}

impl RepoSummary {
    /// Parse a GitHub `/users/{user}/repos` item.
    pub fn from_github(v: &serde_json::Value) -> Option<Self> {
        Some(Self {
            name: v.get("name")?.as_str()?.to_string(),
            full_name: v.get("full_name")?.as_str()?.to_string(),
            html_url: str_field(v, "html_url").unwrap_or_default(),
            description: str_field(v, "description"),
            language: str_field(v, "language"),
            private: v.get("private").and_then(|x| x.as_bool()).unwrap_or(false),
            fork: v.get("fork").and_then(|x| x.as_bool()).unwrap_or(false),
            stargazers: u64_field(v, "stargazers_count"),
            watchers: u64_field(v, "watchers_count"),
            forks: u64_field(v, "forks_count"),
            contributors: None,
            created_at: str_field(v, "created_at"),
            pushed_at: str_field(v, "pushed_at"),
        })
    }

    /// Parse a GitLab `/users/{id}/projects` item.
    pub fn from_gitlab(v: &serde_json::Value) -> Option<Self> {
        Some(Self {
            name: v.get("name")?.as_str()?.to_string(),
            full_name: v.get("path_with_namespace")?.as_str()?.to_string(),
            html_url: str_field(v, "web_url").unwrap_or_default(),
            description: str_field(v, "description"),
            language: None,
            private: v.get("visibility").and_then(|x| x.as_str()) != Some("public"),
            fork: v.get("forked_from_project").is_some_and(|x| !x.is_null()),
            stargazers: u64_field(v, "star_count"),
            watchers: 0,
            forks: u64_field(v, "forks_count"),
            contributors: None,
            created_at: str_field(v, "created_at"),
            pushed_at: str_field(v, "last_activity_at"),
        })
    }

    /// Whether the repo is surfaced on the public profile and timeline.
    ///
    /// Popular repos always qualify, forks included. Otherwise a repo needs
    /// enough contributors, which is only known for public non-forks.
    pub fn is_significant(&self) -> bool {
        if self.stargazers >= SIGNIFICANT_POPULARITY
            || self.watchers >= SIGNIFICANT_POPULARITY
            || self.forks >= SIGNIFICANT_POPULARITY
        {
            return true;
        }
        if self.private || self.fork {
            return false;
        }
        self.contributors
            .is_some_and(|c| c >= SIGNIFICANT_CONTRIBUTORS)
    }

    /// Whether a contributor lookup could change significance.
    pub fn needs_contributor_count(&self) -> bool {
        !self.private && !self.fork && self.contributors.is_none() && !self.is_significant()
    }

    /// Sort key for the timeline (most recent push first).
    pub fn recency(&self) -> &str {
        self.pushed_at
            .as_deref()
            .or(self.created_at.as_deref())
            .unwrap_or("")
    }
}

fn str_field(v: &serde_json::Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(str::to_string)
}

fn u64_field(v: &serde_json::Value, key: &str) -> u64 {
    v.get(key).and_then(|x| x.as_u64()).unwrap_or(0)
}
