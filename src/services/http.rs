// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outbound HTTP wrapper used for every provider call.
//!
//! Handles:
//! - Default `User-Agent` (caller may override)
//! - JSON `Accept` / `Content-Type` headers
//! - Per-request timeout (10s unless overridden)
//!
//! There is no retry logic here. Transport errors (timeout, DNS, TLS) are
//! returned unchanged; callers decide what a failure means.

use crate::error::AppError;
use crate::providers::ProviderId;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("devboard-integrations/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body encodings.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// `multipart/form-data` with text parts only
    Multipart(Vec<(String, String)>),
}

/// Per-call options for [`HttpClient::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub bearer: Option<String>,
    pub basic: Option<(String, String)>,
    /// Add JSON `Accept` / `Content-Type` headers. Defaults to true.
    pub is_json: bool,
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            bearer: None,
            basic: None,
            is_json: true,
            timeout: None,
        }
    }
}

impl FetchOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self::method(Method::POST)
    }

    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn basic(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic = Some((user.into(), password.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(pairs);
        self
    }

    pub fn multipart(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Multipart(pairs);
        self
    }

    pub fn not_json(mut self) -> Self {
        self.is_json = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Compute the header set for a request.
pub fn build_headers(opts: &FetchOptions, default_user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in &opts.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                headers.insert(n, v);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid request header"),
        }
    }

    if !opts.has_header("user-agent") {
        if let Ok(v) = HeaderValue::from_str(default_user_agent) {
            headers.insert(USER_AGENT, v);
        }
    }

    if opts.is_json {
        if !opts.has_header("accept") {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        // Form and multipart bodies carry their own content type.
        let json_body = matches!(opts.body, RequestBody::Json(_) | RequestBody::Empty);
        if opts.method != Method::GET && json_body && !opts.has_header("content-type") {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
    }

    headers
}

/// Timeout that applies to a request.
pub fn effective_timeout(opts: &FetchOptions) -> Duration {
    opts.timeout.unwrap_or(DEFAULT_TIMEOUT)
}

/// Shared outbound HTTP client.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    user_agent: String,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Send a request. Errors from the underlying client propagate as-is.
    pub async fn fetch(
        &self,
        url: &str,
        opts: FetchOptions,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let headers = build_headers(&opts, &self.user_agent);
        let timeout = effective_timeout(&opts);

        let mut req = self
            .client
            .request(opts.method.clone(), url)
            .headers(headers)
            .timeout(timeout);

        if !opts.query.is_empty() {
            req = req.query(&opts.query);
        }
        if let Some(token) = &opts.bearer {
            req = req.bearer_auth(token);
        }
        if let Some((user, password)) = &opts.basic {
            req = req.basic_auth(user, Some(password));
        }

        req = match opts.body {
            RequestBody::Empty => req,
            RequestBody::Json(value) => req.json(&value),
            RequestBody::Form(pairs) => req.form(&pairs),
            RequestBody::Multipart(pairs) => {
                let form = pairs
                    .into_iter()
                    .fold(reqwest::multipart::Form::new(), |form, (k, v)| form.text(k, v));
                req.multipart(form)
            }
        };

        tracing::debug!(method = %opts.method, url = %url, timeout_ms = timeout.as_millis() as u64, "Outbound request");
        req.send().await
    }
}

// ─── Response helpers ────────────────────────────────────────

/// Map a transport error to a provider error (no status).
pub fn transport_error(provider: ProviderId, err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() { "timeout" } else { "transport" };
    AppError::provider(provider, None, format!("{}: {}", kind, err))
}

/// Check the response status and parse a JSON body.
pub async fn read_json(
    provider: ProviderId,
    response: reqwest::Response,
) -> Result<serde_json::Value, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 {
            tracing::warn!(provider = %provider, "Provider rate limit hit (429)");
        }
        return Err(AppError::provider(
            provider,
            Some(status.as_u16()),
            truncate(&body, 300),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::provider(provider, None, format!("Malformed JSON: {}", e)))
}

/// GET a JSON document.
pub async fn get_json(
    http: &HttpClient,
    provider: ProviderId,
    url: &str,
    opts: FetchOptions,
) -> Result<serde_json::Value, AppError> {
    let response = http
        .fetch(url, opts)
        .await
        .map_err(|e| transport_error(provider, e))?;
    read_json(provider, response).await
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
