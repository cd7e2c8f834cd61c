// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod backoff;
pub mod http;
pub mod kv;
pub mod normalize;
pub mod scrape;
pub mod sync;
pub mod tasks;
pub mod tokens;

pub use backoff::RateLimitGate;
pub use http::{FetchOptions, HttpClient};
pub use kv::TaskStore;
pub use scrape::Scraper;
pub use sync::{SyncOutcome, SyncService};
pub use tasks::{RecordingScheduler, TaskScheduler, TasksService};
pub use tokens::TokenManager;
