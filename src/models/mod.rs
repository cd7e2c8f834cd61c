// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod connection;
pub mod repo;
pub mod snapshot;

pub use connection::{Connection, NormalizedConnection};
pub use repo::RepoSummary;
pub use snapshot::{ScrapeSnapshot, ScrapeType};
