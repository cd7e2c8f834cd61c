// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Tasks authentication middleware.

use crate::config::TASK_QUEUE_NAME;
use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

/// Header set by Cloud Tasks on every delivery.
pub const QUEUE_NAME_HEADER: &str = "x-cloudtasks-queuename";

/// Require the sync queue's name header for `/tasks/*` routes.
///
/// Cloud Run strips `X-CloudTasks-*` headers from external requests, so the
/// header is only present on deliveries from Cloud Tasks.
pub async fn require_tasks_auth(request: Request, next: Next) -> Result<Response, StatusCode> {
    let queue_name_header = request.headers().get(QUEUE_NAME_HEADER);
    let is_valid_queue = queue_name_header
        .and_then(|h| h.to_str().ok())
        .map(|name| name == TASK_QUEUE_NAME)
        .unwrap_or(false);

    if !is_valid_queue {
        tracing::warn!(
            path = %request.uri().path(),
            header = ?queue_name_header,
            "Blocked tasks request with invalid queue header"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
