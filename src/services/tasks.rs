// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task scheduling for background sync.
//!
//! Named tasks are sent to a [`TaskScheduler`]:
//! - `sync-connection`: one scrape type for one connection
//! - `sync-user`: fan out every supported scrape for a user's connections
//!
//! [`TasksService`] uses the official google-cloud-tasks-v2 SDK;
//! [`RecordingScheduler`] keeps tasks in memory for tests and local runs.

use crate::error::{AppError, Result};
use crate::models::ScrapeType;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MAX_CONCURRENT_TASKS: usize = 100;

pub const SYNC_CONNECTION_PATH: &str = "/tasks/sync-connection";
pub const SYNC_USER_PATH: &str = "/tasks/sync-user";

/// Payload for a single connection sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConnectionPayload {
    pub connection_id: String,
    pub scrape_type: ScrapeType,
    /// Times this task was pushed back by the rate-limit gate
    #[serde(default)]
    pub attempt: u32,
}

/// Payload for syncing every connection of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncUserPayload {
    pub user_id: String,
}

/// A task with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRequest {
    SyncConnection(SyncConnectionPayload),
    SyncUser(SyncUserPayload),
}

impl TaskRequest {
    pub fn sync_connection(connection_id: &str, scrape_type: ScrapeType) -> Self {
        TaskRequest::SyncConnection(SyncConnectionPayload {
            connection_id: connection_id.to_string(),
            scrape_type,
            attempt: 0,
        })
    }

    pub fn sync_user(user_id: &str) -> Self {
        TaskRequest::SyncUser(SyncUserPayload {
            user_id: user_id.to_string(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskRequest::SyncConnection(_) => "sync-connection",
            TaskRequest::SyncUser(_) => "sync-user",
        }
    }

    /// Handler path relative to the service URL.
    pub fn path(&self) -> &'static str {
        match self {
            TaskRequest::SyncConnection(_) => SYNC_CONNECTION_PATH,
            TaskRequest::SyncUser(_) => SYNC_USER_PATH,
        }
    }

    /// JSON request body.
    pub fn body(&self) -> Result<Vec<u8>> {
        let body = match self {
            TaskRequest::SyncConnection(p) => serde_json::to_vec(p),
            TaskRequest::SyncUser(p) => serde_json::to_vec(p),
        };
        body.map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))
    }

    /// Key used to match test failure injection.
    fn subject(&self) -> &str {
        match self {
            TaskRequest::SyncConnection(p) => &p.connection_id,
            TaskRequest::SyncUser(p) => &p.user_id,
        }
    }
}

// ─── Task argument schema ────────────────────────────────────

/// One argument of a task, for the admin task list.
#[derive(Debug, Clone, Serialize)]
pub struct TaskArg {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
}

/// Statically declared task signature.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDefinition {
    pub name: &'static str,
    pub path: &'static str,
    pub args: &'static [TaskArg],
}

pub static TASK_DEFINITIONS: &[TaskDefinition] = &[
    TaskDefinition {
        name: "sync-connection",
        path: SYNC_CONNECTION_PATH,
        args: &[
            TaskArg {
                name: "connection_id",
                kind: "string",
                required: true,
            },
            TaskArg {
                name: "scrape_type",
                kind: "profile | repos | timeline | milestones | summary",
                required: true,
            },
            TaskArg {
                name: "attempt",
                kind: "number",
                required: false,
            },
        ],
    },
    TaskDefinition {
        name: "sync-user",
        path: SYNC_USER_PATH,
        args: &[TaskArg {
            name: "user_id",
            kind: "string",
            required: true,
        }],
    },
];

// ─── Scheduler contract ──────────────────────────────────────

#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Run `task` as soon as the queue allows.
    async fn enqueue(&self, task: TaskRequest) -> Result<()>;

    /// Run `task` no earlier than `delay` from now.
    async fn enqueue_after_delay(&self, delay: Duration, task: TaskRequest) -> Result<()>;
}

/// Result of a fan-out enqueue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanOutResult {
    /// Number of tasks successfully queued.
    pub queued: u32,
    /// Number of tasks that failed to queue.
    pub failed: u32,
}

impl FanOutResult {
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    pub fn is_complete_failure(&self) -> bool {
        self.queued == 0 && self.failed > 0
    }

    pub fn is_partial_failure(&self) -> bool {
        self.queued > 0 && self.failed > 0
    }
}

/// Enqueue many tasks with bounded concurrency.
///
/// Individual failures are logged and counted, never propagated.
pub async fn enqueue_all(scheduler: &dyn TaskScheduler, tasks: Vec<TaskRequest>) -> FanOutResult {
    let requested = tasks.len();
    let queued = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));

    stream::iter(tasks)
        .for_each_concurrent(MAX_CONCURRENT_TASKS, |task| {
            let queued = Arc::clone(&queued);
            let failed = Arc::clone(&failed);
            async move {
                let name = task.name();
                match scheduler.enqueue(task).await {
                    Ok(()) => {
                        queued.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::warn!(task = name, error = %e, "Failed to queue task");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })
        .await;

    let result = FanOutResult {
        queued: queued.load(Ordering::Relaxed) as u32,
        failed: failed.load(Ordering::Relaxed) as u32,
    };

    tracing::info!(
        requested,
        succeeded = result.queued,
        failed = result.failed,
        "Queued sync tasks"
    );

    result
}

// ─── Cloud Tasks ─────────────────────────────────────────────

/// Cloud Tasks client wrapper.
pub struct TasksService {
    project_id: String,
    location: String,
    queue_name: String,
    service_url: String,
}

impl TasksService {
    pub fn new(project_id: &str, region: &str, service_url: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: region.to_string(),
            queue_name: crate::config::TASK_QUEUE_NAME.to_string(),
            service_url: service_url.trim_end_matches('/').to_string(),
        }
    }

    /// Generic task queuing helper.
    async fn queue_task(&self, task: &TaskRequest, delay: Option<Duration>) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, OidcToken, Task};

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Tasks(format!("Cloud Tasks client error: {}", e)))?;

        let queue_path = format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        );

        let http_request = HttpRequest::default()
            .set_url(format!("{}{}", self.service_url, task.path()))
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(task.body()?))
            .set_headers(std::collections::HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]))
            .set_oidc_token(
                OidcToken::default()
                    .set_service_account_email(format!(
                        "devboard-integrations@{}.iam.gserviceaccount.com",
                        self.project_id
                    ))
                    .set_audience(self.service_url.clone()),
            );

        let mut cloud_task = Task::default().set_http_request(http_request);
        if let Some(delay) = delay {
            let at = chrono::Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
            cloud_task =
                cloud_task.set_schedule_time(google_cloud_wkt::Timestamp::clamp(at.timestamp(), 0));
        }

        let _response = client
            .create_task()
            .set_parent(queue_path)
            .set_task(cloud_task)
            .send()
            .await
            .map_err(|e| AppError::Tasks(format!("Cloud Tasks create error: {}", e)))?;

        tracing::debug!(
            task = task.name(),
            delay_secs = delay.map(|d| d.as_secs()),
            "Task queued"
        );

        Ok(())
    }
}

#[async_trait]
impl TaskScheduler for TasksService {
    async fn enqueue(&self, task: TaskRequest) -> Result<()> {
        self.queue_task(&task, None).await
    }

    async fn enqueue_after_delay(&self, delay: Duration, task: TaskRequest) -> Result<()> {
        self.queue_task(&task, Some(delay)).await
    }
}

// ─── In-memory scheduler ─────────────────────────────────────

/// A task accepted by [`RecordingScheduler`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub delay: Option<Duration>,
    pub task: TaskRequest,
}

/// Scheduler that records tasks instead of running them.
#[derive(Default)]
pub struct RecordingScheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
    /// Connection or user IDs whose tasks fail to queue.
    fail_ids: Mutex<HashSet<String>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make tasks for these connection or user IDs fail to queue.
    pub fn set_fail_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut guard = self.fail_ids.lock().unwrap_or_else(|e| e.into_inner());
        guard.clear();
        guard.extend(ids.into_iter().map(Into::into));
    }

    /// Remove and return all recorded tasks.
    pub fn take(&self) -> Vec<ScheduledTask> {
        std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, delay: Option<Duration>, task: TaskRequest) -> Result<()> {
        let should_fail = self
            .fail_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(task.subject());
        if should_fail {
            return Err(AppError::Tasks(format!(
                "Injected failure for {}",
                task.subject()
            )));
        }
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScheduledTask { delay, task });
        Ok(())
    }
}

#[async_trait]
impl TaskScheduler for RecordingScheduler {
    async fn enqueue(&self, task: TaskRequest) -> Result<()> {
        self.record(None, task)
    }

    async fn enqueue_after_delay(&self, delay: Duration, task: TaskRequest) -> Result<()> {
        self.record(Some(delay), task)
    }
}
