// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Connections (linked provider accounts and their tokens)
//! - Scrape snapshots (last payload per scrape key)

use super::{collections, ConnectionStore, TokenUpdate};
use crate::error::AppError;
use crate::models::{Connection, ScrapeSnapshot, ScrapeType};
use crate::providers::ProviderId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use std::time::Duration;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Attempts for one read-modify-write before giving up.
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Read-modify-write one connection inside a transaction.
    ///
    /// The read goes through the transaction, so Firestore locks the document
    /// until commit. A commit that loses to a concurrent writer is retried
    /// with a fresh read, so counter updates are not lost.
    async fn modify_connection<T, F>(&self, id: &str, f: F) -> Result<T, AppError>
    where
        F: Fn(&mut Connection) -> T + Send + Sync,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match self.try_modify_connection(id, &f).await? {
                Ok(out) => return Ok(out),
                Err(e) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(
                        connection_id = id,
                        attempt,
                        error = %e,
                        "Connection transaction aborted, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AppError::Database(format!("Transaction commit failed: {}", e)))
                }
            }
        }
    }

    /// One transactional attempt. The inner error is a failed commit.
    async fn try_modify_connection<T, F>(
        &self,
        id: &str,
        f: &F,
    ) -> Result<Result<T, FirestoreError>, AppError>
    where
        F: Fn(&mut Connection) -> T + Send + Sync,
        T: Send,
    {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let tx_client = client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        let current: Option<Connection> = tx_client
            .fluent()
            .select()
            .by_id_in(collections::CONNECTIONS)
            .obj()
            .one(id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read connection in transaction: {}", e))
            })?;

        let Some(mut conn) = current else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("Connection {}", id)));
        };

        let out = f(&mut conn);
        conn.updated_at = Utc::now();

        client
            .fluent()
            .update()
            .in_col(collections::CONNECTIONS)
            .document_id(id)
            .object(&conn)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add connection to transaction: {}", e))
            })?;

        Ok(transaction.commit().await.map(|_| out))
    }

    /// Batch delete documents using transactions.
    async fn batch_delete(&self, doc_ids: &[String], collection: &str) -> Result<(), AppError> {
        let client = self.get_client()?;

        for chunk in doc_ids.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for doc_id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for FirestoreDb {
    // ─── Connection Operations ───────────────────────────────────

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CONNECTIONS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_connections_for_user(&self, user_id: &str) -> Result<Vec<Connection>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CONNECTIONS)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_connection(&self, conn: &Connection) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CONNECTIONS)
            .document_id(&conn.id)
            .object(conn)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_connection(&self, id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::CONNECTIONS)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_user_connections(&self, user_id: &str) -> Result<usize, AppError> {
        let mut deleted_count = 0;

        // 1. Snapshots
        let snapshots: Vec<ScrapeSnapshot> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SNAPSHOTS)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ids: Vec<String> = snapshots.iter().map(ScrapeSnapshot::doc_id).collect();
        self.batch_delete(&ids, collections::SNAPSHOTS).await?;
        deleted_count += ids.len();
        tracing::debug!(user_id, count = ids.len(), "Deleted scrape snapshots");

        // 2. Connections
        let ids: Vec<String> = self
            .list_connections_for_user(user_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        self.batch_delete(&ids, collections::CONNECTIONS).await?;
        deleted_count += ids.len();
        tracing::debug!(user_id, count = ids.len(), "Deleted connections");

        tracing::info!(user_id, deleted_count, "User connection deletion complete");

        Ok(deleted_count)
    }

    async fn set_tokens(&self, id: &str, tokens: &TokenUpdate) -> Result<(), AppError> {
        let tokens = tokens.clone();
        self.modify_connection(id, move |c| {
            c.access_token = tokens.access_token.clone();
            c.refresh_token = tokens.refresh_token.clone();
            c.expires_at = tokens.expires_at;
        })
        .await
    }

    async fn increment_error_count(&self, id: &str) -> Result<u32, AppError> {
        self.modify_connection(id, |c| {
            c.error_count += 1;
            c.error_count
        })
        .await
    }

    async fn reset_error_count(&self, id: &str) -> Result<(), AppError> {
        self.modify_connection(id, |c| c.error_count = 0).await
    }

    async fn mark_scraped(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.modify_connection(id, move |c| c.last_scraped_at = Some(at))
            .await
    }

    async fn mark_timeline_synced(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.modify_connection(id, move |c| c.last_timeline_sync_at = Some(at))
            .await
    }

    async fn mark_milestones_synced(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.modify_connection(id, move |c| c.last_milestones_sync_at = Some(at))
            .await
    }

    async fn update_provider_info(&self, id: &str, info: &serde_json::Value) -> Result<(), AppError> {
        let info = info.clone();
        self.modify_connection(id, move |c| c.provider_info = info.clone())
            .await
    }

    async fn set_paused(&self, id: &str, paused: bool) -> Result<(), AppError> {
        self.modify_connection(id, move |c| c.paused = paused).await
    }

    // ─── Snapshot Operations ─────────────────────────────────────

    async fn upsert_snapshot(&self, snapshot: &ScrapeSnapshot) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SNAPSHOTS)
            .document_id(snapshot.doc_id())
            .object(snapshot)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_snapshot(
        &self,
        user_id: &str,
        provider: ProviderId,
        scrape_type: ScrapeType,
    ) -> Result<Option<ScrapeSnapshot>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SNAPSHOTS)
            .obj()
            .one(&ScrapeSnapshot::key(user_id, provider, scrape_type))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn delete_snapshots(&self, user_id: &str, provider: ProviderId) -> Result<(), AppError> {
        // Snapshot IDs are deterministic; deleting a missing document is a no-op
        let ids: Vec<String> = ScrapeType::ALL
            .into_iter()
            .map(|t| ScrapeSnapshot::key(user_id, provider, t))
            .collect();
        self.batch_delete(&ids, collections::SNAPSHOTS).await?;
        tracing::debug!(user_id, provider = %provider, "Deleted provider snapshots");
        Ok(())
    }
}
