use crate::config::Config;
use crate::error::ImportError;
use crate::models::ImportBatchItem;
use crate::services::session::{ImportSummary, SessionStore};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Progress callback: `(current, total)`, with `current` never decreasing.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Persists a batch of chapters. Succeeds or fails as a whole.
#[async_trait]
pub trait BulkImporter: Send + Sync {
    async fn import(
        &self,
        batch: Vec<ImportBatchItem>,
        progress: Option<ProgressFn>,
    ) -> Result<(), ImportError>;
}

/// Posts the whole batch to the chapter store's bulk endpoint in one request,
/// so a rejected batch leaves nothing behind to duplicate on retry.
pub struct HttpBulkImporter {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpBulkImporter {
    pub fn new(config: &Config) -> Self {
        HttpBulkImporter {
            client: reqwest::Client::new(),
            api_url: config.import_api_url.clone(),
            api_key: config.import_api_key.clone(),
        }
    }
}

#[async_trait]
impl BulkImporter for HttpBulkImporter {
    async fn import(
        &self,
        batch: Vec<ImportBatchItem>,
        progress: Option<ProgressFn>,
    ) -> Result<(), ImportError> {
        let total = batch.len();
        if let Some(progress) = &progress {
            progress(0, total);
        }

        let mut request_builder = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&json!({ "chapters": batch }));

        if let Some(api_key) = &self.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request_builder
            .send()
            .await
            .map_err(|e| ImportError::import_failure(Some(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, body = %body, "Bulk import rejected");
            return Err(ImportError::import_failure(error_message(&body)));
        }

        debug!(total, "Posted chapter batch");
        if let Some(progress) = &progress {
            progress(total, total);
        }
        Ok(())
    }
}

/// Pull a human-readable message out of an error response body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Drive one import attempt for a stored session.
///
/// On success the session is closed; on failure it is left in review with
/// the importer's message. The attempt runs on its own task and settles the
/// session even if the caller stops waiting.
pub async fn run_import(
    store: &SessionStore,
    id: Uuid,
    importer: Arc<dyn BulkImporter>,
) -> Result<ImportSummary, ImportError> {
    let batch = store.with_session(id, |s| s.begin_import())??;
    let expected = ImportSummary {
        imported: batch.len(),
        skipped_count: store.with_session(id, |s| s.skipped_count())?,
    };

    let task_store = store.clone();
    let task = tokio::spawn(async move {
        let progress_store = task_store.clone();
        let progress: ProgressFn = Arc::new(move |current, total| {
            let _ = progress_store.with_session(id, |s| s.report_progress(current, total));
        });

        // Nested so a panicking importer still rejects the session.
        let outcome = tokio::spawn(async move { importer.import(batch, Some(progress)).await })
            .await
            .unwrap_or_else(|e| {
                Err(ImportError::import_failure(Some(format!("Import task failed: {e}"))))
            });
        finish_import(&task_store, id, outcome, expected)
    });

    task.await.unwrap_or_else(|e| {
        let err = ImportError::import_failure(Some(format!("Import task failed: {e}")));
        let _ = store.with_session(id, |s| s.reject_import(&err));
        Err(err)
    })
}

fn finish_import(
    store: &SessionStore,
    id: Uuid,
    outcome: Result<(), ImportError>,
    expected: ImportSummary,
) -> Result<ImportSummary, ImportError> {
    match outcome {
        Ok(()) => match store.with_session(id, |s| s.resolve_import()) {
            Ok(resolved) => {
                let summary = resolved?;
                store.close(id);
                info!(session = %id, imported = summary.imported, "Import session closed");
                Ok(summary)
            }
            Err(ImportError::SessionNotFound) => {
                warn!(
                    session = %id,
                    imported = expected.imported,
                    "Session closed while its import was running"
                );
                Ok(expected)
            }
            Err(err) => Err(err),
        },
        Err(err) => {
            match store.with_session(id, |s| s.reject_import(&err)) {
                Ok(rejected) => rejected?,
                Err(_) => warn!(session = %id, "Session closed before its import failed: {err}"),
            }
            Err(err)
        }
    }
}
