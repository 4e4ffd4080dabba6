//! Per-document generation status.

use std::collections::HashMap;

use marginalia_common::{MarginaliaError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationStatus {
    NotStarted,
    Running,
    Complete { thread_count: usize },
    Failed { error: String },
}

impl GenerationStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, GenerationStatus::Running)
    }
}

/// Tracks one pipeline run per document.
///
/// Shared by handle; inject the same store into every pipeline that may
/// work on the same documents.
#[derive(Default)]
pub struct GenerationStatusStore {
    statuses: RwLock<HashMap<String, GenerationStatus>>,
}

impl GenerationStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, document_id: &str) -> GenerationStatus {
        self.statuses
            .read()
            .get(document_id)
            .cloned()
            .unwrap_or(GenerationStatus::NotStarted)
    }

    /// Mark a document as running, unless a run is already in progress.
    pub fn try_start(&self, document_id: &str) -> Result<()> {
        let mut statuses = self.statuses.write();
        if statuses.get(document_id).is_some_and(GenerationStatus::is_running) {
            return Err(MarginaliaError::AlreadyRunning(document_id.to_string()));
        }
        statuses.insert(document_id.to_string(), GenerationStatus::Running);
        Ok(())
    }

    pub fn complete(&self, document_id: &str, thread_count: usize) {
        self.statuses.write().insert(
            document_id.to_string(),
            GenerationStatus::Complete { thread_count },
        );
    }

    pub fn fail(&self, document_id: &str, error: impl Into<String>) {
        self.statuses.write().insert(
            document_id.to_string(),
            GenerationStatus::Failed {
                error: error.into(),
            },
        );
    }

    pub fn clear(&self, document_id: &str) {
        self.statuses.write().remove(document_id);
    }

    /// Start a run and return a guard that owns its final status.
    ///
    /// A guard dropped before `complete` or `fail` marks the document
    /// `Failed` with error "cancelled", so an abandoned run never stays
    /// `Running`.
    pub fn begin(&self, document_id: &str) -> Result<RunGuard<'_>> {
        self.try_start(document_id)?;
        Ok(RunGuard {
            store: self,
            document_id: document_id.to_string(),
            finished: false,
        })
    }
}

/// Status of one in-progress run; see [`GenerationStatusStore::begin`].
pub struct RunGuard<'a> {
    store: &'a GenerationStatusStore,
    document_id: String,
    finished: bool,
}

impl RunGuard<'_> {
    pub fn complete(mut self, thread_count: usize) {
        self.finished = true;
        self.store.complete(&self.document_id, thread_count);
    }

    pub fn fail(mut self, error: impl Into<String>) {
        self.finished = true;
        self.store.fail(&self.document_id, error);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(document_id = %self.document_id, "Generation run dropped before finishing");
            self.store.fail(&self.document_id, "cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_document_is_not_started() {
        let store = GenerationStatusStore::new();
        assert_eq!(store.get("doc"), GenerationStatus::NotStarted);
    }

    #[test]
    fn second_start_is_refused_while_running() {
        let store = GenerationStatusStore::new();
        store.try_start("doc").unwrap();
        assert!(matches!(
            store.try_start("doc"),
            Err(MarginaliaError::AlreadyRunning(id)) if id == "doc"
        ));
        store.try_start("other").unwrap();
    }

    #[test]
    fn finished_runs_can_restart() {
        let store = GenerationStatusStore::new();
        store.try_start("doc").unwrap();
        store.complete("doc", 3);
        assert_eq!(store.get("doc"), GenerationStatus::Complete { thread_count: 3 });

        store.try_start("doc").unwrap();
        store.fail("doc", "seed formation failed");
        assert!(matches!(store.get("doc"), GenerationStatus::Failed { .. }));

        store.clear("doc");
        assert_eq!(store.get("doc"), GenerationStatus::NotStarted);
    }

    #[test]
    fn dropped_guard_records_cancellation() {
        let store = GenerationStatusStore::new();
        let guard = store.begin("doc").unwrap();
        assert!(store.begin("doc").is_err());
        drop(guard);
        assert_eq!(
            store.get("doc"),
            GenerationStatus::Failed {
                error: "cancelled".into()
            }
        );

        store.begin("doc").unwrap().complete(1);
        assert_eq!(store.get("doc"), GenerationStatus::Complete { thread_count: 1 });
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_string(&GenerationStatus::Complete { thread_count: 2 }).unwrap();
        assert_eq!(json, r#"{"status":"complete","thread_count":2}"#);
    }
}
