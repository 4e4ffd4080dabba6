//! Persistence backends for agent memory records.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use marginalia_common::{AgentId, MarginaliaError, Result};
use parking_lot::RwLock;
use tracing::debug;

use crate::types::{AgentMemory, BackendKind, MemoryConfig};

/// Durable storage for [`AgentMemory`] records.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    async fn get_agent_memory(
        &self,
        document_id: &str,
        agent_id: AgentId,
    ) -> Result<Option<AgentMemory>>;

    async fn save_agent_memory(&self, memory: &AgentMemory) -> Result<()>;

    async fn delete_document_memories(&self, document_id: &str) -> Result<()>;

    /// All records for a document, in agent order.
    async fn get_document_memories(&self, document_id: &str) -> Result<Vec<AgentMemory>>;
}

/// Process-local backend keyed by document, then agent.
#[derive(Default)]
pub struct InMemoryBackend {
    records: RwLock<HashMap<String, BTreeMap<AgentId, AgentMemory>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn get_agent_memory(
        &self,
        document_id: &str,
        agent_id: AgentId,
    ) -> Result<Option<AgentMemory>> {
        Ok(self
            .records
            .read()
            .get(document_id)
            .and_then(|agents| agents.get(&agent_id))
            .cloned())
    }

    async fn save_agent_memory(&self, memory: &AgentMemory) -> Result<()> {
        self.records
            .write()
            .entry(memory.document_id.clone())
            .or_default()
            .insert(memory.agent_id, memory.clone());
        Ok(())
    }

    async fn delete_document_memories(&self, document_id: &str) -> Result<()> {
        self.records.write().remove(document_id);
        Ok(())
    }

    async fn get_document_memories(&self, document_id: &str) -> Result<Vec<AgentMemory>> {
        Ok(self
            .records
            .read()
            .get(document_id)
            .map(|agents| agents.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// One JSON file per record at `<root>/<document_id>/<agent_id>.json`.
pub struct JsonFileBackend {
    root: PathBuf,
}

impl JsonFileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_dir(&self, document_id: &str) -> Result<PathBuf> {
        let valid = !document_id.is_empty()
            && document_id != "."
            && document_id != ".."
            && !document_id.contains(['/', '\\']);
        if !valid {
            return Err(MarginaliaError::Storage(format!(
                "Invalid document id for file storage: {document_id:?}"
            )));
        }
        Ok(self.root.join(document_id))
    }

    fn record_path(&self, document_id: &str, agent_id: AgentId) -> Result<PathBuf> {
        Ok(self
            .document_dir(document_id)?
            .join(format!("{}.json", agent_id.as_str())))
    }

    async fn read_record(path: &Path) -> Result<Option<AgentMemory>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let memory = serde_json::from_slice(&bytes).map_err(|e| {
                    MarginaliaError::Storage(format!("Corrupt memory file {}: {e}", path.display()))
                })?;
                Ok(Some(memory))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MarginaliaError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl MemoryBackend for JsonFileBackend {
    async fn get_agent_memory(
        &self,
        document_id: &str,
        agent_id: AgentId,
    ) -> Result<Option<AgentMemory>> {
        let path = self.record_path(document_id, agent_id)?;
        Self::read_record(&path).await
    }

    async fn save_agent_memory(&self, memory: &AgentMemory) -> Result<()> {
        let dir = self.document_dir(&memory.document_id)?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            MarginaliaError::Storage(format!("Failed to create {}: {e}", dir.display()))
        })?;

        let path = self.record_path(&memory.document_id, memory.agent_id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(memory)?;

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            MarginaliaError::Storage(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            MarginaliaError::Storage(format!("Failed to replace {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), bytes = bytes.len(), "Saved agent memory");
        Ok(())
    }

    async fn delete_document_memories(&self, document_id: &str) -> Result<()> {
        let dir = self.document_dir(document_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MarginaliaError::Storage(format!(
                "Failed to delete {}: {e}",
                dir.display()
            ))),
        }
    }

    async fn get_document_memories(&self, document_id: &str) -> Result<Vec<AgentMemory>> {
        let mut memories = Vec::new();
        for agent_id in AgentId::ALL {
            let path = self.record_path(document_id, agent_id)?;
            if let Some(memory) = Self::read_record(&path).await? {
                memories.push(memory);
            }
        }
        Ok(memories)
    }
}

/// Build the backend selected by configuration.
pub fn build_backend(config: &MemoryConfig) -> Arc<dyn MemoryBackend> {
    match config.backend {
        BackendKind::InMemory => Arc::new(InMemoryBackend::new()),
        BackendKind::File => Arc::new(JsonFileBackend::new(config.data_dir.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trip_and_delete() {
        let backend = InMemoryBackend::new();
        let memory = AgentMemory::new("doc_1", AgentId::Critical);
        backend.save_agent_memory(&memory).await.unwrap();

        let loaded = backend
            .get_agent_memory("doc_1", AgentId::Critical)
            .await
            .unwrap();
        assert_eq!(loaded, Some(memory));
        assert!(backend
            .get_agent_memory("doc_1", AgentId::Aesthetic)
            .await
            .unwrap()
            .is_none());

        backend.delete_document_memories("doc_1").await.unwrap();
        assert!(backend.get_document_memories("doc_1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn document_memories_follow_agent_order() {
        let backend = InMemoryBackend::new();
        for agent in [AgentId::Aesthetic, AgentId::Instrumental] {
            backend
                .save_agent_memory(&AgentMemory::new("doc_1", agent))
                .await
                .unwrap();
        }
        let agents: Vec<AgentId> = backend
            .get_document_memories("doc_1")
            .await
            .unwrap()
            .iter()
            .map(|m| m.agent_id)
            .collect();
        assert_eq!(agents, vec![AgentId::Instrumental, AgentId::Aesthetic]);
    }

    #[tokio::test]
    async fn file_backend_rejects_path_like_ids() {
        let backend = JsonFileBackend::new("/nonexistent");
        let err = backend
            .get_agent_memory("../etc", AgentId::Critical)
            .await
            .unwrap_err();
        assert!(matches!(err, MarginaliaError::Storage(_)));
    }

    #[test]
    fn build_backend_from_config() {
        let config = MemoryConfig {
            backend: BackendKind::File,
            ..Default::default()
        };
        // Construction alone must not touch the filesystem.
        let _backend = build_backend(&config);
    }
}
