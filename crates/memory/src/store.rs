//! Cache-aside agent memory store.

use std::collections::HashMap;
use std::sync::Arc;

use marginalia_common::{now_millis, short_id, AgentId, MarginaliaError, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::MemoryBackend;
use crate::retrieval;
use crate::types::{
    AgentMemory, AnnotationInput, AnnotationMemory, InteractionMemory, MemoryConfig,
    MemorySummary, ThoughtInput, ThoughtMemory,
};

type MemoryKey = (String, AgentId);

/// Per-(document, agent) memory with a read-through cache over a
/// [`MemoryBackend`].
///
/// Writes to one key are serialized by that key's mutex and are saved to the
/// backend before the cached copy changes, so the cache never runs ahead of
/// durable state.
pub struct AgentMemoryStore {
    backend: Arc<dyn MemoryBackend>,
    cache: parking_lot::Mutex<HashMap<MemoryKey, Arc<Mutex<AgentMemory>>>>,
    summary_annotations: usize,
    summary_thoughts: usize,
}

impl AgentMemoryStore {
    pub fn new(backend: Arc<dyn MemoryBackend>, config: &MemoryConfig) -> Self {
        Self {
            backend,
            cache: parking_lot::Mutex::new(HashMap::new()),
            summary_annotations: config.summary_annotations,
            summary_thoughts: config.summary_thoughts,
        }
    }

    /// Cached entry for a key, loading or creating the record on a miss.
    /// The flag is true when the record did not exist in the backend.
    async fn entry(
        &self,
        document_id: &str,
        agent_id: AgentId,
    ) -> Result<(Arc<Mutex<AgentMemory>>, bool)> {
        let key = (document_id.to_string(), agent_id);
        let cached = self.cache.lock().get(&key).cloned();
        if let Some(entry) = cached {
            return Ok((entry, false));
        }

        let (memory, created) = match self.backend.get_agent_memory(document_id, agent_id).await? {
            Some(memory) => (memory, false),
            None => (AgentMemory::new(document_id, agent_id), true),
        };

        // Another task may have filled the slot while we were loading.
        let mut cache = self.cache.lock();
        let entry = cache
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(memory)))
            .clone();
        Ok((entry, created))
    }

    async fn snapshot(&self, document_id: &str, agent_id: AgentId) -> Result<AgentMemory> {
        let (entry, _) = self.entry(document_id, agent_id).await?;
        let memory = entry.lock().await;
        Ok(memory.clone())
    }

    /// Apply a mutation, persist it, then publish it to the cache.
    async fn update<T>(
        &self,
        document_id: &str,
        agent_id: AgentId,
        mutate: impl FnOnce(&mut AgentMemory) -> Result<T>,
    ) -> Result<T> {
        let (entry, _) = self.entry(document_id, agent_id).await?;
        let mut cached = entry.lock().await;

        let mut next = cached.clone();
        let out = mutate(&mut next)?;
        next.touch();

        self.backend.save_agent_memory(&next).await?;
        *cached = next;
        Ok(out)
    }

    /// Create empty records for every agent on a document.
    pub async fn initialize_for_document(&self, document_id: &str) -> Result<()> {
        for agent_id in AgentId::ALL {
            let (entry, created) = self.entry(document_id, agent_id).await?;
            if created {
                let memory = entry.lock().await;
                self.backend.save_agent_memory(&memory).await?;
            }
        }
        info!(document_id = %document_id, "Initialized agent memories");
        Ok(())
    }

    pub async fn store_annotations(
        &self,
        document_id: &str,
        agent_id: AgentId,
        inputs: Vec<AnnotationInput>,
    ) -> Result<Vec<AnnotationMemory>> {
        let stored = self
            .update(document_id, agent_id, |memory| {
                let now = now_millis();
                let records: Vec<AnnotationMemory> = inputs
                    .into_iter()
                    .map(|input| AnnotationMemory {
                        annotation_id: short_id("ann"),
                        agent_id,
                        document_id: memory.document_id.clone(),
                        section_id: input.section_id,
                        target_text: input.target_text,
                        start_offset: input.start_offset,
                        end_offset: input.end_offset,
                        annotation_type: input.annotation_type,
                        reasoning: input.reasoning,
                        created_at: now,
                    })
                    .collect();
                memory.annotations.extend(records.iter().cloned());
                Ok(records)
            })
            .await?;

        debug!(
            document_id = %document_id,
            agent_id = %agent_id,
            count = stored.len(),
            "Stored annotations"
        );
        Ok(stored)
    }

    pub async fn get_annotations(
        &self,
        document_id: &str,
        agent_id: AgentId,
        section_id: Option<&str>,
        annotation_type: Option<&str>,
    ) -> Result<Vec<AnnotationMemory>> {
        let memory = self.snapshot(document_id, agent_id).await?;
        Ok(memory
            .annotations
            .into_iter()
            .filter(|a| section_id.map_or(true, |s| a.section_id == s))
            .filter(|a| annotation_type.map_or(true, |t| a.annotation_type == t))
            .collect())
    }

    pub async fn get_relevant_annotations(
        &self,
        document_id: &str,
        agent_id: AgentId,
        section_ids: &[String],
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<AnnotationMemory>> {
        let memory = self.snapshot(document_id, agent_id).await?;
        Ok(
            retrieval::relevant_annotations(&memory, section_ids, keywords, limit)
                .into_iter()
                .cloned()
                .collect(),
        )
    }

    pub async fn store_thought(
        &self,
        document_id: &str,
        agent_id: AgentId,
        input: ThoughtInput,
    ) -> Result<ThoughtMemory> {
        self.update(document_id, agent_id, |memory| {
            let thought = ThoughtMemory {
                thought_id: short_id("thought"),
                agent_id,
                document_id: memory.document_id.clone(),
                thread_id: input.thread_id,
                message_id: input.message_id,
                content: input.content,
                annotation_type: input.annotation_type,
                tension_point: input.tension_point,
                responding_to: input.responding_to,
                referenced_section_ids: input.referenced_section_ids,
                referenced_annotation_ids: input.referenced_annotation_ids,
                created_at: now_millis(),
            };
            memory.thoughts.push(thought.clone());
            Ok(thought)
        })
        .await
    }

    /// Thoughts newest first, optionally for a single thread.
    pub async fn get_thoughts(
        &self,
        document_id: &str,
        agent_id: AgentId,
        thread_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ThoughtMemory>> {
        let memory = self.snapshot(document_id, agent_id).await?;
        Ok(retrieval::recent_thoughts(&memory, thread_id, limit)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn store_interaction(
        &self,
        document_id: &str,
        agent_id: AgentId,
        thread_id: &str,
        user_message_id: &str,
        user_content: &str,
        was_tagged: bool,
    ) -> Result<InteractionMemory> {
        self.update(document_id, agent_id, |memory| {
            let interaction = InteractionMemory {
                interaction_id: short_id("interaction"),
                agent_id,
                document_id: memory.document_id.clone(),
                thread_id: thread_id.to_string(),
                user_message_id: user_message_id.to_string(),
                user_content: user_content.to_string(),
                was_tagged,
                response_message_id: None,
                response_content: None,
                created_at: now_millis(),
                responded_at: None,
            };
            memory.interactions.push(interaction.clone());
            Ok(interaction)
        })
        .await
    }

    pub async fn update_interaction_response(
        &self,
        document_id: &str,
        agent_id: AgentId,
        interaction_id: &str,
        response_message_id: &str,
        response_content: &str,
    ) -> Result<()> {
        self.update(document_id, agent_id, |memory| {
            let interaction = memory
                .interactions
                .iter_mut()
                .find(|i| i.interaction_id == interaction_id)
                .ok_or_else(|| {
                    MarginaliaError::Memory(format!(
                        "Interaction {interaction_id} not found for {agent_id} on {document_id}"
                    ))
                })?;
            interaction.response_message_id = Some(response_message_id.to_string());
            interaction.response_content = Some(response_content.to_string());
            interaction.responded_at = Some(now_millis());
            Ok(())
        })
        .await
    }

    pub async fn get_memory_summary(
        &self,
        document_id: &str,
        agent_id: AgentId,
        section_ids: &[String],
        keywords: &[String],
    ) -> Result<MemorySummary> {
        let memory = self.snapshot(document_id, agent_id).await?;
        Ok(retrieval::build_summary(
            &memory,
            section_ids,
            keywords,
            self.summary_annotations,
            self.summary_thoughts,
        ))
    }

    /// Bounded textual digest of an agent's memory for generation prompts.
    pub async fn format_for_prompt(
        &self,
        document_id: &str,
        agent_id: AgentId,
        section_ids: &[String],
        keywords: &[String],
    ) -> Result<String> {
        let summary = self
            .get_memory_summary(document_id, agent_id, section_ids, keywords)
            .await?;
        Ok(retrieval::format_summary(&summary))
    }

    /// Drop cached and stored records for every agent on a document.
    pub async fn clear_document_memories(&self, document_id: &str) -> Result<()> {
        self.cache.lock().retain(|(doc, _), _| doc != document_id);
        self.backend.delete_document_memories(document_id).await?;
        info!(document_id = %document_id, "Cleared agent memories");
        Ok(())
    }

    pub async fn get_document_memories(&self, document_id: &str) -> Result<Vec<AgentMemory>> {
        self.backend.get_document_memories(document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn store() -> (AgentMemoryStore, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = AgentMemoryStore::new(backend.clone(), &MemoryConfig::default());
        (store, backend)
    }

    fn input(section: &str, text: &str) -> AnnotationInput {
        AnnotationInput {
            section_id: section.to_string(),
            target_text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            annotation_type: "question".to_string(),
            reasoning: "why".to_string(),
        }
    }

    #[tokio::test]
    async fn writes_are_persisted_before_returning() {
        let (store, backend) = store();
        store
            .store_annotations("doc", AgentId::Critical, vec![input("s1", "a"), input("s2", "b")])
            .await
            .unwrap();

        let saved = backend
            .get_agent_memory("doc", AgentId::Critical)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.total_annotations, 2);
        assert!(saved.annotations[0].annotation_id.starts_with("ann_"));
    }

    #[tokio::test]
    async fn get_annotations_filters() {
        let (store, _) = store();
        store
            .store_annotations("doc", AgentId::Critical, vec![input("s1", "a"), input("s2", "b")])
            .await
            .unwrap();
        let s2 = store
            .get_annotations("doc", AgentId::Critical, Some("s2"), None)
            .await
            .unwrap();
        assert_eq!(s2.len(), 1);
        assert_eq!(s2[0].target_text, "b");

        let none = store
            .get_annotations("doc", AgentId::Critical, None, Some("critique"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn failed_update_leaves_cache_untouched() {
        let (store, _) = store();
        let err = store
            .update_interaction_response("doc", AgentId::Aesthetic, "interaction_missing", "m", "c")
            .await
            .unwrap_err();
        assert!(matches!(err, MarginaliaError::Memory(_)));

        let summary = store
            .get_memory_summary("doc", AgentId::Aesthetic, &[], &[])
            .await
            .unwrap();
        assert!(!summary.has_interacted_with_user);
    }

    #[tokio::test]
    async fn interaction_response_is_recorded() {
        let (store, _) = store();
        let interaction = store
            .store_interaction("doc", AgentId::Instrumental, "thread_1", "msg_1", "Why?", true)
            .await
            .unwrap();
        store
            .update_interaction_response(
                "doc",
                AgentId::Instrumental,
                &interaction.interaction_id,
                "msg_2",
                "Because.",
            )
            .await
            .unwrap();

        let memories = store.get_document_memories("doc").await.unwrap();
        let recorded = &memories[0].interactions[0];
        assert_eq!(recorded.response_content.as_deref(), Some("Because."));
        assert!(recorded.responded_at.is_some());
    }

    #[tokio::test]
    async fn initialize_creates_all_agents_once() {
        let (store, backend) = store();
        store.initialize_for_document("doc").await.unwrap();
        let first = backend.get_document_memories("doc").await.unwrap();
        assert_eq!(first.len(), 3);

        store.initialize_for_document("doc").await.unwrap();
        let second = backend.get_document_memories("doc").await.unwrap();
        let ids = |ms: &[AgentMemory]| ms.iter().map(|m| m.memory_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }
}
