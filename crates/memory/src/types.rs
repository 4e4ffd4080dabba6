//! Memory record types and configuration.

use marginalia_common::{now_millis, short_id, AgentId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What an agent noticed in the first phase, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationMemory {
    pub annotation_id: String,
    pub agent_id: AgentId,
    pub document_id: String,
    pub section_id: String,
    pub target_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub annotation_type: String,
    pub reasoning: String,
    pub created_at: u64,
}

/// Something an agent said in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtMemory {
    pub thought_id: String,
    pub agent_id: AgentId,
    pub document_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_type: Option<String>,
    pub tension_point: String,
    /// Agent id, or "user", of the message this one answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responding_to: Option<String>,
    #[serde(default)]
    pub referenced_section_ids: Vec<String>,
    #[serde(default)]
    pub referenced_annotation_ids: Vec<String>,
    pub created_at: u64,
}

/// A user message involving an agent, and the agent's reply once given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionMemory {
    pub interaction_id: String,
    pub agent_id: AgentId,
    pub document_id: String,
    pub thread_id: String,
    pub user_message_id: String,
    pub user_content: String,
    pub was_tagged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_content: Option<String>,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<u64>,
}

/// Everything one agent remembers about one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMemory {
    pub memory_id: String,
    pub agent_id: AgentId,
    pub document_id: String,
    #[serde(default)]
    pub annotations: Vec<AnnotationMemory>,
    #[serde(default)]
    pub thoughts: Vec<ThoughtMemory>,
    #[serde(default)]
    pub interactions: Vec<InteractionMemory>,
    #[serde(default)]
    pub total_annotations: usize,
    #[serde(default)]
    pub total_thoughts: usize,
    #[serde(default)]
    pub total_interactions: usize,
    pub created_at: u64,
    pub updated_at: u64,
}

impl AgentMemory {
    pub fn new(document_id: impl Into<String>, agent_id: AgentId) -> Self {
        let now = now_millis();
        Self {
            memory_id: short_id("memory"),
            agent_id,
            document_id: document_id.into(),
            annotations: Vec::new(),
            thoughts: Vec::new(),
            interactions: Vec::new(),
            total_annotations: 0,
            total_thoughts: 0,
            total_interactions: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute totals and bump `updated_at` after a mutation.
    pub(crate) fn touch(&mut self) {
        self.total_annotations = self.annotations.len();
        self.total_thoughts = self.thoughts.len();
        self.total_interactions = self.interactions.len();
        self.updated_at = now_millis().max(self.updated_at);
    }
}

/// Input for [`crate::AgentMemoryStore::store_annotations`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationInput {
    pub section_id: String,
    pub target_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub annotation_type: String,
    pub reasoning: String,
}

/// Input for [`crate::AgentMemoryStore::store_thought`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThoughtInput {
    pub thread_id: String,
    pub message_id: String,
    pub content: String,
    pub tension_point: String,
    pub annotation_type: Option<String>,
    pub responding_to: Option<String>,
    pub referenced_section_ids: Vec<String>,
    pub referenced_annotation_ids: Vec<String>,
}

/// Condensed annotation used in prompt digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAnnotation {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reasoning: String,
}

/// Bounded view of an agent's memory for prompt injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub agent_id: AgentId,
    pub document_id: String,
    pub key_annotations: Vec<KeyAnnotation>,
    pub recent_thoughts: Vec<String>,
    pub has_interacted_with_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_user_interaction: Option<String>,
    pub engaged_sections: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    InMemory,
    File,
}

/// Configuration for the memory system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Root directory for the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Annotations listed in a prompt digest
    #[serde(default = "default_summary_annotations")]
    pub summary_annotations: usize,

    /// Thoughts listed in a prompt digest
    #[serde(default = "default_summary_thoughts")]
    pub summary_thoughts: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/memory")
}

fn default_summary_annotations() -> usize {
    5
}

fn default_summary_thoughts() -> usize {
    3
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: default_data_dir(),
            summary_annotations: default_summary_annotations(),
            summary_thoughts: default_summary_thoughts(),
        }
    }
}
