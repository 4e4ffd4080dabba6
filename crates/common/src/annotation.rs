//! Annotations produced in the first pipeline phase.

use serde::{Deserialize, Serialize};

use crate::AgentId;

/// One agent's reaction to a quoted passage. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub agent_id: AgentId,
    pub section_title: String,
    /// Verbatim quote from the section
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reasoning: String,
}

impl Annotation {
    pub fn new(
        agent_id: AgentId,
        section_title: impl Into<String>,
        text: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            section_title: section_title.into(),
            text: text.into(),
            kind: kind.into(),
            reasoning: String::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }
}
