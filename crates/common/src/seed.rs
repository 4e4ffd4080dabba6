//! Discussion seeds derived from annotation clusters.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{AgentId, MarginaliaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionType {
    /// Agents take different stances on a claim
    PositionTaking,
    /// A point worth probing through several lenses
    Deepening,
    /// Linking abstract ideas to concrete situations
    Connecting,
}

impl FromStr for DiscussionType {
    type Err = MarginaliaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "position_taking" => Ok(DiscussionType::PositionTaking),
            "deepening" => Ok(DiscussionType::Deepening),
            "connecting" => Ok(DiscussionType::Connecting),
            other => Err(MarginaliaError::Generation(format!(
                "Unknown discussion type: {other}"
            ))),
        }
    }
}

/// A candidate discussion traced to exactly one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    pub seed_id: String,
    pub cluster_id: String,
    pub tension_point: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discussion_type: Option<DiscussionType>,
    pub snippet_text: String,
    pub section_title: String,
    /// Agents as declared by the generator; may contain unknown names.
    #[serde(default)]
    pub relevant_agents: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Seed {
    /// Declared agents that name a known agent, deduplicated, in declared order.
    pub fn valid_agents(&self) -> Vec<AgentId> {
        let mut agents = Vec::new();
        for name in &self.relevant_agents {
            if let Ok(agent) = name.parse::<AgentId>() {
                if !agents.contains(&agent) {
                    agents.push(agent);
                }
            }
        }
        agents
    }

    /// Participants for the thread, falling back to the default pair.
    pub fn participants(&self) -> Vec<AgentId> {
        let agents = self.valid_agents();
        if agents.is_empty() {
            AgentId::DEFAULT_PAIR.to_vec()
        } else {
            agents
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_with(agents: &[&str]) -> Seed {
        Seed {
            seed_id: "seed_1".into(),
            cluster_id: "cluster_0".into(),
            tension_point: "t".into(),
            discussion_type: None,
            snippet_text: String::new(),
            section_title: "Methods".into(),
            relevant_agents: agents.iter().map(|s| s.to_string()).collect(),
            keywords: vec![],
        }
    }

    #[test]
    fn invalid_agents_fall_back_to_default_pair() {
        let seed = seed_with(&["skeptic", "optimist"]);
        assert_eq!(
            seed.participants(),
            vec![AgentId::Instrumental, AgentId::Critical]
        );
    }

    #[test]
    fn duplicate_and_unknown_agents_are_filtered() {
        let seed = seed_with(&["critical", "nobody", "Critical", "aesthetic"]);
        assert_eq!(
            seed.participants(),
            vec![AgentId::Critical, AgentId::Aesthetic]
        );
    }

    #[test]
    fn single_valid_agent_is_kept() {
        let seed = seed_with(&["aesthetic"]);
        assert_eq!(seed.participants(), vec![AgentId::Aesthetic]);
    }
}
