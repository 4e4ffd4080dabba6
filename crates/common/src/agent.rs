//! The three fixed reading-stance agents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::MarginaliaError;

/// Identity of a reading-stance agent.
///
/// The set is closed: every pipeline run fans out over [`AgentId::ALL`] in
/// this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    /// Practical understanding and application
    Instrumental,
    /// Questioning assumptions, evidence and implications
    Critical,
    /// Connecting and expanding meaning
    Aesthetic,
}

impl AgentId {
    pub const ALL: [AgentId; 3] = [AgentId::Instrumental, AgentId::Critical, AgentId::Aesthetic];

    /// Participants used when a seed names no usable agents.
    pub const DEFAULT_PAIR: [AgentId; 2] = [AgentId::Instrumental, AgentId::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Instrumental => "instrumental",
            AgentId::Critical => "critical",
            AgentId::Aesthetic => "aesthetic",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentId::Instrumental => "Instrumental",
            AgentId::Critical => "Critical",
            AgentId::Aesthetic => "Aesthetic",
        }
    }

    pub fn stance_description(&self) -> &'static str {
        match self {
            AgentId::Instrumental => {
                "Focused on practical understanding and application.\n\
                 Reading goals:\n\
                 - Identifying key concepts and ideas\n\
                 - Clarifying understanding and interpretation\n\
                 - Finding unresolved gaps that block comprehension"
            }
            AgentId::Critical => {
                "Focused on questioning and analyzing.\n\
                 Reading goals:\n\
                 - Questioning assumptions\n\
                 - Questioning evidence or reasoning\n\
                 - Examining implications or consequences"
            }
            AgentId::Aesthetic => {
                "Focused on connecting and expanding meaning.\n\
                 Reading goals:\n\
                 - Connecting the idea to personal experience\n\
                 - Expanding meaning of idea\n\
                 - Generating new connections or possibilities"
            }
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = MarginaliaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instrumental" => Ok(AgentId::Instrumental),
            "critical" => Ok(AgentId::Critical),
            "aesthetic" => Ok(AgentId::Aesthetic),
            other => Err(MarginaliaError::Generation(format!("Unknown agent: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Critical".parse::<AgentId>().unwrap(), AgentId::Critical);
        assert_eq!(" aesthetic ".parse::<AgentId>().unwrap(), AgentId::Aesthetic);
        assert!("skeptic".parse::<AgentId>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AgentId::Instrumental).unwrap(),
            "\"instrumental\""
        );
    }

    #[test]
    fn all_is_in_fixed_order() {
        let names: Vec<&str> = AgentId::ALL.iter().map(|a| a.as_str()).collect();
        assert_eq!(names, vec!["instrumental", "critical", "aesthetic"]);
    }
}
