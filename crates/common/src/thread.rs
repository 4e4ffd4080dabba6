//! Threads, messages and anchors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AgentId, DiscussionType, MarginaliaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadType {
    Comment,
    Discussion,
}

impl ThreadType {
    /// Two or more participants make a discussion, otherwise a comment.
    pub fn for_participants(count: usize) -> Self {
        if count >= 2 {
            ThreadType::Discussion
        } else {
            ThreadType::Comment
        }
    }
}

/// Resolved location of a snippet inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub section_id: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub snippet_text: String,
}

/// Who wrote a message: the reader, or one of the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Author {
    User,
    Agent(AgentId),
}

impl Author {
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Author::User => None,
            Author::Agent(id) => Some(*id),
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::User => f.write_str("user"),
            Author::Agent(id) => f.write_str(id.as_str()),
        }
    }
}

impl From<Author> for String {
    fn from(author: Author) -> Self {
        author.to_string()
    }
}

impl TryFrom<String> for Author {
    type Error = MarginaliaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().eq_ignore_ascii_case("user") {
            Ok(Author::User)
        } else {
            value.parse::<AgentId>().map(Author::Agent)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReference {
    pub section_id: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub thread_id: String,
    pub author: Author,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_type: Option<String>,
    #[serde(default)]
    pub references: Vec<MessageReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagged_agent: Option<AgentId>,
    pub timestamp: u64,
}

/// A realized discussion or comment. Messages are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub thread_id: String,
    pub document_id: String,
    pub seed_id: String,
    pub thread_type: ThreadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discussion_type: Option<DiscussionType>,
    pub tension_point: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub anchor: Anchor,
    pub participants: Vec<AgentId>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Thread {
    pub fn push_message(&mut self, message: Message) {
        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
    }
}
