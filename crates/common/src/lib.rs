//! Common types shared across Marginalia crates.
//!
//! This crate holds the document, annotation, seed and thread vocabulary
//! that the memory store and the pipeline both speak.

pub mod agent;
pub mod annotation;
pub mod document;
pub mod error;
pub mod ids;
pub mod seed;
pub mod thread;

pub use agent::AgentId;
pub use annotation::Annotation;
pub use document::{find_by_title, section_order, Section};
pub use error::{MarginaliaError, Result};
pub use ids::{now_millis, short_id};
pub use seed::{DiscussionType, Seed};
pub use thread::{Anchor, Author, Message, MessageReference, Thread, ThreadType};

/// Annotations keyed by their authoring agent, iterated in fixed agent order.
pub type AnnotationsByAgent = std::collections::BTreeMap<AgentId, Vec<Annotation>>;
