//! Per-agent memory for Marginalia documents.
//!
//! Every (document, agent) pair owns one [`AgentMemory`] record holding
//! what the agent annotated, what it said in threads, and what users asked
//! it. The pipeline writes annotations and thoughts here and reads
//! condensed digests back when building generation prompts.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              AgentMemoryStore                │
//! │   read-through cache, per-key write mutex    │
//! └──────────────────────┬───────────────────────┘
//!                        │ write-through
//!            ┌───────────┴───────────┐
//!            ▼                       ▼
//!   ┌─────────────────┐    ┌───────────────────┐
//!   │ InMemoryBackend │    │  JsonFileBackend  │
//!   └─────────────────┘    │ <doc>/<agent>.json│
//!                          └───────────────────┘
//! ```

pub mod backend;
pub mod retrieval;
pub mod store;
pub mod types;

pub use backend::{build_backend, InMemoryBackend, JsonFileBackend, MemoryBackend};
pub use retrieval::format_summary;
pub use store::AgentMemoryStore;
pub use types::{
    AgentMemory, AnnotationInput, AnnotationMemory, BackendKind, InteractionMemory,
    KeyAnnotation, MemoryConfig, MemorySummary, ThoughtInput, ThoughtMemory,
};
