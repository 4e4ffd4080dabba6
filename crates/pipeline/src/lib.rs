//! Marginalia discussion pipeline.
//!
//! Turns a sectioned document into anchored discussion threads between
//! reading-stance agents:
//!
//! 1. Every agent annotates the document concurrently.
//! 2. Near-duplicate annotations are dropped and the rest grouped into
//!    clusters by section and text overlap.
//! 3. One completion turns the clusters into discussion seeds.
//! 4. Each seed becomes a comment or a multi-agent discussion, anchored to
//!    the section text and written back to each participant's memory.
//!
//! [`Pipeline`] drives the phases; the remaining modules are the pure
//! building blocks and can be used on their own.

pub mod anchor;
pub mod clustering;
pub mod config;
pub mod dedup;
pub mod matcher;
pub mod orchestrator;
pub mod prompts;
pub mod status;

pub use anchor::{resolve_anchor, ResolvedAnchor};
pub use clustering::{cluster, format_clusters_summary, Cluster, OverlapType};
pub use config::{GenerationOptions, MarginaliaConfig};
pub use dedup::dedupe;
pub use matcher::{longest_common_run, overlaps, similarity};
pub use orchestrator::{PhaseTimings, Pipeline, PipelineOutput};
pub use prompts::{Prompt, ANNOTATION_TYPES};
pub use status::{GenerationStatus, GenerationStatusStore, RunGuard};
