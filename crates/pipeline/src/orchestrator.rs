//! End-to-end discussion generation for one document.
//!
//! Phases run strictly in order, with fan-out inside the two generation
//! phases:
//!
//! ```text
//! sections ──► annotations (per agent, concurrent)
//!          ──► dedup ──► clusters ──► seeds (one request)
//!          ──► threads (per seed, concurrent) ──► agent memory
//! ```
//!
//! A failed agent or a failed seed only removes its own output. Failing to
//! form seeds fails the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use marginalia_common::{
    find_by_title, now_millis, section_order, short_id, AgentId, Annotation, AnnotationsByAgent,
    Author, DiscussionType, MarginaliaError, Message, Result, Section, Seed, Thread, ThreadType,
};
use marginalia_llm::{build_llm_client, generate_json, LlmClient};
use marginalia_memory::{build_backend, AgentMemoryStore, AnnotationInput, ThoughtInput};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::anchor::resolve_anchor;
use crate::clustering::{cluster, format_clusters_summary, Cluster};
use crate::config::{GenerationOptions, MarginaliaConfig};
use crate::dedup::dedupe;
use crate::prompts;
use crate::status::GenerationStatusStore;

/// Section id recorded when a document has no sections to anchor to.
const FALLBACK_SECTION_ID: &str = "section_0";

/// Wall-clock duration of each phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub annotations_ms: u64,
    pub clustering_ms: u64,
    pub seeds_ms: u64,
    pub threads_ms: u64,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub document_id: String,
    /// Deduplicated annotations per agent
    pub annotations: AnnotationsByAgent,
    pub clusters: Vec<Cluster>,
    pub seeds: Vec<Seed>,
    pub threads: Vec<Thread>,
    pub timings: PhaseTimings,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotationsReply {
    #[serde(default)]
    annotations: Vec<RawAnnotation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnnotation {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    section_title: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Default, Deserialize)]
struct SeedsReply {
    #[serde(default)]
    seeds: Vec<RawSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSeed {
    #[serde(default)]
    cluster_id: String,
    #[serde(default)]
    tension_point: String,
    #[serde(default)]
    discussion_type: Option<String>,
    #[serde(default)]
    snippet_text: String,
    #[serde(default)]
    section_title: String,
    #[serde(default)]
    relevant_agents: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

impl RawSeed {
    fn into_seed(self) -> Seed {
        let discussion_type = self
            .discussion_type
            .as_deref()
            .and_then(|t| t.parse::<DiscussionType>().ok());
        Seed {
            seed_id: short_id("seed"),
            cluster_id: self.cluster_id,
            tension_point: self.tension_point,
            discussion_type,
            snippet_text: self.snippet_text,
            section_title: self.section_title,
            relevant_agents: self.relevant_agents,
            keywords: self.keywords,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MessagesReply {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    author: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    annotation_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentReply {
    #[serde(default)]
    content: String,
    #[serde(default)]
    annotation_type: Option<String>,
}

/// Drives a document from sections to threads.
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    memory: Arc<AgentMemoryStore>,
    status: Arc<GenerationStatusStore>,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: Arc<AgentMemoryStore>,
        status: Arc<GenerationStatusStore>,
    ) -> Self {
        Self {
            llm,
            memory,
            status,
        }
    }

    /// Wire up the configured completion client and memory backend.
    pub fn from_config(config: &MarginaliaConfig) -> Result<Self> {
        let llm = build_llm_client(&config.llm)?;
        let backend = build_backend(&config.memory);
        let memory = Arc::new(AgentMemoryStore::new(backend, &config.memory));
        Ok(Self::new(llm, memory, Arc::new(GenerationStatusStore::new())))
    }

    pub fn memory(&self) -> &Arc<AgentMemoryStore> {
        &self.memory
    }

    pub fn status(&self) -> &Arc<GenerationStatusStore> {
        &self.status
    }

    /// Run the pipeline while recording status for the document.
    ///
    /// Refuses to start while another tracked run for the same document is
    /// in progress. Dropping the future mid-run records the run as
    /// cancelled.
    pub async fn run_tracked(
        &self,
        document_id: &str,
        sections: &[Section],
        options: &GenerationOptions,
    ) -> Result<PipelineOutput> {
        let guard = self.status.begin(document_id)?;

        let result = self.run(document_id, sections, options).await;
        match &result {
            Ok(output) => guard.complete(output.threads.len()),
            Err(e) => guard.fail(e.to_string()),
        }
        result
    }

    pub async fn run(
        &self,
        document_id: &str,
        sections: &[Section],
        options: &GenerationOptions,
    ) -> Result<PipelineOutput> {
        if sections.is_empty() {
            return Err(MarginaliaError::Pipeline(format!(
                "Document {document_id} has no sections to annotate"
            )));
        }

        info!(document_id = %document_id, sections = sections.len(), "Starting pipeline");
        self.memory.initialize_for_document(document_id).await?;

        let mut timings = PhaseTimings::default();

        let phase_start = Instant::now();
        let raw = self.generate_annotations(document_id, sections, options).await;
        let total: usize = raw.values().map(Vec::len).sum();
        timings.annotations_ms = phase_start.elapsed().as_millis() as u64;
        info!(
            document_id = %document_id,
            phase = "annotations",
            total,
            duration_ms = timings.annotations_ms,
            "Phase complete"
        );

        let phase_start = Instant::now();
        let annotations = dedupe(raw, &section_order(sections));
        let clusters = cluster(&annotations);
        timings.clustering_ms = phase_start.elapsed().as_millis() as u64;
        info!(
            document_id = %document_id,
            phase = "clustering",
            clusters = clusters.len(),
            multi_agent = clusters.iter().filter(|c| c.agent_count > 1).count(),
            "Phase complete"
        );
        debug!("Clusters:\n{}", format_clusters_summary(&clusters));

        let phase_start = Instant::now();
        let seeds = self.form_seeds(&clusters, sections, options).await?;
        timings.seeds_ms = phase_start.elapsed().as_millis() as u64;
        info!(
            document_id = %document_id,
            phase = "seeds",
            seeds = seeds.len(),
            "Phase complete"
        );

        let phase_start = Instant::now();
        let threads = self
            .generate_threads(document_id, &seeds, sections, options)
            .await;
        timings.threads_ms = phase_start.elapsed().as_millis() as u64;
        info!(
            document_id = %document_id,
            phase = "threads",
            threads = threads.len(),
            failed = seeds.len() - threads.len(),
            "Phase complete"
        );

        Ok(PipelineOutput {
            document_id: document_id.to_string(),
            annotations,
            clusters,
            seeds,
            threads,
            timings,
        })
    }

    /// Phase 1. Every agent runs concurrently; a failing agent contributes
    /// an empty list.
    async fn generate_annotations(
        &self,
        document_id: &str,
        sections: &[Section],
        options: &GenerationOptions,
    ) -> AnnotationsByAgent {
        let sections: Arc<[Section]> = Arc::from(sections);
        let mut handles = Vec::new();

        for agent in AgentId::ALL {
            let llm = self.llm.clone();
            let memory = self.memory.clone();
            let sections = sections.clone();
            let options = options.clone();
            let document_id = document_id.to_string();

            let handle = tokio::spawn(async move {
                annotate_as(agent, llm, memory, &document_id, &sections, &options).await
            });
            handles.push((agent, handle));
        }

        let mut by_agent = AnnotationsByAgent::new();
        for (agent, handle) in handles {
            let annotations = match handle.await {
                Ok(Ok(annotations)) => annotations,
                Ok(Err(e)) => {
                    warn!(agent_id = %agent, error = %e, "Annotation generation failed");
                    Vec::new()
                }
                Err(e) => {
                    error!(agent_id = %agent, error = %e, "Annotation task join error");
                    Vec::new()
                }
            };
            by_agent.insert(agent, annotations);
        }
        by_agent
    }

    /// Phase 2b. One request over every cluster; failure is fatal.
    async fn form_seeds(
        &self,
        clusters: &[Cluster],
        sections: &[Section],
        options: &GenerationOptions,
    ) -> Result<Vec<Seed>> {
        if clusters.is_empty() {
            warn!("No clusters to form seeds from");
            return Ok(Vec::new());
        }

        let prompt = prompts::seed_prompt(clusters, sections, options.target_seeds);
        let reply: SeedsReply = generate_json(
            self.llm.as_ref(),
            &prompt.system,
            &prompt.user,
            options.seed_temperature,
        )
        .await
        .map_err(|e| MarginaliaError::Pipeline(format!("Seed formation failed: {e}")))?;

        let known: HashSet<&str> = clusters.iter().map(|c| c.cluster_id.as_str()).collect();
        let seeds: Vec<Seed> = reply.seeds.into_iter().map(RawSeed::into_seed).collect();
        for seed in &seeds {
            if !known.contains(seed.cluster_id.as_str()) {
                warn!(
                    seed_id = %seed.seed_id,
                    cluster_id = %seed.cluster_id,
                    "Seed names an unknown cluster"
                );
            }
        }
        Ok(seeds)
    }

    /// Phases 3-4. Every seed runs concurrently; a failing seed yields no
    /// thread. Results keep seed order.
    async fn generate_threads(
        &self,
        document_id: &str,
        seeds: &[Seed],
        sections: &[Section],
        options: &GenerationOptions,
    ) -> Vec<Thread> {
        let tasks = seeds
            .iter()
            .map(|seed| self.generate_thread(document_id, seed, sections, options));
        let results = join_all(tasks).await;

        let mut threads = Vec::new();
        for (seed, result) in seeds.iter().zip(results) {
            match result {
                Ok(thread) => threads.push(thread),
                Err(e) => warn!(seed_id = %seed.seed_id, error = %e, "Thread generation failed"),
            }
        }
        threads
    }

    async fn generate_thread(
        &self,
        document_id: &str,
        seed: &Seed,
        sections: &[Section],
        options: &GenerationOptions,
    ) -> Result<Thread> {
        let participants = seed.participants();
        let thread_type = ThreadType::for_participants(participants.len());

        let section = find_by_title(sections, &seed.section_title).or_else(|| sections.first());
        let section_id = section
            .map(|s| s.section_id.clone())
            .unwrap_or_else(|| FALLBACK_SECTION_ID.to_string());
        let anchor = resolve_anchor(&seed.snippet_text, section).into_anchor(section_id.clone());
        let section_ids = vec![section_id];

        let mut digests = Vec::with_capacity(participants.len());
        for agent in &participants {
            let digest = self
                .memory
                .format_for_prompt(document_id, *agent, &section_ids, &seed.keywords)
                .await?;
            digests.push((*agent, digest));
        }

        let raw_messages = match thread_type {
            ThreadType::Discussion => {
                let prompt = prompts::discussion_prompt(
                    seed,
                    &participants,
                    section,
                    options.turns_per_discussion,
                    &digests,
                );
                let reply: MessagesReply = generate_json(
                    self.llm.as_ref(),
                    &prompt.system,
                    &prompt.user,
                    options.discussion_temperature,
                )
                .await?;
                accept_messages(reply.messages, &participants)
            }
            ThreadType::Comment => {
                let agent = participants[0];
                let digest = digests.first().map(|(_, d)| d.as_str()).unwrap_or_default();
                let prompt = prompts::comment_prompt(seed, agent, section, digest);
                let reply: CommentReply = generate_json(
                    self.llm.as_ref(),
                    &prompt.system,
                    &prompt.user,
                    options.comment_temperature,
                )
                .await?;
                let content = reply.content.trim().to_string();
                if content.is_empty() {
                    Vec::new()
                } else {
                    vec![(agent, content, reply.annotation_type)]
                }
            }
        };

        if raw_messages.is_empty() {
            return Err(MarginaliaError::Generation(format!(
                "No usable messages for seed {}",
                seed.seed_id
            )));
        }

        let now = now_millis();
        let mut thread = Thread {
            thread_id: short_id("thread"),
            document_id: document_id.to_string(),
            seed_id: seed.seed_id.clone(),
            thread_type,
            discussion_type: match thread_type {
                ThreadType::Discussion => seed.discussion_type,
                ThreadType::Comment => None,
            },
            tension_point: seed.tension_point.clone(),
            keywords: seed.keywords.clone(),
            anchor,
            participants,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        for (author, content, annotation_type) in raw_messages {
            thread.push_message(Message {
                message_id: short_id("msg"),
                thread_id: thread.thread_id.clone(),
                author: Author::Agent(author),
                content,
                annotation_type: annotation_type.filter(|t| !t.is_empty()),
                references: Vec::new(),
                tagged_agent: None,
                timestamp: now,
            });
        }

        self.remember_thread(&thread).await;

        debug!(
            seed_id = %seed.seed_id,
            thread_id = %thread.thread_id,
            messages = thread.messages.len(),
            "Generated thread"
        );
        Ok(thread)
    }

    /// Append each message to its author's memory, in order, pointing back
    /// at the previous speaker.
    async fn remember_thread(&self, thread: &Thread) {
        let mut previous: Option<Author> = None;
        for message in &thread.messages {
            let Some(agent) = message.author.agent() else {
                previous = Some(message.author);
                continue;
            };
            let thought = ThoughtInput {
                thread_id: thread.thread_id.clone(),
                message_id: message.message_id.clone(),
                content: message.content.clone(),
                tension_point: thread.tension_point.clone(),
                annotation_type: message.annotation_type.clone(),
                responding_to: previous.map(|a| a.to_string()),
                referenced_section_ids: vec![thread.anchor.section_id.clone()],
                referenced_annotation_ids: Vec::new(),
            };
            if let Err(e) = self
                .memory
                .store_thought(&thread.document_id, agent, thought)
                .await
            {
                warn!(
                    thread_id = %thread.thread_id,
                    agent_id = %agent,
                    error = %e,
                    "Failed to store thought"
                );
            }
            previous = Some(message.author);
        }
    }
}

/// Generate, then persist, one agent's annotations.
async fn annotate_as(
    agent: AgentId,
    llm: Arc<dyn LlmClient>,
    memory: Arc<AgentMemoryStore>,
    document_id: &str,
    sections: &[Section],
    options: &GenerationOptions,
) -> Result<Vec<Annotation>> {
    let prompt = prompts::annotation_prompt(agent, sections, options.max_annotations_per_agent);
    let reply: AnnotationsReply = generate_json(
        llm.as_ref(),
        &prompt.system,
        &prompt.user,
        options.annotation_temperature,
    )
    .await?;

    let annotations: Vec<Annotation> = reply
        .annotations
        .into_iter()
        .filter(|a| !a.text.trim().is_empty())
        .map(|a| Annotation::new(agent, a.section_title, a.text, a.kind).with_reasoning(a.reasoning))
        .collect();

    let inputs = annotations
        .iter()
        .map(|a| annotation_input(a, sections))
        .collect();
    if let Err(e) = memory.store_annotations(document_id, agent, inputs).await {
        warn!(agent_id = %agent, error = %e, "Failed to persist annotations");
    }

    debug!(agent_id = %agent, count = annotations.len(), "Generated annotations");
    Ok(annotations)
}

/// Memory record input for an annotation, locating its quote when the
/// section title is known. An unknown title keeps the title as section id
/// and spans the whole quote.
fn annotation_input(annotation: &Annotation, sections: &[Section]) -> AnnotationInput {
    let (section_id, start_offset, end_offset) =
        match find_by_title(sections, &annotation.section_title) {
            Some(section) => {
                let anchor = resolve_anchor(&annotation.text, Some(section));
                (section.section_id.clone(), anchor.start_offset, anchor.end_offset)
            }
            None => (
                annotation.section_title.clone(),
                0,
                annotation.text.chars().count(),
            ),
        };
    AnnotationInput {
        section_id,
        target_text: annotation.text.clone(),
        start_offset,
        end_offset,
        annotation_type: annotation.kind.clone(),
        reasoning: annotation.reasoning.clone(),
    }
}

/// Keep messages written by a thread participant with non-empty content.
fn accept_messages(
    raw: Vec<RawMessage>,
    participants: &[AgentId],
) -> Vec<(AgentId, String, Option<String>)> {
    raw.into_iter()
        .filter_map(|m| {
            let author = m.author.parse::<AgentId>().ok()?;
            let content = m.content.trim().to_string();
            if !participants.contains(&author) || content.is_empty() {
                debug!(author = %m.author, "Dropping message from unknown author or empty content");
                return None;
            }
            Some((author, content, m.annotation_type))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(author: &str, content: &str) -> RawMessage {
        RawMessage {
            author: author.to_string(),
            content: content.to_string(),
            annotation_type: Some("probe".to_string()),
        }
    }

    #[test]
    fn messages_from_non_participants_are_dropped() {
        let accepted = accept_messages(
            vec![
                raw("critical", "Is this sample enough?"),
                raw("moderator", "Let's move on."),
                raw("aesthetic", "Not in this thread."),
                raw("Instrumental", "It is for a pilot."),
                raw("critical", "   "),
            ],
            &[AgentId::Critical, AgentId::Instrumental],
        );
        let authors: Vec<AgentId> = accepted.iter().map(|(a, _, _)| *a).collect();
        assert_eq!(authors, vec![AgentId::Critical, AgentId::Instrumental]);
    }

    #[test]
    fn raw_seed_parses_known_discussion_type_only() {
        let seed: RawSeed = serde_json::from_str(
            r#"{"clusterId":"cluster_0","tensionPoint":"t","discussionType":"deepening",
                "snippetText":"s","sectionTitle":"Intro","relevantAgents":["critical"]}"#,
        )
        .unwrap();
        let seed = seed.into_seed();
        assert!(seed.seed_id.starts_with("seed_"));
        assert_eq!(seed.discussion_type, Some(DiscussionType::Deepening));
        assert!(seed.keywords.is_empty());

        let odd: RawSeed =
            serde_json::from_str(r#"{"discussionType":"debate","tensionPoint":"t"}"#).unwrap();
        assert_eq!(odd.into_seed().discussion_type, None);
    }

    #[test]
    fn annotation_input_resolves_section_and_offsets() {
        let sections = vec![Section::new(
            "sec_m",
            "Methods",
            "We interviewed 45 students over a semester.",
            1,
        )];
        let annotation = Annotation::new(AgentId::Critical, "Methods", "45 students", "challenge");
        let input = annotation_input(&annotation, &sections);
        assert_eq!(input.section_id, "sec_m");
        assert_eq!((input.start_offset, input.end_offset), (15, 26));

        let quote = "a".repeat(140);
        let stray = Annotation::new(AgentId::Critical, "Appendix", quote.as_str(), "challenge");
        let input = annotation_input(&stray, &sections);
        assert_eq!(input.section_id, "Appendix");
        assert_eq!((input.start_offset, input.end_offset), (0, 140));
    }
}
