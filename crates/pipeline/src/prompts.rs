//! Prompt builders for each generation step.

use std::fmt::Write;

use marginalia_common::{AgentId, DiscussionType, Section, Seed};

use crate::clustering::Cluster;

/// A system and user instruction pair for one completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Reaction categories agents may attach to annotations and messages.
pub const ANNOTATION_TYPES: [(&str, &str); 6] = [
    ("confusing", "Something unclear, ambiguous, or hard to understand"),
    ("challenge", "Something you disagree with, question, or want to correct"),
    ("highlight", "A noteworthy point that deserves attention"),
    ("connect", "Linking to another concept, experience, or external idea"),
    ("probe", "Digging deeper into the issue or asking follow-up questions"),
    ("summarize", "Synthesizing or summarizing the key points"),
];

const DISCUSSION_CONTEXT_CHARS: usize = 1500;
const COMMENT_CONTEXT_CHARS: usize = 1000;
const SEED_SECTION_PREVIEW_CHARS: usize = 500;

fn annotation_types_block() -> String {
    ANNOTATION_TYPES
        .iter()
        .map(|(id, description)| format!("- {id}: {description}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn annotation_type_options() -> String {
    ANNOTATION_TYPES
        .iter()
        .map(|(id, _)| *id)
        .collect::<Vec<_>>()
        .join(" | ")
}

fn guidance(discussion_type: DiscussionType) -> &'static str {
    match discussion_type {
        DiscussionType::PositionTaking => "Take a clear stance and engage with opposing views",
        DiscussionType::Deepening => "Ask probing questions and explore nuances",
        DiscussionType::Connecting => "Bring concrete examples and make generalizations",
    }
}

fn discussion_type_name(discussion_type: DiscussionType) -> &'static str {
    match discussion_type {
        DiscussionType::PositionTaking => "position_taking",
        DiscussionType::Deepening => "deepening",
        DiscussionType::Connecting => "connecting",
    }
}

fn stance_block(agent: AgentId) -> String {
    format!(
        "<Your Reading Stance: {}>\n{}\n</Your Reading Stance>",
        agent.display_name(),
        agent.stance_description()
    )
}

fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Phase 1: one agent reads the whole document.
pub fn annotation_prompt(agent: AgentId, sections: &[Section], max_annotations: usize) -> Prompt {
    let system = format!(
        "You are a reader with the following perspective:\n\n{}\n\n\
         Read academic text and identify points that stand out from your perspective. \
         For each annotation, quote the EXACT text that triggered your reaction, \
         categorize the reaction, and explain it from your stance. \
         The \"text\" field is used to locate the annotation, so copy it precisely.",
        stance_block(agent)
    );

    let mut document = String::new();
    for section in sections {
        let _ = write!(document, "\n\n## {}\n{}", section.title, section.content);
    }
    let per_section = if sections.is_empty() {
        max_annotations
    } else {
        (max_annotations / sections.len()).max(2)
    };
    let titles: Vec<String> = sections.iter().map(|s| format!("- {}", s.title)).collect();

    let user = format!(
        "Read the following academic text and generate up to {max_annotations} annotations \
         from your perspective.\n\n\
         <Document>{document}\n</Document>\n\n\
         <Annotation Types>\n{types}\n</Annotation Types>\n\n\
         <Output Format>\n\
         Return a JSON object: {{\"annotations\": [{{\"type\": \"{options}\", \
         \"sectionTitle\": \"...\", \"text\": \"EXACT quote (1-3 sentences)\", \
         \"reasoning\": \"why this stands out (2-3 sentences)\"}}]}}\n\
         </Output Format>\n\n\
         <Section Coverage>\n\
         The document has {count} sections:\n{titles}\n\
         Spread annotations across all of them, roughly {per_section} per section.\n\
         </Section Coverage>",
        types = annotation_types_block(),
        options = annotation_type_options(),
        count = sections.len(),
        titles = titles.join("\n"),
    );

    Prompt { system, user }
}

/// Phase 2b: turn ranked clusters into discussion seeds.
pub fn seed_prompt(clusters: &[Cluster], sections: &[Section], target_seeds: usize) -> Prompt {
    let mut perspectives = String::new();
    for agent in AgentId::ALL {
        let _ = write!(perspectives, "\n- {}: {}", agent.display_name(), agent.stance_description());
    }
    let system = format!(
        "You are an expert at identifying productive discussion opportunities in academic reading. \
         Analyze clusters of annotations from different reading perspectives and find tension \
         points where perspectives converge, conflict, or could enrich each other.\n\n\
         The perspectives are:{perspectives}"
    );

    let mut clusters_text = String::new();
    for cluster in clusters {
        let agents: Vec<&str> = cluster.agents.iter().map(|a| a.as_str()).collect();
        let _ = write!(
            clusters_text,
            "\n\n### {} ({}, agents: {})\nSection: {}",
            cluster.cluster_id,
            cluster.overlap_type,
            agents.join(", "),
            cluster.section_title
        );
        for (i, ann) in cluster.annotations.iter().enumerate() {
            let _ = write!(
                clusters_text,
                "\n{}. [{}] {}: \"{}\"\n   Reasoning: {}",
                i + 1,
                ann.kind,
                ann.agent_id,
                ann.text,
                ann.reasoning
            );
        }
    }

    let mut sections_text = String::new();
    for section in sections {
        let _ = write!(
            sections_text,
            "\n\n## {}\n{}...",
            section.title,
            preview(&section.content, SEED_SECTION_PREVIEW_CHARS)
        );
    }

    let user = format!(
        "Form about {target_seeds} discussion seeds from these annotation clusters. \
         Clusters are listed richest first; prefer clusters with several agents.\n\n\
         <Annotation Clusters>{clusters_text}\n</Annotation Clusters>\n\n\
         <Document Sections>{sections_text}\n</Document Sections>\n\n\
         <Discussion Types>\n\
         - position_taking: {pt}\n- deepening: {dp}\n- connecting: {cn}\n\
         </Discussion Types>\n\n\
         <Output Format>\n\
         Return a JSON object: {{\"seeds\": [{{\"clusterId\": \"cluster_N\", \
         \"tensionPoint\": \"1-2 sentences\", \
         \"discussionType\": \"position_taking | deepening | connecting\", \
         \"snippetText\": \"EXACT text from the document\", \"sectionTitle\": \"...\", \
         \"relevantAgents\": [\"instrumental\", \"critical\", \"aesthetic\"], \
         \"keywords\": [\"...\"]}}]}}\n\
         </Output Format>\n\n\
         Each seed must come from exactly one cluster. snippetText must be verbatim from the document.",
        pt = guidance(DiscussionType::PositionTaking),
        dp = guidance(DiscussionType::Deepening),
        cn = guidance(DiscussionType::Connecting),
    );

    Prompt { system, user }
}

/// Phase 3-4, multi-agent case.
pub fn discussion_prompt(
    seed: &Seed,
    participants: &[AgentId],
    section: Option<&Section>,
    turns: usize,
    memories: &[(AgentId, String)],
) -> Prompt {
    let discussion_type = seed.discussion_type.unwrap_or(DiscussionType::Deepening);

    let mut participant_info = String::new();
    for agent in participants {
        let _ = write!(
            participant_info,
            "\n- {}: {}\n",
            agent.display_name(),
            agent.stance_description()
        );
    }

    let system = format!(
        "You are simulating an academic discussion between readers with different perspectives.\n\n\
         <Discussion Context>\nTension Point: {tension}\nDiscussion Type: {kind}\n\
         Type Guidance: {guide}\n</Discussion Context>\n\n\
         <Participants>{participant_info}</Participants>\n\n\
         <Annotation Types>\n{types}\n</Annotation Types>\n\n\
         Each message is 2-4 sentences. Agents respond to each other and build on earlier messages.",
        tension = seed.tension_point,
        kind = discussion_type_name(discussion_type),
        guide = guidance(discussion_type),
        types = annotation_types_block(),
    );

    let context = section
        .map(|s| preview(&s.content, DISCUSSION_CONTEXT_CHARS))
        .filter(|c| !c.is_empty())
        .unwrap_or("No additional context available.");
    let names: Vec<&str> = participants.iter().map(|a| a.as_str()).collect();
    let memory_text = memories
        .iter()
        .map(|(_, digest)| digest.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let user = format!(
        "Generate a {turns}-turn discussion about this tension point.\n\n\
         <Anchored Text>\n\"{snippet}\"\n</Anchored Text>\n\n\
         <Surrounding Context>\n{context}\n</Surrounding Context>\n\n\
         <Participant Memories>\n{memory_text}\n</Participant Memories>\n\n\
         <Participants for this discussion>\n{names}\n</Participants for this discussion>\n\n\
         <Output Format>\n\
         Return a JSON object: {{\"messages\": [{{\"author\": \"{names_alt}\", \
         \"content\": \"2-4 sentences\", \"annotationType\": \"{options}\"}}]}}\n\
         </Output Format>\n\n\
         Alternate speakers so each participant speaks at least once, and end by \
         synthesizing or opening a new question.",
        snippet = seed.snippet_text,
        names = names.join(", "),
        names_alt = names.join(" | "),
        options = annotation_type_options(),
    );

    Prompt { system, user }
}

/// Phase 3-4, single-agent case.
pub fn comment_prompt(
    seed: &Seed,
    agent: AgentId,
    section: Option<&Section>,
    memory: &str,
) -> Prompt {
    let system = format!(
        "You are a reader with the following perspective:\n\n{}\n\n\
         <Annotation Types>\n{}\n</Annotation Types>\n\n\
         You are writing a thoughtful comment about a specific passage in an academic text.",
        stance_block(agent),
        annotation_types_block()
    );

    let context = section
        .map(|s| preview(&s.content, COMMENT_CONTEXT_CHARS))
        .filter(|c| !c.is_empty())
        .unwrap_or("No additional context.");

    let user = format!(
        "Write a comment about this passage from your perspective.\n\n\
         <Passage>\n\"{snippet}\"\n</Passage>\n\n\
         <Context>\nTension Point: {tension}\n</Context>\n\n\
         <Surrounding Text>\n{context}\n</Surrounding Text>\n\n\
         {memory}\n\n\
         <Output Format>\n\
         Return a JSON object: {{\"content\": \"3-5 sentences\", \"annotationType\": \"{options}\"}}\n\
         </Output Format>",
        snippet = seed.snippet_text,
        tension = seed.tension_point,
        options = annotation_type_options(),
    );

    Prompt { system, user }
}
