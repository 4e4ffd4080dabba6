//! Relevance ranking and prompt digests over an agent's memory.

use crate::types::{AgentMemory, AnnotationMemory, KeyAnnotation, MemorySummary, ThoughtMemory};

/// Fields longer than this are cut in digests.
const DIGEST_FIELD_CHARS: usize = 100;

/// Annotations ranked for a discussion context.
///
/// Restricts to `section_ids` when non-empty, then orders by how many of the
/// `keywords` appear (case-insensitive) in target text plus reasoning. The
/// sort is stable, so ties keep insertion order.
pub fn relevant_annotations<'a>(
    memory: &'a AgentMemory,
    section_ids: &[String],
    keywords: &[String],
    limit: usize,
) -> Vec<&'a AnnotationMemory> {
    let mut candidates: Vec<&AnnotationMemory> = memory
        .annotations
        .iter()
        .filter(|a| section_ids.is_empty() || section_ids.contains(&a.section_id))
        .collect();

    if !keywords.is_empty() {
        let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        candidates.sort_by_key(|a| std::cmp::Reverse(keyword_score(a, &lowered)));
    }

    candidates.truncate(limit);
    candidates
}

fn keyword_score(annotation: &AnnotationMemory, lowered_keywords: &[String]) -> usize {
    let haystack = format!("{} {}", annotation.target_text, annotation.reasoning).to_lowercase();
    lowered_keywords
        .iter()
        .filter(|k| haystack.contains(k.as_str()))
        .count()
}

/// Thoughts newest first, optionally restricted to one thread.
pub fn recent_thoughts<'a>(
    memory: &'a AgentMemory,
    thread_id: Option<&str>,
    limit: usize,
) -> Vec<&'a ThoughtMemory> {
    // Reverse first so equal timestamps still come out latest-stored first.
    let mut thoughts: Vec<&ThoughtMemory> = memory
        .thoughts
        .iter()
        .rev()
        .filter(|t| thread_id.map_or(true, |id| t.thread_id == id))
        .collect();
    thoughts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    thoughts.truncate(limit);
    thoughts
}

/// Build the bounded summary used for prompt injection.
pub fn build_summary(
    memory: &AgentMemory,
    section_ids: &[String],
    keywords: &[String],
    max_annotations: usize,
    max_thoughts: usize,
) -> MemorySummary {
    let key_annotations = relevant_annotations(memory, section_ids, keywords, max_annotations)
        .into_iter()
        .map(|a| KeyAnnotation {
            text: truncate(&a.target_text, DIGEST_FIELD_CHARS),
            kind: a.annotation_type.clone(),
            reasoning: truncate(&a.reasoning, DIGEST_FIELD_CHARS),
        })
        .collect();

    let recent_thoughts = recent_thoughts(memory, None, max_thoughts)
        .into_iter()
        .map(|t| t.content.clone())
        .collect();

    let last_user_interaction = memory
        .interactions
        .iter()
        .enumerate()
        .max_by_key(|(idx, i)| (i.created_at, *idx))
        .map(|(_, i)| i.user_content.clone());

    let mut engaged_sections: Vec<String> = Vec::new();
    for annotation in &memory.annotations {
        if !engaged_sections.contains(&annotation.section_id) {
            engaged_sections.push(annotation.section_id.clone());
        }
    }

    MemorySummary {
        agent_id: memory.agent_id,
        document_id: memory.document_id.clone(),
        key_annotations,
        recent_thoughts,
        has_interacted_with_user: !memory.interactions.is_empty(),
        last_user_interaction,
        engaged_sections,
    }
}

/// Render a summary as the tagged text block placed in generation prompts.
pub fn format_summary(summary: &MemorySummary) -> String {
    let mut lines = vec![format!("<Agent Memory: {}>", summary.agent_id)];

    if !summary.key_annotations.is_empty() {
        lines.push("\n<Your Previous Annotations>".to_string());
        for (i, ann) in summary.key_annotations.iter().enumerate() {
            lines.push(format!("{}. [{}] \"{}\"", i + 1, ann.kind, ann.text));
            lines.push(format!("   Reason: {}", ann.reasoning));
        }
        lines.push("</Your Previous Annotations>".to_string());
    }

    if !summary.recent_thoughts.is_empty() {
        lines.push("\n<Your Recent Statements>".to_string());
        for (i, thought) in summary.recent_thoughts.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, thought));
        }
        lines.push("</Your Recent Statements>".to_string());
    }

    if summary.has_interacted_with_user {
        lines.push("\n<User Interaction History>".to_string());
        lines.push("You have interacted with the user before.".to_string());
        if let Some(ref last) = summary.last_user_interaction {
            lines.push(format!("Last user message to you: \"{last}\""));
        }
        lines.push("</User Interaction History>".to_string());
    }

    lines.push("</Agent Memory>".to_string());
    lines.join("\n")
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
