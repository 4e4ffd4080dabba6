//! Cross-section deduplication of one agent's annotations.

use std::collections::{HashMap, HashSet};

use marginalia_common::{Annotation, AnnotationsByAgent};
use tracing::{debug, info};

use crate::matcher::overlaps;

/// Rank given to sections missing from the document order.
const UNKNOWN_SECTION_RANK: usize = 999;

/// Drop annotations that restate, in a later section, a passage the same
/// agent already annotated in an earlier one.
///
/// Only pairs from different sections of the same agent are compared.
/// When a pair overlaps, the one whose section comes later in
/// `section_order` is dropped; equal ranks keep the earlier entry. Output
/// keeps the input order minus dropped entries.
pub fn dedupe(by_agent: AnnotationsByAgent, section_order: &[String]) -> AnnotationsByAgent {
    let rank: HashMap<&str, usize> = section_order
        .iter()
        .enumerate()
        .map(|(i, title)| (title.as_str(), i))
        .collect();
    let rank_of = |a: &Annotation| {
        rank.get(a.section_title.as_str())
            .copied()
            .unwrap_or(UNKNOWN_SECTION_RANK)
    };

    let mut total_dropped = 0;
    let mut deduped = AnnotationsByAgent::new();

    for (agent_id, annotations) in by_agent {
        let mut dropped: HashSet<usize> = HashSet::new();

        for i in 0..annotations.len() {
            if dropped.contains(&i) {
                continue;
            }
            for j in (i + 1)..annotations.len() {
                if dropped.contains(&j) {
                    continue;
                }
                let (a, b) = (&annotations[i], &annotations[j]);
                if a.section_title == b.section_title || !overlaps(&a.text, &b.text) {
                    continue;
                }
                if rank_of(a) <= rank_of(b) {
                    dropped.insert(j);
                } else {
                    dropped.insert(i);
                    break;
                }
            }
        }

        if !dropped.is_empty() {
            debug!(agent_id = %agent_id, dropped = dropped.len(), "Dropped cross-section duplicates");
            total_dropped += dropped.len();
        }

        let kept = annotations
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(_, a)| a)
            .collect();
        deduped.insert(agent_id, kept);
    }

    if total_dropped > 0 {
        info!(total_dropped, "Deduplicated annotations");
    }

    deduped
}
