//! Grouping annotations into clusters by section and text proximity.

use std::collections::BTreeSet;
use std::fmt;

use marginalia_common::{AgentId, Annotation, AnnotationsByAgent};
use serde::{Deserialize, Serialize};

use crate::matcher::overlaps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapType {
    /// A single annotation
    Standalone,
    /// At least one pair of members overlaps directly
    TextOverlap,
    /// Several members with no directly overlapping pair
    SameSectionNearby,
}

impl OverlapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlapType::Standalone => "standalone",
            OverlapType::TextOverlap => "text_overlap",
            OverlapType::SameSectionNearby => "same_section_nearby",
        }
    }

    /// Classify a cluster's members.
    ///
    /// Membership only grows through direct overlaps, so a multi-member
    /// cluster always has an overlapping pair and `SameSectionNearby` is not
    /// produced by [`cluster`] today.
    pub fn classify(members: &[Annotation]) -> Self {
        if members.len() <= 1 {
            return OverlapType::Standalone;
        }
        for (i, a) in members.iter().enumerate() {
            if members[i + 1..].iter().any(|b| overlaps(&a.text, &b.text)) {
                return OverlapType::TextOverlap;
            }
        }
        OverlapType::SameSectionNearby
    }
}

impl fmt::Display for OverlapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotations from one section that refer to the same passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub cluster_id: String,
    pub section_title: String,
    pub annotations: Vec<Annotation>,
    /// Contributing agents, in fixed agent order
    pub agents: Vec<AgentId>,
    pub overlap_type: OverlapType,
    pub annotation_count: usize,
    pub agent_count: usize,
}

impl Cluster {
    fn from_members(idx: usize, section_title: &str, members: Vec<Annotation>) -> Self {
        let agents: Vec<AgentId> = members
            .iter()
            .map(|a| a.agent_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let overlap_type = OverlapType::classify(&members);

        Self {
            cluster_id: format!("cluster_{idx}"),
            section_title: section_title.to_string(),
            agent_count: agents.len(),
            annotation_count: members.len(),
            annotations: members,
            agents,
            overlap_type,
        }
    }
}

/// Group every agent's annotations into clusters.
///
/// Annotations are partitioned by section title (first-appearance order),
/// then each section is split into connected components of the overlap
/// relation. Clusters are returned richest first: more agents, then more
/// annotations. The sort is stable, so equal clusters keep discovery order.
pub fn cluster(by_agent: &AnnotationsByAgent) -> Vec<Cluster> {
    let mut sections: Vec<(&str, Vec<&Annotation>)> = Vec::new();
    for annotation in by_agent.values().flatten() {
        let title = annotation.section_title.as_str();
        match sections.iter_mut().find(|(t, _)| *t == title) {
            Some((_, members)) => members.push(annotation),
            None => sections.push((title, vec![annotation])),
        }
    }

    let mut clusters = Vec::new();

    for (section_title, annotations) in sections {
        let mut clustered = vec![false; annotations.len()];

        for i in 0..annotations.len() {
            if clustered[i] {
                continue;
            }
            clustered[i] = true;
            let mut members: Vec<&Annotation> = vec![annotations[i]];

            for j in (i + 1)..annotations.len() {
                if !clustered[j] && overlaps(&annotations[i].text, &annotations[j].text) {
                    members.push(annotations[j]);
                    clustered[j] = true;
                }
            }

            // Absorb anything reachable through a chain of overlaps.
            let mut changed = true;
            while changed {
                changed = false;
                for j in 0..annotations.len() {
                    if clustered[j] {
                        continue;
                    }
                    if members.iter().any(|m| overlaps(&m.text, &annotations[j].text)) {
                        members.push(annotations[j]);
                        clustered[j] = true;
                        changed = true;
                    }
                }
            }

            let owned = members.into_iter().cloned().collect();
            clusters.push(Cluster::from_members(clusters.len(), section_title, owned));
        }
    }

    clusters.sort_by(|a, b| {
        (b.agent_count, b.annotation_count).cmp(&(a.agent_count, a.annotation_count))
    });
    clusters
}

/// One line per cluster, for debug logging.
pub fn format_clusters_summary(clusters: &[Cluster]) -> String {
    clusters
        .iter()
        .map(|c| {
            let agents: Vec<&str> = c.agents.iter().map(|a| a.as_str()).collect();
            format!(
                "  [{}] {} | {} | {} agents ({}) | {} annotations",
                c.cluster_id,
                c.section_title,
                c.overlap_type,
                c.agent_count,
                agents.join(", "),
                c.annotation_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(agent: AgentId, section: &str, text: &str) -> Annotation {
        Annotation::new(agent, section, text, "highlight")
    }

    fn by_agent(annotations: Vec<Annotation>) -> AnnotationsByAgent {
        let mut map = AnnotationsByAgent::new();
        for a in annotations {
            map.entry(a.agent_id).or_default().push(a);
        }
        map
    }

    fn ids_of(cluster: &Cluster) -> Vec<&str> {
        cluster.annotations.iter().map(|a| a.text.as_str()).collect()
    }

    #[test]
    fn separate_passages_stay_separate() {
        let input = by_agent(vec![
            ann(AgentId::Critical, "Methods", "the sample size of 45 is small"),
            ann(
                AgentId::Instrumental,
                "Methods",
                "45 participants across three disciplines",
            ),
        ]);
        let clusters = cluster(&input);
        assert_eq!(clusters.len(), 2);
        assert!(clusters
            .iter()
            .all(|c| c.agent_count == 1 && c.overlap_type == OverlapType::Standalone));
    }

    #[test]
    fn transitive_chain_forms_one_cluster() {
        // A ~ B and B ~ C through shared runs, but A and C share nothing.
        let a = "Rising tuition costs push students toward part-time work during term";
        let b = "push students toward part-time work during term, which erodes the hours available for study";
        let c = "which erodes the hours available for study and lowers exam performance overall";
        assert!(!overlaps(a, c));

        let input = by_agent(vec![
            ann(AgentId::Instrumental, "Discussion", a),
            ann(AgentId::Critical, "Discussion", c),
            ann(AgentId::Aesthetic, "Discussion", b),
        ]);
        let clusters = cluster(&input);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].annotation_count, 3);
        assert_eq!(
            clusters[0].agents,
            vec![AgentId::Instrumental, AgentId::Critical, AgentId::Aesthetic]
        );
        assert_eq!(clusters[0].overlap_type, OverlapType::TextOverlap);
        // Seed first, then what the closure pass picks up in scan order.
        assert_eq!(ids_of(&clusters[0]), vec![a, b, c]);
    }

    #[test]
    fn clusters_never_span_sections() {
        let text = "the intervention doubled reading fluency";
        let input = by_agent(vec![
            ann(AgentId::Instrumental, "Results", text),
            ann(AgentId::Critical, "Discussion", text),
        ]);
        let clusters = cluster(&input);
        assert_eq!(clusters.len(), 2);
        let total: usize = clusters.iter().map(|c| c.annotation_count).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn richest_clusters_first_and_stable() {
        let shared = "instructors reported higher engagement in flipped classrooms";
        let input = by_agent(vec![
            ann(AgentId::Instrumental, "Intro", "an unrelated framing remark"),
            ann(AgentId::Instrumental, "Results", shared),
            ann(AgentId::Critical, "Results", shared),
            ann(AgentId::Critical, "Intro", "why were mixed methods never justified?"),
        ]);
        let clusters = cluster(&input);
        let order: Vec<(&str, usize)> = clusters
            .iter()
            .map(|c| (c.cluster_id.as_str(), c.agent_count))
            .collect();
        assert_eq!(
            order,
            vec![("cluster_2", 2), ("cluster_0", 1), ("cluster_1", 1)]
        );
    }

    #[test]
    fn classify_without_direct_pair() {
        let members = vec![
            ann(AgentId::Critical, "Intro", "alpha beta gamma"),
            ann(AgentId::Aesthetic, "Intro", "completely different words here"),
        ];
        assert_eq!(OverlapType::classify(&members), OverlapType::SameSectionNearby);
        assert_eq!(OverlapType::classify(&members[..1]), OverlapType::Standalone);
    }

    #[test]
    fn summary_line_format() {
        let input = by_agent(vec![
            ann(AgentId::Instrumental, "Methods", "a shared methodological point"),
            ann(AgentId::Critical, "Methods", "a shared methodological point"),
        ]);
        let summary = format_clusters_summary(&cluster(&input));
        assert_eq!(
            summary,
            "  [cluster_0] Methods | text_overlap | 2 agents (instrumental, critical) | 2 annotations"
        );
    }
}
