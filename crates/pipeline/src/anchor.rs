//! Locating generated snippets inside section text.
//!
//! Offsets are character (Unicode scalar) positions into
//! `Section::content`, not byte positions.

use marginalia_common::{Anchor, Section};

const FALLBACK_SNIPPET_CHARS: usize = 100;
const PLACEHOLDER_CHARS: usize = 200;
const MIN_LEADING_SEGMENT_CHARS: usize = 20;
const MIN_PHRASE_CHARS: usize = 30;
/// How far past a leading-segment match to look for the end of its sentence.
const SENTENCE_SEARCH_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

/// A best-effort span within a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnchor {
    pub start_offset: usize,
    pub end_offset: usize,
    pub snippet_text: String,
}

impl ResolvedAnchor {
    pub fn into_anchor(self, section_id: impl Into<String>) -> Anchor {
        Anchor {
            section_id: section_id.into(),
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            snippet_text: self.snippet_text,
        }
    }
}

/// Resolve `snippet` against `section`, degrading precision rather than
/// failing.
///
/// In order: exact match; the leading segment before an ellipsis, extended
/// to the end of its sentence; the first long ellipsis-separated phrase
/// found verbatim; finally the first 200 characters of the section.
pub fn resolve_anchor(snippet: &str, section: Option<&Section>) -> ResolvedAnchor {
    let section = match section {
        Some(section) if !snippet.is_empty() => section,
        _ => {
            let snippet_text = take_chars(snippet, FALLBACK_SNIPPET_CHARS);
            return ResolvedAnchor {
                start_offset: 0,
                end_offset: snippet_text.chars().count(),
                snippet_text,
            };
        }
    };
    let content = section.content.as_str();

    if let Some(start) = find_chars(content, snippet) {
        return ResolvedAnchor {
            start_offset: start,
            end_offset: start + snippet.chars().count(),
            snippet_text: snippet.to_string(),
        };
    }

    if let Some(anchor) = leading_segment(snippet, content) {
        return anchor;
    }

    let phrase_hit = snippet
        .split(ELLIPSIS)
        .map(str::trim)
        .filter(|p| p.chars().count() >= MIN_PHRASE_CHARS)
        .find_map(|p| find_chars(content, p).map(|start| (start, p)));
    if let Some((start, phrase)) = phrase_hit {
        return ResolvedAnchor {
            start_offset: start,
            end_offset: start + phrase.chars().count(),
            snippet_text: phrase.to_string(),
        };
    }

    let snippet_text = take_chars(content, PLACEHOLDER_CHARS);
    ResolvedAnchor {
        start_offset: 0,
        end_offset: snippet_text.chars().count(),
        snippet_text,
    }
}

fn leading_segment(snippet: &str, content: &str) -> Option<ResolvedAnchor> {
    let first = snippet.split(ELLIPSIS).next()?.trim();
    let first_len = first.chars().count();
    if first_len < MIN_LEADING_SEGMENT_CHARS {
        return None;
    }
    let start = find_chars(content, first)?;

    let chars: Vec<char> = content.chars().collect();
    let mut end = start + first_len;
    let limit = (end + SENTENCE_SEARCH_CHARS).min(chars.len());
    for i in end..limit {
        let terminal = matches!(chars[i], '.' | '!' | '?');
        let boundary = chars.get(i + 1).map_or(true, |c| *c == ' ' || *c == '\n');
        if terminal && boundary {
            end = i + 1;
            break;
        }
    }

    Some(ResolvedAnchor {
        start_offset: start,
        end_offset: end,
        snippet_text: chars[start..end].iter().collect(),
    })
}

/// Character offset of the first occurrence of `needle` in `haystack`.
fn find_chars(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .find(needle)
        .map(|byte_idx| haystack[..byte_idx].chars().count())
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(content: &str) -> Section {
        Section::new("sec_1", "Discussion", content, 1)
    }

    fn slice(content: &str, anchor: &ResolvedAnchor) -> String {
        content
            .chars()
            .skip(anchor.start_offset)
            .take(anchor.end_offset - anchor.start_offset)
            .collect()
    }

    #[test]
    fn exact_match_returns_its_offset() {
        let content = "In our survey, students often struggle with critical analysis when sources conflict.";
        let snippet = "students often struggle with critical analysis";
        let anchor = resolve_anchor(snippet, Some(&section(content)));
        assert_eq!(anchor.start_offset, content.find(snippet).unwrap());
        assert_eq!(slice(content, &anchor), snippet);
        assert_eq!(anchor.snippet_text, snippet);
    }

    #[test]
    fn missing_section_or_empty_snippet_uses_snippet_prefix() {
        let long = "x".repeat(150);
        let anchor = resolve_anchor(&long, None);
        assert_eq!((anchor.start_offset, anchor.end_offset), (0, 100));
        assert_eq!(anchor.snippet_text.len(), 100);

        let anchor = resolve_anchor("", Some(&section("Some content.")));
        assert_eq!(
            anchor,
            ResolvedAnchor {
                start_offset: 0,
                end_offset: 0,
                snippet_text: String::new()
            }
        );

        let anchor = resolve_anchor("short", None);
        assert_eq!(anchor.end_offset, 5);
    }

    #[test]
    fn leading_segment_extends_to_sentence_end() {
        let content = "Background. The authors argue that feedback loops accelerate learning in novices. Later work disagrees.";
        let snippet = "The authors argue that feedback loops ... in experts";
        let anchor = resolve_anchor(snippet, Some(&section(content)));
        assert_eq!(
            anchor.snippet_text,
            "The authors argue that feedback loops accelerate learning in novices."
        );
        assert_eq!(slice(content, &anchor), anchor.snippet_text);
    }

    #[test]
    fn leading_segment_without_sentence_end_keeps_match_length() {
        let content = "Intro: the authors argue that feedback loops matter";
        let snippet = "the authors argue that feedback...";
        let anchor = resolve_anchor(snippet, Some(&section(content)));
        assert_eq!(anchor.snippet_text, "the authors argue that feedback");
    }

    #[test]
    fn sentence_end_at_end_of_content() {
        let content = "We conclude that motivation is multi-dimensional.";
        let snippet = "We conclude that motivation... entirely";
        let anchor = resolve_anchor(snippet, Some(&section(content)));
        assert_eq!(anchor.end_offset, content.chars().count());
    }

    #[test]
    fn later_phrase_is_used_when_leading_segment_is_short() {
        let content = "Several studies found that structured peer review improves argument quality.";
        let snippet = "Studies... structured peer review improves argument quality";
        let anchor = resolve_anchor(snippet, Some(&section(content)));
        assert_eq!(
            anchor.snippet_text,
            "structured peer review improves argument quality"
        );
        assert_eq!(slice(content, &anchor), anchor.snippet_text);
    }

    #[test]
    fn unmatched_snippet_falls_back_to_section_prefix() {
        let content = "y".repeat(500);
        let anchor = resolve_anchor("nothing like this appears in the text", Some(&section(&content)));
        assert_eq!((anchor.start_offset, anchor.end_offset), (0, 200));

        let anchor = resolve_anchor("missing", Some(&section("tiny")));
        assert_eq!((anchor.start_offset, anchor.end_offset), (0, 4));
    }

    #[test]
    fn offsets_count_characters() {
        let content = "Über die Lernkurve: Schüler verbessern sich deutlich.";
        let snippet = "Schüler verbessern sich";
        let anchor = resolve_anchor(snippet, Some(&section(content)));
        assert_eq!(anchor.start_offset, 20);
        assert_eq!(anchor.end_offset, 20 + snippet.chars().count());
        assert!(anchor.end_offset <= content.chars().count());
    }
}
