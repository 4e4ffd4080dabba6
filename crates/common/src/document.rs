//! Document sections as delivered by the extraction service.

use serde::{Deserialize, Serialize};

/// One titled section of a parsed document. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub section_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub order: u32,
}

impl Section {
    pub fn new(
        section_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            section_id: section_id.into(),
            title: title.into(),
            content: content.into(),
            order,
        }
    }
}

/// First section whose title matches exactly.
pub fn find_by_title<'a>(sections: &'a [Section], title: &str) -> Option<&'a Section> {
    sections.iter().find(|s| s.title == title)
}

/// Section titles in document order, used to rank duplicates.
pub fn section_order(sections: &[Section]) -> Vec<String> {
    let mut ordered: Vec<&Section> = sections.iter().collect();
    ordered.sort_by_key(|s| s.order);
    ordered.into_iter().map(|s| s.title.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_order_follows_order_field() {
        let sections = vec![
            Section::new("s2", "Methods", "", 2),
            Section::new("s0", "Abstract", "", 0),
            Section::new("s1", "Introduction", "", 1),
        ];
        assert_eq!(
            section_order(&sections),
            vec!["Abstract", "Introduction", "Methods"]
        );
    }

    #[test]
    fn deserializes_camel_case() {
        let json = r#"{"sectionId":"section_0","title":"Abstract","content":"Text","order":0}"#;
        let section: Section = serde_json::from_str(json).unwrap();
        assert_eq!(section.section_id, "section_0");
        assert_eq!(find_by_title(&[section.clone()], "Abstract"), Some(&section));
    }
}
