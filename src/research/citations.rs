//! Citation mapping
//!
//! Citations are numbered by walking the finalized report sections in a
//! fixed order: category order, then question order within a category, then
//! finding order within a question. Numbers start at 1 and are contiguous.
//! The mapper is a pure function of the sections, so mapping the same
//! sections twice yields identical numbering.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::synthesis::CategorySection;

const MAX_CLAIM_CHARS: usize = 200;

/// A numbered reference from the report to a finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based, contiguous within a report
    pub number: usize,
    pub claim: String,
    pub finding_id: String,
    pub question_id: String,
    pub source: String,
    pub confidence: f64,
}

/// First sentence of `content`, capped in length
pub fn claim_text(content: &str) -> String {
    let content = content.trim();
    let sentence_end = content
        .char_indices()
        .find(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && content[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(content.len());
    let sentence = &content[..sentence_end];

    if sentence.chars().count() <= MAX_CLAIM_CHARS {
        sentence.to_string()
    } else {
        let truncated: String = sentence.chars().take(MAX_CLAIM_CHARS).collect();
        format!("{}...", truncated.trim_end())
    }
}

/// Assigns citation numbers to findings referenced by report sections
pub struct CitationMapper;

impl CitationMapper {
    pub fn map(sections: &[CategorySection]) -> Vec<Citation> {
        let mut ordered: Vec<&CategorySection> = sections.iter().collect();
        ordered.sort_by_key(|s| s.category);

        let mut seen = BTreeSet::new();
        let mut citations = Vec::new();

        for section in ordered {
            for entry in &section.entries {
                for finding in &entry.findings {
                    if !seen.insert(finding.id.clone()) {
                        continue;
                    }
                    citations.push(Citation {
                        number: citations.len() + 1,
                        claim: claim_text(&finding.content),
                        finding_id: finding.id.clone(),
                        question_id: entry.question_id.clone(),
                        source: finding.source.clone(),
                        confidence: finding.confidence,
                    });
                }
            }
        }

        citations
    }

    /// Finding id to citation number
    pub fn index(citations: &[Citation]) -> BTreeMap<&str, usize> {
        citations
            .iter()
            .map(|c| (c.finding_id.as_str(), c.number))
            .collect()
    }

    /// Check that numbers run 1..=N without gaps or duplicates
    pub fn is_contiguous(citations: &[Citation]) -> bool {
        citations
            .iter()
            .enumerate()
            .all(|(i, c)| c.number == i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::goal::Category;
    use crate::research::state::{Finding, Priority, QuestionStatus};
    use crate::research::synthesis::SectionEntry;
    use chrono::Utc;

    fn finding(id: &str, question_id: &str, content: &str) -> Finding {
        Finding {
            id: id.into(),
            question_id: question_id.into(),
            content: content.into(),
            source: format!("https://example.com/{}", id),
            confidence: 0.8,
            query: "q".into(),
            recorded_at: Utc::now(),
        }
    }

    fn entry(question_id: &str, findings: Vec<Finding>) -> SectionEntry {
        SectionEntry {
            question_id: question_id.into(),
            question: format!("Question {}", question_id),
            priority: Priority::High,
            status: QuestionStatus::Answered,
            confidence: 0.8,
            findings,
        }
    }

    fn section(category: Category, entries: Vec<SectionEntry>) -> CategorySection {
        CategorySection {
            category,
            score: 50.0,
            weight: 0.25,
            entries,
        }
    }

    fn sample_sections() -> Vec<CategorySection> {
        vec![
            section(
                Category::Market,
                vec![entry("Q003", vec![finding("F0002", "Q003", "Market is large.")])],
            ),
            section(
                Category::Technical,
                vec![
                    entry(
                        "Q001",
                        vec![
                            finding("F0003", "Q001", "Runs on Rust. Deployed on AWS."),
                            finding("F0001", "Q001", "Uses Postgres"),
                        ],
                    ),
                    entry("Q002", vec![]),
                ],
            ),
        ]
    }

    #[test]
    fn test_numbering_follows_category_question_finding_order() {
        let citations = CitationMapper::map(&sample_sections());

        let ids: Vec<_> = citations.iter().map(|c| c.finding_id.as_str()).collect();
        assert_eq!(ids, vec!["F0003", "F0001", "F0002"]);
        assert!(CitationMapper::is_contiguous(&citations));
        assert_eq!(citations[0].claim, "Runs on Rust.");
        assert_eq!(citations[0].question_id, "Q001");
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let sections = sample_sections();
        assert_eq!(CitationMapper::map(&sections), CitationMapper::map(&sections));
    }

    #[test]
    fn test_duplicate_findings_cited_once() {
        let shared = finding("F0001", "Q001", "Shared");
        let sections = vec![section(
            Category::Technical,
            vec![entry("Q001", vec![shared.clone(), shared])],
        )];
        let citations = CitationMapper::map(&sections);
        assert_eq!(citations.len(), 1);
        assert_eq!(CitationMapper::index(&citations)["F0001"], 1);
    }

    #[test]
    fn test_empty_sections() {
        assert!(CitationMapper::map(&[]).is_empty());
        assert!(CitationMapper::is_contiguous(&[]));
    }

    #[test]
    fn test_claim_text() {
        assert_eq!(claim_text("  Version 2.5 shipped. More text"), "Version 2.5 shipped.");
        assert_eq!(claim_text("No terminator"), "No terminator");
        let long = "word ".repeat(100);
        assert!(claim_text(&long).ends_with("..."));
    }
}
