//! Deterministic query derivation
//!
//! Queries depend only on the question, the goal and the run's query
//! history, never on wall-clock time or randomness, so replays of a run
//! issue the same queries.

use std::collections::BTreeSet;

use crate::research::goal::ResearchGoal;
use crate::research::state::{normalize_query, ResearchQuestion};

/// Most queries derived for one question per pass
pub const MAX_QUERIES_PER_QUESTION: usize = 3;

const MAX_KEYWORDS: usize = 6;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "which", "who", "whom", "how", "does",
    "did", "has", "have", "had", "with", "from", "into", "that", "this", "these", "those",
    "their", "its", "they", "them", "there", "about", "any", "can", "could", "should", "would",
    "will", "been", "being", "than", "then", "when", "where", "why", "your", "our", "you",
    "company", "company's",
];

/// Significant lowercase words of `text`, in order of first appearance
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-').to_lowercase())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .take(MAX_KEYWORDS)
        .collect()
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive up to three new queries for `question`.
///
/// Candidates, in order: subject plus question keywords; subject plus the
/// category's enrichment terms; the question's gap-suggested follow-ups;
/// subject plus keywords plus the thesis suffix; domain plus keywords.
/// Candidates already in `history`, or duplicating an earlier candidate after
/// normalization, are skipped.
pub fn derive_queries(
    question: &ResearchQuestion,
    goal: &ResearchGoal,
    history: &BTreeSet<String>,
) -> Vec<String> {
    let subject = goal.subject.as_str();
    let keyword_text = keywords(&question.text).join(" ");

    let mut candidates = vec![
        join(&[subject, &keyword_text]),
        join(&[subject, question.category.query_terms()]),
    ];
    candidates.extend(question.suggested_queries.iter().cloned());
    if let Some(suffix) = goal.thesis.query_suffix() {
        candidates.push(join(&[subject, &keyword_text, suffix]));
    }
    if !goal.domain.trim().is_empty() {
        candidates.push(join(&[&goal.domain, &keyword_text]));
    }

    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .filter(|q| !q.trim().is_empty())
        .filter(|q| {
            let normalized = normalize_query(q);
            !history.contains(&normalized) && seen.insert(normalized)
        })
        .take(MAX_QUERIES_PER_QUESTION)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::goal::{Category, InvestmentThesis};
    use crate::research::state::Priority;

    fn question(text: &str, category: Category) -> ResearchQuestion {
        ResearchQuestion::new("Q001", text, category, Priority::Critical, 0.4)
    }

    #[test]
    fn test_keywords_drop_stopwords_and_duplicates() {
        let words = keywords("What is the company's core architecture and how does the architecture scale?");
        assert_eq!(words, vec!["core", "architecture", "scale"]);
    }

    #[test]
    fn test_derive_queries_is_deterministic_and_bounded() {
        let goal = ResearchGoal::new("Acme", "acme.io").with_thesis(InvestmentThesis::BuyAndBuild);
        let q = question("What is the core platform architecture?", Category::Technical);

        let first = derive_queries(&q, &goal, &BTreeSet::new());
        let second = derive_queries(&q, &goal, &BTreeSet::new());

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                "Acme core platform architecture".to_string(),
                "Acme tech stack architecture infrastructure engineering".to_string(),
                "Acme core platform architecture API platform integration ecosystem".to_string(),
            ]
        );
    }

    #[test]
    fn test_derive_queries_skips_history() {
        let goal = ResearchGoal::new("Acme", "acme.io");
        let q = question("Who leads engineering?", Category::Team)
            .with_suggested_queries(vec!["Acme CTO background".into()]);

        let mut history = BTreeSet::new();
        history.insert(normalize_query("acme  LEADS engineering"));
        history.insert(normalize_query("Acme leadership team founders hiring"));

        let queries = derive_queries(&q, &goal, &history);
        assert_eq!(
            queries,
            vec!["Acme CTO background".to_string(), "acme.io leads engineering".to_string()]
        );
    }

    #[test]
    fn test_derive_queries_exhausts() {
        let goal = ResearchGoal::new("Acme", "");
        let q = question("Market size?", Category::Market);
        let mut history = BTreeSet::new();
        for query in derive_queries(&q, &goal, &BTreeSet::new()) {
            history.insert(normalize_query(&query));
        }
        assert!(derive_queries(&q, &goal, &history).is_empty());
    }
}
