//! Question decomposition
//!
//! Turns a [`ResearchGoal`] into 15-20 weighted, categorized questions and
//! the initial active batch. The oracle proposes the questions; the
//! decomposer normalizes them (known categories only, no duplicate texts,
//! every category present, at least one critical question per required
//! category, bounded count). When
//! the oracle is unreachable or its output unusable, a fixed per-category
//! template set is used instead.

use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::goal::{Category, ResearchGoal};
use super::state::{normalize_query, NoteKind, Priority, ResearchQuestion, TraceNote};
use crate::error::ResearchError;
use crate::oracle::{DecomposeResponse, OracleGateway, ProposedQuestion};

pub const MIN_QUESTIONS: usize = 15;
pub const MAX_QUESTIONS: usize = 20;
const MAX_CRITERION_QUESTIONS: usize = 4;

/// Output of decomposition
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub questions: Vec<ResearchQuestion>,
    /// Ids of the first researching batch
    pub initial_batch: Vec<String>,
    pub notes: Vec<TraceNote>,
}

/// A question before ids are assigned
#[derive(Debug, Clone)]
struct Draft {
    text: String,
    category: Category,
    priority: Priority,
    weight: f64,
    criterion: Option<String>,
}

impl Draft {
    fn into_question(self, id: String) -> ResearchQuestion {
        let question = ResearchQuestion::new(id, self.text, self.category, self.priority, self.weight);
        match self.criterion {
            Some(name) => question.with_criterion(name),
            None => question,
        }
    }
}

/// Per-category template questions, most important first
fn templates(subject: &str) -> Vec<(Category, Priority, String)> {
    let s = subject;
    vec![
        (Category::Technical, Priority::Critical, format!("What is {}'s core technology stack and system architecture?", s)),
        (Category::Technical, Priority::High, format!("How does {}'s platform scale, and how reliable is it in production?", s)),
        (Category::Technical, Priority::Medium, format!("What is {}'s security posture, including certifications and known incidents?", s)),
        (Category::Technical, Priority::Low, format!("How mature are {}'s engineering practices around testing and deployment?", s)),
        (Category::Market, Priority::Critical, format!("How large is {}'s addressable market and how fast is it growing?", s)),
        (Category::Market, Priority::High, format!("Who are {}'s main competitors and how is it differentiated?", s)),
        (Category::Market, Priority::Medium, format!("Who are {}'s target customers and how concentrated is its customer base?", s)),
        (Category::Market, Priority::Low, format!("Which market or regulatory trends could affect {}?", s)),
        (Category::Business, Priority::Critical, format!("What are {}'s revenue, growth rate and business model?", s)),
        (Category::Business, Priority::High, format!("How much funding has {} raised, from whom, and at what valuation?", s)),
        (Category::Business, Priority::Medium, format!("What are {}'s unit economics, including margins and retention?", s)),
        (Category::Business, Priority::Low, format!("Which partnerships and distribution channels does {} rely on?", s)),
        (Category::Team, Priority::Critical, format!("Who are {}'s founders and key leaders, and what is their track record?", s)),
        (Category::Team, Priority::High, format!("How large is {}'s engineering team and how is it growing?", s)),
        (Category::Team, Priority::Medium, format!("What do employees say about {}'s culture and retention?", s)),
        (Category::Team, Priority::Low, format!("Has {} had notable leadership departures or hiring difficulties?", s)),
    ]
}

fn template_drafts(goal: &ResearchGoal) -> Vec<Draft> {
    templates(&goal.subject)
        .into_iter()
        .map(|(category, priority, text)| Draft {
            text,
            category,
            priority,
            weight: goal.category_weight(category),
            criterion: None,
        })
        .collect()
}

/// Deterministic questions used when the oracle cannot decompose the goal.
///
/// The category templates plus one question per heaviest criterion; the top
/// criterion of each category is critical.
pub fn fallback_questions(goal: &ResearchGoal) -> Vec<ResearchQuestion> {
    let mut criteria: Vec<_> = goal.criteria.iter().collect();
    criteria.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.category.cmp(&b.category))
    });

    let mut top_seen = BTreeSet::new();
    let mut drafts: Vec<Draft> = criteria
        .into_iter()
        .take(MAX_CRITERION_QUESTIONS)
        .map(|criterion| Draft {
            text: format!("How does {} perform on {}?", goal.subject, criterion.name),
            category: criterion.category,
            priority: if top_seen.insert(criterion.category) {
                Priority::Critical
            } else {
                Priority::High
            },
            weight: criterion.weight / 100.0,
            criterion: Some(criterion.name.clone()),
        })
        .collect();
    drafts.extend(template_drafts(goal));

    finalize(goal, drafts)
}

/// Map oracle proposals onto drafts, dropping unknown categories
fn proposals_to_drafts(goal: &ResearchGoal, proposals: Vec<ProposedQuestion>) -> Vec<Draft> {
    proposals
        .into_iter()
        .filter_map(|p| {
            let category: Category = match p.category.parse() {
                Ok(category) => category,
                Err(_) => {
                    debug!(category = %p.category, "Dropping question with unknown category");
                    return None;
                }
            };
            let criterion = p.criterion.as_deref().and_then(|name| goal.criterion(name));
            Some(Draft {
                text: p.text.trim().to_string(),
                category,
                priority: Priority::parse_lenient(&p.priority),
                weight: criterion
                    .map(|c| c.weight / 100.0)
                    .unwrap_or_else(|| goal.category_weight(category)),
                criterion: criterion.map(|c| c.name.clone()),
            })
        })
        .collect()
}

/// Per category, the first critical draft, else the first draft of any
/// priority. These survive trimming.
fn anchors(drafts: &[Draft]) -> BTreeSet<usize> {
    Category::ALL
        .iter()
        .filter_map(|category| {
            drafts
                .iter()
                .position(|d| d.category == *category && d.priority == Priority::Critical)
                .or_else(|| drafts.iter().position(|d| d.category == *category))
        })
        .collect()
}

/// Drop drafts from the end until at most `upper` remain: non-critical
/// first, then critical, never a category anchor
fn trim(drafts: Vec<Draft>, upper: usize) -> Vec<Draft> {
    if drafts.len() <= upper {
        return drafts;
    }
    let keep = anchors(&drafts);
    let mut excess = drafts.len() - upper;
    let mut dropped = BTreeSet::new();

    for critical_pass in [false, true] {
        for (i, draft) in drafts.iter().enumerate().rev() {
            if excess == 0 {
                break;
            }
            if keep.contains(&i) || (draft.priority == Priority::Critical) != critical_pass {
                continue;
            }
            dropped.insert(i);
            excess -= 1;
        }
    }

    drafts
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, d)| d)
        .collect()
}

/// Normalize drafts into the final, id-stamped question list
fn finalize(goal: &ResearchGoal, drafts: Vec<Draft>) -> Vec<ResearchQuestion> {
    let upper = MAX_QUESTIONS.min(goal.config.max_questions);
    let lower = MIN_QUESTIONS.min(upper);
    let templates = template_drafts(goal);
    let required = goal.required_categories();

    let mut seen = BTreeSet::new();
    let mut drafts: Vec<Draft> = drafts
        .into_iter()
        .filter(|d| !d.text.is_empty() && seen.insert(normalize_query(&d.text)))
        .collect();

    // Every category gets at least one question
    for category in Category::ALL {
        if drafts.iter().any(|d| d.category == category) {
            continue;
        }
        if let Some(template) = templates
            .iter()
            .find(|t| t.category == category && t.priority == Priority::Critical)
        {
            if seen.insert(normalize_query(&template.text)) {
                let mut draft = template.clone();
                if !required.contains(&category) {
                    draft.priority = Priority::Medium;
                }
                drafts.push(draft);
            }
        }
    }

    for category in &required {
        if drafts.iter().any(|d| d.category == *category && d.priority == Priority::Critical) {
            continue;
        }
        let heaviest = drafts
            .iter_mut()
            .filter(|d| d.category == *category)
            .fold(None::<&mut Draft>, |best, d| match best {
                Some(b) if b.weight >= d.weight => Some(b),
                _ => Some(d),
            });
        if let Some(draft) = heaviest {
            draft.priority = Priority::Critical;
        }
    }

    let mut drafts = trim(drafts, upper);

    for template in templates {
        if drafts.len() >= lower {
            break;
        }
        if seen.insert(normalize_query(&template.text)) {
            drafts.push(template);
        }
    }

    drafts.sort_by_key(|d| d.category);
    drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| d.into_question(format!("Q{:03}", i + 1)))
        .collect()
}

/// Top critical questions by weight, ties by category then id
pub fn select_initial_batch(questions: &[ResearchQuestion], size: usize) -> Vec<String> {
    let mut critical: Vec<_> = questions.iter().filter(|q| q.is_critical()).collect();
    critical.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.category.cmp(&b.category))
            .then(a.id.cmp(&b.id))
    });
    critical.into_iter().take(size).map(|q| q.id.clone()).collect()
}

/// Breaks a goal into research questions
pub struct QuestionDecomposer {
    oracle: OracleGateway,
}

impl QuestionDecomposer {
    pub fn new(oracle: OracleGateway) -> Self {
        Self { oracle }
    }

    pub async fn decompose(&self, goal: &ResearchGoal) -> Result<Decomposition, ResearchError> {
        if goal.subject.trim().is_empty() {
            return Err(ResearchError::DecompositionFailure(
                "goal has no subject to research".into(),
            ));
        }

        let payload = json!({
            "subject": goal.subject,
            "domain": goal.domain,
            "thesis": goal.thesis,
            "focus_areas": goal.thesis.focus_areas(),
            "criteria": goal.criteria,
            "min_questions": MIN_QUESTIONS,
            "max_questions": MAX_QUESTIONS,
        });

        let mut notes = Vec::new();
        let proposed = match self.oracle.ask::<DecomposeResponse>(payload).await {
            Ok(response) => {
                let drafts = proposals_to_drafts(goal, response.questions);
                if drafts.is_empty() {
                    notes.push(TraceNote::new(
                        NoteKind::OracleFallback,
                        "decompose: no proposed question had a known category",
                    ));
                    None
                } else {
                    Some(finalize(goal, drafts))
                }
            }
            Err(e) => {
                warn!(subject = %goal.subject, error = %e, "Decomposition oracle failed, using templates");
                notes.push(TraceNote::new(NoteKind::OracleFallback, format!("decompose: {}", e)));
                None
            }
        };

        let questions = match proposed {
            Some(questions) => questions,
            None => fallback_questions(goal),
        };

        if questions.is_empty() {
            return Err(ResearchError::DecompositionFailure(
                "no questions could be derived for the goal".into(),
            ));
        }

        let initial_batch = select_initial_batch(&questions, goal.config.initial_batch_size);
        info!(
            subject = %goal.subject,
            questions = questions.len(),
            critical = questions.iter().filter(|q| q.is_critical()).count(),
            batch = initial_batch.len(),
            "Goal decomposed"
        );

        Ok(Decomposition {
            questions,
            initial_batch,
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::oracle::{OracleClient, OracleRequest};
    use crate::research::goal::Criterion;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedOracle(Result<String, OracleError>);

    #[async_trait]
    impl OracleClient for FixedOracle {
        async fn call(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            self.0.clone()
        }
    }

    fn decomposer(response: Result<String, OracleError>) -> QuestionDecomposer {
        QuestionDecomposer::new(OracleGateway::new(
            Arc::new(FixedOracle(response)),
            RetryPolicy::no_retry(),
            Duration::from_secs(1),
        ))
    }

    fn critical_categories(questions: &[ResearchQuestion]) -> BTreeSet<Category> {
        questions
            .iter()
            .filter(|q| q.is_critical())
            .map(|q| q.category)
            .collect()
    }

    #[tokio::test]
    async fn test_unreachable_oracle_uses_templates() {
        let goal = ResearchGoal::new("Acme", "acme.io");
        let result = decomposer(Err(OracleError::Unreachable("refused".into())))
            .decompose(&goal)
            .await
            .unwrap();

        assert_eq!(result.questions.len(), 16);
        assert_eq!(critical_categories(&result.questions).len(), 4);
        assert_eq!(result.notes.len(), 1);
        assert_eq!(result.notes[0].kind, NoteKind::OracleFallback);
        // technical weighs most, then business, then market, then team
        assert_eq!(result.initial_batch, vec!["Q001", "Q009", "Q005", "Q013"]);
    }

    #[tokio::test]
    async fn test_unparsable_oracle_uses_templates_with_criteria() {
        let goal = ResearchGoal::new("Acme", "acme.io")
            .with_criterion(Criterion::new("api quality", 40.0, Category::Technical))
            .with_criterion(Criterion::new("scalability", 30.0, Category::Technical))
            .with_criterion(Criterion::new("retention", 30.0, Category::Business));

        let result = decomposer(Ok("I cannot help with that.".into()))
            .decompose(&goal)
            .await
            .unwrap();

        assert!(result.questions.len() >= MIN_QUESTIONS && result.questions.len() <= MAX_QUESTIONS);
        let categories = critical_categories(&result.questions);
        assert!(categories.contains(&Category::Technical));
        assert!(categories.contains(&Category::Business));

        let api = result
            .questions
            .iter()
            .find(|q| q.criterion.as_deref() == Some("api quality"))
            .unwrap();
        assert_eq!(api.priority, Priority::Critical);
        assert!((api.weight - 0.4).abs() < 1e-9);
        assert!(result.initial_batch.contains(&api.id));
    }

    #[tokio::test]
    async fn test_oracle_questions_are_normalized() {
        let response = json!({"questions": [
            {"text": "How is the platform built?", "category": "technical", "priority": "high"},
            {"text": "how is the platform   built?", "category": "technical", "priority": "critical"},
            {"text": "Who are the rivals?", "category": "market", "priority": "critical"},
            {"text": "Any lawsuits?", "category": "legal", "priority": "critical"},
        ]})
        .to_string();

        let goal = ResearchGoal::new("Acme", "acme.io");
        let result = decomposer(Ok(response)).decompose(&goal).await.unwrap();

        assert!(result.notes.is_empty());
        assert_eq!(result.questions.len(), MIN_QUESTIONS);
        assert!(!result.questions.iter().any(|q| q.text == "Any lawsuits?"));
        assert_eq!(critical_categories(&result.questions).len(), 4);

        // duplicate dropped, lone technical question promoted
        let technical: Vec<_> = result
            .questions
            .iter()
            .filter(|q| q.text.eq_ignore_ascii_case("how is the platform built?"))
            .collect();
        assert_eq!(technical.len(), 1);
        assert_eq!(technical[0].priority, Priority::Critical);

        let ids: Vec<_> = result.questions.iter().map(|q| q.id.clone()).collect();
        let expected: Vec<_> = (1..=MIN_QUESTIONS).map(|i| format!("Q{:03}", i)).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_oracle_questions_are_capped() {
        let questions: Vec<_> = (0..30)
            .map(|i| {
                json!({
                    "text": format!("Question number {}", i),
                    "category": Category::ALL[i % 4].as_str(),
                    "priority": if i < 4 { "critical" } else { "medium" },
                })
            })
            .collect();
        let response = json!({ "questions": questions }).to_string();

        let goal = ResearchGoal::new("Acme", "acme.io");
        let result = decomposer(Ok(response)).decompose(&goal).await.unwrap();

        assert_eq!(result.questions.len(), MAX_QUESTIONS);
        assert_eq!(result.questions.iter().filter(|q| q.is_critical()).count(), 4);
    }

    #[tokio::test]
    async fn test_single_category_output_still_spans_all_categories() {
        let questions: Vec<_> = (0..16)
            .map(|i| {
                json!({
                    "text": format!("Technical question {}", i),
                    "category": "technical",
                    "priority": if i == 0 { "critical" } else { "high" },
                })
            })
            .collect();
        let response = json!({ "questions": questions }).to_string();

        let goal = ResearchGoal::new("Acme", "acme.io")
            .with_criterion(Criterion::new("api", 50.0, Category::Technical));
        let result = decomposer(Ok(response)).decompose(&goal).await.unwrap();

        let categories: BTreeSet<_> = result.questions.iter().map(|q| q.category).collect();
        assert_eq!(categories.len(), 4);
        assert!(result.questions.len() >= MIN_QUESTIONS && result.questions.len() <= MAX_QUESTIONS);
        assert!(critical_categories(&result.questions).contains(&Category::Technical));
    }

    #[tokio::test]
    async fn test_cap_keeps_one_critical_per_category() {
        let mut questions: Vec<_> = (0..21)
            .map(|i| {
                json!({
                    "text": format!("Critical technical question {}", i),
                    "category": "technical",
                    "priority": "critical",
                })
            })
            .collect();
        for category in ["market", "business", "team"] {
            questions.push(json!({
                "text": format!("Critical {} question", category),
                "category": category,
                "priority": "critical",
            }));
        }
        let response = json!({ "questions": questions }).to_string();

        let goal = ResearchGoal::new("Acme", "acme.io");
        let result = decomposer(Ok(response)).decompose(&goal).await.unwrap();

        assert_eq!(result.questions.len(), MAX_QUESTIONS);
        assert_eq!(critical_categories(&result.questions).len(), 4);
        assert!(result.questions.iter().any(|q| q.text == "Critical team question"));
    }

    #[tokio::test]
    async fn test_blank_subject_is_a_decomposition_failure() {
        let goal = ResearchGoal::new("  ", "acme.io");
        let result = decomposer(Err(OracleError::Unreachable("refused".into())))
            .decompose(&goal)
            .await;
        assert!(matches!(result, Err(ResearchError::DecompositionFailure(_))));
    }

    #[test]
    fn test_select_initial_batch_limits_to_critical() {
        let goal = ResearchGoal::new("Acme", "acme.io");
        let questions = fallback_questions(&goal);
        let batch = select_initial_batch(&questions, 2);
        assert_eq!(batch, vec!["Q001", "Q009"]);
    }
}
