//! Gap analysis and re-planning
//!
//! Once per iteration the re-planner decides whether to stop and, if not,
//! which questions to research next:
//!
//! 1. `iteration_count >= max_iterations` → `MaxReached`
//! 2. `critical_coverage >= 0.8 && overall_confidence >= 0.7` → `Sufficient`
//! 3. otherwise `Continue` with the next batch: unanswered critical (≤3),
//!    then partial critical (≤2), then unanswered high (≤2)
//!
//! When no batch can be selected the oracle is asked for knowledge gaps,
//! which become new questions (bounded by the question cap). If nothing can
//! be added the decision is forced to `Sufficient`.

use serde_json::json;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use super::config::RunConfig;
use super::goal::Category;
use super::scorer::Scorecard;
use super::state::{
    normalize_query, Decision, KnowledgeGap, NoteKind, Priority, QuestionStatus,
    ResearchQuestion, ResearchState, TraceNote,
};
use crate::oracle::{OracleGateway, ReflectResponse};

const MAX_UNANSWERED_CRITICAL: usize = 3;
const MAX_PARTIAL_CRITICAL: usize = 2;
const MAX_UNANSWERED_HIGH: usize = 2;
const MAX_GAP_BATCH: usize = MAX_UNANSWERED_CRITICAL + MAX_PARTIAL_CRITICAL + MAX_UNANSWERED_HIGH;

/// The stopping rule, evaluated on raw metrics
pub fn decide(
    iteration_count: usize,
    critical_coverage: f64,
    overall_confidence: f64,
    config: &RunConfig,
) -> Decision {
    if iteration_count >= config.max_iterations {
        Decision::MaxReached
    } else if critical_coverage >= config.sufficient_coverage
        && overall_confidence >= config.sufficient_confidence
    {
        Decision::Sufficient
    } else {
        Decision::Continue
    }
}

/// Weight descending, then category order, then id
fn batch_order(a: &&ResearchQuestion, b: &&ResearchQuestion) -> Ordering {
    b.weight
        .partial_cmp(&a.weight)
        .unwrap_or(Ordering::Equal)
        .then(a.category.cmp(&b.category))
        .then(a.id.cmp(&b.id))
}

fn pick<'a>(
    state: &'a ResearchState,
    limit: usize,
    filter: impl Fn(&ResearchQuestion) -> bool,
) -> Vec<&'a ResearchQuestion> {
    let mut candidates: Vec<_> = state.questions.iter().filter(|q| filter(q)).collect();
    candidates.sort_by(batch_order);
    candidates.truncate(limit);
    candidates
}

/// Select the next question batch by priority tier
pub fn select_batch(state: &ResearchState) -> Vec<String> {
    let config = &state.goal.config;

    let unanswered_critical = pick(state, MAX_UNANSWERED_CRITICAL, |q| {
        q.is_critical() && q.status.is_unanswered()
    });
    let partial_critical = pick(state, MAX_PARTIAL_CRITICAL, |q| {
        q.is_critical()
            && q.status == QuestionStatus::Partial
            && q.confidence < config.target_confidence
            && q.attempts < config.max_question_attempts
    });
    let unanswered_high = pick(state, MAX_UNANSWERED_HIGH, |q| {
        q.priority == Priority::High && q.status.is_unanswered()
    });

    unanswered_critical
        .into_iter()
        .chain(partial_critical)
        .chain(unanswered_high)
        .map(|q| q.id.clone())
        .collect()
}

/// Turn knowledge gaps into new questions, respecting the question cap and
/// skipping gaps whose text duplicates an existing question
pub fn gaps_to_questions(state: &ResearchState, gaps: &[KnowledgeGap]) -> Vec<ResearchQuestion> {
    let capacity = state
        .goal
        .config
        .max_questions
        .saturating_sub(state.questions.len());
    let mut scratch = state.clone();
    let mut added = Vec::new();

    for gap in gaps {
        if added.len() >= capacity {
            break;
        }
        if gap.description.trim().is_empty() || scratch.has_question_text(&gap.description) {
            continue;
        }

        let queries = gap
            .follow_up_queries
            .iter()
            .filter(|q| !q.trim().is_empty() && !scratch.query_history.contains(&normalize_query(q)))
            .take(2)
            .cloned()
            .collect();

        let question = ResearchQuestion::new(
            scratch.next_question_id(),
            gap.description.trim(),
            gap.category,
            gap.importance,
            state.goal.category_weight(gap.category),
        )
        .with_suggested_queries(queries);

        scratch.questions.push(question.clone());
        added.push(question);
    }

    added
}

/// Gaps derived without the oracle: one per category whose critical
/// questions are still open
pub fn fallback_gaps(state: &ResearchState) -> Vec<KnowledgeGap> {
    let subject = &state.goal.subject;
    Category::ALL
        .iter()
        .filter(|category| {
            state
                .unresolved_critical()
                .iter()
                .any(|q| q.category == **category)
        })
        .map(|category| KnowledgeGap {
            description: format!(
                "What independent sources corroborate {}'s {} position?",
                subject, category
            ),
            category: *category,
            follow_up_queries: vec![format!("{} {} review analysis", subject, category)],
            importance: Priority::High,
        })
        .collect()
}

fn parse_category(raw: &str) -> Option<Category> {
    raw.parse().ok()
}

/// Result of one re-planning step
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub decision: Decision,
    pub batch: Vec<String>,
    pub new_questions: Vec<ResearchQuestion>,
    pub notes: Vec<TraceNote>,
}

/// Decides continue/stop and picks the next batch
pub struct Replanner {
    oracle: OracleGateway,
}

impl Replanner {
    pub fn new(oracle: OracleGateway) -> Self {
        Self { oracle }
    }

    pub async fn plan(&self, state: &ResearchState, scorecard: &Scorecard) -> PlanOutcome {
        let config = &state.goal.config;
        let decision = decide(
            state.iteration_count,
            scorecard.critical_coverage,
            scorecard.overall_confidence,
            config,
        );

        let mut outcome = PlanOutcome {
            decision,
            batch: Vec::new(),
            new_questions: Vec::new(),
            notes: Vec::new(),
        };
        if decision != Decision::Continue {
            return outcome;
        }

        outcome.batch = select_batch(state);
        if !outcome.batch.is_empty() {
            debug!(run_id = %state.run_id, batch = ?outcome.batch, "Selected next batch");
            return outcome;
        }

        let gaps = self.reflect(state, scorecard, &mut outcome.notes).await;
        let new_questions = gaps_to_questions(state, &gaps);
        if new_questions.is_empty() {
            info!(run_id = %state.run_id, "No further questions can be added, stopping");
            outcome.decision = Decision::Sufficient;
            outcome.notes.push(TraceNote::new(
                NoteKind::ForcedSufficient,
                "no batch available and no new questions could be added",
            ));
            return outcome;
        }

        outcome.notes.push(TraceNote::new(
            NoteKind::GapsAdded,
            format!("added {} gap-driven questions", new_questions.len()),
        ));

        let mut ordered: Vec<&ResearchQuestion> = new_questions.iter().collect();
        ordered.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| batch_order(a, b)));
        outcome.batch = ordered
            .into_iter()
            .take(MAX_GAP_BATCH)
            .map(|q| q.id.clone())
            .collect();
        outcome.new_questions = new_questions;
        outcome
    }

    async fn reflect(
        &self,
        state: &ResearchState,
        scorecard: &Scorecard,
        notes: &mut Vec<TraceNote>,
    ) -> Vec<KnowledgeGap> {
        let questions: Vec<_> = state
            .questions
            .iter()
            .map(|q| {
                json!({
                    "id": q.id,
                    "text": q.text,
                    "category": q.category,
                    "priority": q.priority,
                    "status": q.status,
                    "confidence": q.confidence,
                })
            })
            .collect();
        let payload = json!({
            "subject": state.goal.subject,
            "domain": state.goal.domain,
            "iteration": state.iteration_count,
            "overall_confidence": scorecard.overall_confidence,
            "critical_coverage": scorecard.critical_coverage,
            "questions": questions,
            "max_new_questions": state.goal.config.max_questions.saturating_sub(state.questions.len()),
        });

        match self.oracle.ask::<ReflectResponse>(payload).await {
            Ok(response) => response
                .gaps
                .into_iter()
                .filter_map(|gap| {
                    Some(KnowledgeGap {
                        category: parse_category(&gap.category)?,
                        importance: Priority::parse_lenient(&gap.importance),
                        description: gap.description,
                        follow_up_queries: gap.follow_up_queries,
                    })
                })
                .collect(),
            Err(e) => {
                warn!(run_id = %state.run_id, error = %e, "Reflection failed, using fallback gaps");
                notes.push(TraceNote::new(
                    NoteKind::OracleFallback,
                    format!("reflect: {}", e),
                ));
                fallback_gaps(state)
            }
        }
    }
}
