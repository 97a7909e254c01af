//! Confidence and coverage scoring
//!
//! Per-question confidence is the best finding confidence, blended with the
//! automated-check pass rate when checks ran:
//!
//! ```text
//! confidence = passRate * w + bestFinding * (1 - w)      (w = 0.6 by default)
//! ```
//!
//! Status follows from confidence: `>= target` answered, `>= minimum`
//! partial, otherwise researching (or pending if never attempted). A question
//! that stays below the minimum after `max_question_attempts` passes fails.
//!
//! Scores are reported on a 0-100 scale; confidences and coverage on [0, 1].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::config::RunConfig;
use super::goal::Category;
use super::state::{NoteKind, QuestionStatus, ResearchQuestion, ResearchState, TraceNote};

/// Aggregate score of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    /// Weighted status average, 0-100
    pub score: f64,
    /// Normalized category weight used for the overall score
    pub weight: f64,
    pub answered: usize,
    pub total: usize,
}

/// Aggregate view of a run's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    /// 0-100
    pub overall_score: f64,
    pub overall_confidence: f64,
    pub critical_coverage: f64,
    pub categories: BTreeMap<Category, CategoryScore>,
}

/// Confidence of a question given its findings and check tally
pub fn question_confidence(question: &ResearchQuestion, state: &ResearchState) -> f64 {
    let best = state
        .findings_for(&question.id)
        .iter()
        .map(|f| f.confidence)
        .fold(0.0_f64, f64::max);

    let confidence = match question.checks {
        Some(checks) if checks.total > 0 => {
            let w = state.goal.config.check_blend_weight;
            checks.pass_rate() * w + best * (1.0 - w)
        }
        _ => best,
    };
    confidence.clamp(0.0, 1.0)
}

/// Status implied by a confidence value
pub fn status_for(
    confidence: f64,
    attempts: u32,
    config: &RunConfig,
) -> QuestionStatus {
    if confidence >= config.target_confidence {
        QuestionStatus::Answered
    } else if confidence >= config.minimum_confidence {
        QuestionStatus::Partial
    } else if attempts >= config.max_question_attempts {
        QuestionStatus::Failed
    } else if attempts > 0 {
        QuestionStatus::Researching
    } else {
        QuestionStatus::Pending
    }
}

/// Recompute every question's confidence and status.
///
/// Newly failed questions are recorded as trace notes.
pub fn rescore(state: &ResearchState) -> ResearchState {
    let mut new_state = state.clone();
    let config = state.goal.config.clone();

    for (i, question) in state.questions.iter().enumerate() {
        if question.status == QuestionStatus::Failed {
            continue;
        }
        let confidence = question_confidence(question, state);
        let status = status_for(confidence, question.attempts, &config);

        if status == QuestionStatus::Failed {
            new_state.pending_notes.push(TraceNote::new(
                NoteKind::QuestionFailed,
                format!(
                    "{} failed after {} attempts at confidence {:.2}",
                    question.id, question.attempts, confidence
                ),
            ));
        }

        let target = &mut new_state.questions[i];
        target.confidence = confidence;
        target.status = status;
    }

    new_state
}

/// Critical coverage: answered critical / total critical (0 without criticals)
pub fn critical_coverage(state: &ResearchState) -> f64 {
    let (answered, total) = state.critical_questions().fold((0usize, 0usize), |(a, t), q| {
        (a + usize::from(q.status == QuestionStatus::Answered), t + 1)
    });
    if total == 0 {
        0.0
    } else {
        answered as f64 / total as f64
    }
}

/// Unweighted mean of question confidences
pub fn overall_confidence(state: &ResearchState) -> f64 {
    if state.questions.is_empty() {
        return 0.0;
    }
    let sum: f64 = state.questions.iter().map(|q| q.confidence).sum();
    (sum / state.questions.len() as f64).clamp(0.0, 1.0)
}

/// Score every category and the run as a whole
pub fn scorecard(state: &ResearchState) -> Scorecard {
    let weights = state.goal.category_weights();
    let mut categories = BTreeMap::new();
    let mut overall = 0.0;

    for category in Category::ALL {
        let questions: Vec<_> = state
            .questions
            .iter()
            .filter(|q| q.category == category)
            .collect();

        let total_weight: f64 = questions.iter().map(|q| q.weight).sum();
        let score = if total_weight > 0.0 {
            questions
                .iter()
                .map(|q| q.status.score_value() * q.weight)
                .sum::<f64>()
                / total_weight
        } else {
            0.0
        };

        let weight = weights.get(&category).copied().unwrap_or(0.0);
        overall += score * weight;

        categories.insert(
            category,
            CategoryScore {
                score: score * 100.0,
                weight,
                answered: questions
                    .iter()
                    .filter(|q| q.status == QuestionStatus::Answered)
                    .count(),
                total: questions.len(),
            },
        );
    }

    Scorecard {
        overall_score: (overall * 100.0).clamp(0.0, 100.0),
        overall_confidence: overall_confidence(state),
        critical_coverage: critical_coverage(state),
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::goal::ResearchGoal;
    use crate::research::state::{CheckTally, PendingFinding, Priority, ResearchUpdate};

    fn state() -> ResearchState {
        let mut state = ResearchState::new("run-1", ResearchGoal::new("Acme", "acme.io"));
        state.questions = vec![
            ResearchQuestion::new("Q001", "Architecture?", Category::Technical, Priority::Critical, 0.4),
            ResearchQuestion::new("Q002", "Security?", Category::Technical, Priority::High, 0.4),
            ResearchQuestion::new("Q003", "Market size?", Category::Market, Priority::Critical, 0.2),
            ResearchQuestion::new("Q004", "Revenue?", Category::Business, Priority::Critical, 0.3),
        ];
        state
    }

    fn finding(question_id: &str, confidence: f64) -> PendingFinding {
        PendingFinding {
            question_id: question_id.into(),
            content: "evidence".into(),
            source: "https://acme.io".into(),
            confidence,
            query: "q".into(),
        }
    }

    #[test]
    fn test_confidence_is_best_finding() {
        let state = state().apply_update(
            ResearchUpdate::for_question("Q001")
                .with_finding(finding("Q001", 0.6))
                .with_finding(finding("Q001", 0.85)),
        );
        let q = state.question("Q001").unwrap();
        assert!((question_confidence(q, &state) - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_blends_checks() {
        let mut update = ResearchUpdate::for_question("Q001").with_finding(finding("Q001", 0.5));
        update.check_tallies.push(("Q001".into(), CheckTally::new(3, 4)));
        let state = state().apply_update(update);
        let q = state.question("Q001").unwrap();

        // 0.75 * 0.6 + 0.5 * 0.4
        assert!((question_confidence(q, &state) - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_checks_without_findings() {
        let mut update = ResearchUpdate::for_question("Q001");
        update.check_tallies.push(("Q001".into(), CheckTally::new(4, 4)));
        let state = state().apply_update(update);
        let q = state.question("Q001").unwrap();
        assert!((question_confidence(q, &state) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_status_thresholds() {
        let config = RunConfig::default();
        assert_eq!(status_for(0.8, 1, &config), QuestionStatus::Answered);
        assert_eq!(status_for(0.79, 1, &config), QuestionStatus::Partial);
        assert_eq!(status_for(0.5, 1, &config), QuestionStatus::Partial);
        assert_eq!(status_for(0.49, 1, &config), QuestionStatus::Researching);
        assert_eq!(status_for(0.0, 0, &config), QuestionStatus::Pending);
        assert_eq!(status_for(0.49, 3, &config), QuestionStatus::Failed);
        assert_eq!(status_for(0.6, 3, &config), QuestionStatus::Partial);
    }

    #[test]
    fn test_rescore_marks_failure_once() {
        let mut s = state();
        s.questions[1].attempts = 3;
        let rescored = rescore(&s);
        assert_eq!(rescored.questions[1].status, QuestionStatus::Failed);
        assert_eq!(rescored.pending_notes.len(), 1);

        let again = rescore(&rescored);
        assert_eq!(again.pending_notes.len(), 1);
    }

    #[test]
    fn test_scorecard() {
        let update = ResearchUpdate::merge(vec![
            ResearchUpdate::for_question("Q001").with_finding(finding("Q001", 0.9)),
            ResearchUpdate::for_question("Q002").with_finding(finding("Q002", 0.6)),
            ResearchUpdate::for_question("Q003").with_finding(finding("Q003", 0.85)),
        ]);
        let state = rescore(&state().apply_update(update));
        let card = scorecard(&state);

        // technical: (1*0.4 + 0.5*0.4) / 0.8 = 0.75; market 1.0; business 0; team 0
        assert!((card.categories[&Category::Technical].score - 75.0).abs() < 1e-9);
        assert!((card.categories[&Category::Market].score - 100.0).abs() < 1e-9);
        assert!((card.overall_score - (0.75 * 0.4 + 0.2) * 100.0).abs() < 1e-9);
        assert!((card.critical_coverage - 2.0 / 3.0).abs() < 1e-9);
        assert!((card.overall_confidence - (0.9 + 0.6 + 0.85) / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_critical_questions_means_zero_coverage() {
        let mut s = state();
        for q in &mut s.questions {
            q.priority = Priority::Medium;
        }
        assert_eq!(critical_coverage(&s), 0.0);
    }
}
