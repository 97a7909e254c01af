//! Research run state definition
//!
//! `ResearchState` is the single mutable aggregate of a run. It is only ever
//! replaced wholesale by the controller: workers produce `ResearchUpdate`s,
//! which are merged and applied at one synchronization point per phase.
//! Findings and iteration records are append-only; questions are never
//! deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::goal::{Category, ResearchGoal};
use crate::error::ResearchError;

/// Phases of the research loop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Decomposing,
    Researching,
    Reflecting,
    Synthesizing,
    Complete,
    Failed,
}

impl RunPhase {
    /// Check if this is a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Check whether the state machine allows `self -> to`
    pub fn can_transition_to(&self, to: RunPhase) -> bool {
        use RunPhase::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Decomposing, Researching)
            | (Researching, Reflecting)
            | (Reflecting, Researching)
            | (Reflecting, Synthesizing)
            | (Synthesizing, Complete) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decomposing => "decomposing",
            Self::Researching => "researching",
            Self::Reflecting => "reflecting",
            Self::Synthesizing => "synthesizing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// Question priority. Declaration order is descending importance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Lifecycle of a research question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    #[default]
    Pending,
    Researching,
    Partial,
    Answered,
    Failed,
}

impl QuestionStatus {
    /// Contribution of this status to a category score
    pub fn score_value(&self) -> f64 {
        match self {
            QuestionStatus::Answered => 1.0,
            QuestionStatus::Partial => 0.5,
            _ => 0.0,
        }
    }

    /// Pending or researching: no usable answer yet
    pub fn is_unanswered(&self) -> bool {
        matches!(self, QuestionStatus::Pending | QuestionStatus::Researching)
    }
}

/// Accumulated automated-check results for a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckTally {
    pub passed: u32,
    pub total: u32,
}

impl CheckTally {
    pub fn new(passed: u32, total: u32) -> Self {
        Self {
            passed: passed.min(total),
            total,
        }
    }

    /// Pass rate in [0, 1]; zero when no checks ran
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.passed.min(self.total)) / f64::from(self.total)
        }
    }

    pub fn combine(self, other: CheckTally) -> Self {
        Self {
            passed: self.passed + other.passed.min(other.total),
            total: self.total + other.total,
        }
    }
}

/// A discrete, answerable sub-goal of the research goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchQuestion {
    pub id: String,
    pub text: String,
    pub category: Category,
    pub priority: Priority,
    /// Derived from the goal's criteria or category defaults
    pub weight: f64,
    pub status: QuestionStatus,
    pub confidence: f64,
    /// Ordered references into `ResearchState::findings`
    pub finding_ids: Vec<String>,
    /// Number of researching passes this question took part in
    pub attempts: u32,
    pub checks: Option<CheckTally>,
    /// Follow-up queries suggested by gap analysis
    pub suggested_queries: Vec<String>,
    /// Criterion this question evaluates, if any
    pub criterion: Option<String>,
}

impl ResearchQuestion {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        category: Category,
        priority: Priority,
        weight: f64,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category,
            priority,
            weight: weight.max(0.0),
            status: QuestionStatus::Pending,
            confidence: 0.0,
            finding_ids: Vec::new(),
            attempts: 0,
            checks: None,
            suggested_queries: Vec::new(),
            criterion: None,
        }
    }

    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.criterion = Some(criterion.into());
        self
    }

    pub fn with_suggested_queries(mut self, queries: Vec<String>) -> Self {
        self.suggested_queries = queries;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.priority == Priority::Critical
    }
}

/// A piece of evidence-backed content attached to a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub question_id: String,
    pub content: String,
    /// Source reference, usually a URL
    pub source: String,
    pub confidence: f64,
    /// Query that surfaced the evidence
    pub query: String,
    pub recorded_at: DateTime<Utc>,
}

/// A finding produced by a worker, before the merge assigns it an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFinding {
    pub question_id: String,
    pub content: String,
    pub source: String,
    pub confidence: f64,
    pub query: String,
}

/// An identified deficiency in current evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub description: String,
    pub category: Category,
    pub follow_up_queries: Vec<String>,
    pub importance: Priority,
}

/// Re-planner decision taken at the end of an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Continue,
    Sufficient,
    MaxReached,
}

/// Kind of a non-fatal event recorded in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    OracleFallback,
    EvidenceSkipped,
    QuestionFailed,
    GapsAdded,
    ForcedSufficient,
}

/// A non-fatal event recorded in the iteration trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNote {
    pub kind: NoteKind,
    pub message: String,
}

impl TraceNote {
    pub fn new(kind: NoteKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Append-only audit entry, one per iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration index
    pub iteration: usize,
    pub questions_attempted: Vec<String>,
    pub findings_added: usize,
    pub overall_confidence: f64,
    pub critical_coverage: f64,
    pub overall_score: f64,
    pub decision: Decision,
    pub notes: Vec<TraceNote>,
    pub recorded_at: DateTime<Utc>,
}

/// Distilled reason stored with a failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: String,
    pub message: String,
    pub phase: RunPhase,
}

/// The complete research run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    pub run_id: String,
    pub goal: ResearchGoal,
    pub phase: RunPhase,
    pub questions: Vec<ResearchQuestion>,
    pub findings: Vec<Finding>,
    /// Normalized queries already dispatched (or reserved) in this run
    pub query_history: BTreeSet<String>,
    pub iteration_count: usize,
    /// Question ids selected for the next researching phase
    pub active_batch: Vec<String>,
    pub decision: Option<Decision>,
    pub trace: Vec<IterationRecord>,
    /// Notes gathered since the last iteration record
    pub pending_notes: Vec<TraceNote>,
    pub failure: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lowercase and collapse whitespace so near-identical queries dedupe
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ResearchState {
    pub fn new(run_id: impl Into<String>, goal: ResearchGoal) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            goal,
            phase: RunPhase::Decomposing,
            questions: Vec::new(),
            findings: Vec::new(),
            query_history: BTreeSet::new(),
            iteration_count: 0,
            active_batch: Vec::new(),
            decision: None,
            trace: Vec::new(),
            pending_notes: Vec::new(),
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `to`, rejecting transitions the state machine does not allow
    pub fn transition_to(&mut self, to: RunPhase) -> Result<(), ResearchError> {
        if !self.phase.can_transition_to(to) {
            return Err(ResearchError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn question(&self, id: &str) -> Option<&ResearchQuestion> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn question_mut(&mut self, id: &str) -> Option<&mut ResearchQuestion> {
        self.questions.iter_mut().find(|q| q.id == id)
    }

    pub fn finding(&self, id: &str) -> Option<&Finding> {
        self.findings.iter().find(|f| f.id == id)
    }

    /// Findings of a question, in the question's reference order
    pub fn findings_for(&self, question_id: &str) -> Vec<&Finding> {
        self.question(question_id)
            .map(|q| q.finding_ids.iter().filter_map(|id| self.finding(id)).collect())
            .unwrap_or_default()
    }

    pub fn has_issued_query(&self, query: &str) -> bool {
        self.query_history.contains(&normalize_query(query))
    }

    /// Id for the next question to be added
    pub fn next_question_id(&self) -> String {
        format!("Q{:03}", self.questions.len() + 1)
    }

    pub fn critical_questions(&self) -> impl Iterator<Item = &ResearchQuestion> {
        self.questions.iter().filter(|q| q.is_critical())
    }

    /// Critical questions that are not answered
    pub fn unresolved_critical(&self) -> Vec<&ResearchQuestion> {
        self.critical_questions()
            .filter(|q| q.status != QuestionStatus::Answered)
            .collect()
    }

    pub fn has_question_text(&self, text: &str) -> bool {
        let needle = normalize_query(text);
        self.questions
            .iter()
            .any(|q| normalize_query(&q.text) == needle)
    }

    /// Apply a merged update, returning the new state.
    ///
    /// Finding ids are assigned here, in update order, so the merge point is
    /// the only place that decides numbering.
    pub fn apply_update(&self, update: ResearchUpdate) -> Self {
        let mut new_state = self.clone();

        for query in update.dispatched_queries {
            new_state.query_history.insert(normalize_query(&query));
        }

        for question_id in &update.attempted {
            if let Some(question) = new_state.question_mut(question_id) {
                question.attempts += 1;
                if question.status == QuestionStatus::Pending {
                    question.status = QuestionStatus::Researching;
                }
            }
        }

        for (question_id, tally) in update.check_tallies {
            if let Some(question) = new_state.question_mut(&question_id) {
                question.checks = Some(question.checks.unwrap_or_default().combine(tally));
            }
        }

        let now = Utc::now();
        for pending in update.new_findings {
            if new_state.question(&pending.question_id).is_none() {
                continue;
            }
            let id = format!("F{:04}", new_state.findings.len() + 1);
            if let Some(question) = new_state.question_mut(&pending.question_id) {
                question.finding_ids.push(id.clone());
            }
            new_state.findings.push(Finding {
                id,
                question_id: pending.question_id,
                content: pending.content,
                source: pending.source,
                confidence: pending.confidence.clamp(0.0, 1.0),
                query: pending.query,
                recorded_at: now,
            });
        }

        new_state.pending_notes.extend(update.notes);
        new_state.updated_at = now;
        new_state
    }
}

/// Update produced by a researching-phase worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchUpdate {
    pub new_findings: Vec<PendingFinding>,
    /// Questions that took part in the pass
    pub attempted: BTreeSet<String>,
    pub dispatched_queries: Vec<String>,
    pub check_tallies: Vec<(String, CheckTally)>,
    pub notes: Vec<TraceNote>,
}

impl ResearchUpdate {
    pub fn for_question(question_id: impl Into<String>) -> Self {
        let mut update = Self::default();
        update.attempted.insert(question_id.into());
        update
    }

    pub fn with_finding(mut self, finding: PendingFinding) -> Self {
        self.new_findings.push(finding);
        self
    }

    pub fn with_note(mut self, note: TraceNote) -> Self {
        self.notes.push(note);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.new_findings.is_empty()
            && self.attempted.is_empty()
            && self.dispatched_queries.is_empty()
            && self.check_tallies.is_empty()
            && self.notes.is_empty()
    }

    /// Merge worker updates, preserving input order
    pub fn merge(updates: Vec<ResearchUpdate>) -> Self {
        let mut merged = ResearchUpdate::default();
        for update in updates {
            merged.new_findings.extend(update.new_findings);
            merged.attempted.extend(update.attempted);
            merged.dispatched_queries.extend(update.dispatched_queries);
            merged.check_tallies.extend(update.check_tallies);
            merged.notes.extend(update.notes);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_questions() -> ResearchState {
        let mut state = ResearchState::new("run-1", ResearchGoal::new("Acme", "acme.io"));
        state.questions.push(ResearchQuestion::new(
            "Q001",
            "What is the architecture?",
            Category::Technical,
            Priority::Critical,
            0.4,
        ));
        state.questions.push(ResearchQuestion::new(
            "Q002",
            "Who are the competitors?",
            Category::Market,
            Priority::High,
            0.2,
        ));
        state
    }

    fn pending(question_id: &str, content: &str) -> PendingFinding {
        PendingFinding {
            question_id: question_id.into(),
            content: content.into(),
            source: "https://acme.io".into(),
            confidence: 0.9,
            query: "acme architecture".into(),
        }
    }

    #[test]
    fn test_phase_transitions() {
        use RunPhase::*;
        assert!(Decomposing.can_transition_to(Researching));
        assert!(Reflecting.can_transition_to(Researching));
        assert!(Reflecting.can_transition_to(Synthesizing));
        assert!(Researching.can_transition_to(Failed));
        assert!(!Decomposing.can_transition_to(Synthesizing));
        assert!(!Complete.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Researching));
    }

    #[test]
    fn test_transition_to_rejects_invalid() {
        let mut state = state_with_questions();
        assert!(state.transition_to(RunPhase::Complete).is_err());
        assert!(state.transition_to(RunPhase::Researching).is_ok());
        assert_eq!(state.phase, RunPhase::Researching);
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Acme   Tech\tStack "), "acme tech stack");
    }

    #[test]
    fn test_check_tally() {
        let tally = CheckTally::new(3, 4).combine(CheckTally::new(1, 4));
        assert_eq!(tally, CheckTally { passed: 4, total: 8 });
        assert!((tally.pass_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(CheckTally::default().pass_rate(), 0.0);
    }

    #[test]
    fn test_apply_update_assigns_finding_ids_in_order() {
        let state = state_with_questions();
        let update = ResearchUpdate::merge(vec![
            ResearchUpdate::for_question("Q001").with_finding(pending("Q001", "Rust services")),
            ResearchUpdate::for_question("Q002").with_finding(pending("Q002", "Two rivals")),
            ResearchUpdate::for_question("Q001").with_finding(pending("Q001", "Postgres")),
        ]);

        let new_state = state.apply_update(update);

        // Original untouched
        assert!(state.findings.is_empty());

        let ids: Vec<_> = new_state.findings.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["F0001", "F0002", "F0003"]);
        assert_eq!(
            new_state.question("Q001").unwrap().finding_ids,
            vec!["F0001".to_string(), "F0003".to_string()]
        );
        assert_eq!(new_state.question("Q001").unwrap().attempts, 1);
        assert_eq!(
            new_state.question("Q002").unwrap().status,
            QuestionStatus::Researching
        );
    }

    #[test]
    fn test_apply_update_records_queries_and_checks() {
        let state = state_with_questions();
        let mut update = ResearchUpdate::for_question("Q001");
        update.dispatched_queries.push("Acme  Architecture".into());
        update.check_tallies.push(("Q001".into(), CheckTally::new(2, 3)));
        update
            .notes
            .push(TraceNote::new(NoteKind::EvidenceSkipped, "timeout"));

        let new_state = state.apply_update(update);
        assert!(new_state.has_issued_query("acme architecture"));
        assert_eq!(
            new_state.question("Q001").unwrap().checks,
            Some(CheckTally::new(2, 3))
        );
        assert_eq!(new_state.pending_notes.len(), 1);
    }

    #[test]
    fn test_apply_update_ignores_unknown_question() {
        let state = state_with_questions();
        let update = ResearchUpdate::default().with_finding(pending("Q999", "orphan"));
        let new_state = state.apply_update(update);
        assert!(new_state.findings.is_empty());
    }

    #[test]
    fn test_state_serialization_roundtrip() {
        let state = state_with_questions();
        let json = serde_json::to_string(&state).unwrap();
        let restored: ResearchState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
