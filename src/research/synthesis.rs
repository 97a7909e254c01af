//! Synthesis compilation
//!
//! Turns a finished run into a [`FinalReport`]: per-category sections, the
//! overall score and confidence, a letter grade, a recommendation, the
//! numbered citations and an executive summary. The summary is written by
//! the oracle when available, otherwise drafted deterministically from the
//! category highlights. Unresolved critical gaps are always listed.
//!
//! # Grade bands
//!
//! | Score | Grade |
//! |-------|-------|
//! | ≥ 90  | A     |
//! | ≥ 80  | B     |
//! | ≥ 70  | C     |
//! | ≥ 60  | D     |
//! | < 60  | F     |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use super::citations::{Citation, CitationMapper};
use super::goal::{Category, InvestmentThesis, ResearchGoal};
use super::scorer::{self, Scorecard};
use super::state::{
    Decision, Finding, NoteKind, Priority, QuestionStatus, ResearchState, TraceNote,
};
use crate::oracle::{OracleGateway, SynthesizeResponse};

/// Letter grade for an overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else if score >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Investment recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Proceed,
    ProceedWithConditions,
    Decline,
}

impl Recommendation {
    /// Compare `score` (0-100) against `threshold`, downgrading a `Proceed`
    /// while critical gaps remain
    pub fn select(score: f64, threshold: f64, band: f64, has_critical_gaps: bool) -> Self {
        if score >= threshold {
            if has_critical_gaps {
                Recommendation::ProceedWithConditions
            } else {
                Recommendation::Proceed
            }
        } else if score >= threshold - band {
            Recommendation::ProceedWithConditions
        } else {
            Recommendation::Decline
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Recommendation::Proceed => "Proceed",
            Recommendation::ProceedWithConditions => "Proceed with conditions",
            Recommendation::Decline => "Decline",
        };
        f.write_str(text)
    }
}

/// One question and its findings within a report section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub question_id: String,
    pub question: String,
    pub priority: Priority,
    pub status: QuestionStatus,
    pub confidence: f64,
    pub findings: Vec<Finding>,
}

/// Report section for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySection {
    pub category: Category,
    /// 0-100
    pub score: f64,
    pub weight: f64,
    pub entries: Vec<SectionEntry>,
}

/// A critical question the run could not answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedGap {
    pub question_id: String,
    pub question: String,
    pub category: Category,
    pub status: QuestionStatus,
    pub confidence: f64,
}

/// Where the executive summary came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Oracle,
    Draft,
}

/// The final, citation-backed report of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: String,
    pub subject: String,
    pub domain: String,
    pub thesis: InvestmentThesis,
    pub executive_summary: String,
    pub summary_source: SummarySource,
    /// 0-100
    pub overall_score: f64,
    pub overall_confidence: f64,
    pub critical_coverage: f64,
    pub grade: Grade,
    pub recommendation: Recommendation,
    pub recommendation_threshold: f64,
    pub decision: Option<Decision>,
    pub iterations: usize,
    pub sections: Vec<CategorySection>,
    pub unresolved_critical_gaps: Vec<UnresolvedGap>,
    pub citations: Vec<Citation>,
    /// Degradations recorded while compiling, e.g. an oracle fallback
    #[serde(default)]
    pub notes: Vec<TraceNote>,
    pub generated_at: DateTime<Utc>,
}

/// Build report sections from the run state, in category and question order
pub fn build_sections(state: &ResearchState, scorecard: &Scorecard) -> Vec<CategorySection> {
    Category::ALL
        .iter()
        .map(|category| {
            let entries = state
                .questions
                .iter()
                .filter(|q| q.category == *category)
                .map(|q| SectionEntry {
                    question_id: q.id.clone(),
                    question: q.text.clone(),
                    priority: q.priority,
                    status: q.status,
                    confidence: q.confidence,
                    findings: state.findings_for(&q.id).into_iter().cloned().collect(),
                })
                .collect();
            let (score, weight) = scorecard
                .categories
                .get(category)
                .map(|c| (c.score, c.weight))
                .unwrap_or((0.0, 0.0));
            CategorySection {
                category: *category,
                score,
                weight,
                entries,
            }
        })
        .collect()
}

/// Critical questions that are not answered
pub fn unresolved_gaps(state: &ResearchState) -> Vec<UnresolvedGap> {
    state
        .unresolved_critical()
        .into_iter()
        .map(|q| UnresolvedGap {
            question_id: q.id.clone(),
            question: q.text.clone(),
            category: q.category,
            status: q.status,
            confidence: q.confidence,
        })
        .collect()
}

/// Best-cited claim of each category, as `(category, text)` lines
fn highlights(sections: &[CategorySection], citations: &[Citation]) -> Vec<(Category, String)> {
    let numbers = CitationMapper::index(citations);
    let claims: BTreeMap<&str, &Citation> =
        citations.iter().map(|c| (c.finding_id.as_str(), c)).collect();

    sections
        .iter()
        .map(|section| {
            let best = section
                .entries
                .iter()
                .flat_map(|e| e.findings.iter())
                .max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.id.cmp(&a.id))
                });
            let text = match best {
                Some(f) => match (claims.get(f.id.as_str()), numbers.get(f.id.as_str())) {
                    (Some(c), Some(n)) => format!("{} [{}]", c.claim, n),
                    _ => "no supporting evidence found".to_string(),
                },
                None => "no supporting evidence found".to_string(),
            };
            (section.category, text)
        })
        .collect()
}

fn capitalize(category: Category) -> String {
    let name = category.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Deterministic executive summary draft
pub fn draft_summary(
    goal: &ResearchGoal,
    scorecard: &Scorecard,
    grade: Grade,
    recommendation: Recommendation,
    sections: &[CategorySection],
    citations: &[Citation],
) -> String {
    let mut lines = vec![format!(
        "{} scores {:.1}/100 (grade {}) with {:.0}% confidence and {:.0}% critical coverage. Recommendation: {}.",
        goal.subject,
        scorecard.overall_score,
        grade,
        scorecard.overall_confidence * 100.0,
        scorecard.critical_coverage * 100.0,
        recommendation
    )];

    for (category, text) in highlights(sections, citations) {
        let score = sections
            .iter()
            .find(|s| s.category == category)
            .map(|s| s.score)
            .unwrap_or(0.0);
        lines.push(format!("- {} ({:.0}/100): {}", capitalize(category), score, text));
    }

    lines.join("\n")
}

/// The gap list appended to every summary
pub fn gaps_block(gaps: &[UnresolvedGap]) -> String {
    if gaps.is_empty() {
        return "Unresolved critical gaps: none.".to_string();
    }
    let mut lines = vec!["Unresolved critical gaps:".to_string()];
    for gap in gaps {
        lines.push(format!(
            "- [{}] {} ({:?}, confidence {:.2})",
            gap.category, gap.question, gap.status, gap.confidence
        ));
    }
    lines.join("\n")
}

/// Compiles the final report
pub struct SynthesisCompiler {
    oracle: OracleGateway,
}

impl SynthesisCompiler {
    pub fn new(oracle: OracleGateway) -> Self {
        Self { oracle }
    }

    /// Compile the report; oracle failures fall back to the draft summary
    /// and are recorded in the report's notes
    pub async fn compile(&self, state: &ResearchState) -> FinalReport {
        let goal = &state.goal;
        let scorecard = scorer::scorecard(state);
        let sections = build_sections(state, &scorecard);
        let citations = CitationMapper::map(&sections);
        let gaps = unresolved_gaps(state);

        let grade = Grade::from_score(scorecard.overall_score);
        let threshold = goal.recommendation_threshold();
        let recommendation = Recommendation::select(
            scorecard.overall_score,
            threshold,
            goal.config.conditional_band,
            !gaps.is_empty(),
        );

        let draft = draft_summary(goal, &scorecard, grade, recommendation, &sections, &citations);
        let mut notes = Vec::new();

        let payload = json!({
            "subject": goal.subject,
            "domain": goal.domain,
            "thesis": goal.thesis,
            "focus_areas": goal.thesis.focus_areas(),
            "overall_score": scorecard.overall_score,
            "grade": grade,
            "recommendation": recommendation,
            "draft": draft,
            "unresolved_critical_gaps": gaps.iter().map(|g| &g.question).collect::<Vec<_>>(),
        });

        let (summary, source) = match self.oracle.ask::<SynthesizeResponse>(payload).await {
            Ok(response) => (response.executive_summary.trim().to_string(), SummarySource::Oracle),
            Err(e) => {
                warn!(run_id = %state.run_id, error = %e, "Synthesis oracle failed, using draft summary");
                notes.push(TraceNote::new(NoteKind::OracleFallback, format!("synthesize: {}", e)));
                (draft, SummarySource::Draft)
            }
        };

        let executive_summary = format!("{}\n\n{}", summary, gaps_block(&gaps));

        info!(
            run_id = %state.run_id,
            score = scorecard.overall_score,
            grade = %grade,
            recommendation = %recommendation,
            citations = citations.len(),
            "Report compiled"
        );

        FinalReport {
            run_id: state.run_id.clone(),
            subject: goal.subject.clone(),
            domain: goal.domain.clone(),
            thesis: goal.thesis,
            executive_summary,
            summary_source: source,
            overall_score: scorecard.overall_score,
            overall_confidence: scorecard.overall_confidence,
            critical_coverage: scorecard.critical_coverage,
            grade,
            recommendation,
            recommendation_threshold: threshold,
            decision: state.decision,
            iterations: state.iteration_count,
            sections,
            unresolved_critical_gaps: gaps,
            citations,
            notes,
            generated_at: Utc::now(),
        }
    }
}
