//! Evidence fan-out for a researching phase
//!
//! Queries for the whole batch are planned up front against the run's query
//! history (see [`plan_queries`]), so no query is dispatched twice even
//! though workers run in parallel. The controller persists the plan before
//! calling [`EvidenceCollector::collect`]. Each (question, query) pair runs
//! on its own task, bounded by a semaphore. Workers never touch the run state: each returns a
//! [`ResearchUpdate`] and the controller merges them at one point.
//!
//! Evidence items are scored for relevance by the oracle's extract task, or
//! lexically when the oracle fails. Items at or above the relevance threshold
//! become findings with `confidence = relevance * source_confidence`.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::config::RunConfig;
use super::goal::Category;
use super::state::{
    normalize_query, NoteKind, PendingFinding, ResearchState, ResearchUpdate, TraceNote,
};
use crate::error::EvidenceFetchError;
use crate::evidence::queries::keywords;
use crate::evidence::{derive_queries, EvidenceGatherer, EvidenceItem, EvidenceRequest};
use crate::oracle::{ExtractResponse, OracleGateway};
use crate::retry::call_with_retry;

const MAX_EXTRACT_CHARS: usize = 4000;
const MAX_FINDING_CHARS: usize = 600;

/// Queries planned for one question
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub question_id: String,
    pub queries: Vec<String>,
}

/// Plan queries for every question in `batch`, in batch order.
///
/// Queries planned for earlier questions count as issued for later ones.
pub fn plan_queries(state: &ResearchState, batch: &[String]) -> Vec<QueryPlan> {
    let mut history = state.query_history.clone();
    batch
        .iter()
        .filter_map(|id| state.question(id))
        .map(|question| {
            let queries = derive_queries(question, &state.goal, &history);
            history.extend(queries.iter().map(|q| normalize_query(q)));
            QueryPlan {
                question_id: question.id.clone(),
                queries,
            }
        })
        .collect()
}

/// Fraction of the question's keywords found in `content`
pub fn lexical_relevance(question: &str, content: &str) -> f64 {
    let words = keywords(question);
    if words.is_empty() {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    let hits = words.iter().filter(|w| haystack.contains(w.as_str())).count();
    hits as f64 / words.len() as f64
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Everything a worker needs, cloned into its task
#[derive(Clone)]
struct Job {
    question_id: String,
    question_text: String,
    category: Category,
    subject: String,
    query: String,
}

/// Runs the evidence fan-out for a batch
#[derive(Clone)]
pub struct EvidenceCollector {
    gatherer: Arc<dyn EvidenceGatherer>,
    oracle: OracleGateway,
    config: RunConfig,
}

impl EvidenceCollector {
    pub fn new(gatherer: Arc<dyn EvidenceGatherer>, oracle: OracleGateway, config: RunConfig) -> Self {
        Self {
            gatherer,
            oracle,
            config,
        }
    }

    /// Dispatch the planned queries and return the merged update.
    ///
    /// Every planned question counts as attempted, whether or not it yielded
    /// findings. Fetch failures become trace notes.
    pub async fn collect(&self, state: &ResearchState, plans: &[QueryPlan]) -> ResearchUpdate {
        let mut base = ResearchUpdate::default();
        let mut jobs = Vec::new();
        for plan in plans {
            base.attempted.insert(plan.question_id.clone());
            if plan.queries.is_empty() {
                base.notes.push(TraceNote::new(
                    NoteKind::EvidenceSkipped,
                    format!("{}: no unissued queries left", plan.question_id),
                ));
                continue;
            }
            let Some(question) = state.question(&plan.question_id) else {
                continue;
            };
            for query in &plan.queries {
                base.dispatched_queries.push(query.clone());
                jobs.push(Job {
                    question_id: question.id.clone(),
                    question_text: question.text.clone(),
                    category: question.category,
                    subject: state.goal.subject.clone(),
                    query: query.clone(),
                });
            }
        }

        info!(
            run_id = %state.run_id,
            questions = plans.len(),
            queries = jobs.len(),
            concurrency = self.config.concurrency,
            "Dispatching evidence queries"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let collector = self.clone();
            let permits = Arc::clone(&semaphore);
            let label = job.clone();

            let handle = tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ResearchUpdate::default().with_note(TraceNote::new(
                            NoteKind::EvidenceSkipped,
                            format!("{} '{}': worker pool closed", job.question_id, job.query),
                        ))
                    }
                };
                collector.run_job(job).await
            });
            handles.push((label, handle));
        }

        let mut updates = vec![base];
        for (job, handle) in handles {
            match handle.await {
                Ok(update) => updates.push(update),
                Err(e) => {
                    warn!(question_id = %job.question_id, query = %job.query, error = %e, "Evidence worker aborted");
                    updates.push(ResearchUpdate::default().with_note(TraceNote::new(
                        NoteKind::EvidenceSkipped,
                        format!("{} '{}': worker aborted: {}", job.question_id, job.query, e),
                    )));
                }
            }
        }

        let merged = ResearchUpdate::merge(updates);
        debug!(
            run_id = %state.run_id,
            findings = merged.new_findings.len(),
            notes = merged.notes.len(),
            "Evidence merged"
        );
        merged
    }

    async fn run_job(&self, job: Job) -> ResearchUpdate {
        let mut update = ResearchUpdate::default();
        let request = EvidenceRequest::new(job.query.clone(), job.subject.clone());
        let label = format!("evidence:{}", job.question_id);

        let items: Result<Vec<EvidenceItem>, EvidenceFetchError> = call_with_retry(
            &self.config.retry,
            self.config.evidence_timeout,
            &label,
            || self.gatherer.gather(&request),
        )
        .await;

        let items = match items {
            Ok(items) => items,
            Err(e) => {
                warn!(question_id = %job.question_id, query = %job.query, error = %e, "Evidence fetch failed, skipping");
                return update.with_note(TraceNote::new(
                    NoteKind::EvidenceSkipped,
                    format!("{} '{}': {}", job.question_id, job.query, e),
                ));
            }
        };

        let mut oracle_failed = false;
        for item in items {
            if let Some(checks) = item.checks {
                update.check_tallies.push((job.question_id.clone(), checks));
            }

            let (relevance, summary) = match self.extract(&job, &item).await {
                Ok(response) => (response.relevance, response.summary),
                Err(note) => {
                    if !oracle_failed {
                        update.notes.push(note);
                        oracle_failed = true;
                    }
                    (lexical_relevance(&job.question_text, &item.content), String::new())
                }
            };

            if relevance < self.config.relevance_threshold {
                debug!(question_id = %job.question_id, url = %item.url, relevance, "Evidence below relevance threshold");
                continue;
            }

            let content = if summary.trim().is_empty() {
                truncate(&item.content, MAX_FINDING_CHARS)
            } else {
                summary.trim().to_string()
            };
            update.new_findings.push(PendingFinding {
                question_id: job.question_id.clone(),
                content,
                source: item.url.clone(),
                confidence: (relevance * item.source_confidence).clamp(0.0, 1.0),
                query: job.query.clone(),
            });
        }

        update
    }

    /// Oracle-scored relevance; an error comes back as the note to record
    async fn extract(&self, job: &Job, item: &EvidenceItem) -> Result<ExtractResponse, TraceNote> {
        let payload = json!({
            "subject": job.subject,
            "question": job.question_text,
            "category": job.category,
            "query": job.query,
            "url": item.url,
            "title": item.title,
            "content": truncate(&item.content, MAX_EXTRACT_CHARS),
        });

        self.oracle.ask::<ExtractResponse>(payload).await.map_err(|e| {
            warn!(question_id = %job.question_id, error = %e, "Extraction failed, scoring lexically");
            TraceNote::new(
                NoteKind::OracleFallback,
                format!("extract {}: {}", job.question_id, e),
            )
        })
    }
}
