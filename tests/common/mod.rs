//! Deterministic collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scaniq_research::persistence::{Lease, Snapshot};
use scaniq_research::research::citations::Citation;
use scaniq_research::research::progress::{CancellationFlag, ProgressEvent, ProgressSink};
use scaniq_research::research::state::{
    normalize_query, IterationRecord, ResearchState, RunPhase,
};
use scaniq_research::research::synthesis::FinalReport;
use scaniq_research::{
    EvidenceFetchError, EvidenceGatherer, EvidenceItem, EvidenceRequest, MemoryStore,
    OracleClient, OracleError, OracleRequest, OracleTask, PersistenceError, PersistenceStore,
    ResearchGoal, RetryPolicy, RunConfig,
};

/// One scripted decomposition entry: (text, category, priority)
pub type QuestionSpec = (&'static str, &'static str, &'static str);

/// Five critical questions plus ten others.
///
/// The critical questions carry the markers the gatherer answers for.
pub fn scenario_questions() -> Vec<QuestionSpec> {
    vec![
        ("What is the alpha architecture?", "technical", "critical"),
        ("How does the bravo pipeline scale?", "technical", "critical"),
        ("How large is the charlie segment?", "market", "critical"),
        ("What is the delta revenue model?", "business", "critical"),
        ("Who leads the echo organisation?", "team", "critical"),
        ("Which databases power storage?", "technical", "high"),
        ("Which competitors sell similar tooling?", "market", "high"),
        ("What is the observability setup?", "technical", "medium"),
        ("How is deployment automated?", "technical", "medium"),
        ("Which regions show demand?", "market", "medium"),
        ("What are gross margins?", "business", "medium"),
        ("How much funding was raised?", "business", "medium"),
        ("What is engineering headcount?", "team", "medium"),
        ("How is hiring progressing?", "team", "low"),
        ("What partnerships exist?", "business", "low"),
    ]
}

/// How the fake oracle behaves
#[derive(Debug, Clone)]
pub enum OracleMode {
    /// Answers every task with well-formed JSON
    Scripted(Vec<QuestionSpec>),
    /// Every call fails as unreachable
    Unreachable,
}

/// Oracle that answers deterministically by task.
///
/// Extraction rates content containing "answer" at 0.85, anything else 0.1.
pub struct FakeOracle {
    mode: OracleMode,
    pub calls: Mutex<Vec<OracleTask>>,
}

impl FakeOracle {
    pub fn scripted(questions: Vec<QuestionSpec>) -> Arc<Self> {
        Arc::new(Self {
            mode: OracleMode::Scripted(questions),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            mode: OracleMode::Unreachable,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self, task: OracleTask) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| **t == task).count()
    }
}

#[async_trait]
impl OracleClient for FakeOracle {
    async fn call(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.calls.lock().unwrap().push(request.task);

        let questions = match &self.mode {
            OracleMode::Unreachable => {
                return Err(OracleError::Unreachable("connection refused".into()))
            }
            OracleMode::Scripted(questions) => questions,
        };

        let response = match request.task {
            OracleTask::Decompose => json!({
                "questions": questions
                    .iter()
                    .map(|(text, category, priority)| json!({
                        "text": text,
                        "category": category,
                        "priority": priority,
                    }))
                    .collect::<Vec<_>>()
            }),
            OracleTask::Extract => {
                let content = request.field("content");
                if content.contains("answer") {
                    json!({"relevance": 0.85, "summary": content})
                } else {
                    json!({"relevance": 0.1, "summary": ""})
                }
            }
            OracleTask::Reflect => json!({"gaps": []}),
            OracleTask::Synthesize => json!({
                "executive_summary": format!("{} reviewed.", request.field("subject"))
            }),
        };

        // Wrapped in prose, as real models tend to answer
        Ok(format!("Here is the result:\n```json\n{}\n```", response))
    }
}

/// Gatherer that answers queries mentioning one of its markers.
///
/// Records every dispatched query. Optionally raises a cancellation flag on
/// its first call.
pub struct FakeGatherer {
    markers: Vec<&'static str>,
    pub queries: Mutex<Vec<String>>,
    cancel_on_first_call: Mutex<Option<CancellationFlag>>,
}

impl FakeGatherer {
    pub fn answering(markers: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            markers,
            queries: Mutex::new(Vec::new()),
            cancel_on_first_call: Mutex::new(None),
        })
    }

    pub fn cancel_on_first_call(self: &Arc<Self>, flag: CancellationFlag) {
        *self.cancel_on_first_call.lock().unwrap() = Some(flag);
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Whether every dispatched query is distinct after normalization
    pub fn all_unique(&self) -> bool {
        let queries = self.dispatched();
        let mut normalized: Vec<_> = queries.iter().map(|q| normalize_query(q)).collect();
        normalized.sort();
        normalized.dedup();
        normalized.len() == queries.len()
    }
}

#[async_trait]
impl EvidenceGatherer for FakeGatherer {
    async fn gather(&self, request: &EvidenceRequest) -> Result<Vec<EvidenceItem>, EvidenceFetchError> {
        self.queries.lock().unwrap().push(request.query.clone());
        if let Some(flag) = self.cancel_on_first_call.lock().unwrap().take() {
            flag.cancel();
        }

        let query = request.query.to_lowercase();
        Ok(self
            .markers
            .iter()
            .filter(|marker| query.contains(*marker))
            .map(|marker| {
                EvidenceItem::new(
                    format!("https://evidence.example/{}", marker),
                    format!("The {} answer for {}.", marker, request.target_subject),
                    1.0,
                )
            })
            .collect())
    }
}

/// Memory store whose first snapshot save in one phase fails.
///
/// Stands in for a worker that dies mid-run; every later save succeeds.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    failing_phase: RunPhase,
    tripped: Mutex<bool>,
}

impl FlakyStore {
    pub fn failing_in(inner: Arc<MemoryStore>, phase: RunPhase) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing_phase: phase,
            tripped: Mutex::new(false),
        })
    }
}

#[async_trait]
impl PersistenceStore for FlakyStore {
    async fn save_snapshot(
        &self,
        run_id: &str,
        phase: RunPhase,
        state: &ResearchState,
    ) -> Result<u64, PersistenceError> {
        if phase == self.failing_phase {
            let mut tripped = self.tripped.lock().unwrap();
            if !*tripped {
                *tripped = true;
                return Err(PersistenceError::io("disk gone"));
            }
        }
        self.inner.save_snapshot(run_id, phase, state).await
    }

    async fn load_snapshot(&self, run_id: &str) -> Result<Option<Snapshot>, PersistenceError> {
        self.inner.load_snapshot(run_id).await
    }

    async fn append_iteration_record(
        &self,
        run_id: &str,
        record: &IterationRecord,
    ) -> Result<(), PersistenceError> {
        self.inner.append_iteration_record(run_id, record).await
    }

    async fn iteration_records(
        &self,
        run_id: &str,
    ) -> Result<Vec<IterationRecord>, PersistenceError> {
        self.inner.iteration_records(run_id).await
    }

    async fn save_final_report(
        &self,
        run_id: &str,
        report: &FinalReport,
        citations: &[Citation],
    ) -> Result<(), PersistenceError> {
        self.inner.save_final_report(run_id, report, citations).await
    }

    async fn load_final_report(
        &self,
        run_id: &str,
    ) -> Result<Option<FinalReport>, PersistenceError> {
        self.inner.load_final_report(run_id).await
    }

    async fn acquire_lease(
        &self,
        run_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Lease, PersistenceError> {
        self.inner.acquire_lease(run_id, owner, ttl).await
    }

    async fn renew_lease(&self, lease: &Lease, ttl: Duration) -> Result<Lease, PersistenceError> {
        self.inner.renew_lease(lease, ttl).await
    }

    async fn release_lease(&self, lease: &Lease) -> Result<(), PersistenceError> {
        self.inner.release_lease(lease).await
    }
}

/// Progress sink that keeps every event
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn percents(&self) -> Vec<u8> {
        self.events.lock().unwrap().iter().map(|e| e.percent).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Run config with fast retries
pub fn fast_config(max_iterations: usize) -> RunConfig {
    RunConfig::default()
        .with_max_iterations(max_iterations)
        .with_concurrency(3)
        .with_retry(RetryPolicy::new(2).with_backoff_base(Duration::from_millis(1)))
}

pub fn goal(config: RunConfig) -> ResearchGoal {
    ResearchGoal::new("Acme", "acme.io").with_config(config)
}
