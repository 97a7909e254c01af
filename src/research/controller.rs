//! Research loop controller
//!
//! Drives one run through the phase state machine:
//!
//! ```text
//! Decomposing → Researching → Reflecting ─┬→ Researching (continue)
//!                                         └→ Synthesizing → Complete
//! any non-terminal phase ──(fatal error)──→ Failed
//! ```
//!
//! One iteration is one `Researching → Reflecting` pass. The state is
//! persisted after every transition, so a crashed or cancelled run resumes
//! from its last completed phase. A lease in the store keeps two workers
//! from driving the same run.
//!
//! # Example
//!
//! ```ignore
//! let controller = ResearchController::new(oracle, gatherer, Arc::new(MemoryStore::new()));
//! let outcome = controller.start(ResearchGoal::new("Acme", "acme.io")).await?;
//! println!("{}", outcome.report.unwrap().executive_summary);
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::decomposer::QuestionDecomposer;
use super::gather::{plan_queries, EvidenceCollector};
use super::goal::{ResearchGoal, RunRequest};
use super::config::RunConfig;
use super::planner::Replanner;
use super::progress::{
    research_progress, CancellationFlag, LogProgress, ProgressEvent, ProgressSink,
    COMPLETE_PERCENT, DECOMPOSED_PERCENT, SYNTHESIZING_PERCENT,
};
use super::scorer;
use super::state::{
    normalize_query, Decision, FailureReason, IterationRecord, ResearchState, RunPhase,
};
use super::synthesis::{FinalReport, SynthesisCompiler};
use crate::error::ResearchError;
use crate::evidence::EvidenceGatherer;
use crate::oracle::{OracleClient, OracleGateway};
use crate::persistence::{Lease, PersistenceStore};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
}

/// Result of driving a run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// State as last persisted; partial results stay available on failure
    pub state: ResearchState,
    pub report: Option<FinalReport>,
}

/// Composes decomposition, evidence gathering, scoring, re-planning and
/// synthesis around injected collaborators
pub struct ResearchController {
    oracle: Arc<dyn OracleClient>,
    gatherer: Arc<dyn EvidenceGatherer>,
    store: Arc<dyn PersistenceStore>,
    progress: Arc<dyn ProgressSink>,
    cancellation: CancellationFlag,
    worker_id: String,
}

impl ResearchController {
    pub fn new(
        oracle: Arc<dyn OracleClient>,
        gatherer: Arc<dyn EvidenceGatherer>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        Self {
            oracle,
            gatherer,
            store,
            progress: Arc::new(LogProgress),
            cancellation: CancellationFlag::new(),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Handle for cancelling runs driven by this controller
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Start a new run under a fresh id
    pub async fn start(&self, goal: ResearchGoal) -> Result<RunOutcome, ResearchError> {
        let run_id = Uuid::new_v4().to_string();
        self.run(&run_id, goal).await
    }

    /// Start a run submitted by an external scheduler
    pub async fn submit(
        &self,
        request: RunRequest,
        config: RunConfig,
    ) -> Result<RunOutcome, ResearchError> {
        let goal = request.into_goal(config)?;
        self.start(goal).await
    }

    /// Drive `run_id`, resuming it if the store already has a snapshot
    pub async fn run(&self, run_id: &str, goal: ResearchGoal) -> Result<RunOutcome, ResearchError> {
        match self.store.load_snapshot(run_id).await? {
            Some(snapshot) => {
                if snapshot.state.goal != goal {
                    warn!(run_id, "Goal differs from the stored run, resuming the stored goal");
                }
                self.drive(snapshot.state, false).await
            }
            None => self.drive(ResearchState::new(run_id, goal), true).await,
        }
    }

    /// Continue a run from its latest snapshot
    pub async fn resume(&self, run_id: &str) -> Result<RunOutcome, ResearchError> {
        let snapshot = self
            .store
            .load_snapshot(run_id)
            .await?
            .ok_or_else(|| ResearchError::UnknownRun(run_id.to_string()))?;
        info!(run_id, phase = snapshot.phase.as_str(), sequence = snapshot.sequence, "Resuming run");
        self.drive(snapshot.state, false).await
    }

    async fn drive(&self, mut state: ResearchState, fresh: bool) -> Result<RunOutcome, ResearchError> {
        let run_id = state.run_id.clone();

        match state.phase {
            RunPhase::Complete => {
                let report = self.store.load_final_report(&run_id).await?;
                return Ok(self.outcome(state, RunStatus::Completed, report));
            }
            RunPhase::Failed => return Ok(self.outcome(state, RunStatus::Failed, None)),
            _ => {}
        }

        let ttl = state.goal.config.lease_ttl;
        let mut lease = self.store.acquire_lease(&run_id, &self.worker_id, ttl).await?;
        info!(run_id = %run_id, worker = %self.worker_id, phase = state.phase.as_str(), "Driving run");

        let result = match self.save_initial(&state, fresh).await {
            Ok(()) => self.drive_phases(&mut state, &mut lease).await,
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(report) => Ok(self.outcome(state, RunStatus::Completed, Some(report))),
            Err(ResearchError::Cancelled { phase }) => {
                info!(run_id = %run_id, phase = phase.as_str(), "Run cancelled");
                Ok(self.outcome(state, RunStatus::Cancelled, None))
            }
            Err(e) if e.marks_run_failed() => match self.fail(&mut state, &e).await {
                Ok(()) => Ok(self.outcome(state, RunStatus::Failed, None)),
                Err(persist) => Err(persist),
            },
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Run aborted");
                Err(e)
            }
        };

        if let Err(e) = self.store.release_lease(&lease).await {
            warn!(run_id = %run_id, error = %e, "Failed to release run lease");
        }
        outcome
    }

    async fn drive_phases(
        &self,
        state: &mut ResearchState,
        lease: &mut Lease,
    ) -> Result<FinalReport, ResearchError> {
        let config = state.goal.config.clone();
        let gateway = OracleGateway::new(
            Arc::clone(&self.oracle),
            config.retry.clone(),
            config.oracle_timeout,
        );
        let collector = EvidenceCollector::new(Arc::clone(&self.gatherer), gateway.clone(), config.clone());

        loop {
            if self.cancellation.is_cancelled() {
                return Err(ResearchError::Cancelled { phase: state.phase });
            }

            match state.phase {
                RunPhase::Decomposing => {
                    state.goal.validate()?;
                    let decomposition = QuestionDecomposer::new(gateway.clone())
                        .decompose(&state.goal)
                        .await?;
                    state.questions = decomposition.questions;
                    state.active_batch = decomposition.initial_batch;
                    state.pending_notes.extend(decomposition.notes);
                    self.advance(state, RunPhase::Researching).await?;
                    self.emit(
                        state,
                        DECOMPOSED_PERCENT,
                        format!("Decomposed goal into {} questions", state.questions.len()),
                    );
                }
                RunPhase::Researching => {
                    let plans = plan_queries(state, &state.active_batch);
                    debug!(run_id = %state.run_id, iteration = state.iteration_count + 1, batch = ?state.active_batch, "Researching");

                    // Queries are reserved durably before any is dispatched
                    for plan in &plans {
                        state
                            .query_history
                            .extend(plan.queries.iter().map(|q| normalize_query(q)));
                    }
                    self.store.save_snapshot(&state.run_id, state.phase, state).await?;

                    let update = collector.collect(state, &plans).await;

                    if self.cancellation.is_cancelled() {
                        // Results are dropped; the queries stay reserved
                        return Err(ResearchError::Cancelled { phase: state.phase });
                    }

                    *state = scorer::rescore(&state.apply_update(update));
                    state.iteration_count += 1;
                    self.advance(state, RunPhase::Reflecting).await?;
                }
                RunPhase::Reflecting => {
                    let next = self.reflect(state).await?;
                    self.advance(state, next).await?;
                    if next == RunPhase::Synthesizing {
                        self.emit(state, SYNTHESIZING_PERCENT, "Synthesizing report".to_string());
                    }
                }
                RunPhase::Synthesizing => {
                    let report = SynthesisCompiler::new(gateway.clone()).compile(state).await;
                    self.store
                        .save_final_report(&state.run_id, &report, &report.citations)
                        .await?;
                    self.advance(state, RunPhase::Complete).await?;
                    self.emit(state, COMPLETE_PERCENT, format!("Report complete: {}", report.recommendation));
                    return Ok(report);
                }
                RunPhase::Complete | RunPhase::Failed => {
                    return Err(ResearchError::InvalidTransition {
                        from: state.phase,
                        to: RunPhase::Researching,
                    });
                }
            }

            *lease = self.store.renew_lease(lease, config.lease_ttl).await?;
        }
    }

    /// Score, re-plan and log the iteration; returns the next phase
    async fn reflect(&self, state: &mut ResearchState) -> Result<RunPhase, ResearchError> {
        let scorecard = scorer::scorecard(state);
        let plan = Replanner::new(OracleGateway::new(
            Arc::clone(&self.oracle),
            state.goal.config.retry.clone(),
            state.goal.config.oracle_timeout,
        ))
        .plan(state, &scorecard)
        .await;

        let recorded: usize = state.trace.iter().map(|r| r.findings_added).sum();
        let mut notes = std::mem::take(&mut state.pending_notes);
        notes.extend(plan.notes);

        let record = IterationRecord {
            iteration: state.iteration_count,
            questions_attempted: state.active_batch.clone(),
            findings_added: state.findings.len().saturating_sub(recorded),
            overall_confidence: scorecard.overall_confidence,
            critical_coverage: scorecard.critical_coverage,
            overall_score: scorecard.overall_score,
            decision: plan.decision,
            notes,
            recorded_at: Utc::now(),
        };

        let logged = self.store.iteration_records(&state.run_id).await?;
        if logged.iter().any(|r| r.iteration == record.iteration) {
            debug!(run_id = %state.run_id, iteration = record.iteration, "Iteration already logged");
        } else {
            self.store.append_iteration_record(&state.run_id, &record).await?;
        }

        info!(
            run_id = %state.run_id,
            iteration = record.iteration,
            findings_added = record.findings_added,
            critical_coverage = record.critical_coverage,
            overall_confidence = record.overall_confidence,
            decision = ?record.decision,
            "Iteration complete"
        );

        state.trace.push(record);
        state.decision = Some(plan.decision);
        state.questions.extend(plan.new_questions);
        state.active_batch = plan.batch;

        self.emit(
            state,
            research_progress(state.iteration_count, state.goal.config.max_iterations),
            format!("Iteration {} finished: {:?}", state.iteration_count, plan.decision),
        );

        Ok(match plan.decision {
            Decision::Continue => RunPhase::Researching,
            Decision::Sufficient | Decision::MaxReached => RunPhase::Synthesizing,
        })
    }

    /// Persist the starting state of a fresh run
    async fn save_initial(&self, state: &ResearchState, fresh: bool) -> Result<(), ResearchError> {
        if fresh {
            self.store.save_snapshot(&state.run_id, state.phase, state).await?;
        }
        Ok(())
    }

    async fn advance(&self, state: &mut ResearchState, to: RunPhase) -> Result<(), ResearchError> {
        let from = state.phase;
        state.transition_to(to)?;
        let sequence = self.store.save_snapshot(&state.run_id, to, state).await?;
        debug!(
            run_id = %state.run_id,
            from = from.as_str(),
            to = to.as_str(),
            sequence,
            "Phase transition persisted"
        );
        Ok(())
    }

    /// Move the run to `Failed` and persist the distilled reason
    async fn fail(&self, state: &mut ResearchState, cause: &ResearchError) -> Result<(), ResearchError> {
        error!(run_id = %state.run_id, phase = state.phase.as_str(), error = %cause, "Run failed");
        state.failure = Some(FailureReason {
            kind: cause.kind().to_string(),
            message: cause.to_string(),
            phase: state.phase,
        });
        state.transition_to(RunPhase::Failed)?;
        self.store
            .save_snapshot(&state.run_id, RunPhase::Failed, state)
            .await?;
        Ok(())
    }

    fn emit(&self, state: &ResearchState, percent: u8, message: String) {
        self.progress.on_progress(&ProgressEvent {
            run_id: state.run_id.clone(),
            phase: state.phase,
            percent,
            iteration: state.iteration_count,
            message,
        });
    }

    fn outcome(&self, state: ResearchState, status: RunStatus, report: Option<FinalReport>) -> RunOutcome {
        RunOutcome {
            run_id: state.run_id.clone(),
            status,
            state,
            report,
        }
    }
}
