//! In-memory persistence store

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{Lease, PersistenceStore, Snapshot};
use crate::error::PersistenceError;
use crate::research::citations::Citation;
use crate::research::state::{IterationRecord, ResearchState, RunPhase};
use crate::research::synthesis::FinalReport;

#[derive(Debug, Default)]
struct RunRecord {
    snapshots: Vec<Snapshot>,
    iterations: Vec<IterationRecord>,
    report: Option<FinalReport>,
    citations: Vec<Citation>,
    lease: Option<Lease>,
}

/// Store that keeps every run in process memory.
///
/// All snapshots are retained so tests can inspect the phase history.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot of a run, oldest first
    pub async fn snapshots(&self, run_id: &str) -> Vec<Snapshot> {
        self.runs
            .read()
            .await
            .get(run_id)
            .map(|r| r.snapshots.clone())
            .unwrap_or_default()
    }

    /// Phases of every snapshot of a run, oldest first
    pub async fn phase_history(&self, run_id: &str) -> Vec<RunPhase> {
        self.snapshots(run_id)
            .await
            .into_iter()
            .map(|s| s.phase)
            .collect()
    }

    pub async fn citations(&self, run_id: &str) -> Vec<Citation> {
        self.runs
            .read()
            .await
            .get(run_id)
            .map(|r| r.citations.clone())
            .unwrap_or_default()
    }

    pub async fn current_lease(&self, run_id: &str) -> Option<Lease> {
        self.runs
            .read()
            .await
            .get(run_id)
            .and_then(|r| r.lease.clone())
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn save_snapshot(
        &self,
        run_id: &str,
        phase: RunPhase,
        state: &ResearchState,
    ) -> Result<u64, PersistenceError> {
        let mut runs = self.runs.write().await;
        let record = runs.entry(run_id.to_string()).or_default();
        let sequence = record.snapshots.len() as u64 + 1;
        record.snapshots.push(Snapshot {
            run_id: run_id.to_string(),
            phase,
            sequence,
            state: state.clone(),
            saved_at: Utc::now(),
        });
        Ok(sequence)
    }

    async fn load_snapshot(&self, run_id: &str) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(self
            .runs
            .read()
            .await
            .get(run_id)
            .and_then(|r| r.snapshots.last().cloned()))
    }

    async fn append_iteration_record(
        &self,
        run_id: &str,
        record: &IterationRecord,
    ) -> Result<(), PersistenceError> {
        self.runs
            .write()
            .await
            .entry(run_id.to_string())
            .or_default()
            .iterations
            .push(record.clone());
        Ok(())
    }

    async fn iteration_records(
        &self,
        run_id: &str,
    ) -> Result<Vec<IterationRecord>, PersistenceError> {
        Ok(self
            .runs
            .read()
            .await
            .get(run_id)
            .map(|r| r.iterations.clone())
            .unwrap_or_default())
    }

    async fn save_final_report(
        &self,
        run_id: &str,
        report: &FinalReport,
        citations: &[Citation],
    ) -> Result<(), PersistenceError> {
        let mut runs = self.runs.write().await;
        let record = runs.entry(run_id.to_string()).or_default();
        record.report = Some(report.clone());
        record.citations = citations.to_vec();
        Ok(())
    }

    async fn load_final_report(
        &self,
        run_id: &str,
    ) -> Result<Option<FinalReport>, PersistenceError> {
        Ok(self
            .runs
            .read()
            .await
            .get(run_id)
            .and_then(|r| r.report.clone()))
    }

    async fn acquire_lease(
        &self,
        run_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Lease, PersistenceError> {
        let mut runs = self.runs.write().await;
        let record = runs.entry(run_id.to_string()).or_default();
        if let Some(existing) = &record.lease {
            if !existing.available_to(owner) {
                return Err(PersistenceError::LeaseHeld {
                    run_id: run_id.to_string(),
                    owner: existing.owner.clone(),
                });
            }
        }
        let lease = Lease::new(run_id, owner, ttl);
        record.lease = Some(lease.clone());
        Ok(lease)
    }

    async fn renew_lease(&self, lease: &Lease, ttl: Duration) -> Result<Lease, PersistenceError> {
        let mut runs = self.runs.write().await;
        let record = runs.entry(lease.run_id.clone()).or_default();
        match &record.lease {
            Some(current) if current.owner == lease.owner => {
                let renewed = Lease::new(&lease.run_id, &lease.owner, ttl);
                record.lease = Some(renewed.clone());
                Ok(renewed)
            }
            _ => Err(PersistenceError::LeaseLost(lease.run_id.clone())),
        }
    }

    async fn release_lease(&self, lease: &Lease) -> Result<(), PersistenceError> {
        let mut runs = self.runs.write().await;
        if let Some(record) = runs.get_mut(&lease.run_id) {
            if record.lease.as_ref().map(|l| l.owner == lease.owner) == Some(true) {
                record.lease = None;
            }
        }
        Ok(())
    }
}
