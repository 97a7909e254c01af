//! Persistence store for research runs
//!
//! The store keeps, per run id:
//! - one immutable snapshot of the full `ResearchState` per phase transition
//! - the append-only iteration log
//! - the final report and its citations
//! - an ownership lease so only one worker drives a run at a time
//!
//! Runs are isolated by id; nothing is shared between runs.
//!
//! # Implementations
//!
//! - [`MemoryStore`]: in-process store for tests and single-shot runs
//! - [`FileStore`]: JSON files with atomic writes and optional zstd
//!   compression

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PersistenceError;
use crate::research::citations::Citation;
use crate::research::state::{IterationRecord, ResearchState, RunPhase};
use crate::research::synthesis::FinalReport;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Full run state captured after a phase transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub run_id: String,
    pub phase: RunPhase,
    /// Monotonic per-run sequence number, starting at 1
    pub sequence: u64,
    pub state: ResearchState,
    pub saved_at: DateTime<Utc>,
}

/// Ownership lease on a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub run_id: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn new(run_id: impl Into<String>, owner: impl Into<String>, ttl: Duration) -> Self {
        Self {
            run_id: run_id.into(),
            owner: owner.into(),
            expires_at: expiry_after(ttl),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Whether `owner` may take this lease
    pub fn available_to(&self, owner: &str) -> bool {
        self.owner == owner || self.is_expired()
    }
}

fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
    Utc::now() + ttl
}

/// Storage for run snapshots, audit records and reports
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Persist a snapshot of `state` taken in `phase`; returns its sequence
    async fn save_snapshot(
        &self,
        run_id: &str,
        phase: RunPhase,
        state: &ResearchState,
    ) -> Result<u64, PersistenceError>;

    /// Latest snapshot of a run, if any
    async fn load_snapshot(&self, run_id: &str) -> Result<Option<Snapshot>, PersistenceError>;

    async fn append_iteration_record(
        &self,
        run_id: &str,
        record: &IterationRecord,
    ) -> Result<(), PersistenceError>;

    /// Iteration records in append order
    async fn iteration_records(&self, run_id: &str)
        -> Result<Vec<IterationRecord>, PersistenceError>;

    async fn save_final_report(
        &self,
        run_id: &str,
        report: &FinalReport,
        citations: &[Citation],
    ) -> Result<(), PersistenceError>;

    async fn load_final_report(&self, run_id: &str)
        -> Result<Option<FinalReport>, PersistenceError>;

    /// Take the run lease, or refresh it if `owner` already holds it.
    ///
    /// Fails with [`PersistenceError::LeaseHeld`] while another owner holds
    /// an unexpired lease.
    async fn acquire_lease(
        &self,
        run_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Lease, PersistenceError>;

    /// Extend a held lease; fails with [`PersistenceError::LeaseLost`] if it
    /// was taken over
    async fn renew_lease(&self, lease: &Lease, ttl: Duration) -> Result<Lease, PersistenceError>;

    /// Drop a held lease; releasing a lease owned by someone else is a no-op
    async fn release_lease(&self, lease: &Lease) -> Result<(), PersistenceError>;
}
