//! Error types for the research orchestrator
//!
//! Recoverable errors (`OracleError`, `EvidenceFetchError`) degrade to
//! deterministic fallbacks and are recorded in the iteration trace. Fatal
//! errors move the run to `Failed` (or abort it, for persistence failures).

use std::time::Duration;
use thiserror::Error;

use crate::research::state::RunPhase;

/// Errors raised by the reasoning oracle boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    /// The oracle could not be reached or returned a transport error
    #[error("Oracle unreachable: {0}")]
    Unreachable(String),

    /// The oracle did not answer within the configured timeout
    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),

    /// No structured block could be extracted from the response
    #[error("Oracle response unparsable: {0}")]
    Unparsable(String),

    /// A structured block was found but failed task schema validation
    #[error("Oracle response for {task} violates schema: {reason}")]
    Schema { task: String, reason: String },
}

impl OracleError {
    /// Check if a new attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, OracleError::Unreachable(_) | OracleError::Timeout(_))
    }
}

/// Errors raised by the evidence gatherer boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvidenceFetchError {
    #[error("Evidence request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited by evidence provider")]
    RateLimited,

    #[error("Unauthorized - check API key")]
    Unauthorized,

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("HTTP error ({0}): {1}")]
    Http(u16, String),

    #[error("Failed to parse evidence response: {0}")]
    Parse(String),
}

impl EvidenceFetchError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EvidenceFetchError::Timeout(_)
                | EvidenceFetchError::Connection(_)
                | EvidenceFetchError::RateLimited
                | EvidenceFetchError::Server(_, _)
        )
    }
}

/// Errors raised by the persistence store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Run {run_id} is leased by {owner}")]
    LeaseHeld { run_id: String, owner: String },

    #[error("Lease for run {0} was lost")]
    LeaseLost(String),
}

impl PersistenceError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

/// Top-level error for a research run.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Evidence fetch error: {0}")]
    EvidenceFetch(#[from] EvidenceFetchError),

    #[error("Decomposition failed: {0}")]
    DecompositionFailure(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Cooperative cancellation observed at a phase boundary
    #[error("Run cancelled during {phase:?}")]
    Cancelled { phase: RunPhase },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("No snapshot found for run {0}")]
    UnknownRun(String),
}

impl ResearchError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Recoverable errors never abort a run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ResearchError::Oracle(_) | ResearchError::EvidenceFetch(_)
        )
    }

    /// Fatal errors that move the run into the `Failed` phase.
    ///
    /// Persistence failures are fatal too, but the run cannot record them,
    /// so they abort without a `Failed` snapshot.
    pub fn marks_run_failed(&self) -> bool {
        matches!(
            self,
            ResearchError::DecompositionFailure(_)
                | ResearchError::Config(_)
                | ResearchError::InvalidTransition { .. }
        )
    }

    /// Short machine-friendly label stored with failed runs
    pub fn kind(&self) -> &'static str {
        match self {
            ResearchError::Oracle(_) => "oracle",
            ResearchError::EvidenceFetch(_) => "evidence_fetch",
            ResearchError::DecompositionFailure(_) => "decomposition_failure",
            ResearchError::Persistence(_) => "persistence",
            ResearchError::Cancelled { .. } => "cancelled",
            ResearchError::Config(_) => "config",
            ResearchError::InvalidTransition { .. } => "invalid_transition",
            ResearchError::UnknownRun(_) => "unknown_run",
        }
    }
}
