//! # ScanIQ Research
//!
//! Iterative, evidence-driven research orchestrator for technical due
//! diligence.
//!
//! A run turns a goal (a subject plus weighted evaluation criteria) into
//! prioritized questions, gathers and scores evidence in rounds until a
//! stopping rule fires, then compiles a graded, citation-backed report.
//!
//! ## Modules
//!
//! - [`research`]: the loop controller and its components
//! - [`oracle`]: reasoning oracle boundary (LLM via `rig-core`)
//! - [`evidence`]: evidence gatherer boundary (Tavily search)
//! - [`persistence`]: snapshots, audit log, reports and run leases
//! - [`retry`]: timeout and retry policy shared by both boundaries
//! - [`error`]: error taxonomy

pub mod error;
pub mod evidence;
pub mod oracle;
pub mod persistence;
pub mod research;
pub mod retry;

pub use error::{EvidenceFetchError, OracleError, PersistenceError, ResearchError};
pub use evidence::{EvidenceGatherer, EvidenceItem, EvidenceRequest, TavilyGatherer};
pub use oracle::{OracleClient, OracleGateway, OracleRequest, OracleTask, RigOracle};
pub use persistence::{FileStore, MemoryStore, PersistenceStore};
pub use research::{
    Category, Criterion, FinalReport, InvestmentThesis, ResearchController, ResearchGoal,
    RunConfig, RunOutcome, RunRequest, RunStatus,
};
pub use retry::RetryPolicy;
