//! Research loop
//!
//! The iterative, evidence-driven diligence loop and everything it reasons
//! about.
//!
//! # Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Research Run                             │
//! │                                                              │
//! │  Decomposing                                                 │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ • Goal → 15-20 weighted, categorized questions       │    │
//! │  │ • Initial batch: top critical questions by weight    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                          ▼                                   │
//! │  Researching ◀──────────────┐                                │
//! │  ┌──────────────────────┐   │                                │
//! │  │ • Query fan-out      │   │ continue                       │
//! │  │ • Extract + score    │   │                                │
//! │  └──────────────────────┘   │                                │
//! │                          ▼  │                                │
//! │  Reflecting ────────────────┘                                │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ • Coverage / confidence → continue, sufficient, max  │    │
//! │  │ • Next batch or gap-driven questions                 │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                          ▼                                   │
//! │  Synthesizing → Complete                                     │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ • Category sections, grade, recommendation           │    │
//! │  │ • Contiguous citations, unresolved critical gaps     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use scaniq_research::research::{ResearchController, ResearchGoal, Criterion, Category};
//!
//! let goal = ResearchGoal::new("Acme", "acme.io")
//!     .with_criterion(Criterion::new("scalability", 40.0, Category::Technical));
//! let outcome = controller.start(goal).await?;
//! ```

pub mod citations;
pub mod config;
pub mod controller;
pub mod decomposer;
pub mod gather;
pub mod goal;
pub mod planner;
pub mod progress;
pub mod prompts;
pub mod scorer;
pub mod state;
pub mod synthesis;

pub use citations::{Citation, CitationMapper};
pub use config::RunConfig;
pub use controller::{ResearchController, RunOutcome, RunStatus};
pub use decomposer::{Decomposition, QuestionDecomposer};
pub use gather::EvidenceCollector;
pub use goal::{Category, Criterion, InvestmentThesis, ResearchGoal, RunRequest};
pub use planner::{PlanOutcome, Replanner};
pub use progress::{CancellationFlag, LogProgress, ProgressEvent, ProgressSink};
pub use prompts::ResearchPrompts;
pub use scorer::{CategoryScore, Scorecard};
pub use state::{
    CheckTally, Decision, Finding, IterationRecord, KnowledgeGap, Priority, QuestionStatus,
    ResearchQuestion, ResearchState, ResearchUpdate, RunPhase, TraceNote,
};
pub use synthesis::{FinalReport, Grade, Recommendation, SynthesisCompiler};
