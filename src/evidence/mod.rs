//! Evidence gatherer boundary
//!
//! The gatherer is a black box that turns a query about a subject into zero
//! or more evidence items. Items may carry the tally of automated checks
//! (scans) run against the subject; those feed the confidence blend.

pub mod queries;
pub mod tavily;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EvidenceFetchError;
use crate::research::state::CheckTally;

pub use queries::derive_queries;
pub use tavily::TavilyGatherer;

/// A single evidence query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRequest {
    pub query: String,
    pub target_subject: String,
}

impl EvidenceRequest {
    pub fn new(query: impl Into<String>, target_subject: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            target_subject: target_subject.into(),
        }
    }
}

/// Evidence returned by the gatherer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    /// How much the source itself is trusted, 0.0 to 1.0
    pub source_confidence: f64,
    /// Automated check results attached to this evidence
    #[serde(default)]
    pub checks: Option<CheckTally>,
}

impl EvidenceItem {
    pub fn new(url: impl Into<String>, content: impl Into<String>, source_confidence: f64) -> Self {
        Self {
            url: url.into(),
            title: None,
            content: content.into(),
            source_confidence: source_confidence.clamp(0.0, 1.0),
            checks: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_checks(mut self, checks: CheckTally) -> Self {
        self.checks = Some(checks);
        self
    }
}

/// External search/fetch capability
#[async_trait]
pub trait EvidenceGatherer: Send + Sync {
    async fn gather(&self, request: &EvidenceRequest)
        -> Result<Vec<EvidenceItem>, EvidenceFetchError>;
}
