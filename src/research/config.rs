//! Run configuration
//!
//! Every threshold the loop consults lives here so that a run can be tuned
//! without touching the algorithms. Defaults follow the documented contract:
//! 0.8 critical coverage and 0.7 overall confidence for sufficiency.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ResearchError;
use crate::retry::RetryPolicy;

/// Most retries any oracle or evidence call may take
pub const MAX_RETRIES: usize = 2;

/// Configuration for a single research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Upper bound on research/reflect passes
    pub max_iterations: usize,

    /// Confidence at which a question counts as answered
    pub target_confidence: f64,

    /// Confidence at which a question counts as partially answered
    pub minimum_confidence: f64,

    /// Critical coverage required for a `sufficient` decision
    pub sufficient_coverage: f64,

    /// Overall confidence required for a `sufficient` decision
    pub sufficient_confidence: f64,

    /// Minimum extraction relevance for an evidence item to become a finding
    pub relevance_threshold: f64,

    /// Hard cap on the total question count
    pub max_questions: usize,

    /// Size of the initial critical batch
    pub initial_batch_size: usize,

    /// Evidence fan-out width within a researching phase
    pub concurrency: usize,

    /// Per-call evidence gatherer timeout
    #[serde(with = "humantime_serde")]
    pub evidence_timeout: Duration,

    /// Per-call oracle timeout
    #[serde(with = "humantime_serde")]
    pub oracle_timeout: Duration,

    /// Retry policy shared by oracle and evidence calls
    pub retry: RetryPolicy,

    /// Weight of the automated-check pass rate in the confidence blend
    pub check_blend_weight: f64,

    /// Overrides the thesis recommendation threshold (0-100)
    pub recommendation_threshold: Option<f64>,

    /// Score band below the threshold that still yields `ProceedWithConditions`
    pub conditional_band: f64,

    /// Attempts after which a question below minimum confidence is failed
    pub max_question_attempts: u32,

    /// Ownership lease time-to-live
    #[serde(with = "humantime_serde")]
    pub lease_ttl: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            target_confidence: 0.8,
            minimum_confidence: 0.5,
            sufficient_coverage: 0.8,
            sufficient_confidence: 0.7,
            relevance_threshold: 0.6,
            max_questions: 40,
            initial_batch_size: 5,
            concurrency: num_cpus::get().clamp(3, 5),
            evidence_timeout: Duration::from_secs(10),
            oracle_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            check_blend_weight: 0.6,
            recommendation_threshold: None,
            conditional_band: 15.0,
            max_question_attempts: 3,
            lease_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl RunConfig {
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sufficiency(mut self, coverage: f64, confidence: f64) -> Self {
        self.sufficient_coverage = coverage;
        self.sufficient_confidence = confidence;
        self
    }

    /// Reject out-of-range values before a run starts
    pub fn validate(&self) -> Result<(), ResearchError> {
        let unit = [
            ("target_confidence", self.target_confidence),
            ("minimum_confidence", self.minimum_confidence),
            ("sufficient_coverage", self.sufficient_coverage),
            ("sufficient_confidence", self.sufficient_confidence),
            ("relevance_threshold", self.relevance_threshold),
            ("check_blend_weight", self.check_blend_weight),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ResearchError::config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.minimum_confidence > self.target_confidence {
            return Err(ResearchError::config(
                "minimum_confidence cannot exceed target_confidence",
            ));
        }
        if self.max_iterations == 0 {
            return Err(ResearchError::config("max_iterations must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(ResearchError::config("concurrency must be at least 1"));
        }
        if self.initial_batch_size == 0 {
            return Err(ResearchError::config("initial_batch_size must be at least 1"));
        }
        if self.max_questions == 0 {
            return Err(ResearchError::config("max_questions must be at least 1"));
        }
        if self.max_question_attempts == 0 {
            return Err(ResearchError::config("max_question_attempts must be at least 1"));
        }
        if let Some(threshold) = self.recommendation_threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(ResearchError::config(format!(
                    "recommendation_threshold must be within 0-100, got {}",
                    threshold
                )));
            }
        }
        if self.conditional_band < 0.0 {
            return Err(ResearchError::config("conditional_band cannot be negative"));
        }
        if self.evidence_timeout.is_zero() || self.oracle_timeout.is_zero() {
            return Err(ResearchError::config("timeouts must be non-zero"));
        }
        if self.retry.max_retries > MAX_RETRIES {
            return Err(ResearchError::config(format!(
                "retry.max_retries must be at most {}, got {}",
                MAX_RETRIES, self.retry.max_retries
            )));
        }
        Ok(())
    }
}
