//! Reasoning oracle boundary
//!
//! The oracle is an external text-reasoning capability used for four tasks:
//! decomposition, extraction, reflection and synthesis. Requests carry a task
//! and a JSON payload; responses are free text from which a structured block
//! is recovered by [`ResponseParser`] and validated against a per-task schema.
//!
//! All calls go through [`OracleGateway`], which applies the run's timeout
//! and retry policy. Callers treat any [`OracleError`] as recoverable and fall
//! back to a deterministic heuristic.

pub mod parser;
pub mod rig_agent;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::OracleError;
use crate::retry::{call_with_retry, RetryPolicy};

pub use parser::ResponseParser;
pub use rig_agent::RigOracle;

/// Oracle task kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleTask {
    Decompose,
    Extract,
    Reflect,
    Synthesize,
}

impl fmt::Display for OracleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OracleTask::Decompose => "decompose",
            OracleTask::Extract => "extract",
            OracleTask::Reflect => "reflect",
            OracleTask::Synthesize => "synthesize",
        };
        f.write_str(name)
    }
}

/// A single oracle request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub task: OracleTask,
    pub payload: Value,
}

impl OracleRequest {
    pub fn new(task: OracleTask, payload: Value) -> Self {
        Self { task, payload }
    }

    /// Read a string field of the payload, empty when absent
    pub fn field(&self, name: &str) -> &str {
        self.payload.get(name).and_then(Value::as_str).unwrap_or("")
    }
}

/// External text-reasoning capability.
///
/// Implementations return the raw response text; parsing and validation are
/// the gateway's job.
#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn call(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Structured response schema for one oracle task
pub trait TaskSchema: DeserializeOwned + Send {
    const TASK: OracleTask;

    /// Semantic checks beyond deserialization
    fn validate(&self) -> Result<(), String>;
}

/// A question proposed by the decomposition task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedQuestion {
    pub text: String,
    pub category: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub criterion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposeResponse {
    pub questions: Vec<ProposedQuestion>,
}

impl TaskSchema for DecomposeResponse {
    const TASK: OracleTask = OracleTask::Decompose;

    fn validate(&self) -> Result<(), String> {
        if self.questions.is_empty() {
            return Err("no questions returned".into());
        }
        if self.questions.iter().any(|q| q.text.trim().is_empty()) {
            return Err("question text cannot be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub relevance: f64,
    #[serde(default)]
    pub summary: String,
}

impl TaskSchema for ExtractResponse {
    const TASK: OracleTask = OracleTask::Extract;

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.relevance) {
            return Err(format!("relevance {} outside [0, 1]", self.relevance));
        }
        Ok(())
    }
}

/// A knowledge gap proposed by the reflection task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedGap {
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
    #[serde(default)]
    pub importance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectResponse {
    #[serde(default)]
    pub gaps: Vec<ProposedGap>,
}

impl TaskSchema for ReflectResponse {
    const TASK: OracleTask = OracleTask::Reflect;

    fn validate(&self) -> Result<(), String> {
        if self.gaps.iter().any(|g| g.description.trim().is_empty()) {
            return Err("gap description cannot be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeResponse {
    pub executive_summary: String,
}

impl TaskSchema for SynthesizeResponse {
    const TASK: OracleTask = OracleTask::Synthesize;

    fn validate(&self) -> Result<(), String> {
        if self.executive_summary.trim().is_empty() {
            return Err("executive summary cannot be empty".into());
        }
        Ok(())
    }
}

/// Timeout-bounded, retrying, parsing front door to an [`OracleClient`]
#[derive(Clone)]
pub struct OracleGateway {
    client: Arc<dyn OracleClient>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl OracleGateway {
    pub fn new(client: Arc<dyn OracleClient>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            retry,
            timeout,
        }
    }

    /// Ask the oracle for a task and parse the response into `T`.
    ///
    /// Parse and schema failures are not retried.
    pub async fn ask<T: TaskSchema>(&self, payload: Value) -> Result<T, OracleError> {
        let request = OracleRequest::new(T::TASK, payload);
        let label = format!("oracle:{}", T::TASK);
        let text = call_with_retry(&self.retry, self.timeout, &label, || {
            self.client.call(&request)
        })
        .await?;

        debug!(task = %T::TASK, chars = text.len(), "Oracle responded");
        ResponseParser::parse::<T>(&text)
    }
}
