//! Oracle adapter over a Rig agent
//!
//! Wraps a `rig::agent::Agent<M>` so any Rig completion provider (Ollama,
//! OpenAI, Anthropic, ...) can serve as the reasoning oracle.
//!
//! ```rust,ignore
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig::providers::ollama;
//!
//! let client = ollama::Client::from_env();
//! let oracle = RigOracle::new(client.agent("qwen3:8b").preamble(&ResearchPrompts::preamble()).build());
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};

use super::{OracleClient, OracleRequest};
use crate::error::OracleError;
use crate::research::prompts::ResearchPrompts;

/// Oracle backed by a Rig agent
pub struct RigOracle<M>
where
    M: CompletionModel + Send + Sync,
{
    agent: Arc<Agent<M>>,
    model_name: String,
}

impl<M> RigOracle<M>
where
    M: CompletionModel + Send + Sync,
{
    pub fn new(agent: Agent<M>) -> Self {
        Self {
            agent: Arc::new(agent),
            model_name: "rig-agent".to_string(),
        }
    }

    /// Name reported in logs
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn agent(&self) -> &Agent<M> {
        &self.agent
    }
}

#[async_trait]
impl<M> OracleClient for RigOracle<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn call(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let prompt = ResearchPrompts::render(request);
        debug!(model = %self.model_name, task = %request.task, "Calling oracle");

        self.agent
            .prompt(prompt.as_str())
            .await
            .map_err(|e| OracleError::Unreachable(format!("{}: {}", self.model_name, e)))
    }
}
