//! # Configuration Module
//!
//! Environment configuration for the CLI: which Ollama model serves as the
//! reasoning oracle, the Tavily key for evidence gathering, and where run
//! state is stored. Values come from the process environment, with a `.env`
//! file loaded first when present.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Runtime configuration for the research CLI
#[derive(Debug, Clone)]
pub struct Config {
    /// The Ollama model used as the reasoning oracle (e.g. "llama3.2")
    pub model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Sampling temperature for oracle calls. Structured answers need a low
    /// value.
    pub temperature: f32,

    /// Tavily API key used by the evidence gatherer
    pub tavily_api_key: Option<String>,

    /// Directory holding run snapshots, iteration logs and reports
    pub store_dir: PathBuf,
}

/// `<data dir>/scaniq-research`, falling back to the working directory
fn default_store_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("scaniq-research"))
        .unwrap_or_else(|| PathBuf::from(".scaniq-research"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            temperature: 0.2,
            tavily_api_key: None,
            store_dir: default_store_dir(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Reads `OLLAMA_MODEL`, `OLLAMA_API_BASE_URL`, `TEMPERATURE`,
    /// `TAVILY_API_KEY` and `SCANIQ_STORE_DIR`.
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OLLAMA_MODEL") {
            config.model = val;
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Ok(val) = env::var("TEMPERATURE") {
            config.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.2)")?;
        }

        if let Ok(val) = env::var("TAVILY_API_KEY") {
            if !val.trim().is_empty() {
                config.tavily_api_key = Some(val);
            }
        }

        if let Ok(val) = env::var("SCANIQ_STORE_DIR") {
            config.store_dir = PathBuf::from(val);
        }

        Ok(config)
    }

    /// Validate the configuration before any run starts
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.model.trim().is_empty() {
            anyhow::bail!("OLLAMA_MODEL cannot be empty");
        }

        if self.tavily_api_key.is_none() {
            anyhow::bail!("TAVILY_API_KEY must be set to gather evidence");
        }

        if self.store_dir.as_os_str().is_empty() {
            anyhow::bail!("SCANIQ_STORE_DIR cannot be empty");
        }

        Ok(())
    }
}
