//! Tavily evidence gatherer
//!
//! Searches the web through the Tavily Search API. Each search result becomes
//! an [`EvidenceItem`] whose source confidence is Tavily's relevance score.
//! Timeouts and retries are applied by the caller through the run's retry
//! policy, so a single `gather` call is a single HTTP request.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{EvidenceGatherer, EvidenceItem, EvidenceRequest};
use crate::error::EvidenceFetchError;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Tavily's hard request timeout; the run-level timeout is usually tighter
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_MAX_RESULTS: u32 = 5;

/// Search depth for Tavily API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

/// Evidence gatherer backed by Tavily Search
pub struct TavilyGatherer {
    api_key: String,
    client: Client,
    base_url: String,
    timeout: Duration,
    max_results: u32,
    search_depth: SearchDepth,
}

impl TavilyGatherer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_results: DEFAULT_MAX_RESULTS,
            search_depth: SearchDepth::default(),
        }
    }

    /// Point at a different API host (used by tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(1, 20);
        self
    }

    pub fn with_search_depth(mut self, depth: SearchDepth) -> Self {
        self.search_depth = depth;
        self
    }

    async fn search(&self, body: &TavilyRequest) -> Result<TavilyResponse, EvidenceFetchError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EvidenceFetchError::Timeout(self.timeout)
                } else {
                    EvidenceFetchError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TavilyResponse>()
                .await
                .map_err(|e| EvidenceFetchError::Parse(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(EvidenceFetchError::Unauthorized),
            429 => Err(EvidenceFetchError::RateLimited),
            code @ 500..=599 => Err(EvidenceFetchError::Server(code, error_text)),
            code => Err(EvidenceFetchError::Http(code, error_text)),
        }
    }
}

#[async_trait]
impl EvidenceGatherer for TavilyGatherer {
    async fn gather(
        &self,
        request: &EvidenceRequest,
    ) -> Result<Vec<EvidenceItem>, EvidenceFetchError> {
        let body = TavilyRequest {
            query: request.query.clone(),
            max_results: self.max_results,
            search_depth: self.search_depth,
            include_answer: false,
        };

        let response = self.search(&body).await?;
        debug!(
            query = %request.query,
            subject = %request.target_subject,
            results = response.results.len(),
            "Tavily search complete"
        );

        Ok(response
            .results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| EvidenceItem::new(r.url, r.content, r.score).with_title(r.title))
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest {
    query: String,
    max_results: u32,
    search_depth: SearchDepth,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}
