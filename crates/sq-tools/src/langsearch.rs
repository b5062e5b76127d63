//! Client for the LangSearch web-search API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::search::{SearchEntry, SearchResults};

pub const DEFAULT_BASE_URL: &str = "https://api.langsearch.com/v1";

/// Failure modes of one search call. The messages keep the wording callers
/// already show to users and models.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search API request failed, reason: LANGSEARCH_API_KEY is not set")]
    MissingApiKey,

    #[error("Search API request failed, status code: {status}, error message: {body}")]
    Status { status: u16, body: String },

    #[error("Search API request failed, reason: {message} (code {code})")]
    Api { code: i64, message: String },

    #[error("Search API request failed, reason: Failed to parse search results {0}")]
    Parse(String),

    #[error("Search API request failed, reason: {0}")]
    Network(String),
}

#[derive(Debug, Clone)]
pub struct LangSearchConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// `oneDay`, `oneWeek`, `oneMonth`, `oneYear` or `noLimit`.
    pub freshness: String,
    /// Ask for the long-form page summary.
    pub summary: bool,
}

impl Default for LangSearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            freshness: "noLimit".to_string(),
            summary: true,
        }
    }
}

#[derive(Clone)]
pub struct LangSearchClient {
    client: Client,
    config: LangSearchConfig,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    freshness: &'a str,
    summary: bool,
    count: u32,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl LangSearchClient {
    pub fn new(config: LangSearchConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &LangSearchConfig {
        &self.config
    }

    pub async fn search(&self, query: &str, count: u32) -> Result<SearchResults, SearchError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(SearchError::MissingApiKey)?;

        let body = SearchRequest {
            query,
            freshness: &self.config.freshness,
            summary: self.config.summary,
            count,
        };
        debug!(query, count, "LangSearch request");

        let response = self
            .client
            .post(format!(
                "{}/web-search",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if status.as_u16() != 200 {
            warn!(status = status.as_u16(), "LangSearch returned an error status");
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let results = parse_envelope(&text)?;
        debug!(entries = results.len(), "LangSearch response");
        Ok(results)
    }
}

fn parse_envelope(text: &str) -> Result<SearchResults, SearchError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| SearchError::Parse(e.to_string()))?;

    let data = envelope.data.filter(|d| !is_empty_data(d));
    let data = match data {
        Some(data) if envelope.code == 200 => data,
        _ => {
            return Err(SearchError::Api {
                code: envelope.code,
                message: envelope
                    .msg
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            })
        }
    };

    let value = data
        .get("webPages")
        .and_then(|pages| pages.get("value"))
        .ok_or_else(|| SearchError::Parse("missing data.webPages.value".to_string()))?;

    if value.is_null() {
        return Ok(SearchResults::default());
    }

    let entries: Vec<SearchEntry> =
        serde_json::from_value(value.clone()).map_err(|e| SearchError::Parse(e.to_string()))?;
    Ok(SearchResults::new(entries))
}

fn is_empty_data(data: &serde_json::Value) -> bool {
    match data {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
