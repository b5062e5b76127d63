//! sq-tools: Search tools for support-query
//!
//! - Search: result types and citation rendering
//! - LangSearch: HTTP client for the LangSearch web-search API
//! - Web: the `langsearch_websearch_tool` used by the pipeline

pub mod langsearch;
pub mod search;
pub mod web;

pub use langsearch::{LangSearchClient, LangSearchConfig, SearchError};
pub use search::{SearchEntry, SearchResults, NO_RESULTS};
pub use web::{create_web_tools, WebSearchTool};
