//! The web-search tool exposed to the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use sq_core::pipeline::SEARCH_TOOL_NAME;
use sq_core::{Error, PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters};

use crate::langsearch::LangSearchClient;

/// Searches the web through LangSearch and returns numbered citations.
///
/// A failed search is reported as an error output rather than an `Err`, so
/// the answer step can still respond to the user.
pub struct WebSearchTool {
    client: LangSearchClient,
    default_count: u32,
}

impl WebSearchTool {
    pub fn new(client: LangSearchClient) -> Self {
        Self {
            client,
            default_count: 2,
        }
    }

    pub fn with_default_count(mut self, count: u32) -> Self {
        self.default_count = count;
        self
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    count: Option<u32>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Perform web search using LangSearch Web Search API. Returns the title, URL and content of each matching web page."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new()
                .add_property("query", PropertySchema::string("Search keywords"), true)
                .add_property(
                    "count",
                    PropertySchema::integer("Number of search results to return")
                        .with_default(serde_json::json!(self.default_count)),
                    false,
                ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, Error> {
        let args: WebSearchArgs = serde_json::from_value(arguments)
            .map_err(|e| Error::tool(SEARCH_TOOL_NAME, format!("Invalid arguments: {}", e)))?;

        let count = args.count.unwrap_or(self.default_count).max(1);
        match self.client.search(&args.query, count).await {
            Ok(results) => Ok(ToolOutput::success(results.to_citation_text())),
            Err(e) => {
                warn!(query = %args.query, error = %e, "Web search failed");
                Ok(ToolOutput::error(e.to_string()))
            }
        }
    }
}

/// Create the search tool set, ready for a `ToolRegistry`.
pub fn create_web_tools(client: LangSearchClient, default_count: u32) -> Vec<Arc<dyn Tool>> {
    let search: Arc<dyn Tool> =
        Arc::new(WebSearchTool::new(client).with_default_count(default_count));
    vec![search]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::langsearch::LangSearchConfig;
    use sq_core::{PipelineConfig, ToolRegistry};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_for(server: &MockServer) -> WebSearchTool {
        WebSearchTool::new(LangSearchClient::new(LangSearchConfig {
            api_key: Some("ls-test".to_string()),
            base_url: server.uri(),
            ..LangSearchConfig::default()
        }))
        .with_default_count(1)
    }

    #[test]
    fn test_definition() {
        let tool = WebSearchTool::new(LangSearchClient::new(LangSearchConfig::default()));
        let def = tool.definition();
        assert_eq!(def.name, "langsearch_websearch_tool");
        assert_eq!(def.parameters.required, vec!["query".to_string()]);
        assert_eq!(def.parameters.properties["count"].default, Some(json!(2)));
    }

    #[test]
    fn test_registered_under_pipeline_search_tool() {
        let mut registry = ToolRegistry::new();
        for tool in create_web_tools(LangSearchClient::new(LangSearchConfig::default()), 1) {
            registry.register(tool);
        }
        let config = PipelineConfig::default();
        assert!(registry.get(&config.search_tool).is_some());
    }

    #[tokio::test]
    async fn test_success_renders_citations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"count": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"webPages": {"value": [{
                    "name": "Intro to Apple Business Manager",
                    "url": "https://support.apple.com/guide/apple-business-manager/welcome",
                    "summary": "A web-based portal."
                }]}}
            })))
            .mount(&server)
            .await;

        let output = tool_for(&server)
            .execute(json!({"query": "Apple Business Manager site:support.apple.com"}))
            .await
            .unwrap();

        assert!(!output.is_error);
        assert!(output.content.starts_with("Citation: 1\nTitle: Intro to Apple Business Manager"));
    }

    #[tokio::test]
    async fn test_status_failure_is_error_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let output = tool_for(&server)
            .execute(json!({"query": "abm", "count": 3}))
            .await
            .unwrap();

        assert!(output.is_error);
        assert_eq!(
            output.content,
            "Search API request failed, status code: 503, error message: upstream unavailable"
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let server = MockServer::start().await;
        let err = tool_for(&server).execute(json!({"count": 1})).await.unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }
}
