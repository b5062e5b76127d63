//! The three pipeline nodes. Each reads the state and returns the messages
//! it wants appended.

use serde_json::json;
use tracing::{debug, info, warn};

use super::{prompts, Pipeline, StageOptions, Topology};
use crate::error::Error;
use crate::message::{Message, Role, ToolCall};
use crate::pipeline::PipelineState;
use crate::provider::{CompletionRequest, CompletionResponse, Provider};
use crate::tool::{ToolDefinition, ToolRegistry};

/// Generate the search query from the conversation so far.
pub(super) async fn query_generation(
    pipeline: &Pipeline,
    state: &PipelineState,
) -> Result<Vec<Message>, Error> {
    let config = &pipeline.config;

    let mut messages = Vec::with_capacity(state.len() + 1);
    messages.push(Message::system(prompts::query_generation(&config.site)));
    messages.extend(state.messages().iter().cloned());

    let response = pipeline
        .call_model(pipeline.query_model.as_ref(), &config.query, messages, Vec::new())
        .await?;

    let query = response.message.content.trim();
    if query.is_empty() {
        return Err(Error::invalid_response(
            "query model returned an empty search query",
        ));
    }

    let query = if config.enforce_site {
        ensure_site(query, &config.site)
    } else {
        query.to_string()
    };

    info!(query = %query, "Generated search query");
    Ok(vec![Message::assistant(query)])
}

/// Run the search tool (linear) or every requested tool call (tool loop).
pub(super) async fn tools(
    pipeline: &Pipeline,
    state: &PipelineState,
    next_id: &mut usize,
) -> Result<Vec<Message>, Error> {
    let config = &pipeline.config;
    let last = state
        .last()
        .ok_or_else(|| Error::invalid_request("pipeline state is empty"))?;

    let calls = match config.topology {
        Topology::Linear => vec![ToolCall::new(
            correlation_id(next_id),
            &config.search_tool,
            json!({ "query": last.content, "count": config.search_count }),
        )],
        Topology::ToolLoop => last
            .tool_calls
            .iter()
            .cloned()
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = correlation_id(next_id);
                }
                call
            })
            .collect(),
    };

    let mut results = Vec::with_capacity(calls.len());
    for call in &calls {
        results.push(execute_tool_call(&pipeline.tools, call).await);
    }
    Ok(results)
}

/// Produce the final answer, or in the tool loop, ask for a tool call.
pub(super) async fn agent(
    pipeline: &Pipeline,
    state: &PipelineState,
) -> Result<Vec<Message>, Error> {
    let config = &pipeline.config;
    let last = state
        .last()
        .ok_or_else(|| Error::invalid_request("pipeline state is empty"))?;

    if last.role == Role::Tool && last.is_error {
        warn!(detail = %last.content, "Search failed, answering with apology");
        return Ok(vec![Message::assistant(prompts::search_failure_reply(
            &last.content,
        ))]);
    }

    let (messages, tools) = match config.topology {
        Topology::Linear => (synthesis_messages(pipeline, state, &last.content), Vec::new()),
        Topology::ToolLoop if last.role == Role::Tool => (
            synthesis_messages(pipeline, state, &last.content),
            pipeline.tools.definitions(),
        ),
        Topology::ToolLoop => (
            vec![
                Message::system(prompts::TOOL_AGENT_SYSTEM_PROMPT),
                Message::user(prompts::tool_use_instruction(&last.content)),
            ],
            pipeline.tools.definitions(),
        ),
    };

    let response = pipeline
        .call_model(pipeline.answer_model.as_ref(), &config.answer, messages, tools)
        .await?;

    let message = match config.topology {
        Topology::Linear => Message::assistant(response.message.content),
        Topology::ToolLoop => response.message,
    };

    if message.has_tool_calls() {
        debug!(count = message.tool_calls.len(), "Agent requested tool calls");
    } else {
        info!(chars = message.content.chars().count(), "Answer synthesized");
    }
    Ok(vec![message])
}

fn synthesis_messages(pipeline: &Pipeline, state: &PipelineState, search_text: &str) -> Vec<Message> {
    let body = match state.question() {
        Some(question) if pipeline.config.include_question => {
            prompts::with_question(&question.content, search_text)
        }
        _ => search_text.to_string(),
    };
    vec![
        Message::system(prompts::ANSWER_SYSTEM_PROMPT),
        Message::user(body),
    ]
}

/// Dispatch one tool call through the registry. Failures become error tool
/// results so the pipeline keeps going.
pub(super) async fn execute_tool_call(registry: &ToolRegistry, call: &ToolCall) -> Message {
    let Some(tool) = registry.get(&call.name) else {
        warn!(tool = %call.name, "Unknown tool requested");
        return Message::tool_error(&call.id, format!("Error: Unknown tool '{}'", call.name))
            .with_name(&call.name);
    };

    debug!(tool = %call.name, id = %call.id, arguments = %call.arguments, "Executing tool");

    let message = match tool.execute(call.arguments.clone()).await {
        Ok(output) if output.is_error => {
            warn!(tool = %call.name, error = %output.content, "Tool reported an error");
            Message::tool_error(&call.id, output.content)
        }
        Ok(output) => Message::tool_result(&call.id, output.content),
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
            Message::tool_error(&call.id, format!("Error executing tool: {e}"))
        }
    };
    message.with_name(&call.name)
}

fn correlation_id(next_id: &mut usize) -> String {
    *next_id += 1;
    format!("tool-{next_id}")
}

/// Append the `site:` token unless the query already restricts to the site.
pub(super) fn ensure_site(query: &str, site: &str) -> String {
    let token = prompts::site_token(site);
    let present = query
        .split_whitespace()
        .any(|word| word.trim_matches(|c: char| !c.is_alphanumeric()) == token);
    if present {
        query.to_string()
    } else {
        format!("{query} {token}")
    }
}

impl Pipeline {
    /// One model call with the stage's options and the per-call timeout.
    async fn call_model(
        &self,
        provider: &dyn Provider,
        stage: &StageOptions,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<CompletionResponse, Error> {
        let mut request = CompletionRequest::new(messages)
            .with_tools(tools)
            .with_extra(stage.extra.clone());
        if let Some(temperature) = stage.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = stage.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        debug!(
            provider = provider.name(),
            model = provider.default_model().unwrap_or("default"),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Model request"
        );

        match self.config.model_timeout {
            Some(limit) => tokio::time::timeout(limit, provider.complete(request))
                .await
                .map_err(|_| Error::timeout(format!("model call exceeded {limit:?}")))?,
            None => provider.complete(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_site_appends_token() {
        assert_eq!(
            ensure_site("iPhone Bluetooth", "support.apple.com"),
            "iPhone Bluetooth site:support.apple.com"
        );
    }

    #[test]
    fn test_ensure_site_keeps_existing_token() {
        assert_eq!(
            ensure_site("Apple Business Manager site:support.apple.com", "support.apple.com"),
            "Apple Business Manager site:support.apple.com"
        );
    }

    #[test]
    fn test_ensure_site_ignores_surrounding_punctuation() {
        for query in [
            "iPhone Bluetooth site:support.apple.com.",
            "iPhone Bluetooth (site:support.apple.com)",
            "iPhone Bluetooth \"site:support.apple.com\"",
        ] {
            assert_eq!(ensure_site(query, "support.apple.com"), query);
        }
    }

    #[test]
    fn test_correlation_ids_increment() {
        let mut next = 0;
        assert_eq!(correlation_id(&mut next), "tool-1");
        assert_eq!(correlation_id(&mut next), "tool-2");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("tool-1", "missing", json!({}));

        let message = execute_tool_call(&registry, &call).await;

        assert_eq!(message.role, Role::Tool);
        assert!(message.is_error);
        assert_eq!(message.content, "Error: Unknown tool 'missing'");
        assert_eq!(message.tool_call_id.as_deref(), Some("tool-1"));
    }
}
