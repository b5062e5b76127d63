//! One question in, one recorded answer out.

use anyhow::Result;
use futures::StreamExt;
use tracing::error;

use sq_core::{Error, Message, NodeName, Pipeline, StepUpdate};

use crate::interface::{TurnInterface, TurnOutput};
use crate::session::SessionHistory;

const PROCESSING: &str = "🔄 正在处理您的请求...";
const WRITING: &str = "✍️ 正在生成回答...";
const DONE: &str = "✅ 回答生成完成";
const SEARCHING: &str = "🌐 正在搜索Apple官方文档...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The answer, or the error line shown in its place.
    pub answer: String,
    pub steps: Vec<String>,
    pub failed: bool,
}

/// Human-readable step for an update, or None for the final answer.
pub fn describe_step(update: &StepUpdate) -> Option<String> {
    let last = update.last_message()?;
    match update.node {
        NodeName::QueryGeneration => Some(format!("🔍 生成搜索查询: {}", last.content)),
        NodeName::Tools => Some(SEARCHING.to_string()),
        NodeName::Agent if last.has_tool_calls() => {
            let names: Vec<&str> = last.tool_calls.iter().map(|c| c.name.as_str()).collect();
            Some(format!("🔧 请求调用工具: {}", names.join(", ")))
        }
        NodeName::Agent => None,
    }
}

pub fn error_line(error: &Error) -> String {
    format!("❌ 处理请求时发生错误: {}", error)
}

/// Run one question through the pipeline, render it, and record it.
///
/// Pipeline failures are rendered and recorded as the assistant's turn; only
/// rendering failures are returned as errors.
pub async fn run_turn(
    pipeline: &Pipeline,
    history: &mut SessionHistory,
    question: &str,
    ui: &mut dyn TurnInterface,
) -> Result<TurnOutcome> {
    history.push_user(question);
    ui.emit(TurnOutput::Status(PROCESSING.to_string())).await?;

    let mut steps = Vec::new();
    let mut answer = None;
    let mut failure = None;

    let mut stream = std::pin::pin!(pipeline.stream(vec![Message::user(question)]));
    while let Some(update) = stream.next().await {
        let update = match update {
            Ok(update) => update,
            Err(e) => {
                failure = Some(e);
                break;
            }
        };

        match describe_step(&update) {
            Some(step) => {
                ui.emit(TurnOutput::Step(step.clone())).await?;
                steps.push(step);
            }
            None => answer = update.last_message().map(|m| m.content.clone()),
        }
    }

    let result = match (failure, answer) {
        (Some(e), _) => Err(e),
        (None, Some(answer)) => Ok(answer),
        (None, None) => Err(Error::invalid_response(
            "pipeline finished without an answer",
        )),
    };

    let outcome = match result {
        Ok(answer) => {
            ui.emit(TurnOutput::Status(WRITING.to_string())).await?;
            ui.emit(TurnOutput::Answer(answer.clone())).await?;
            ui.emit(TurnOutput::Status(DONE.to_string())).await?;
            TurnOutcome {
                answer,
                steps,
                failed: false,
            }
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "Turn failed");
            let line = error_line(&e);
            ui.emit(TurnOutput::Error(line.clone())).await?;
            TurnOutcome {
                answer: line,
                steps,
                failed: true,
            }
        }
    };

    history.push_assistant(&outcome.answer, outcome.steps.clone());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use sq_core::testing::MockProvider;
    use sq_core::{PipelineConfig, Role, Tool, ToolDefinition, ToolOutput, ToolRegistry};
    use std::sync::Arc;

    const QUESTION: &str = "什么是Apple Business Manager？";
    const QUERY: &str = "Apple Business Manager site:support.apple.com";
    const ANSWER: &str = "Apple Business Manager 是一个基于网页的门户，帮助企业部署设备。\n\n参考链接：https://support.apple.com/guide/apple-business-manager";

    #[derive(Default)]
    struct Recorder {
        outputs: Vec<TurnOutput>,
    }

    #[async_trait]
    impl TurnInterface for Recorder {
        async fn emit(&mut self, output: TurnOutput) -> Result<()> {
            self.outputs.push(output);
            Ok(())
        }
    }

    struct OneEntrySearch;

    #[async_trait]
    impl Tool for OneEntrySearch {
        fn name(&self) -> &str {
            "langsearch_websearch_tool"
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name(), self.description())
        }

        async fn execute(&self, _arguments: Value) -> Result<ToolOutput, Error> {
            Ok(ToolOutput::success(
                "Citation: 1\nTitle: Intro to Apple Business Manager\nURL: https://support.apple.com/guide/apple-business-manager\nContent: Apple Business Manager is a web-based portal.",
            ))
        }
    }

    fn pipeline(query: Arc<MockProvider>, answer: Arc<MockProvider>) -> Pipeline {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(OneEntrySearch));
        Pipeline::new(query, answer, Arc::new(registry), PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_turn_end_to_end() {
        let query = Arc::new(MockProvider::new());
        query.queue_response(QUERY);
        let answer = Arc::new(MockProvider::new());
        answer.queue_response(ANSWER);

        let pipeline = pipeline(query, answer);
        let mut history = SessionHistory::new();
        let mut ui = Recorder::default();

        let outcome = run_turn(&pipeline, &mut history, QUESTION, &mut ui)
            .await
            .unwrap();

        assert!(!outcome.failed);
        assert_eq!(outcome.answer, ANSWER);
        assert_eq!(
            outcome.steps,
            vec![
                format!("🔍 生成搜索查询: {QUERY}"),
                "🌐 正在搜索Apple官方文档...".to_string(),
            ]
        );

        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].content, QUESTION);
        let recorded = history.last().unwrap();
        assert_eq!(recorded.role, Role::Assistant);
        assert_eq!(recorded.content, ANSWER);
        assert_eq!(recorded.steps.len(), 2);

        assert!(ui.outputs.contains(&TurnOutput::Answer(ANSWER.to_string())));
    }

    #[tokio::test]
    async fn test_failed_turn_is_recorded_and_session_continues() {
        let query = Arc::new(MockProvider::new());
        query.queue_error(Error::network("connection refused"));
        query.queue_response(QUERY);
        let answer = Arc::new(MockProvider::new());
        answer.queue_response(ANSWER);

        let pipeline = pipeline(query, answer);
        let mut history = SessionHistory::new();
        let mut ui = Recorder::default();

        let outcome = run_turn(&pipeline, &mut history, QUESTION, &mut ui)
            .await
            .unwrap();
        assert!(outcome.failed);
        assert!(outcome.answer.starts_with("❌ 处理请求时发生错误: "));
        assert!(outcome.answer.contains("connection refused"));
        assert!(outcome.steps.is_empty());
        assert_eq!(history.last().unwrap().content, outcome.answer);
        assert!(matches!(ui.outputs.last(), Some(TurnOutput::Error(_))));

        // The next question in the same session goes through normally.
        let outcome = run_turn(&pipeline, &mut history, QUESTION, &mut ui)
            .await
            .unwrap();
        assert!(!outcome.failed);
        assert_eq!(outcome.answer, ANSWER);
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn test_describe_tool_request() {
        let update = StepUpdate {
            node: NodeName::Agent,
            messages: vec![Message::assistant_with_tool_calls(
                "",
                vec![sq_core::ToolCall::new(
                    "call_0",
                    "langsearch_websearch_tool",
                    serde_json::json!({}),
                )],
            )],
        };
        assert_eq!(
            describe_step(&update).as_deref(),
            Some("🔧 请求调用工具: langsearch_websearch_tool")
        );

        let final_answer = StepUpdate {
            node: NodeName::Agent,
            messages: vec![Message::assistant("答案")],
        };
        assert!(describe_step(&final_answer).is_none());
    }
}
