//! The query → search → answer pipeline.
//!
//! A [`Pipeline`] is a small fixed graph of three nodes. Each node reads the
//! append-only [`PipelineState`] and returns the messages it adds; the graph
//! decides which node runs next. Runs are driven either to completion with
//! [`Pipeline::invoke`] or one node at a time with [`Pipeline::stream`].

mod nodes;
pub mod prompts;
mod state;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::Error;
use crate::message::Message;
use crate::provider::Provider;
use crate::tool::ToolRegistry;

pub use state::PipelineState;

/// Name of the search tool the linear topology calls.
pub const SEARCH_TOOL_NAME: &str = "langsearch_websearch_tool";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    QueryGeneration,
    Tools,
    Agent,
}

impl NodeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeName::QueryGeneration => "query_generation",
            NodeName::Tools => "tools",
            NodeName::Agent => "agent",
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the nodes are wired together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// query_generation → tools → agent → end
    #[default]
    Linear,
    /// query_generation → agent, then agent ⇄ tools while the agent asks for tools
    ToolLoop,
}

impl FromStr for Topology {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(Topology::Linear),
            "tool_loop" | "toolloop" => Ok(Topology::ToolLoop),
            other => Err(Error::config(format!(
                "unknown topology '{other}' (expected 'linear' or 'tool_loop')"
            ))),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Linear => f.write_str("linear"),
            Topology::ToolLoop => f.write_str("tool_loop"),
        }
    }
}

/// Per-stage request options applied to every call of one model.
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub topology: Topology,
    /// Maximum node executions per invocation.
    pub recursion_limit: usize,
    pub search_tool: String,
    pub search_count: u32,
    pub site: String,
    pub enforce_site: bool,
    pub include_question: bool,
    pub model_timeout: Option<Duration>,
    /// Wall-clock budget for a whole invocation, measured from the first step.
    pub deadline: Option<Duration>,
    pub query: StageOptions,
    pub answer: StageOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Linear,
            recursion_limit: 10,
            search_tool: SEARCH_TOOL_NAME.to_string(),
            search_count: 1,
            site: prompts::DEFAULT_SITE.to_string(),
            enforce_site: true,
            include_question: false,
            model_timeout: Some(Duration::from_secs(120)),
            deadline: Some(Duration::from_secs(300)),
            query: StageOptions::default(),
            answer: StageOptions::default(),
        }
    }
}

/// One completed node and the messages it appended.
#[derive(Debug, Clone, Serialize)]
pub struct StepUpdate {
    pub node: NodeName,
    pub messages: Vec<Message>,
}

impl StepUpdate {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

pub struct Pipeline {
    query_model: Arc<dyn Provider>,
    answer_model: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        query_model: Arc<dyn Provider>,
        answer_model: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            query_model,
            answer_model,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline to completion and return the final state.
    pub async fn invoke(&self, initial: Vec<Message>) -> Result<PipelineState, Error> {
        let mut run = Run::new(self, initial);
        while run.step().await?.is_some() {}
        Ok(run.state)
    }

    /// Run the pipeline lazily, yielding one update per completed node.
    ///
    /// Nothing executes until the stream is polled. The stream ends after
    /// the terminal node or after the first error.
    pub fn stream(
        &self,
        initial: Vec<Message>,
    ) -> impl Stream<Item = Result<StepUpdate, Error>> + Send + '_ {
        futures::stream::unfold(Some(Run::new(self, initial)), |run| async move {
            let mut run = run?;
            match run.step().await {
                Ok(Some(update)) => Some((Ok(update), Some(run))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn route(&self, from: NodeName, state: &PipelineState) -> Option<NodeName> {
        match (self.config.topology, from) {
            (Topology::Linear, NodeName::QueryGeneration) => Some(NodeName::Tools),
            (Topology::Linear, NodeName::Tools) => Some(NodeName::Agent),
            (Topology::Linear, NodeName::Agent) => None,
            (Topology::ToolLoop, NodeName::QueryGeneration) => Some(NodeName::Agent),
            (Topology::ToolLoop, NodeName::Tools) => Some(NodeName::Agent),
            (Topology::ToolLoop, NodeName::Agent) => state
                .last()
                .filter(|m| m.has_tool_calls())
                .map(|_| NodeName::Tools),
        }
    }
}

/// Bookkeeping for a single invocation.
struct Run<'a> {
    pipeline: &'a Pipeline,
    state: PipelineState,
    next: Option<NodeName>,
    steps: usize,
    tool_ids: usize,
    started: Option<Instant>,
}

impl<'a> Run<'a> {
    fn new(pipeline: &'a Pipeline, initial: Vec<Message>) -> Self {
        Self {
            pipeline,
            state: PipelineState::new(initial),
            next: Some(NodeName::QueryGeneration),
            steps: 0,
            tool_ids: 0,
            started: None,
        }
    }

    async fn step(&mut self) -> Result<Option<StepUpdate>, Error> {
        let Some(node) = self.next else {
            return Ok(None);
        };

        let limit = self.pipeline.config.recursion_limit;
        if self.steps >= limit {
            self.next = None;
            return Err(Error::RecursionLimit { limit });
        }
        self.steps += 1;

        let started = *self.started.get_or_insert_with(Instant::now);
        debug!(node = %node, step = self.steps, "Running node");

        // A budget too large to represent as an instant runs untimed.
        let deadline = self
            .pipeline
            .config
            .deadline
            .and_then(|budget| started.checked_add(budget).map(|at| (at, budget)));
        let execution = self.execute(node);
        let delta = match deadline {
            Some((at, budget)) => tokio::time::timeout_at(at, execution)
                .await
                .map_err(|_| {
                    Error::timeout(format!("pipeline exceeded its {budget:?} deadline"))
                })??,
            None => execution.await?,
        };

        for message in &delta {
            self.state.push(message.clone());
        }
        self.next = self.pipeline.route(node, &self.state);
        info!(node = %node, appended = delta.len(), "Node completed");

        Ok(Some(StepUpdate {
            node,
            messages: delta,
        }))
    }

    async fn execute(&mut self, node: NodeName) -> Result<Vec<Message>, Error> {
        let pipeline = self.pipeline;
        match node {
            NodeName::QueryGeneration => nodes::query_generation(pipeline, &self.state).await,
            NodeName::Tools => nodes::tools(pipeline, &self.state, &mut self.tool_ids).await,
            NodeName::Agent => nodes::agent(pipeline, &self.state).await,
        }
    }
}
