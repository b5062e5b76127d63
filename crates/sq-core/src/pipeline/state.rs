use serde::Serialize;

use crate::message::{Message, Role};

/// The message log threaded through one pipeline invocation.
///
/// The log only grows: `push` is the sole mutation, so a node can never
/// rewrite what an earlier node produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineState {
    messages: Vec<Message>,
}

impl PipelineState {
    pub fn new(initial: Vec<Message>) -> Self {
        Self { messages: initial }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The first user message, i.e. the question that started the run.
    pub fn question(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::User)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
