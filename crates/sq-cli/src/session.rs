//! Per-session conversation log shown by `/history`.

use serde::Serialize;

use sq_core::Role;

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Intermediate step descriptions, recorded on assistant turns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
}

/// Ordered user/assistant turns for one interactive session.
///
/// The pipeline never sees this log; each question starts a fresh run.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    turns: Vec<Turn>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: &str) {
        self.turns.push(Turn {
            role: Role::User,
            content: content.to_string(),
            steps: Vec::new(),
        });
    }

    pub fn push_assistant(&mut self, content: &str, steps: Vec<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.to_string(),
            steps,
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
