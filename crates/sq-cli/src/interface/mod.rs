//! Interface abstraction for interactive sessions.
//!
//! The turn runner only talks to a [`TurnInterface`]; the readline session
//! and one-shot mode both render through [`TerminalOutput`].

mod output;
mod readline;

pub use output::TerminalOutput;
pub use readline::ReadlineInterface;

use anyhow::Result;
use async_trait::async_trait;

/// Output events produced while a turn runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutput {
    /// Transient progress line, not kept in history.
    Status(String),
    /// An intermediate step, kept in the turn's step log.
    Step(String),
    /// The final answer.
    Answer(String),
    /// The turn failed; the line is shown in place of an answer.
    Error(String),
}

/// Commands that the interface can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceCommand {
    Quit,
    ClearHistory,
    History,
    Help,
}

/// Input from the user via the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// A question to run through the pipeline.
    Message(String),
    Command(InterfaceCommand),
    /// Ctrl-C at the prompt.
    Cancel,
    /// Blank line.
    Empty,
    /// Unrecognized slash command.
    Unknown(String),
}

#[async_trait]
pub trait TurnInterface: Send {
    async fn emit(&mut self, output: TurnOutput) -> Result<()>;
}

/// Parse one line of user input.
///
/// Bare `exit`, `quit` and `q` end the session like `/quit` does.
pub fn parse_user_input(input: &str) -> UserInput {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return UserInput::Empty;
    }

    if matches!(trimmed.to_lowercase().as_str(), "exit" | "quit" | "q") {
        return UserInput::Command(InterfaceCommand::Quit);
    }

    if !trimmed.starts_with('/') {
        return UserInput::Message(trimmed.to_string());
    }

    let cmd = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_lowercase();

    match cmd.as_str() {
        "/quit" | "/exit" | "/q" => UserInput::Command(InterfaceCommand::Quit),
        "/clear" | "/c" => UserInput::Command(InterfaceCommand::ClearHistory),
        "/history" | "/h" => UserInput::Command(InterfaceCommand::History),
        "/help" | "/?" => UserInput::Command(InterfaceCommand::Help),
        _ => UserInput::Unknown(cmd),
    }
}

pub const HELP_TEXT: &str = r#"
Commands:
  /help, /?        Show this help message
  /quit, /exit     Exit (also: exit, quit, q, Ctrl+D)
  /clear, /c       Clear conversation history
  /history, /h     Show the conversation with each answer's steps

Example questions:
  苹果手机怎么连接蓝牙耳机？
  iPhone如何连接Apple Watch？
  什么是Apple Business Manager？
  iPad怎么分屏操作？
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message() {
        assert_eq!(
            parse_user_input("  苹果手机怎么连接蓝牙耳机？ \n"),
            UserInput::Message("苹果手机怎么连接蓝牙耳机？".to_string())
        );
        assert_eq!(parse_user_input("   "), UserInput::Empty);
    }

    #[test]
    fn test_parse_exit_words() {
        for word in ["exit", "quit", "q", "QUIT", "/quit", "/exit"] {
            assert_eq!(
                parse_user_input(word),
                UserInput::Command(InterfaceCommand::Quit),
                "{word}"
            );
        }
        // A question that merely starts with an exit word is still a question.
        assert!(matches!(parse_user_input("quit Safari crashes"), UserInput::Message(_)));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_user_input("/clear"),
            UserInput::Command(InterfaceCommand::ClearHistory)
        );
        assert_eq!(
            parse_user_input("/HISTORY"),
            UserInput::Command(InterfaceCommand::History)
        );
        assert_eq!(
            parse_user_input("/help"),
            UserInput::Command(InterfaceCommand::Help)
        );
        assert_eq!(
            parse_user_input("/model qwen"),
            UserInput::Unknown("/model".to_string())
        );
    }
}
