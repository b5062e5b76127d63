//! Readline-based interface for interactive sessions.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::{Config, Editor};

use super::{parse_user_input, TerminalOutput, TurnInterface, TurnOutput, UserInput};

pub struct ReadlineInterface {
    editor: Option<Editor<(), FileHistory>>,
    history_path: Option<PathBuf>,
    output: TerminalOutput,
}

impl ReadlineInterface {
    pub fn new(output: TerminalOutput) -> Self {
        Self {
            editor: None,
            history_path: get_history_path(),
            output,
        }
    }

    pub fn initialize(&mut self) -> Result<()> {
        let config = Config::builder()
            .history_ignore_space(true)
            .history_ignore_dups(true)?
            .build();

        let mut editor: Editor<(), FileHistory> = Editor::with_config(config)?;

        // Load history if available
        if let Some(ref path) = self.history_path {
            let _ = editor.load_history(path);
        }

        self.editor = Some(editor);
        Ok(())
    }

    pub fn cleanup(&mut self) -> Result<()> {
        if let (Some(editor), Some(path)) = (self.editor.as_mut(), self.history_path.as_ref()) {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = editor.save_history(path);
        }
        Ok(())
    }

    /// Get the next user input. Returns None on Ctrl-D.
    pub fn next_input(&mut self) -> Result<Option<UserInput>> {
        let _ = print_prompt_hint();

        let editor = self
            .editor
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Interface not initialized"))?;

        match editor.readline("👤 您> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(&line);
                Ok(Some(parse_user_input(&line)))
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                Ok(Some(UserInput::Cancel))
            }
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("Error reading input: {}", e)),
        }
    }
}

#[async_trait]
impl TurnInterface for ReadlineInterface {
    async fn emit(&mut self, output: TurnOutput) -> Result<()> {
        self.output.emit(output).await
    }
}

fn print_prompt_hint() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    println!("/help · /quit or Ctrl+D");
    stdout.execute(ResetColor)?;
    stdout.flush()
}

/// Get the path to the history file.
fn get_history_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sq").join("chat_history"))
}
