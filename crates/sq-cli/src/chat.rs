//! Interactive chat mode with readline support.

use anyhow::Result;

use sq_core::{Pipeline, Role};

use crate::interface::{InterfaceCommand, ReadlineInterface, UserInput, HELP_TEXT};
use crate::session::SessionHistory;
use crate::turn::run_turn;

/// Run the interactive session until the user quits.
pub async fn run_chat(pipeline: &Pipeline, mut interface: ReadlineInterface) -> Result<()> {
    interface.initialize()?;
    let mut history = SessionHistory::new();

    println!("🍎 Apple 产品技术支持助手");
    println!("专业的Apple产品技术支持，基于官方文档提供准确回答\n");

    loop {
        let Some(input) = interface.next_input()? else {
            println!("Goodbye!");
            break;
        };

        match input {
            UserInput::Command(InterfaceCommand::Quit) => {
                println!("Goodbye!");
                break;
            }
            UserInput::Command(InterfaceCommand::ClearHistory) => {
                history.clear();
                println!("Conversation cleared.\n");
            }
            UserInput::Command(InterfaceCommand::History) => print_history(&history),
            UserInput::Command(InterfaceCommand::Help) => println!("{}", HELP_TEXT),
            UserInput::Unknown(cmd) => {
                eprintln!("Unknown command: {}. Type /help for available commands.", cmd);
            }
            UserInput::Cancel | UserInput::Empty => continue,
            UserInput::Message(question) => {
                run_turn(pipeline, &mut history, &question, &mut interface).await?;
            }
        }
    }

    interface.cleanup()
}

fn print_history(history: &SessionHistory) {
    if history.is_empty() {
        println!("No conversation yet.\n");
        return;
    }

    for turn in history.turns() {
        match turn.role {
            Role::User => println!("👤 您: {}", turn.content),
            _ => {
                println!("🤖 助手: {}", turn.content);
                for step in &turn.steps {
                    println!("    {}", step);
                }
            }
        }
    }
    println!();
}
