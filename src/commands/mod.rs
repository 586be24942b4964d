use crate::api::CompletionBackend;
use crate::error::{LexisError, Result};
use crate::repl::Repl;
use crate::session::SessionId;
use std::path::PathBuf;

pub mod builtin;
pub mod quick;

pub use quick::QuickAction;

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Continue REPL loop
    Continue,
    /// Exit REPL loop
    Exit,
}

/// Enum representing all available REPL commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Help,
    New,
    Sessions,
    Select(SessionId),
    Rename(SessionId, String),
    Delete(SessionId),
    Attach(PathBuf),
    Detach,
    Quick(QuickAction, String),
    Choose(usize),
}

fn invalid(message: impl Into<String>) -> LexisError {
    LexisError::InvalidCommand(message.into())
}

fn parse_id(arg: Option<&str>, usage: &str) -> Result<SessionId> {
    arg.ok_or_else(|| invalid(format!("Usage: {}", usage)))?
        .parse()
        .map_err(|_| invalid(format!("Usage: {}", usage)))
}

impl Command {
    /// `None` when the line is not a command and should be sent as a turn.
    pub fn parse(line: &str) -> Option<Result<Self>> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let arg = (!rest.is_empty()).then_some(rest);

        let command = match name.to_lowercase().as_str() {
            "/exit" | "/quit" | "/q" => Ok(Command::Exit),
            "/help" | "/h" => Ok(Command::Help),
            "/new" => Ok(Command::New),
            "/sessions" | "/ls" => Ok(Command::Sessions),
            "/select" => parse_id(arg, "/select <id>").map(Command::Select),
            "/delete" => parse_id(arg, "/delete <id>").map(Command::Delete),
            "/rename" => {
                let usage = "/rename <id> <title>";
                match rest.split_once(char::is_whitespace) {
                    Some((id, title)) => parse_id(Some(id), usage)
                        .map(|id| Command::Rename(id, title.trim().to_string())),
                    None => Err(invalid(format!("Usage: {}", usage))),
                }
            }
            "/attach" => arg
                .map(|path| Command::Attach(PathBuf::from(path)))
                .ok_or_else(|| invalid("Usage: /attach <file.pdf>")),
            "/detach" => Ok(Command::Detach),
            "/quick" => {
                let (action, topic) = match rest.split_once(char::is_whitespace) {
                    Some((action, topic)) => (action, topic.trim()),
                    None => (rest, ""),
                };
                QuickAction::from_name(action)
                    .map(|action| Command::Quick(action, topic.to_string()))
                    .ok_or_else(|| {
                        let names: Vec<&str> = QuickAction::ALL.iter().map(|a| a.name()).collect();
                        invalid(format!("Usage: /quick <{}> [sujet]", names.join("|")))
                    })
            }
            "/choose" => arg
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map(Command::Choose)
                .ok_or_else(|| invalid("Usage: /choose <n>")),
            _ => Err(invalid(format!("Unknown command: {} (try /help)", name))),
        };

        Some(command)
    }

    pub fn execute<C: CompletionBackend>(&self, repl: &mut Repl<C>) -> Result<CommandResult> {
        match self {
            Command::Exit => builtin::exit_command(repl),
            Command::Help => builtin::help_command(repl),
            Command::New => builtin::new_command(repl),
            Command::Sessions => builtin::sessions_command(repl),
            Command::Select(id) => builtin::select_command(repl, *id),
            Command::Rename(id, title) => builtin::rename_command(repl, *id, title),
            Command::Delete(id) => builtin::delete_command(repl, *id),
            Command::Attach(path) => builtin::attach_command(repl, path),
            Command::Detach => builtin::detach_command(repl),
            Command::Quick(action, topic) => builtin::quick_command(repl, *action, topic),
            Command::Choose(n) => builtin::choose_command(repl, *n),
        }
    }
}

/// Command reference shown by `/help`.
pub static COMMANDS: &[(&str, &str)] = &[
    ("/new", "Start a new session"),
    ("/sessions", "List sessions"),
    ("/select <id>", "Switch to a session"),
    ("/rename <id> <title>", "Rename a session"),
    ("/delete <id>", "Delete a session"),
    ("/attach <file.pdf>", "Attach a PDF to the next message"),
    ("/detach", "Drop the pending attachment"),
    ("/quick <action> [topic]", "Send a study prompt"),
    ("/choose <n>", "Answer the last quiz with option n"),
    ("/help", "Show this help"),
    ("/exit", "Quit"),
];
