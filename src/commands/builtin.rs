use super::{CommandResult, QuickAction};
use crate::api::CompletionBackend;
use crate::error::Result;
use crate::repl::Repl;
use crate::session::SessionId;
use crate::ui::UI;
use std::path::Path;

/// The loop saves everything once pending turns have settled.
pub fn exit_command<C: CompletionBackend>(_repl: &mut Repl<C>) -> Result<CommandResult> {
    Ok(CommandResult::Exit)
}

pub fn help_command<C: CompletionBackend>(_repl: &mut Repl<C>) -> Result<CommandResult> {
    UI::print_help();
    Ok(CommandResult::Continue)
}

pub fn new_command<C: CompletionBackend>(repl: &mut Repl<C>) -> Result<CommandResult> {
    let id = repl.create_session();
    UI::print_info(&format!("Started session {}", id));
    Ok(CommandResult::Continue)
}

pub fn sessions_command<C: CompletionBackend>(repl: &mut Repl<C>) -> Result<CommandResult> {
    repl.list_sessions();
    Ok(CommandResult::Continue)
}

pub fn select_command<C: CompletionBackend>(
    repl: &mut Repl<C>,
    id: SessionId,
) -> Result<CommandResult> {
    if let Err(e) = repl.select_session(id) {
        UI::print_error(&e.to_string());
    }
    Ok(CommandResult::Continue)
}

pub fn rename_command<C: CompletionBackend>(
    repl: &mut Repl<C>,
    id: SessionId,
    title: &str,
) -> Result<CommandResult> {
    if repl.rename_session(id, title) {
        UI::print_info(&format!("Session {} renamed", id));
    } else {
        UI::print_warning(&format!("Session {} not renamed", id));
    }
    Ok(CommandResult::Continue)
}

pub fn delete_command<C: CompletionBackend>(
    repl: &mut Repl<C>,
    id: SessionId,
) -> Result<CommandResult> {
    if repl.delete_session(id) {
        UI::print_info(&format!("Session {} deleted", id));
    } else {
        UI::print_warning(&format!("Session {} not found", id));
    }
    Ok(CommandResult::Continue)
}

pub fn attach_command<C: CompletionBackend>(
    repl: &mut Repl<C>,
    path: &Path,
) -> Result<CommandResult> {
    match repl.attach(path) {
        Ok(name) => UI::print_info(&format!("{} will be sent with your next message", name)),
        Err(e) => UI::print_error(&e.to_string()),
    }
    Ok(CommandResult::Continue)
}

pub fn detach_command<C: CompletionBackend>(repl: &mut Repl<C>) -> Result<CommandResult> {
    match repl.detach() {
        Some(file) => UI::print_info(&format!("{} detached", file.name)),
        None => UI::print_warning("No file attached"),
    }
    Ok(CommandResult::Continue)
}

pub fn quick_command<C: CompletionBackend>(
    repl: &mut Repl<C>,
    action: QuickAction,
    topic: &str,
) -> Result<CommandResult> {
    let prompt = action.prompt_with(topic);
    UI::print_echo(&prompt);
    repl.submit(&prompt);
    Ok(CommandResult::Continue)
}

pub fn choose_command<C: CompletionBackend>(repl: &mut Repl<C>, n: usize) -> Result<CommandResult> {
    match repl.quiz_choice(n) {
        Ok(text) => {
            UI::print_echo(&text);
            repl.submit(&text);
        }
        Err(e) => UI::print_error(&e.to_string()),
    }
    Ok(CommandResult::Continue)
}
