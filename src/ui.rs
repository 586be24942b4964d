use crate::commands::{QuickAction, COMMANDS};
use crate::render::{Block, Renderer};
use crate::session::{Message, Role, Session, SessionId, SessionMetadata};
use colored::Colorize;
use std::io::{self, Write};

/// Message severity levels for consistent UI feedback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageSeverity {
    /// Rejected input, recoverable problems
    Warning,
    /// Actual failures (network, IO, parsing errors)
    Error,
    Info,
}

impl MessageSeverity {
    pub fn prefix(&self) -> colored::ColoredString {
        match self {
            Self::Warning => "Warning:".bright_yellow().bold(),
            Self::Error => "Error:".bright_red().bold(),
            Self::Info => "Info:".bright_cyan().bold(),
        }
    }
}

/// Terminal output for the study REPL
pub struct UI;

impl UI {
    pub fn print_message(severity: MessageSeverity, message: &str) {
        eprintln!("{} {}", severity.prefix(), message);
    }

    pub fn print_warning(message: &str) {
        Self::print_message(MessageSeverity::Warning, message);
    }

    pub fn print_error(message: &str) {
        Self::print_message(MessageSeverity::Error, message);
    }

    pub fn print_info(message: &str) {
        Self::print_message(MessageSeverity::Info, message);
    }

    pub fn print_welcome(provider: &str, target: &str) {
        println!("{}", "Lexis - Assistant de révision juridique".bright_cyan().bold());
        println!("{} {} ({})", "Backend:".bright_green(), provider, target.dimmed());
        println!("{}", "Type your question, or /help for commands.".dimmed());
        println!();
    }

    pub fn print_goodbye() {
        println!("{}", "À bientôt !".bright_cyan());
    }

    pub fn print_prompt(session: Option<(SessionId, &str)>) {
        match session {
            Some((id, title)) => print!("{} {} ", format!("[{}] {}", id, title).dimmed(), "λ>".bright_green().bold()),
            None => print!("{} ", "λ>".bright_green().bold()),
        }
        let _ = io::stdout().flush();
    }

    pub fn print_echo(text: &str) {
        println!("{} {}", "λ>".bright_green().bold(), text);
        println!();
    }

    pub fn print_waiting(session_id: SessionId) {
        println!(
            "{}",
            format!("Awaiting reply for session {}...", session_id).dimmed()
        );
    }

    pub fn print_help() {
        println!("{}", "Commands:".bright_cyan().bold());
        for (usage, description) in COMMANDS {
            println!("  {:<26} {}", usage.bright_white(), description.dimmed());
        }
        println!();
        println!("{}", "Quick actions:".bright_cyan().bold());
        for action in QuickAction::ALL {
            println!("  {:<26} {}", action.name().bright_white(), action.label().dimmed());
        }
        println!();
    }

    pub fn print_sessions(sessions: &[SessionMetadata], active: Option<SessionId>, busy: impl Fn(SessionId) -> bool) {
        if sessions.is_empty() {
            println!("{}", "No sessions yet.".yellow());
            return;
        }

        for meta in sessions {
            let marker = if Some(meta.id) == active { "*" } else { " " };
            let status = if busy(meta.id) { " (en attente)" } else { "" };
            println!(
                "{} {:>3}  {}{}  {}",
                marker.bright_green().bold(),
                meta.id.to_string().bright_white(),
                meta.title.bold(),
                status.yellow(),
                format!(
                    "{} · {} messages",
                    meta.updated_at.format("%Y-%m-%d %H:%M"),
                    meta.message_count
                )
                .dimmed()
            );
            println!("        {}", meta.preview.dimmed());
        }
        println!();
    }

    pub fn display_session(session: &Session, renderer: &impl Renderer) {
        println!("{}", "═".repeat(80).bright_cyan());
        println!(
            "{} {}",
            format!("Session {}:", session.id).bright_cyan().bold(),
            session.title
        );
        println!("{}", "═".repeat(80).bright_cyan());
        println!();

        if session.messages.is_empty() {
            println!("{}", "Session vide".dimmed());
            println!();
        }

        for message in &session.messages {
            Self::print_chat_message(message, renderer);
        }
    }

    pub fn print_chat_message(message: &Message, renderer: &impl Renderer) {
        match message.role {
            Role::User => {
                println!("{} {}", "Vous:".bright_green().bold(), message.text);
            }
            Role::Model if message.is_error => {
                println!("{}", message.text.bright_red());
            }
            Role::Model => {
                println!("{}", "Lexis:".bright_blue().bold());
                Self::print_blocks(&renderer.render(&message.text).blocks);
            }
        }
        println!();
    }

    fn print_blocks(blocks: &[Block]) {
        let mut option_number = 0;

        for block in blocks {
            match block {
                Block::Markdown(text) => Self::print_markdown(text),
                Block::Diagram { source } => {
                    println!("{}", "┌───── diagram".dimmed());
                    for line in source.lines() {
                        println!("{}  {}", "│".dimmed(), line.bright_magenta());
                    }
                    println!("{}", "└─────".dimmed());
                }
                Block::Table { header, rows } => Self::print_table(header, rows),
                Block::Quiz { options } => {
                    for option in options {
                        option_number += 1;
                        println!(
                            "  {} {}",
                            format!("[{}]", option_number).bright_yellow().bold(),
                            option.submission_text()
                        );
                    }
                    println!("{}", "  (/choose <n> to answer)".dimmed());
                }
            }
        }
    }

    fn print_markdown(text: &str) {
        for line in text.lines() {
            if line.trim_start().starts_with('#') {
                println!("{}", line.trim_start_matches('#').trim().bright_cyan().bold());
            } else {
                println!("{}", line);
            }
        }
    }

    fn print_table(header: &[String], rows: &[Vec<String>]) {
        let columns = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);

        let mut widths = vec![0usize; columns];
        for row in std::iter::once(header).chain(rows.iter().map(Vec::as_slice)) {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let format_row = |row: &[String]| -> String {
            widths
                .iter()
                .enumerate()
                .map(|(i, width)| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    let pad = width.saturating_sub(cell.chars().count());
                    format!(" {}{} ", cell, " ".repeat(pad))
                })
                .collect::<Vec<_>>()
                .join("│")
        };

        println!("{}", format_row(header).bold());
        println!(
            "{}",
            widths
                .iter()
                .map(|w| "─".repeat(w + 2))
                .collect::<Vec<_>>()
                .join("┼")
                .dimmed()
        );
        for row in rows {
            println!("{}", format_row(row));
        }
    }
}
