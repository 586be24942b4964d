mod api;
mod cli;
mod commands;
mod config;
mod dispatch;
mod error;
mod error_ext;
mod render;
mod repl;
mod request_builder;
mod session;
mod ui;

use api::LlmClient;
use clap::Parser;
use cli::Cli;
use colored::Colorize;
use config::LexisConfig;
use dispatch::{DispatchSettings, Dispatcher};
use error::Result;
use repl::Repl;
use session::HistoryManager;
use std::env;
use std::sync::{Arc, Mutex};
use ui::UI;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let workspace = env::current_dir().map_err(|e| {
        error::LexisError::Config(format!("Failed to get current directory: {}", e))
    })?;

    let config = LexisConfig::default().apply_file(config::load_file_config(&workspace)?);
    let config = cli.apply(config)?;
    tracing::debug!(transport = ?config.transport, endpoint = %config.endpoint, model = %config.model, "Resolved configuration");

    let api_key = cli.get_api_key();

    let course_content = config.course_content()?;
    if let Some(path) = &config.course_path {
        println!(
            "{} {}",
            "Course:".bright_green(),
            path.display().to_string().dimmed()
        );
    }

    let client = LlmClient::from_config(&config, api_key)?;
    if !client.has_credentials() {
        UI::print_warning("No API key set (API_KEY); every message will fail until one is provided.");
    }

    let history_manager = HistoryManager::new(workspace.clone())?;
    let store = history_manager.load_store()?;
    tracing::debug!(sessions = store.len(), "Loaded sessions");

    let dispatcher = Dispatcher::new(
        Arc::new(Mutex::new(store)),
        Arc::new(client.clone()),
        DispatchSettings {
            system_instruction: config.system_instruction.clone(),
            course_content,
            scope: config.dispatch_scope,
        },
    );

    let mut repl = Repl::new(dispatcher, history_manager);

    if let Some(prompt) = cli.prompt {
        if let Some(path) = &cli.attach {
            repl.attach(path)?;
        }
        repl.process_single_prompt(&prompt).await?;
    } else {
        UI::print_welcome(client.provider_name(), &client.target());
        repl.run().await?;
    }

    Ok(())
}

