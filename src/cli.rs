use crate::config::{DispatchScope, LexisConfig, Transport};
use crate::error::Result;
use crate::error_ext::ResultExt;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lexis",
    about = "A terminal study assistant for law students",
    long_about = "Lexis answers questions about your course, drafts exercises and quizzes, and reads attached PDFs. Sessions are kept under .lexis/ in the current directory.",
    version
)]
pub struct Cli {
    /// Gemini API key (only used with --transport gemini)
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Initial prompt to send (if not provided, starts interactive REPL)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// PDF sent with the --prompt message
    #[arg(short, long, requires = "prompt")]
    pub attach: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// Chat proxy URL
    #[arg(long, env = "LEXIS_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    /// Course file sent as context with every message
    #[arg(short, long)]
    pub course: Option<PathBuf>,

    /// File replacing the built-in system instruction
    #[arg(long)]
    pub system_instruction: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub dispatch_scope: Option<DispatchScope>,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// `--api-key` / `API_KEY`, falling back to `VITE_API_KEY`.
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("VITE_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Command-line values override everything read from config files.
    pub fn apply(&self, mut config: LexisConfig) -> Result<LexisConfig> {
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(course) = &self.course {
            config.course_path = Some(course.clone());
        }
        if let Some(path) = &self.system_instruction {
            config.system_instruction = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read system instruction {:?}", path))?;
        }
        if let Some(scope) = self.dispatch_scope {
            config.dispatch_scope = scope;
        }
        Ok(config)
    }
}
