use crate::api::gemini::DEFAULT_GEMINI_MODEL;
use crate::error::Result;
use crate::error_ext::ResultExt;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PROXY_ENDPOINT: &str = "http://localhost:3000/api/chat";

/// Model turn used when the completion succeeds with empty text.
pub const EMPTY_REPLY_FALLBACK: &str = "Je n'ai pas pu formuler de réponse.";

pub const ERROR_PREFIX: &str = "Erreur : ";

pub const SYSTEM_INSTRUCTION: &str = r#"Tu es un assistant de révision pour des étudiants en droit français.
Réponds en français, avec rigueur et pédagogie, en t'appuyant en priorité sur le CONTEXTE DU COURS fourni.

Règles de forme :
- Structure tes réponses avec des titres et des listes Markdown.
- Utilise des tableaux Markdown pour comparer des notions ou des régimes.
- Pour un schéma (chronologie, procédure, classification), utilise un bloc ```mermaid.
- Pour un QCM ou un Vrai/Faux, pose une seule question à la fois et propose les réponses ainsi :
  <div class="qcm-container">
  <qcm-option value="A">Première réponse</qcm-option>
  <qcm-option value="B">Deuxième réponse</qcm-option>
  </div>
  Attends la réponse de l'étudiant avant de corriger et de passer à la question suivante.
- Cite les arrêts avec la juridiction, la date et le nom usuel lorsqu'il existe.
- Si une question sort du cours, dis-le clairement avant d'y répondre."#;

/// Completion transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// POST to the chat proxy, which holds the provider key.
    #[default]
    Proxy,
    /// Call the Gemini API directly with a local key.
    Gemini,
}

/// Scope of the in-flight guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchScope {
    /// One turn in flight per session; sessions run independently.
    #[default]
    PerSession,
    /// One turn in flight overall.
    Global,
}

/// Central configuration for Lexis
#[derive(Debug, Clone)]
pub struct LexisConfig {
    pub transport: Transport,
    pub endpoint: String,
    pub model: String,
    pub gemini_base_url: Option<String>,
    pub course_path: Option<PathBuf>,
    pub system_instruction: String,
    pub dispatch_scope: DispatchScope,
}

impl Default for LexisConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            endpoint: DEFAULT_PROXY_ENDPOINT.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: None,
            course_path: None,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            dispatch_scope: DispatchScope::default(),
        }
    }
}

/// Optional settings read from `config.toml` files. Absent keys keep the current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub transport: Option<Transport>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub gemini_base_url: Option<String>,
    pub course: Option<PathBuf>,
    pub system_instruction: Option<String>,
    pub dispatch_scope: Option<DispatchScope>,
}

impl FileConfig {
    /// Values set in `other` win.
    fn overlay(self, other: FileConfig) -> FileConfig {
        FileConfig {
            transport: other.transport.or(self.transport),
            endpoint: other.endpoint.or(self.endpoint),
            model: other.model.or(self.model),
            gemini_base_url: other.gemini_base_url.or(self.gemini_base_url),
            course: other.course.or(self.course),
            system_instruction: other.system_instruction.or(self.system_instruction),
            dispatch_scope: other.dispatch_scope.or(self.dispatch_scope),
        }
    }
}

impl LexisConfig {
    pub fn apply_file(mut self, file: FileConfig) -> Self {
        if let Some(transport) = file.transport {
            self.transport = transport;
        }
        if let Some(endpoint) = file.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if file.gemini_base_url.is_some() {
            self.gemini_base_url = file.gemini_base_url;
        }
        if file.course.is_some() {
            self.course_path = file.course;
        }
        if let Some(instruction) = file.system_instruction {
            self.system_instruction = instruction;
        }
        if let Some(scope) = file.dispatch_scope {
            self.dispatch_scope = scope;
        }
        self
    }

    /// Course text sent with every turn; empty when no course file is configured.
    pub fn course_content(&self) -> Result<String> {
        match &self.course_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read course file {:?}", path)),
            None => Ok(String::new()),
        }
    }
}

/// Load configuration from the global file, then the workspace-local one.
pub fn load_file_config(workspace: &Path) -> Result<FileConfig> {
    let mut config = FileConfig::default();

    // Global config from ~/.lexis/config.toml
    if let Some(home) = std::env::var_os("HOME") {
        let global_config_path = PathBuf::from(home).join(".lexis/config.toml");
        config = config.overlay(load_file_config_from(&global_config_path)?);
    }

    // Local config from .lexis/config.local.toml (overrides global)
    let local_config_path = workspace.join(".lexis/config.local.toml");
    config = config.overlay(load_file_config_from(&local_config_path)?);

    Ok(config)
}

fn load_file_config_from(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: FileConfig =
        toml::from_str(&content).with_context(|| format!("Invalid config {:?}", path))?;

    tracing::debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}
