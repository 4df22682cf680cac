use crate::config::{ReasoningBackend, Settings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod command_reasoning;
pub mod http_reasoning;
pub mod output_parse;
pub mod prompts;
pub mod search;

pub use command_reasoning::CommandReasoning;
pub use http_reasoning::HttpReasoning;
pub use search::HttpSearch;

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{service} request failed: {reason}")]
    Request {
        service: &'static str,
        reason: String,
    },
    #[error("{service} returned an unusable response: {reason}")]
    Response {
        service: &'static str,
        reason: String,
    },
    #[error("{service} is not configured: {reason}")]
    NotConfigured {
        service: &'static str,
        reason: String,
    },
    #[error("reasoning command `{binary}` not found")]
    MissingBinary { binary: String },
    #[error("reasoning command failed with exit code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },
    #[error("reasoning command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Overrides the configured sampling temperature.
    pub temperature: Option<f32>,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Single-text rendering for backends without message roles.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system.trim(), self.user.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
}

pub trait ReasoningService: Send + Sync {
    fn invoke(&self, prompt: &Prompt) -> Result<String, CollaboratorError>;
}

pub trait SearchService: Send + Sync {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, CollaboratorError>;
}

pub fn build_reasoning(settings: &Settings) -> Arc<dyn ReasoningService> {
    let reasoning = &settings.reasoning;
    match reasoning.backend {
        ReasoningBackend::Http => Arc::new(HttpReasoning::from_settings(reasoning)),
        ReasoningBackend::Command => Arc::new(CommandReasoning::from_settings(reasoning)),
    }
}

pub fn build_search(settings: &Settings) -> Arc<dyn SearchService> {
    Arc::new(HttpSearch::from_settings(&settings.search))
}
