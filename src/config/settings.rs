use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Root for the run database and logs. Empty means `~/.planforge/state`.
    #[serde(default)]
    pub state_root: PathBuf,
    #[serde(default)]
    pub reasoning: ReasoningSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub workflow: WorkflowSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningBackend {
    #[default]
    Http,
    Command,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReasoningSettings {
    #[serde(default)]
    pub backend: ReasoningBackend,
    #[serde(default = "default_reasoning_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_reasoning_model")]
    pub model: String,
    #[serde(default = "default_reasoning_api_key_env")]
    pub api_key_env: String,
    /// Argv for the `command` backend; the prompt is written to stdin.
    #[serde(default = "default_reasoning_command")]
    pub command: Vec<String>,
    #[serde(default = "default_reasoning_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            backend: ReasoningBackend::default(),
            endpoint: default_reasoning_endpoint(),
            model: default_reasoning_model(),
            api_key_env: default_reasoning_api_key_env(),
            command: default_reasoning_command(),
            timeout_seconds: default_reasoning_timeout_seconds(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_search_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key_env: default_search_api_key_env(),
            max_results: default_max_search_results(),
            timeout_seconds: default_search_timeout_seconds(),
            search_depth: default_search_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxSettings {
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
    #[serde(default = "default_image")]
    pub image: String,
    /// Host directory holding one workspace per run. Defaults to `<state_root>/workspaces`.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default = "default_container_workdir")]
    pub container_workdir: String,
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            docker_binary: default_docker_binary(),
            image: default_image(),
            workspace_root: None,
            container_workdir: default_container_workdir(),
            container_prefix: default_container_prefix(),
            command_timeout_seconds: default_command_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowSettings {
    #[serde(default = "default_research_depth")]
    pub research_depth: usize,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
    #[serde(default = "default_max_execution_steps")]
    pub max_execution_steps: usize,
    #[serde(default = "default_steps_per_pass")]
    pub steps_per_pass: usize,
    #[serde(default = "default_execution_passes_per_drive")]
    pub execution_passes_per_drive: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            research_depth: default_research_depth(),
            retry_budget: default_retry_budget(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            max_execution_steps: default_max_execution_steps(),
            steps_per_pass: default_steps_per_pass(),
            execution_passes_per_drive: default_execution_passes_per_drive(),
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_root.join("planforge.db")
    }

    pub fn resolve_workspace_root(&self) -> PathBuf {
        self.sandbox
            .workspace_root
            .clone()
            .unwrap_or_else(|| self.state_root.join("workspaces"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let workflow = &self.workflow;
        if workflow.research_depth == 0 {
            return Err(ConfigError::Settings(
                "`workflow.research_depth` must be at least 1".to_string(),
            ));
        }
        if workflow.retry_budget == 0 {
            return Err(ConfigError::Settings(
                "`workflow.retry_budget` must be at least 1".to_string(),
            ));
        }
        if workflow.retry_backoff_max_ms < workflow.retry_backoff_ms {
            return Err(ConfigError::Settings(
                "`workflow.retry_backoff_max_ms` must be >= `workflow.retry_backoff_ms`"
                    .to_string(),
            ));
        }
        if workflow.max_execution_steps == 0
            || workflow.steps_per_pass == 0
            || workflow.execution_passes_per_drive == 0
        {
            return Err(ConfigError::Settings(
                "`workflow.max_execution_steps`, `workflow.steps_per_pass` and `workflow.execution_passes_per_drive` must be at least 1"
                    .to_string(),
            ));
        }

        let sandbox = &self.sandbox;
        if sandbox.image.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`sandbox.image` must be non-empty".to_string(),
            ));
        }
        if !sandbox.container_workdir.starts_with('/') {
            return Err(ConfigError::Settings(
                "`sandbox.container_workdir` must be an absolute container path".to_string(),
            ));
        }
        if sandbox.command_timeout_seconds == 0 {
            return Err(ConfigError::Settings(
                "`sandbox.command_timeout_seconds` must be at least 1".to_string(),
            ));
        }
        if sandbox.container_prefix.trim().is_empty()
            || !sandbox
                .container_prefix
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(ConfigError::Settings(
                "`sandbox.container_prefix` must use only ASCII letters, digits, '-' or '_'"
                    .to_string(),
            ));
        }

        let reasoning = &self.reasoning;
        if reasoning.timeout_seconds == 0 {
            return Err(ConfigError::Settings(
                "`reasoning.timeout_seconds` must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&reasoning.temperature) {
            return Err(ConfigError::Settings(
                "`reasoning.temperature` must be between 0.0 and 2.0".to_string(),
            ));
        }
        match reasoning.backend {
            ReasoningBackend::Http if reasoning.endpoint.trim().is_empty() => {
                return Err(ConfigError::Settings(
                    "`reasoning.endpoint` is required for the http backend".to_string(),
                ));
            }
            ReasoningBackend::Command if reasoning.command.is_empty() => {
                return Err(ConfigError::Settings(
                    "`reasoning.command` is required for the command backend".to_string(),
                ));
            }
            _ => {}
        }

        if self.search.max_results == 0 {
            return Err(ConfigError::Settings(
                "`search.max_results` must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads a secret from the environment variable named by `api_key_env`.
/// Unset or blank variables yield `None`; callers report that lazily.
pub(crate) fn read_api_key(api_key_env: &str) -> Option<String> {
    if api_key_env.trim().is_empty() {
        return None;
    }
    std::env::var(api_key_env)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn default_reasoning_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_reasoning_model() -> String {
    "gpt-4".to_string()
}

fn default_reasoning_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_reasoning_command() -> Vec<String> {
    vec!["ollama".to_string(), "run".to_string(), "llama2".to_string()]
}

fn default_reasoning_timeout_seconds() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.5
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}

fn default_search_api_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_max_search_results() -> usize {
    5
}

fn default_search_timeout_seconds() -> u64 {
    30
}

fn default_search_depth() -> String {
    "advanced".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "python:3.11-slim".to_string()
}

fn default_container_workdir() -> String {
    "/workspace".to_string()
}

fn default_container_prefix() -> String {
    "planforge".to_string()
}

fn default_command_timeout_seconds() -> u64 {
    60
}

fn default_research_depth() -> usize {
    3
}

fn default_retry_budget() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_retry_backoff_max_ms() -> u64 {
    30_000
}

fn default_max_execution_steps() -> usize {
    10
}

fn default_steps_per_pass() -> usize {
    3
}

fn default_execution_passes_per_drive() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_documented_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").expect("parse");
        assert_eq!(settings.workflow.research_depth, 3);
        assert_eq!(settings.workflow.retry_budget, 3);
        assert_eq!(settings.workflow.steps_per_pass, 3);
        assert_eq!(settings.workflow.max_execution_steps, 10);
        assert_eq!(settings.sandbox.image, "python:3.11-slim");
        assert_eq!(settings.sandbox.container_workdir, "/workspace");
        assert_eq!(settings.reasoning.backend, ReasoningBackend::Http);
        settings.validate().expect("defaults validate");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings: Settings = serde_yaml::from_str(
            r#"
state_root: /tmp/planforge
reasoning:
  backend: command
  command: [ollama, run, codellama]
workflow:
  retry_budget: 5
"#,
        )
        .expect("parse");
        assert_eq!(settings.reasoning.backend, ReasoningBackend::Command);
        assert_eq!(settings.reasoning.command[2], "codellama");
        assert_eq!(settings.workflow.retry_budget, 5);
        assert_eq!(settings.workflow.research_depth, 3);
        assert_eq!(
            settings.resolve_workspace_root(),
            PathBuf::from("/tmp/planforge/workspaces")
        );
        assert_eq!(
            settings.database_path(),
            PathBuf::from("/tmp/planforge/planforge.db")
        );
    }

    #[test]
    fn zero_budgets_and_relative_workdir_are_rejected() {
        let mut settings = Settings::default();
        settings.workflow.retry_budget = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.sandbox.container_workdir = "workspace".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.reasoning.backend = ReasoningBackend::Command;
        settings.reasoning.command.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_backend_fails_to_parse() {
        let parsed = serde_yaml::from_str::<Settings>("reasoning:\n  backend: carrier_pigeon\n");
        assert!(parsed.is_err());
    }
}
