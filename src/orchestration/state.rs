use crate::shared::serde_ext::parse_via_string;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "complexity must be one of: low, medium, high (got `{other}`)"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Complexity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        parse_via_string(deserializer, "complexity", Complexity::parse)
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOption {
    pub tech_stack: String,
    pub why_fits: String,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
    #[serde(alias = "estimated_complexity")]
    pub complexity: Complexity,
}

impl PlanOption {
    pub fn new(
        tech_stack: impl Into<String>,
        why_fits: impl Into<String>,
        pros: Vec<String>,
        cons: Vec<String>,
        complexity: &str,
    ) -> Result<Self, String> {
        let tech_stack = tech_stack.into();
        if tech_stack.trim().is_empty() {
            return Err("tech_stack must be non-empty".to_string());
        }
        Ok(Self {
            tech_stack,
            why_fits: why_fits.into(),
            pros,
            cons,
            complexity: Complexity::parse(complexity)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_number: u32,
    pub action: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    pub status: StepStatus,
    #[serde(default)]
    pub attempts: u32,
}

impl ExecutionStep {
    pub fn pending(step_number: u32, action: impl Into<String>) -> Self {
        Self {
            step_number,
            action: action.into(),
            command: None,
            result: None,
            status: StepStatus::Pending,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchNote {
    pub query: String,
    pub title: String,
    pub content: String,
    pub url: String,
}

/// Payload threaded through every node and snapshotted in each checkpoint.
/// Fields are only appended to or set; nothing is rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub objective: String,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub clarification_needed: bool,
    #[serde(default)]
    pub clarifications: Vec<String>,
    #[serde(default)]
    pub research_queries: Vec<String>,
    #[serde(default)]
    pub research_notes: Vec<ResearchNote>,
    #[serde(default)]
    pub research_synthesis: String,
    #[serde(default)]
    pub plan_options: Vec<PlanOption>,
    #[serde(default)]
    pub selected_plan: Option<PlanOption>,
    #[serde(default)]
    pub execution_steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default)]
    pub container_ref: Option<String>,
    #[serde(default)]
    pub created_files: BTreeSet<String>,
}

impl WorkflowState {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            logs: Vec::new(),
            completed_steps: Vec::new(),
            errors: Vec::new(),
            clarification_needed: false,
            clarifications: Vec::new(),
            research_queries: Vec::new(),
            research_notes: Vec::new(),
            research_synthesis: String::new(),
            plan_options: Vec::new(),
            selected_plan: None,
            execution_steps: Vec::new(),
            current_step_index: 0,
            container_ref: None,
            created_files: BTreeSet::new(),
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    /// Records the error and mirrors it into the log trail.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.logs.push(format!("error: {message}"));
        self.errors.push(message);
    }

    pub fn mark_completed(&mut self, step: &str) {
        if !self.has_completed(step) {
            self.completed_steps.push(step.to_string());
        }
    }

    pub fn has_completed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|done| done == step)
    }

    pub fn all_steps_terminal(&self) -> bool {
        self.execution_steps
            .iter()
            .all(|step| step.status.is_terminal())
    }

    pub fn next_open_step(&self) -> Option<usize> {
        self.execution_steps
            .iter()
            .position(|step| !step.status.is_terminal())
    }
}
