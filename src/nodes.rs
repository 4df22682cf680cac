use crate::config::WorkflowSettings;
use crate::orchestration::routing::NodeId;
use crate::orchestration::run_store::StoreError;
use crate::orchestration::state::WorkflowState;
use crate::provider::{ReasoningService, SearchService};
use crate::sandbox::SandboxManager;
use crate::shared::cancel::CancelToken;
use crate::shared::logging::append_log;
use std::path::Path;

pub mod clarify;
pub mod execute;
pub mod options;
pub mod research;
pub mod selection;

pub use clarify::ClarifyNode;
pub use execute::ExecuteNode;
pub use options::{fallback_options, GenerateOptionsNode};
pub use research::ResearchNode;
pub use selection::AwaitSelectionNode;

/// Failures a node cannot absorb. Collaborator errors never surface here;
/// nodes record them in `WorkflowState::errors` and degrade instead.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("no plan has been selected")]
    MissingSelection,
    #[error("run canceled")]
    Cancelled,
    #[error("checkpoint write failed: {0}")]
    Checkpoint(#[from] StoreError),
}

/// Persists the state mid-node. `execute` calls it after every step.
pub type StepCheckpoint<'a> = dyn Fn(&WorkflowState) -> Result<(), StoreError> + 'a;

pub struct NodeContext<'a> {
    pub run_id: &'a str,
    pub reasoning: &'a dyn ReasoningService,
    pub search: &'a dyn SearchService,
    pub sandbox: &'a SandboxManager,
    pub workflow: &'a WorkflowSettings,
    pub search_max_results: usize,
    pub cancel: &'a CancelToken,
    pub state_root: &'a Path,
    pub checkpoint: &'a StepCheckpoint<'a>,
}

impl NodeContext<'_> {
    pub fn log_event(&self, level: &str, event: &str, message: &str) {
        append_log(self.state_root, level, event, Some(self.run_id), message);
    }
}

pub trait TaskNode: Send + Sync {
    fn id(&self) -> NodeId;
    fn run(&self, ctx: &NodeContext<'_>, state: &mut WorkflowState) -> Result<(), NodeError>;
}

/// The five stages in graph order.
pub fn default_nodes() -> Vec<Box<dyn TaskNode>> {
    vec![
        Box::new(ClarifyNode),
        Box::new(ResearchNode),
        Box::new(GenerateOptionsNode),
        Box::new(AwaitSelectionNode),
        Box::new(ExecuteNode),
    ]
}
