use crate::config::WorkflowSettings;
use crate::orchestration::state::{ExecutionStep, StepStatus};
use crate::shared::cancel::{sleep_with_cancel, CancelToken};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub budget: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(budget: u32, backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            budget: budget.max(1),
            backoff,
            max_backoff: max_backoff.max(backoff),
        }
    }

    pub fn from_settings(settings: &WorkflowSettings) -> Self {
        Self::new(
            settings.retry_budget,
            Duration::from_millis(settings.retry_backoff_ms),
            Duration::from_millis(settings.retry_backoff_max_ms),
        )
    }

    /// Delay before retry number `retry` (1-based): base doubled per retry, capped.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let mut delay = self.backoff;
        for _ in 1..retry {
            delay = delay.saturating_mul(2).min(self.max_backoff);
        }
        delay.min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&WorkflowSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub success: bool,
    pub result: String,
}

impl AttemptOutcome {
    pub fn succeeded(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
        }
    }

    pub fn failed(result: impl Into<String>) -> Self {
        Self {
            success: false,
            result: result.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step {step_number} failed after {attempts} attempt(s): {last_result}")]
pub struct RetryExhausted {
    pub step_number: u32,
    pub attempts: u32,
    pub last_result: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    pub status: StepStatus,
    pub attempts: u32,
    pub cancelled: bool,
    pub exhausted: Option<RetryExhausted>,
}

/// Runs `action` until it succeeds, the budget is spent, or `cancel` fires.
/// The step carries the outcome: terminal status, attempt count and the last
/// attempt's result.
pub fn run_with_retry<F>(
    step: &mut ExecutionStep,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut action: F,
) -> RetryReport
where
    F: FnMut(u32) -> AttemptOutcome,
{
    step.status = StepStatus::Running;
    let mut attempts = 0;
    let mut cancelled = false;
    let mut last_result = String::new();

    for attempt in 1..=policy.budget {
        if attempt > 1 && !sleep_with_cancel(cancel, policy.delay_before(attempt - 1)) {
            cancelled = true;
            break;
        }
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        attempts = attempt;
        step.attempts = step.attempts.saturating_add(1);
        let outcome = action(attempt);
        last_result = outcome.result;
        if outcome.success {
            step.status = StepStatus::Completed;
            step.result = Some(last_result);
            return RetryReport {
                status: StepStatus::Completed,
                attempts,
                cancelled: false,
                exhausted: None,
            };
        }
    }

    if cancelled && attempts == 0 {
        last_result = "canceled before first attempt".to_string();
    }
    step.status = StepStatus::Failed;
    step.result = Some(last_result.clone());
    RetryReport {
        status: StepStatus::Failed,
        attempts,
        cancelled,
        exhausted: Some(RetryExhausted {
            step_number: step.step_number,
            attempts,
            last_result,
        }),
    }
}
