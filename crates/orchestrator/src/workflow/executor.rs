use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{
    metrics,
    store::{StepResult, Store},
    workflow::{StepSpec, StepStatus, WorkflowContext},
    Result,
};

/// Runs a single step under its retry policy, publishing progress to the store.
pub struct StepExecutor {
    store: Arc<dyn Store>,
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

impl StepExecutor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Execute `spec` at position `ordinal`. The returned result is terminal
    /// (`succeeded` or `failed`); the caller persists it.
    ///
    /// Every error from the action counts as a failed attempt. Only running out
    /// of attempts stops the loop.
    pub async fn execute_step(
        &self,
        ordinal: usize,
        spec: &StepSpec,
        context: &WorkflowContext,
    ) -> Result<StepResult> {
        let workflow_id = context.workflow_id;
        let attempts = spec.retry.attempts();

        let mut result = StepResult::pending(&spec.name, ordinal, spec.is_required());
        result.status = StepStatus::Running;
        result.started_at = Some(Utc::now());
        self.store.update_step(workflow_id, ordinal, result.clone()).await?;

        info!(
            "Executing step {} ({}) for workflow {}, up to {} attempt(s)",
            ordinal, spec.name, workflow_id, attempts
        );

        let started = Instant::now();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let attempt_started = Instant::now();
            let outcome = spec.action.run(context).await;

            result.attempts = attempt;
            result.attempt_durations_ms.push(millis(attempt_started.elapsed()));

            match outcome {
                Ok(output) => {
                    metrics::STEP_ATTEMPTS.with_label_values(&["succeeded"]).inc();
                    info!(
                        "Step {} succeeded on attempt {}/{} for workflow {}",
                        spec.name, attempt, attempts, workflow_id
                    );
                    result.status = StepStatus::Succeeded;
                    result.output = output;
                    break;
                }
                Err(e) => {
                    metrics::STEP_ATTEMPTS.with_label_values(&["failed"]).inc();
                    warn!(
                        "Step {} attempt {}/{} failed for workflow {}: {}",
                        spec.name, attempt, attempts, workflow_id, e
                    );
                    last_error = Some(e.detail());

                    if attempt < attempts {
                        // Publish the attempt count before waiting
                        self.store.update_step(workflow_id, ordinal, result.clone()).await?;

                        let delay = spec.retry.delay_after(attempt);
                        debug!("Retrying step {} in {:?}", spec.name, delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        if result.status != StepStatus::Succeeded {
            result.status = StepStatus::Failed;
            result.error = Some(last_error.unwrap_or_else(|| "step did not run".to_string()));
        }
        result.total_duration_ms = millis(started.elapsed());
        result.completed_at = Some(Utc::now());

        Ok(result)
    }
}
