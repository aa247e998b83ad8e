use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    metrics,
    store::{StepResult, Store},
    workflow::{SkipReason, StepExecutor, StepRegistry, StepStatus, WorkflowContext, WorkflowStatus},
    Result,
};

// Holds the in-flight gauge up for as long as a run is alive, unwinding included
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::WORKFLOWS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::WORKFLOWS_IN_FLIGHT.dec();
    }
}

/// Drives one workflow through the registry, start to terminal status.
pub struct WorkflowRunner {
    store: Arc<dyn Store>,
    registry: StepRegistry,
    executor: StepExecutor,
}

impl WorkflowRunner {
    pub fn new(store: Arc<dyn Store>, registry: StepRegistry) -> Self {
        Self {
            executor: StepExecutor::new(store.clone()),
            store,
            registry,
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Run the workflow to completion and return its terminal status.
    ///
    /// Errors here are store errors; step failures are recorded, not returned.
    pub async fn run(&self, workflow_id: Uuid) -> Result<WorkflowStatus> {
        let workflow = self.store.get(workflow_id).await?;
        self.store
            .set_status(workflow_id, WorkflowStatus::Running, None)
            .await?;

        let outcome = {
            let _in_flight = InFlight::enter();
            self.run_steps(workflow_id, WorkflowContext::new(workflow_id, workflow.request))
                .await
        };

        let status = match outcome {
            Ok(status) => status,
            Err(e) => {
                error!("Workflow {} aborted: {}", workflow_id, e);
                // Leave no record stuck in `running`
                match self
                    .store
                    .set_status(workflow_id, WorkflowStatus::Failed, Some(format!("orchestrator: {}", e)))
                    .await
                {
                    Ok(()) => metrics::WORKFLOWS_FINISHED.with_label_values(&["failed"]).inc(),
                    Err(mark) => warn!("Could not mark workflow {} failed: {}", workflow_id, mark),
                }
                return Err(e);
            }
        };

        let label = status.to_string();
        metrics::WORKFLOWS_FINISHED
            .with_label_values(&[label.as_str()])
            .inc();
        Ok(status)
    }

    async fn run_steps(&self, workflow_id: Uuid, mut context: WorkflowContext) -> Result<WorkflowStatus> {
        info!(
            "Executing workflow {} ({} steps)",
            workflow_id,
            self.registry.len()
        );

        let mut failure: Option<String> = None;

        for (ordinal, spec) in self.registry.iter().enumerate() {
            let result = if failure.is_some() {
                StepResult::skipped(&spec.name, ordinal, spec.is_required(), SkipReason::PriorFailure)
            } else if !spec.applies_to(&context.request) {
                info!("Step {} disabled by request for workflow {}", spec.name, workflow_id);
                StepResult::skipped(&spec.name, ordinal, spec.is_required(), SkipReason::Disabled)
            } else {
                self.executor.execute_step(ordinal, spec, &context).await?
            };

            self.store
                .update_step(workflow_id, ordinal, result.clone())
                .await?;

            match result.status {
                StepStatus::Succeeded => {
                    context.add_step_output(
                        &spec.name,
                        result.output.clone().unwrap_or(serde_json::Value::Null),
                    );
                }
                StepStatus::Failed if spec.is_required() => {
                    let message = result.error.as_deref().unwrap_or("unknown error");
                    error!(
                        "Required step {} failed for workflow {}: {}",
                        spec.name, workflow_id, message
                    );
                    failure = Some(format!("{}: {}", spec.name, message));
                }
                StepStatus::Failed => {
                    warn!(
                        "Optional step {} failed for workflow {}, continuing",
                        spec.name, workflow_id
                    );
                }
                _ => {}
            }

            context.record(result);
        }

        self.store.set_outputs(workflow_id, context.outputs()).await?;

        let status = match failure {
            None => {
                self.store
                    .set_status(workflow_id, WorkflowStatus::Completed, None)
                    .await?;
                info!("Workflow {} completed", workflow_id);
                WorkflowStatus::Completed
            }
            Some(summary) => {
                error!("Workflow {} failed: {}", workflow_id, summary);
                self.store
                    .set_status(workflow_id, WorkflowStatus::Failed, Some(summary))
                    .await?;
                WorkflowStatus::Failed
            }
        };

        Ok(status)
    }
}
