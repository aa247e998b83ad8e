use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    collaborators::{minutes_pipeline, CollaboratorClient, CollaboratorHealth, PipelineDefaults, Service},
    config::Config,
    metrics,
    store::{MemoryStore, NewWorkflow, Store, Workflow, WorkflowSummary},
    workflow::{StepRegistry, WorkflowRunner, WorkflowStatus},
    Result,
};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Reply to an accepted start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedWorkflow {
    pub id: Uuid,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHealth {
    pub status: String,
    pub service: String,
    pub version: String,
    pub collaborators: BTreeMap<String, CollaboratorHealth>,
}

/// Entry point for starting and observing workflows.
///
/// `start` hands each workflow to its own background task and returns at once;
/// everything else reads the store.
pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    runner: Arc<WorkflowRunner>,
    collaborators: Option<Arc<CollaboratorClient>>,
    probe_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn Store>, registry: StepRegistry) -> Self {
        for step in registry.iter() {
            debug!(
                "Step {} ({:?}): {} attempt(s), up to {:?} of backoff",
                step.name,
                step.requirement,
                step.retry.attempts(),
                step.retry.worst_case_wait()
            );
        }

        Self {
            runner: Arc::new(WorkflowRunner::new(store.clone(), registry)),
            store,
            collaborators: None,
            probe_timeout: Duration::from_secs(2),
        }
    }

    /// An engine with a fresh in-memory store sized to `registry`.
    pub fn in_memory(registry: StepRegistry) -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new(registry.plan()));
        Self::new(store, registry)
    }

    pub fn with_health_probes(mut self, client: Arc<CollaboratorClient>, timeout: Duration) -> Self {
        self.collaborators = Some(client);
        self.probe_timeout = timeout;
        self
    }

    /// Wire the meeting minutes pipeline against the configured collaborators.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(CollaboratorClient::new(&config.collaborators)?);
        let registry = minutes_pipeline(
            client.clone(),
            PipelineDefaults {
                output_dir: config.pipeline.default_output_dir.clone(),
            },
            config.pipeline.retry,
        )?;

        Ok(Self::in_memory(registry).with_health_probes(client, config.health.probe_timeout()))
    }

    pub fn registry(&self) -> &StepRegistry {
        self.runner.registry()
    }

    /// Validate, record, and launch a workflow. Invalid requests create nothing.
    pub async fn start(&self, request: NewWorkflow) -> Result<StartedWorkflow> {
        let request = request.validate()?;
        let title = request.title.clone();

        let id = self.store.create(request).await?;
        let workflow = self.store.get(id).await?;
        metrics::WORKFLOWS_STARTED.inc();
        info!("Queued workflow {} ({})", id, title);

        let runner = self.runner.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let run = tokio::spawn(async move { runner.run(id).await });
            match run.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("Workflow execution failed: {}", e),
                Err(e) => abandon(store.as_ref(), id, e).await,
            }
        });

        Ok(StartedWorkflow {
            id,
            status: workflow.status,
            created_at: workflow.created_at,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Workflow> {
        self.store.get(id).await
    }

    pub async fn list(&self, status: Option<WorkflowStatus>, limit: Option<usize>) -> Result<Vec<WorkflowSummary>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
        self.store.list(status, limit).await
    }

    /// The engine is healthy whenever it answers; collaborator reachability is informational.
    pub async fn health(&self) -> EngineHealth {
        let collaborators = match &self.collaborators {
            Some(client) => {
                let probes = Service::ALL.into_iter().map(|service| async move {
                    (service.name().to_string(), client.probe(service, self.probe_timeout).await)
                });
                join_all(probes).await.into_iter().collect()
            }
            None => BTreeMap::new(),
        };

        EngineHealth {
            status: "healthy".to_string(),
            service: "orchestrator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            collaborators,
        }
    }
}

// The run task died without reaching a terminal status
async fn abandon(store: &dyn Store, id: Uuid, e: JoinError) {
    error!("Workflow {} task ended abnormally: {}", id, e);
    let reason = if e.is_panic() {
        "orchestrator: workflow task panicked"
    } else {
        "orchestrator: workflow task was cancelled"
    };

    match store
        .set_status(id, WorkflowStatus::Failed, Some(reason.to_string()))
        .await
    {
        Ok(()) => metrics::WORKFLOWS_FINISHED.with_label_values(&["failed"]).inc(),
        Err(mark) => warn!("Could not mark workflow {} failed: {}", id, mark),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        workflow::{StepAction, StepSpec, WorkflowContext},
        Error,
    };
    use async_trait::async_trait;
    use serde_json::Value;

    struct Slow;

    #[async_trait]
    impl StepAction for Slow {
        async fn run(&self, _ctx: &WorkflowContext) -> Result<Option<Value>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(None)
        }
    }

    fn engine() -> WorkflowEngine {
        WorkflowEngine::in_memory(
            StepRegistry::new(vec![
                StepSpec::required("one", Arc::new(Slow)),
                StepSpec::required("two", Arc::new(Slow)),
            ])
            .unwrap(),
        )
    }

    fn new_workflow(title: &str) -> NewWorkflow {
        NewWorkflow {
            source_path: Some(format!("input/{}.mp4", title)),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    async fn wait_for_terminal(engine: &WorkflowEngine, id: Uuid) -> Workflow {
        for _ in 0..200 {
            let workflow = engine.get(id).await.unwrap();
            if workflow.status.is_terminal() {
                return workflow;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("workflow {} did not finish", id);
    }

    #[tokio::test]
    async fn start_returns_before_steps_finish() {
        let engine = engine();
        let started = engine.start(new_workflow("standup")).await.unwrap();
        assert_eq!(started.status, WorkflowStatus::Pending);

        let workflow = engine.get(started.id).await.unwrap();
        assert!(matches!(workflow.status, WorkflowStatus::Pending | WorkflowStatus::Running));
        assert_eq!(workflow.steps.len(), 2);

        let finished = wait_for_terminal(&engine, started.id).await;
        assert_eq!(finished.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn invalid_request_creates_nothing() {
        let engine = engine();
        let err = engine
            .start(NewWorkflow {
                title: Some("no source".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(engine.list(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_limit_is_clamped() {
        let engine = engine();
        for i in 0..3 {
            engine.start(new_workflow(&format!("m{}", i))).await.unwrap();
        }

        assert_eq!(engine.list(None, Some(2)).await.unwrap().len(), 2);
        assert_eq!(engine.list(None, None).await.unwrap().len(), 3);
        assert!(engine.list(None, Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_step_fails_the_workflow() {
        struct Explode;

        #[async_trait]
        impl StepAction for Explode {
            async fn run(&self, _ctx: &WorkflowContext) -> Result<Option<Value>> {
                panic!("collaborator adapter bug");
            }
        }

        let engine = WorkflowEngine::in_memory(
            StepRegistry::new(vec![
                StepSpec::required("one", Arc::new(Slow)),
                StepSpec::optional("two", Arc::new(Explode)),
            ])
            .unwrap(),
        );
        let started = engine.start(new_workflow("incident")).await.unwrap();

        let finished = wait_for_terminal(&engine, started.id).await;
        assert_eq!(finished.status, WorkflowStatus::Failed);
        assert_eq!(
            finished.error.as_deref(),
            Some("orchestrator: workflow task panicked")
        );
        assert!(finished.completed_at.is_some());
    }

    #[tokio::test]
    async fn health_without_probes_is_healthy() {
        let health = engine().health().await;
        assert_eq!(health.status, "healthy");
        assert!(health.collaborators.is_empty());
    }
}
