use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    store::{StepPlan, StepResult, Store, Workflow, WorkflowRequest, WorkflowSummary},
    workflow::WorkflowStatus,
    Error, Result,
};

/// Volatile workflow registry. Records live until the process exits.
pub struct MemoryStore {
    plan: Vec<StepPlan>,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    workflows: HashMap<Uuid, Entry>,
    next_seq: u64,
}

struct Entry {
    // Creation order; timestamps can tie
    seq: u64,
    workflow: Workflow,
}

impl MemoryStore {
    pub fn new(plan: Vec<StepPlan>) -> Self {
        Self {
            plan,
            inner: RwLock::new(Inner::default()),
        }
    }
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound(format!("workflow {}", id))
}

fn ensure_open(workflow: &Workflow) -> Result<()> {
    if workflow.status.is_terminal() {
        return Err(Error::Finished(workflow.id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn create(&self, request: WorkflowRequest) -> Result<Uuid> {
        let mut inner = self.inner.write().await;

        let mut id = Uuid::new_v4();
        while inner.workflows.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let workflow = Workflow::new(id, request, &self.plan);
        inner.workflows.insert(id, Entry { seq, workflow });

        debug!("Created workflow {} (seq {})", id, seq);
        Ok(id)
    }

    async fn update_step(&self, id: Uuid, ordinal: usize, mut result: StepResult) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner.workflows.get_mut(&id).ok_or_else(|| not_found(id))?;
        ensure_open(&entry.workflow)?;

        let slot = entry.workflow.steps.get_mut(ordinal).ok_or_else(|| {
            Error::Validation(format!("workflow {} has no step at position {}", id, ordinal))
        })?;
        if slot.name != result.name {
            return Err(Error::Internal(format!(
                "step {} of workflow {} is '{}', not '{}'",
                ordinal, id, slot.name, result.name
            )));
        }

        debug!("Updating step {}/{} of {} -> {}", ordinal, result.name, id, result.status);
        result.ordinal = ordinal;
        *slot = result;
        entry.workflow.updated_at = Utc::now();

        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: WorkflowStatus, error: Option<String>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let workflow = &mut inner.workflows.get_mut(&id).ok_or_else(|| not_found(id))?.workflow;

        if !workflow.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                from: workflow.status,
                to: status,
            });
        }

        debug!("Updating workflow status: {} {} -> {}", id, workflow.status, status);
        let now = Utc::now();
        workflow.status = status;
        workflow.updated_at = now;
        match status {
            WorkflowStatus::Running => workflow.started_at = Some(now),
            WorkflowStatus::Completed | WorkflowStatus::Failed => {
                workflow.completed_at = Some(now);
                workflow.error = error;
            }
            WorkflowStatus::Pending => {}
        }

        Ok(())
    }

    async fn set_outputs(&self, id: Uuid, outputs: BTreeMap<String, JsonValue>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let workflow = &mut inner.workflows.get_mut(&id).ok_or_else(|| not_found(id))?.workflow;
        ensure_open(workflow)?;

        workflow.outputs = outputs;
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Workflow> {
        let inner = self.inner.read().await;
        inner
            .workflows
            .get(&id)
            .map(|entry| entry.workflow.clone())
            .ok_or_else(|| not_found(id))
    }

    async fn list(&self, status: Option<WorkflowStatus>, limit: usize) -> Result<Vec<WorkflowSummary>> {
        let inner = self.inner.read().await;

        let mut entries: Vec<&Entry> = inner
            .workflows
            .values()
            .filter(|entry| status.map_or(true, |s| entry.workflow.status == s))
            .collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));

        Ok(entries
            .into_iter()
            .take(limit)
            .map(|entry| entry.workflow.summary())
            .collect())
    }
}
