use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::workflow::{SkipReason, StepStatus, WorkflowStatus};

// Start request as it arrives over the wire; every field is optional until validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub source_path: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub language: Option<String>,
    pub copy_artifact: Option<bool>,
    pub delete_source: Option<bool>,
}

impl NewWorkflow {
    /// Check the mandatory fields and produce the immutable request.
    pub fn validate(self) -> crate::Result<WorkflowRequest> {
        let source_path = non_empty(self.source_path)
            .ok_or_else(|| crate::Error::Validation("source_path is required".to_string()))?;
        let title = non_empty(self.title)
            .ok_or_else(|| crate::Error::Validation("title is required".to_string()))?;

        Ok(WorkflowRequest {
            source_path,
            title,
            date: non_empty(self.date),
            language: non_empty(self.language),
            copy_artifact: self.copy_artifact.unwrap_or(true),
            delete_source: self.delete_source.unwrap_or(false),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub source_path: String,
    pub title: String,
    pub date: Option<String>,
    pub language: Option<String>,
    pub copy_artifact: bool,
    pub delete_source: bool,
}

/// Shape of one declared step, used to pre-populate placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub ordinal: usize,
    pub required: bool,
    pub status: StepStatus,

    // Execution details
    pub attempts: u32,
    pub attempt_durations_ms: Vec<u64>,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub output: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,

    // Timing
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepResult {
    pub fn pending(name: impl Into<String>, ordinal: usize, required: bool) -> Self {
        Self {
            name: name.into(),
            ordinal,
            required,
            status: StepStatus::Pending,
            attempts: 0,
            attempt_durations_ms: Vec::new(),
            total_duration_ms: 0,
            error: None,
            output: None,
            skip_reason: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn skipped(name: impl Into<String>, ordinal: usize, required: bool, reason: SkipReason) -> Self {
        let now = Utc::now();
        Self {
            status: StepStatus::Skipped,
            skip_reason: Some(reason),
            started_at: Some(now),
            completed_at: Some(now),
            ..Self::pending(name, ordinal, required)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub request: WorkflowRequest,
    pub status: WorkflowStatus,
    pub steps: Vec<StepResult>,

    // Results
    pub outputs: BTreeMap<String, JsonValue>,
    pub error: Option<String>,

    // Timing
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(id: Uuid, request: WorkflowRequest, plan: &[StepPlan]) -> Self {
        let now = Utc::now();
        Self {
            id,
            request,
            status: WorkflowStatus::Pending,
            steps: plan
                .iter()
                .enumerate()
                .map(|(ordinal, step)| StepResult::pending(&step.name, ordinal, step.required))
                .collect(),
            outputs: BTreeMap::new(),
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn current_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.status == StepStatus::Running)
    }

    pub fn summary(&self) -> WorkflowSummary {
        let mut counts = StepCounts::default();
        for step in &self.steps {
            match step.status {
                StepStatus::Pending => counts.pending += 1,
                StepStatus::Running => counts.running += 1,
                StepStatus::Succeeded => counts.succeeded += 1,
                StepStatus::Failed => counts.failed += 1,
                StepStatus::Skipped => counts.skipped += 1,
            }
        }

        WorkflowSummary {
            id: self.id,
            title: self.request.title.clone(),
            status: self.status,
            total_steps: self.steps.len(),
            steps: counts,
            current_step: self.current_step().map(|s| s.name.clone()),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

// Listing shape: everything but the per-step detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub title: String,
    pub status: WorkflowStatus,
    pub total_steps: usize,
    pub steps: StepCounts,
    pub current_step: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
