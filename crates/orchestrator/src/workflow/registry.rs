use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::{
    store::{StepPlan, WorkflowRequest},
    workflow::{RetryPolicy, WorkflowContext},
    Error, Result,
};

/// One step's unit of work. `Ok(None)` is a success with no output reference.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self, ctx: &WorkflowContext) -> Result<Option<Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Exhausting retries fails the workflow.
    Required,
    /// Exhausting retries is recorded and the workflow moves on.
    Optional,
}

/// Request predicate deciding whether a step runs at all.
pub type StepGate = fn(&WorkflowRequest) -> bool;

#[derive(Clone)]
pub struct StepSpec {
    pub name: String,
    pub requirement: Requirement,
    pub retry: RetryPolicy,
    pub gate: Option<StepGate>,
    pub action: Arc<dyn StepAction>,
}

impl StepSpec {
    pub fn required(name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        Self {
            name: name.into(),
            requirement: Requirement::Required,
            retry: RetryPolicy::default(),
            gate: None,
            action,
        }
    }

    pub fn optional(name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        Self {
            requirement: Requirement::Optional,
            ..Self::required(name, action)
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn only_when(mut self, gate: StepGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }

    pub fn applies_to(&self, request: &WorkflowRequest) -> bool {
        self.gate.map_or(true, |gate| gate(request))
    }
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("requirement", &self.requirement)
            .field("retry", &self.retry)
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

/// The ordered pipeline every workflow runs.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Arc<[StepSpec]>,
}

impl StepRegistry {
    pub fn new(steps: Vec<StepSpec>) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::Config("pipeline declares no steps".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if step.name.trim().is_empty() {
                return Err(Error::Config("step name must not be empty".to_string()));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(Error::Config(format!("duplicate step name '{}'", step.name)));
            }
        }

        Ok(Self { steps: steps.into() })
    }

    /// Replace every step's retry policy.
    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        let steps: Vec<StepSpec> = self
            .steps
            .iter()
            .cloned()
            .map(|step| step.with_retry(retry))
            .collect();
        Self { steps: steps.into() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepSpec> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn plan(&self) -> Vec<StepPlan> {
        self.steps
            .iter()
            .map(|step| StepPlan {
                name: step.name.clone(),
                required: step.is_required(),
            })
            .collect()
    }
}
