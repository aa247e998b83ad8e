use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::store::{StepResult, WorkflowRequest};

/// Everything a step can see: the request, earlier outputs, and earlier results.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub workflow_id: Uuid,

    /// The accepted start request
    pub request: WorkflowRequest,

    /// Output references of succeeded steps, by step name
    pub step_outputs: HashMap<String, Value>,

    /// Results of steps that already reached a terminal state, in order
    pub history: Vec<StepResult>,
}

impl WorkflowContext {
    pub fn new(workflow_id: Uuid, request: WorkflowRequest) -> Self {
        Self {
            workflow_id,
            request,
            step_outputs: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn add_step_output(&mut self, step_name: &str, output: Value) {
        self.step_outputs.insert(step_name.to_string(), output);
    }

    /// Output of an earlier step; `None` when it failed, was skipped, or produced nothing.
    pub fn get_step_output(&self, step_name: &str) -> Option<&Value> {
        self.step_outputs
            .get(step_name)
            .filter(|value| !value.is_null())
    }

    pub fn get_step_str(&self, step_name: &str) -> Option<&str> {
        self.get_step_output(step_name).and_then(|v| v.as_str())
    }

    pub fn record(&mut self, result: StepResult) {
        self.history.push(result);
    }

    /// Outputs of every succeeded step, for the workflow record.
    pub fn outputs(&self) -> BTreeMap<String, Value> {
        self.step_outputs
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
