mod memory;
mod models;

pub use memory::MemoryStore;
pub use models::*;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::workflow::WorkflowStatus;

#[async_trait]
pub trait Store: Send + Sync {
    // Allocate a pending workflow with one placeholder per declared step
    async fn create(&self, request: WorkflowRequest) -> crate::Result<Uuid>;

    // Step operations
    async fn update_step(&self, id: Uuid, ordinal: usize, result: StepResult) -> crate::Result<()>;

    // Workflow operations
    async fn set_status(&self, id: Uuid, status: WorkflowStatus, error: Option<String>) -> crate::Result<()>;
    async fn set_outputs(&self, id: Uuid, outputs: BTreeMap<String, JsonValue>) -> crate::Result<()>;
    async fn get(&self, id: Uuid) -> crate::Result<Workflow>;
    async fn list(&self, status: Option<WorkflowStatus>, limit: usize) -> crate::Result<Vec<WorkflowSummary>>;
}
