pub mod collaborators;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod server;
pub mod store;
pub mod workflow;

use thiserror::Error;

use crate::workflow::WorkflowStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
    #[error("Workflow {0} is already finished")]
    Finished(String),
    #[error("Collaborator error: {0}")]
    Collaborator(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Message recorded on a failed step: collaborator errors already name
    /// the service and endpoint, so they go without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::Collaborator(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
