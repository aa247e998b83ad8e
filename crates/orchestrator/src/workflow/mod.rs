pub mod context;
pub mod executor;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod state;

pub use context::WorkflowContext;
pub use executor::StepExecutor;
pub use registry::{Requirement, StepAction, StepGate, StepRegistry, StepSpec};
pub use retry::RetryPolicy;
pub use runner::WorkflowRunner;
pub use state::{SkipReason, StepStatus, WorkflowStatus};
