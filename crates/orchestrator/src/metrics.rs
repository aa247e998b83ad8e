use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref WORKFLOWS_STARTED: IntCounter = register_int_counter!(
        "orchestrator_workflows_started_total",
        "Total number of accepted workflow start requests."
    )
    .unwrap();
    pub static ref WORKFLOWS_FINISHED: IntCounterVec = register_int_counter_vec!(
        "orchestrator_workflows_finished_total",
        "Total number of workflows that reached a terminal status.",
        &["status"]
    )
    .unwrap();
    pub static ref WORKFLOWS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "orchestrator_workflows_in_flight",
        "Number of workflows currently being executed."
    )
    .unwrap();
    pub static ref STEP_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "orchestrator_step_attempts_total",
        "Total number of step attempts by outcome.",
        &["outcome"]
    )
    .unwrap();
}

// Text exposition of the default registry
pub fn gather_metrics() -> crate::Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| crate::Error::Internal(e.to_string()))
}
