//! Collaborator services
//!
//! Outbound HTTP calls to the transcription, meeting minutes, and file
//! management services, and the pipeline that strings them together.

pub mod client;
pub mod pipeline;

pub use client::{CollaboratorClient, CollaboratorHealth, Service};
pub use pipeline::{minutes_pipeline, CollaboratorCall, CollaboratorStep, PipelineDefaults};
