//! The meeting minutes pipeline: which collaborator each step calls, what it
//! sends, and which field of the reply becomes the step's output reference.

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    collaborators::{CollaboratorClient, Service},
    workflow::{RetryPolicy, StepAction, StepRegistry, StepSpec, WorkflowContext},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorCall {
    Transcribe,
    FormatTranscript,
    GenerateMinutes,
    CreateOutputFolder,
    SaveTranscript,
    SaveMinutesDocx,
    SaveMinutesHtml,
    CopySourceArtifact,
    CreateWorkflowSummary,
    CreateArchive,
    CleanupInput,
}

impl CollaboratorCall {
    pub fn step_name(&self) -> &'static str {
        match self {
            CollaboratorCall::Transcribe => "transcription",
            CollaboratorCall::FormatTranscript => "format_transcript",
            CollaboratorCall::GenerateMinutes => "generate_minutes",
            CollaboratorCall::CreateOutputFolder => "create_output_folder",
            CollaboratorCall::SaveTranscript => "save_transcript",
            CollaboratorCall::SaveMinutesDocx => "save_minutes_docx",
            CollaboratorCall::SaveMinutesHtml => "save_minutes_html",
            CollaboratorCall::CopySourceArtifact => "copy_source_artifact",
            CollaboratorCall::CreateWorkflowSummary => "create_workflow_summary",
            CollaboratorCall::CreateArchive => "create_archive",
            CollaboratorCall::CleanupInput => "cleanup_input",
        }
    }

    pub fn service(&self) -> Service {
        match self {
            CollaboratorCall::Transcribe | CollaboratorCall::FormatTranscript => Service::Transcription,
            CollaboratorCall::GenerateMinutes => Service::MeetingMinutes,
            _ => Service::FileManagement,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            CollaboratorCall::Transcribe => "/transcribe",
            CollaboratorCall::FormatTranscript => "/format-transcript",
            CollaboratorCall::GenerateMinutes => "/generate-minutes",
            CollaboratorCall::CreateOutputFolder => "/create-dated-folder",
            CollaboratorCall::SaveTranscript => "/save-transcript",
            CollaboratorCall::SaveMinutesDocx => "/save-meeting-minutes-docx",
            CollaboratorCall::SaveMinutesHtml => "/save-meeting-minutes-html",
            CollaboratorCall::CopySourceArtifact => "/copy-video",
            CollaboratorCall::CreateWorkflowSummary => "/create-workflow-summary",
            CollaboratorCall::CreateArchive => "/zip-output-folder",
            CollaboratorCall::CleanupInput => "/delete-input-file",
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(match self {
            CollaboratorCall::Transcribe => 600,
            CollaboratorCall::FormatTranscript => 60,
            CollaboratorCall::GenerateMinutes => 180,
            CollaboratorCall::CreateOutputFolder => 30,
            CollaboratorCall::SaveTranscript => 60,
            CollaboratorCall::SaveMinutesDocx => 120,
            CollaboratorCall::SaveMinutesHtml => 60,
            CollaboratorCall::CopySourceArtifact => 120,
            CollaboratorCall::CreateWorkflowSummary => 60,
            CollaboratorCall::CreateArchive => 120,
            CollaboratorCall::CleanupInput => 30,
        })
    }

    /// Reply field carried forward as the output reference.
    pub fn output_field(&self) -> &'static str {
        match self {
            CollaboratorCall::Transcribe | CollaboratorCall::GenerateMinutes => "data",
            CollaboratorCall::FormatTranscript => "formatted_text",
            CollaboratorCall::CreateOutputFolder => "folder_path",
            CollaboratorCall::CreateArchive => "zip_path",
            CollaboratorCall::CleanupInput => "message",
            _ => "file_path",
        }
    }

    /// Build the request body from the request and upstream outputs.
    pub fn payload(&self, ctx: &WorkflowContext, defaults: &PipelineDefaults) -> Value {
        let request = &ctx.request;
        match self {
            CollaboratorCall::Transcribe => json!({
                "video_path": request.source_path,
                "language": request.language,
                "word_timestamps": true,
            }),
            CollaboratorCall::FormatTranscript => json!({
                "transcript_data": ctx
                    .get_step_output(CollaboratorCall::Transcribe.step_name())
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
            }),
            CollaboratorCall::GenerateMinutes => json!({
                "transcription_text": transcript_text(ctx),
                "meeting_title": request.title,
                "meeting_date": request.date,
            }),
            CollaboratorCall::CreateOutputFolder => json!({
                "meeting_title": request.title,
                "meeting_date": request.date,
            }),
            CollaboratorCall::SaveTranscript => json!({
                "transcript_text": transcript_text(ctx),
                "output_folder": output_folder(ctx, defaults),
                "filename": "transcript.txt",
            }),
            CollaboratorCall::SaveMinutesDocx => json!({
                "meeting_data": meeting_data(ctx),
                "output_folder": output_folder(ctx, defaults),
                "filename": "meeting_minutes.docx",
            }),
            CollaboratorCall::SaveMinutesHtml => json!({
                "meeting_data": meeting_data(ctx),
                "output_folder": output_folder(ctx, defaults),
                "filename": "meeting_minutes.html",
            }),
            CollaboratorCall::CopySourceArtifact => json!({
                "video_path": request.source_path,
                "output_folder": output_folder(ctx, defaults),
            }),
            CollaboratorCall::CreateWorkflowSummary => json!({
                "output_folder": output_folder(ctx, defaults),
                "workflow_data": {
                    "workflow_id": ctx.workflow_id,
                    "video_path": request.source_path,
                    "meeting_title": request.title,
                    "meeting_date": request
                        .date
                        .clone()
                        .unwrap_or_else(|| Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()),
                    "language": request.language,
                    "steps": ctx.history,
                },
            }),
            CollaboratorCall::CreateArchive => json!({
                "output_folder": output_folder(ctx, defaults),
                "meeting_title": request.title,
            }),
            CollaboratorCall::CleanupInput => json!({
                "video_path": request.source_path,
            }),
        }
    }

    pub fn output(&self, reply: &Value) -> Option<Value> {
        reply
            .get(self.output_field())
            .filter(|v| !v.is_null())
            .cloned()
    }
}

/// Formatted transcript, else the raw transcription text, else empty.
fn transcript_text(ctx: &WorkflowContext) -> String {
    ctx.get_step_str(CollaboratorCall::FormatTranscript.step_name())
        .or_else(|| {
            ctx.get_step_output(CollaboratorCall::Transcribe.step_name())
                .and_then(|data| data.get("text"))
                .and_then(Value::as_str)
        })
        .unwrap_or_default()
        .to_string()
}

fn meeting_data(ctx: &WorkflowContext) -> Value {
    ctx.get_step_output(CollaboratorCall::GenerateMinutes.step_name())
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn output_folder(ctx: &WorkflowContext, defaults: &PipelineDefaults) -> String {
    ctx.get_step_str(CollaboratorCall::CreateOutputFolder.step_name())
        .map(str::to_string)
        .unwrap_or_else(|| defaults.output_dir.to_string_lossy().into_owned())
}

/// Fallback values for missing upstream references.
#[derive(Debug, Clone)]
pub struct PipelineDefaults {
    pub output_dir: PathBuf,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
        }
    }
}

pub struct CollaboratorStep {
    call: CollaboratorCall,
    client: Arc<CollaboratorClient>,
    defaults: Arc<PipelineDefaults>,
}

impl CollaboratorStep {
    pub fn new(call: CollaboratorCall, client: Arc<CollaboratorClient>, defaults: Arc<PipelineDefaults>) -> Self {
        Self { call, client, defaults }
    }
}

#[async_trait]
impl StepAction for CollaboratorStep {
    async fn run(&self, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let payload = self.call.payload(ctx, &self.defaults);
        let reply = self
            .client
            .call(self.call.service(), self.call.path(), &payload, self.call.timeout())
            .await?;
        Ok(self.call.output(&reply))
    }
}

/// The default pipeline, in execution order.
pub fn minutes_pipeline(
    client: Arc<CollaboratorClient>,
    defaults: PipelineDefaults,
    retry: RetryPolicy,
) -> Result<StepRegistry> {
    use CollaboratorCall::*;

    let defaults = Arc::new(defaults);
    let step = |call: CollaboratorCall| -> Arc<dyn StepAction> {
        Arc::new(CollaboratorStep::new(call, client.clone(), defaults.clone()))
    };
    let required = |call: CollaboratorCall| StepSpec::required(call.step_name(), step(call));
    let optional = |call: CollaboratorCall| StepSpec::optional(call.step_name(), step(call));

    let registry = StepRegistry::new(vec![
        required(Transcribe),
        required(FormatTranscript),
        required(GenerateMinutes),
        required(CreateOutputFolder),
        required(SaveTranscript),
        required(SaveMinutesDocx),
        required(SaveMinutesHtml),
        optional(CopySourceArtifact).only_when(|r| r.copy_artifact),
        optional(CreateWorkflowSummary),
        optional(CreateArchive),
        optional(CleanupInput).only_when(|r| r.delete_source),
    ])?;

    Ok(registry.with_retry(retry))
}
