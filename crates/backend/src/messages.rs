//! Wire types for the analysis backend.
//!
//! Feed frames are JSON objects of the shape
//! `{"jobId": "...", "type": "<kind>", ...fields}`. The envelope and the
//! event are decoded separately so the event enum stays free of routing
//! data. REST request/response bodies live here as well.

use postwise_core::analysis::AnalysisPayload;
use postwise_core::cta::{CallToAction, ManualCtaInput};
use postwise_core::events::{AnalysisEvent, StreamMessage};
use postwise_core::scenario::Scenario;
use postwise_core::types::JobId;
use postwise_core::workflow::{ExportFormat, Topic};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event feed
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "jobId")]
    job_id: JobId,
}

/// Parse a raw feed frame into a [`StreamMessage`].
///
/// Fails on malformed JSON, a missing `jobId`, or an unknown event type.
pub fn parse_stream_message(text: &str) -> Result<StreamMessage, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let Envelope { job_id } = Envelope::deserialize(&value)?;
    let event = AnalysisEvent::deserialize(value)?;
    Ok(StreamMessage { job_id, event })
}

// ---------------------------------------------------------------------------
// REST bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StartJobRequest<'a> {
    pub url: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobResponse {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CtaListResponse {
    pub ctas: Vec<CallToAction>,
    /// Advisory only; sufficiency is recomputed from the returned list.
    pub has_sufficient_ctas: bool,
}

#[derive(Debug, Serialize)]
pub struct ManualCtaRequest<'a> {
    pub ctas: &'a [ManualCtaInput],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualCtaResponse {
    pub success: bool,
    #[serde(default)]
    pub ctas_added: usize,
}

/// Context sent with topic generation: the analysis plus the chosen strategy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRequest {
    pub analysis: AnalysisPayload,
    pub strategy: Scenario,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicsResponse {
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub analysis: AnalysisPayload,
    pub strategy: Scenario,
    pub topic: Topic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentResponse {
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub filename: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecentAnalysisResponse {
    pub analysis: Option<AnalysisPayload>,
}
