//! Analysis job events and poll responses.
//!
//! These are the inputs the [`AnalysisStore`](crate::store::AnalysisStore)
//! reduces. The stream variants mirror the backend's event feed; the poll
//! responses come from the job-status and narrative-status endpoints.

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisPayload, ScrapePreview};
use crate::scenario::{Scenario, ScenarioImage, ScenarioPatch};
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Stream events
// ---------------------------------------------------------------------------

/// A single event from an analysis job's feed, tagged with its job.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub job_id: JobId,
    pub event: AnalysisEvent,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AnalysisEvent {
    ScrapePhase {
        phase: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        url: Option<String>,
    },
    ScrapeResult {
        content: ScrapePreview,
    },
    AnalysisResult {
        content: AnalysisPayload,
    },
    /// Audience fields for one scenario. Without an index it is appended.
    AudienceComplete {
        #[serde(default)]
        index: Option<usize>,
        content: ScenarioPatch,
    },
    AudiencesResult {
        content: Vec<Scenario>,
    },
    PitchComplete {
        index: usize,
        content: ScenarioPatch,
    },
    PitchesResult {
        content: Vec<Scenario>,
    },
    ScenarioImageComplete {
        index: usize,
        content: ScenarioImage,
    },
    /// Authoritative final scenario list.
    ScenariosResult {
        content: Vec<Scenario>,
    },
    BusinessProfile {
        content: serde_json::Value,
    },
    NarrativeComplete {
        content: NarrativePayload,
    },
    Complete {
        content: AnalysisCompletion,
    },
    Error {
        message: String,
    },
}

impl AnalysisEvent {
    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScrapePhase { .. } => "scrape-phase",
            Self::ScrapeResult { .. } => "scrape-result",
            Self::AnalysisResult { .. } => "analysis-result",
            Self::AudienceComplete { .. } => "audience-complete",
            Self::AudiencesResult { .. } => "audiences-result",
            Self::PitchComplete { .. } => "pitch-complete",
            Self::PitchesResult { .. } => "pitches-result",
            Self::ScenarioImageComplete { .. } => "scenario-image-complete",
            Self::ScenariosResult { .. } => "scenarios-result",
            Self::BusinessProfile { .. } => "business-profile",
            Self::NarrativeComplete { .. } => "narrative-complete",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NarrativePayload {
    pub narrative: Option<String>,
    pub narrative_confidence: Option<f64>,
    pub key_insights: Vec<String>,
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Terminal summary of a job, carried by the `complete` event and by a
/// succeeded/failed job-status response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisCompletion {
    pub success: bool,
    pub analysis: Option<AnalysisPayload>,
    pub fallback_analysis: Option<AnalysisPayload>,
    pub error: Option<String>,
}

/// How a completion should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionOutcome<'a> {
    /// Full pipeline succeeded; the payload may be absent when everything
    /// already arrived through the stream.
    Enhanced(Option<&'a AnalysisPayload>),
    /// Enrichment failed but a basic analysis is available.
    Degraded(&'a AnalysisPayload),
    Failed(&'a str),
}

impl AnalysisCompletion {
    pub fn outcome(&self) -> CompletionOutcome<'_> {
        if self.success {
            return CompletionOutcome::Enhanced(self.analysis.as_ref());
        }
        match &self.fallback_analysis {
            Some(fallback) => CompletionOutcome::Degraded(fallback),
            None => CompletionOutcome::Failed(
                self.error.as_deref().unwrap_or("Analysis failed"),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Poll responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// Response of the job-status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub status: JobState,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub result: Option<AnalysisCompletion>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusResponse {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobState::Succeeded | JobState::Failed)
    }

    /// Completion implied by a terminal status, if any.
    pub fn completion(&self) -> Option<AnalysisCompletion> {
        match self.status {
            JobState::Queued | JobState::Running => None,
            JobState::Succeeded => Some(self.result.clone().unwrap_or(AnalysisCompletion {
                success: true,
                ..AnalysisCompletion::default()
            })),
            JobState::Failed => {
                let mut completion = self.result.clone().unwrap_or_default();
                completion.success = false;
                if completion.error.is_none() {
                    completion.error = self.error.clone();
                }
                Some(completion)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativePollStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

/// Response of the narrative-status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeStatusResponse {
    pub status: NarrativePollStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub narrative_confidence: Option<f64>,
    #[serde(default)]
    pub key_insights: Vec<String>,
}

impl NarrativeStatusResponse {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            NarrativePollStatus::Ready | NarrativePollStatus::Failed
        )
    }
}
