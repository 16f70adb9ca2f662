//! Fire-and-forget notices for whoever renders the workflow.
//!
//! Notices are one-shot signals (step changes, progress lines, prompts).
//! Durable state is read from the `watch` subscriptions instead; a
//! subscriber that lags simply misses notices.

use postwise_core::analysis::{AnalysisQuality, NarrativeJobStatus};
use postwise_core::types::JobId;
use postwise_core::workflow::{ExportFormat, WorkflowStep};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// WorkflowNotice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowNotice {
    StepChanged {
        from: WorkflowStep,
        to: WorkflowStep,
    },
    AnalysisProgress {
        job_id: JobId,
        phase: String,
        message: String,
    },
    AnalysisCompleted {
        job_id: JobId,
        quality: AnalysisQuality,
    },
    AnalysisFailed {
        reason: String,
    },
    NarrativeSettled {
        job_id: JobId,
        status: NarrativeJobStatus,
    },
    /// The site yielded too few CTAs; offer manual entry.
    ManualCtaPrompt {
        organization_id: String,
        cta_count: usize,
    },
    AuthRequired {
        action: String,
    },
    Exported {
        format: ExportFormat,
    },
}

// ---------------------------------------------------------------------------
// NoticeBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 256;

/// Cloneable handle to the notice broadcast channel.
#[derive(Clone)]
pub struct NoticeBus {
    sender: broadcast::Sender<WorkflowNotice>,
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if nobody listens.
    pub fn publish(&self, notice: WorkflowNotice) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowNotice> {
        self.sender.subscribe()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
