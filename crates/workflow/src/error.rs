use postwise_backend::BackendError;
use postwise_core::error::CoreError;

/// Why an analysis ended without a usable result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisFailureReason {
    #[error("could not start analysis job: {0}")]
    JobStartFailed(String),

    #[error("{0}")]
    BackendReportedFailure(String),

    #[error("event feed and job status endpoint are both unavailable")]
    StreamAndPollUnavailable,

    #[error("analysis job did not finish after {attempts} status checks")]
    JobTimedOut { attempts: u32 },

    #[error("analysis was cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Analysis failed: {reason}")]
    AnalysisFailure { reason: AnalysisFailureReason },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Operation cancelled")]
    Cancelled,
}
