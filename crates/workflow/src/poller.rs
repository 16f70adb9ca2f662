//! Fixed-interval pollers for job status and narrative status.
//!
//! Both loops sleep one interval before each request, stop on a terminal
//! answer, and report exhaustion after `max_attempts`. Request errors are
//! logged and count as an attempt.

use std::sync::Arc;

use postwise_backend::AnalysisBackend;
use postwise_core::types::JobId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{AggregatorInput, PollSettings};

pub(crate) async fn poll_job_status(
    backend: Arc<dyn AnalysisBackend>,
    job_id: JobId,
    settings: PollSettings,
    tx: mpsc::Sender<AggregatorInput>,
    cancel: CancellationToken,
) {
    let mut reachable = false;

    for attempt in 1..=settings.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(settings.interval) => {}
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = backend.job_status(&job_id) => result,
        };

        match result {
            Ok(status) => {
                reachable = true;
                let terminal = status.is_terminal();
                if tx
                    .send(AggregatorInput::JobStatus { attempt, status })
                    .await
                    .is_err()
                    || terminal
                {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, attempt, error = %e, "Job status poll failed");
            }
        }
    }

    tracing::warn!(
        job_id = %job_id,
        attempts = settings.max_attempts,
        reachable,
        "Job status polling exhausted",
    );
    let _ = tx
        .send(AggregatorInput::JobPollExhausted {
            attempts: settings.max_attempts,
            reachable,
        })
        .await;
}

pub(crate) async fn poll_narrative(
    backend: Arc<dyn AnalysisBackend>,
    organization_id: String,
    settings: PollSettings,
    tx: mpsc::Sender<AggregatorInput>,
    cancel: CancellationToken,
) {
    for attempt in 1..=settings.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(settings.interval) => {}
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = backend.narrative_status(&organization_id) => result,
        };

        let input = match result {
            Ok(status) => {
                tracing::debug!(
                    organization_id = %organization_id,
                    attempt,
                    status = ?status.status,
                    "Narrative status polled",
                );
                let terminal = status.is_terminal();
                if tx
                    .send(AggregatorInput::NarrativePoll { attempt, status })
                    .await
                    .is_err()
                    || terminal
                {
                    return;
                }
                continue;
            }
            Err(e) => {
                tracing::warn!(organization_id = %organization_id, attempt, error = %e, "Narrative poll failed");
                AggregatorInput::NarrativePollFailed { attempt }
            }
        };
        if tx.send(input).await.is_err() {
            return;
        }
    }

    tracing::warn!(
        organization_id = %organization_id,
        attempts = settings.max_attempts,
        "Narrative polling exhausted",
    );
    let _ = tx
        .send(AggregatorInput::NarrativePollExhausted {
            attempts: settings.max_attempts,
        })
        .await;
}
