//! Per-job event aggregation.
//!
//! [`Aggregator::track`] starts one reducer task per analysis job. Three
//! kinds of producers feed it through a single `mpsc` channel: the event
//! feed consumer, the job-status poller (started only if the feed is
//! unavailable or closes before the job completes) and the narrative
//! poller (started once the job succeeds while the narrative is still
//! being generated). The reducer is the only writer of the shared
//! [`AnalysisStore`], which readers observe through a `watch` channel.
//!
//! Every producer and the reducer hold a child of the job's
//! [`CancellationToken`]. Abandoning the job cancels the token; the
//! reducer checks it before each mutation and producers drop their
//! in-flight requests.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use postwise_backend::AnalysisBackend;
use postwise_core::analysis::AnalysisPayload;
use postwise_core::cta::CallToAction;
use postwise_core::events::{
    AnalysisEvent, JobStatusResponse, NarrativeStatusResponse, StreamMessage,
};
use postwise_core::store::{AnalysisStore, Applied, IgnoreReason, JobCompletion};
use postwise_core::types::JobId;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::notices::{NoticeBus, WorkflowNotice};
use crate::poller;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub job_poll: PollSettings,
    pub narrative_poll: PollSettings,
    /// Capacity of the reducer's input channel.
    pub input_capacity: usize,
}

impl From<&WorkflowConfig> for AggregatorConfig {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            job_poll: PollSettings {
                interval: config.job_poll_interval,
                max_attempts: config.job_max_attempts,
            },
            narrative_poll: PollSettings {
                interval: config.narrative_poll_interval,
                max_attempts: config.narrative_max_attempts,
            },
            input_capacity: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Reducer inputs
// ---------------------------------------------------------------------------

/// Everything a job's producers can hand to its reducer.
#[derive(Debug)]
pub(crate) enum AggregatorInput {
    Stream(StreamMessage),
    FeedUnavailable { error: String },
    FeedClosed,
    JobStatus { attempt: u32, status: JobStatusResponse },
    JobPollExhausted { attempts: u32, reachable: bool },
    NarrativePoll { attempt: u32, status: NarrativeStatusResponse },
    NarrativePollFailed { attempt: u32 },
    NarrativePollExhausted { attempts: u32 },
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Owner of the shared analysis store.
pub struct Aggregator {
    backend: Arc<dyn AnalysisBackend>,
    config: AggregatorConfig,
    store: Arc<watch::Sender<AnalysisStore>>,
    notices: NoticeBus,
}

/// Handle returned by [`Aggregator::track`].
pub struct TrackedJob {
    pub job_id: JobId,
    cancel: CancellationToken,
    completion: oneshot::Receiver<JobCompletion>,
}

impl TrackedJob {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the job's terminal outcome. Returns
    /// [`WorkflowError::Cancelled`] if the job was abandoned first.
    pub async fn wait(self) -> Result<JobCompletion, WorkflowError> {
        self.completion.await.map_err(|_| WorkflowError::Cancelled)
    }
}

impl Aggregator {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        config: AggregatorConfig,
        notices: NoticeBus,
    ) -> Self {
        let (store, _) = watch::channel(AnalysisStore::new());
        Self {
            backend,
            config,
            store: Arc::new(store),
            notices,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisStore> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> AnalysisStore {
        self.store.borrow().clone()
    }

    /// Begin accumulating `job_id`, replacing whatever the store held, and
    /// spawn its feed consumer and reducer. The job is cancelled when
    /// `parent` is.
    pub fn track(
        &self,
        job_id: JobId,
        url: impl Into<String>,
        parent: &CancellationToken,
    ) -> TrackedJob {
        let cancel = parent.child_token();
        let url = url.into();
        self.store
            .send_modify(|store| store.begin_job(job_id.clone(), url));

        let (input_tx, input_rx) = mpsc::channel(self.config.input_capacity);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(consume_feed(
            Arc::clone(&self.backend),
            job_id.clone(),
            input_tx.clone(),
            cancel.child_token(),
        ));

        let reducer = JobReducer {
            job_id: job_id.clone(),
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            notices: self.notices.clone(),
            cancel: cancel.clone(),
            input_tx,
            done: Some(done_tx),
            job_poll: None,
            narrative_poll: None,
        };
        tokio::spawn(reducer.run(input_rx));

        tracing::info!(job_id = %job_id, "Tracking analysis job");
        TrackedJob {
            job_id,
            cancel,
            completion: done_rx,
        }
    }

    /// Stop accepting inputs for `job_id`, keeping what was accumulated.
    pub fn abandon(&self, job_id: &JobId) {
        self.store.send_if_modified(|store| {
            if store.active_job() == Some(job_id) {
                store.abandon();
                true
            } else {
                false
            }
        });
    }

    pub fn clear(&self) {
        self.store.send_modify(AnalysisStore::clear);
    }

    /// Load a previously completed analysis while no job is running.
    pub fn hydrate(&self, payload: &AnalysisPayload) -> bool {
        mutate(&self.store, |store| store.hydrate(payload)).is_mutation()
    }

    pub fn merge_ctas(&self, organization_id: &str, ctas: &[CallToAction]) -> bool {
        mutate(&self.store, |store| store.merge_ctas(organization_id, ctas)).is_mutation()
    }
}

/// Apply `f` and notify observers only if it changed something.
fn mutate(
    store: &watch::Sender<AnalysisStore>,
    f: impl FnOnce(&mut AnalysisStore) -> Applied,
) -> Applied {
    let mut applied = Applied::Ignored(IgnoreReason::Empty);
    store.send_if_modified(|store| {
        applied = f(store);
        applied.is_mutation()
    });
    applied
}

// ---------------------------------------------------------------------------
// Feed consumer
// ---------------------------------------------------------------------------

async fn consume_feed(
    backend: Arc<dyn AnalysisBackend>,
    job_id: JobId,
    tx: mpsc::Sender<AggregatorInput>,
    cancel: CancellationToken,
) {
    let subscribed = tokio::select! {
        _ = cancel.cancelled() => return,
        result = backend.subscribe(&job_id) => result,
    };
    let mut feed = match subscribed {
        Ok(feed) => feed,
        Err(e) => {
            let _ = tx
                .send(AggregatorInput::FeedUnavailable {
                    error: e.to_string(),
                })
                .await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, "Feed consumer cancelled");
                return;
            }
            next = feed.next() => match next {
                Some(message) => {
                    if tx.send(AggregatorInput::Stream(message)).await.is_err() {
                        return;
                    }
                }
                None => {
                    let _ = tx.send(AggregatorInput::FeedClosed).await;
                    return;
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Reducer task
// ---------------------------------------------------------------------------

struct JobReducer {
    job_id: JobId,
    backend: Arc<dyn AnalysisBackend>,
    config: AggregatorConfig,
    store: Arc<watch::Sender<AnalysisStore>>,
    notices: NoticeBus,
    cancel: CancellationToken,
    input_tx: mpsc::Sender<AggregatorInput>,
    done: Option<oneshot::Sender<JobCompletion>>,
    job_poll: Option<CancellationToken>,
    narrative_poll: Option<CancellationToken>,
}

impl JobReducer {
    async fn run(mut self, mut inputs: mpsc::Receiver<AggregatorInput>) {
        loop {
            let input = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(job_id = %self.job_id, "Analysis job abandoned");
                    break;
                }
                input = inputs.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
            };

            if self.cancel.is_cancelled() {
                break;
            }
            self.handle(input);
            if !self.owns_store() {
                tracing::debug!(job_id = %self.job_id, "Analysis store frozen");
                break;
            }
        }
        // Stops any producer still running for this job.
        self.cancel.cancel();
    }

    fn owns_store(&self) -> bool {
        self.store.borrow().active_job() == Some(&self.job_id)
    }

    fn handle(&mut self, input: AggregatorInput) {
        let job_id = self.job_id.clone();
        let applied = match input {
            AggregatorInput::Stream(message) => {
                let applied = mutate(&self.store, |store| store.apply(&message));
                tracing::debug!(
                    job_id = %message.job_id,
                    event = message.event.kind(),
                    ?applied,
                    "Analysis event reduced",
                );
                if let (
                    Applied::Merged,
                    AnalysisEvent::ScrapePhase {
                        phase,
                        message: text,
                        ..
                    },
                ) = (&applied, &message.event)
                {
                    self.notices.publish(WorkflowNotice::AnalysisProgress {
                        job_id: job_id.clone(),
                        phase: phase.clone(),
                        message: text.clone(),
                    });
                }
                applied
            }
            AggregatorInput::FeedUnavailable { error } => {
                tracing::warn!(job_id = %job_id, error = %error, "Event feed unavailable; polling job status");
                self.start_job_poll();
                return;
            }
            AggregatorInput::FeedClosed => {
                if self.store.borrow().completion().is_none() {
                    tracing::warn!(job_id = %job_id, "Event feed closed before completion; polling job status");
                    self.start_job_poll();
                }
                return;
            }
            AggregatorInput::JobStatus { attempt, status } => {
                tracing::debug!(job_id = %job_id, attempt, status = ?status.status, "Job status received");
                mutate(&self.store, |store| store.apply_job_status(&job_id, &status))
            }
            AggregatorInput::JobPollExhausted {
                attempts,
                reachable,
            } => mutate(&self.store, |store| {
                store.job_poll_exhausted(&job_id, attempts, reachable)
            }),
            AggregatorInput::NarrativePoll { attempt, status } => mutate(&self.store, |store| {
                store.apply_narrative_poll(&job_id, attempt, &status)
            }),
            AggregatorInput::NarrativePollFailed { attempt } => {
                mutate(&self.store, |store| store.narrative_poll_errored(&job_id, attempt))
            }
            AggregatorInput::NarrativePollExhausted { attempts } => {
                mutate(&self.store, |store| store.narrative_timed_out(&job_id, attempts))
            }
        };
        self.react(applied);
    }

    fn react(&mut self, applied: Applied) {
        match applied {
            Applied::Completed(completion) => {
                tracing::info!(job_id = %self.job_id, ?completion, "Analysis job finished");
                if let Some(token) = self.job_poll.take() {
                    token.cancel();
                }
                if let Some(done) = self.done.take() {
                    let _ = done.send(completion.clone());
                }
                if completion.is_success() {
                    self.start_narrative_poll();
                }
            }
            Applied::NarrativeSettled(status) => {
                if let Some(token) = self.narrative_poll.take() {
                    token.cancel();
                }
                tracing::info!(job_id = %self.job_id, ?status, "Narrative settled");
                self.notices.publish(WorkflowNotice::NarrativeSettled {
                    job_id: self.job_id.clone(),
                    status,
                });
            }
            Applied::Buffered { index } => {
                tracing::debug!(job_id = %self.job_id, index, "Enrichment buffered until its scenario arrives");
            }
            Applied::Ignored(IgnoreReason::IndexOutOfRange) => {
                tracing::warn!(job_id = %self.job_id, "Scenario event index out of range; dropped");
            }
            Applied::Ignored(reason) => {
                tracing::debug!(job_id = %self.job_id, ?reason, "Input ignored");
            }
            Applied::Merged => {}
        }
    }

    fn start_job_poll(&mut self) {
        if self.job_poll.is_some() {
            return;
        }
        let token = self.cancel.child_token();
        self.job_poll = Some(token.clone());
        tokio::spawn(poller::poll_job_status(
            Arc::clone(&self.backend),
            self.job_id.clone(),
            self.config.job_poll,
            self.input_tx.clone(),
            token,
        ));
    }

    fn start_narrative_poll(&mut self) {
        let organization_id = {
            let store = self.store.borrow();
            if !store.narrative_generating() {
                return;
            }
            store.result().organization_id.clone()
        };
        let Some(organization_id) = organization_id else {
            return;
        };
        if self.narrative_poll.is_some() {
            return;
        }
        let token = self.cancel.child_token();
        self.narrative_poll = Some(token.clone());
        tokio::spawn(poller::poll_narrative(
            Arc::clone(&self.backend),
            organization_id,
            self.config.narrative_poll,
            self.input_tx.clone(),
            token,
        ));
    }
}
