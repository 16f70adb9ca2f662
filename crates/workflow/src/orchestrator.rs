//! The workflow orchestrator: the single entry point a front end drives.
//!
//! Owns the [`WorkflowState`] (published on a `watch` channel), the
//! [`Aggregator`] for analysis jobs, and the CTA and auth gates. Every
//! step change goes through [`WorkflowState::apply`]; backend calls are
//! made before the transition they enable so a failed call never leaves
//! the state half-updated.

use std::sync::Arc;

use postwise_backend::messages::{ContentRequest, ExportArtifact, ExportRequest, TopicRequest};
use postwise_backend::AnalysisBackend;
use postwise_core::analysis::AnalysisQuality;
use postwise_core::cta::{CtaSufficiency, ManualCtaInput};
use postwise_core::error::CoreError;
use postwise_core::scenario::Scenario;
use postwise_core::store::{AnalysisStore, JobCompletion};
use postwise_core::types::JobId;
use postwise_core::url::normalize_website_url;
use postwise_core::workflow::{
    AuthContext, ExportFormat, GeneratedContent, PostState, SelectedStrategy, Topic, UserSession,
    WorkflowCommand, WorkflowState, WorkflowStep, CONTENT_STEPS,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::aggregator::{Aggregator, AggregatorConfig};
use crate::auth::{AuthGate, Gated, PendingAction};
use crate::config::WorkflowConfig;
use crate::cta_gate::{CtaGate, ManualCtaReceipt};
use crate::error::{AnalysisFailureReason, WorkflowError};
use crate::notices::{NoticeBus, WorkflowNotice};

struct ActiveJob {
    job_id: JobId,
    cancel: CancellationToken,
}

pub struct WorkflowOrchestrator {
    backend: Arc<dyn AnalysisBackend>,
    config: WorkflowConfig,
    state: watch::Sender<WorkflowState>,
    aggregator: Aggregator,
    cta_gate: CtaGate,
    auth_gate: AuthGate,
    notices: NoticeBus,
    shutdown: CancellationToken,
    active_job: Option<ActiveJob>,
}

impl WorkflowOrchestrator {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: WorkflowConfig) -> Self {
        let notices = NoticeBus::default();
        let auth = AuthContext {
            session: None,
            demo_mode: config.demo_mode,
        };
        let (state, _) = watch::channel(WorkflowState::new(auth));

        Self {
            aggregator: Aggregator::new(
                Arc::clone(&backend),
                AggregatorConfig::from(&config),
                notices.clone(),
            ),
            cta_gate: CtaGate::new(Arc::clone(&backend), notices.clone()),
            auth_gate: AuthGate::default(),
            backend,
            config,
            state,
            notices,
            shutdown: CancellationToken::new(),
            active_job: None,
        }
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn subscribe_state(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    pub fn subscribe_analysis(&self) -> watch::Receiver<AnalysisStore> {
        self.aggregator.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<WorkflowNotice> {
        self.notices.subscribe()
    }

    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    pub fn analysis(&self) -> AnalysisStore {
        self.aggregator.snapshot()
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.auth_gate.pending()
    }

    pub fn cta_prompt_shown(&self) -> bool {
        self.cta_gate.prompt_shown()
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Record a signed-in user. Returns the action that was waiting on
    /// authentication, if any, so the caller can resume it.
    pub fn sign_in(&mut self, session: UserSession) -> Option<PendingAction> {
        tracing::info!(user_id = %session.user_id, "User signed in");
        self.state
            .send_modify(|state| state.set_session(Some(session)));
        self.auth_gate.take_pending()
    }

    pub fn sign_out(&mut self) {
        self.state.send_modify(|state| state.set_session(None));
    }

    pub fn set_demo_mode(&mut self, demo_mode: bool) {
        self.state
            .send_modify(|state| state.set_demo_mode(demo_mode));
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// Validate `url`, start an analysis job and wait for its outcome.
    ///
    /// A degraded analysis still succeeds, with
    /// [`AnalysisQuality::Standard`]. The narrative may keep filling in
    /// after this returns.
    pub async fn start_analysis(&mut self, url: &str) -> Result<AnalysisQuality, WorkflowError> {
        let url = normalize_website_url(url)?;
        self.transition(WorkflowCommand::BeginAnalysis)?;
        self.abandon_active_job();
        self.aggregator.clear();
        self.cta_gate.reset();
        self.auth_gate.clear();

        tracing::info!(url = %url, "Starting analysis");
        let started = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            started = self.backend.start_analysis(&url) => Some(started),
        };
        let job_id = match started {
            Some(Ok(response)) => response.job_id,
            Some(Err(e)) => {
                let reason = AnalysisFailureReason::JobStartFailed(e.to_string());
                return Err(self.fail_analysis(reason));
            }
            None => return Err(self.fail_analysis(AnalysisFailureReason::Cancelled)),
        };

        let tracked = self.aggregator.track(job_id.clone(), url, &self.shutdown);
        self.active_job = Some(ActiveJob {
            job_id: job_id.clone(),
            cancel: tracked.cancel_token(),
        });

        let completion = match tracked.wait().await {
            Ok(completion) => completion,
            Err(_) => return Err(self.fail_analysis(AnalysisFailureReason::Cancelled)),
        };

        match completion {
            JobCompletion::Succeeded { quality } => {
                self.transition(WorkflowCommand::AnalysisSucceeded { quality })?;
                self.notices.publish(WorkflowNotice::AnalysisCompleted { job_id, quality });
                if let Err(e) = self.evaluate_ctas().await {
                    tracing::warn!(error = %e, "CTA evaluation failed");
                }
                Ok(quality)
            }
            JobCompletion::Failed { message } => Err(self.fail_analysis(
                AnalysisFailureReason::BackendReportedFailure(message),
            )),
            JobCompletion::TimedOut { attempts } => {
                Err(self.fail_analysis(AnalysisFailureReason::JobTimedOut { attempts }))
            }
            JobCompletion::Unreachable { .. } => {
                Err(self.fail_analysis(AnalysisFailureReason::StreamAndPollUnavailable))
            }
        }
    }

    /// Load the user's most recent completed analysis into the store.
    /// Returns `false` if there is none or a job is running.
    pub async fn load_recent_analysis(&mut self) -> Result<bool, WorkflowError> {
        if self.active_job_running() {
            return Ok(false);
        }
        let Some(payload) = self.backend.most_recent_analysis().await? else {
            tracing::debug!("No previous analysis to restore");
            return Ok(false);
        };
        let restored = self.aggregator.hydrate(&payload);
        tracing::info!(restored, "Previous analysis loaded");
        Ok(restored)
    }

    // -----------------------------------------------------------------------
    // CTAs
    // -----------------------------------------------------------------------

    /// Re-check CTA sufficiency for the analyzed organization. Returns
    /// `None` when the analysis produced no organization.
    pub async fn evaluate_ctas(&mut self) -> Result<Option<CtaSufficiency>, WorkflowError> {
        let Some(organization_id) = self.organization_id() else {
            return Ok(None);
        };
        let sufficiency = self.cta_gate.evaluate(&organization_id).await?;
        self.aggregator.merge_ctas(&organization_id, &sufficiency.ctas);
        Ok(Some(sufficiency))
    }

    pub async fn submit_manual_ctas(
        &mut self,
        inputs: Vec<ManualCtaInput>,
    ) -> Result<ManualCtaReceipt, WorkflowError> {
        let organization_id = self.organization_id().ok_or_else(|| {
            CoreError::Precondition("Analyze a website before adding CTAs".to_string())
        })?;
        let receipt = self.cta_gate.submit_manual(&organization_id, &inputs).await?;
        self.aggregator
            .merge_ctas(&organization_id, &receipt.sufficiency.ctas);
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Strategy and topics
    // -----------------------------------------------------------------------

    pub fn select_strategy(&mut self, index: usize) -> Result<Scenario, WorkflowError> {
        let scenario = self
            .aggregator
            .snapshot()
            .result()
            .scenario(index)
            .cloned()
            .ok_or_else(|| {
                CoreError::Precondition(format!("No strategy available at index {index}"))
            })?;

        self.transition(WorkflowCommand::SelectStrategy(SelectedStrategy {
            index,
            scenario: scenario.clone(),
        }))?;
        Ok(scenario)
    }

    /// Move to topic generation and request topics for the chosen strategy.
    /// On failure the workflow stays at topic generation with the error
    /// recorded, so the call can be retried.
    pub async fn continue_to_topics(&mut self) -> Result<Vec<Topic>, WorkflowError> {
        self.transition(WorkflowCommand::ContinueToTopics)?;
        self.generate_topics().await
    }

    /// Request topics again while at topic generation.
    pub async fn generate_topics(&mut self) -> Result<Vec<Topic>, WorkflowError> {
        let state = self.state();
        state.ensure_step(&[WorkflowStep::TopicGen], "generate topics")?;
        let strategy = self.selected_scenario(&state)?;

        tokio::select! {
            _ = self.shutdown.cancelled() => return Err(WorkflowError::Cancelled),
            _ = tokio::time::sleep(self.config.topic_settle_delay) => {}
        }

        let request = TopicRequest {
            analysis: self.aggregator.snapshot().result().to_payload(),
            strategy,
        };
        match self.backend.generate_topics(&request).await {
            Ok(topics) => {
                tracing::info!(count = topics.len(), "Topics generated");
                self.transition(WorkflowCommand::TopicsGenerated {
                    topics: topics.clone(),
                })?;
                Ok(topics)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Topic generation failed");
                self.transition(WorkflowCommand::TopicsFailed {
                    reason: e.to_string(),
                })?;
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    /// Generate a post for one of the offered topics. Requires auth.
    pub async fn generate_content(
        &mut self,
        topic_id: &str,
    ) -> Result<Gated<GeneratedContent>, WorkflowError> {
        let state = self.state();
        state.ensure_step(CONTENT_STEPS, "generate content")?;
        let topic = state.topic(topic_id).cloned().ok_or_else(|| {
            CoreError::Precondition(format!("Topic '{topic_id}' is not among the generated topics"))
        })?;
        let strategy = self.selected_scenario(&state)?;

        let context = serde_json::json!({ "topicId": topic_id });
        if let Some(pending) = self.gate("generate_content", context) {
            return Ok(Gated::AuthRequired(pending));
        }

        let request = ContentRequest {
            analysis: self.aggregator.snapshot().result().to_payload(),
            strategy,
            topic: topic.clone(),
        };
        match self.backend.generate_content(&request).await {
            Ok(content) => {
                tracing::info!(topic_id, "Content generated");
                self.transition(WorkflowCommand::ContentGenerated {
                    topic,
                    content: content.clone(),
                })?;
                Ok(Gated::Proceed(content))
            }
            Err(e) => {
                tracing::warn!(topic_id, error = %e, "Content generation failed");
                self.transition(WorkflowCommand::ContentFailed {
                    reason: e.to_string(),
                })?;
                Err(e.into())
            }
        }
    }

    pub fn edit_content(&mut self, body: impl Into<String>) -> Result<(), WorkflowError> {
        self.transition(WorkflowCommand::EditContent { body: body.into() })
    }

    /// Export the current draft. Requires auth; an exported post cannot be
    /// exported again until new content is generated.
    pub async fn export_as(
        &mut self,
        format: ExportFormat,
    ) -> Result<Gated<ExportArtifact>, WorkflowError> {
        let state = self.state();
        if state.post_state() == Some(PostState::Exported) {
            return Err(CoreError::Conflict("Post has already been exported".to_string()).into());
        }
        state.ensure_step(&[WorkflowStep::ContentEdit], "export")?;
        let content = state
            .generated_content()
            .cloned()
            .ok_or_else(|| CoreError::Precondition("No content to export".to_string()))?;

        if let Some(pending) = self.gate("export", serde_json::json!({ "format": format })) {
            return Ok(Gated::AuthRequired(pending));
        }

        let artifact = self
            .backend
            .export(&ExportRequest {
                format,
                title: content.title,
                content: content.body,
            })
            .await?;
        self.transition(WorkflowCommand::Exported { format })?;
        self.notices.publish(WorkflowNotice::Exported { format });
        tracing::info!(%format, filename = %artifact.filename, "Post exported");
        Ok(Gated::Proceed(artifact))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Return to the first step, abandoning any running job. The session
    /// and demo mode survive.
    pub fn reset_workflow(&mut self) {
        self.abandon_active_job();
        self.aggregator.clear();
        self.cta_gate.reset();
        self.auth_gate.clear();
        if let Err(e) = self.transition(WorkflowCommand::Reset) {
            tracing::error!(error = %e, "Reset transition rejected");
        }
    }

    /// Cancel everything this orchestrator started.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        self.active_job = None;
    }

    // ---- private helpers ----

    fn transition(&mut self, command: WorkflowCommand) -> Result<(), WorkflowError> {
        let mut outcome = Ok(());
        let mut moved = None;
        self.state.send_if_modified(|state| {
            let from = state.current_step();
            match state.apply(command) {
                Ok(()) => {
                    if state.current_step() != from {
                        moved = Some((from, state.current_step()));
                    }
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome?;

        if let Some((from, to)) = moved {
            tracing::info!(from = from.label(), to = to.label(), "Workflow step changed");
            self.notices.publish(WorkflowNotice::StepChanged { from, to });
        }
        Ok(())
    }

    fn fail_analysis(&mut self, reason: AnalysisFailureReason) -> WorkflowError {
        tracing::warn!(%reason, "Analysis failed");
        self.abandon_active_job();
        if let Err(e) = self.transition(WorkflowCommand::AnalysisFailed {
            reason: reason.to_string(),
        }) {
            tracing::debug!(error = %e, "Analysis failure did not change step");
        }
        self.notices.publish(WorkflowNotice::AnalysisFailed {
            reason: reason.to_string(),
        });
        WorkflowError::AnalysisFailure { reason }
    }

    fn gate(&mut self, label: &str, context: serde_json::Value) -> Option<PendingAction> {
        let auth = self.state.borrow().auth().clone();
        if self.auth_gate.require_auth(&auth, label, context) {
            return None;
        }
        self.notices.publish(WorkflowNotice::AuthRequired {
            action: label.to_string(),
        });
        self.auth_gate.pending().cloned()
    }

    fn abandon_active_job(&mut self) {
        if let Some(job) = self.active_job.take() {
            tracing::debug!(job_id = %job.job_id, "Abandoning analysis job");
            job.cancel.cancel();
            self.aggregator.abandon(&job.job_id);
        }
    }

    fn active_job_running(&self) -> bool {
        self.active_job
            .as_ref()
            .is_some_and(|job| !job.cancel.is_cancelled())
            && !self.aggregator.snapshot().is_frozen()
    }

    fn organization_id(&self) -> Option<String> {
        self.aggregator.snapshot().result().organization_id.clone()
    }

    fn selected_scenario(&self, state: &WorkflowState) -> Result<Scenario, WorkflowError> {
        state
            .selected_strategy()
            .map(|selection| selection.scenario.clone())
            .ok_or_else(|| CoreError::Precondition("No strategy selected".to_string()).into())
    }
}

impl Drop for WorkflowOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
