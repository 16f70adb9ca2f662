//! Event reducer for a single analysis job.
//!
//! [`AnalysisStore`] is the single writer of the accumulated analysis. It is
//! a plain value: the async layer owns one behind a `watch` channel and feeds
//! it stream events and poll responses one at a time. Every input carries the
//! job it belongs to, and inputs for any job other than the active one are
//! dropped without touching state.
//!
//! Scenario reconciliation rules:
//!
//! | Event                     | Effect                                               |
//! |---------------------------|------------------------------------------------------|
//! | `audience-complete`       | fill slot at `index` (or append), drain buffered     |
//! | `pitch-complete`          | merge into slot, or buffer until the slot exists     |
//! | `scenario-image-complete` | merge into slot, or buffer until the slot exists     |
//! | `audiences-result`        | replace list, drain buffered for covered indices     |
//! | `pitches-result`          | replace list, drain buffered for covered indices     |
//! | `scenarios-result`        | replace list, discard buffered, seal the list        |
//!
//! Once sealed, per-item events and non-final bulk events are ignored.

use std::collections::BTreeMap;

use crate::analysis::{
    AnalysisPayload, AnalysisQuality, AnalysisResult, NarrativeJobStatus, ScrapePhaseEntry,
    ScrapePreview,
};
use crate::cta::CallToAction;
use crate::events::{
    AnalysisCompletion, AnalysisEvent, CompletionOutcome, JobStatusResponse, NarrativePayload,
    NarrativePollStatus, NarrativeStatusResponse, StreamMessage,
};
use crate::scenario::{
    Scenario, ScenarioImage, ScenarioPatch, ScenarioRecord, ScenarioSlot, MAX_SCENARIOS,
};
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Reducer outcomes
// ---------------------------------------------------------------------------

/// Terminal result of a job as seen by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum JobCompletion {
    Succeeded { quality: AnalysisQuality },
    Failed { message: String },
    /// Job-status polling ran out of attempts without a terminal answer.
    TimedOut { attempts: u32 },
    /// Neither the event feed nor the job-status endpoint ever answered.
    Unreachable { attempts: u32 },
}

impl JobCompletion {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The input belongs to a job that is no longer active.
    StaleJob,
    /// The scenario list was sealed by `scenarios-result`.
    Sealed,
    /// The narrative is not being generated, so its results are irrelevant.
    NarrativeNotGenerating,
    /// A terminal outcome was already recorded for this job.
    AlreadyCompleted,
    /// Input carried nothing to apply.
    Empty,
    /// A per-item event addressed a slot at or beyond [`MAX_SCENARIOS`].
    IndexOutOfRange,
}

/// What applying one input did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Merged,
    /// Enrichment held back until the scenario at `index` exists.
    Buffered { index: usize },
    Completed(JobCompletion),
    NarrativeSettled(NarrativeJobStatus),
    Ignored(IgnoreReason),
}

impl Applied {
    /// Whether observers should be notified.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

/// Enrichment that arrived before its scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingEnrichment {
    pub pitch: Option<ScenarioPatch>,
    pub image: Option<ScenarioImage>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisStore {
    active_job: Option<JobId>,
    result: AnalysisResult,
    scrape_log: Vec<ScrapePhaseEntry>,
    scrape_preview: Option<ScrapePreview>,
    business_profile: Option<serde_json::Value>,
    pending: BTreeMap<usize, PendingEnrichment>,
    scenario_events_seen: bool,
    scenarios_sealed: bool,
    narrative_generating: bool,
    completion: Option<JobCompletion>,
    last_error: Option<String>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- read access -------------------------------------------------------

    pub fn active_job(&self) -> Option<&JobId> {
        self.active_job.as_ref()
    }

    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    pub fn scrape_log(&self) -> &[ScrapePhaseEntry] {
        &self.scrape_log
    }

    pub fn scrape_preview(&self) -> Option<&ScrapePreview> {
        self.scrape_preview.as_ref()
    }

    pub fn business_profile(&self) -> Option<&serde_json::Value> {
        self.business_profile.as_ref()
    }

    pub fn pending_enrichments(&self) -> &BTreeMap<usize, PendingEnrichment> {
        &self.pending
    }

    pub fn scenarios_sealed(&self) -> bool {
        self.scenarios_sealed
    }

    pub fn narrative_generating(&self) -> bool {
        self.narrative_generating
    }

    pub fn completion(&self) -> Option<&JobCompletion> {
        self.completion.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True once the job's outcome is known and nothing else is pending.
    pub fn is_frozen(&self) -> bool {
        self.active_job.is_none()
    }

    // -- lifecycle ---------------------------------------------------------

    /// Start accumulating for a new job, discarding everything from the
    /// previous one.
    pub fn begin_job(&mut self, job_id: JobId, url: impl Into<String>) {
        *self = Self {
            active_job: Some(job_id),
            narrative_generating: true,
            ..Self::default()
        };
        self.result.url = Some(url.into());
        self.result.narrative_job_status = Some(NarrativeJobStatus::Pending);
    }

    /// Stop accepting inputs for the active job, keeping what has been
    /// accumulated so far.
    pub fn abandon(&mut self) {
        self.active_job = None;
        self.narrative_generating = false;
    }

    /// Drop all accumulated state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Load a previously completed analysis. Ignored while a job is active.
    pub fn hydrate(&mut self, payload: &AnalysisPayload) -> Applied {
        if self.active_job.is_some() {
            return Applied::Ignored(IgnoreReason::StaleJob);
        }
        self.clear();
        self.result.merge_payload(payload);
        if let Some(scenarios) = &payload.scenarios {
            self.replace_scenarios(scenarios, true);
        }
        self.completion = Some(JobCompletion::Succeeded {
            quality: AnalysisQuality::Enhanced,
        });
        Applied::Merged
    }

    /// Union CTAs fetched for `organization_id` into the result.
    pub fn merge_ctas(&mut self, organization_id: &str, ctas: &[CallToAction]) -> Applied {
        if self.result.organization_id.as_deref() != Some(organization_id) {
            return Applied::Ignored(IgnoreReason::StaleJob);
        }
        let before = (self.result.cta_count, self.result.ctas.len());
        self.result.merge_ctas(ctas);
        if before == (self.result.cta_count, self.result.ctas.len()) {
            Applied::Ignored(IgnoreReason::Empty)
        } else {
            Applied::Merged
        }
    }

    // -- stream ------------------------------------------------------------

    /// Reduce one stream message.
    pub fn apply(&mut self, message: &StreamMessage) -> Applied {
        if !self.accepts(&message.job_id) {
            return Applied::Ignored(IgnoreReason::StaleJob);
        }

        match &message.event {
            AnalysisEvent::ScrapePhase {
                phase,
                message: text,
                url,
            } => {
                self.scrape_log.push(ScrapePhaseEntry {
                    phase: phase.clone(),
                    message: text.clone(),
                    url: url.clone(),
                    received_at: now(),
                });
                Applied::Merged
            }
            AnalysisEvent::ScrapeResult { content } => {
                self.scrape_preview = Some(content.clone());
                Applied::Merged
            }
            AnalysisEvent::AnalysisResult { content } => self.apply_analysis(content),
            AnalysisEvent::AudienceComplete { index, content } => {
                self.apply_audience(*index, content)
            }
            AnalysisEvent::AudiencesResult { content }
            | AnalysisEvent::PitchesResult { content } => self.apply_bulk(content, false),
            AnalysisEvent::ScenariosResult { content } => self.apply_bulk(content, true),
            AnalysisEvent::PitchComplete { index, content } => self.apply_pitch(*index, content),
            AnalysisEvent::ScenarioImageComplete { index, content } => {
                self.apply_image(*index, content)
            }
            AnalysisEvent::BusinessProfile { content } => {
                self.business_profile = Some(content.clone());
                Applied::Merged
            }
            AnalysisEvent::NarrativeComplete { content } => self.apply_narrative(content),
            AnalysisEvent::Complete { content } => self.apply_completion(content),
            AnalysisEvent::Error { message } => {
                self.apply_completion(&AnalysisCompletion {
                    success: false,
                    error: Some(message.clone()),
                    ..AnalysisCompletion::default()
                })
            }
        }
    }

    // -- polling -----------------------------------------------------------

    /// Reduce a job-status poll response. Only terminal statuses change
    /// state, and only if the stream has not already completed the job.
    pub fn apply_job_status(&mut self, job_id: &JobId, status: &JobStatusResponse) -> Applied {
        if !self.accepts(job_id) {
            return Applied::Ignored(IgnoreReason::StaleJob);
        }
        match status.completion() {
            Some(completion) => self.apply_completion(&completion),
            None => Applied::Ignored(IgnoreReason::Empty),
        }
    }

    /// Record that job-status polling gave up.
    pub fn job_poll_exhausted(&mut self, job_id: &JobId, attempts: u32, reachable: bool) -> Applied {
        if !self.accepts(job_id) {
            return Applied::Ignored(IgnoreReason::StaleJob);
        }
        if self.completion.is_some() {
            return Applied::Ignored(IgnoreReason::AlreadyCompleted);
        }
        let completion = if reachable {
            JobCompletion::TimedOut { attempts }
        } else {
            JobCompletion::Unreachable { attempts }
        };
        self.finish(completion)
    }

    /// Reduce one narrative poll tick.
    pub fn apply_narrative_poll(
        &mut self,
        job_id: &JobId,
        attempt: u32,
        response: &NarrativeStatusResponse,
    ) -> Applied {
        if !self.accepts(job_id) {
            return Applied::Ignored(IgnoreReason::StaleJob);
        }
        if !self.narrative_generating {
            return Applied::Ignored(IgnoreReason::NarrativeNotGenerating);
        }

        self.result.narrative_job_attempts = attempt.max(response.attempts);
        match response.status {
            NarrativePollStatus::Pending => {
                self.result.narrative_job_status = Some(NarrativeJobStatus::Pending);
                Applied::Merged
            }
            NarrativePollStatus::Processing => {
                self.result.narrative_job_status = Some(NarrativeJobStatus::Processing);
                Applied::Merged
            }
            NarrativePollStatus::Ready => self.apply_narrative(&NarrativePayload {
                narrative: response.narrative.clone(),
                narrative_confidence: response.narrative_confidence,
                key_insights: response.key_insights.clone(),
            }),
            NarrativePollStatus::Failed => self.settle_narrative(NarrativeJobStatus::Failed),
        }
    }

    /// A narrative poll request failed; only the attempt counter moves.
    pub fn narrative_poll_errored(&mut self, job_id: &JobId, attempt: u32) -> Applied {
        if !self.accepts(job_id) {
            return Applied::Ignored(IgnoreReason::StaleJob);
        }
        if !self.narrative_generating {
            return Applied::Ignored(IgnoreReason::NarrativeNotGenerating);
        }
        self.result.narrative_job_attempts = attempt;
        Applied::Merged
    }

    /// Narrative polling exhausted its attempts.
    pub fn narrative_timed_out(&mut self, job_id: &JobId, attempts: u32) -> Applied {
        if !self.accepts(job_id) {
            return Applied::Ignored(IgnoreReason::StaleJob);
        }
        if !self.narrative_generating {
            return Applied::Ignored(IgnoreReason::NarrativeNotGenerating);
        }
        self.result.narrative_job_attempts = attempts;
        self.settle_narrative(NarrativeJobStatus::Timeout)
    }

    // -- internals ---------------------------------------------------------

    fn accepts(&self, job_id: &JobId) -> bool {
        self.active_job.as_ref() == Some(job_id)
    }

    fn apply_analysis(&mut self, payload: &AnalysisPayload) -> Applied {
        self.result.merge_payload(payload);
        if !self.scenario_events_seen {
            match &payload.scenarios {
                Some(scenarios) => self.replace_scenarios(scenarios, false),
                None => self.result.scenarios.clear(),
            }
        }
        Applied::Merged
    }

    /// Merge the payload carried by a completion. Unlike `analysis-result`
    /// it never clears scenarios; its scenario list only fills an empty one.
    fn apply_final(&mut self, payload: &AnalysisPayload) {
        self.result.merge_payload(payload);
        if let Some(scenarios) = &payload.scenarios {
            if self.result.scenarios.is_empty() && !self.scenarios_sealed {
                self.replace_scenarios(scenarios, false);
            }
        }
    }

    fn apply_audience(&mut self, index: Option<usize>, patch: &ScenarioPatch) -> Applied {
        if self.scenarios_sealed {
            return Applied::Ignored(IgnoreReason::Sealed);
        }
        let index = index.unwrap_or(self.result.scenarios.len());
        if index >= MAX_SCENARIOS {
            return Applied::Ignored(IgnoreReason::IndexOutOfRange);
        }
        self.scenario_events_seen = true;

        self.ensure_slot(index);
        match &mut self.result.scenarios[index] {
            ScenarioSlot::Ready(record) => record.merge_audience(patch),
            slot => *slot = ScenarioSlot::Ready(ScenarioRecord::from_audience(index, patch)),
        }
        self.drain_pending(index);
        Applied::Merged
    }

    fn apply_pitch(&mut self, index: usize, patch: &ScenarioPatch) -> Applied {
        if self.scenarios_sealed {
            return Applied::Ignored(IgnoreReason::Sealed);
        }
        if index >= MAX_SCENARIOS {
            return Applied::Ignored(IgnoreReason::IndexOutOfRange);
        }
        self.scenario_events_seen = true;

        if let Some(ScenarioSlot::Ready(record)) = self.result.scenarios.get_mut(index) {
            record.merge_pitch(patch);
            return Applied::Merged;
        }
        self.pending
            .entry(index)
            .or_default()
            .pitch
            .get_or_insert_with(ScenarioPatch::default)
            .merge(patch);
        self.refresh_placeholder(index);
        Applied::Buffered { index }
    }

    fn apply_image(&mut self, index: usize, image: &ScenarioImage) -> Applied {
        if self.scenarios_sealed {
            return Applied::Ignored(IgnoreReason::Sealed);
        }
        if index >= MAX_SCENARIOS {
            return Applied::Ignored(IgnoreReason::IndexOutOfRange);
        }
        self.scenario_events_seen = true;

        if let Some(ScenarioSlot::Ready(record)) = self.result.scenarios.get_mut(index) {
            record.merge_image(image);
            return Applied::Merged;
        }
        self.pending
            .entry(index)
            .or_default()
            .image
            .get_or_insert_with(ScenarioImage::default)
            .merge(image);
        self.refresh_placeholder(index);
        Applied::Buffered { index }
    }

    fn apply_bulk(&mut self, scenarios: &[Scenario], seal: bool) -> Applied {
        if self.scenarios_sealed && !seal {
            return Applied::Ignored(IgnoreReason::Sealed);
        }
        self.scenario_events_seen = true;
        self.replace_scenarios(scenarios, seal);
        Applied::Merged
    }

    fn replace_scenarios(&mut self, scenarios: &[Scenario], seal: bool) {
        self.result.scenarios = scenarios
            .iter()
            .enumerate()
            .map(|(index, scenario)| {
                ScenarioSlot::Ready(ScenarioRecord::from_snapshot(index, scenario))
            })
            .collect();

        if seal {
            self.pending.clear();
            self.scenarios_sealed = true;
        } else {
            for index in 0..self.result.scenarios.len() {
                self.drain_pending(index);
            }
        }
    }

    /// Grow the list with placeholders so that `index` is addressable.
    fn ensure_slot(&mut self, index: usize) {
        while self.result.scenarios.len() <= index {
            let position = self.result.scenarios.len();
            let buffered = self.pending.get(&position);
            self.result.scenarios.push(ScenarioSlot::Placeholder {
                index: position,
                pitch_buffered: buffered.is_some_and(|p| p.pitch.is_some()),
                image_buffered: buffered.is_some_and(|p| p.image.is_some()),
            });
        }
    }

    fn refresh_placeholder(&mut self, index: usize) {
        let buffered = self.pending.get(&index);
        if let Some(ScenarioSlot::Placeholder {
            pitch_buffered,
            image_buffered,
            ..
        }) = self.result.scenarios.get_mut(index)
        {
            *pitch_buffered = buffered.is_some_and(|p| p.pitch.is_some());
            *image_buffered = buffered.is_some_and(|p| p.image.is_some());
        }
    }

    fn drain_pending(&mut self, index: usize) {
        let Some(ScenarioSlot::Ready(record)) = self.result.scenarios.get_mut(index) else {
            return;
        };
        if let Some(pending) = self.pending.remove(&index) {
            if let Some(pitch) = &pending.pitch {
                record.merge_pitch(pitch);
            }
            if let Some(image) = &pending.image {
                record.merge_image(image);
            }
        }
    }

    fn apply_narrative(&mut self, payload: &NarrativePayload) -> Applied {
        if !self.narrative_generating {
            return Applied::Ignored(IgnoreReason::NarrativeNotGenerating);
        }
        if let Some(narrative) = &payload.narrative {
            self.result.narrative = Some(narrative.clone());
        }
        if payload.narrative_confidence.is_some() {
            self.result.narrative_confidence = payload.narrative_confidence;
        }
        if !payload.key_insights.is_empty() {
            self.result.key_insights = payload.key_insights.clone();
        }
        self.settle_narrative(NarrativeJobStatus::Completed)
    }

    fn settle_narrative(&mut self, status: NarrativeJobStatus) -> Applied {
        self.result.narrative_job_status = Some(status);
        self.narrative_generating = false;
        self.maybe_freeze();
        Applied::NarrativeSettled(status)
    }

    fn apply_completion(&mut self, completion: &AnalysisCompletion) -> Applied {
        if self.completion.is_some() {
            return Applied::Ignored(IgnoreReason::AlreadyCompleted);
        }
        let outcome = match completion.outcome() {
            CompletionOutcome::Enhanced(payload) => {
                if let Some(payload) = payload {
                    self.apply_final(payload);
                }
                JobCompletion::Succeeded {
                    quality: AnalysisQuality::Enhanced,
                }
            }
            CompletionOutcome::Degraded(fallback) => {
                self.apply_final(fallback);
                JobCompletion::Succeeded {
                    quality: AnalysisQuality::Standard,
                }
            }
            CompletionOutcome::Failed(message) => {
                self.last_error = Some(message.to_string());
                JobCompletion::Failed {
                    message: message.to_string(),
                }
            }
        };
        self.finish(outcome)
    }

    fn finish(&mut self, completion: JobCompletion) -> Applied {
        match &completion {
            JobCompletion::Succeeded { quality } => {
                self.result.quality = *quality;
                // Narrative results are keyed by organization; without one
                // there is nothing to wait for.
                if self.narrative_generating && self.result.organization_id.is_none() {
                    self.narrative_generating = false;
                    self.result.narrative_job_status = Some(NarrativeJobStatus::Failed);
                }
            }
            _ => {
                if self.narrative_generating {
                    self.narrative_generating = false;
                    self.result.narrative_job_status = Some(NarrativeJobStatus::Failed);
                }
            }
        }
        self.completion = Some(completion.clone());
        self.maybe_freeze();
        Applied::Completed(completion)
    }

    fn maybe_freeze(&mut self) {
        if self.completion.is_some() && !self.narrative_generating {
            self.active_job = None;
        }
    }
}

fn now() -> Timestamp {
    chrono::Utc::now()
}
