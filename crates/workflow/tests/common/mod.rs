#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use postwise_backend::api::AnalysisApiError;
use postwise_backend::client::FeedClientError;
use postwise_backend::messages::{
    ContentRequest, CtaListResponse, ExportArtifact, ExportRequest, ManualCtaResponse,
    StartJobResponse, TopicRequest,
};
use postwise_backend::{AnalysisBackend, BackendError, EventFeed};
use postwise_core::analysis::AnalysisPayload;
use postwise_core::cta::{CallToAction, ManualCtaInput};
use postwise_core::events::{
    AnalysisCompletion, AnalysisEvent, JobState, JobStatusResponse, NarrativePayload,
    NarrativePollStatus, NarrativeStatusResponse, StreamMessage,
};
use postwise_core::scenario::Scenario;
use postwise_core::store::AnalysisStore;
use postwise_core::types::JobId;
use postwise_core::workflow::{GeneratedContent, Topic};
use postwise_workflow::WorkflowConfig;
use tokio::sync::watch;

pub const ORG: &str = "org-1";

/// What `subscribe` hands out for a job.
pub enum FeedScript {
    /// Deliver these messages, then close.
    Events(Vec<StreamMessage>),
    /// Stay open until the paired sender is dropped.
    Live(mpsc::UnboundedReceiver<StreamMessage>),
    /// Fail to connect.
    Unavailable,
}

/// In-memory [`AnalysisBackend`] whose answers are set up by each test.
pub struct ScriptedBackend {
    job_ids: Mutex<VecDeque<JobId>>,
    start_error: Mutex<Option<String>>,
    feeds: Mutex<HashMap<JobId, FeedScript>>,
    job_statuses: Mutex<VecDeque<JobStatusResponse>>,
    job_status_unreachable: AtomicBool,
    narratives: Mutex<VecDeque<NarrativeStatusResponse>>,
    ctas: Mutex<Vec<CallToAction>>,
    reported_sufficiency: Mutex<Option<bool>>,
    topics: Mutex<Vec<Topic>>,
    fail_topics: AtomicBool,
    fail_content: AtomicBool,
    recent: Mutex<Option<AnalysisPayload>>,

    pub starts: AtomicU32,
    pub job_status_calls: AtomicU32,
    pub narrative_calls: AtomicU32,
    pub cta_fetches: AtomicU32,
    pub manual_submissions: AtomicU32,
    pub topic_calls: AtomicU32,
    pub content_calls: AtomicU32,
    pub export_calls: AtomicU32,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            job_ids: Mutex::default(),
            start_error: Mutex::default(),
            feeds: Mutex::default(),
            job_statuses: Mutex::default(),
            job_status_unreachable: AtomicBool::new(false),
            narratives: Mutex::default(),
            ctas: Mutex::default(),
            reported_sufficiency: Mutex::default(),
            topics: Mutex::new(vec![topic("t1", "Why sourdough rises"), topic("t2", "Rye 101")]),
            fail_topics: AtomicBool::new(false),
            fail_content: AtomicBool::new(false),
            recent: Mutex::default(),
            starts: AtomicU32::new(0),
            job_status_calls: AtomicU32::new(0),
            narrative_calls: AtomicU32::new(0),
            cta_fetches: AtomicU32::new(0),
            manual_submissions: AtomicU32::new(0),
            topic_calls: AtomicU32::new(0),
            content_calls: AtomicU32::new(0),
            export_calls: AtomicU32::new(0),
        }
    }
}

impl ScriptedBackend {
    /// Queue the id the next `start_analysis` call returns, with its feed.
    pub fn script_job(&self, job_id: &str, feed: FeedScript) {
        let job_id = JobId::new(job_id);
        self.job_ids.lock().unwrap().push_back(job_id.clone());
        self.feeds.lock().unwrap().insert(job_id, feed);
    }

    /// Queue a job whose feed the test drives through the returned sender.
    pub fn script_live_job(&self, job_id: &str) -> mpsc::UnboundedSender<StreamMessage> {
        let (tx, rx) = mpsc::unbounded();
        self.script_job(job_id, FeedScript::Live(rx));
        tx
    }

    pub fn fail_start(&self, error: &str) {
        *self.start_error.lock().unwrap() = Some(error.to_string());
    }

    pub fn push_job_status(&self, status: JobStatusResponse) {
        self.job_statuses.lock().unwrap().push_back(status);
    }

    pub fn make_job_status_unreachable(&self) {
        self.job_status_unreachable.store(true, Ordering::SeqCst);
    }

    pub fn push_narrative(&self, response: NarrativeStatusResponse) {
        self.narratives.lock().unwrap().push_back(response);
    }

    pub fn set_ctas(&self, ctas: Vec<CallToAction>) {
        *self.ctas.lock().unwrap() = ctas;
    }

    /// Make `fetch_ctas` report this flag regardless of the list it returns.
    pub fn report_cta_sufficiency(&self, sufficient: bool) {
        *self.reported_sufficiency.lock().unwrap() = Some(sufficient);
    }

    pub fn fail_topics(&self) {
        self.fail_topics.store(true, Ordering::SeqCst);
    }

    pub fn fail_content(&self) {
        self.fail_content.store(true, Ordering::SeqCst);
    }

    pub fn set_recent(&self, payload: AnalysisPayload) {
        *self.recent.lock().unwrap() = Some(payload);
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

fn api_error(body: &str) -> BackendError {
    BackendError::Api(AnalysisApiError::ApiError {
        status: 500,
        body: body.to_string(),
    })
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn start_analysis(&self, _url: &str) -> Result<StartJobResponse, BackendError> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.start_error.lock().unwrap().clone() {
            return Err(api_error(&error));
        }
        let job_id = self
            .job_ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| JobId::new(format!("job-{n}")));
        Ok(StartJobResponse { job_id })
    }

    async fn subscribe(&self, job_id: &JobId) -> Result<EventFeed, BackendError> {
        let script = self.feeds.lock().unwrap().remove(job_id);
        match script {
            Some(FeedScript::Events(messages)) => Ok(futures::stream::iter(messages).boxed()),
            Some(FeedScript::Live(rx)) => Ok(rx.boxed()),
            Some(FeedScript::Unavailable) | None => Err(BackendError::Feed(
                FeedClientError::Connection("connection refused".to_string()),
            )),
        }
    }

    async fn job_status(&self, _job_id: &JobId) -> Result<JobStatusResponse, BackendError> {
        self.job_status_calls.fetch_add(1, Ordering::SeqCst);
        if self.job_status_unreachable.load(Ordering::SeqCst) {
            return Err(api_error("job status unavailable"));
        }
        Ok(self
            .job_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| job_status(JobState::Running, None)))
    }

    async fn narrative_status(
        &self,
        _organization_id: &str,
    ) -> Result<NarrativeStatusResponse, BackendError> {
        let n = self.narrative_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.narratives.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| narrative_status(NarrativePollStatus::Pending, n, None)))
    }

    async fn fetch_ctas(&self, _organization_id: &str) -> Result<CtaListResponse, BackendError> {
        self.cta_fetches.fetch_add(1, Ordering::SeqCst);
        let ctas = self.ctas.lock().unwrap().clone();
        let reported = *self.reported_sufficiency.lock().unwrap();
        Ok(CtaListResponse {
            has_sufficient_ctas: reported.unwrap_or(ctas.len() >= 3),
            ctas,
        })
    }

    async fn submit_manual_ctas(
        &self,
        _organization_id: &str,
        ctas: &[ManualCtaInput],
    ) -> Result<ManualCtaResponse, BackendError> {
        self.manual_submissions.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.ctas.lock().unwrap();
        for input in ctas {
            let mut cta = input.to_cta();
            cta.id = Some(format!("manual-{}", stored.len() + 1));
            stored.push(cta);
        }
        Ok(ManualCtaResponse {
            success: true,
            ctas_added: ctas.len(),
        })
    }

    async fn generate_topics(&self, _request: &TopicRequest) -> Result<Vec<Topic>, BackendError> {
        self.topic_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_topics.load(Ordering::SeqCst) {
            return Err(api_error("topic generation failed"));
        }
        Ok(self.topics.lock().unwrap().clone())
    }

    async fn generate_content(
        &self,
        request: &ContentRequest,
    ) -> Result<GeneratedContent, BackendError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_content.load(Ordering::SeqCst) {
            return Err(api_error("content generation failed"));
        }
        Ok(GeneratedContent {
            topic_id: request.topic.id.clone(),
            title: Some(request.topic.title.clone()),
            body: format!("# {}\n\nFresh from the oven.", request.topic.title),
        })
    }

    async fn export(&self, request: &ExportRequest) -> Result<ExportArtifact, BackendError> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExportArtifact {
            format: request.format,
            filename: format!("post.{}", request.format),
            body: request.content.clone(),
        })
    }

    async fn most_recent_analysis(&self) -> Result<Option<AnalysisPayload>, BackendError> {
        Ok(self.recent.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Fast timings for tests that run on the real clock.
pub fn test_config() -> WorkflowConfig {
    WorkflowConfig::default()
        .with_topic_settle_delay(Duration::ZERO)
        .with_narrative_polling(Duration::from_millis(10), 5)
        .with_job_polling(Duration::from_millis(10), 5)
}

pub fn message(job_id: &str, event: AnalysisEvent) -> StreamMessage {
    StreamMessage {
        job_id: JobId::new(job_id),
        event,
    }
}

pub fn analysis_payload() -> AnalysisPayload {
    AnalysisPayload {
        business_name: Some("Crumb & Co".to_string()),
        business_type: Some("Bakery".to_string()),
        organization_id: Some(ORG.to_string()),
        ..AnalysisPayload::default()
    }
}

pub fn scenarios(count: usize) -> Vec<Scenario> {
    (0..count)
        .map(|index| Scenario {
            index,
            customer_problem: Some(format!("Problem {index}")),
            pitch: Some(format!("Pitch {index}")),
            ..Scenario::default()
        })
        .collect()
}

pub fn completion(success: bool) -> AnalysisCompletion {
    AnalysisCompletion {
        success,
        ..AnalysisCompletion::default()
    }
}

/// A full job: progress, analysis, two scenarios, narrative, completion.
pub fn happy_feed(job_id: &str) -> Vec<StreamMessage> {
    vec![
        message(
            job_id,
            AnalysisEvent::ScrapePhase {
                phase: "fetching".to_string(),
                message: "Reading homepage".to_string(),
                url: None,
            },
        ),
        message(
            job_id,
            AnalysisEvent::AnalysisResult {
                content: analysis_payload(),
            },
        ),
        message(
            job_id,
            AnalysisEvent::ScenariosResult {
                content: scenarios(2),
            },
        ),
        message(
            job_id,
            AnalysisEvent::NarrativeComplete {
                content: NarrativePayload {
                    narrative: Some("A neighbourhood bakery.".to_string()),
                    ..NarrativePayload::default()
                },
            },
        ),
        message(
            job_id,
            AnalysisEvent::Complete {
                content: completion(true),
            },
        ),
    ]
}

/// Like [`happy_feed`] but without a narrative, so polling takes over.
pub fn feed_without_narrative(job_id: &str) -> Vec<StreamMessage> {
    happy_feed(job_id)
        .into_iter()
        .filter(|m| !matches!(m.event, AnalysisEvent::NarrativeComplete { .. }))
        .collect()
}

pub fn job_status(status: JobState, result: Option<AnalysisCompletion>) -> JobStatusResponse {
    JobStatusResponse {
        status,
        progress: None,
        result,
        error: None,
    }
}

pub fn narrative_status(
    status: NarrativePollStatus,
    attempts: u32,
    narrative: Option<&str>,
) -> NarrativeStatusResponse {
    NarrativeStatusResponse {
        status,
        attempts,
        narrative: narrative.map(str::to_string),
        narrative_confidence: None,
        key_insights: Vec::new(),
    }
}

pub fn topic(id: &str, title: &str) -> Topic {
    Topic {
        id: id.to_string(),
        title: title.to_string(),
        subheader: None,
        category: None,
    }
}

pub fn cta(id: &str, text: &str) -> CallToAction {
    CallToAction {
        id: Some(id.to_string()),
        text: text.to_string(),
        href: Some(format!("https://bakery.example.com/{id}")),
        cta_type: Some("button".to_string()),
        placement: None,
    }
}

pub fn manual_cta(text: &str, href: &str) -> ManualCtaInput {
    ManualCtaInput {
        text: text.to_string(),
        href: href.to_string(),
        cta_type: "link".to_string(),
        placement: None,
    }
}

/// Wait until the store satisfies `predicate`, failing the test after
/// `limit`.
pub async fn wait_for_store(
    rx: &mut watch::Receiver<AnalysisStore>,
    limit: Duration,
    predicate: impl FnMut(&AnalysisStore) -> bool,
) -> AnalysisStore {
    tokio::time::timeout(limit, rx.wait_for(predicate))
        .await
        .expect("store did not reach the expected state in time")
        .expect("store sender dropped")
        .clone()
}
