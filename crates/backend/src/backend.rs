//! The [`AnalysisBackend`] seam and its HTTP/WebSocket implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use postwise_core::analysis::AnalysisPayload;
use postwise_core::cta::ManualCtaInput;
use postwise_core::events::{JobStatusResponse, NarrativeStatusResponse, StreamMessage};
use postwise_core::types::JobId;
use postwise_core::workflow::{GeneratedContent, Topic};

use crate::api::{AnalysisApi, AnalysisApiError};
use crate::client::{EventFeedClient, FeedClientError};
use crate::messages::{
    ContentRequest, CtaListResponse, ExportArtifact, ExportRequest, ManualCtaResponse,
    StartJobResponse, TopicRequest,
};
use crate::processor::into_event_feed;
use crate::reconnect::{connect_with_backoff, ConnectRetry};

/// Ordered stream of a job's events. Ends when the feed closes.
pub type EventFeed = BoxStream<'static, StreamMessage>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Api(#[from] AnalysisApiError),

    #[error(transparent)]
    Feed(#[from] FeedClientError),
}

/// Everything the workflow needs from the analysis service.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn start_analysis(&self, url: &str) -> Result<StartJobResponse, BackendError>;

    /// Open the event feed for a job.
    async fn subscribe(&self, job_id: &JobId) -> Result<EventFeed, BackendError>;

    async fn job_status(&self, job_id: &JobId) -> Result<JobStatusResponse, BackendError>;

    async fn narrative_status(
        &self,
        organization_id: &str,
    ) -> Result<NarrativeStatusResponse, BackendError>;

    async fn fetch_ctas(&self, organization_id: &str) -> Result<CtaListResponse, BackendError>;

    async fn submit_manual_ctas(
        &self,
        organization_id: &str,
        ctas: &[ManualCtaInput],
    ) -> Result<ManualCtaResponse, BackendError>;

    async fn generate_topics(&self, request: &TopicRequest) -> Result<Vec<Topic>, BackendError>;

    async fn generate_content(
        &self,
        request: &ContentRequest,
    ) -> Result<GeneratedContent, BackendError>;

    async fn export(&self, request: &ExportRequest) -> Result<ExportArtifact, BackendError>;

    /// The most recent completed analysis for the current user, if any.
    async fn most_recent_analysis(&self) -> Result<Option<AnalysisPayload>, BackendError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpBackend {
    api: AnalysisApi,
    feed: EventFeedClient,
    retry: ConnectRetry,
}

impl HttpBackend {
    /// * `api_url`         - REST base URL, e.g. `http://localhost:3001`.
    /// * `ws_url`          - WebSocket base URL, e.g. `ws://localhost:3001`.
    /// * `request_timeout` - Per-request timeout for REST calls.
    pub fn new(
        api_url: impl Into<String>,
        ws_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(AnalysisApiError::from)?;

        Ok(Self {
            api: AnalysisApi::with_client(client, api_url),
            feed: EventFeedClient::new(ws_url),
            retry: ConnectRetry::default(),
        })
    }

    pub fn with_retry(mut self, retry: ConnectRetry) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn start_analysis(&self, url: &str) -> Result<StartJobResponse, BackendError> {
        let response = self.api.start_job(url).await?;
        tracing::info!(job_id = %response.job_id, url, "Analysis job started");
        Ok(response)
    }

    async fn subscribe(&self, job_id: &JobId) -> Result<EventFeed, BackendError> {
        let connection = connect_with_backoff(&self.feed, job_id, &self.retry).await?;
        Ok(into_event_feed(connection))
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobStatusResponse, BackendError> {
        Ok(self.api.job_status(job_id).await?)
    }

    async fn narrative_status(
        &self,
        organization_id: &str,
    ) -> Result<NarrativeStatusResponse, BackendError> {
        Ok(self.api.narrative_status(organization_id).await?)
    }

    async fn fetch_ctas(&self, organization_id: &str) -> Result<CtaListResponse, BackendError> {
        Ok(self.api.list_ctas(organization_id).await?)
    }

    async fn submit_manual_ctas(
        &self,
        organization_id: &str,
        ctas: &[ManualCtaInput],
    ) -> Result<ManualCtaResponse, BackendError> {
        Ok(self.api.add_manual_ctas(organization_id, ctas).await?)
    }

    async fn generate_topics(&self, request: &TopicRequest) -> Result<Vec<Topic>, BackendError> {
        Ok(self.api.generate_topics(request).await?.topics)
    }

    async fn generate_content(
        &self,
        request: &ContentRequest,
    ) -> Result<GeneratedContent, BackendError> {
        let response = self.api.generate_content(request).await?;
        Ok(GeneratedContent {
            topic_id: request.topic.id.clone(),
            title: response.title.or_else(|| Some(request.topic.title.clone())),
            body: response.content,
        })
    }

    async fn export(&self, request: &ExportRequest) -> Result<ExportArtifact, BackendError> {
        Ok(self.api.export(request).await?)
    }

    async fn most_recent_analysis(&self) -> Result<Option<AnalysisPayload>, BackendError> {
        Ok(self.api.recent_analysis().await?.analysis)
    }
}
