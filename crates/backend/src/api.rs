//! REST API client for the analysis backend.
//!
//! Wraps job submission, status polling, CTA management, topic and
//! content generation, and export using [`reqwest`].

use postwise_core::cta::ManualCtaInput;
use postwise_core::events::{JobStatusResponse, NarrativeStatusResponse};
use postwise_core::types::JobId;

use crate::messages::{
    ContentRequest, ContentResponse, CtaListResponse, ExportArtifact, ExportRequest,
    ManualCtaRequest, ManualCtaResponse, RecentAnalysisResponse, StartJobRequest,
    StartJobResponse, TopicRequest, TopicsResponse,
};

/// HTTP client for the analysis backend.
pub struct AnalysisApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Analysis API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl AnalysisApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:3001`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `POST /api/v1/analysis/jobs`
    pub async fn start_job(&self, url: &str) -> Result<StartJobResponse, AnalysisApiError> {
        let response = self
            .client
            .post(self.endpoint("/api/v1/analysis/jobs"))
            .json(&StartJobRequest { url })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /api/v1/analysis/jobs/{job_id}`
    pub async fn job_status(&self, job_id: &JobId) -> Result<JobStatusResponse, AnalysisApiError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/v1/analysis/jobs/{job_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /api/v1/analysis/narrative/{organization_id}`
    pub async fn narrative_status(
        &self,
        organization_id: &str,
    ) -> Result<NarrativeStatusResponse, AnalysisApiError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/v1/analysis/narrative/{organization_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /api/v1/analysis/recent`
    pub async fn recent_analysis(&self) -> Result<RecentAnalysisResponse, AnalysisApiError> {
        let response = self
            .client
            .get(self.endpoint("/api/v1/analysis/recent"))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /api/v1/organizations/{organization_id}/ctas`
    pub async fn list_ctas(&self, organization_id: &str) -> Result<CtaListResponse, AnalysisApiError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/v1/organizations/{organization_id}/ctas")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /api/v1/organizations/{organization_id}/ctas`
    pub async fn add_manual_ctas(
        &self,
        organization_id: &str,
        ctas: &[ManualCtaInput],
    ) -> Result<ManualCtaResponse, AnalysisApiError> {
        let response = self
            .client
            .post(self.endpoint(&format!("/api/v1/organizations/{organization_id}/ctas")))
            .json(&ManualCtaRequest { ctas })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /api/v1/topics`
    pub async fn generate_topics(
        &self,
        request: &TopicRequest,
    ) -> Result<TopicsResponse, AnalysisApiError> {
        let response = self
            .client
            .post(self.endpoint("/api/v1/topics"))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /api/v1/content`
    pub async fn generate_content(
        &self,
        request: &ContentRequest,
    ) -> Result<ContentResponse, AnalysisApiError> {
        let response = self
            .client
            .post(self.endpoint("/api/v1/content"))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /api/v1/export`
    pub async fn export(&self, request: &ExportRequest) -> Result<ExportArtifact, AnalysisApiError> {
        let response = self
            .client
            .post(self.endpoint("/api/v1/export"))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    /// Ensure the response has a success status code, otherwise capture
    /// the status and body text in an [`AnalysisApiError::ApiError`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, AnalysisApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AnalysisApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AnalysisApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = AnalysisApi::new("http://localhost:3001/");
        assert_eq!(api.api_url(), "http://localhost:3001");
        assert_eq!(
            api.endpoint("/api/v1/topics"),
            "http://localhost:3001/api/v1/topics"
        );
    }

    #[test]
    fn api_error_display_includes_status() {
        let err = AnalysisApiError::ApiError {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "Analysis API error (503): maintenance");
    }
}
