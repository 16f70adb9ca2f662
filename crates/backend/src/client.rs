//! WebSocket client for a job's event feed.
//!
//! [`EventFeedClient`] holds the feed base URL. Call
//! [`EventFeedClient::connect`] to open a live [`EventConnection`] for
//! one analysis job.

use postwise_core::types::JobId;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

pub type FeedStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct EventFeedClient {
    ws_url: String,
}

/// A live WebSocket connection to one job's event feed.
pub struct EventConnection {
    pub job_id: JobId,
    /// Unique client ID sent during the handshake, for server-side logs.
    pub client_id: String,
    pub ws_stream: FeedStream,
}

impl EventFeedClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://localhost:3001`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        let ws_url = ws_url.into().trim_end_matches('/').to_string();
        Self { ws_url }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// URL of the feed for `job_id`, tagged with `client_id`.
    pub fn feed_url(&self, job_id: &JobId, client_id: &str) -> String {
        format!(
            "{}/api/v1/analysis/jobs/{job_id}/events?clientId={client_id}",
            self.ws_url
        )
    }

    /// Open the event feed for `job_id`.
    pub async fn connect(&self, job_id: &JobId) -> Result<EventConnection, FeedClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = self.feed_url(job_id, &client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            FeedClientError::Connection(format!(
                "Failed to open event feed at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            job_id = %job_id,
            client_id = %client_id,
            "Connected to analysis event feed",
        );

        Ok(EventConnection {
            job_id: job_id.clone(),
            client_id,
            ws_stream,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
