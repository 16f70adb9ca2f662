//! Client library for the analysis backend.
//!
//! Provides typed wire messages, the REST API wrapper, the per-job
//! WebSocket event feed with connect backoff, and the [`AnalysisBackend`]
//! trait the workflow layer is written against.

pub mod api;
pub mod backend;
pub mod client;
pub mod messages;
pub mod processor;
pub mod reconnect;

pub use backend::{AnalysisBackend, BackendError, EventFeed, HttpBackend};
