//! Async workflow layer: drives analysis jobs against an
//! [`AnalysisBackend`](postwise_backend::AnalysisBackend), reduces their
//! events into a shared store, and sequences the user-facing steps.

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod cta_gate;
pub mod error;
pub mod notices;
pub mod orchestrator;
mod poller;

pub use config::WorkflowConfig;
pub use error::{AnalysisFailureReason, WorkflowError};
pub use orchestrator::WorkflowOrchestrator;
