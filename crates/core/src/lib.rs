//! Domain layer for the guided content-creation workflow.
//!
//! Everything in this crate is synchronous and free of I/O: the analysis
//! model, the event reducer that folds a job's stream into that model, the
//! CTA sufficiency rule, URL validation and the step state machine. The
//! async plumbing lives in `postwise-backend` and `postwise-workflow`.

pub mod analysis;
pub mod cta;
pub mod error;
pub mod events;
pub mod scenario;
pub mod store;
pub mod types;
pub mod url;
pub mod workflow;
