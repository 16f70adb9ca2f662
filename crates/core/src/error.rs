use crate::workflow::WorkflowStep;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Illegal transition: cannot {command} while at step {from:?}")]
    IllegalTransition {
        from: WorkflowStep,
        command: &'static str,
    },

    #[error("Precondition failed: {0}")]
    Precondition(String),
}
