//! CTA sufficiency gate.
//!
//! After a successful analysis the organization's CTAs are fetched and
//! counted. If there are fewer than [`MIN_CTAS`](postwise_core::cta::MIN_CTAS)
//! the user is offered manual entry, once per workflow no matter how many
//! times sufficiency is re-evaluated.

use std::sync::Arc;

use postwise_backend::AnalysisBackend;
use postwise_core::cta::{self, CtaSufficiency, ManualCtaInput, PromptLatch};
use postwise_core::error::CoreError;

use crate::error::WorkflowError;
use crate::notices::{NoticeBus, WorkflowNotice};

/// Outcome of a manual CTA submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualCtaReceipt {
    pub added: usize,
    pub sufficiency: CtaSufficiency,
}

pub struct CtaGate {
    backend: Arc<dyn AnalysisBackend>,
    notices: NoticeBus,
    latch: PromptLatch,
}

impl CtaGate {
    pub fn new(backend: Arc<dyn AnalysisBackend>, notices: NoticeBus) -> Self {
        Self {
            backend,
            notices,
            latch: PromptLatch::default(),
        }
    }

    /// Fetch and count the organization's CTAs, prompting for manual entry
    /// the first time they fall short.
    pub async fn evaluate(&mut self, organization_id: &str) -> Result<CtaSufficiency, WorkflowError> {
        let response = self.backend.fetch_ctas(organization_id).await?;
        let reported = response.has_sufficient_ctas;
        let sufficiency = cta::evaluate(response.ctas);
        if reported != sufficiency.sufficient {
            tracing::warn!(
                organization_id,
                reported,
                count = sufficiency.count,
                "Backend CTA sufficiency disagrees with the returned list",
            );
        }

        tracing::debug!(
            organization_id,
            count = sufficiency.count,
            sufficient = sufficiency.sufficient,
            "CTA sufficiency evaluated",
        );

        if self.latch.should_prompt(&sufficiency) {
            tracing::info!(
                organization_id,
                count = sufficiency.count,
                "Too few CTAs; prompting for manual entry",
            );
            self.notices.publish(WorkflowNotice::ManualCtaPrompt {
                organization_id: organization_id.to_string(),
                cta_count: sufficiency.count,
            });
        }
        Ok(sufficiency)
    }

    /// Validate and submit manually entered CTAs, then re-evaluate.
    pub async fn submit_manual(
        &mut self,
        organization_id: &str,
        inputs: &[ManualCtaInput],
    ) -> Result<ManualCtaReceipt, WorkflowError> {
        if inputs.is_empty() {
            return Err(CoreError::Validation("At least one CTA is required".to_string()).into());
        }
        for input in inputs {
            input.check()?;
        }

        let response = self
            .backend
            .submit_manual_ctas(organization_id, inputs)
            .await?;
        if !response.success {
            return Err(CoreError::Conflict("Backend rejected the manual CTAs".to_string()).into());
        }
        tracing::info!(organization_id, added = response.ctas_added, "Manual CTAs saved");

        let sufficiency = self.evaluate(organization_id).await?;
        Ok(ManualCtaReceipt {
            added: response.ctas_added,
            sufficiency,
        })
    }

    pub fn prompt_shown(&self) -> bool {
        self.latch.was_shown()
    }

    /// Re-arm the prompt for a new workflow.
    pub fn reset(&mut self) {
        self.latch.reset();
    }
}
