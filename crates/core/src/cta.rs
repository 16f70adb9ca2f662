//! Call-to-action sufficiency rule and manual CTA input.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Minimum number of CTAs an organization needs before content generation
/// can link to them without asking the user for more.
pub const MIN_CTAS: usize = 3;

/// Maximum length of a manually entered CTA label.
pub const MAX_CTA_TEXT_LEN: u64 = 200;

// ---------------------------------------------------------------------------
// CTA model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToAction {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(rename = "type", default)]
    pub cta_type: Option<String>,
    #[serde(default)]
    pub placement: Option<String>,
}

impl CallToAction {
    /// Identity used for set semantics: the backend id when present,
    /// otherwise the case-folded text plus link.
    fn identity(&self) -> (Option<&str>, String, Option<&str>) {
        match &self.id {
            Some(id) => (Some(id.as_str()), String::new(), None),
            None => (None, self.text.trim().to_lowercase(), self.href.as_deref()),
        }
    }
}

/// Union `incoming` into `existing`, keeping first-seen order.
/// Existing entries are never removed. Returns the number added.
pub fn merge_ctas(
    existing: &mut Vec<CallToAction>,
    incoming: impl IntoIterator<Item = CallToAction>,
) -> usize {
    let mut added = 0;
    for cta in incoming {
        let duplicate = existing.iter().any(|e| e.identity() == cta.identity());
        if !duplicate {
            existing.push(cta);
            added += 1;
        }
    }
    added
}

// ---------------------------------------------------------------------------
// Sufficiency
// ---------------------------------------------------------------------------

pub fn is_sufficient(count: usize) -> bool {
    count >= MIN_CTAS
}

#[derive(Debug, Clone, PartialEq)]
pub struct CtaSufficiency {
    pub ctas: Vec<CallToAction>,
    pub count: usize,
    pub sufficient: bool,
}

pub fn evaluate(ctas: Vec<CallToAction>) -> CtaSufficiency {
    let count = ctas.len();
    CtaSufficiency {
        ctas,
        count,
        sufficient: is_sufficient(count),
    }
}

/// Ensures the manual-entry prompt is offered at most once per workflow.
#[derive(Debug, Clone, Default)]
pub struct PromptLatch {
    shown: bool,
}

impl PromptLatch {
    /// Returns `true` exactly once: the first time an insufficient
    /// evaluation is observed.
    pub fn should_prompt(&mut self, sufficiency: &CtaSufficiency) -> bool {
        if sufficiency.sufficient || self.shown {
            return false;
        }
        self.shown = true;
        true
    }

    pub fn was_shown(&self) -> bool {
        self.shown
    }

    pub fn reset(&mut self) {
        self.shown = false;
    }
}

// ---------------------------------------------------------------------------
// Manual entry
// ---------------------------------------------------------------------------

/// A CTA typed in by the user when the site did not yield enough of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ManualCtaInput {
    #[validate(length(min = 1, max = MAX_CTA_TEXT_LEN))]
    pub text: String,
    #[validate(url)]
    pub href: String,
    #[serde(rename = "type")]
    pub cta_type: String,
    #[serde(default)]
    pub placement: Option<String>,
}

impl ManualCtaInput {
    pub fn check(&self) -> Result<(), CoreError> {
        if self.text.trim().is_empty() {
            return Err(CoreError::Validation("CTA text must not be blank".to_string()));
        }
        self.validate()
            .map_err(|e| CoreError::Validation(format!("Invalid CTA '{}': {e}", self.text)))
    }

    pub fn to_cta(&self) -> CallToAction {
        CallToAction {
            id: None,
            text: self.text.trim().to_string(),
            href: Some(self.href.clone()),
            cta_type: Some(self.cta_type.clone()),
            placement: self.placement.clone(),
        }
    }
}
