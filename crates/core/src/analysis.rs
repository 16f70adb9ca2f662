//! The analysis model a job progressively fills in.

use serde::{Deserialize, Serialize};

use crate::cta::{self, CallToAction};
use crate::scenario::{Scenario, ScenarioSlot};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Whether the analysis came from the full pipeline or from the fallback
/// path the backend uses when enrichment fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisQuality {
    #[default]
    Enhanced,
    Standard,
}

impl AnalysisQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enhanced => "enhanced",
            Self::Standard => "standard",
        }
    }
}

/// Lifecycle of the narrative sub-result of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
}

impl NarrativeJobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }
}

// ---------------------------------------------------------------------------
// Scrape progress
// ---------------------------------------------------------------------------

/// One line of the scrape progress log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapePhaseEntry {
    pub phase: String,
    pub message: String,
    pub url: Option<String>,
    pub received_at: Timestamp,
}

/// Early preview of the scraped page, shown while analysis continues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapePreview {
    pub title: Option<String>,
    pub description: Option<String>,
    pub headings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

/// Business-level analysis fields as delivered by the backend.
///
/// Every field is optional; a payload only ever fills gaps in the
/// [`AnalysisResult`] it is merged into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisPayload {
    pub url: Option<String>,
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub description: Option<String>,
    pub brand_voice: Option<String>,
    pub content_focus: Option<String>,
    pub business_model: Option<String>,
    pub website_goals: Option<String>,
    pub blog_strategy: Option<String>,
    pub target_audience: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub organization_id: Option<String>,
    pub ctas: Option<Vec<CallToAction>>,
    pub cta_count: Option<usize>,
    pub scenarios: Option<Vec<Scenario>>,
}

// ---------------------------------------------------------------------------
// Analysis result
// ---------------------------------------------------------------------------

/// Accumulated analysis for the active job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub url: Option<String>,
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub description: Option<String>,
    pub brand_voice: Option<String>,
    pub content_focus: Option<String>,
    pub business_model: Option<String>,
    pub website_goals: Option<String>,
    pub blog_strategy: Option<String>,
    pub target_audience: Option<String>,
    pub keywords: Vec<String>,
    pub scenarios: Vec<ScenarioSlot>,
    pub ctas: Vec<CallToAction>,
    pub cta_count: usize,
    pub has_sufficient_ctas: bool,
    pub narrative: Option<String>,
    pub narrative_confidence: Option<f64>,
    pub key_insights: Vec<String>,
    pub narrative_job_status: Option<NarrativeJobStatus>,
    pub narrative_job_attempts: u32,
    pub organization_id: Option<String>,
    pub quality: AnalysisQuality,
}

impl AnalysisResult {
    /// Fill scalar fields from `payload` without ever clearing a value.
    ///
    /// The URL is fixed once set. Scenarios are not touched here; the store
    /// decides how a payload's scenarios interact with streamed ones.
    pub fn merge_payload(&mut self, payload: &AnalysisPayload) {
        if self.url.is_none() {
            fill(&mut self.url, &payload.url);
        }
        fill(&mut self.business_name, &payload.business_name);
        fill(&mut self.business_type, &payload.business_type);
        fill(&mut self.description, &payload.description);
        fill(&mut self.brand_voice, &payload.brand_voice);
        fill(&mut self.content_focus, &payload.content_focus);
        fill(&mut self.business_model, &payload.business_model);
        fill(&mut self.website_goals, &payload.website_goals);
        fill(&mut self.blog_strategy, &payload.blog_strategy);
        fill(&mut self.target_audience, &payload.target_audience);
        fill(&mut self.organization_id, &payload.organization_id);

        if let Some(keywords) = payload.keywords.as_ref().filter(|k| !k.is_empty()) {
            self.keywords = keywords.clone();
        }

        match (&payload.ctas, payload.cta_count) {
            (Some(ctas), _) => {
                self.merge_ctas(ctas);
            }
            (None, Some(count)) if count > self.cta_count => {
                self.cta_count = count;
                self.has_sufficient_ctas = cta::is_sufficient(count);
            }
            _ => {}
        }
    }

    /// Union `incoming` into the CTA set and recompute sufficiency.
    /// Returns how many CTAs were new.
    pub fn merge_ctas(&mut self, incoming: &[CallToAction]) -> usize {
        let added = cta::merge_ctas(&mut self.ctas, incoming.iter().cloned());
        self.cta_count = self.cta_count.max(self.ctas.len());
        self.has_sufficient_ctas = cta::is_sufficient(self.cta_count);
        added
    }

    /// Scenario at `index`, if its audience data has arrived.
    pub fn scenario(&self, index: usize) -> Option<&Scenario> {
        self.scenarios.get(index).and_then(ScenarioSlot::scenario)
    }

    /// All materialized scenarios in position order.
    pub fn ready_scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter().filter_map(ScenarioSlot::scenario)
    }

    /// Project back onto the wire shape, used as context for topic and
    /// content generation.
    pub fn to_payload(&self) -> AnalysisPayload {
        AnalysisPayload {
            url: self.url.clone(),
            business_name: self.business_name.clone(),
            business_type: self.business_type.clone(),
            description: self.description.clone(),
            brand_voice: self.brand_voice.clone(),
            content_focus: self.content_focus.clone(),
            business_model: self.business_model.clone(),
            website_goals: self.website_goals.clone(),
            blog_strategy: self.blog_strategy.clone(),
            target_audience: self.target_audience.clone(),
            keywords: Some(self.keywords.clone()),
            organization_id: self.organization_id.clone(),
            ctas: Some(self.ctas.clone()),
            cta_count: Some(self.cta_count),
            scenarios: Some(self.ready_scenarios().cloned().collect()),
        }
    }
}

fn fill(slot: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming.as_ref().filter(|v| !v.trim().is_empty()) {
        *slot = Some(value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> AnalysisPayload {
        AnalysisPayload {
            url: Some("https://bakery.example.com".to_string()),
            business_name: Some("Crumb & Co".to_string()),
            business_type: Some("Bakery".to_string()),
            keywords: Some(vec!["sourdough".to_string()]),
            ..AnalysisPayload::default()
        }
    }

    #[test]
    fn merge_never_clears_fields() {
        let mut result = AnalysisResult::default();
        result.merge_payload(&payload());

        result.merge_payload(&AnalysisPayload {
            business_name: None,
            business_type: Some(String::new()),
            keywords: Some(Vec::new()),
            brand_voice: Some("warm".to_string()),
            ..AnalysisPayload::default()
        });

        assert_eq!(result.business_name.as_deref(), Some("Crumb & Co"));
        assert_eq!(result.business_type.as_deref(), Some("Bakery"));
        assert_eq!(result.keywords, vec!["sourdough".to_string()]);
        assert_eq!(result.brand_voice.as_deref(), Some("warm"));
    }

    #[test]
    fn url_is_fixed_once_set() {
        let mut result = AnalysisResult {
            url: Some("https://first.example.com".to_string()),
            ..AnalysisResult::default()
        };
        result.merge_payload(&payload());
        assert_eq!(result.url.as_deref(), Some("https://first.example.com"));
    }

    #[test]
    fn cta_count_only_grows() {
        let mut result = AnalysisResult::default();
        result.merge_payload(&AnalysisPayload {
            cta_count: Some(4),
            ..AnalysisPayload::default()
        });
        result.merge_payload(&AnalysisPayload {
            cta_count: Some(1),
            ..AnalysisPayload::default()
        });
        assert_eq!(result.cta_count, 4);
        assert!(result.has_sufficient_ctas);
    }

    #[test]
    fn narrative_status_terminality() {
        assert!(!NarrativeJobStatus::Pending.is_terminal());
        assert!(!NarrativeJobStatus::Processing.is_terminal());
        assert!(NarrativeJobStatus::Completed.is_terminal());
        assert!(NarrativeJobStatus::Timeout.is_terminal());
    }
}
