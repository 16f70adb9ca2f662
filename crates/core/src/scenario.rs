//! Strategy scenarios and their layered enrichment.
//!
//! A scenario is assembled from up to three partial sources that can arrive
//! in any order: the audience fields, the pitch, and the image. Each source
//! is kept in its own layer and the visible [`Scenario`] is rebuilt from the
//! layers on every change, so applying the same partial twice, or applying
//! partials in a different order, yields the same record.

use serde::{Deserialize, Serialize};

/// Highest number of scenario slots a single analysis may address.
/// Per-item events with an index at or beyond this are dropped.
pub const MAX_SCENARIOS: usize = 64;

// ---------------------------------------------------------------------------
// Scenario value types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetSegment {
    pub demographics: Option<String>,
    pub psychographics: Option<String>,
    pub search_behavior: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessValue {
    pub search_volume: Option<String>,
    pub conversion_potential: Option<String>,
    pub priority: Option<u32>,
    pub competition: Option<String>,
}

/// Generated illustration for a scenario. Every field may arrive separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioImage {
    pub url: Option<String>,
    pub alt_text: Option<String>,
    pub prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ScenarioImage {
    /// Shallow merge: fields present in `incoming` replace ours.
    pub fn merge(&mut self, incoming: &ScenarioImage) {
        overlay(&mut self.url, &incoming.url);
        overlay(&mut self.alt_text, &incoming.alt_text);
        overlay(&mut self.prompt, &incoming.prompt);
        overlay(&mut self.width, &incoming.width);
        overlay(&mut self.height, &incoming.height);
    }
}

/// A fully materialized strategy option as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub target_segment: Option<TargetSegment>,
    #[serde(default)]
    pub customer_problem: Option<String>,
    #[serde(default)]
    pub customer_language: Vec<String>,
    #[serde(default)]
    pub business_value: Option<BusinessValue>,
    #[serde(default)]
    pub conversion_path: Option<String>,
    #[serde(default)]
    pub seo_keywords: Vec<String>,
    #[serde(default)]
    pub pitch: Option<String>,
    #[serde(default)]
    pub image: Option<ScenarioImage>,
}

/// Partial scenario fields as carried by per-item stream events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioPatch {
    pub target_segment: Option<TargetSegment>,
    pub customer_problem: Option<String>,
    pub customer_language: Option<Vec<String>>,
    pub business_value: Option<BusinessValue>,
    pub conversion_path: Option<String>,
    pub seo_keywords: Option<Vec<String>>,
    pub pitch: Option<String>,
}

impl ScenarioPatch {
    /// Field-wise merge where present incoming fields win.
    pub fn merge(&mut self, incoming: &ScenarioPatch) {
        overlay(&mut self.target_segment, &incoming.target_segment);
        overlay(&mut self.customer_problem, &incoming.customer_problem);
        overlay(&mut self.customer_language, &incoming.customer_language);
        overlay(&mut self.business_value, &incoming.business_value);
        overlay(&mut self.conversion_path, &incoming.conversion_path);
        overlay(&mut self.seo_keywords, &incoming.seo_keywords);
        overlay(&mut self.pitch, &incoming.pitch);
    }

    /// Lift a complete scenario into a patch. Empty lists are treated as
    /// absent so they never hide values supplied by a later layer.
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            target_segment: scenario.target_segment.clone(),
            customer_problem: scenario.customer_problem.clone(),
            customer_language: non_empty(&scenario.customer_language),
            business_value: scenario.business_value.clone(),
            conversion_path: scenario.conversion_path.clone(),
            seo_keywords: non_empty(&scenario.seo_keywords),
            pitch: scenario.pitch.clone(),
        }
    }

    fn apply_to(&self, scenario: &mut Scenario) {
        overlay(&mut scenario.target_segment, &self.target_segment);
        overlay(&mut scenario.customer_problem, &self.customer_problem);
        overlay(&mut scenario.business_value, &self.business_value);
        overlay(&mut scenario.conversion_path, &self.conversion_path);
        overlay(&mut scenario.pitch, &self.pitch);
        if let Some(language) = &self.customer_language {
            scenario.customer_language = language.clone();
        }
        if let Some(keywords) = &self.seo_keywords {
            scenario.seo_keywords = keywords.clone();
        }
    }
}

fn overlay<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value.clone());
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Scenario with its source layers. Layers combine as
/// audience, then pitch, then image, later layers winning.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRecord {
    audience: ScenarioPatch,
    pitch: Option<ScenarioPatch>,
    image: Option<ScenarioImage>,
    scenario: Scenario,
}

impl ScenarioRecord {
    pub fn from_audience(index: usize, audience: &ScenarioPatch) -> Self {
        let mut record = Self {
            audience: audience.clone(),
            pitch: None,
            image: None,
            scenario: Scenario::default(),
        };
        record.rebuild(index);
        record
    }

    /// Build a record from a complete scenario delivered in a bulk event.
    pub fn from_snapshot(index: usize, scenario: &Scenario) -> Self {
        let mut record = Self {
            audience: ScenarioPatch::from_scenario(scenario),
            pitch: None,
            image: scenario.image.clone(),
            scenario: Scenario::default(),
        };
        record.rebuild(index);
        record
    }

    pub fn merge_audience(&mut self, patch: &ScenarioPatch) {
        self.audience.merge(patch);
        self.rebuild(self.scenario.index);
    }

    pub fn merge_pitch(&mut self, patch: &ScenarioPatch) {
        self.pitch.get_or_insert_with(ScenarioPatch::default).merge(patch);
        self.rebuild(self.scenario.index);
    }

    pub fn merge_image(&mut self, image: &ScenarioImage) {
        self.image.get_or_insert_with(ScenarioImage::default).merge(image);
        self.rebuild(self.scenario.index);
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Whether the pitch for this scenario is still outstanding.
    pub fn pitch_loading(&self) -> bool {
        self.scenario.pitch.is_none()
    }

    /// Whether the image for this scenario is still outstanding.
    pub fn image_loading(&self) -> bool {
        self.image.as_ref().and_then(|image| image.url.as_ref()).is_none()
    }

    fn rebuild(&mut self, index: usize) {
        let mut scenario = Scenario {
            index,
            ..Scenario::default()
        };
        self.audience.apply_to(&mut scenario);
        if let Some(pitch) = &self.pitch {
            pitch.apply_to(&mut scenario);
        }
        scenario.image = self.image.clone();
        self.scenario = scenario;
    }
}

/// Position-preserving entry of the scenario list.
///
/// A placeholder marks an index whose audience data has not arrived yet.
/// Its flags tell a renderer whether enrichments are already buffered.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioSlot {
    Placeholder {
        index: usize,
        pitch_buffered: bool,
        image_buffered: bool,
    },
    Ready(ScenarioRecord),
}

impl ScenarioSlot {
    pub fn index(&self) -> usize {
        match self {
            Self::Placeholder { index, .. } => *index,
            Self::Ready(record) => record.scenario.index,
        }
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        match self {
            Self::Placeholder { .. } => None,
            Self::Ready(record) => Some(record.scenario()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}
