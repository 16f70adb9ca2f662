//! Workflow steps, the user-facing state and its transition rules.
//!
//! The wizard is strictly linear:
//!
//! ```text
//! URL_INPUT -> ANALYZING -> STRATEGY_SELECT -> TOPIC_GEN -> CONTENT_EDIT -> EXPORT
//! ```
//!
//! The only backward moves are an analysis failure (back to URL input), a
//! content-generation failure (back to strategy selection) and an explicit
//! reset. All changes go through [`WorkflowState::apply`], which either
//! performs the whole transition or leaves the state untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisQuality;
use crate::error::CoreError;
use crate::scenario::Scenario;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    #[default]
    UrlInput,
    Analyzing,
    StrategySelect,
    TopicGen,
    ContentEdit,
    Export,
}

/// Minimum step number (0-based).
pub const MIN_STEP: u8 = 0;

/// Maximum step number (0-based).
pub const MAX_STEP: u8 = 5;

/// Steps from which content can be (re)generated.
pub const CONTENT_STEPS: &[WorkflowStep] = &[
    WorkflowStep::TopicGen,
    WorkflowStep::ContentEdit,
    WorkflowStep::Export,
];

impl WorkflowStep {
    pub fn from_number(n: u8) -> Result<Self, CoreError> {
        match n {
            0 => Ok(Self::UrlInput),
            1 => Ok(Self::Analyzing),
            2 => Ok(Self::StrategySelect),
            3 => Ok(Self::TopicGen),
            4 => Ok(Self::ContentEdit),
            5 => Ok(Self::Export),
            _ => Err(CoreError::Validation(format!(
                "Invalid step number {n}. Must be between {MIN_STEP} and {MAX_STEP}"
            ))),
        }
    }

    pub fn to_number(self) -> u8 {
        match self {
            Self::UrlInput => 0,
            Self::Analyzing => 1,
            Self::StrategySelect => 2,
            Self::TopicGen => 3,
            Self::ContentEdit => 4,
            Self::Export => 5,
        }
    }

    /// Human-readable label for the step.
    pub fn label(self) -> &'static str {
        match self {
            Self::UrlInput => "Website URL",
            Self::Analyzing => "Analyzing",
            Self::StrategySelect => "Choose Strategy",
            Self::TopicGen => "Pick a Topic",
            Self::ContentEdit => "Edit Post",
            Self::Export => "Export",
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostState {
    Draft,
    Exported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Markdown,
    Html,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            _ => Err(CoreError::Validation(format!(
                "Invalid export format '{s}'. Must be one of: markdown, html, json"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Who is driving the workflow. Demo mode is authorized without a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub session: Option<UserSession>,
    pub demo_mode: bool,
}

impl AuthContext {
    pub fn is_authorized(&self) -> bool {
        self.demo_mode || self.session.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subheader: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub topic_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedStrategy {
    pub index: usize,
    pub scenario: Scenario,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowCommand {
    BeginAnalysis,
    AnalysisSucceeded { quality: AnalysisQuality },
    AnalysisFailed { reason: String },
    SelectStrategy(SelectedStrategy),
    ContinueToTopics,
    TopicsGenerated { topics: Vec<Topic> },
    TopicsFailed { reason: String },
    ContentGenerated { topic: Topic, content: GeneratedContent },
    ContentFailed { reason: String },
    EditContent { body: String },
    Exported { format: ExportFormat },
    Reset,
}

impl WorkflowCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeginAnalysis => "begin analysis",
            Self::AnalysisSucceeded { .. } => "complete analysis",
            Self::AnalysisFailed { .. } => "fail analysis",
            Self::SelectStrategy(_) => "select strategy",
            Self::ContinueToTopics => "continue to topics",
            Self::TopicsGenerated { .. } => "store topics",
            Self::TopicsFailed { .. } => "fail topic generation",
            Self::ContentGenerated { .. } => "store generated content",
            Self::ContentFailed { .. } => "fail content generation",
            Self::EditContent { .. } => "edit content",
            Self::Exported { .. } => "export",
            Self::Reset => "reset",
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    current_step: WorkflowStep,
    analysis_completed: bool,
    analysis_quality: Option<AnalysisQuality>,
    strategy_completed: bool,
    selected_strategy: Option<SelectedStrategy>,
    topics: Vec<Topic>,
    selected_topic: Option<Topic>,
    generated_content: Option<GeneratedContent>,
    post_state: Option<PostState>,
    exported_as: Option<ExportFormat>,
    last_failure: Option<String>,
    auth: AuthContext,
}

impl WorkflowState {
    pub fn new(auth: AuthContext) -> Self {
        Self {
            auth,
            ..Self::default()
        }
    }

    pub fn current_step(&self) -> WorkflowStep {
        self.current_step
    }

    pub fn analysis_completed(&self) -> bool {
        self.analysis_completed
    }

    pub fn analysis_quality(&self) -> Option<AnalysisQuality> {
        self.analysis_quality
    }

    pub fn strategy_completed(&self) -> bool {
        self.strategy_completed
    }

    pub fn selected_strategy(&self) -> Option<&SelectedStrategy> {
        self.selected_strategy.as_ref()
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn topic(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn selected_topic(&self) -> Option<&Topic> {
        self.selected_topic.as_ref()
    }

    pub fn generated_content(&self) -> Option<&GeneratedContent> {
        self.generated_content.as_ref()
    }

    pub fn post_state(&self) -> Option<PostState> {
        self.post_state
    }

    pub fn exported_as(&self) -> Option<ExportFormat> {
        self.exported_as
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn set_session(&mut self, session: Option<UserSession>) {
        self.auth.session = session;
    }

    pub fn set_demo_mode(&mut self, demo_mode: bool) {
        self.auth.demo_mode = demo_mode;
    }

    /// Apply `command` atomically. On error the state is unchanged.
    pub fn apply(&mut self, command: WorkflowCommand) -> Result<(), CoreError> {
        use WorkflowStep as S;

        let name = command.name();

        match command {
            WorkflowCommand::BeginAnalysis => {
                self.ensure_step(&[S::UrlInput, S::Analyzing], name)?;
                *self = Self {
                    current_step: S::Analyzing,
                    ..Self::new(self.auth.clone())
                };
            }

            WorkflowCommand::AnalysisSucceeded { quality } => {
                self.require(S::Analyzing, name)?;
                self.current_step = S::StrategySelect;
                self.analysis_completed = true;
                self.analysis_quality = Some(quality);
                self.last_failure = None;
            }

            WorkflowCommand::AnalysisFailed { reason } => {
                self.require(S::Analyzing, name)?;
                self.current_step = S::UrlInput;
                self.analysis_completed = false;
                self.last_failure = Some(reason);
            }

            WorkflowCommand::SelectStrategy(selection) => {
                self.require(S::StrategySelect, name)?;
                if !self.analysis_completed {
                    return Err(CoreError::Precondition(
                        "Analysis must complete before a strategy is selected".to_string(),
                    ));
                }
                self.selected_strategy = Some(selection);
            }

            WorkflowCommand::ContinueToTopics => {
                self.require(S::StrategySelect, name)?;
                if self.selected_strategy.is_none() {
                    return Err(CoreError::Precondition(
                        "Select a strategy before generating topics".to_string(),
                    ));
                }
                self.current_step = S::TopicGen;
                self.strategy_completed = true;
                self.topics.clear();
                self.last_failure = None;
            }

            WorkflowCommand::TopicsGenerated { topics } => {
                self.require(S::TopicGen, name)?;
                self.topics = topics;
                self.last_failure = None;
            }

            WorkflowCommand::TopicsFailed { reason } => {
                self.require(S::TopicGen, name)?;
                self.last_failure = Some(reason);
            }

            WorkflowCommand::ContentGenerated { topic, content } => {
                self.ensure_step(CONTENT_STEPS, name)?;
                self.current_step = S::ContentEdit;
                self.selected_topic = Some(topic);
                self.generated_content = Some(content);
                self.post_state = Some(PostState::Draft);
                self.exported_as = None;
                self.last_failure = None;
            }

            WorkflowCommand::ContentFailed { reason } => {
                self.ensure_step(CONTENT_STEPS, name)?;
                self.current_step = S::StrategySelect;
                self.strategy_completed = false;
                self.topics.clear();
                self.selected_topic = None;
                self.generated_content = None;
                self.post_state = None;
                self.exported_as = None;
                self.last_failure = Some(reason);
            }

            WorkflowCommand::EditContent { body } => {
                if self.post_state == Some(PostState::Exported) {
                    return Err(CoreError::Conflict(
                        "Post has been exported; generate new content to edit again".to_string(),
                    ));
                }
                self.require(S::ContentEdit, name)?;
                let Some(content) = self.generated_content.as_mut() else {
                    return Err(CoreError::Precondition("No content to edit".to_string()));
                };
                content.body = body;
            }

            WorkflowCommand::Exported { format } => {
                if self.post_state == Some(PostState::Exported) {
                    return Err(CoreError::Conflict("Post has already been exported".to_string()));
                }
                self.require(S::ContentEdit, name)?;
                if self.generated_content.is_none() {
                    return Err(CoreError::Precondition("No content to export".to_string()));
                }
                self.current_step = S::Export;
                self.post_state = Some(PostState::Exported);
                self.exported_as = Some(format);
            }

            WorkflowCommand::Reset => {
                *self = Self::new(self.auth.clone());
            }
        }

        Ok(())
    }

    /// Check, without changing anything, that the current step is one of
    /// `allowed`.
    pub fn ensure_step(
        &self,
        allowed: &[WorkflowStep],
        command: &'static str,
    ) -> Result<(), CoreError> {
        if allowed.contains(&self.current_step) {
            Ok(())
        } else {
            Err(CoreError::IllegalTransition {
                from: self.current_step,
                command,
            })
        }
    }

    fn require(&self, step: WorkflowStep, command: &'static str) -> Result<(), CoreError> {
        self.ensure_step(&[step], command)
    }
}
