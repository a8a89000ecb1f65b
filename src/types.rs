use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::analyzer::ContentAnalysis;

/// A single validated browser action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    Goto {
        url: String,
    },
    Type {
        selector: String,
        value: String,
    },
    Press {
        selector: String,
        key: String,
    },
    Click(ClickTarget),
    Wait {
        delay: u64,
    },
    Screenshot,
    Scroll {
        direction: ScrollDirection,
    },
    ExtractText {
        selector: String,
    },
    AnalyzeContent,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Goto { .. } => "goto",
            Action::Type { .. } => "type",
            Action::Press { .. } => "press",
            Action::Click(_) => "click",
            Action::Wait { .. } => "wait",
            Action::Screenshot => "screenshot",
            Action::Scroll { .. } => "scroll",
            Action::ExtractText { .. } => "extractText",
            Action::AnalyzeContent => "analyzeContent",
        }
    }
}

/// What a `click` aims at: a fixed selector, or a target found by scoring
/// the live page.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickTarget {
    Selector(String),
    Dynamic(DynamicTarget),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicTarget {
    pub target_text: String,
    pub target_category: String,
}

impl Serialize for ClickTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            ClickTarget::Selector(selector) => map.serialize_entry("selector", selector)?,
            ClickTarget::Dynamic(target) => {
                map.serialize_entry("requiresDynamicSearch", &true)?;
                map.serialize_entry("targetText", &target.target_text)?;
                map.serialize_entry("targetCategory", &target.target_category)?;
            }
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    #[serde(flatten)]
    pub action: Action,
    pub description: String,
    /// Extra settle time after a successful step. Never set on `wait`, which
    /// settles for its own delay; see [`Command::settle_delay`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl Command {
    pub fn new(action: Action, description: impl Into<String>) -> Self {
        Self {
            action,
            description: description.into(),
            delay: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.action.name()
    }

    /// Pause to take after the step succeeds. A `wait` pauses for its delay a
    /// second time.
    pub fn settle_delay(&self) -> Option<u64> {
        match self.action {
            Action::Wait { delay } => Some(delay),
            _ => self.delay,
        }
    }
}

/// An ordered, validated list of commands for one user request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandList {
    commands: Vec<Command>,
    model_used: String,
}

impl CommandList {
    pub fn new(commands: Vec<Command>, model_used: impl Into<String>) -> Self {
        Self {
            commands,
            model_used: model_used.into(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn model_used(&self) -> &str {
        &self.model_used
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// What a successful step produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepOutput {
    Analysis(ContentAnalysis),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub step: usize,
    pub action: &'static str,
    pub description: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StepOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Always 0. Commands left behind by a fatal abort are absent from
    /// `commands`.
    pub skipped: usize,
    pub commands: Vec<StepResult>,
}

impl ExecutionSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            successful: 0,
            failed: 0,
            skipped: 0,
            commands: Vec::with_capacity(total),
        }
    }

    pub fn record_success(&mut self, step: usize, command: &Command, output: StepOutput) {
        self.successful += 1;
        self.commands.push(StepResult {
            step,
            action: command.name(),
            description: command.description.clone(),
            status: StepStatus::Success,
            result: Some(output),
            error: None,
            timestamp: Utc::now(),
        });
    }

    pub fn record_failure(&mut self, step: usize, command: &Command, error: String) {
        self.failed += 1;
        self.commands.push(StepResult {
            step,
            action: command.name(),
            description: command.description.clone(),
            status: StepStatus::Failed,
            result: None,
            error: Some(error),
            timestamp: Utc::now(),
        });
    }

    /// The analysis produced by the first successful `analyzeContent` step.
    pub fn analysis(&self) -> Option<&ContentAnalysis> {
        self.commands.iter().find_map(|step| match (&step.status, &step.result) {
            (StepStatus::Success, Some(StepOutput::Analysis(analysis))) => Some(analysis),
            _ => None,
        })
    }
}

/// Outcome of running one command list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub logs: Vec<String>,
    /// Wall time in milliseconds.
    pub execution_time: u64,
    pub model_used: String,
    pub browser_status: &'static str,
    pub message: &'static str,
    pub execution_summary: ExecutionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An interactive element as seen by the dynamic search. Captured fresh on
/// every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageElement {
    pub index: usize,
    pub tag: String,
    pub text: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
    pub visible: bool,
}

/// A DOM element carrying a class name or id, with its qualifying
/// descendant links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomContainer {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub links: Vec<LinkSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub text: String,
    #[serde(default)]
    pub href: String,
}

pub const SCROLL_OFFSET_PX: i64 = 500;
pub const DEFAULT_WAIT_MS: u64 = 1000;
pub const FALLBACK_WAIT_MS: u64 = 2000;
