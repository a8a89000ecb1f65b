use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::analyzer::ContentAnalyzer;
use crate::config::Viewport;
use crate::error::{AgentError, Result};
use crate::face::AgentEvent;
use crate::page::PageDriver;
use crate::resolver::ElementResolver;
use crate::rules::RuleSet;
use crate::types::{
    Action, ClickTarget, Command, CommandList, ExecutionResult, ExecutionSummary,
    SCROLL_OFFSET_PX, ScrollDirection, StepOutput,
};

/// Runs validated command lists against a page, one step at a time.
pub struct ExecutionEngine {
    viewport: Viewport,
    screenshot_dir: PathBuf,
    resolver: ElementResolver,
    analyzer: ContentAnalyzer,
    events: Option<broadcast::Sender<AgentEvent>>,
}

impl ExecutionEngine {
    pub fn new(rules: &RuleSet, viewport: Viewport, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            viewport,
            screenshot_dir: screenshot_dir.into(),
            resolver: ElementResolver::new(rules.resolver.clone()),
            analyzer: ContentAnalyzer::new(rules.analyzer.clone()),
            events: None,
        }
    }

    pub fn with_search_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.resolver = self.resolver.with_retry(attempts, backoff);
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Execute `list` in order. A failed `goto` stops the run; any other
    /// failure is recorded and the next command runs. Blocks until done.
    pub fn run<P: PageDriver + ?Sized>(&self, page: &P, list: &CommandList) -> ExecutionResult {
        let started = Instant::now();
        let total = list.len();
        let mut summary = ExecutionSummary::new(total);
        let mut logs = Vec::with_capacity(total + 1);

        if let Err(e) = page.set_viewport(self.viewport) {
            warn!(error = %format!("{e:#}"), "could not apply viewport");
        }

        info!(total, model = list.model_used(), "running command list");
        let mut fatal: Option<AgentError> = None;

        for (i, command) in list.commands().iter().enumerate() {
            let step = i + 1;
            info!(step, action = command.name(), description = %command.description, "step");
            self.emit(AgentEvent::Step {
                number: step,
                action: command.name(),
                description: command.description.clone(),
            });

            match self.execute(page, command) {
                Ok(output) => {
                    logs.push(format!("Step {step}: {} ✓", command.description));
                    summary.record_success(step, command, output);
                    self.settle(page, command);
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(step, action = command.name(), error = %message, "step failed");
                    logs.push(format!("Step {step}: {} ✗ {message}", command.description));
                    summary.record_failure(step, command, message.clone());
                    self.emit(AgentEvent::StepError {
                        number: step,
                        action: command.name(),
                        message,
                    });

                    if is_fatal(&command.action) {
                        fatal = Some(err);
                        break;
                    }
                }
            }
        }

        let execution_time = started.elapsed().as_millis() as u64;
        match fatal {
            None => {
                info!(
                    successful = summary.successful,
                    failed = summary.failed,
                    execution_time,
                    "command list completed"
                );
                self.emit(AgentEvent::TaskComplete {
                    successful: summary.successful,
                    failed: summary.failed,
                    total,
                });
                ExecutionResult {
                    success: true,
                    logs,
                    execution_time,
                    model_used: list.model_used().to_string(),
                    browser_status: "open",
                    message: "Commands executed successfully. Browser remains open.",
                    execution_summary: summary,
                    error: None,
                }
            }
            Some(err) => {
                let message = err.to_string();
                error!(
                    error = %message,
                    attempted = summary.commands.len(),
                    total,
                    "command list aborted"
                );
                logs.push(format!("Fatal error: {message}"));
                self.emit(AgentEvent::TaskError {
                    message: message.clone(),
                });
                ExecutionResult {
                    success: false,
                    logs,
                    execution_time,
                    model_used: list.model_used().to_string(),
                    browser_status: "open",
                    message: "Execution stopped on a fatal error. Browser remains open.",
                    execution_summary: summary,
                    error: Some(message),
                }
            }
        }
    }

    fn execute<P: PageDriver + ?Sized>(&self, page: &P, command: &Command) -> Result<StepOutput> {
        let action = command.name();
        let step_err = |e: anyhow::Error| AgentError::step(action, e);

        match &command.action {
            Action::Goto { url } => {
                page.navigate(url)
                    .map_err(|e| AgentError::Navigation(format!("{url}: {e:#}")))?;
                Ok(StepOutput::Text(format!("Navigated to {url}")))
            }
            Action::Type { selector, value } => {
                page.fill(selector, value).map_err(step_err)?;
                Ok(StepOutput::Text(format!("Typed \"{value}\" into {selector}")))
            }
            Action::Press { selector, key } => {
                page.press(selector, key).map_err(step_err)?;
                Ok(StepOutput::Text(format!("Pressed {key} on {selector}")))
            }
            Action::Click(ClickTarget::Selector(selector)) => {
                page.click(selector).map_err(step_err)?;
                Ok(StepOutput::Text(format!("Clicked {selector}")))
            }
            Action::Click(ClickTarget::Dynamic(target)) => {
                let found = self.resolver.resolve(page, target)?;
                page.click_element(found.index).map_err(step_err)?;
                Ok(StepOutput::Text(format!(
                    "Clicked {} (score {:.1})",
                    found.description, found.score
                )))
            }
            Action::Wait { delay } => {
                page.pause(*delay).map_err(step_err)?;
                Ok(StepOutput::Text(format!("Waited {delay}ms")))
            }
            Action::Screenshot => {
                let path = self
                    .screenshot_dir
                    .join(format!("screenshot_{}.png", Utc::now().timestamp_millis()));
                page.screenshot(&path).map_err(step_err)?;
                Ok(StepOutput::Text(format!("Screenshot saved to {}", path.display())))
            }
            Action::Scroll { direction } => {
                let dy = match direction {
                    ScrollDirection::Up => -SCROLL_OFFSET_PX,
                    ScrollDirection::Down => SCROLL_OFFSET_PX,
                };
                page.scroll_by(dy).map_err(step_err)?;
                Ok(StepOutput::Text(format!("Scrolled {dy}px")))
            }
            Action::ExtractText { selector } => {
                let text = page
                    .text_content(selector)
                    .map_err(step_err)?
                    .ok_or_else(|| AgentError::step(action, format!("no element matches {selector}")))?;
                Ok(StepOutput::Text(text.trim().to_string()))
            }
            Action::AnalyzeContent => Ok(StepOutput::Analysis(self.analyzer.analyze(page))),
        }
    }

    /// Post-step settle time and landing-page check for static clicks.
    fn settle<P: PageDriver + ?Sized>(&self, page: &P, command: &Command) {
        if let Some(delay) = command.settle_delay() {
            if let Err(e) = page.pause(delay) {
                warn!(error = %format!("{e:#}"), "settle delay interrupted");
            }
        }
        if let Action::Click(ClickTarget::Selector(selector)) = &command.action {
            self.resolver.verify_navigation(page, selector);
        }
    }
}

/// Only navigation failures end a run.
fn is_fatal(action: &Action) -> bool {
    matches!(action, Action::Goto { .. })
}
