use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::brain::TextModel;
use crate::error::{AgentError, Result};
use crate::repair::repair;
use crate::types::{
    Action, ClickTarget, Command, CommandList, DEFAULT_WAIT_MS, DynamicTarget, FALLBACK_WAIT_MS,
    ScrollDirection,
};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[A-Za-z0-9_+-]*[ \t]*\r?\n?([\s\S]+?)\r?\n?```").expect("valid regex")
});
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"']+"#).expect("valid regex"));

const SUPPORTED_ACTIONS: [&str; 9] = [
    "goto",
    "type",
    "press",
    "click",
    "wait",
    "screenshot",
    "scroll",
    "extractText",
    "analyzeContent",
];

const COMMAND_PROMPT: &str = r#"You convert a user's web request into browser automation commands.

Use ONLY these actions:
- {"action":"goto","url":"https://...","description":"..."}
- {"action":"type","selector":"css","value":"text","description":"..."}
- {"action":"press","selector":"css","key":"Enter","description":"..."}
- {"action":"click","selector":"css","description":"..."}
- {"action":"click","requiresDynamicSearch":true,"targetText":"visible text","targetCategory":"hint","description":"..."}
- {"action":"wait","delay":2000,"description":"..."}
- {"action":"screenshot","description":"..."}
- {"action":"scroll","direction":"down","description":"..."}
- {"action":"extractText","selector":"css","description":"..."}
- {"action":"analyzeContent","description":"..."}

Never use waitForSelector, waitForNavigation, fill or selectOption.

Rules:
1. Break complex navigation into small steps with waits after page loads.
2. For tabs, categories and other dynamic elements do NOT guess selectors: use a click with
   requiresDynamicSearch=true and give targetText/targetCategory; the system reads the page
   and finds the element.
3. To report headlines or page content, finish with analyzeContent.
4. Answer with a single ```json fenced block containing the JSON array. No other text.

Example: "네이버 뉴스 IT 카테고리로 이동해줘":
```json
[
  { "action": "goto", "url": "https://news.naver.com", "description": "네이버 뉴스 홈페이지로 이동" },
  { "action": "wait", "delay": 2000, "description": "페이지 로딩 대기" },
  { "action": "click", "requiresDynamicSearch": true, "targetText": "IT", "targetCategory": "과학", "description": "IT·과학 탭 클릭" },
  { "action": "wait", "delay": 2000, "description": "IT 뉴스 페이지 로딩 대기" }
]
```

Example: "경제 주요 헤드라인만 보여줘":
```json
[
  { "action": "goto", "url": "https://news.naver.com", "description": "네이버 뉴스 홈페이지로 이동" },
  { "action": "wait", "delay": 2000, "description": "페이지 로딩 대기" },
  { "action": "click", "requiresDynamicSearch": true, "targetText": "경제", "targetCategory": "경제", "description": "경제 탭 클릭" },
  { "action": "wait", "delay": 2000, "description": "경제 뉴스 페이지 로딩 대기" },
  { "action": "analyzeContent", "description": "경제 헤드라인 분석" }
]
```

Request: "#;

const DYNAMIC_PROMPT: &str = r#"The text below was supposed to be a JSON array of browser automation commands but could not be parsed.
Work out what the user wants the browser to do and produce a new command list.

Do not hardcode selectors for tabs, menus or categories. Use
{"action":"click","requiresDynamicSearch":true,"targetText":"text on the page","targetCategory":"hint"}
so the element is found by reading the page. Supported actions: goto, type, press, click, wait,
screenshot, scroll, extractText, analyzeContent.

Answer with a single ```json fenced block containing the array, for example:
```json
[
  { "action": "goto", "url": "https://news.naver.com", "description": "페이지로 이동" },
  { "action": "wait", "delay": 2000, "description": "페이지 로딩 대기" },
  { "action": "click", "requiresDynamicSearch": true, "targetText": "IT", "targetCategory": "과학", "description": "동적 탐색 클릭" }
]
```

Text to analyze:
"#;

/// Turns model output into a validated [`CommandList`].
pub struct CommandInterpreter {
    model: Arc<dyn TextModel>,
}

impl CommandInterpreter {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Ask the model for a plan for `request` and interpret its reply.
    pub async fn generate(&self, request: &str) -> Result<CommandList> {
        let started = std::time::Instant::now();
        let reply = self
            .model
            .complete(&format!("{COMMAND_PROMPT}\"{request}\""))
            .await
            .map_err(|e| AgentError::Model(format!("{e:#}")))?;
        let list = self.build(&reply).await?;
        info!(
            commands = list.len(),
            model = list.model_used(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command list generated"
        );
        Ok(list)
    }

    /// Interpret raw model text: parse with repair, then one secondary
    /// generation pass, then a bare URL extraction.
    pub async fn build(&self, raw: &str) -> Result<CommandList> {
        if let Some(values) = parse_array(raw) {
            return Ok(CommandList::new(validate(&values)?, self.model.label()));
        }
        warn!("model output is not a command array, requesting a dynamic-search plan");

        match self.model.complete(&format!("{DYNAMIC_PROMPT}{raw}")).await {
            Ok(reply) => {
                if let Some(values) = parse_array(&reply) {
                    info!("secondary plan parsed");
                    return Ok(CommandList::new(validate(&values)?, self.model.label()));
                }
                warn!("secondary plan is not a command array either");
            }
            Err(e) => warn!(error = %format!("{e:#}"), "secondary generation failed"),
        }

        let commands = heuristic_commands(raw)?;
        info!("falling back to a bare navigation plan");
        Ok(CommandList::new(commands, self.model.label()))
    }
}

/// The first fenced block's body, or the whole text when there is none.
pub fn extract_candidate(text: &str) -> &str {
    FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str())
}

/// Extract, repair and parse; `None` unless the result is a non-empty array.
fn parse_array(text: &str) -> Option<Vec<Value>> {
    let cleaned = repair(extract_candidate(text));
    debug!(%cleaned, "repaired model output");
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Array(values)) if !values.is_empty() => Some(values),
        Ok(_) => {
            warn!("model output parsed but is not a non-empty array");
            None
        }
        Err(e) => {
            warn!(error = %e, "model output is not valid JSON");
            None
        }
    }
}

fn heuristic_commands(raw: &str) -> Result<Vec<Command>> {
    let url = URL
        .find(raw)
        .ok_or_else(|| AgentError::Parse("No commands could be extracted from response".into()))?;
    Ok(vec![
        Command::new(
            Action::Goto {
                url: url.as_str().to_string(),
            },
            "페이지로 이동",
        ),
        Command::new(
            Action::Wait {
                delay: FALLBACK_WAIT_MS,
            },
            "페이지 로딩 대기",
        ),
    ])
}

/// Validate and normalize a parsed array. Any invalid element fails the
/// whole batch.
pub fn validate(values: &[Value]) -> Result<Vec<Command>> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| validate_one(index, value))
        .collect()
}

fn validate_one(index: usize, value: &Value) -> Result<Command> {
    let missing = |action: &str, field: &'static str| AgentError::MissingField {
        index,
        action: action.to_string(),
        field,
    };
    let obj = value.as_object().ok_or_else(|| missing("unknown", "action"))?;
    let declared = text(obj, "action").ok_or_else(|| missing("unknown", "action"))?;

    let name = match declared.as_str() {
        "waitForSelector" => {
            let target = text(obj, "selector").unwrap_or_else(|| "to load".into());
            return Ok(Command::new(
                Action::Wait { delay: 2000 },
                format!("Waiting for element {target} (converted from waitForSelector)"),
            ));
        }
        "waitForNavigation" => {
            return Ok(Command::new(
                Action::Wait { delay: 3000 },
                "Waiting for page navigation to complete (converted from waitForNavigation)",
            ));
        }
        "fill" => {
            let selector = text(obj, "selector").unwrap_or_default();
            debug!(index, from = "fill", to = "type", "converted legacy action");
            return Ok(Command::new(
                Action::Type {
                    value: text(obj, "value").unwrap_or_default(),
                    selector: selector.clone(),
                },
                format!("Filling form field {selector} (converted from fill)"),
            ));
        }
        "selectOption" => {
            let selector = text(obj, "selector").unwrap_or_default();
            debug!(index, from = "selectOption", to = "click", "converted legacy action");
            return Ok(Command::new(
                Action::Click(ClickTarget::Selector(selector.clone())),
                format!("Selecting option in {selector} (converted from selectOption)"),
            ));
        }
        supported if SUPPORTED_ACTIONS.contains(&supported) => supported,
        other => {
            return Err(AgentError::UnsupportedAction {
                index,
                action: other.to_string(),
            });
        }
    };
    let required = |field: &'static str| text(obj, field).ok_or_else(|| missing(name, field));
    let delay = obj.get("delay").and_then(Value::as_u64).filter(|d| *d > 0);

    let action = match name {
        "goto" => Action::Goto {
            url: required("url")?,
        },
        "type" => Action::Type {
            selector: required("selector")?,
            value: required("value")?,
        },
        "press" => Action::Press {
            selector: required("selector")?,
            key: required("key")?,
        },
        "click" if obj.get("requiresDynamicSearch").and_then(Value::as_bool) == Some(true) => {
            Action::Click(ClickTarget::Dynamic(DynamicTarget {
                target_text: required("targetText")?,
                target_category: required("targetCategory")?,
            }))
        }
        "click" => Action::Click(ClickTarget::Selector(required("selector")?)),
        "wait" => Action::Wait {
            delay: delay.unwrap_or(DEFAULT_WAIT_MS),
        },
        "screenshot" => Action::Screenshot,
        "scroll" => Action::Scroll {
            direction: match text(obj, "direction").as_deref() {
                Some("up") => ScrollDirection::Up,
                None | Some("down") => ScrollDirection::Down,
                Some(other) => {
                    warn!(index, direction = other, "unknown scroll direction, scrolling down");
                    ScrollDirection::Down
                }
            },
        },
        "extractText" => Action::ExtractText {
            selector: required("selector")?,
        },
        _ => Action::AnalyzeContent,
    };

    let description = text(obj, "description").unwrap_or_else(|| format!("{name} action"));

    Ok(Command {
        delay: if name == "wait" { None } else { delay },
        action,
        description,
    })
}

/// A non-empty string field. Numbers are accepted and stringified.
fn text(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
