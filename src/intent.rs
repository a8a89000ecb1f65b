use serde::Serialize;

use crate::rules::{RuleSet, contains_ci};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Informational,
    Actionable,
    Mixed,
}

/// Whether the user wants to watch the browser work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserMode {
    Foreground,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    #[serde(rename = "type")]
    pub kind: IntentKind,
    pub reason: &'static str,
    pub browser_mode: BrowserMode,
}

/// Classify a request by keyword cues. Actionable cues win over
/// informational ones.
pub fn classify(rules: &RuleSet, text: &str) -> Intent {
    let has_cue = |cues: &[String]| cues.iter().any(|cue| contains_ci(text, cue));

    if has_cue(&rules.intent.actionable) {
        Intent {
            kind: IntentKind::Actionable,
            reason: "사용자가 웹에서 직접 액션을 수행하고 싶어함 (브라우저 포어그라운드)",
            browser_mode: BrowserMode::Foreground,
        }
    } else if has_cue(&rules.intent.informational) {
        Intent {
            kind: IntentKind::Informational,
            reason: "사용자가 정보를 알고 싶어함 (콘텐츠 추출 후 채팅 응답)",
            browser_mode: BrowserMode::Background,
        }
    } else {
        Intent {
            kind: IntentKind::Mixed,
            reason: "의도가 명확하지 않음 (기본값으로 처리)",
            browser_mode: BrowserMode::Background,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteMethod {
    PriorityPatternMatching,
    NoPattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedInput {
    pub success: bool,
    pub original_input: String,
    pub processed_command: String,
    pub method: RewriteMethod,
    pub intent: Intent,
}

/// Rewrite a loose request into a canonical command sentence using the
/// ordered rewrite table. Requests matching no pattern pass through as-is.
pub fn quick_process(rules: &RuleSet, input: &str) -> ProcessedInput {
    let intent = classify(rules, input);

    match rules
        .rewrites
        .iter()
        .find(|rule| contains_ci(input, &rule.pattern))
    {
        Some(rule) => ProcessedInput {
            success: true,
            original_input: input.to_string(),
            processed_command: rule.command.clone(),
            method: RewriteMethod::PriorityPatternMatching,
            intent,
        },
        None => ProcessedInput {
            success: false,
            original_input: input.to_string(),
            processed_command: input.to_string(),
            method: RewriteMethod::NoPattern,
            intent,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rules() -> RuleSet {
        RuleSet::builtin().unwrap()
    }

    #[test]
    fn news_question_is_informational() {
        let intent = classify(&rules(), "정치 뉴스는?");
        assert_eq!(intent.kind, IntentKind::Informational);
        assert_eq!(intent.browser_mode, BrowserMode::Background);
    }

    #[test]
    fn actionable_wins_over_informational() {
        let intent = classify(&rules(), "뉴스 사이트 열어줘");
        assert_eq!(intent.kind, IntentKind::Actionable);
        assert_eq!(intent.browser_mode, BrowserMode::Foreground);
    }

    #[test]
    fn no_cue_is_mixed() {
        let intent = classify(&rules(), "hello there");
        assert_eq!(intent.kind, IntentKind::Mixed);
        assert_eq!(intent.browser_mode, BrowserMode::Background);
    }

    #[test]
    fn rewrites_category_question() {
        let processed = quick_process(&rules(), "정치 뉴스는?");
        assert_eq!(processed.processed_command, "네이버 뉴스 정치 카테고리로 이동해줘");
        assert_eq!(processed.method, RewriteMethod::PriorityPatternMatching);
        assert_eq!(processed.intent.kind, IntentKind::Informational);
        assert!(processed.success);
    }

    #[test]
    fn specific_patterns_take_priority() {
        let processed = quick_process(&rules(), "경제 주요 헤드라인 알려줘");
        assert_eq!(processed.processed_command, "경제 주요 헤드라인만 보여줘");
    }

    #[test]
    fn pattern_match_ignores_case() {
        let processed = quick_process(&rules(), "it 소식 있어?");
        assert_eq!(processed.processed_command, "네이버 뉴스 IT 카테고리로 이동해줘");
    }

    #[test]
    fn unmatched_input_passes_through() {
        let processed = quick_process(&rules(), "구글에서 노트북 검색해줘");
        assert!(!processed.success);
        assert_eq!(processed.method, RewriteMethod::NoPattern);
        assert_eq!(processed.processed_command, "구글에서 노트북 검색해줘");
        assert_eq!(processed.intent.kind, IntentKind::Actionable);
    }

    #[test]
    fn intent_serializes_with_wire_names() {
        let value = serde_json::to_value(classify(&rules(), "날씨 알려줘")).unwrap();
        assert_eq!(value["type"], "informational");
        assert_eq!(value["browserMode"], "background");
    }
}
