use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyzer::ContentAnalysis;
use crate::intent::{Intent, IntentKind};
use crate::types::ExecutionResult;

/// The answer shown to the user for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserResponse {
    #[serde(rename_all = "camelCase")]
    NewsSummary {
        title: String,
        summary: String,
        sections: Vec<NewsSection>,
        total_news: usize,
        timestamp: DateTime<Utc>,
    },
    General {
        message: String,
        details: ExecutionResult,
    },
    #[serde(rename_all = "camelCase")]
    Action {
        message: String,
        browser_status: &'static str,
        details: ExecutionResult,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsSection {
    pub name: String,
    pub news: Vec<NewsLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsLink {
    pub title: String,
    pub url: String,
    pub section: String,
}

/// Informational requests get the page analysis when one was produced;
/// everything else gets an action report.
pub fn respond(intent: &Intent, result: &ExecutionResult) -> UserResponse {
    if intent.kind != IntentKind::Informational {
        return UserResponse::Action {
            message: "요청하신 작업이 완료되었습니다.".to_string(),
            browser_status: result.browser_status,
            details: result.clone(),
        };
    }
    match result.execution_summary.analysis() {
        Some(analysis) => news_summary(analysis),
        None => UserResponse::General {
            message: "요청하신 정보를 수집했습니다.".to_string(),
            details: result.clone(),
        },
    }
}

fn news_summary(analysis: &ContentAnalysis) -> UserResponse {
    let sections = analysis
        .sections
        .iter()
        .filter_map(|name| {
            let items = analysis.representative_news.get(name)?;
            Some(NewsSection {
                name: display_name(name).to_string(),
                news: items
                    .iter()
                    .map(|item| NewsLink {
                        title: item.text.clone(),
                        url: item.href.clone(),
                        section: item.section.clone(),
                    })
                    .collect(),
            })
        })
        .collect();

    UserResponse::NewsSummary {
        title: "📰 뉴스 헤드라인 요약".to_string(),
        summary: analysis.summary.clone(),
        sections,
        total_news: analysis.total_news,
        timestamp: analysis.timestamp,
    }
}

fn display_name(section: &str) -> &str {
    match section {
        "main" => "📰 주요 뉴스",
        "sidebar" => "📋 인기 뉴스",
        "press" => "🏢 언론사 뉴스",
        "issue" => "🔥 이슈 뉴스",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Viewport;
    use crate::engine::ExecutionEngine;
    use crate::intent::classify;
    use crate::interpreter::validate;
    use crate::rules::RuleSet;
    use crate::testing::{FakePage, container};
    use crate::types::CommandList;
    use serde_json::json;

    fn run(page: &FakePage, commands: serde_json::Value) -> ExecutionResult {
        let rules = RuleSet::builtin().unwrap();
        let engine = ExecutionEngine::new(&rules, Viewport { width: 800, height: 600 }, "shots");
        let list = CommandList::new(validate(commands.as_array().unwrap()).unwrap(), "m");
        engine.run(page, &list)
    }

    #[test]
    fn informational_request_with_analysis_is_a_news_summary() {
        let rules = RuleSet::builtin().unwrap();
        let page = FakePage::default().with_containers(vec![
            container("popular_list", &["이번 주 가장 많이 본 기사 목록"]),
            container("headline_area", &["정부 내년 예산안 국회 제출", "기준금리 동결 결정 발표"]),
        ]);
        let result = run(&page, json!([{"action": "analyzeContent"}]));

        let response = respond(&classify(&rules, "오늘 뉴스 알려줘"), &result);
        let UserResponse::NewsSummary { sections, total_news, .. } = &response else {
            panic!("expected news summary, got {response:?}");
        };
        assert_eq!(*total_news, 3);
        let names: Vec<_> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["📰 주요 뉴스", "📋 인기 뉴스"]);
        assert_eq!(sections[0].news[0].title, "정부 내년 예산안 국회 제출");

        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["type"], "news_summary");
        assert_eq!(wire["totalNews"], 3);
    }

    #[test]
    fn informational_request_without_analysis_is_general() {
        let rules = RuleSet::builtin().unwrap();
        let result = run(&FakePage::default(), json!([{"action": "screenshot"}]));
        let response = respond(&classify(&rules, "날씨 정보"), &result);
        assert!(matches!(response, UserResponse::General { .. }));
    }

    #[test]
    fn actionable_request_is_an_action_report() {
        let rules = RuleSet::builtin().unwrap();
        let result = run(&FakePage::default(), json!([{"action": "goto", "url": "https://a.com"}]));
        let response = respond(&classify(&rules, "네이버 열어줘"), &result);

        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["type"], "action");
        assert_eq!(wire["browserStatus"], "open");
        assert_eq!(wire["details"]["success"], true);
    }

    #[test]
    fn unknown_sections_keep_their_name() {
        assert_eq!(display_name("weather"), "weather");
    }
}
