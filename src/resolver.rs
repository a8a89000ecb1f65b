use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::page::PageDriver;
use crate::rules::{ResolverRules, ScoreWeights, contains_ci};
use crate::types::{DynamicTarget, PageElement};

/// The element a dynamic-search click settled on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedElement {
    pub index: usize,
    pub text: String,
    pub description: String,
    pub score: f64,
}

/// Finds click targets by scoring the page's visible interactive elements
/// against a target text and category.
#[derive(Debug, Clone)]
pub struct ElementResolver {
    rules: ResolverRules,
    attempts: u32,
    backoff: Duration,
}

impl ElementResolver {
    pub fn new(rules: ResolverRules) -> Self {
        Self {
            rules,
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Rescan up to `attempts` times, waiting `backoff` and then doubling it,
    /// while the page has no visible interactive element yet.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn resolve<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        target: &DynamicTarget,
    ) -> Result<ResolvedElement> {
        let mut wait = self.backoff;

        for attempt in 1..=self.attempts {
            let elements = page
                .interactive_elements()
                .map_err(|e| AgentError::step("click", e))?;
            let visible: Vec<&PageElement> = elements
                .iter()
                .filter(|el| el.visible && !el.text.trim().is_empty())
                .collect();

            if visible.is_empty() {
                if attempt < self.attempts {
                    debug!(attempt, wait_ms = wait.as_millis() as u64, "no labelled elements yet");
                    page.pause(wait.as_millis() as u64)
                        .map_err(|e| AgentError::step("click", e))?;
                    wait *= 2;
                    continue;
                }
                break;
            }

            if let Some(found) = self.best_match(&visible, target) {
                info!(
                    index = found.index,
                    text = %found.text,
                    score = found.score,
                    "dynamic search matched"
                );
                return Ok(found);
            }
            if let Some(found) = self.href_fallback(&visible) {
                info!(index = found.index, href_hint = %self.rules.href_fallback, "dynamic search fell back to href");
                return Ok(found);
            }
            break;
        }

        warn!(
            target_text = %target.target_text,
            target_category = %target.target_category,
            "dynamic search found nothing"
        );
        Err(AgentError::ElementNotFound(format!(
            "{} / {}",
            target.target_text, target.target_category
        )))
    }

    fn best_match(&self, visible: &[&PageElement], target: &DynamicTarget) -> Option<ResolvedElement> {
        visible
            .iter()
            .filter(|el| {
                let text = el.text.trim();
                contains_ci(text, &target.target_text) || contains_ci(text, &target.target_category)
            })
            .map(|el| (*el, score(&self.rules.weights, el, target)))
            .fold(None, |best: Option<(&PageElement, f64)>, (el, s)| match best {
                Some((_, top)) if top >= s => best,
                _ => Some((el, s)),
            })
            .map(|(el, s)| ResolvedElement {
                index: el.index,
                text: el.text.trim().to_string(),
                description: describe(el),
                score: s,
            })
    }

    fn href_fallback(&self, visible: &[&PageElement]) -> Option<ResolvedElement> {
        visible
            .iter()
            .find(|el| el.href.contains(&self.rules.href_fallback))
            .map(|el| ResolvedElement {
                index: el.index,
                text: el.text.trim().to_string(),
                description: describe(el),
                score: self.rules.weights.href_fallback,
            })
    }

    /// After a static click, check the landing page against the configured
    /// expectations for that selector. Only logs; `None` when no rule applies.
    pub fn verify_navigation<P: PageDriver + ?Sized>(&self, page: &P, selector: &str) -> Option<bool> {
        let rule = self
            .rules
            .verification
            .iter()
            .find(|rule| selector.contains(&rule.selector_hint))?;

        let (title, url) = match (page.title(), page.url()) {
            (Ok(title), Ok(url)) => (title, url),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %format!("{e:#}"), "could not read page after click");
                return Some(false);
            }
        };
        let landed = rule
            .expected
            .iter()
            .any(|k| contains_ci(&title, k) || contains_ci(&url, k));
        if landed {
            info!(%title, %url, "navigation verified");
        } else {
            warn!(%title, %url, expected = ?rule.expected, "landing page does not look right");
        }
        Some(landed)
    }
}

/// Relevance of one element. Text and category matches are case-insensitive
/// substring tests; role and tag add fixed bonuses.
pub fn score(weights: &ScoreWeights, el: &PageElement, target: &DynamicTarget) -> f64 {
    let mut score = 0.0;
    if contains_ci(&el.text, &target.target_text) {
        score += weights.target_text;
    }
    if contains_ci(&el.text, &target.target_category) {
        score += weights.target_category;
    }
    match el.role.as_str() {
        "tab" => score += weights.role_tab,
        "button" => score += weights.role_button,
        _ => {}
    }
    match el.tag.as_str() {
        "a" => score += weights.tag_anchor,
        "button" => score += weights.tag_button,
        _ => {}
    }
    score
}

fn describe(el: &PageElement) -> String {
    let mut out = format!("<{}>", el.tag);
    if !el.role.is_empty() {
        out.push_str(&format!(" role={}", el.role));
    }
    if !el.id.is_empty() {
        out.push_str(&format!(" #{}", el.id));
    }
    out.push_str(&format!(" \"{}\"", el.text.trim()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;
    use crate::testing::{FakePage, element};
    use pretty_assertions::assert_eq;

    fn resolver() -> ElementResolver {
        ElementResolver::new(RuleSet::builtin().unwrap().resolver)
    }

    fn target(text: &str, category: &str) -> DynamicTarget {
        DynamicTarget {
            target_text: text.into(),
            target_category: category.into(),
        }
    }

    #[test]
    fn it_science_tab_scores_highest() {
        let tab = PageElement {
            role: "tab".into(),
            href: "https://news.naver.com/section/105".into(),
            ..element(0, "a", "IT·과학")
        };
        let page = FakePage::default().with_elements(vec![vec![
            tab,
            element(1, "a", "IT 기기 리뷰 모음"),
            element(2, "button", "과학 더보기"),
        ]]);

        let found = resolver().resolve(&page, &target("IT", "과학")).unwrap();
        assert_eq!(found.index, 0);
        assert!((found.score - 1.5).abs() < 1e-9);
    }

    #[test]
    fn category_match_breaks_ties() {
        let page = FakePage::default().with_elements(vec![vec![
            element(0, "div", "경제 일반"),
            element(1, "div", "경제 증권"),
        ]]);

        let found = resolver().resolve(&page, &target("경제", "증권")).unwrap();
        assert_eq!(found.index, 1);
        assert!((found.score - 1.0).abs() < 1e-9);

        let weights = &RuleSet::builtin().unwrap().resolver.weights;
        let first = score(weights, &element(0, "div", "경제 일반"), &target("경제", "증권"));
        assert!((first - 0.6).abs() < 1e-9);
    }

    #[test]
    fn equal_scores_keep_document_order() {
        let page = FakePage::default().with_elements(vec![vec![
            element(3, "a", "정치"),
            element(7, "a", "정치"),
        ]]);
        let found = resolver().resolve(&page, &target("정치", "politics")).unwrap();
        assert_eq!(found.index, 3);
    }

    #[test]
    fn hidden_and_blank_elements_are_ignored() {
        let hidden = PageElement {
            visible: false,
            ..element(0, "a", "IT·과학")
        };
        let page = FakePage::default().with_elements(vec![vec![
            hidden,
            element(1, "a", "   "),
            element(2, "button", "IT"),
        ]]);
        let found = resolver().resolve(&page, &target("IT", "과학")).unwrap();
        assert_eq!(found.index, 2);
    }

    #[test]
    fn falls_back_to_category_href() {
        let link = PageElement {
            href: "https://news.naver.com/main/main.naver?sid1=105".into(),
            ..element(4, "a", "더보기")
        };
        let page = FakePage::default().with_elements(vec![vec![element(0, "a", "홈"), link]]);

        let found = resolver().resolve(&page, &target("IT", "과학")).unwrap();
        assert_eq!(found.index, 4);
        assert_eq!(found.score, 0.8);
    }

    #[test]
    fn icon_only_links_are_not_href_candidates() {
        let icon = PageElement {
            href: "https://news.naver.com/main/main.naver?sid1=105".into(),
            ..element(4, "a", "  ")
        };
        let page = FakePage::default().with_elements(vec![vec![element(0, "a", "홈"), icon]]);

        let err = resolver().resolve(&page, &target("IT", "과학")).unwrap_err();
        assert!(matches!(err, AgentError::ElementNotFound(_)));
    }

    #[test]
    fn no_match_fails_without_retrying() {
        let page = FakePage::default().with_elements(vec![vec![element(0, "a", "홈")]]);
        let resolver = resolver().with_retry(3, Duration::from_millis(100));

        let err = resolver.resolve(&page, &target("IT", "과학")).unwrap_err();
        assert!(matches!(err, AgentError::ElementNotFound(_)));
        assert_eq!(page.calls(), ["interactive_elements"]);
    }

    #[test]
    fn empty_page_is_rescanned_with_backoff() {
        let page = FakePage::default().with_elements(vec![
            vec![],
            vec![],
            vec![element(5, "a", "IT·과학")],
        ]);
        let resolver = resolver().with_retry(3, Duration::from_millis(100));

        let found = resolver.resolve(&page, &target("IT", "과학")).unwrap();
        assert_eq!(found.index, 5);
        assert_eq!(
            page.calls(),
            [
                "interactive_elements",
                "pause 100",
                "interactive_elements",
                "pause 200",
                "interactive_elements"
            ]
        );
    }

    #[test]
    fn gives_up_after_last_attempt() {
        let page = FakePage::default();
        let resolver = resolver().with_retry(2, Duration::from_millis(50));
        assert!(resolver.resolve(&page, &target("IT", "과학")).is_err());
        assert_eq!(page.calls(), ["interactive_elements", "pause 50", "interactive_elements"]);
    }

    #[test]
    fn verification_only_applies_to_hinted_selectors() {
        let page = FakePage::default().with_location("IT/과학 : 네이버 뉴스", "https://news.naver.com/section/105");
        assert_eq!(resolver().verify_navigation(&page, "a[href*='sid1=105']"), Some(true));
        assert_eq!(resolver().verify_navigation(&page, "#search"), None);

        let elsewhere = FakePage::default().with_location("정치 : 네이버 뉴스", "https://news.naver.com/section/100");
        assert_eq!(resolver().verify_navigation(&elsewhere, "a[href*='sid1=105']"), Some(false));
    }
}
