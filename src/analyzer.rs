use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::page::PageDriver;
use crate::rules::{AnalyzerRules, contains_ci};

const REPRESENTATIVE_PER_SECTION: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub text: String,
    pub href: String,
    pub section: String,
}

/// Links on the current page grouped into semantic sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAnalysis {
    /// Links across all sections. A link inside containers of two sections
    /// counts twice.
    pub total_news: usize,
    /// Sections that matched at least one container, in rule order.
    pub sections: Vec<String>,
    pub section_counts: BTreeMap<String, usize>,
    pub representative_news: BTreeMap<String, Vec<NewsItem>>,
    pub all_news_texts: Vec<String>,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContentAnalysis {
    fn failed(error: String) -> Self {
        Self {
            total_news: 0,
            sections: Vec::new(),
            section_counts: BTreeMap::new(),
            representative_news: BTreeMap::new(),
            all_news_texts: Vec::new(),
            summary: "뉴스 분석 중 오류가 발생했습니다.".to_string(),
            timestamp: Utc::now(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentAnalyzer {
    rules: AnalyzerRules,
}

impl ContentAnalyzer {
    pub fn new(rules: AnalyzerRules) -> Self {
        Self { rules }
    }

    /// Scan the page once and bucket its links. Never fails: a broken scan
    /// yields an empty analysis carrying the error.
    pub fn analyze<P: PageDriver + ?Sized>(&self, page: &P) -> ContentAnalysis {
        let keywords: Vec<String> = self
            .rules
            .buckets
            .iter()
            .flat_map(|b| b.keywords.iter().cloned())
            .collect();

        let containers = match page.containers(&keywords, self.rules.min_link_text) {
            Ok(containers) => containers,
            Err(e) => {
                let error = format!("{e:#}");
                warn!(%error, "content scan failed");
                return ContentAnalysis::failed(error);
            }
        };

        let mut matched = vec![false; self.rules.buckets.len()];
        let mut items: Vec<Vec<NewsItem>> = vec![Vec::new(); self.rules.buckets.len()];

        for container in &containers {
            for (slot, bucket) in self.rules.buckets.iter().enumerate() {
                let hit = bucket.keywords.iter().any(|k| {
                    contains_ci(&container.class_name, k) || contains_ci(&container.id, k)
                });
                if !hit {
                    continue;
                }
                matched[slot] = true;
                items[slot].extend(
                    container
                        .links
                        .iter()
                        .filter(|link| link.text.trim().chars().count() > self.rules.min_link_text)
                        .map(|link| NewsItem {
                            text: link.text.trim().to_string(),
                            href: link.href.clone(),
                            section: bucket.name.clone(),
                        }),
                );
            }
        }

        let mut analysis = ContentAnalysis {
            total_news: 0,
            sections: Vec::new(),
            section_counts: BTreeMap::new(),
            representative_news: BTreeMap::new(),
            all_news_texts: Vec::new(),
            summary: String::new(),
            timestamp: Utc::now(),
            error: None,
        };

        for ((bucket, found), hit) in self.rules.buckets.iter().zip(items).zip(matched) {
            analysis.section_counts.insert(bucket.name.clone(), found.len());
            analysis.total_news += found.len();
            if hit {
                analysis.sections.push(bucket.name.clone());
            }
            if !found.is_empty() {
                let picked: Vec<NewsItem> =
                    found.into_iter().take(REPRESENTATIVE_PER_SECTION).collect();
                analysis
                    .all_news_texts
                    .extend(picked.iter().map(|item| item.text.clone()));
                analysis.representative_news.insert(bucket.name.clone(), picked);
            }
        }

        analysis.summary = format!(
            "총 {}개의 뉴스를 {}개 구역에서 찾았습니다. 각 구역별 대표 뉴스를 추출했습니다.",
            analysis.total_news,
            analysis.sections.len()
        );
        info!(
            total = analysis.total_news,
            sections = ?analysis.sections,
            "content analyzed"
        );
        analysis
    }
}
