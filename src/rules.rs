use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

const BUILTIN_RULES: &str = include_str!("../rules/default.toml");
const SUPPORTED_VERSION: u32 = 1;

/// Keyword and weight tables driving every substring-based decision:
/// intent, request rewriting, element relevance and content buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: u32,
    pub intent: IntentRules,
    #[serde(default)]
    pub rewrites: Vec<RewriteRule>,
    pub resolver: ResolverRules,
    pub analyzer: AnalyzerRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRules {
    pub informational: Vec<String>,
    pub actionable: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverRules {
    pub href_fallback: String,
    pub weights: ScoreWeights,
    #[serde(default)]
    pub verification: Vec<VerificationRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub target_text: f64,
    pub target_category: f64,
    pub role_tab: f64,
    pub role_button: f64,
    pub tag_anchor: f64,
    pub tag_button: f64,
    pub href_fallback: f64,
}

/// After a static click whose selector contains `selector_hint`, the page
/// title or URL is expected to mention one of `expected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRule {
    pub selector_hint: String,
    pub expected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerRules {
    pub min_link_text: usize,
    pub buckets: Vec<BucketRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl RuleSet {
    /// The rule tables shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_RULES).context("built-in rules are malformed")
    }

    /// Load rules from `path`, or the built-in tables when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::builtin();
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading rules file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing rules file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let rules: RuleSet = toml::from_str(raw)?;
        if rules.version != SUPPORTED_VERSION {
            bail!(
                "unsupported rules version {} (expected {})",
                rules.version,
                SUPPORTED_VERSION
            );
        }
        if rules.analyzer.buckets.is_empty() {
            bail!("rules define no analyzer buckets");
        }
        Ok(rules)
    }
}

/// Case-insensitive substring test used by every rule table.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
