use anyhow::{Context, Result};
use headless_chrome::Tab;
use std::sync::Arc;

use crate::types::{DomContainer, PageElement};

/// Elements the dynamic search considers clickable.
pub const INTERACTIVE_SELECTOR: &str = r#"a, button, [role="tab"], [role="button"]"#;

/// Describes every interactive element in document order. Indexes line up
/// with `querySelectorAll(INTERACTIVE_SELECTOR)`.
const ELEMENTS_JS: &str = r#"
(() => {
  const nodes = Array.from(document.querySelectorAll(__SELECTOR__));
  return JSON.stringify(nodes.map((el, index) => ({
    index,
    tag: el.tagName.toLowerCase(),
    text: (el.textContent || '').trim(),
    href: el.href || '',
    className: typeof el.className === 'string' ? el.className : '',
    id: el.id || '',
    role: el.getAttribute('role') || '',
    visible: el.offsetWidth > 0 && el.offsetHeight > 0
  })));
})()
"#;

/// Single pass over the DOM: every element whose class name or id contains
/// one of the keywords, with its qualifying descendant links.
const CONTAINERS_JS: &str = r#"
(() => {
  const keywords = __KEYWORDS__.map(k => k.toLowerCase());
  const minText = __MIN_TEXT__;
  const out = [];
  for (const el of document.querySelectorAll('*')) {
    const className = typeof el.className === 'string' ? el.className : '';
    const id = el.id || '';
    if (!className && !id) continue;
    const haystack = (className + ' ' + id).toLowerCase();
    if (!keywords.some(k => haystack.includes(k))) continue;
    const links = [];
    for (const link of el.querySelectorAll('a')) {
      const text = (link.textContent || '').trim();
      if (text.length > minText) links.push({ text, href: link.href || '' });
    }
    out.push({ className, id, links });
  }
  return JSON.stringify(out);
})()
"#;

/// Quote `value` as a JavaScript string literal.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn evaluate_string(tab: &Arc<Tab>, script: &str) -> Result<String> {
    let result = tab.evaluate(script, false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default())
}

/// Capture the interactive elements of the current page.
pub fn capture_elements(tab: &Arc<Tab>) -> Result<Vec<PageElement>> {
    let script = ELEMENTS_JS.replace("__SELECTOR__", &js_string(INTERACTIVE_SELECTOR));
    let raw = evaluate_string(tab, &script)?;
    serde_json::from_str(&raw).context("element scan returned malformed JSON")
}

/// Capture keyword-matching containers of the current page.
pub fn capture_containers(
    tab: &Arc<Tab>,
    keywords: &[String],
    min_link_text: usize,
) -> Result<Vec<DomContainer>> {
    let script = CONTAINERS_JS
        .replace("__KEYWORDS__", &serde_json::to_string(keywords)?)
        .replace("__MIN_TEXT__", &min_link_text.to_string());
    let raw = evaluate_string(tab, &script)?;
    serde_json::from_str(&raw).context("container scan returned malformed JSON")
}

/// Text content of the first element matching `selector`.
pub fn text_content(tab: &Arc<Tab>, selector: &str) -> Result<Option<String>> {
    let script = format!(
        "(() => {{ const el = document.querySelector({}); return el ? JSON.stringify(el.textContent) : 'null'; }})()",
        js_string(selector)
    );
    let raw = evaluate_string(tab, &script)?;
    serde_json::from_str(&raw).context("text read returned malformed JSON")
}

/// Clear the value of the input matched by `selector`.
pub fn clear_value(tab: &Arc<Tab>, selector: &str) -> Result<()> {
    tab.evaluate(
        &format!(
            "(() => {{ const el = document.querySelector({}); if (el) el.value = ''; }})()",
            js_string(selector)
        ),
        false,
    )?;
    Ok(())
}

pub fn scroll_by(tab: &Arc<Tab>, dy: i64) -> Result<()> {
    tab.evaluate(&format!("window.scrollBy(0, {dy})"), false)?;
    Ok(())
}
