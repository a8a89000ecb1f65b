use anyhow::Result;
use std::path::Path;

use crate::config::Viewport;
use crate::types::{DomContainer, PageElement};

/// Browser-driver primitives the engine needs from a live page.
///
/// Calls block until the browser has carried them out; the engine runs on a
/// blocking worker thread.
pub trait PageDriver: Send + Sync {
    fn navigate(&self, url: &str) -> Result<()>;

    /// Replace the value of the input matched by `selector`.
    fn fill(&self, selector: &str, value: &str) -> Result<()>;

    fn press(&self, selector: &str, key: &str) -> Result<()>;

    fn click(&self, selector: &str) -> Result<()>;

    /// Click the element at `index` among [`crate::dom::INTERACTIVE_SELECTOR`]
    /// matches, in document order.
    fn click_element(&self, index: usize) -> Result<()>;

    fn pause(&self, ms: u64) -> Result<()>;

    fn screenshot(&self, path: &Path) -> Result<()>;

    fn scroll_by(&self, dy: i64) -> Result<()>;

    /// Text content of the first match, `None` when nothing matches.
    fn text_content(&self, selector: &str) -> Result<Option<String>>;

    /// Every interactive element, visible or not, in document order.
    fn interactive_elements(&self) -> Result<Vec<PageElement>>;

    /// Elements whose class name or id contains one of `keywords`, each with
    /// its descendant links longer than `min_link_text` characters.
    fn containers(&self, keywords: &[String], min_link_text: usize) -> Result<Vec<DomContainer>>;

    fn title(&self) -> Result<String>;

    fn url(&self) -> Result<String>;

    fn set_viewport(&self, viewport: Viewport) -> Result<()>;
}
