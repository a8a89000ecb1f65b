//! In-memory stand-ins for the browser and the language model.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::brain::TextModel;
use crate::config::Viewport;
use crate::page::PageDriver;
use crate::session::{Launcher, Session};
use crate::types::{DomContainer, LinkSnapshot, PageElement};

#[derive(Default)]
struct PageState {
    calls: Vec<String>,
    snapshots: VecDeque<Vec<PageElement>>,
    containers: Vec<DomContainer>,
    fail_on: Vec<String>,
    texts: HashMap<String, String>,
    title: String,
    url: String,
}

/// A page that records every driver call as a short string such as
/// `navigate https://a.com` or `click_element 3`.
#[derive(Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
}

impl FakePage {
    /// Element snapshots returned by successive scans. The last one repeats.
    pub fn with_elements(self, snapshots: Vec<Vec<PageElement>>) -> Self {
        self.state.lock().unwrap().snapshots = snapshots.into();
        self
    }

    pub fn with_containers(self, containers: Vec<DomContainer>) -> Self {
        self.state.lock().unwrap().containers = containers;
        self
    }

    /// Fail every call whose recorded form starts with `prefix`.
    pub fn failing(self, prefix: &str) -> Self {
        self.state.lock().unwrap().fail_on.push(prefix.to_string());
        self
    }

    pub fn with_text(self, selector: &str, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .texts
            .insert(selector.to_string(), text.to_string());
        self
    }

    pub fn with_location(self, title: &str, url: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.title = title.to_string();
            state.url = url.to_string();
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let failed = state.fail_on.iter().any(|p| call.starts_with(p.as_str()));
        state.calls.push(call.clone());
        if failed {
            bail!("{call} failed");
        }
        Ok(())
    }
}

impl PageDriver for FakePage {
    fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate {url}"))
    }

    fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("fill {selector} {value}"))
    }

    fn press(&self, selector: &str, key: &str) -> Result<()> {
        self.record(format!("press {selector} {key}"))
    }

    fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click {selector}"))
    }

    fn click_element(&self, index: usize) -> Result<()> {
        self.record(format!("click_element {index}"))
    }

    fn pause(&self, ms: u64) -> Result<()> {
        self.record(format!("pause {ms}"))
    }

    fn screenshot(&self, path: &Path) -> Result<()> {
        self.record(format!("screenshot {}", path.display()))
    }

    fn scroll_by(&self, dy: i64) -> Result<()> {
        self.record(format!("scroll_by {dy}"))
    }

    fn text_content(&self, selector: &str) -> Result<Option<String>> {
        self.record(format!("text_content {selector}"))?;
        Ok(self.state.lock().unwrap().texts.get(selector).cloned())
    }

    fn interactive_elements(&self) -> Result<Vec<PageElement>> {
        self.record("interactive_elements".to_string())?;
        let mut state = self.state.lock().unwrap();
        if state.snapshots.len() > 1 {
            return Ok(state.snapshots.pop_front().unwrap_or_default());
        }
        Ok(state.snapshots.front().cloned().unwrap_or_default())
    }

    fn containers(&self, _keywords: &[String], min_link_text: usize) -> Result<Vec<DomContainer>> {
        self.record("containers".to_string())?;
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .map(|c| DomContainer {
                links: c
                    .links
                    .iter()
                    .filter(|l| l.text.trim().chars().count() > min_link_text)
                    .cloned()
                    .collect(),
                ..c.clone()
            })
            .collect())
    }

    fn title(&self) -> Result<String> {
        self.record("title".to_string())?;
        Ok(self.state.lock().unwrap().title.clone())
    }

    fn url(&self) -> Result<String> {
        self.record("url".to_string())?;
        Ok(self.state.lock().unwrap().url.clone())
    }

    fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.record(format!("set_viewport {}x{}", viewport.width, viewport.height))
    }
}

/// A visible interactive element with no role, href, class or id.
pub fn element(index: usize, tag: &str, text: &str) -> PageElement {
    PageElement {
        index,
        tag: tag.to_string(),
        text: text.to_string(),
        href: String::new(),
        class_name: String::new(),
        id: String::new(),
        role: String::new(),
        visible: true,
    }
}

pub fn container(class_name: &str, links: &[&str]) -> DomContainer {
    DomContainer {
        class_name: class_name.to_string(),
        id: String::new(),
        links: links
            .iter()
            .enumerate()
            .map(|(i, text)| LinkSnapshot {
                text: text.to_string(),
                href: format!("https://news.example.com/{class_name}/{i}"),
            })
            .collect(),
    }
}

pub struct FakeSession {
    page: FakePage,
    fail_close: bool,
}

impl Session for FakeSession {
    type Page = FakePage;

    fn page(&self) -> &FakePage {
        &self.page
    }

    fn close(self) -> Result<()> {
        if self.fail_close {
            bail!("browser process did not exit");
        }
        Ok(())
    }
}

pub struct FakeLauncher {
    factory: Box<dyn Fn() -> FakePage + Send + Sync>,
    launches: Arc<AtomicUsize>,
    fail_launch: bool,
    fail_close: bool,
}

impl FakeLauncher {
    pub fn new(factory: impl Fn() -> FakePage + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            launches: Arc::new(AtomicUsize::new(0)),
            fail_launch: false,
            fail_close: false,
        }
    }

    /// Every launch hands out a handle to the same `page`.
    pub fn with_page(page: FakePage) -> Self {
        Self::new(move || page.clone())
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn launches(&self) -> Arc<AtomicUsize> {
        self.launches.clone()
    }
}

impl Launcher for FakeLauncher {
    type Session = FakeSession;

    fn launch(&self) -> Result<FakeSession> {
        if self.fail_launch {
            return Err(anyhow!("chrome binary not found"));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            page: (self.factory)(),
            fail_close: self.fail_close,
        })
    }
}

/// Replays canned replies and records every prompt it receives.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn with(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::default(),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted reply")))
    }

    fn label(&self) -> String {
        "test/scripted".into()
    }
}
