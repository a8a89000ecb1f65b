use anyhow::{Context, Result, anyhow};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{BrowserConfig, Viewport};
use crate::dom;
use crate::page::PageDriver;
use crate::session::{Launcher, Session};
use crate::types::{DomContainer, PageElement};

/// Launches or attaches to Chrome according to configuration.
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

impl Launcher for ChromeLauncher {
    type Session = BrowserSession;

    fn launch(&self) -> Result<BrowserSession> {
        BrowserSession::launch(&self.config)
    }
}

/// A running browser and the one page the agent drives.
pub struct BrowserSession {
    browser: Browser,
    page: ChromePage,
}

impl BrowserSession {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        if let Some(url) = &config.debug_url {
            info!(%url, "attaching to running Chrome");
            match Browser::connect(url.clone()) {
                Ok(browser) => {
                    let tab = {
                        let tabs = browser.get_tabs();
                        let existing = tabs
                            .lock()
                            .map_err(|_| anyhow!("tab list lock poisoned"))?
                            .first()
                            .cloned();
                        match existing {
                            Some(tab) => tab,
                            None => browser.new_tab()?,
                        }
                    };
                    info!("attached to running Chrome");
                    return Ok(Self {
                        browser,
                        page: ChromePage { tab },
                    });
                }
                Err(e) => warn!(error = %e, "could not attach, launching a new browser"),
            }
        }

        std::fs::create_dir_all(&config.profile_dir).with_context(|| {
            format!("creating profile directory {}", config.profile_dir.display())
        })?;

        let options = LaunchOptions {
            headless: config.headless,
            path: config.chrome_path.clone(),
            user_data_dir: Some(config.profile_dir.clone()),
            window_size: Some((config.viewport.width, config.viewport.height)),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: config.idle_timeout,
            ..Default::default()
        };

        info!(headless = config.headless, profile = %config.profile_dir.display(), "launching Chrome");
        let browser = Browser::new(options).context("browser launch failed")?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        info!("Chrome ready");

        Ok(Self {
            browser,
            page: ChromePage { tab },
        })
    }
}

impl Session for BrowserSession {
    type Page = ChromePage;

    fn page(&self) -> &ChromePage {
        &self.page
    }

    fn close(self) -> Result<()> {
        self.page.tab.close(true)?;
        drop(self.browser);
        info!("browser closed");
        Ok(())
    }
}

/// [`PageDriver`] over a headless_chrome tab.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl PageDriver for ChromePage {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?.wait_until_navigated()?;
        Ok(())
    }

    fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let el = self.tab.wait_for_element(selector)?;
        el.click()?;
        dom::clear_value(&self.tab, selector)?;
        self.tab.type_str(value)?;
        Ok(())
    }

    fn press(&self, selector: &str, key: &str) -> Result<()> {
        self.tab.wait_for_element(selector)?.focus()?;
        self.tab.press_key(key)?;
        Ok(())
    }

    fn click(&self, selector: &str) -> Result<()> {
        self.tab.wait_for_element(selector)?.click()?;
        Ok(())
    }

    fn click_element(&self, index: usize) -> Result<()> {
        let elements = self.tab.find_elements(dom::INTERACTIVE_SELECTOR)?;
        let el = elements
            .get(index)
            .ok_or_else(|| anyhow!("interactive element {index} is gone"))?;
        el.click()?;
        Ok(())
    }

    fn pause(&self, ms: u64) -> Result<()> {
        std::thread::sleep(std::time::Duration::from_millis(ms));
        Ok(())
    }

    fn screenshot(&self, path: &Path) -> Result<()> {
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?;
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))
    }

    fn scroll_by(&self, dy: i64) -> Result<()> {
        dom::scroll_by(&self.tab, dy)
    }

    fn text_content(&self, selector: &str) -> Result<Option<String>> {
        dom::text_content(&self.tab, selector)
    }

    fn interactive_elements(&self) -> Result<Vec<PageElement>> {
        dom::capture_elements(&self.tab)
    }

    fn containers(&self, keywords: &[String], min_link_text: usize) -> Result<Vec<DomContainer>> {
        dom::capture_containers(&self.tab, keywords, min_link_text)
    }

    fn title(&self) -> Result<String> {
        self.tab.get_title()
    }

    fn url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.tab.set_bounds(Bounds::Normal {
            left: None,
            top: None,
            width: Some(f64::from(viewport.width)),
            height: Some(f64::from(viewport.height)),
        })?;
        Ok(())
    }
}
