use anyhow::{Context, Result, anyhow, bail};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub ai: AiConfig,
    pub cors_origin: String,
    pub log: LogConfig,
    pub browser: BrowserConfig,
    pub screenshot_dir: PathBuf,
    pub rules_path: Option<PathBuf>,
    pub search_attempts: u32,
    pub search_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAi,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "google",
            Provider::OpenAi => "openai",
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "google" | "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "local" => Err(anyhow!("AI provider '{s}' is not implemented")),
            other => Err(anyhow!("Unsupported AI provider: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: Provider,
    pub model: String,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl AiConfig {
    /// `provider/model`, as reported in responses.
    pub fn label(&self) -> String {
        format!("{}/{}", self.provider.as_str(), self.model)
    }

    pub fn api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::Gemini => self.gemini_api_key.as_deref(),
            Provider::OpenAi => self.openai_api_key.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub chrome_path: Option<PathBuf>,
    /// Attach to an already running Chrome instead of launching one.
    pub debug_url: Option<String>,
    pub profile_dir: PathBuf,
    pub idle_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let provider: Provider = text("AI_MODEL_PROVIDER", "google").parse()?;
        let model = match provider {
            Provider::Gemini => text("GEMINI_MODEL", "gemini-1.5-flash"),
            Provider::OpenAi => text("OPENAI_MODEL", "gpt-4o-mini"),
        };

        let profile_dir = match var("BROWSER_PROFILE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .map(|dir| dir.join("browser-command-agent").join("profile"))
                .ok_or_else(|| anyhow!("no local data directory; set BROWSER_PROFILE_DIR"))?,
        };

        Ok(Self {
            host: text("HOST", "127.0.0.1"),
            port: number(&var, "PORT", 3001)?,
            environment: text("NODE_ENV", "development"),
            ai: AiConfig {
                provider,
                model,
                gemini_api_key: var("GEMINI_API_KEY"),
                openai_api_key: var("OPENAI_API_KEY"),
            },
            cors_origin: text("CORS_ORIGIN", "http://localhost:3000"),
            log: LogConfig {
                level: text("LOG_LEVEL", "info"),
                file: var("LOG_FILE").map(PathBuf::from),
            },
            browser: BrowserConfig {
                headless: var("BROWSER_HEADLESS").is_some_and(|v| v == "true"),
                viewport: Viewport {
                    width: number(&var, "BROWSER_VIEWPORT_WIDTH", 1280)?,
                    height: number(&var, "BROWSER_VIEWPORT_HEIGHT", 720)?,
                },
                chrome_path: var("BROWSER_CHROME_PATH").map(PathBuf::from),
                debug_url: var("BROWSER_DEBUG_URL"),
                profile_dir,
                idle_timeout: Duration::from_secs(number(&var, "BROWSER_IDLE_TIMEOUT_SECS", 86_400)?),
            },
            screenshot_dir: PathBuf::from(text("SCREENSHOT_DIR", "screenshots")),
            rules_path: var("RULES_FILE").map(PathBuf::from),
            search_attempts: number(&var, "DYNAMIC_SEARCH_ATTEMPTS", 3)?,
            search_backoff: Duration::from_millis(number(&var, "DYNAMIC_SEARCH_BACKOFF_MS", 500)?),
        })
    }

    /// Fail early when the selected provider has no credentials.
    pub fn validate(&self) -> Result<()> {
        if self.ai.api_key().is_none() {
            let key = match self.ai.provider {
                Provider::Gemini => "GEMINI_API_KEY",
                Provider::OpenAi => "OPENAI_API_KEY",
            };
            bail!("Missing required environment variables: {key}");
        }
        if self.search_attempts == 0 {
            bail!("DYNAMIC_SEARCH_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}

fn number<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got '{raw}'")),
        None => Ok(default),
    }
}
