use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use browser_command_agent::brain::Brain;
use browser_command_agent::config::Config;
use browser_command_agent::engine::ExecutionEngine;
use browser_command_agent::face::{self, AgentEvent, AppState};
use browser_command_agent::hands::ChromeLauncher;
use browser_command_agent::interpreter::CommandInterpreter;
use browser_command_agent::logging;
use browser_command_agent::rules::RuleSet;
use browser_command_agent::session::SessionManager;

/// Turns natural-language requests into browser automation over HTTP.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Address to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Rule tables to use instead of the built-in ones (overrides RULES_FILE).
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Run Chrome without a window.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.rules.is_some() {
        config.rules_path = cli.rules;
    }
    config.browser.headless |= cli.headless;

    logging::init(&config.log)?;
    config.validate()?;

    let rules = Arc::new(RuleSet::load(config.rules_path.as_deref())?);
    info!(version = rules.version, "rules loaded");

    let brain = Brain::new(&config.ai)?;
    info!(model = %config.ai.label(), "brain ready");

    let (event_tx, _) = broadcast::channel::<AgentEvent>(64);
    let engine = ExecutionEngine::new(&rules, config.browser.viewport, &config.screenshot_dir)
        .with_search_retry(config.search_attempts, config.search_backoff)
        .with_events(event_tx.clone());

    let state = Arc::new(AppState {
        rules,
        interpreter: CommandInterpreter::new(Arc::new(brain)),
        engine: Arc::new(engine),
        sessions: SessionManager::new(ChromeLauncher::new(config.browser.clone())),
        event_tx,
        environment: config.environment.clone(),
        ai_model: config.ai.label(),
    });

    let app = face::router(state, &config.cors_origin)?;
    face::serve(app, &config.host, config.port).await
}
