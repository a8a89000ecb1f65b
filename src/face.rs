use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::engine::ExecutionEngine;
use crate::error::AgentError;
use crate::intent::quick_process;
use crate::interpreter::CommandInterpreter;
use crate::reply::respond;
use crate::rules::RuleSet;
use crate::session::{Launcher, SessionManager};

/// Progress events streamed to clients via SSE. The SSE event name matches
/// the `event` tag of the JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking {
        request: String,
    },
    Step {
        number: usize,
        action: &'static str,
        description: String,
    },
    StepError {
        number: usize,
        action: &'static str,
        message: String,
    },
    TaskComplete {
        successful: usize,
        failed: usize,
        total: usize,
    },
    TaskError {
        message: String,
    },
    Ready,
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::Step { .. } => "step",
            AgentEvent::StepError { .. } => "step_error",
            AgentEvent::TaskComplete { .. } => "task_complete",
            AgentEvent::TaskError { .. } => "task_error",
            AgentEvent::Ready => "ready",
        }
    }
}

pub struct AppState<L: Launcher> {
    pub rules: Arc<RuleSet>,
    pub interpreter: CommandInterpreter,
    pub engine: Arc<ExecutionEngine>,
    pub sessions: SessionManager<L>,
    pub event_tx: broadcast::Sender<AgentEvent>,
    /// Deployment label reported by `/health`.
    pub environment: String,
    pub ai_model: String,
}

/// All routes, with CORS restricted to `cors_origin`.
pub fn router<L: Launcher>(state: Arc<AppState<L>>, cors_origin: &str) -> Result<Router> {
    let origin: HeaderValue = cors_origin
        .parse()
        .with_context(|| format!("invalid CORS origin '{cors_origin}'"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(Router::new()
        .route("/run-command", post(run_command::<L>))
        .route("/browser/status", get(browser_status::<L>))
        .route("/browser/close", post(browser_close::<L>))
        .route("/health", get(health::<L>))
        .route("/events", get(sse_handler::<L>))
        .layer(cors)
        .with_state(state))
}

pub async fn serve(app: Router, host: &str, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("could not bind {host}:{port}"))?;
    info!("server listening on http://{host}:{port}");
    axum::serve(listener, app).await.context("server stopped")
}

fn pipeline_error(err: &AgentError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": err.to_string(),
            "intent": { "type": "error", "reason": "처리 중 오류가 발생했습니다." },
        })),
    )
        .into_response()
}

async fn run_command<L: Launcher>(
    State(state): State<Arc<AppState<L>>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let input = payload.ok().and_then(|Json(body)| {
        body.get("input")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    });
    let Some(input) = input else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Input is required" })),
        )
            .into_response();
    };
    info!(%input, "POST /run-command");

    let processed = quick_process(&state.rules, &input);
    info!(
        command = %processed.processed_command,
        method = ?processed.method,
        intent = ?processed.intent.kind,
        "input processed"
    );
    let _ = state.event_tx.send(AgentEvent::Thinking {
        request: processed.processed_command.clone(),
    });

    let commands = match state.interpreter.generate(&processed.processed_command).await {
        Ok(commands) => commands,
        Err(e) => {
            error!(error = %e, "command generation failed");
            let _ = state.event_tx.send(AgentEvent::TaskError {
                message: e.to_string(),
            });
            let _ = state.event_tx.send(AgentEvent::Ready);
            return pipeline_error(&e);
        }
    };

    let engine = state.engine.clone();
    let outcome = state
        .sessions
        .run(move |page| engine.run(page, &commands))
        .await;
    let _ = state.event_tx.send(AgentEvent::Ready);

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "browser session unavailable");
            return pipeline_error(&e);
        }
    };

    let user_response = respond(&processed.intent, &result);
    Json(json!({
        "success": true,
        "intent": processed.intent,
        "userResponse": user_response,
        "executionResult": result,
    }))
    .into_response()
}

async fn browser_status<L: Launcher>(State(state): State<Arc<AppState<L>>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "browser": state.sessions.status(),
        "timestamp": Utc::now(),
    }))
}

async fn browser_close<L: Launcher>(State(state): State<Arc<AppState<L>>>) -> Response {
    match state.sessions.close().await {
        Ok(outcome) => Json(json!({
            "success": true,
            "result": outcome,
            "timestamp": Utc::now(),
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "browser close failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": e.to_string(),
                    "timestamp": Utc::now(),
                })),
            )
                .into_response()
        }
    }
}

async fn health<L: Launcher>(State(state): State<Arc<AppState<L>>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "environment": state.environment,
        "aiModel": state.ai_model,
        "features": {
            "smartInputProcessing": true,
            "intentRecognition": true,
            "webAutomation": true,
            "persistentBrowser": true,
        },
    }))
}

async fn sse_handler<L: Launcher>(
    State(state): State<Arc<AppState<L>>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<AgentEvent, _>| match result {
            Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                Ok(sse) => Some(Ok::<_, Infallible>(sse)),
                Err(e) => {
                    warn!(error = %e, event = event.name(), "dropping unencodable event");
                    None
                }
            },
            Err(_) => None,
        });
    Sse::new(stream)
}
