//! Tool registry and dispatch: scope gate, context marker, response shaping.
//!
//! Dispatch never throws. Unknown tools come back as a diagnostic chunk,
//! handler errors as prose carrying their error code, and anything that
//! panics inside a handler is caught at the task boundary and mapped to an
//! `INTERNAL` chunk.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use chainguard_core::config::{CONTEXT_REFRESH_TEXT, SCOPE_BLOCKED_TEXT};
use chainguard_core::project::ProjectHandle;
use chainguard_core::Result;
use chainguard_protocol::{ToolRequest, ToolResponse, CONTEXT_FIELD, CONTEXT_MARKER};

use crate::handlers::{self, AppState};

/// One resolved tool invocation.
pub struct ToolCall {
    pub project: Arc<ProjectHandle>,
    pub args: Value,
    pub working_dir: PathBuf,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send>>;
pub type HandlerFn = fn(Arc<AppState>, ToolCall) -> HandlerFuture;

/// Tools that work before a scope exists.
fn is_always_allowed(tool: &str) -> bool {
    matches!(tool, "set_scope" | "projects" | "config") || tool.starts_with("kanban_")
}

pub struct Dispatcher {
    state: Arc<AppState>,
    registry: HashMap<&'static str, HandlerFn>,
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            registry: handlers::registry().into_iter().collect(),
        }
    }

    pub async fn dispatch(&self, request: ToolRequest) -> ToolResponse {
        let id = request.id.clone();
        let chunks = self.run(request).await;
        ToolResponse::ok(id, chunks)
    }

    async fn run(&self, request: ToolRequest) -> Vec<String> {
        let handler = match self.registry.get(request.tool.as_str()) {
            Some(handler) => *handler,
            None => {
                return vec![format!(
                    "UNKNOWN_TOOL: no tool named `{}` is registered",
                    request.tool
                )]
            }
        };

        let args = if request.arguments.is_object() {
            request.arguments.clone()
        } else {
            Value::Object(serde_json::Map::new())
        };

        let working_dir = match args.get("working_dir").and_then(Value::as_str) {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => match std::env::current_dir() {
                Ok(dir) => dir,
                Err(err) => {
                    return vec![format!("IO_FAIL: cannot resolve working directory: {}", err)]
                }
            },
        };

        let project = match self.state.manager.project_for_dir(&working_dir).await {
            Ok(project) => project,
            Err(err) => return vec![format!("{}: {}", err.code(), err)],
        };

        // Scope gate: almost everything requires a declared task.
        if !is_always_allowed(&request.tool) {
            let has_scope = project.state().await.scope.is_some();
            if !has_scope {
                return vec![SCOPE_BLOCKED_TEXT.to_string()];
            }
        }

        let has_marker = args
            .get(CONTEXT_FIELD)
            .and_then(Value::as_str)
            .map(|v| v == CONTEXT_MARKER)
            .unwrap_or(false);

        let mut chunks = Vec::new();
        if let Some(load_error) = project.take_load_error() {
            chunks.push(format!("IO_FAIL: {}", load_error));
        }

        let call = ToolCall {
            project,
            args,
            working_dir,
        };
        let state = Arc::clone(&self.state);
        let tool = request.tool.clone();

        // The task boundary doubles as a panic catch; a crashing handler
        // costs one diagnostic chunk, never the dispatcher.
        let handler_task = tokio::spawn(async move {
            let project = Arc::clone(&call.project);
            let _slot = project.exclusive().await;
            handler(state, call).await
        });

        match handler_task.await {
            Ok(Ok(result)) => chunks.extend(result),
            Ok(Err(err)) => chunks.push(format!("{}: {}", err.code(), err)),
            Err(join_err) => {
                tracing::error!(tool = %tool, error = %join_err, "Handler crashed");
                chunks.push(format!("INTERNAL: handler for `{}` crashed", tool));
            }
        }

        // Absence of the marker never blocks, it just re-teaches the rules.
        if !has_marker {
            chunks.insert(0, CONTEXT_REFRESH_TEXT.to_string());
        }

        if chunks.is_empty() {
            chunks.push(String::new());
        }
        chunks
    }
}
