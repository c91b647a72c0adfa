//! ChainGuard server entrypoint.
//!
//! Reads one JSON tool request per line from stdin and writes one JSON
//! response per line to stdout; the host runtime owns everything beyond that
//! framing. Requests may pipeline: each one runs as its own task, and a
//! single writer task keeps response lines whole. Logging goes to stderr so
//! stdout stays a clean wire.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chainguard_core::config::chainguard_home;
use chainguard_protocol::{ToolRequest, ToolResponse, MAX_REQUEST_BYTES};

use chainguard_server::{AppState, Dispatcher};

#[tokio::main]
async fn main() {
    init_logging();

    let home = chainguard_home();
    info!(home = %home.display(), "ChainGuard server starting");

    let state = Arc::new(AppState::new(home));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&state)));

    let (tx, mut rx) = mpsc::channel::<ToolResponse>(64);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            let mut line = match serde_json::to_string(&response) {
                Ok(line) => line,
                Err(err) => {
                    error!(error = %err, "Failed to serialize response");
                    continue;
                }
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if line.len() > MAX_REQUEST_BYTES {
                    let _ = tx
                        .send(ToolResponse::error(
                            None,
                            "request_too_large",
                            "request exceeded maximum size",
                        ))
                        .await;
                    continue;
                }

                let request: ToolRequest = match serde_json::from_str(&line) {
                    Ok(request) => request,
                    Err(err) => {
                        let _ = tx
                            .send(ToolResponse::error(
                                None,
                                "invalid_json",
                                format!("request was not valid JSON: {}", err),
                            ))
                            .await;
                        continue;
                    }
                };

                let dispatcher = Arc::clone(&dispatcher);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = dispatcher.dispatch(request).await;
                    let _ = tx.send(response).await;
                });
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "Failed to read request line");
                break;
            }
        }
    }

    // Orderly shutdown: every pending debounced write lands before exit.
    if let Err(err) = state.manager.flush().await {
        error!(error = %err, "Flush on shutdown failed");
    }
    drop(tx);
    let _ = writer.await;
    info!("ChainGuard server stopped");
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
