//! chainguard-hook: pre-action enforcement gate.
//!
//! The host invokes this binary before each file-writing action, piping
//! `{tool_name, tool_input, cwd}` as JSON on stdin. The hook shares no
//! process state with the server — it re-derives the project ID and reads
//! only `enforcement-state.json`.
//!
//! Exit codes: 0 allows the action, 2 blocks it (message on stdout).
//! Anything the hook cannot attribute or read degrades to allow; a broken
//! hook must never brick the workstation.

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod decision;

use decision::{decide, Decision};

#[derive(Parser)]
#[command(name = "chainguard-hook")]
#[command(about = "ChainGuard pre-action enforcement gate")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a hook event (reads JSON from stdin). The default.
    Handle,

    /// Print the project ID for a path (debugging the compatibility contract)
    ProjectId {
        #[arg(value_name = "PATH")]
        path: String,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Handle) {
        Commands::Handle => std::process::exit(run_handle()),
        Commands::ProjectId { path } => {
            let source = chainguard_protocol::resolve_identity_source(&PathBuf::from(path));
            println!("{}", chainguard_protocol::project_fingerprint(&source));
        }
    }
}

fn run_handle() -> i32 {
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        return 0;
    }
    if input.trim().is_empty() {
        return 0;
    }

    let action: chainguard_protocol::HookActionInput = match serde_json::from_str(&input) {
        Ok(action) => action,
        Err(err) => {
            tracing::debug!(error = %err, "Unparseable hook input, allowing");
            return 0;
        }
    };

    match decide(&action, &storage_root(), chrono::Utc::now()) {
        Decision::Allow => 0,
        Decision::Block(message) => {
            println!("{}", message);
            2
        }
    }
}

fn storage_root() -> PathBuf {
    if let Ok(home) = std::env::var("CHAINGUARD_HOME") {
        if !home.trim().is_empty() {
            return PathBuf::from(home);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chainguard")
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
