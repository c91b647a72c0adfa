//! Wire types and enforcement contracts for ChainGuard.
//!
//! This crate is shared by the server and the enforcement hook to prevent
//! schema drift. The server remains the authority on project state, but the
//! hook re-derives blocking decisions from the enforcement snapshot, so both
//! sides must agree on the snapshot schema and on how a project directory
//! maps to a project ID.

pub mod identity;
pub mod snapshot;
pub mod wire;

pub use identity::{find_project_dir, project_fingerprint, resolve_identity_source};
pub use snapshot::{
    format_timestamp, is_schema_file, BlockingAlert, EnforcementSnapshot,
    DB_SCHEMA_ENFORCE_TTL_SECS, ENFORCEMENT_STATE_FILE,
};
pub use wire::{
    ErrorInfo, HookActionInput, ToolActionInput, ToolRequest, ToolResponse, CONTEXT_FIELD,
    CONTEXT_MARKER, MAX_REQUEST_BYTES,
};
