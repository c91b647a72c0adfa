//! Line-framed request/response types for the tool channel.
//!
//! The host runtime owns the transport; each line carries one JSON request
//! naming a tool and its argument object, and one JSON response carrying a
//! list of prose text chunks. Nothing here interprets tool semantics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

/// Argument field every tool recognizes as the context marker.
pub const CONTEXT_FIELD: &str = "ctx";

/// Sentinel value the agent must echo to prove it still holds the rule set.
pub const CONTEXT_MARKER: &str = "\u{1F517}";

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub chunks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ToolResponse {
    pub fn ok(id: Option<String>, chunks: Vec<String>) -> Self {
        Self {
            id,
            chunks,
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            id,
            chunks: Vec::new(),
            error: Some(ErrorInfo::new(code, message)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Hook input (JSON the host pipes to the enforcement hook before file writes)
// =============================================================================

/// Raw JSON the host sends the hook before a file-writing action.
///
/// Fields are optional because different host tools include different data;
/// the hook degrades to "allow" when it cannot attribute the action.
#[derive(Debug, Clone, Deserialize)]
pub struct HookActionInput {
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: ToolActionInput,
    pub cwd: Option<String>,
}

/// Tool input fields the hook cares about (file paths from edit/write tools).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolActionInput {
    pub file_path: Option<String>,
    pub path: Option<String>,
}

impl HookActionInput {
    /// The path the pending action writes to, if the host provided one.
    pub fn target_path(&self) -> Option<&str> {
        self.tool_input
            .file_path
            .as_deref()
            .or(self.tool_input.path.as_deref())
    }
}
