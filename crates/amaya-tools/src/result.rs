//! The outcome of one tool call, as fed back to the model.

use crate::ToolOutput;
use amaya_provider::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a tool call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The guard or the capability check refused the call.
    ValidationDenied,
    UnknownTool,
    InvalidArguments,
    ExecutionFailed,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolErrorKind::ValidationDenied => "validation_denied",
            ToolErrorKind::UnknownTool => "unknown_tool",
            ToolErrorKind::InvalidArguments => "invalid_arguments",
            ToolErrorKind::ExecutionFailed => "execution_failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Ok(ToolOutput),
    Error { kind: ToolErrorKind, message: String },
}

/// Result of dispatching one [`amaya_provider::ToolCall`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, output: ToolOutput) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: ToolOutcome::Ok(output),
        }
    }

    pub fn error(
        tool_call_id: impl Into<String>,
        kind: ToolErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: ToolOutcome::Error {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error { .. })
    }

    /// The error kind, if the call failed.
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match &self.outcome {
            ToolOutcome::Ok(_) => None,
            ToolOutcome::Error { kind, .. } => Some(*kind),
        }
    }

    /// The tool-result message appended to the conversation.
    pub fn to_message(&self) -> Message {
        match &self.outcome {
            ToolOutcome::Ok(output) => {
                Message::tool_result(self.tool_call_id.clone(), output.output.clone())
            }
            ToolOutcome::Error { message, .. } => {
                Message::tool_error(self.tool_call_id.clone(), message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amaya_provider::Role;

    #[test]
    fn test_ok_to_message() {
        let result = ToolResult::ok("c1", ToolOutput::new("Read a.txt", "hello"));
        let msg = result.to_message();
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(msg.content, "hello");
        assert!(!msg.is_error);
        assert!(result.error_kind().is_none());
    }

    #[test]
    fn test_error_to_message() {
        let result = ToolResult::error("c2", ToolErrorKind::UnknownTool, "Unknown tool: nope");
        let msg = result.to_message();
        assert!(msg.is_error);
        assert_eq!(msg.content, "Error: Unknown tool: nope");
        assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
    }
}
