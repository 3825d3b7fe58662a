//! Provider-neutral conversation model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
    /// Tool result message.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}

/// One model-issued request to invoke a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id, unique within one assistant message.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments as a dynamic JSON value.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Make call ids unique within one assistant message.
///
/// A blank id, or one already used earlier in the message, is replaced by
/// `call_<n>` with `n` starting at the call's position and skipping any id
/// the message already contains. Returns how many ids were replaced.
pub fn ensure_unique_call_ids(calls: &mut [ToolCall]) -> usize {
    let original: HashSet<String> = calls.iter().map(|c| c.id.clone()).collect();
    let mut used: HashSet<String> = HashSet::with_capacity(calls.len());
    let mut replaced = 0;

    for (index, call) in calls.iter_mut().enumerate() {
        if !call.id.trim().is_empty() && used.insert(call.id.clone()) {
            continue;
        }
        let mut n = index;
        let id = loop {
            let candidate = format!("call_{}", n);
            if !used.contains(&candidate) && !original.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        used.insert(id.clone());
        call.id = id;
        replaced += 1;
    }
    replaced
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call a tool message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Whether a tool message reports a failure.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        }
    }

    /// Create a new user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a new assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::new(Role::Assistant, text)
        }
    }

    /// Create a successful tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Create a failed tool result message.
    pub fn tool_error(tool_call_id: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            is_error: true,
            ..Self::new(Role::Tool, format!("Error: {}", message.as_ref()))
        }
    }

    /// Whether this assistant message requests tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A broken link between a tool result and the call it answers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("tool message at index {index} has no tool_call_id")]
    MissingId { index: usize },

    #[error("tool message at index {index} does not follow an assistant message")]
    Orphan { index: usize },

    #[error("tool message at index {index} references unknown call '{id}'")]
    Dangling { index: usize, id: String },

    #[error("call '{id}' answered twice (index {index})")]
    Duplicate { index: usize, id: String },
}

/// An ordered, append-only sequence of messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation seeded with one user message.
    pub fn from_user(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages appended after the first `from` messages.
    pub fn since(&self, from: usize) -> &[Message] {
        self.messages.get(from..).unwrap_or(&[])
    }

    /// Verify that every tool result answers a call of the immediately
    /// preceding assistant message.
    ///
    /// Several consecutive tool messages may follow one assistant message;
    /// each call may be answered at most once.
    pub fn check_tool_links(&self) -> Result<(), LinkError> {
        let mut open: Option<HashSet<&str>> = None;

        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Assistant => {
                    open = Some(message.tool_calls.iter().map(|c| c.id.as_str()).collect());
                }
                Role::User => open = None,
                Role::Tool => {
                    let id = message
                        .tool_call_id
                        .as_deref()
                        .ok_or(LinkError::MissingId { index })?;
                    let pending = open.as_mut().ok_or(LinkError::Orphan { index })?;
                    if !pending.remove(id) {
                        let answered = self.messages[..index]
                            .iter()
                            .rev()
                            .take_while(|m| m.role == Role::Tool)
                            .any(|m| m.tool_call_id.as_deref() == Some(id));
                        return Err(if answered {
                            LinkError::Duplicate {
                                index,
                                id: id.to_string(),
                            }
                        } else {
                            LinkError::Dangling {
                                index,
                                id: id.to_string(),
                            }
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Normalize loosely typed tool arguments from a provider.
///
/// A string holding a JSON object is unwrapped, null and blank strings
/// become an empty object, anything else is left for schema validation
/// to reject.
pub fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Null => Value::Object(Default::default()),
        Value::String(raw) => {
            if raw.trim().is_empty() {
                return Value::Object(Default::default());
            }
            match serde_json::from_str::<Value>(&raw) {
                Ok(parsed @ Value::Object(_)) => parsed,
                _ => Value::String(raw),
            }
        }
        other => other,
    }
}
