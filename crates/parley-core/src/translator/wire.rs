//! Normalized wire events delivered to clients
//!
//! Every event has a name and a fixed-shape payload. Payload fields are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permission::PermissionRequest;
use crate::stream::SseFrame;

/// Application-defined event attached to a tool result by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    pub name: String,
    pub value: Value,
}

impl CustomEvent {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum WireEvent {
    MessageStart {},
    ThinkingStart {},
    ThinkingDelta { text: String },
    TextDelta { text: String },
    ToolStart { id: String, name: String },
    ToolInputDelta { id: String, partial_json: String },
    ToolCall { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, result: String },
    ToolProgress { tool_name: String, elapsed: f64 },
    TurnComplete { num_turns: u32, cost: f64 },
    SessionError { subtype: String },
    PermissionRequest(PermissionRequest),
    Custom(CustomEvent),
    Error { message: String },
}

impl WireEvent {
    /// Event name as it appears in the `event:` field
    pub fn name(&self) -> &'static str {
        match self {
            WireEvent::MessageStart {} => "message_start",
            WireEvent::ThinkingStart {} => "thinking_start",
            WireEvent::ThinkingDelta { .. } => "thinking_delta",
            WireEvent::TextDelta { .. } => "text_delta",
            WireEvent::ToolStart { .. } => "tool_start",
            WireEvent::ToolInputDelta { .. } => "tool_input_delta",
            WireEvent::ToolCall { .. } => "tool_call",
            WireEvent::ToolResult { .. } => "tool_result",
            WireEvent::ToolProgress { .. } => "tool_progress",
            WireEvent::TurnComplete { .. } => "turn_complete",
            WireEvent::SessionError { .. } => "session_error",
            WireEvent::PermissionRequest(_) => "permission_request",
            WireEvent::Custom(_) => "custom",
            WireEvent::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WireEvent::Error {
            message: message.into(),
        }
    }

    /// Split into an event name and a serialized payload
    pub fn to_frame(&self) -> serde_json::Result<SseFrame> {
        let mut value = serde_json::to_value(self)?;
        let data = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Default::default()));

        Ok(SseFrame {
            event: self.name().to_string(),
            data: serde_json::to_string(&data)?,
        })
    }

    /// Rebuild an event from a frame produced by [`WireEvent::to_frame`]
    pub fn from_frame(frame: &SseFrame) -> serde_json::Result<Self> {
        let data: Value = serde_json::from_str(&frame.data)?;
        serde_json::from_value(serde_json::json!({
            "event": frame.event,
            "data": data,
        }))
    }
}
