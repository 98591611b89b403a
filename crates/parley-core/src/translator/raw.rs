//! Raw event records produced by a conversation engine
//!
//! Engines emit a heterogeneous vocabulary of records. They are decoded once,
//! at the engine boundary, into [`RawEvent`]. Anything not recognized decodes
//! to an `Unknown`/`Other` variant instead of failing, so newer engine
//! vocabularies pass through without breaking the session.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// One record from the engine's output sequence
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    /// Incremental streaming event for the message being generated
    StreamEvent { event: StreamEvent },
    /// Complete assistant message
    Assistant {
        #[serde(default)]
        message: RawMessage,
    },
    /// User-role message; carries tool results back to the model
    User {
        #[serde(default)]
        message: RawMessage,
    },
    /// Periodic notice while a tool is executing
    ToolProgress {
        #[serde(default, deserialize_with = "null_as_default")]
        tool_name: String,
        #[serde(default, deserialize_with = "null_as_default")]
        elapsed_time_seconds: f64,
    },
    /// End of a turn
    #[serde(rename = "result")]
    TurnResult(TurnResult),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurnResult {
    pub subtype: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub num_turns: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_cost_usd: f64,
}

impl TurnResult {
    pub fn is_success(&self) -> bool {
        self.subtype == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    ContentBlockStart { content_block: StartBlock },
    ContentBlockDelta { delta: BlockDelta },
    #[serde(other)]
    Other,
}

/// Content block announced by `content_block_start`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    ToolUse {
        id: String,
        name: String,
    },
    ServerToolUse {
        id: String,
        name: String,
    },
    Thinking,
    WebSearchToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    ThinkingDelta { thinking: String },
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

/// Message body shared by assistant and user records
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub role: Option<String>,
    /// Plain-string content decodes to an empty list
    #[serde(default, deserialize_with = "lenient_blocks")]
    pub content: Vec<ContentBlock>,
}

/// Content block of a complete message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ServerToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    WebSearchToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

/// Decode each block on its own so one malformed block does not discard the message
fn lenient_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    Ok(items
        .into_iter()
        .map(|item| serde_json::from_value(item).unwrap_or(ContentBlock::Other))
        .collect())
}

/// Explicit `null` reads like an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl RawEvent {
    /// Decode a JSON record, mapping malformed records to [`RawEvent::Unknown`]
    pub fn decode(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(event) => event,
            Err(e) => {
                warn!("Undecodable raw event: {}", e);
                RawEvent::Unknown
            }
        }
    }

    pub fn message_start() -> Self {
        RawEvent::StreamEvent {
            event: StreamEvent::MessageStart,
        }
    }

    pub fn text_delta(text: impl Into<String>) -> Self {
        RawEvent::StreamEvent {
            event: StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { text: text.into() },
            },
        }
    }

    pub fn thinking_delta(thinking: impl Into<String>) -> Self {
        RawEvent::StreamEvent {
            event: StreamEvent::ContentBlockDelta {
                delta: BlockDelta::ThinkingDelta {
                    thinking: thinking.into(),
                },
            },
        }
    }

    pub fn tool_use_start(id: impl Into<String>, name: impl Into<String>) -> Self {
        RawEvent::StreamEvent {
            event: StreamEvent::ContentBlockStart {
                content_block: StartBlock::ToolUse {
                    id: id.into(),
                    name: name.into(),
                },
            },
        }
    }

    pub fn input_json_delta(partial_json: impl Into<String>) -> Self {
        RawEvent::StreamEvent {
            event: StreamEvent::ContentBlockDelta {
                delta: BlockDelta::InputJsonDelta {
                    partial_json: partial_json.into(),
                },
            },
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        RawEvent::Assistant {
            message: RawMessage {
                role: Some("assistant".to_string()),
                content,
            },
        }
    }

    /// User-role message carrying one tool result
    pub fn tool_result(tool_use_id: impl Into<String>, content: Value, is_error: bool) -> Self {
        RawEvent::User {
            message: RawMessage {
                role: Some("user".to_string()),
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: tool_use_id.into(),
                    content,
                    is_error,
                }],
            },
        }
    }

    pub fn tool_progress(tool_name: impl Into<String>, elapsed_time_seconds: f64) -> Self {
        RawEvent::ToolProgress {
            tool_name: tool_name.into(),
            elapsed_time_seconds,
        }
    }

    /// Successful end of turn
    pub fn success(num_turns: u32, total_cost_usd: f64) -> Self {
        RawEvent::TurnResult(TurnResult {
            subtype: "success".to_string(),
            num_turns,
            total_cost_usd,
        })
    }

    /// Turn ended with a non-success subtype such as `max_turns`
    pub fn failure(subtype: impl Into<String>) -> Self {
        RawEvent::TurnResult(TurnResult {
            subtype: subtype.into(),
            num_turns: 0,
            total_cost_usd: 0.0,
        })
    }
}
