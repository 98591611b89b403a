//! Conversation engine seam
//!
//! The engine is the external agent runtime. It accepts user turns, emits a
//! sequence of raw event records, and asks the host whether each tool may run
//! before executing it. The session layer only shapes and gates this traffic.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::push_channel::PushReceiver;
use crate::session::{EngineOptions, SessionId};
use crate::translator::RawEvent;

/// Output of a running engine. Ending the stream ends the session's event feed.
pub type RawEventStream = BoxStream<'static, Result<RawEvent, EngineError>>;

/// A user-submitted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTurn {
    pub text: String,
}

impl UserTurn {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A tool the engine wants to run
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseRequest {
    pub tool_name: String,
    pub input: Value,
    /// Engine-assigned id of the tool call, when known
    pub tool_use_id: Option<String>,
}

impl ToolUseRequest {
    pub fn new(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            input,
            tool_use_id: None,
        }
    }

    pub fn with_tool_use_id(mut self, id: impl Into<String>) -> Self {
        self.tool_use_id = Some(id.into());
        self
    }
}

/// Host decision for a [`ToolUseRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum ToolDecision {
    /// Run the tool with `updated_input`
    Allow {
        #[serde(rename = "updatedInput")]
        updated_input: Value,
    },
    /// Skip the tool and report `message` to the model
    Deny { message: String },
}

impl ToolDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, ToolDecision::Allow { .. })
    }
}

/// Hook the engine must call, and await, before running any tool
#[async_trait]
pub trait ToolGate: Send + Sync {
    async fn can_use_tool(&self, request: ToolUseRequest) -> ToolDecision;
}

/// Everything an engine receives when a session starts
pub struct EngineStart {
    pub session_id: SessionId,
    pub options: EngineOptions,
    /// User turns, in submission order. Ends when the session is aborted.
    pub turns: PushReceiver<UserTurn>,
    /// Present unless the permission mode bypasses gating
    pub tool_gate: Option<Arc<dyn ToolGate>>,
    /// Cancelled when the session is aborted; stop producing events
    pub cancel: CancellationToken,
}

/// Factory for running conversations
pub trait ConversationEngine: Send + Sync {
    /// Start a conversation. Must not block; work happens as the stream is polled
    /// or in tasks the engine spawns.
    fn start(&self, start: EngineStart) -> RawEventStream;
}
