//! Permission requests raised by the conversation engine
//!
//! A tool invocation can be suspended behind an explicit human decision. The
//! engine's gating hook raises a [`PermissionRequest`] on the session's
//! [`PermissionGate`]; the client answers with a [`PermissionResponse`]
//! carrying the same request id.
//!
//! Two kinds exist:
//! - `tool_approval`: allow or deny a specific tool call
//! - `user_question`: answer one or more questions asked by the agent

mod gate;
mod matching;

pub use gate::{ListenerHandle, PendingResponse, PermissionGate, RequestListener};
pub use matching::{find_matching_approval, is_approval_claimed, ToolCallPhase, TrackedToolCall};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind tag shared by requests and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    ToolApproval,
    UserQuestion,
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionKind::ToolApproval => write!(f, "tool_approval"),
            PermissionKind::UserQuestion => write!(f, "user_question"),
        }
    }
}

/// A permission or question raised by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionRequest {
    ToolApproval(ToolApprovalRequest),
    UserQuestion(UserQuestionRequest),
}

impl PermissionRequest {
    pub fn request_id(&self) -> &str {
        match self {
            PermissionRequest::ToolApproval(req) => &req.request_id,
            PermissionRequest::UserQuestion(req) => &req.request_id,
        }
    }

    pub fn kind(&self) -> PermissionKind {
        match self {
            PermissionRequest::ToolApproval(_) => PermissionKind::ToolApproval,
            PermissionRequest::UserQuestion(_) => PermissionKind::UserQuestion,
        }
    }

    /// Create a tool approval request
    pub fn tool_approval(
        request_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::ToolApproval(ToolApprovalRequest {
            request_id: request_id.into(),
            tool_name: tool_name.into(),
            input,
            description: None,
            tool_use_id: None,
        })
    }

    /// Create a user question request
    pub fn user_question(request_id: impl Into<String>, questions: Vec<UserQuestion>) -> Self {
        Self::UserQuestion(UserQuestionRequest {
            request_id: request_id.into(),
            questions,
        })
    }
}

/// Request to allow or deny a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolApprovalRequest {
    pub request_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Engine-assigned id of the tool call being gated, when the engine supplies one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
}

/// Request for answers to one or more questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuestionRequest {
    pub request_id: String,
    pub questions: Vec<UserQuestion>,
}

/// A single question, optionally restricted to fixed choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuestion {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<UserQuestionOption>,
    #[serde(default)]
    pub multi_select: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserQuestionOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Decision for a tool approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Allow,
    Deny,
}

/// Client answer to a pending [`PermissionRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionResponse {
    ToolApproval(ToolApprovalResponse),
    UserQuestion(UserQuestionResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolApprovalResponse {
    pub request_id: String,
    pub behavior: Behavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuestionResponse {
    pub request_id: String,
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

impl PermissionResponse {
    /// Allow a tool call
    pub fn allow(request_id: impl Into<String>) -> Self {
        Self::ToolApproval(ToolApprovalResponse {
            request_id: request_id.into(),
            behavior: Behavior::Allow,
            message: None,
        })
    }

    /// Deny a tool call, optionally explaining why
    pub fn deny(request_id: impl Into<String>, message: Option<String>) -> Self {
        Self::ToolApproval(ToolApprovalResponse {
            request_id: request_id.into(),
            behavior: Behavior::Deny,
            message,
        })
    }

    /// Answer a user question request
    pub fn answers(request_id: impl Into<String>, answers: HashMap<String, String>) -> Self {
        Self::UserQuestion(UserQuestionResponse {
            request_id: request_id.into(),
            answers,
        })
    }

    /// Default response synthesized when a pending request is cancelled.
    ///
    /// Tool approvals are denied with `message`; questions get an empty answer set.
    pub fn cancelled(kind: PermissionKind, request_id: impl Into<String>, message: &str) -> Self {
        match kind {
            PermissionKind::ToolApproval => Self::deny(request_id, Some(message.to_string())),
            PermissionKind::UserQuestion => Self::answers(request_id, HashMap::new()),
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            PermissionResponse::ToolApproval(resp) => &resp.request_id,
            PermissionResponse::UserQuestion(resp) => &resp.request_id,
        }
    }

    pub fn kind(&self) -> PermissionKind {
        match self {
            PermissionResponse::ToolApproval(_) => PermissionKind::ToolApproval,
            PermissionResponse::UserQuestion(_) => PermissionKind::UserQuestion,
        }
    }
}
