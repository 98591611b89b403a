//! Tool gating hook wired into the engine
//!
//! ## Design
//!
//! - Every tool call the engine attempts becomes a request on the session's
//!   [`PermissionGate`]; the engine stays suspended until it resolves
//! - The question tool raises a `user_question` instead; on an answer the
//!   answers are merged into the tool's input before it runs
//! - Everything else raises a `tool_approval` and runs exactly when the
//!   response allows it
//!
//! Aborting the session resolves every outstanding request with a denial, so
//! a suspended engine always wakes up.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{ToolDecision, ToolGate, ToolUseRequest};
use crate::permission::{
    Behavior, PermissionGate, PermissionRequest, PermissionResponse, ToolApprovalRequest,
    UserQuestion,
};

/// Tool whose calls are questions for the user rather than actions
pub const ASK_USER_QUESTION_TOOL: &str = "AskUserQuestion";

const DENIED_BY_USER: &str = "Denied by user";
const DENIED: &str = "Denied";
const CANCELLED: &str = "Cancelled";

/// [`ToolGate`] backed by a session's permission gate
pub struct SessionToolGate {
    gate: Arc<PermissionGate>,
}

impl SessionToolGate {
    pub fn new(gate: Arc<PermissionGate>) -> Self {
        Self { gate }
    }

    async fn ask_questions(&self, input: Value) -> ToolDecision {
        let questions = decode_questions(&input);
        let request = PermissionRequest::user_question(new_request_id(), questions);

        let pending = match self.gate.request(request) {
            Ok(pending) => pending,
            Err(e) => return deny(e.to_string()),
        };

        match pending.await {
            PermissionResponse::UserQuestion(response) => {
                let mut updated = match input {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                let answers = response
                    .answers
                    .into_iter()
                    .map(|(question, answer)| (question, Value::String(answer)))
                    .collect();
                updated.insert("answers".to_string(), Value::Object(answers));

                ToolDecision::Allow {
                    updated_input: Value::Object(updated),
                }
            }
            PermissionResponse::ToolApproval(_) => deny(CANCELLED),
        }
    }

    async fn ask_approval(&self, request: ToolUseRequest) -> ToolDecision {
        let description = request
            .input
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        let approval = PermissionRequest::ToolApproval(ToolApprovalRequest {
            request_id: new_request_id(),
            tool_name: request.tool_name.clone(),
            input: request.input.clone(),
            description,
            tool_use_id: request.tool_use_id.clone(),
        });

        let pending = match self.gate.request(approval) {
            Ok(pending) => pending,
            Err(e) => return deny(e.to_string()),
        };

        match pending.await {
            PermissionResponse::ToolApproval(response) if response.behavior == Behavior::Allow => {
                debug!(tool = %request.tool_name, "Tool call allowed");
                ToolDecision::Allow {
                    updated_input: request.input,
                }
            }
            PermissionResponse::ToolApproval(response) => {
                debug!(tool = %request.tool_name, "Tool call denied");
                deny(response.message.unwrap_or_else(|| DENIED_BY_USER.to_string()))
            }
            PermissionResponse::UserQuestion(_) => {
                warn!(tool = %request.tool_name, "Tool approval answered with a question response");
                deny(DENIED)
            }
        }
    }
}

#[async_trait]
impl ToolGate for SessionToolGate {
    async fn can_use_tool(&self, request: ToolUseRequest) -> ToolDecision {
        if request.tool_name == ASK_USER_QUESTION_TOOL {
            self.ask_questions(request.input).await
        } else {
            self.ask_approval(request).await
        }
    }
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn deny(message: impl Into<String>) -> ToolDecision {
    ToolDecision::Deny {
        message: message.into(),
    }
}

/// Undecodable question lists are treated as empty
fn decode_questions(input: &Value) -> Vec<UserQuestion> {
    input
        .get("questions")
        .cloned()
        .and_then(|questions| serde_json::from_value(questions).ok())
        .unwrap_or_default()
}
