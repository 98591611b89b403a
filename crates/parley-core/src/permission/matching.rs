//! Pairing pending tool approvals with the tool calls they gate
//!
//! Clients render an approval either inline next to its tool call or in a
//! standalone pending list. These helpers decide which.
//!
//! Matching uses `tool_use_id` when the request carries one. Without it the
//! match falls back to the tool name, which is ambiguous when several calls
//! share a name: every such call matches the first pending approval.

use serde::{Deserialize, Serialize};

use super::{PermissionRequest, ToolApprovalRequest};

/// Lifecycle of a tool call as seen by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallPhase {
    Pending,
    StreamingInput,
    Running,
    Complete,
    Error,
}

impl ToolCallPhase {
    /// Terminal calls can no longer be waiting on an approval
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolCallPhase::Complete | ToolCallPhase::Error)
    }
}

/// Minimal view of a tool call needed for approval matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedToolCall {
    pub id: String,
    pub name: String,
    pub phase: ToolCallPhase,
}

impl TrackedToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, phase: ToolCallPhase) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phase,
        }
    }
}

fn gates(request: &ToolApprovalRequest, call: &TrackedToolCall) -> bool {
    match &request.tool_use_id {
        Some(tool_use_id) => *tool_use_id == call.id,
        None => request.tool_name == call.name,
    }
}

/// Find the first pending tool approval that gates `call`.
///
/// Returns `None` for terminal calls.
pub fn find_matching_approval<'a>(
    pending: &'a [PermissionRequest],
    call: &TrackedToolCall,
) -> Option<&'a ToolApprovalRequest> {
    if call.phase.is_terminal() {
        return None;
    }

    pending.iter().find_map(|request| match request {
        PermissionRequest::ToolApproval(approval) if gates(approval, call) => Some(approval),
        _ => None,
    })
}

/// Whether some non-terminal call in `calls` is gated by `request`.
///
/// Claimed approvals are rendered with their call and should be skipped
/// when listing standalone pending approvals.
pub fn is_approval_claimed(request: &ToolApprovalRequest, calls: &[TrackedToolCall]) -> bool {
    calls
        .iter()
        .any(|call| !call.phase.is_terminal() && gates(request, call))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approval(request_id: &str, tool_name: &str, tool_use_id: Option<&str>) -> PermissionRequest {
        PermissionRequest::ToolApproval(ToolApprovalRequest {
            request_id: request_id.to_string(),
            tool_name: tool_name.to_string(),
            input: json!({}),
            description: None,
            tool_use_id: tool_use_id.map(str::to_string),
        })
    }

    fn approval_request(request: PermissionRequest) -> ToolApprovalRequest {
        match request {
            PermissionRequest::ToolApproval(req) => req,
            PermissionRequest::UserQuestion(_) => panic!("expected tool approval"),
        }
    }

    fn running(id: &str, name: &str) -> TrackedToolCall {
        TrackedToolCall::new(id, name, ToolCallPhase::Running)
    }

    fn matched_id(pending: &[PermissionRequest], call: &TrackedToolCall) -> Option<String> {
        find_matching_approval(pending, call).map(|a| a.request_id.clone())
    }

    #[test]
    fn test_matches_distinct_calls_by_tool_use_id() {
        let pending = vec![
            approval("r1", "NotebookEdit", Some("tu-1")),
            approval("r2", "NotebookEdit", Some("tu-2")),
            approval("r3", "NotebookEdit", Some("tu-3")),
        ];

        assert_eq!(matched_id(&pending, &running("tu-1", "NotebookEdit")).as_deref(), Some("r1"));
        assert_eq!(matched_id(&pending, &running("tu-2", "NotebookEdit")).as_deref(), Some("r2"));
        assert_eq!(matched_id(&pending, &running("tu-3", "NotebookEdit")).as_deref(), Some("r3"));
    }

    #[test]
    fn test_name_fallback_matches_first_approval_for_every_call() {
        let pending = vec![
            approval("r1", "NotebookEdit", None),
            approval("r2", "NotebookEdit", None),
        ];

        assert_eq!(matched_id(&pending, &running("tu-1", "NotebookEdit")).as_deref(), Some("r1"));
        assert_eq!(matched_id(&pending, &running("tu-2", "NotebookEdit")).as_deref(), Some("r1"));
    }

    #[test]
    fn test_tool_use_id_mismatch_does_not_fall_back_to_name() {
        let pending = vec![approval("r1", "Edit", Some("tu-other"))];
        assert_eq!(matched_id(&pending, &running("tu-mine", "Edit")), None);
    }

    #[test]
    fn test_terminal_calls_never_match() {
        let pending = vec![approval("r1", "Bash", Some("tu-1"))];

        for phase in [ToolCallPhase::Complete, ToolCallPhase::Error] {
            let call = TrackedToolCall::new("tu-1", "Bash", phase);
            assert_eq!(matched_id(&pending, &call), None);
        }
    }

    #[test]
    fn test_skips_user_questions() {
        let pending = vec![
            PermissionRequest::user_question("q1", vec![]),
            approval("r1", "Bash", Some("tu-1")),
        ];
        assert_eq!(matched_id(&pending, &running("tu-1", "Bash")).as_deref(), Some("r1"));
    }

    #[test]
    fn test_mixed_id_and_name_matching() {
        let pending = vec![
            approval("r1", "Edit", Some("tu-1")),
            approval("r2", "Bash", None),
            approval("r3", "Edit", Some("tu-3")),
        ];

        assert_eq!(matched_id(&pending, &running("tu-1", "Edit")).as_deref(), Some("r1"));
        assert_eq!(matched_id(&pending, &running("tu-3", "Edit")).as_deref(), Some("r3"));
        assert_eq!(matched_id(&pending, &running("tu-99", "Bash")).as_deref(), Some("r2"));
    }

    #[test]
    fn test_claimed_only_by_non_terminal_calls() {
        let r1 = approval_request(approval("r1", "NotebookEdit", Some("tu-1")));
        let r2 = approval_request(approval("r2", "NotebookEdit", Some("tu-2")));
        let r3 = approval_request(approval("r3", "NotebookEdit", Some("tu-3")));
        let calls = vec![
            TrackedToolCall::new("tu-1", "NotebookEdit", ToolCallPhase::Complete),
            TrackedToolCall::new("tu-2", "NotebookEdit", ToolCallPhase::Running),
            TrackedToolCall::new("tu-3", "NotebookEdit", ToolCallPhase::Pending),
        ];

        assert!(!is_approval_claimed(&r1, &calls));
        assert!(is_approval_claimed(&r2, &calls));
        assert!(is_approval_claimed(&r3, &calls));
    }

    #[test]
    fn test_claimed_by_name_when_id_absent() {
        let req = approval_request(approval("r1", "Bash", None));
        let calls = vec![TrackedToolCall::new("tu-1", "Bash", ToolCallPhase::Pending)];
        assert!(is_approval_claimed(&req, &calls));
        assert!(!is_approval_claimed(&req, &[]));
    }
}
