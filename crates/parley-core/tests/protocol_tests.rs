//! Wire protocol integration tests
//!
//! Drives real turns through a session and checks the SSE encoding of every
//! emitted event decodes back to the same event.

mod common;

use common::{collect_turn, manager, wait_for_request};
use parley_core::permission::PermissionResponse;
use parley_core::session::PermissionMode;
use parley_core::stream::{SseFrame, sse_encode};
use parley_core::translator::WireEvent;

/// Parse one `event:`/`data:` block back into a frame
fn parse_sse(block: &str) -> SseFrame {
    let mut event = None;
    let mut data = None;
    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event: ") {
            event = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("data: ") {
            data = Some(rest.to_string());
        }
    }
    SseFrame {
        event: event.expect("event line"),
        data: data.expect("data line"),
    }
}

fn assert_round_trips(events: &[WireEvent]) {
    for event in events {
        let encoded = sse_encode(&event.to_frame().unwrap());
        assert!(encoded.ends_with("\n\n"), "frame not terminated: {:?}", encoded);

        let frame = parse_sse(&encoded);
        assert_eq!(frame.event, event.name());
        assert_eq!(&WireEvent::from_frame(&frame).unwrap(), event);
    }
}

#[tokio::test]
async fn test_text_turn_round_trips() {
    let (manager, _engine) = manager(PermissionMode::BypassPermissions);
    let session = manager.create();
    let mut feed = manager.open_stream(session.id()).unwrap();

    manager.push_message(session.id(), "hello world").unwrap();
    let events = collect_turn(&mut feed).await;

    assert!(events.len() >= 3);
    assert_round_trips(&events);
}

#[tokio::test]
async fn test_approval_turn_round_trips() {
    let (manager, _engine) = manager(PermissionMode::Default);
    let session = manager.create();
    let mut feed = manager.open_stream(session.id()).unwrap();

    manager.push_message(session.id(), "run cargo --version").unwrap();
    let (request, mut events) = wait_for_request(&mut feed).await;
    events.push(WireEvent::PermissionRequest(request.clone()));

    manager
        .respond(session.id(), PermissionResponse::allow(request.request_id()))
        .unwrap();
    events.extend(collect_turn(&mut feed).await);

    assert!(events.iter().any(|e| e.name() == "permission_request"));
    assert!(events.iter().any(|e| e.name() == "tool_result"));
    assert_round_trips(&events);
}

#[test]
fn test_permission_request_frame_shape() {
    let request = parley_core::PermissionRequest::tool_approval(
        "r1",
        "Bash",
        serde_json::json!({"command": "ls"}),
    );
    let frame = WireEvent::PermissionRequest(request).to_frame().unwrap();
    let data: serde_json::Value = serde_json::from_str(&frame.data).unwrap();

    assert_eq!(frame.event, "permission_request");
    assert_eq!(data["kind"], "tool_approval");
    assert_eq!(data["toolName"], "Bash");
    assert_eq!(data["input"]["command"], "ls");
}
