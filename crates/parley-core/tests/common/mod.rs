//! Shared test helpers: a scripted conversation engine

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;

use parley_core::engine::{
    ConversationEngine, EngineStart, RawEventStream, ToolDecision, ToolUseRequest,
};
use parley_core::permission::PermissionRequest;
use parley_core::session::{EngineOptions, PermissionMode, SessionInit, SessionManager};
use parley_core::stream::SessionEventStream;
use parley_core::translator::{RawEvent, WireEvent};
use parley_core::{EngineError, PushSender, push_channel};

type RawSender = PushSender<Result<RawEvent, EngineError>>;

/// Engine driven by the text of each user turn:
///
/// - `run <command>`: asks the gate to run `Bash{command}` and reports the result
/// - `fail`: ends the stream with an engine error
/// - anything else: echoed back as two text deltas
///
/// Every turn starts with `message_start` and ends with a success result.
#[derive(Default)]
pub struct ScriptedEngine {
    /// Decisions returned by the tool gate, in order
    pub decisions: Arc<Mutex<Vec<ToolDecision>>>,
    /// Options each conversation was started with
    pub started: Mutex<Vec<EngineOptions>>,
}

impl ConversationEngine for ScriptedEngine {
    fn start(&self, start: EngineStart) -> RawEventStream {
        self.started.lock().push(start.options.clone());

        let (tx, rx) = push_channel();
        tokio::spawn(run(start, tx, self.decisions.clone()));
        rx.boxed()
    }
}

async fn run(start: EngineStart, tx: RawSender, decisions: Arc<Mutex<Vec<ToolDecision>>>) {
    let EngineStart {
        mut turns,
        tool_gate,
        cancel,
        ..
    } = start;
    let mut num_turns = 0;

    loop {
        let turn = tokio::select! {
            _ = cancel.cancelled() => break,
            turn = turns.recv() => match turn {
                Some(turn) => turn,
                None => break,
            },
        };
        num_turns += 1;

        if turn.text == "fail" {
            tx.push(Err(EngineError::Protocol("scripted failure".to_string())));
            break;
        }

        tx.push(Ok(RawEvent::message_start()));

        if let Some(command) = turn.text.strip_prefix("run ") {
            let tool_use_id = format!("tu-{}", num_turns);
            let input = json!({"command": command});
            tx.push(Ok(RawEvent::tool_use_start(&tool_use_id, "Bash")));

            let decision = match &tool_gate {
                Some(gate) => {
                    let request = ToolUseRequest::new("Bash", input.clone())
                        .with_tool_use_id(&tool_use_id);
                    gate.can_use_tool(request).await
                }
                None => ToolDecision::Allow {
                    updated_input: input,
                },
            };
            decisions.lock().push(decision.clone());

            let (result, is_error) = match decision {
                ToolDecision::Allow { .. } => (format!("ran {}", command), false),
                ToolDecision::Deny { message } => (message, true),
            };
            tx.push(Ok(RawEvent::tool_result(&tool_use_id, json!(result), is_error)));
        } else {
            let (head, tail) = turn.text.split_at(turn.text.len() / 2);
            tx.push(Ok(RawEvent::text_delta(head)));
            tx.push(Ok(RawEvent::text_delta(tail)));
        }

        tx.push(Ok(RawEvent::success(num_turns, 0.0)));
    }

    tx.close();
}

/// Manager over a fresh [`ScriptedEngine`] with the given permission mode
pub fn manager(mode: PermissionMode) -> (SessionManager<()>, Arc<ScriptedEngine>) {
    let engine = Arc::new(ScriptedEngine::default());
    let manager = SessionManager::new(engine.clone(), move || {
        SessionInit::new(()).with_options(EngineOptions::default().with_permission_mode(mode))
    });
    (manager, engine)
}

/// Next event, failing the test if none arrives in time
pub async fn next_event(feed: &mut SessionEventStream) -> Option<WireEvent> {
    tokio::time::timeout(Duration::from_secs(5), feed.recv())
        .await
        .expect("timed out waiting for event")
}

/// Collect events up to and including the next `turn_complete`
pub async fn collect_turn(feed: &mut SessionEventStream) -> Vec<WireEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(feed).await {
        let done = matches!(event, WireEvent::TurnComplete { .. });
        events.push(event);
        if done {
            break;
        }
    }
    events
}

/// Read events until a permission request arrives.
///
/// Returns the request and every other event seen before it.
pub async fn wait_for_request(feed: &mut SessionEventStream) -> (PermissionRequest, Vec<WireEvent>) {
    let mut seen = Vec::new();
    loop {
        match next_event(feed).await {
            Some(WireEvent::PermissionRequest(request)) => return (request, seen),
            Some(event) => seen.push(event),
            None => panic!("feed ended before a permission request, saw {:?}", seen),
        }
    }
}
