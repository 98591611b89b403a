//! Echo engine
//!
//! Answers every user turn with its own text. A turn starting with `!` is
//! treated as a shell command: the engine asks the tool gate for `Bash` and
//! reports the decision instead of running anything. Useful for exercising
//! the session and approval plumbing without a model.

use futures::StreamExt;
use serde_json::json;
use tracing::debug;

use parley_core::translator::ContentBlock;
use parley_core::{
    ConversationEngine, EngineError, EngineStart, PushSender, RawEvent, RawEventStream,
    ToolDecision, ToolUseRequest, push_channel,
};

type RawSender = PushSender<Result<RawEvent, EngineError>>;

#[derive(Debug, Default)]
pub struct EchoEngine;

impl EchoEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ConversationEngine for EchoEngine {
    fn start(&self, start: EngineStart) -> RawEventStream {
        let (tx, rx) = push_channel();
        tokio::spawn(run(start, tx));
        rx.boxed()
    }
}

async fn run(start: EngineStart, tx: RawSender) {
    let EngineStart {
        session_id,
        options,
        mut turns,
        tool_gate,
        cancel,
    } = start;
    let mut num_turns = 0u32;

    loop {
        let turn = tokio::select! {
            _ = cancel.cancelled() => break,
            turn = turns.recv() => match turn {
                Some(turn) => turn,
                None => break,
            },
        };

        if num_turns >= options.max_turns {
            tx.push(Ok(RawEvent::failure("error_max_turns")));
            continue;
        }
        num_turns += 1;
        tx.push(Ok(RawEvent::message_start()));

        let reply = match turn.text.strip_prefix('!') {
            Some(command) => {
                let command = command.trim();
                let tool_use_id = format!("echo-{}", num_turns);
                let input = json!({ "command": command });

                tx.push(Ok(RawEvent::tool_use_start(&tool_use_id, "Bash")));
                tx.push(Ok(RawEvent::assistant(vec![ContentBlock::ToolUse {
                    id: tool_use_id.clone(),
                    name: "Bash".to_string(),
                    input: input.clone(),
                }])));

                let decision = match &tool_gate {
                    Some(gate) => {
                        let request =
                            ToolUseRequest::new("Bash", input).with_tool_use_id(&tool_use_id);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            decision = gate.can_use_tool(request) => decision,
                        }
                    }
                    None => ToolDecision::Allow {
                        updated_input: input,
                    },
                };

                let (result, is_error) = match &decision {
                    ToolDecision::Allow { .. } => (format!("Allowed: {}", command), false),
                    ToolDecision::Deny { message } => (format!("Denied: {}", message), true),
                };
                tx.push(Ok(RawEvent::tool_result(&tool_use_id, json!(result), is_error)));
                result
            }
            None => turn.text.clone(),
        };

        for chunk in reply.split_inclusive(' ') {
            tx.push(Ok(RawEvent::text_delta(chunk)));
        }
        tx.push(Ok(RawEvent::success(num_turns, 0.0)));
    }

    debug!(session_id = %session_id, num_turns, "Echo engine stopped");
    tx.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{EngineOptions, PermissionMode, SessionInit, SessionManager, WireEvent};
    use std::sync::Arc;
    use std::time::Duration;

    fn manager(options: EngineOptions) -> SessionManager<()> {
        SessionManager::new(Arc::new(EchoEngine::new()), move || {
            SessionInit::new(()).with_options(options.clone())
        })
    }

    async fn next(feed: &mut parley_core::SessionEventStream) -> WireEvent {
        tokio::time::timeout(Duration::from_secs(5), feed.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_echoes_text_in_chunks() {
        let manager = manager(EngineOptions::default());
        let session = manager.create();
        let mut feed = manager.open_stream(session.id()).unwrap();

        manager.push_message(session.id(), "hello there world").unwrap();

        assert_eq!(next(&mut feed).await, WireEvent::MessageStart {});
        let mut text = String::new();
        loop {
            match next(&mut feed).await {
                WireEvent::TextDelta { text: chunk } => text.push_str(&chunk),
                WireEvent::TurnComplete { num_turns, .. } => {
                    assert_eq!(num_turns, 1);
                    break;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(text, "hello there world");
    }

    #[tokio::test]
    async fn test_bang_command_asks_gate() {
        let manager =
            manager(EngineOptions::default().with_permission_mode(PermissionMode::Default));
        let session = manager.create();
        let mut feed = manager.open_stream(session.id()).unwrap();

        manager.push_message(session.id(), "!ls -la").unwrap();

        let request = loop {
            if let WireEvent::PermissionRequest(request) = next(&mut feed).await {
                break request;
            }
        };
        manager
            .respond(
                session.id(),
                parley_core::PermissionResponse::deny(request.request_id(), Some("no".into())),
            )
            .unwrap();

        let result = loop {
            if let WireEvent::ToolResult { result, .. } = next(&mut feed).await {
                break result;
            }
        };
        assert_eq!(result, "Denied: no");
    }

    #[tokio::test]
    async fn test_max_turns_reported() {
        let manager = manager(EngineOptions::default().with_max_turns(1));
        let session = manager.create();
        let mut feed = manager.open_stream(session.id()).unwrap();

        manager.push_message(session.id(), "one").unwrap();
        manager.push_message(session.id(), "two").unwrap();

        let error = loop {
            if let WireEvent::SessionError { subtype } = next(&mut feed).await {
                break subtype;
            }
        };
        assert_eq!(error, "error_max_turns");
    }
}
