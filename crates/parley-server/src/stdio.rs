//! Stdio engine
//!
//! Runs a conversation in a child process that speaks newline-delimited JSON.
//! User turns are written to its stdin; every stdout line is either a raw
//! event or a `control_request` asking whether a tool may run. Tool requests
//! go through the session's tool gate and are answered on stdin with a
//! `control_response` line.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, info, warn};

use parley_core::{
    ConversationEngine, EngineError, EngineStart, PushReceiver, PushSender, RawEvent,
    RawEventStream, ToolDecision, ToolGate, ToolUseRequest, push_channel,
};

/// Environment variable carrying the session's engine options as JSON
pub const OPTIONS_ENV: &str = "PARLEY_ENGINE_OPTIONS";
/// Environment variable carrying the session id
pub const SESSION_ENV: &str = "PARLEY_SESSION_ID";

type RawSender = PushSender<Result<RawEvent, EngineError>>;

/// Spawns one child process per session
#[derive(Debug, Clone)]
pub struct StdioEngine {
    command: PathBuf,
    args: Vec<String>,
}

impl StdioEngine {
    pub fn new(command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl ConversationEngine for StdioEngine {
    fn start(&self, start: EngineStart) -> RawEventStream {
        let (tx, rx) = push_channel();
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run(start, &tx).await {
                warn!(error = %e, "Stdio engine failed");
                tx.push(Err(e));
            }
            tx.close();
        });
        rx.boxed()
    }
}

/// `control_request` line written by the child
#[derive(Debug, Deserialize)]
struct ControlRequest {
    request_id: String,
    request: ControlPayload,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
enum ControlPayload {
    CanUseTool {
        tool_name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        tool_use_id: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

impl StdioEngine {
    async fn run(&self, start: EngineStart, tx: &RawSender) -> Result<(), EngineError> {
        let EngineStart {
            session_id,
            options,
            mut turns,
            tool_gate,
            cancel,
        } = start;

        let options_json = serde_json::to_string(&options)
            .map_err(|e| EngineError::Other(format!("Failed to encode engine options: {}", e)))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env(SESSION_ENV, &session_id)
            .env(OPTIONS_ENV, options_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Process(format!("Failed to spawn {}: {}", self.command.display(), e))
            })?;
        info!(session_id = %session_id, command = %self.command.display(), "Engine process started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Process("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Process("Failed to capture stdout".to_string()))?;

        let (outbox, outbox_rx) = push_channel();
        tokio::spawn(write_lines(stdin, outbox_rx));

        let mut lines = BufReader::new(stdout).lines();
        let mut turns_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id = %session_id, "Killing engine process");
                    if let Err(e) = child.kill().await {
                        warn!(session_id = %session_id, error = %e, "Failed to kill engine process");
                    }
                    return Ok(());
                }
                turn = turns.recv(), if turns_open => match turn {
                    Some(turn) => {
                        outbox.push(json!({
                            "type": "user",
                            "session_id": session_id,
                            "message": {"role": "user", "content": turn.text},
                            "parent_tool_use_id": null,
                        }));
                    }
                    None => turns_open = false,
                },
                line = lines.next_line() => match line {
                    Ok(Some(line)) => handle_line(&line, tx, &outbox, tool_gate.as_ref()),
                    Ok(None) => break,
                    Err(e) => return Err(EngineError::Process(format!("Failed to read stdout: {}", e))),
                },
            }
        }

        outbox.close();
        let status = child.wait().await?;
        info!(session_id = %session_id, %status, "Engine process exited");

        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Process(format!("exited with {}", status)))
        }
    }
}

fn handle_line(
    line: &str,
    tx: &RawSender,
    outbox: &PushSender<Value>,
    tool_gate: Option<&Arc<dyn ToolGate>>,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Skipping non-JSON line from engine");
            return;
        }
    };

    if value.get("type").and_then(Value::as_str) != Some("control_request") {
        tx.push(Ok(RawEvent::decode(value)));
        return;
    }

    let control: ControlRequest = match serde_json::from_value(value) {
        Ok(control) => control,
        Err(e) => {
            warn!(error = %e, "Malformed control request");
            return;
        }
    };

    let request_id = control.request_id;
    match control.request {
        ControlPayload::CanUseTool {
            tool_name,
            input,
            tool_use_id,
        } => {
            let mut request = ToolUseRequest::new(tool_name, input);
            request.tool_use_id = tool_use_id;
            let gate = tool_gate.cloned();
            let outbox = outbox.clone();

            // The gate may wait on a client; keep reading output meanwhile
            tokio::spawn(async move {
                let decision = match gate {
                    Some(gate) => gate.can_use_tool(request).await,
                    None => ToolDecision::Allow {
                        updated_input: request.input,
                    },
                };
                outbox.push(control_success(&request_id, &decision));
            });
        }
        ControlPayload::Unsupported => {
            debug!(request_id = %request_id, "Unsupported control request");
            outbox.push(json!({
                "type": "control_response",
                "response": {
                    "subtype": "error",
                    "request_id": request_id,
                    "error": "Unsupported control request",
                },
            }));
        }
    }
}

fn control_success(request_id: &str, decision: &ToolDecision) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": decision,
        },
    })
}

async fn write_lines(mut stdin: ChildStdin, mut outbox: PushReceiver<Value>) {
    while let Some(message) = outbox.recv().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode engine input");
                continue;
            }
        };
        let written = async {
            stdin.write_all(json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "Failed to write to engine process");
            break;
        }
    }
}
