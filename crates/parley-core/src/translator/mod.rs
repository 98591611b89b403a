//! Raw engine event to wire event translation
//!
//! [`MessageTranslator`] consumes one [`RawEvent`] at a time and produces zero
//! or more [`WireEvent`]s. One translator exists per session. It keeps two
//! pieces of correlation state:
//!
//! - tool id to tool name, in registration order. Tool results carry only an
//!   id, and input-json deltas carry no id at all; they are attributed to the
//!   most recently registered tool.
//! - whether thinking was streamed since the last `message_start`. A complete
//!   assistant message repeats thinking that was already streamed, so its
//!   thinking blocks are only emitted when nothing was streamed this turn.

mod raw;
mod wire;

pub use raw::{BlockDelta, ContentBlock, RawEvent, RawMessage, StartBlock, StreamEvent, TurnResult};
pub use wire::{CustomEvent, WireEvent};

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::session::Session;

/// Host hook invoked after each tool result whose tool name is known.
///
/// Arguments are the tool name, the result text and the session.
pub type ToolResultHook<C> = Arc<dyn Fn(&str, &str, &Session<C>) -> Vec<CustomEvent> + Send + Sync>;

pub struct TranslatorConfig<C> {
    pub on_tool_result: Option<ToolResultHook<C>>,
}

impl<C> TranslatorConfig<C> {
    pub fn new() -> Self {
        Self {
            on_tool_result: None,
        }
    }

    pub fn with_tool_result_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &str, &Session<C>) -> Vec<CustomEvent> + Send + Sync + 'static,
    {
        self.on_tool_result = Some(Arc::new(hook));
        self
    }
}

impl<C> Default for TranslatorConfig<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for TranslatorConfig<C> {
    fn clone(&self) -> Self {
        Self {
            on_tool_result: self.on_tool_result.clone(),
        }
    }
}

pub struct MessageTranslator<C> {
    config: TranslatorConfig<C>,
    tool_names: IndexMap<String, String>,
    had_streamed_thinking: bool,
}

impl<C> MessageTranslator<C> {
    pub fn new(config: TranslatorConfig<C>) -> Self {
        Self {
            config,
            tool_names: IndexMap::new(),
            had_streamed_thinking: false,
        }
    }

    /// Tool name recorded for `id`, if any
    pub fn tool_name(&self, id: &str) -> Option<&str> {
        self.tool_names.get(id).map(String::as_str)
    }

    /// Translate one raw event
    pub fn translate(&mut self, raw: &RawEvent, session: &Session<C>) -> Vec<WireEvent> {
        let mut events = Vec::new();

        match raw {
            RawEvent::StreamEvent { event } => self.translate_stream(event, session, &mut events),

            RawEvent::Assistant { message } => {
                for block in &message.content {
                    match block {
                        ContentBlock::Thinking { thinking } if !self.had_streamed_thinking => {
                            events.push(WireEvent::ThinkingDelta {
                                text: thinking.clone(),
                            });
                        }
                        ContentBlock::ToolUse { id, name, input }
                        | ContentBlock::ServerToolUse { id, name, input } => {
                            self.register_tool(id, name);
                            events.push(WireEvent::ToolCall {
                                id: id.clone(),
                                name: name.clone(),
                                input: input.clone(),
                            });
                        }
                        ContentBlock::WebSearchToolResult {
                            tool_use_id,
                            content,
                        } => {
                            let result = content.to_string();
                            self.push_tool_result(tool_use_id, result, session, &mut events);
                        }
                        _ => {}
                    }
                }
            }

            RawEvent::User { message } => {
                for block in &message.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        let result = extract_tool_result_text(content);
                        self.push_tool_result(tool_use_id, result, session, &mut events);
                    }
                }
            }

            RawEvent::ToolProgress {
                tool_name,
                elapsed_time_seconds,
            } => events.push(WireEvent::ToolProgress {
                tool_name: tool_name.clone(),
                elapsed: *elapsed_time_seconds,
            }),

            RawEvent::TurnResult(result) if result.is_success() => {
                events.push(WireEvent::TurnComplete {
                    num_turns: result.num_turns,
                    cost: result.total_cost_usd,
                });
            }
            RawEvent::TurnResult(result) => events.push(WireEvent::SessionError {
                subtype: result.subtype.clone(),
            }),

            RawEvent::Unknown => {}
        }

        events
    }

    fn translate_stream(&mut self, event: &StreamEvent, session: &Session<C>, events: &mut Vec<WireEvent>) {
        match event {
            StreamEvent::MessageStart => {
                self.had_streamed_thinking = false;
                events.push(WireEvent::MessageStart {});
            }

            StreamEvent::ContentBlockStart { content_block } => match content_block {
                StartBlock::ToolUse { id, name } | StartBlock::ServerToolUse { id, name } => {
                    self.register_tool(id, name);
                    events.push(WireEvent::ToolStart {
                        id: id.clone(),
                        name: name.clone(),
                    });
                }
                StartBlock::Thinking => events.push(WireEvent::ThinkingStart {}),
                StartBlock::WebSearchToolResult {
                    tool_use_id,
                    content,
                } => {
                    let result = content.to_string();
                    self.push_tool_result(tool_use_id, result, session, events);
                }
                StartBlock::Other => {}
            },

            StreamEvent::ContentBlockDelta { delta } => match delta {
                BlockDelta::ThinkingDelta { thinking } => {
                    self.had_streamed_thinking = true;
                    events.push(WireEvent::ThinkingDelta {
                        text: thinking.clone(),
                    });
                }
                BlockDelta::TextDelta { text } => events.push(WireEvent::TextDelta { text: text.clone() }),
                BlockDelta::InputJsonDelta { partial_json } => {
                    // Deltas carry no id; attribute to the most recently started tool
                    match self.tool_names.last() {
                        Some((id, _)) => events.push(WireEvent::ToolInputDelta {
                            id: id.clone(),
                            partial_json: partial_json.clone(),
                        }),
                        None => warn!("Input delta arrived before any tool started"),
                    }
                }
                BlockDelta::Other => {}
            },

            StreamEvent::Other => {}
        }
    }

    fn register_tool(&mut self, id: &str, name: &str) {
        debug!(tool_id = %id, tool_name = %name, "Registered tool");
        self.tool_names.insert(id.to_string(), name.to_string());
    }

    fn push_tool_result(
        &self,
        tool_use_id: &str,
        result: String,
        session: &Session<C>,
        events: &mut Vec<WireEvent>,
    ) {
        let tool_name = self.tool_names.get(tool_use_id);
        if tool_name.is_none() {
            debug!(tool_use_id = %tool_use_id, "Tool result for unregistered tool id");
        }

        let custom = match (tool_name, &self.config.on_tool_result) {
            (Some(name), Some(hook)) => hook(name, &result, session),
            _ => Vec::new(),
        };

        events.push(WireEvent::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            result,
        });
        events.extend(custom.into_iter().map(WireEvent::Custom));
    }
}

/// Extract the text of a tool result's content.
///
/// Strings pass through; lists concatenate their text parts, or are
/// serialized whole when they hold no text parts. Anything else is empty.
pub fn extract_tool_result_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();

            if texts.is_empty() {
                content.to_string()
            } else {
                texts.concat()
            }
        }
        _ => String::new(),
    }
}
