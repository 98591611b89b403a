//! Parley Core - session coordination for streaming agent conversations
//!
//! This crate sits between a client and an external conversation engine:
//! - Session lifecycle: creation, lookup, idle eviction and abort
//! - Permission gating of tool calls with request/response correlation
//! - Translation of raw engine events into a small, stable wire protocol
//! - Fan-in of engine events and permission requests into one event feed

pub mod config;
pub mod engine;
pub mod error;
pub mod permission;
pub mod push_channel;
pub mod session;
pub mod stream;
pub mod translator;

pub use config::{Config, EngineConfig, EngineKind, ServerConfig, SessionSettings};
pub use engine::{
    ConversationEngine, EngineStart, RawEventStream, ToolDecision, ToolGate, ToolUseRequest,
    UserTurn,
};
pub use error::{EngineError, Error, Result};
pub use permission::{
    Behavior, PermissionGate, PermissionKind, PermissionRequest, PermissionResponse,
    ToolApprovalRequest, UserQuestion, UserQuestionOption,
};
pub use push_channel::{PushReceiver, PushSender, push_channel};
pub use session::{
    EngineOptions, PermissionMode, Session, SessionId, SessionInit, SessionManager,
};
pub use stream::{SessionEventStream, SseFrame, sse_encode, stream_session};
pub use translator::{
    CustomEvent, MessageTranslator, RawEvent, TranslatorConfig, WireEvent,
    extract_tool_result_text,
};
