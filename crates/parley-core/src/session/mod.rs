//! Session module - one engine conversation per session
//!
//! Key components:
//!
//! - `SessionManager`: creates, looks up and evicts sessions
//! - `Session`: a live conversation with its own permission gate and translator
//! - `SessionToolGate`: the gating hook handed to the engine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SessionManager                       │
//! │                                                           │
//! │  push_message(id, text) ──▶ turns ──▶ [engine] ──▶ raw    │
//! │                                          │         events │
//! │                              can_use_tool│            │   │
//! │                                          ▼            ▼   │
//! │  respond(id, resp) ──────────────▶ [PermissionGate]  [translator]
//! │                                          │            │   │
//! │                                          └──▶ fan-in ◀┘   │
//! │                                                 │         │
//! │  open_stream(id) ◀──────────────────── wire events        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! use parley_core::session::{SessionInit, SessionManager};
//!
//! let manager = SessionManager::new(engine, || SessionInit::new(()));
//! let session = manager.create();
//! let mut events = manager.open_stream(session.id())?;
//!
//! manager.push_message(session.id(), "Hello!")?;
//! while let Some(event) = events.recv().await {
//!     if let WireEvent::PermissionRequest(request) = event {
//!         manager.respond(session.id(), PermissionResponse::allow(request.request_id()))?;
//!     }
//! }
//! ```

mod approval;
mod handle;
mod manager;
mod types;

pub use approval::{ASK_USER_QUESTION_TOOL, SessionToolGate};
pub use handle::{SESSION_ABORTED_MESSAGE, Session};
pub use manager::{DEFAULT_IDLE_TIMEOUT, SessionFactory, SessionManager};
pub use types::{
    DEFAULT_MAX_TURNS, EngineOptions, PermissionMode, SessionId, SessionInit, ThinkingConfig,
};
