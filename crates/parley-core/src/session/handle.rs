//! A live session
//!
//! Holds the engine's input channel and output stream, the session's own
//! permission gate and translator, and the activity clock used for idle
//! eviction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::SessionId;
use crate::engine::{RawEventStream, UserTurn};
use crate::error::{Error, Result};
use crate::permission::{
    PermissionGate, PermissionRequest, PermissionResponse, ToolApprovalRequest, TrackedToolCall,
    find_matching_approval,
};
use crate::push_channel::PushSender;
use crate::translator::{MessageTranslator, RawEvent, TranslatorConfig, WireEvent};

/// Message used to cancel pending requests when a session is aborted
pub const SESSION_ABORTED_MESSAGE: &str = "Session aborted";

/// Ownership of the engine's raw event stream
pub(crate) enum EventSlot {
    /// Not attached to any client stream. `backlog` holds wire events a
    /// previous client never pulled.
    Idle {
        raw: RawEventStream,
        backlog: Vec<WireEvent>,
    },
    /// Being drained by an open client stream
    Attached,
    /// The engine stream has ended
    Finished,
}

pub struct Session<C> {
    id: SessionId,
    context: C,
    turns: PushSender<UserTurn>,
    gate: Arc<PermissionGate>,
    events: Mutex<EventSlot>,
    translator: Mutex<MessageTranslator<C>>,
    cancel: CancellationToken,
    aborted: AtomicBool,
    created_at: DateTime<Utc>,
    last_activity: Mutex<Instant>,
}

impl<C> Session<C> {
    pub(crate) fn new(
        id: SessionId,
        context: C,
        turns: PushSender<UserTurn>,
        gate: Arc<PermissionGate>,
        events: RawEventStream,
        translator: TranslatorConfig<C>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            context,
            turns,
            gate,
            events: Mutex::new(EventSlot::Idle {
                raw: events,
                backlog: Vec::new(),
            }),
            translator: Mutex::new(MessageTranslator::new(translator)),
            cancel,
            aborted: AtomicBool::new(false),
            created_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host data supplied when the session was created
    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Time since the last user turn or resolved permission response
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }

    /// Record activity. The clock never moves backwards.
    pub fn touch(&self) {
        let now = Instant::now();
        let mut last = self.last_activity.lock();
        if now > *last {
            *last = now;
        }
    }

    /// Forward a user turn into the engine
    pub fn push_message(&self, text: impl Into<String>) -> Result<()> {
        if self.is_aborted() {
            return Err(Error::SessionClosed(self.id.clone()));
        }

        self.touch();
        if !self.turns.push(UserTurn::new(text)) {
            return Err(Error::SessionClosed(self.id.clone()));
        }
        Ok(())
    }

    /// Resolve one of this session's pending permission requests
    pub fn respond(&self, response: PermissionResponse) -> Result<()> {
        let request_id = response.request_id().to_string();
        if !self.gate.respond(response) {
            return Err(Error::RequestNotFound(request_id));
        }

        self.touch();
        Ok(())
    }

    /// Unresolved permission requests, in request order
    pub fn pending_requests(&self) -> Vec<PermissionRequest> {
        self.gate.get_pending()
    }

    /// Pending tool approval that gates `call`, if any
    pub fn pending_approval_for(&self, call: &TrackedToolCall) -> Option<ToolApprovalRequest> {
        find_matching_approval(&self.gate.get_pending(), call).cloned()
    }

    /// Cancel pending requests and stop the engine.
    ///
    /// Only the first call has any effect.
    pub fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }

        let cancelled = self.gate.cancel_all(SESSION_ABORTED_MESSAGE);
        self.cancel.cancel();
        self.turns.close();
        info!(session_id = %self.id, cancelled, "Session aborted");
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once the session has been aborted
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Run one raw event through this session's translator
    pub fn translate(&self, raw: &RawEvent) -> Vec<WireEvent> {
        self.translator.lock().translate(raw, self)
    }

    /// Take the engine stream, and any undelivered wire events, for an
    /// attaching client
    pub(crate) fn take_events(&self) -> Result<(RawEventStream, Vec<WireEvent>)> {
        if self.is_aborted() {
            return Err(Error::SessionClosed(self.id.clone()));
        }

        let mut slot = self.events.lock();
        match std::mem::replace(&mut *slot, EventSlot::Attached) {
            EventSlot::Idle { raw, backlog } => Ok((raw, backlog)),
            EventSlot::Attached => Err(Error::StreamAlreadyOpen(self.id.clone())),
            EventSlot::Finished => {
                *slot = EventSlot::Finished;
                Err(Error::SessionClosed(self.id.clone()))
            }
        }
    }

    /// Hand the engine stream back after the client went away, along with
    /// the events it had not pulled yet
    pub(crate) fn restore_events(&self, raw: RawEventStream, backlog: Vec<WireEvent>) {
        debug!(session_id = %self.id, backlog = backlog.len(), "Engine stream detached");
        *self.events.lock() = EventSlot::Idle { raw, backlog };
    }

    pub(crate) fn finish_events(&self) {
        *self.events.lock() = EventSlot::Finished;
    }
}

#[cfg(test)]
impl<C> Session<C> {
    /// Session with no engine behind it, for translator tests
    pub(crate) fn stub(id: &str, context: C) -> Self {
        use futures::StreamExt;

        let (turns, _) = crate::push_channel::push_channel();
        Self::new(
            id.to_string(),
            context,
            turns,
            Arc::new(PermissionGate::new()),
            futures::stream::empty().boxed(),
            TranslatorConfig::default(),
            CancellationToken::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::ToolCallPhase;
    use serde_json::json;

    #[test]
    fn test_push_to_dropped_engine_reports_closed() {
        let session = Session::stub("s1", ());
        assert!(matches!(
            session.push_message("hi"),
            Err(Error::SessionClosed(id)) if id == "s1"
        ));
    }

    #[tokio::test]
    async fn test_abort_cancels_pending_once() {
        let session = Session::stub("s1", ());
        let pending = session
            .gate()
            .request(PermissionRequest::tool_approval("r1", "Bash", json!({})))
            .unwrap();

        session.abort();
        session.abort();

        assert!(session.is_aborted());
        assert_eq!(
            pending.await,
            PermissionResponse::deny("r1", Some(SESSION_ABORTED_MESSAGE.to_string()))
        );
        assert!(matches!(session.take_events(), Err(Error::SessionClosed(_))));
    }

    #[test]
    fn test_respond_unknown_request() {
        let session = Session::stub("s1", ());
        let result = session.respond(PermissionResponse::allow("missing"));
        assert!(matches!(result, Err(Error::RequestNotFound(id)) if id == "missing"));
    }

    #[test]
    fn test_single_attachment() {
        let session = Session::stub("s1", ());
        let (raw, backlog) = session.take_events().unwrap();
        assert!(backlog.is_empty());
        assert!(matches!(session.take_events(), Err(Error::StreamAlreadyOpen(_))));

        session.restore_events(raw, vec![WireEvent::MessageStart {}]);
        let (_, backlog) = session.take_events().unwrap();
        assert_eq!(backlog, vec![WireEvent::MessageStart {}]);

        session.finish_events();
        assert!(matches!(session.take_events(), Err(Error::SessionClosed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle_clock() {
        let session = Session::stub("s1", ());
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(session.idle_for(), Duration::from_secs(90));

        session.touch();
        assert_eq!(session.idle_for(), Duration::ZERO);
    }

    #[test]
    fn test_pending_approval_for_call() {
        let session = Session::stub("s1", ());
        let mut request = PermissionRequest::tool_approval("r1", "Edit", json!({}));
        if let PermissionRequest::ToolApproval(ref mut req) = request {
            req.tool_use_id = Some("tu-1".to_string());
        }
        let _pending = session.gate().request(request).unwrap();

        let call = TrackedToolCall::new("tu-1", "Edit", ToolCallPhase::Running);
        assert_eq!(
            session.pending_approval_for(&call).map(|a| a.request_id),
            Some("r1".to_string())
        );

        let done = TrackedToolCall::new("tu-1", "Edit", ToolCallPhase::Complete);
        assert!(session.pending_approval_for(&done).is_none());
    }
}
