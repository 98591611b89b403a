//! Request/response correlation for permission requests
//!
//! ## Design
//!
//! - Each pending request owns a oneshot sender; the requester awaits the
//!   matching receiver through [`PendingResponse`]
//! - Resolution removes the entry from the pending map first, so every
//!   request is resolved at most once
//! - Listeners are notified synchronously, outside the state lock, after the
//!   request is registered
//! - [`PermissionGate::cancel_all`] resolves every pending request with a
//!   synthesized default so no requester is left waiting

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{PermissionKind, PermissionRequest, PermissionResponse};
use crate::error::{Error, Result};

/// Message used when a gate is dropped with requests still pending
const GATE_DROPPED_MESSAGE: &str = "Session ended";

/// Callback invoked for every newly raised request
pub type RequestListener = Arc<dyn Fn(&PermissionRequest) + Send + Sync>;

struct PendingEntry {
    request: PermissionRequest,
    responder: oneshot::Sender<PermissionResponse>,
}

#[derive(Default)]
struct GateState {
    /// Insertion-ordered so snapshots preserve request order
    pending: IndexMap<String, PendingEntry>,
    listeners: Vec<(u64, RequestListener)>,
    next_listener_id: u64,
}

/// Correlates permission requests with their eventual responses by request id
#[derive(Default)]
pub struct PermissionGate {
    state: Arc<Mutex<GateState>>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and notify listeners.
    ///
    /// The request is pending as soon as this returns; await the returned
    /// [`PendingResponse`] for the decision. Fails if a request with the same
    /// id is already pending.
    pub fn request(&self, request: PermissionRequest) -> Result<PendingResponse> {
        let request_id = request.request_id().to_string();
        let kind = request.kind();
        let (responder, rx) = oneshot::channel();

        let listeners: Vec<RequestListener> = {
            let mut state = self.state.lock();
            if state.pending.contains_key(&request_id) {
                return Err(Error::DuplicateRequest(request_id));
            }
            state.pending.insert(
                request_id.clone(),
                PendingEntry {
                    request: request.clone(),
                    responder,
                },
            );
            state.listeners.iter().map(|(_, l)| l.clone()).collect()
        };

        debug!(request_id = %request_id, kind = %kind, listeners = listeners.len(), "Permission requested");
        for listener in listeners {
            listener(&request);
        }

        Ok(PendingResponse {
            rx,
            request_id,
            kind,
        })
    }

    /// Resolve a pending request with `response`.
    ///
    /// Returns `false` if no request with that id is pending. The response
    /// kind is not checked against the request kind.
    pub fn respond(&self, response: PermissionResponse) -> bool {
        let entry = self.state.lock().pending.shift_remove(response.request_id());

        let Some(entry) = entry else {
            warn!(request_id = %response.request_id(), "Received response for unknown request");
            return false;
        };

        debug!(request_id = %response.request_id(), kind = %response.kind(), "Permission resolved");
        if entry.responder.send(response).is_err() {
            debug!("Requester stopped waiting before the response arrived");
        }
        true
    }

    /// Register a listener for every future request
    pub fn on_request<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&PermissionRequest) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        self.register(&mut state, Arc::new(listener))
    }

    /// Replay all currently pending requests to `listener`, then register it.
    ///
    /// Both happen under one lock, so a request raised concurrently is
    /// delivered exactly once. The listener must not call back into the gate.
    pub fn on_request_replaying<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&PermissionRequest) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        for entry in state.pending.values() {
            listener(&entry.request);
        }
        self.register(&mut state, Arc::new(listener))
    }

    fn register(&self, state: &mut GateState, listener: RequestListener) -> ListenerHandle {
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.push((id, listener));

        ListenerHandle {
            state: Arc::downgrade(&self.state),
            id,
        }
    }

    /// Snapshot of unresolved requests, in request order
    pub fn get_pending(&self) -> Vec<PermissionRequest> {
        self.state
            .lock()
            .pending
            .values()
            .map(|entry| entry.request.clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Resolve every pending request with its default response and clear the set.
    ///
    /// Tool approvals are denied with `message`; questions get no answers.
    pub fn cancel_all(&self, message: &str) -> usize {
        let drained: Vec<(String, PendingEntry)> = self.state.lock().pending.drain(..).collect();
        let count = drained.len();

        for (request_id, entry) in drained {
            let response = PermissionResponse::cancelled(entry.request.kind(), &request_id, message);
            let _ = entry.responder.send(response);
        }

        if count > 0 {
            debug!(count, message, "Cancelled pending permission requests");
        }
        count
    }
}

/// Handle returned by [`PermissionGate::on_request`]; call
/// [`unsubscribe`](ListenerHandle::unsubscribe) to stop receiving requests.
pub struct ListenerHandle {
    state: Weak<Mutex<GateState>>,
    id: u64,
}

impl ListenerHandle {
    /// Deregister the listener. Returns whether it was still registered.
    pub fn unsubscribe(self) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let mut state = state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(id, _)| *id != self.id);
        state.listeners.len() != before
    }
}

/// Future resolving to the response for one request.
///
/// If the gate is dropped before answering, resolves to the cancellation
/// default for the request kind.
pub struct PendingResponse {
    rx: oneshot::Receiver<PermissionResponse>,
    request_id: String,
    kind: PermissionKind,
}

impl PendingResponse {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Future for PendingResponse {
    type Output = PermissionResponse;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<PermissionResponse> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(response)) => Poll::Ready(response),
            Poll::Ready(Err(_)) => Poll::Ready(PermissionResponse::cancelled(
                this.kind,
                &this.request_id,
                GATE_DROPPED_MESSAGE,
            )),
            Poll::Pending => Poll::Pending,
        }
    }
}
