//! Session event streaming
//!
//! [`stream_session`] merges two producers into one ordered feed per session:
//! translated engine events, and permission requests raised on the session's
//! gate. Both push into one push channel that the client drains through a
//! [`SessionEventStream`].
//!
//! Requests already pending when the stream opens are replayed first. The
//! feed ends when the engine stream ends, fails (a terminal `error` event is
//! sent first) or the session is aborted. If the client drops the feed early,
//! the engine stream and every engine event the client had not pulled yet are
//! handed back to the session, so a later stream resumes where this one
//! stopped.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::Result;
use crate::push_channel::{PushReceiver, push_channel};
use crate::session::Session;
use crate::translator::WireEvent;

/// Wire events of one session, in emission order.
///
/// Dropping it detaches the client; undelivered events go back to the
/// session for the next stream.
pub struct SessionEventStream {
    feed: Option<PushReceiver<WireEvent>>,
    detach: Option<oneshot::Sender<PushReceiver<WireEvent>>>,
}

impl SessionEventStream {
    /// Next event, or `None` once the feed has ended
    pub async fn recv(&mut self) -> Option<WireEvent> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<WireEvent>> {
        match self.feed.as_mut() {
            Some(feed) => feed.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Stream for SessionEventStream {
    type Item = WireEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<WireEvent>> {
        self.get_mut().poll_recv(cx)
    }
}

impl Drop for SessionEventStream {
    fn drop(&mut self) {
        if let (Some(feed), Some(detach)) = (self.feed.take(), self.detach.take()) {
            // Fails only when the drive task already ended; the feed is
            // dropped with it
            let _ = detach.send(feed);
        }
    }
}

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    /// Serialized JSON payload
    pub data: String,
}

impl SseFrame {
    pub fn encode(&self) -> String {
        sse_encode(self)
    }
}

/// Encode a frame in `text/event-stream` format
pub fn sse_encode(frame: &SseFrame) -> String {
    format!("event: {}\ndata: {}\n\n", frame.event, frame.data)
}

enum DriveOutcome {
    /// Engine stream ended
    Finished,
    /// Engine stream failed
    Failed,
    /// Session aborted
    Aborted,
    /// Client dropped the feed, handing back what it had not pulled
    Detached(Option<PushReceiver<WireEvent>>),
}

impl DriveOutcome {
    fn label(&self) -> &'static str {
        match self {
            DriveOutcome::Finished => "finished",
            DriveOutcome::Failed => "failed",
            DriveOutcome::Aborted => "aborted",
            DriveOutcome::Detached(_) => "detached",
        }
    }
}

/// Open the event feed of a session.
///
/// At most one feed per session is open at a time. Fails with
/// `StreamAlreadyOpen` while another is attached, and `SessionClosed` once
/// the engine stream has ended or the session was aborted.
pub fn stream_session<C>(session: Arc<Session<C>>) -> Result<SessionEventStream>
where
    C: Send + Sync + 'static,
{
    let (mut raw, backlog) = session.take_events()?;
    let (output, feed) = push_channel();
    let (detach, mut detached) = oneshot::channel();

    for event in backlog {
        output.push(event);
    }

    let listener_output = output.clone();
    let subscription = session.gate().on_request_replaying(move |request| {
        listener_output.push(WireEvent::PermissionRequest(request.clone()));
    });
    info!(session_id = %session.id(), "Event stream opened");

    tokio::spawn(async move {
        let outcome = loop {
            tokio::select! {
                biased;

                returned = &mut detached => break DriveOutcome::Detached(returned.ok()),
                _ = session.cancelled() => break DriveOutcome::Aborted,
                item = raw.next() => match item {
                    Some(Ok(event)) => {
                        for wire in session.translate(&event) {
                            output.push(wire);
                        }
                    }
                    Some(Err(e)) => {
                        output.push(WireEvent::error(e.to_string()));
                        break DriveOutcome::Failed;
                    }
                    None => break DriveOutcome::Finished,
                },
            }
        };

        subscription.unsubscribe();
        output.close();
        info!(session_id = %session.id(), outcome = outcome.label(), "Event stream closed");

        match outcome {
            DriveOutcome::Detached(returned) => {
                let mut backlog = Vec::new();
                if let Some(mut feed) = returned {
                    // Pending requests are replayed on the next attach, and
                    // resolved ones are stale
                    while let Some(event) = feed.recv().await {
                        if !matches!(event, WireEvent::PermissionRequest(_)) {
                            backlog.push(event);
                        }
                    }
                }
                session.restore_events(raw, backlog);
            }
            _ => session.finish_events(),
        }
        debug!(session_id = %session.id(), pending = session.gate().pending_count(), "Stream drive task exiting");
    });

    Ok(SessionEventStream {
        feed: Some(feed),
        detach: Some(detach),
    })
}
