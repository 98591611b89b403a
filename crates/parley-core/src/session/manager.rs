//! Session Manager for multi-session orchestration
//!
//! Owns the live sessions, starts an engine conversation for each new one and
//! evicts sessions that have been idle for too long.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::approval::SessionToolGate;
use super::handle::Session;
use super::types::{SessionId, SessionInit};
use crate::engine::{ConversationEngine, EngineStart, ToolGate};
use crate::error::{Error, Result};
use crate::permission::{PermissionGate, PermissionResponse};
use crate::push_channel::push_channel;
use crate::stream::{SessionEventStream, stream_session};
use crate::translator::TranslatorConfig;

/// Default idle timeout before a session is evicted by [`SessionManager::cleanup`]
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Factory function type for creating session init
pub type SessionFactory<C> = Arc<dyn Fn() -> SessionInit<C> + Send + Sync>;

/// Manages multiple concurrent sessions
pub struct SessionManager<C> {
    /// Map of session ID to session
    sessions: RwLock<HashMap<SessionId, Arc<Session<C>>>>,
    engine: Arc<dyn ConversationEngine>,
    /// Called once per `create()`
    factory: SessionFactory<C>,
    translator_config: TranslatorConfig<C>,
    idle_timeout: Duration,
}

impl<C> SessionManager<C>
where
    C: Send + Sync + 'static,
{
    /// Create a new session manager
    ///
    /// The factory is called each time a new session is created, allowing
    /// per-session context and engine options.
    pub fn new<F>(engine: Arc<dyn ConversationEngine>, factory: F) -> Self
    where
        F: Fn() -> SessionInit<C> + Send + Sync + 'static,
    {
        Self {
            sessions: RwLock::new(HashMap::new()),
            engine,
            factory: Arc::new(factory),
            translator_config: TranslatorConfig::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Translator configuration given to every new session
    pub fn with_translator_config(mut self, config: TranslatorConfig<C>) -> Self {
        self.translator_config = config;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Create a session and start its engine conversation
    pub fn create(&self) -> Arc<Session<C>> {
        let session_id = Uuid::new_v4().to_string();
        let init = (self.factory)();
        let permission_mode = init.options.permission_mode;

        let (turns_tx, turns_rx) = push_channel();
        let gate = Arc::new(PermissionGate::new());
        let cancel = CancellationToken::new();

        let tool_gate: Option<Arc<dyn ToolGate>> = if permission_mode.is_bypass() {
            None
        } else {
            Some(Arc::new(SessionToolGate::new(gate.clone())))
        };

        let events = self.engine.start(EngineStart {
            session_id: session_id.clone(),
            options: init.options,
            turns: turns_rx,
            tool_gate,
            cancel: cancel.clone(),
        });

        let session = Arc::new(Session::new(
            session_id.clone(),
            init.context,
            turns_tx,
            gate,
            events,
            self.translator_config.clone(),
            cancel,
        ));

        self.sessions.write().insert(session_id.clone(), session.clone());
        info!(session_id = %session_id, ?permission_mode, "Created session");
        session
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session<C>>> {
        self.sessions.read().get(session_id).cloned()
    }

    fn require(&self, session_id: &str) -> Result<Arc<Session<C>>> {
        self.get(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Abort and remove a session. Returns whether it existed.
    pub fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id);
        match removed {
            Some(session) => {
                session.abort();
                info!(session_id = %session_id, "Deleted session");
                true
            }
            None => false,
        }
    }

    /// Abort and remove every session idle for longer than the idle timeout.
    ///
    /// Returns the evicted session ids.
    pub fn cleanup(&self) -> Vec<SessionId> {
        let evicted: Vec<Arc<Session<C>>> = {
            let mut sessions = self.sessions.write();
            let expired: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, session)| session.idle_for() > self.idle_timeout)
                .map(|(id, _)| id.clone())
                .collect();
            expired
                .iter()
                .filter_map(|id| sessions.remove(id))
                .collect()
        };

        for session in &evicted {
            session.abort();
            info!(session_id = %session.id(), idle_secs = session.idle_for().as_secs(), "Evicted idle session");
        }

        evicted.iter().map(|s| s.id().to_string()).collect()
    }

    /// Forward a user turn. Text is trimmed; blank text is rejected.
    pub fn push_message(&self, session_id: &str, text: &str) -> Result<()> {
        let session = self.require(session_id)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        debug!(session_id = %session_id, len = text.len(), "Pushing user turn");
        session.push_message(text)
    }

    /// Resolve a pending permission request of a session
    pub fn respond(&self, session_id: &str, response: PermissionResponse) -> Result<()> {
        self.require(session_id)?.respond(response)
    }

    /// Open the wire event stream of a session
    pub fn open_stream(&self, session_id: &str) -> Result<SessionEventStream> {
        stream_session(self.require(session_id)?)
    }

    pub fn list(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Abort and remove every session
    pub fn abort_all(&self) -> usize {
        let drained: Vec<Arc<Session<C>>> =
            self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.abort();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Aborted all sessions");
        }
        drained.len()
    }
}
