//! Session types shared by the manager, the gating hook and engines

use serde::{Deserialize, Serialize};

/// Unique identifier for a session
pub type SessionId = String;

/// Default cap on agentic turns per conversation
pub const DEFAULT_MAX_TURNS: u32 = 200;

/// How tool calls are gated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Every tool call is gated
    Default,
    /// Edits are auto-accepted by the engine; other tools are gated
    AcceptEdits,
    /// Engine plans without executing; gated like `Default`
    Plan,
    /// No gating hook is installed
    #[default]
    BypassPermissions,
}

impl PermissionMode {
    pub fn is_bypass(self) -> bool {
        self == PermissionMode::BypassPermissions
    }
}

/// Extended thinking configuration passed to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    Enabled { budget_tokens: u32 },
    Disabled,
}

/// Engine configuration for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub max_turns: u32,
    pub permission_mode: PermissionMode,
    pub thinking: Option<ThinkingConfig>,
    /// Opaque tool-server configuration forwarded to the engine
    pub mcp_servers: Option<serde_json::Value>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: None,
            allowed_tools: Vec::new(),
            max_turns: DEFAULT_MAX_TURNS,
            permission_mode: PermissionMode::default(),
            thinking: None,
            mcp_servers: None,
        }
    }
}

impl EngineOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn with_thinking_budget(mut self, budget_tokens: u32) -> Self {
        self.thinking = Some(ThinkingConfig::Enabled { budget_tokens });
        self
    }
}

/// What the host supplies for each new session
#[derive(Debug, Clone)]
pub struct SessionInit<C> {
    /// Host data carried by the session, opaque to the core
    pub context: C,
    pub options: EngineOptions,
}

impl<C> SessionInit<C> {
    pub fn new(context: C) -> Self {
        Self {
            context,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }
}
