//! Configuration for Parley
//!
//! Loaded from a TOML file. Every section and field has a default, so a
//! partial or missing file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::{DEFAULT_MAX_TURNS, EngineOptions, PermissionMode};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for every route
    pub base_path: String,
    /// Allow cross-origin requests from any origin
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: default_base_path(),
            cors: true,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_base_path() -> String {
    "/api".to_string()
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub idle_timeout_secs: u64,
    /// How often idle sessions are swept
    pub cleanup_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            cleanup_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweep interval, never shorter than one second
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// Which engine adapter backs new sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Built-in engine that echoes user turns back
    #[default]
    Echo,
    /// External process speaking JSON lines over stdio
    Stdio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Program to spawn for the stdio engine
    pub command: Option<PathBuf>,
    pub args: Vec<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub permission_mode: PermissionMode,
    pub max_turns: u32,
    pub allowed_tools: Vec<String>,
    /// Enables extended thinking with this budget
    pub thinking_budget_tokens: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            command: None,
            args: Vec::new(),
            model: None,
            system_prompt: None,
            permission_mode: PermissionMode::default(),
            max_turns: DEFAULT_MAX_TURNS,
            allowed_tools: Vec::new(),
            thinking_budget_tokens: None,
        }
    }
}

impl EngineConfig {
    /// Engine options for a new session
    pub fn to_options(&self) -> EngineOptions {
        let mut options = EngineOptions::default()
            .with_permission_mode(self.permission_mode)
            .with_max_turns(self.max_turns)
            .with_allowed_tools(self.allowed_tools.clone());

        if let Some(model) = &self.model {
            options = options.with_model(model);
        }
        if let Some(prompt) = &self.system_prompt {
            options = options.with_system_prompt(prompt);
        }
        if let Some(budget) = self.thinking_budget_tokens {
            options = options.with_thinking_budget(budget);
        }
        options
    }

    /// Command for the stdio engine, required when that engine is selected
    pub fn require_command(&self) -> Result<&Path> {
        self.command
            .as_deref()
            .ok_or_else(|| Error::Config("engine.command is required for the stdio engine".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ThinkingConfig;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.base_path, "/api");
        assert!(config.server.cors);
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(config.engine.kind, EngineKind::Echo);
        assert!(config.engine.permission_mode.is_bypass());
        assert_eq!(config.engine.max_turns, 200);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8080

[engine]
kind = "stdio"
command = "/usr/local/bin/agent"
args = ["--json"]
permission_mode = "default"
thinking_budget_tokens = 2048
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session.cleanup_interval_secs, 60);
        assert_eq!(config.engine.kind, EngineKind::Stdio);
        assert_eq!(
            config.engine.require_command().unwrap(),
            Path::new("/usr/local/bin/agent")
        );

        let options = config.engine.to_options();
        assert_eq!(options.permission_mode, PermissionMode::Default);
        assert_eq!(options.max_turns, 200);
        assert_eq!(
            options.thinking,
            Some(ThinkingConfig::Enabled { budget_tokens: 2048 })
        );
    }

    #[test]
    fn test_load_or_default() {
        let config = Config::load_or_default(None).unwrap();
        assert_eq!(config.server.port, 3000);

        let missing = Path::new("/nonexistent/parley.toml");
        match Config::load_or_default(Some(missing)) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected an IO error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();

        assert!(matches!(Config::load(file.path()), Err(Error::TomlParse(_))));
    }

    #[test]
    fn test_stdio_requires_command() {
        let config = EngineConfig {
            kind: EngineKind::Stdio,
            ..Default::default()
        };
        assert!(matches!(config.require_command(), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[engine]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.engine.kind, config.engine.kind);
    }
}
