//! Suite configuration.
//!
//! Defaults live in [`SuiteConfig::default`]; a plain TOML file can override
//! any of them. Nothing reads configuration implicitly: the loaded value is
//! passed to the engine registry and the corpus loader by the caller.
//!
//! ```toml
//! gfm_token = "ghp_..."
//! run_all_disable = ["gfm", "pandoc"]
//! timeout_secs = 10
//! encoding = "utf-8"
//!
//! [engines.showdown]
//! command = ["showdown-stdin.js"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::encoding::TextEncoding;

/// File name looked up in the fixtures root when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "mdtest.toml";

/// GitHub markdown rendering endpoint.
pub const DEFAULT_GFM_URL: &str = "https://api.github.com/markdown";

/// Environment variable consulted when the config has no GitHub token.
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading the config file
    #[error("IO error reading {path}: {error}")]
    Io { path: String, error: String },

    /// TOML parsing error
    #[error("Invalid TOML in {path}: {error}")]
    Parse { path: String, error: String },
}

/// An extra (or overriding) command-line engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSpec {
    /// Program and arguments. Input goes to stdin, HTML comes from stdout.
    pub command: Vec<String>,
}

/// Configuration for a test suite run.
///
/// Defaults:
/// - no GitHub token
/// - `gfm` excluded from all-engine runs (it is slow and rate limited)
/// - 5 second timeout for every engine call
/// - UTF-8 everywhere
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteConfig {
    /// Bearer token for the GitHub markdown API.
    pub gfm_token: String,
    /// Endpoint of the GitHub markdown API.
    pub gfm_url: String,
    /// Engines skipped when running all engines.
    pub run_all_disable: Vec<String>,
    /// Timeout for one engine call, in seconds. Zero disables it.
    pub timeout_secs: u64,
    /// Encoding of fixtures and engine I/O.
    pub encoding: TextEncoding,
    /// Command engines by id.
    pub engines: BTreeMap<String, EngineSpec>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            gfm_token: String::new(),
            gfm_url: DEFAULT_GFM_URL.to_string(),
            run_all_disable: vec!["gfm".to_string()],
            timeout_secs: 5,
            encoding: TextEncoding::Utf8,
            engines: BTreeMap::new(),
        }
    }
}

impl SuiteConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            error: e.to_string(),
        })
    }

    /// Loads configuration from a file, which must exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path_str.clone(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path_str,
            error: e.to_string(),
        })
    }

    /// Loads configuration from a file, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Fills an empty token from `GITHUB_TOKEN`.
    pub fn with_env_token(self) -> Self {
        match std::env::var(TOKEN_ENV_VAR) {
            Ok(token) => self.with_fallback_token(token),
            Err(_) => self,
        }
    }

    fn with_fallback_token(mut self, token: String) -> Self {
        if self.gfm_token.is_empty() {
            self.gfm_token = token;
        }
        self
    }

    /// Sets the GitHub token.
    pub fn with_gfm_token(mut self, token: impl Into<String>) -> Self {
        self.gfm_token = token.into();
        self
    }

    /// Sets the per-call timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Adds or replaces a command engine.
    pub fn with_engine<I, S>(mut self, id: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = command.into_iter().map(Into::into).collect();
        self.engines.insert(id.into(), EngineSpec { command });
        self
    }

    /// Returns the token, if one is set.
    pub fn gfm_token(&self) -> Option<&str> {
        Some(self.gfm_token.as_str()).filter(|token| !token.is_empty())
    }

    /// Returns the per-call timeout, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Whether an engine is excluded from all-engine runs.
    pub fn is_disabled(&self, engine_id: &str) -> bool {
        self.run_all_disable.iter().any(|id| id == engine_id)
    }
}
