//! Markdown engine adapters.
//!
//! An [`Engine`] turns markdown into HTML. Two kinds exist: [`CommandEngine`]
//! pipes the input through a program on `PATH`, and [`RemoteEngine`] posts it
//! to the GitHub markdown API. The [`EngineRegistry`] maps engine ids to
//! adapters and is built once from the suite configuration.

mod command;
mod remote;

pub use command::{CommandEngine, find_executable};
pub use remote::{RemoteConfig, RemoteEngine};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::SuiteConfig;
use crate::encoding::EncodingError;

/// Prefix of the output produced when a remote engine cannot be reached.
pub const CONNECTION_ERROR_PREFIX: &str = "CONNEXION ERROR: ";

/// Prefix of the output produced when a command engine fails.
pub const ENGINE_ERROR_PREFIX: &str = "ENGINE ERROR: ";

/// Id of the GitHub markdown API engine.
pub const GFM_ENGINE_ID: &str = "gfm";

/// Command engines known without configuration, as `(id, argv)`.
pub const BUILTIN_COMMANDS: &[(&str, &[&str])] = &[
    ("kramdown", &["kramdown", "--no-auto-ids"]),
    ("multimarkdown", &["multimarkdown"]),
    ("pandoc", &["pandoc"]),
    ("redcarpet", &["redcarpet"]),
];

/// Errors produced while rendering with an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine configured with an empty argument vector.
    #[error("engine '{id}' has an empty command")]
    EmptyCommand { id: String },

    /// The program could not be started.
    #[error("failed to spawn command `{program}`: {error}")]
    Spawn { program: String, error: String },

    /// Pipe I/O with the child failed.
    #[error("I/O error talking to `{program}`: {error}")]
    Io { program: String, error: String },

    /// The child did not exit in time and was killed.
    #[error("`{program}` timed out after {}s", .after.as_secs_f64())]
    Timeout { program: String, after: Duration },

    /// The child exited unsuccessfully.
    #[error("command exited with status {status}{}", stderr_suffix(.stderr))]
    CommandFailed { status: String, stderr: String },

    /// Input or output not representable in the configured encoding.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// No token is configured for the remote API.
    #[error("no GitHub token configured")]
    MissingToken,

    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited{}", reset_suffix(.reset_at))]
    RateLimited { reset_at: Option<u64> },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("; stderr={stderr}")
    }
}

fn reset_suffix(reset_at: &Option<u64>) -> String {
    reset_at.map_or_else(String::new, |ts| {
        format!(", resets at timestamp {ts}")
    })
}

impl EngineError {
    /// Whether the error comes from talking to a remote service.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::MissingToken | Self::Request(_) | Self::Api { .. } | Self::RateLimited { .. }
        )
    }

    /// Returns the text that stands in for the engine output.
    ///
    /// The text never equals valid HTML for a real test, so the comparison
    /// fails like any other mismatch.
    pub fn sentinel(&self) -> String {
        let prefix = if self.is_connection() {
            CONNECTION_ERROR_PREFIX
        } else {
            ENGINE_ERROR_PREFIX
        };
        format!("{prefix}{self}")
    }
}

/// A markdown to HTML renderer.
pub trait Engine: Send + Sync {
    /// Identifier, equal to the engine's extension directory name.
    fn id(&self) -> &str;

    /// Whether the engine can be used on this machine.
    fn is_available(&self) -> bool;

    /// Renders markdown to HTML.
    fn render(&self, input: &str) -> Result<String, EngineError>;

    /// Renders markdown to HTML, returning failures as sentinel text.
    fn get_output(&self, input: &str) -> String {
        self.render(input).unwrap_or_else(|e| e.sentinel())
    }
}

/// Engines by id.
#[derive(Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Box<dyn Engine>>,
}

impl EngineRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the builtin engines and the configured ones.
    ///
    /// Configured command engines replace builtins of the same id.
    pub fn from_config(config: &SuiteConfig) -> Result<Self, EngineError> {
        let mut registry = Self::new();

        let remote = RemoteConfig::from_suite(config);
        registry.register(RemoteEngine::new(GFM_ENGINE_ID, remote)?);

        for (id, argv) in BUILTIN_COMMANDS {
            registry.register(Self::command(id, argv.iter().copied(), config)?);
        }
        for (id, spec) in &config.engines {
            registry.register(Self::command(id, spec.command.iter(), config)?);
        }

        tracing::debug!(engines = ?registry.ids().collect::<Vec<_>>(), "Engine registry built");
        Ok(registry)
    }

    fn command<I, S>(id: &str, argv: I, config: &SuiteConfig) -> Result<CommandEngine, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(CommandEngine::new(id, argv)?
            .with_timeout(config.timeout())
            .with_encoding(config.encoding))
    }

    /// Adds an engine, replacing any engine with the same id.
    pub fn register(&mut self, engine: impl Engine + 'static) {
        self.engines.insert(engine.id().to_string(), Box::new(engine));
    }

    /// Looks up an engine by id.
    pub fn get(&self, id: &str) -> Option<&dyn Engine> {
        self.engines.get(id).map(|engine| engine.as_ref())
    }

    /// Whether an engine with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.engines.contains_key(id)
    }

    /// Engine ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// Number of engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Engine for Echo {
        fn id(&self) -> &str {
            "echo"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn render(&self, input: &str) -> Result<String, EngineError> {
            if input == "boom" {
                Err(EngineError::CommandFailed {
                    status: "1".to_string(),
                    stderr: "bad".to_string(),
                })
            } else {
                Ok(input.to_string())
            }
        }
    }

    #[test]
    fn test_get_output_uses_sentinel() {
        assert_eq!(Echo.get_output("<p>x</p>"), "<p>x</p>");
        assert_eq!(
            Echo.get_output("boom"),
            "ENGINE ERROR: command exited with status 1; stderr=bad"
        );
    }

    #[test]
    fn test_connection_errors_use_connection_prefix() {
        let err = EngineError::Api {
            status: 500,
            message: "oops".to_string(),
        };
        assert_eq!(err.sentinel(), "CONNEXION ERROR: API error (500): oops");
        assert!(EngineError::MissingToken.sentinel().starts_with(CONNECTION_ERROR_PREFIX));
        assert_eq!(
            EngineError::RateLimited { reset_at: Some(7) }.to_string(),
            "rate limited, resets at timestamp 7"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = EngineError::Timeout {
            program: "slow".to_string(),
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "`slow` timed out after 1.5s");
        assert!(err.sentinel().starts_with(ENGINE_ERROR_PREFIX));
    }

    #[test]
    fn test_registry_from_default_config() {
        let registry = EngineRegistry::from_config(&SuiteConfig::default()).unwrap();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(
            ids,
            vec!["gfm", "kramdown", "multimarkdown", "pandoc", "redcarpet"]
        );
        assert!(registry.get("showdown").is_none());
    }

    #[test]
    fn test_registry_config_engines() {
        let config = SuiteConfig::default()
            .with_engine("showdown", ["showdown-stdin.js"])
            .with_engine("pandoc", ["pandoc", "--from=markdown_strict"]);
        let registry = EngineRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 6);
        assert!(registry.contains("showdown"));
        assert_eq!(registry.get("pandoc").map(|engine| engine.id()), Some("pandoc"));
    }

    #[test]
    fn test_registry_rejects_empty_command() {
        let config = SuiteConfig::default().with_engine("broken", Vec::<String>::new());
        let err = EngineRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::EmptyCommand { .. }));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = EngineRegistry::new();
        assert!(registry.is_empty());
        registry.register(Echo);
        registry.register(Echo);
        assert_eq!(registry.len(), 1);
        assert_eq!(format!("{registry:?}"), r#"EngineRegistry { engines: ["echo"] }"#);
    }
}
