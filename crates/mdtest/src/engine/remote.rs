//! GitHub markdown API engine.
//!
//! Unauthenticated clients get 60 requests per hour, fewer than one suite
//! run needs, so a token is required.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Serialize;

use super::{Engine, EngineError};
use crate::config::SuiteConfig;
use crate::encoding::TextEncoding;

const CLIENT_USER_AGENT: &str = concat!("mdtest/", env!("CARGO_PKG_VERSION"));

/// Connection settings for the GitHub markdown API.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Endpoint URL.
    pub url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Timeout for a whole request.
    pub timeout: Option<Duration>,
    /// Encoding of the response body.
    pub encoding: TextEncoding,
}

impl RemoteConfig {
    /// Extracts the remote settings from a suite configuration.
    pub fn from_suite(config: &SuiteConfig) -> Self {
        Self {
            url: config.gfm_url.clone(),
            token: config.gfm_token().map(str::to_string),
            timeout: config.timeout(),
            encoding: config.encoding,
        }
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    text: &'a str,
    mode: &'static str,
    context: &'static str,
}

/// Renders through the GitHub markdown API in `gfm` mode.
#[derive(Debug)]
pub struct RemoteEngine {
    id: String,
    client: Client,
    config: RemoteConfig,
}

impl RemoteEngine {
    /// Creates the engine and its HTTP client.
    pub fn new(id: impl Into<String>, config: RemoteConfig) -> Result<Self, EngineError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            id: id.into(),
            client,
            config,
        })
    }
}

impl Engine for RemoteEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        if self.config.token.is_none() {
            tracing::debug!(engine = %self.id, "No token, remote engine unavailable");
            return false;
        }
        match self.render("a") {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(engine = %self.id, error = %e, "Availability probe failed");
                false
            }
        }
    }

    fn render(&self, input: &str) -> Result<String, EngineError> {
        let token = self.config.token.as_deref().ok_or(EngineError::MissingToken)?;

        let body = RenderRequest {
            text: input,
            mode: "gfm",
            context: "github/gollum",
        };

        let response = self
            .client
            .post(&self.config.url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, "application/vnd.github+json")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(&body)
            .send()?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(EngineError::RateLimited { reset_at });
        }

        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes()?;
        Ok(self.config.encoding.decode(&bytes)?)
    }
}
