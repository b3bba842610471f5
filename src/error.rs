//! Error types for the proxy.
//!
//! Every variant maps onto a client-visible HTTP status and a stable kind
//! name; see [`ProxyError::status_code`] and [`ProxyError::kind`].

use std::fmt;
use thiserror::Error;

/// What went wrong while talking to the upstream over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Timeout,
    Body,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Body => "body",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Upstream API error: {body}")]
    Upstream { status: u16, body: String },

    #[error("Upstream transport error ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("Invalid request: {message}")]
    Translation { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    pub fn transport(kind: TransportKind, msg: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: msg.into(),
        }
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation {
            message: msg.into(),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// HTTP status reported to the client.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config { .. } => 500,
            Self::Upstream { status, .. } if (400..=599).contains(status) => *status,
            Self::Upstream { .. } => 502,
            Self::Transport {
                kind: TransportKind::Timeout,
                ..
            } => 504,
            Self::Transport { .. } => 502,
            Self::Translation { .. } => 400,
            Self::Io(_) | Self::Json(_) | Self::Toml(_) | Self::Other(_) => 500,
        }
    }

    /// Stable, machine-readable name of the failure kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "configuration_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Transport {
                kind: TransportKind::Timeout,
                ..
            } => "upstream_timeout",
            Self::Transport { .. } => "transport_error",
            Self::Translation { .. } => "invalid_request_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Toml(_) => "toml_error",
            Self::Other(_) => "internal_error",
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_body() || err.is_decode() {
            TransportKind::Body
        } else {
            TransportKind::Connect
        };
        // Upstream URLs stay out of client-visible messages.
        Self::transport(kind, err.without_url().to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
