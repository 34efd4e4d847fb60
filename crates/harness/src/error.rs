//! Error types for the verification harness

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::BrowserError;

/// Coarse classification used when reporting a failed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Data,
    Auth,
    FrameUnavailable,
    Verification,
    Session,
    Navigation,
    Timeout,
    Browser,
    Config,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Data => "DataError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::FrameUnavailable => "FrameUnavailableError",
            ErrorKind::Verification => "VerificationError",
            ErrorKind::Session => "SessionError",
            ErrorKind::Navigation => "NavigationError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Browser => "BrowserError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Io => "IoError",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Account data error: {0}")]
    Data(String),

    #[error("Login failed for {account}: {reason}")]
    Auth { account: String, reason: String },

    #[error("Content frame '{frame}' unavailable: {reason}")]
    FrameUnavailable { frame: String, reason: String },

    #[error("Verification failed: {assertion} (expected {expected}, observed {observed})")]
    Verification {
        assertion: String,
        expected: String,
        observed: String,
    },

    #[error("Session error for {account}: {reason}")]
    Session { account: String, reason: String },

    #[error("Navigation failed at '{step}': {reason}")]
    Navigation { step: String, reason: String },

    #[error("Menu control '{target}' is ambiguous: {count} controls match")]
    AmbiguousMatch { target: String, count: usize },

    #[error("Scenario instance exceeded its {0} ms ceiling")]
    Timeout(u64),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Data(_) => ErrorKind::Data,
            HarnessError::Auth { .. } => ErrorKind::Auth,
            HarnessError::FrameUnavailable { .. } => ErrorKind::FrameUnavailable,
            HarnessError::Verification { .. } => ErrorKind::Verification,
            HarnessError::Session { .. } => ErrorKind::Session,
            HarnessError::Navigation { .. } | HarnessError::AmbiguousMatch { .. } => {
                ErrorKind::Navigation
            }
            HarnessError::Timeout(_) => ErrorKind::Timeout,
            HarnessError::Browser(_) => ErrorKind::Browser,
            HarnessError::Config(_)
            | HarnessError::Json(_)
            | HarnessError::Yaml(_)
            | HarnessError::Toml(_) => ErrorKind::Config,
            HarnessError::Io(_) => ErrorKind::Io,
        }
    }

    /// Errors that abort the whole run instead of a single instance.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self.kind(), ErrorKind::Data | ErrorKind::Config)
    }

    /// Whether a navigation pass that ended with this error may be repeated.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            HarnessError::FrameUnavailable { .. }
            | HarnessError::Verification { .. }
            | HarnessError::Navigation { .. } => true,
            HarnessError::Browser(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
