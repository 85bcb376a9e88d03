//! Error types for the project desk.

use std::path::PathBuf;

use crate::session::Stage;

/// Top-level error type for the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Project service error: {0}")]
    Api(#[from] ApiError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which remote call an [`ApiError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCall {
    Initiate,
    Chat,
    Analyze,
    GetSession,
    ListProjects,
    Audit,
}

impl std::fmt::Display for ApiCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initiate => "initiate",
            Self::Chat => "chat",
            Self::Analyze => "analyze",
            Self::GetSession => "get_session",
            Self::ListProjects => "list_projects",
            Self::Audit => "audit",
        };
        write!(f, "{s}")
    }
}

/// Failures of a call to the remote project service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Connection refused, timeout, DNS failure.
    #[error("{call} request failed: {reason}")]
    Transport { call: ApiCall, reason: String },

    /// Non-2xx response, possibly carrying a structured `detail`.
    #[error("{call} returned HTTP {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Server {
        call: ApiCall,
        status: u16,
        detail: Option<String>,
    },

    /// 2xx response whose body is not the JSON we expected.
    #[error("Invalid response from {call}: {reason}")]
    Malformed { call: ApiCall, reason: String },
}

impl ApiError {
    pub fn call(&self) -> ApiCall {
        match self {
            Self::Transport { call, .. } | Self::Server { call, .. } | Self::Malformed { call, .. } => {
                *call
            }
        }
    }

    /// The message shown to the user.
    ///
    /// Structured server errors surface the server's own `detail` verbatim;
    /// everything else gets a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Server {
                detail: Some(detail),
                ..
            } => detail.clone(),
            Self::Server { status, call, .. } => {
                format!("The project service could not complete {call} (HTTP {status}).")
            }
            Self::Transport { .. } => {
                "Could not reach the project service. Please try again.".to_string()
            }
            Self::Malformed { .. } => {
                "The project service returned an unexpected response.".to_string()
            }
        }
    }
}

/// Problems with what the user asked for. Caught before any call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Please provide a project idea summary.")]
    EmptySummary,

    #[error("Please type a message first.")]
    EmptyMessage,

    #[error("No project is open.")]
    NoProject,

    #[error("Another request is still being processed.")]
    ActionPending,

    #[error("{action} is not available while the project is in stage {stage}.")]
    NotAllowed { action: String, stage: Stage },

    #[error("Cannot perform audit: {0}")]
    AuditUnavailable(String),

    #[error("Analysis version {0} does not exist.")]
    UnknownVersion(u32),

    #[error("Unsupported attachment {}: only png, jpg, jpeg, pdf and txt files are accepted.", .path.display())]
    UnsupportedAttachment { path: PathBuf },

    #[error("Could not read attachment {}: {reason}", .path.display())]
    AttachmentUnreadable { path: PathBuf, reason: String },

    #[error("Unknown currency {0}.")]
    UnknownCurrency(String),
}

/// Render surface errors.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Failed to write to the terminal: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, Error>;
