use std::io;

use thiserror::Error;

/// Failures raised by route handlers and tool implementations.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },
    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },
    #[error("{message}")]
    Execution { message: String },
    #[error("main thread dispatcher is closed")]
    DispatcherClosed,
    #[error("handler panicked: {message}")]
    Panicked { message: String },
}

impl AppError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidArguments { .. } => 400,
            Self::ToolNotFound { .. } => 404,
            Self::Execution { .. } | Self::DispatcherClosed | Self::Panicked { .. } => 500,
        }
    }
}

/// Listener lifecycle failures surfaced from `HttpServer::start`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address: {0}")]
    InvalidAddress(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read bound address: {0}")]
    LocalAddr(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),
    #[error("tool '{0}' needs the main thread but the registry has no dispatcher")]
    MissingDispatcher(String),
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
