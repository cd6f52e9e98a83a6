use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised while creating, binding or closing a backend instance
///
/// Creation and connect failures fail the request that asked for the
/// instance (an SSE stream open or the stdio bind). Close failures are
/// always non-fatal: callers log them and move on so that one broken
/// instance cannot hold up the others.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Instance creation failed: {0}")]
    Creation(String),

    #[error("Instance connect failed: {0}")]
    Connect(String),

    #[error("Instance close failed: {0}")]
    Close(String),
}

/// Request-scoped errors of the SSE dispatcher
///
/// Every variant is resolved at the HTTP boundary with a status code and
/// terminates only the request that produced it.
///
/// | Variant                | Status | Body                       |
/// |------------------------|--------|----------------------------|
/// | MissingSession         | 400    | `Missing sessionId`        |
/// | UnknownSession         | 404    | `Session not found`        |
/// | MethodNotAllowed       | 405    | `Method not allowed`       |
/// | UnsupportedContentType | 400    | `Unsupported content-type` |
/// | InvalidMessage         | 400    | `Invalid message`          |
/// | PayloadTooLarge        | 413    | `Payload too large`        |
/// | SessionConflict        | 500    | `Failed to create session` |
/// | InstanceCreation       | 500    | `Failed to create server`  |
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Missing sessionId")]
    MissingSession,

    #[error("Session not found: {0}")]
    UnknownSession(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Session id already registered: {0}")]
    SessionConflict(String),

    #[error(transparent)]
    InstanceCreation(#[from] InstanceError),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::MissingSession
            | DispatchError::UnsupportedContentType(_)
            | DispatchError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            DispatchError::UnknownSession(_) => StatusCode::NOT_FOUND,
            DispatchError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::SessionConflict(_) | DispatchError::InstanceCreation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            DispatchError::MissingSession => "Missing sessionId",
            DispatchError::UnknownSession(_) => "Session not found",
            DispatchError::MethodNotAllowed(_) => "Method not allowed",
            DispatchError::UnsupportedContentType(_) => "Unsupported content-type",
            DispatchError::InvalidMessage(_) => "Invalid message",
            DispatchError::PayloadTooLarge => "Payload too large",
            DispatchError::SessionConflict(id) => {
                tracing::error!(session_id = %id, "Session id collision");
                "Failed to create session"
            }
            DispatchError::InstanceCreation(e) => {
                tracing::error!(error = %e, "Failed to open SSE session");
                "Failed to create server"
            }
        };

        (status, message).into_response()
    }
}

/// Configuration errors surfaced while translating process input
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown capability '{0}', expected one of: tabs, pdf, history, wait, files, install")]
    UnknownCapability(String),
}
