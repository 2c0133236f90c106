//! Error types
//!
//! Every failure that crosses the gateway boundary (HTTP handlers, command
//! replies) is one of these kinds. Provider and library errors are folded into
//! them with their text attached, they never escape as panics.

use thiserror::Error;

/// Stable, machine-readable error codes returned in JSON error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotConnected,
    InvalidArgument,
    NotFound,
    SendFailed,
    EncodeFailed,
    Terminal,
    Internal,
}

impl ErrorCode {
    /// HTTP status code used when this error is returned from an endpoint.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::NotConnected | ErrorCode::InvalidArgument | ErrorCode::Terminal => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::SendFailed | ErrorCode::EncodeFailed | ErrorCode::Internal => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No session, or the session has not finished connecting.
    #[error("WhatsApp is not connected (scan the QR code first)")]
    NotConnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("failed to send message: {0}")]
    SendFailed(String),

    #[error("failed to encode QR code: {0}")]
    EncodeFailed(String),

    /// The account was logged out from the phone; only re-pairing helps.
    #[error("session logged out, re-pairing required")]
    Terminal,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::NotConnected => ErrorCode::NotConnected,
            GatewayError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            GatewayError::NotFound(_) => ErrorCode::NotFound,
            GatewayError::SendFailed(_) => ErrorCode::SendFailed,
            GatewayError::EncodeFailed(_) => ErrorCode::EncodeFailed,
            GatewayError::Terminal => ErrorCode::Terminal,
            GatewayError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        GatewayError::InvalidArgument(msg.into())
    }

    /// Wrap a provider-level failure, keeping its text.
    pub fn send_failed(err: impl std::fmt::Display) -> Self {
        GatewayError::SendFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_http_status() {
        assert_eq!(GatewayError::NotConnected.code().http_status(), 400);
        assert_eq!(GatewayError::invalid("jid").code().http_status(), 400);
        assert_eq!(
            GatewayError::NotFound("a.png".into()).code().http_status(),
            404
        );
        assert_eq!(GatewayError::send_failed("boom").code().http_status(), 500);
        // Logged out is still "not connected" to clients, only the code differs.
        assert_eq!(GatewayError::Terminal.code().http_status(), 400);
    }

    #[test]
    fn test_send_failed_keeps_provider_text() {
        let err = GatewayError::send_failed("rate-overlimit");
        assert!(err.to_string().contains("rate-overlimit"));
    }

    #[test]
    fn test_error_code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::NotConnected).unwrap();
        assert_eq!(json, "\"not_connected\"");
    }
}
