use axum::response::{IntoResponse, Response};
use http::header::WWW_AUTHENTICATE;
use http::StatusCode;
use serde_json::json;

/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Authorization header is required")]
    AuthMissing,
    #[error("Authorization scheme must be Bearer")]
    AuthScheme,
    #[error("Invalid API key")]
    AuthInvalidKey,
    #[error("{message}")]
    InvalidRequest {
        code: &'static str,
        message: String,
    },
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Shorthand for a 400-class request validation failure.
    #[must_use]
    pub fn invalid(code: &'static str, message: impl Into<String>) -> Self {
        BridgeError::InvalidRequest {
            code,
            message: message.into(),
        }
    }

    /// Stable machine-readable error code carried in the response body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::AuthMissing => "no_auth",
            BridgeError::AuthScheme => "invalid_scheme",
            BridgeError::AuthInvalidKey => "invalid_api_key",
            BridgeError::InvalidRequest { code, .. } => code,
            BridgeError::Config(_)
            | BridgeError::Upstream { .. }
            | BridgeError::Transport(_)
            | BridgeError::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::AuthMissing | BridgeError::AuthScheme => StatusCode::UNAUTHORIZED,
            BridgeError::AuthInvalidKey => StatusCode::FORBIDDEN,
            BridgeError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            BridgeError::Config(_)
            | BridgeError::Upstream { .. }
            | BridgeError::Transport(_)
            | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = axum::Json(json!({
            "message": self.to_string(),
            "code": self.code(),
        }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(WWW_AUTHENTICATE, "Bearer realm='openai'")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_maps_to_400_with_code() {
        let err = BridgeError::invalid("invalid_temperature", "temperature out of range");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "invalid_temperature");
    }

    #[test]
    fn test_auth_errors_split_401_403() {
        assert_eq!(BridgeError::AuthMissing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(BridgeError::AuthScheme.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            BridgeError::AuthInvalidKey.status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_backend_errors_are_internal() {
        let err = BridgeError::Upstream {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "internal_error");
    }
}
