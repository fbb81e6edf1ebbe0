use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};

use crate::api::auth::AuthError;
use crate::api::response;
use crate::store::StoreError;

/// Errors that abort a whole request. Per-target failures never end up here;
/// they are recorded as outcomes inside the run summary instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error(transparent)]
    AuthError(#[from] AuthError),

    #[error("Failed to select enrichment targets: {0}")]
    SelectionError(#[from] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(AuthError::Unauthenticated(_)) => StatusCode::UNAUTHORIZED,
            AppError::AuthError(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            AppError::AuthError(AuthError::IdentityService(_)) => StatusCode::BAD_GATEWAY,
            AppError::AuthError(AuthError::RoleLookup(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SelectionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match status {
            s if s.is_server_error() => tracing::error!(error = %self, "Request failed"),
            _ => tracing::warn!(error = %self, "Request rejected"),
        }

        response::error(status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::ConfigError("LLM_API_KEY is not set".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::ValidationError("bad id".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(AuthError::Unauthenticated("missing token".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(AuthError::Forbidden).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(StoreError::Other("connection refused".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
