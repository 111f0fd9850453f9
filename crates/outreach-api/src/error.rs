use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use outreach_mail::MailError;
use outreach_types::api::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The mailbox has to be authorized (again) before this can work.
    #[error("mailbox authorization required: {0}")]
    Unauthorized(String),

    /// The provider refused or could not be reached. Nothing was recorded.
    #[error("mail provider error: {0}")]
    Transport(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Unauthorized(msg) => Self::Unauthorized(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, needs_auth) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, false),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, false),
            Self::Conflict(_) => (StatusCode::CONFLICT, false),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, true),
            Self::Transport(_) => (StatusCode::BAD_GATEWAY, false),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, false),
        };

        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message, needs_auth })).into_response()
    }
}
