//! Error types for provider operations.

use reqwest::StatusCode;

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, MailError>;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// No refresh token on file, or the provider rejected the credentials.
    /// The user has to authorize the mailbox again; never retried.
    #[error("mailbox authorization required: {0}")]
    Unauthorized(String),

    /// The provider rejected a well-formed request (rate limit, 5xx, missing
    /// thread). The caller decides whether to retry.
    #[error("provider rejected request ({status}): {message}")]
    Transport { status: u16, message: String },

    /// The request never completed: connect failure, timeout, broken body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl MailError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Classify a non-success provider response. Google answers 403 both for
    /// revoked or missing grants and for quota exhaustion; only the former
    /// needs the user to authorize again.
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let message = provider_message(body);
        let unauthorized = match status {
            StatusCode::UNAUTHORIZED => true,
            StatusCode::FORBIDDEN => !is_quota_rejection(body),
            _ => false,
        };
        if unauthorized {
            Self::Unauthorized(message)
        } else {
            Self::Transport {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// `error.errors[].reason` values and `error.status` codes Google uses for
/// rate and quota limits.
const QUOTA_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
    "quotaExceeded",
    "limitExceeded",
    "RESOURCE_EXHAUSTED",
];

fn is_quota_rejection(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    let error = &value["error"];

    let reasons = error["errors"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|e| e["reason"].as_str());
    let status = error["status"].as_str();

    reasons.chain(status).any(|r| QUOTA_REASONS.contains(&r))
}

/// Pull a human-readable message out of a Google error body, which is
/// either `{"error": {"message": ..}}` (APIs) or
/// `{"error": "..", "error_description": ..}` (OAuth).
pub(crate) fn provider_message(body: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.chars().take(200).collect(),
    };

    if let Some(msg) = value["error"]["message"].as_str() {
        return msg.to_string();
    }
    match (value["error"].as_str(), value["error_description"].as_str()) {
        (Some(code), Some(desc)) => format!("{}: {}", code, desc),
        (Some(code), None) => code.to_string(),
        _ => body.chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rejections_are_unauthorized() {
        let body = r#"{"error": {"code": 401, "message": "Invalid Credentials"}}"#;
        let err = MailError::from_status(StatusCode::UNAUTHORIZED, body);
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "mailbox authorization required: Invalid Credentials");
    }

    #[test]
    fn rate_limits_are_transport_errors() {
        let err = MailError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        match err {
            MailError::Transport { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn forbidden_quota_errors_are_transport_errors() {
        let body = r#"{"error": {"code": 403, "message": "User-rate limit exceeded.",
            "errors": [{"domain": "usageLimits", "reason": "userRateLimitExceeded"}]}}"#;
        match MailError::from_status(StatusCode::FORBIDDEN, body) {
            MailError::Transport { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "User-rate limit exceeded.");
            }
            other => panic!("unexpected {:?}", other),
        }

        let body = r#"{"error": {"code": 403, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert!(!MailError::from_status(StatusCode::FORBIDDEN, body).is_unauthorized());
    }

    #[test]
    fn forbidden_permission_errors_need_reauth() {
        let body = r#"{"error": {"code": 403, "message": "Request had insufficient authentication scopes.",
            "errors": [{"reason": "insufficientPermissions"}], "status": "PERMISSION_DENIED"}}"#;
        assert!(MailError::from_status(StatusCode::FORBIDDEN, body).is_unauthorized());
        assert!(MailError::from_status(StatusCode::FORBIDDEN, "Forbidden").is_unauthorized());
    }

    #[test]
    fn oauth_error_bodies_are_readable() {
        let body = r#"{"error": "invalid_grant", "error_description": "Token has been revoked."}"#;
        assert_eq!(provider_message(body), "invalid_grant: Token has been revoked.");
    }
}
