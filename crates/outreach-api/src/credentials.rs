//! Per-user credential store: turns the stored refresh token into a usable
//! access token on every call.

use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

/// What a provider call on behalf of a user needs.
#[derive(Debug, Clone)]
pub struct MailboxAccess {
    pub access_token: String,
    /// The authorized mailbox address, used as `From` and for reply detection.
    pub mailbox_email: String,
}

/// Exchange the user's refresh token for a fresh access token.
///
/// Access tokens are never cached: every send or poll refreshes. Fails with
/// [`ApiError::Unauthorized`] when no refresh token is on file or the
/// provider rejects it; the stored token is left in place either way.
pub async fn get_valid_access_token(state: &AppState, user_id: &str) -> Result<MailboxAccess, ApiError> {
    let uid = user_id.to_string();
    let user = run_db(state, move |db| db.get_user_by_id(&uid)).await?;

    let Some(user) = user else {
        return Err(ApiError::Unauthorized("mailbox has never been authorized".into()));
    };
    let Some(refresh_token) = user.refresh_token() else {
        return Err(ApiError::Unauthorized("no refresh token on file; authorize the mailbox".into()));
    };

    let token = state.transport.oauth().refresh(refresh_token).await?;
    debug!("Refreshed access token for {}", user.id);

    // Only the refresh token matters long-term; a failed write is not fatal.
    let uid = user.id.clone();
    let access = token.access_token.clone();
    let rotated = token.refresh_token.clone();
    if let Err(e) = run_db(state, move |db| db.update_access_token(&uid, &access, rotated.as_deref())).await {
        warn!("Failed to persist refreshed token for {}: {:#}", user.id, e);
    }

    Ok(MailboxAccess {
        access_token: token.access_token,
        mailbox_email: user.email,
    })
}
