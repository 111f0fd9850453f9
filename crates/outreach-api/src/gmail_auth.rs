//! Mailbox authorization: consent URL issuance and the OAuth callback that
//! stores the resulting credentials. Sign-in itself happens elsewhere.

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use outreach_types::api::{AuthorizeCallbackQuery, AuthorizeResponse, Claims};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

const STATE_TTL_MINUTES: i64 = 10;

/// Signed `state` parameter carried through the consent screen.
#[derive(Debug, Serialize, Deserialize)]
struct ConsentState {
    sub: Uuid,
    email: String,
    exp: usize,
}

// Separate key so a consent state can never pass as a session token.
fn state_key(secret: &str) -> Vec<u8> {
    format!("{}:gmail-consent", secret).into_bytes()
}

fn create_state_token(secret: &str, claims: &Claims) -> anyhow::Result<String> {
    let state = ConsentState {
        sub: claims.sub,
        email: claims.email.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::minutes(STATE_TTL_MINUTES)).timestamp() as usize,
    };

    let token = encode(&Header::default(), &state, &EncodingKey::from_secret(&state_key(secret)))?;

    Ok(token)
}

fn verify_state_token(secret: &str, token: &str) -> Result<ConsentState, jsonwebtoken::errors::Error> {
    decode::<ConsentState>(
        token,
        &DecodingKey::from_secret(&state_key(secret)),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

pub async fn authorize(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let token = create_state_token(&state.jwt_secret, &claims)?;
    let url = state.transport.oauth().authorization_url(&token)?;
    Ok(Json(AuthorizeResponse { url }))
}

/// Provider redirect target. Always ends in a browser redirect back to the
/// app, tagged with the outcome.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeCallbackQuery>,
) -> Redirect {
    match complete_authorization(&state, query).await {
        Ok(email) => {
            info!("Mailbox {} authorized", email);
            Redirect::to(&with_outcome(&state.auth_redirect, "connected"))
        }
        Err(e) => {
            warn!("Mailbox authorization failed: {}", e);
            Redirect::to(&with_outcome(&state.auth_redirect, "error"))
        }
    }
}

fn with_outcome(base: &str, outcome: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}gmail={}", base, sep, outcome)
}

async fn complete_authorization(state: &AppState, query: AuthorizeCallbackQuery) -> Result<String, ApiError> {
    if let Some(error) = query.error {
        return Err(ApiError::BadRequest(format!("consent denied: {}", error)));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing code".into()))?;
    let consent = query
        .state
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing state".into()))
        .and_then(|s| {
            verify_state_token(&state.jwt_secret, s).map_err(|_| ApiError::BadRequest("invalid state".into()))
        })?;

    let token = state.transport.oauth().exchange_code(&code).await?;
    let profile = state.transport.gmail().get_profile(&token.access_token).await?;
    if profile.email_address != consent.email {
        info!(
            "User {} connected mailbox {} (signed in as {})",
            consent.sub, profile.email_address, consent.email
        );
    }

    let uid = consent.sub.to_string();
    let mailbox = profile.email_address.clone();
    run_db(state, move |db| {
        db.store_credentials(&uid, &mailbox, &token.access_token, token.refresh_token.as_deref())
    })
    .await?;

    Ok(profile.email_address)
}
