use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use outreach_gateway::connection;

use crate::middleware::{decode_claims, require_auth};
use crate::state::AppState;
use crate::{applications, gmail_auth, outreach, webhook};

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/gmail/callback", get(gmail_auth::callback))
        .route("/webhooks/gmail", post(webhook::gmail_push))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/outreach/send", post(outreach::send))
        .route("/applications", get(applications::list))
        .route("/applications/manual", post(applications::log_manual))
        .route("/gmail/authorize", get(gmail_auth::authorize))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(token) = query.token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let claims = match decode_claims(&state.jwt_secret, &token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Rejected gateway upgrade: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection_authenticated(socket, dispatcher, claims.sub, claims.email)
    })
}
