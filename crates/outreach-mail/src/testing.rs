//! In-process stand-in for the OAuth token endpoint, the Gmail API and the
//! résumé storage bucket. Bound to `127.0.0.1:0` so each test gets its own.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde_json::json;

use crate::MailConfig;
use crate::oauth::OAuthConfig;

/// Address of the mailbox every issued token belongs to.
pub const MAILBOX: &str = "me@example.com";

/// The only authorization code the fake token endpoint accepts.
pub const VALID_CODE: &str = "valid-code";

#[derive(Default)]
struct FakeState {
    refresh_tokens: HashSet<String>,
    access_tokens: HashSet<String>,
    /// thread id -> `From` header of each message, oldest first
    threads: HashMap<String, Vec<String>>,
    sent: Vec<Vec<u8>>,
    files: HashMap<String, Vec<u8>>,
    send_failure: Option<u16>,
    thread_delay: Option<Duration>,
    counter: u64,
    token_requests: u64,
    thread_requests: u64,
    threads_in_flight: u64,
    max_threads_in_flight: u64,
}

#[derive(Clone)]
pub struct FakeProvider {
    base_url: String,
    state: Arc<Mutex<FakeState>>,
}

type Shared = Arc<Mutex<FakeState>>;

fn lock(state: &Shared) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl FakeProvider {
    pub async fn start() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/token", post(token))
            .route("/gmail/v1/users/me/messages/send", post(send))
            .route("/gmail/v1/users/me/threads/{id}", get(thread))
            .route("/gmail/v1/users/me/profile", get(profile))
            .route("/files/{name}", get(file))
            .route("/slow/{name}", get(slow_file))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake provider");
        let addr = listener.local_addr().expect("fake provider addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// Config pointing every endpoint at this provider, with short timeouts.
    pub fn mail_config(&self) -> MailConfig {
        MailConfig {
            oauth: OAuthConfig {
                client_id: "test-client".into(),
                client_secret: "test-secret".into(),
                redirect_uri: "http://localhost/gmail/callback".into(),
                auth_url: format!("{}/auth", self.base_url),
                token_url: format!("{}/token", self.base_url),
            },
            api_base: format!("{}/gmail/v1", self.base_url),
            provider_timeout: Duration::from_secs(2),
            attachment_timeout: Duration::from_millis(500),
            attachment_max_bytes: 1024 * 1024,
        }
    }

    pub fn grant_refresh_token(&self, token: &str) {
        lock(&self.state).refresh_tokens.insert(token.to_string());
    }

    pub fn revoke_refresh_token(&self, token: &str) {
        lock(&self.state).refresh_tokens.remove(token);
    }

    /// Append a message from `from` to an existing (or new) thread.
    pub fn add_reply(&self, thread_id: &str, from: &str) {
        lock(&self.state)
            .threads
            .entry(thread_id.to_string())
            .or_default()
            .push(from.to_string());
    }

    /// Make thread fetches for every thread hang for `delay`.
    pub fn delay_threads(&self, delay: Duration) {
        lock(&self.state).thread_delay = Some(delay);
    }

    pub fn remove_thread(&self, thread_id: &str) {
        lock(&self.state).threads.remove(thread_id);
    }

    pub fn fail_sends_with(&self, status: u16) {
        lock(&self.state).send_failure = Some(status);
    }

    pub fn add_file(&self, name: &str, content: Vec<u8>) {
        lock(&self.state).files.insert(name.to_string(), content);
    }

    pub fn file_url(&self, name: &str) -> String {
        format!("{}/files/{}", self.base_url, name)
    }

    pub fn slow_file_url(&self, name: &str) -> String {
        format!("{}/slow/{}", self.base_url, name)
    }

    /// Raw RFC 5322 bytes of every accepted send, in order.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent.clone()
    }

    pub fn token_requests(&self) -> u64 {
        lock(&self.state).token_requests
    }

    pub fn thread_requests(&self) -> u64 {
        lock(&self.state).thread_requests
    }

    /// Highest number of thread fetches that were being served at once.
    pub fn max_threads_in_flight(&self) -> u64 {
        lock(&self.state).max_threads_in_flight
    }
}

/// Counts a thread fetch as in flight until the handler returns or is dropped.
struct InFlight(Shared);

impl InFlight {
    fn enter(state: &Shared) -> Self {
        let mut s = lock(state);
        s.thread_requests += 1;
        s.threads_in_flight += 1;
        s.max_threads_in_flight = s.max_threads_in_flight.max(s.threads_in_flight);
        Self(state.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.0).threads_in_flight -= 1;
    }
}

#[derive(Deserialize)]
struct TokenForm {
    grant_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

async fn token(State(state): State<Shared>, Form(form): Form<TokenForm>) -> Response {
    let mut s = lock(&state);
    s.token_requests += 1;

    let granted_refresh = match form.grant_type.as_str() {
        "refresh_token" => {
            let valid = form.refresh_token.as_ref().is_some_and(|t| s.refresh_tokens.contains(t));
            if !valid {
                return invalid_grant();
            }
            None
        }
        "authorization_code" if form.code.as_deref() == Some(VALID_CODE) => {
            s.counter += 1;
            let refresh = format!("refresh-{}", s.counter);
            s.refresh_tokens.insert(refresh.clone());
            Some(refresh)
        }
        _ => return invalid_grant(),
    };

    s.counter += 1;
    let access = format!("access-{}", s.counter);
    s.access_tokens.insert(access.clone());

    let mut body = json!({
        "access_token": access,
        "expires_in": 3599,
        "token_type": "Bearer",
        "scope": "https://www.googleapis.com/auth/gmail.send",
    });
    if let Some(refresh) = granted_refresh {
        body["refresh_token"] = json!(refresh);
    }
    Json(body).into_response()
}

fn invalid_grant() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid_grant", "error_description": "Token has been expired or revoked." })),
    )
        .into_response()
}

fn authorized(state: &Shared, headers: &HeaderMap) -> bool {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    token.is_some_and(|t| lock(state).access_tokens.contains(t))
}

fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "code": 401, "message": "Invalid Credentials" } })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct SendBody {
    raw: String,
}

async fn send(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<SendBody>) -> Response {
    if !authorized(&state, &headers) {
        return unauthenticated();
    }
    let mut s = lock(&state);
    if let Some(status) = s.send_failure {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({ "error": { "code": status.as_u16(), "message": "Backend Error" } })))
            .into_response();
    }
    let Ok(raw) = URL_SAFE_NO_PAD.decode(body.raw.as_bytes()) else {
        return (StatusCode::BAD_REQUEST, "raw is not base64url").into_response();
    };

    s.counter += 1;
    let id = format!("msg-{}", s.counter);
    let thread_id = format!("thread-{}", s.counter);
    s.threads.insert(thread_id.clone(), vec![format!("Me <{}>", MAILBOX)]);
    s.sent.push(raw);

    Json(json!({ "id": id, "threadId": thread_id, "labelIds": ["SENT"] })).into_response()
}

async fn thread(State(state): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthenticated();
    }
    let _in_flight = InFlight::enter(&state);
    let delay = lock(&state).thread_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let s = lock(&state);
    let Some(froms) = s.threads.get(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": "Requested entity was not found." } })),
        )
            .into_response();
    };
    let messages: Vec<_> = froms
        .iter()
        .enumerate()
        .map(|(i, from)| {
            json!({
                "id": format!("{}-{}", id, i),
                "threadId": id,
                "labelIds": ["INBOX"],
                "payload": { "headers": [{ "name": "From", "value": from }] }
            })
        })
        .collect();
    Json(json!({ "id": id, "historyId": "1000", "messages": messages })).into_response()
}

async fn profile(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthenticated();
    }
    Json(json!({ "emailAddress": MAILBOX, "messagesTotal": 3, "historyId": "1000" })).into_response()
}

async fn file(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    match lock(&state).files.get(&name) {
        Some(content) => ([(header::CONTENT_TYPE, "application/pdf")], content.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn slow_file(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    file(State(state), Path(name)).await
}
