use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use outreach_mail::notification::{PushSignal, decode_push};

use crate::poller::check_all;
use crate::replies::{ReplyOutcome, check_candidate};
use crate::state::{AppState, run_db};

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Mailbox push receiver. Every correlation outcome is acknowledged with
/// `204` so the provider never redelivers; only a bad push token is refused.
pub async fn gmail_push(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = state.webhook_token.as_deref() {
        if query.token.as_deref() != Some(expected) {
            warn!("Rejected push notification with a missing or wrong token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let (signal, message_id) = match decode_push(&body) {
        Ok(decoded) => decoded,
        Err(miss) => {
            info!("Dropping push notification: {}", miss);
            return StatusCode::NO_CONTENT;
        }
    };
    debug!("Push {:?}: {:?}", message_id, signal);

    match signal {
        PushSignal::Thread { thread_id } => check_thread(&state, &thread_id).await,
        PushSignal::Mailbox { email_address, history_id } => {
            debug!("Mailbox {} changed (history {})", email_address, history_id);
            // Ack first; the provider re-check can take a while.
            tokio::spawn(recheck_mailbox(state, email_address));
        }
    }

    StatusCode::NO_CONTENT
}

/// A push only says the thread changed, possibly by the sender's own
/// follow-up. The reply itself is confirmed against the provider.
async fn check_thread(state: &AppState, thread_id: &str) {
    let tid = thread_id.to_string();
    let candidate = match run_db(state, move |db| db.reply_candidate_for_thread(&tid)).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            info!("Dropping push notification: nothing awaiting a reply on thread {}", thread_id);
            return;
        }
        Err(e) => {
            error!("Failed to look up thread {}: {:#}", thread_id, e);
            return;
        }
    };

    match tokio::time::timeout(state.poller.record_timeout, check_candidate(state, &candidate)).await {
        Ok(Ok(ReplyOutcome::Closed { application_id })) => {
            debug!("Push closed application {}", application_id);
        }
        Ok(Ok(_)) => debug!("Push for thread {}: no reply from the counterparty yet", thread_id),
        Ok(Err(e)) => warn!("Reply check failed for pushed thread {}: {}", thread_id, e),
        Err(_) => warn!("Reply check timed out for pushed thread {}", thread_id),
    }
}

/// Re-check every awaiting record of the mailbox owner, exactly as a poll
/// cycle would.
pub async fn recheck_mailbox(state: AppState, email_address: String) {
    let email = email_address.clone();
    let candidates = run_db(&state, move |db| {
        let Some(user) = db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        db.reply_candidates_for_user(&user.id).map(Some)
    })
    .await;

    let candidates = match candidates {
        Ok(Some(c)) => c,
        Ok(None) => {
            info!("Dropping push notification: no user for mailbox {}", email_address);
            return;
        }
        Err(e) => {
            error!("Failed to load candidates for mailbox {}: {:#}", email_address, e);
            return;
        }
    };

    let report = check_all(&state, candidates, &state.poller).await;
    debug!("Mailbox re-check for {}: {:?}", email_address, report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use tower::ServiceExt;
    use uuid::Uuid;

    use outreach_db::models::NewApplication;
    use outreach_types::events::GatewayEvent;
    use outreach_types::models::{ApplicationStatus, Source};

    use crate::routes::build_router;
    use crate::test_support::{TestEnv, USER_EMAIL, WEBHOOK_TOKEN};

    fn push_body(data: serde_json::Value) -> String {
        let encoded = STANDARD.encode(serde_json::to_vec(&data).unwrap());
        serde_json::json!({ "message": { "data": encoded, "messageId": "1" } }).to_string()
    }

    async fn post(env: &TestEnv, token: Option<&str>, body: String) -> StatusCode {
        let uri = match token {
            Some(t) => format!("/webhooks/gmail?token={}", t),
            None => "/webhooks/gmail".to_string(),
        };
        let response = build_router(env.state.clone())
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        response.status()
    }

    fn awaiting(env: &TestEnv, user: Uuid, thread_id: &str) -> String {
        insert(env, user, thread_id, ApplicationStatus::AwaitingReply)
    }

    fn insert(env: &TestEnv, user: Uuid, thread_id: &str, status: ApplicationStatus) -> String {
        let id = Uuid::new_v4().to_string();
        let uid = user.to_string();
        env.state
            .db
            .insert_application(&NewApplication {
                id: &id,
                user_id: &uid,
                counterparty_name: "Acme HR",
                counterparty_email: "hr@acme.com",
                role: "Engineer",
                company: None,
                source: Source::ActiveListing,
                thread_id: Some(thread_id),
                message_id: Some("msg"),
                status,
            })
            .unwrap();
        id
    }

    #[tokio::test]
    async fn duplicate_delivery_notifies_once() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        let id = awaiting(&env, user, "t-push");
        env.provider.add_reply("t-push", "Acme HR <hr@acme.com>");
        let (_, mut rx) = env.state.dispatcher.register_user_channel(user).await;

        let body = push_body(serde_json::json!({ "threadId": "t-push" }));
        assert_eq!(post(&env, Some(WEBHOOK_TOKEN), body.clone()).await, StatusCode::NO_CONTENT);
        assert_eq!(post(&env, Some(WEBHOOK_TOKEN), body).await, StatusCode::NO_CONTENT);

        let row = env.state.db.get_application(&id).unwrap().unwrap();
        assert_eq!(row.status().unwrap(), ApplicationStatus::GotReply);
        assert!(matches!(rx.try_recv(), Ok(GatewayEvent::ReplyReceived { .. })));
        assert!(rx.try_recv().is_err());
    }

    fn status_of(env: &TestEnv, id: &str) -> ApplicationStatus {
        env.state.db.get_application(id).unwrap().unwrap().status().unwrap()
    }

    #[tokio::test]
    async fn push_on_own_follow_up_keeps_awaiting() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        let id = awaiting(&env, user, "t-own");
        env.provider.add_reply("t-own", &format!("Me <{}>", USER_EMAIL));
        env.provider.add_reply("t-own", &format!("Me <{}>", USER_EMAIL));
        let (_, mut rx) = env.state.dispatcher.register_user_channel(user).await;

        let body = push_body(serde_json::json!({ "threadId": "t-own" }));
        assert_eq!(post(&env, Some(WEBHOOK_TOKEN), body).await, StatusCode::NO_CONTENT);

        assert_eq!(status_of(&env, &id), ApplicationStatus::AwaitingReply);
        assert_eq!(env.provider.thread_requests(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn push_never_closes_not_applied_records() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        let id = insert(&env, user, "t-draft", ApplicationStatus::NotApplied);
        env.provider.add_reply("t-draft", "Acme HR <hr@acme.com>");

        let body = push_body(serde_json::json!({ "threadId": "t-draft" }));
        assert_eq!(post(&env, Some(WEBHOOK_TOKEN), body).await, StatusCode::NO_CONTENT);
        recheck_mailbox(env.state.clone(), USER_EMAIL.to_string()).await;

        assert_eq!(status_of(&env, &id), ApplicationStatus::NotApplied);
        assert_eq!(env.provider.thread_requests(), 0);
    }

    #[tokio::test]
    async fn uncorrelated_and_malformed_are_acknowledged() {
        let env = TestEnv::new().await;
        let unknown = push_body(serde_json::json!({ "threadId": "never-sent" }));
        assert_eq!(post(&env, Some(WEBHOOK_TOKEN), unknown).await, StatusCode::NO_CONTENT);
        assert_eq!(
            post(&env, Some(WEBHOOK_TOKEN), "{\"hello\":".into()).await,
            StatusCode::NO_CONTENT
        );
        let other = push_body(serde_json::json!({ "resourceState": "exists" }));
        assert_eq!(post(&env, Some(WEBHOOK_TOKEN), other).await, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn wrong_token_is_refused() {
        let env = TestEnv::new().await;
        let body = push_body(serde_json::json!({ "threadId": "t" }));
        assert_eq!(post(&env, None, body.clone()).await, StatusCode::UNAUTHORIZED);
        assert_eq!(post(&env, Some("nope"), body).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mailbox_notification_rechecks_owner_records() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        let replied = awaiting(&env, user, "t-a");
        let quiet = awaiting(&env, user, "t-b");
        env.provider.add_reply("t-a", "hr@acme.com");
        env.provider.add_reply("t-b", &format!("Me <{}>", USER_EMAIL));
        let (_, mut rx) = env.state.dispatcher.register_user_channel(user).await;

        let body = push_body(serde_json::json!({ "emailAddress": USER_EMAIL, "historyId": 9876 }));
        assert_eq!(post(&env, Some(WEBHOOK_TOKEN), body).await, StatusCode::NO_CONTENT);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(event, Some(GatewayEvent::ReplyReceived { ref thread_id, .. }) if thread_id == "t-a"));

        assert_eq!(status_of(&env, &replied), ApplicationStatus::GotReply);
        assert_eq!(status_of(&env, &quiet), ApplicationStatus::AwaitingReply);
    }
}
