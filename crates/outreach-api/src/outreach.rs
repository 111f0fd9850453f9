use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};
use uuid::Uuid;

use outreach_db::models::NewApplication;
use outreach_mail::transport::OutgoingMessage;
use outreach_types::api::{Claims, SendOutreachRequest, SendOutreachResponse};
use outreach_types::models::{ApplicationStatus, Source};

use crate::credentials::get_valid_access_token;
use crate::error::ApiError;
use crate::state::{AppState, run_db};

pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendOutreachRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = send_outreach(&state, &claims, req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Send one outreach email and record it as `Awaiting Reply`.
///
/// Nothing is written to the ledger unless the provider accepted the message.
pub async fn send_outreach(
    state: &AppState,
    claims: &Claims,
    req: SendOutreachRequest,
) -> Result<SendOutreachResponse, ApiError> {
    let to = req.to.trim().to_string();
    if to.is_empty() || req.subject.trim().is_empty() || req.body.trim().is_empty() {
        return Err(ApiError::BadRequest("to, subject and body are required".into()));
    }

    let user_id = claims.sub.to_string();
    let (uid, email) = (user_id.clone(), claims.email.clone());
    run_db(state, move |db| db.ensure_user(&uid, &email)).await?;

    if let Some(placeholder) = req.application_id {
        let pid = placeholder.to_string();
        let row = run_db(state, move |db| db.get_application(&pid)).await?;
        let promotable = row.is_some_and(|r| {
            r.user_id == user_id && r.thread_id.is_none() && r.status == ApplicationStatus::NotApplied.as_str()
        });
        if !promotable {
            return Err(ApiError::Conflict(format!(
                "application {} is not an unsent placeholder of yours",
                placeholder
            )));
        }
    }

    let access = get_valid_access_token(state, &user_id).await?;
    let delivery = state
        .transport
        .send(
            &access.access_token,
            &OutgoingMessage {
                from: &access.mailbox_email,
                to: &to,
                subject: &req.subject,
                body: &req.body,
                attachment_url: req.attachment_url.as_deref(),
            },
        )
        .await?;

    let has_attachment = delivery.has_attachment();
    let sent = delivery.sent;

    let application_id = match req.application_id {
        Some(placeholder) => {
            let (pid, uid) = (placeholder.to_string(), user_id.clone());
            let (tid, mid) = (sent.thread_id.clone(), sent.id.clone());
            let promoted = run_db(state, move |db| db.promote_to_awaiting(&pid, &uid, &tid, &mid)).await;
            match promoted {
                Ok(Some(_)) => placeholder,
                Ok(None) => {
                    error!(
                        "Message {} (thread {}) sent but placeholder {} was claimed concurrently",
                        sent.id, sent.thread_id, placeholder
                    );
                    return Err(ApiError::Conflict(format!(
                        "message sent but application {} was already updated",
                        placeholder
                    )));
                }
                Err(e) => return Err(unrecorded(&sent.id, &sent.thread_id, e)),
            }
        }
        None => {
            let id = Uuid::new_v4();
            let contact = req.contact;
            let name = contact
                .as_ref()
                .map(|c| c.name.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| to.clone());
            let role = contact.as_ref().and_then(|c| c.role.clone()).unwrap_or_default();
            let company = contact.and_then(|c| c.company).filter(|c| !c.trim().is_empty());
            let source = req.source.unwrap_or(Source::ActiveListing);

            let (aid, uid) = (id.to_string(), user_id.clone());
            let (tid, mid, to) = (sent.thread_id.clone(), sent.id.clone(), to.clone());
            let inserted = run_db(state, move |db| {
                db.insert_application(&NewApplication {
                    id: &aid,
                    user_id: &uid,
                    counterparty_name: &name,
                    counterparty_email: &to,
                    role: &role,
                    company: company.as_deref(),
                    source,
                    thread_id: Some(&tid),
                    message_id: Some(&mid),
                    status: ApplicationStatus::AwaitingReply,
                })
            })
            .await;
            if let Err(e) = inserted {
                return Err(unrecorded(&sent.id, &sent.thread_id, e));
            }
            id
        }
    };

    info!(
        "Outreach {} to {} recorded as awaiting reply (thread {})",
        application_id, to, sent.thread_id
    );

    Ok(SendOutreachResponse {
        application_id,
        message_id: sent.id,
        thread_id: sent.thread_id,
        has_attachment,
    })
}

fn unrecorded(message_id: &str, thread_id: &str, e: anyhow::Error) -> ApiError {
    error!(
        "Message {} (thread {}) was sent but could not be recorded: {:#}",
        message_id, thread_id, e
    );
    ApiError::Internal(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestEnv, USER_EMAIL};
    use outreach_types::api::ContactDescriptor;

    fn claims(user: Uuid) -> Claims {
        Claims {
            sub: user,
            email: USER_EMAIL.into(),
            exp: usize::MAX,
        }
    }

    fn request(to: &str) -> SendOutreachRequest {
        SendOutreachRequest {
            to: to.into(),
            subject: "Hello".into(),
            body: "Hi there".into(),
            attachment_url: None,
            contact: None,
            source: None,
            application_id: None,
        }
    }

    #[tokio::test]
    async fn send_records_awaiting_reply() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();

        let resp = send_outreach(&env.state, &claims(user), request("hr@acme.com")).await.unwrap();

        assert!(!resp.thread_id.is_empty());
        assert!(!resp.has_attachment);
        let row = env.state.db.find_by_thread_id(&resp.thread_id).unwrap().unwrap();
        assert_eq!(row.id, resp.application_id.to_string());
        assert_eq!(row.status().unwrap(), ApplicationStatus::AwaitingReply);
        assert_eq!(row.counterparty_email, "hr@acme.com");
        assert_eq!(row.counterparty_name, "hr@acme.com");
        assert_eq!(row.source, "active-listing");
        assert_eq!(row.message_id.as_deref(), Some(resp.message_id.as_str()));

        let sent = env.provider.sent_messages();
        assert_eq!(sent.len(), 1);
        let raw = String::from_utf8_lossy(&sent[0]);
        assert!(raw.contains("To: hr@acme.com"));
        assert!(raw.contains("Subject: Hello"));
        assert!(raw.contains(&format!("From: {}", USER_EMAIL)));
    }

    #[tokio::test]
    async fn contact_and_attachment_are_carried() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        env.provider.add_file("cv", b"%PDF-1.4 resume".to_vec());

        let mut req = request("jane@acme.com");
        req.attachment_url = Some(env.provider.file_url("cv"));
        req.contact = Some(ContactDescriptor {
            name: "Jane Doe".into(),
            role: Some("Staff Engineer".into()),
            company: Some("Acme".into()),
        });
        req.source = Some(Source::BulkDatabase);

        let resp = send_outreach(&env.state, &claims(user), req).await.unwrap();
        assert!(resp.has_attachment);

        let row = env.state.db.get_application(&resp.application_id.to_string()).unwrap().unwrap();
        assert_eq!(row.counterparty_name, "Jane Doe");
        assert_eq!(row.role, "Staff Engineer");
        assert_eq!(row.company.as_deref(), Some("Acme"));
        assert_eq!(row.source, "bulk-database");

        let raw = String::from_utf8_lossy(&env.provider.sent_messages()[0]).into_owned();
        assert!(raw.contains("filename=\"cv.pdf\""));
    }

    #[tokio::test]
    async fn missing_attachment_still_sends() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        let mut req = request("hr@acme.com");
        req.attachment_url = Some(env.provider.file_url("missing"));

        let resp = send_outreach(&env.state, &claims(user), req).await.unwrap();
        assert!(!resp.has_attachment);
        assert_eq!(env.provider.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn no_refresh_token_creates_nothing() {
        let env = TestEnv::new().await;
        let user = env.unauthorized_user();

        let err = send_outreach(&env.state, &claims(user), request("hr@acme.com")).await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized(_)));
        assert!(env.state.db.list_applications_by_owner(&user.to_string()).unwrap().is_empty());
        assert!(env.provider.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn provider_rejection_creates_nothing() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        env.provider.fail_sends_with(429);

        let err = send_outreach(&env.state, &claims(user), request("hr@acme.com")).await.unwrap_err();

        assert!(matches!(err, ApiError::Transport(_)));
        assert!(env.state.db.list_applications_by_owner(&user.to_string()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        let mut req = request("hr@acme.com");
        req.subject = "  ".into();

        let err = send_outreach(&env.state, &claims(user), req).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(env.provider.token_requests(), 0);
    }

    #[tokio::test]
    async fn placeholder_is_promoted() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        let placeholder = Uuid::new_v4();
        let (pid, uid) = (placeholder.to_string(), user.to_string());
        env.state
            .db
            .insert_application(&NewApplication {
                id: &pid,
                user_id: &uid,
                counterparty_name: "Acme HR",
                counterparty_email: "hr@acme.com",
                role: "Engineer",
                company: None,
                source: Source::Manual,
                thread_id: None,
                message_id: None,
                status: ApplicationStatus::NotApplied,
            })
            .unwrap();

        let mut req = request("hr@acme.com");
        req.application_id = Some(placeholder);
        let resp = send_outreach(&env.state, &claims(user), req).await.unwrap();

        assert_eq!(resp.application_id, placeholder);
        let rows = env.state.db.list_applications_by_owner(&uid).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status().unwrap(), ApplicationStatus::AwaitingReply);
        assert_eq!(rows[0].thread_id.as_deref(), Some(resp.thread_id.as_str()));

        // Already sent: refused before anything goes out.
        let mut again = request("hr@acme.com");
        again.application_id = Some(placeholder);
        let err = send_outreach(&env.state, &claims(user), again).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(env.provider.sent_messages().len(), 1);
    }
}
