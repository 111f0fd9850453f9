//! The one place a record moves from `Awaiting Reply` to `Got a Reply`.
//! Both the poller and the webhook land here, so only the caller whose
//! conditional update actually took effect fans out an event.

use tracing::{debug, info, warn};
use uuid::Uuid;

use outreach_db::models::{ApplicationRow, ReplyCandidate};

use crate::credentials::get_valid_access_token;
use crate::error::ApiError;
use crate::state::{AppState, run_db};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// This call closed the record and notified its owner.
    Closed { application_id: String },
    /// The record exists but was not awaiting a reply (already closed or never sent).
    Unchanged,
    /// No record carries this thread id.
    Uncorrelated,
}

/// Apply the reply transition for `thread_id` and notify the owner if this
/// call performed it.
pub async fn record_reply(state: &AppState, thread_id: &str) -> anyhow::Result<ReplyOutcome> {
    let tid = thread_id.to_string();
    let closed = run_db(state, move |db| db.mark_replied(&tid)).await?;

    if let Some(row) = closed {
        info!(
            "Application {} got a reply on thread {}",
            row.id, thread_id
        );
        notify_owner(state, &row, thread_id).await;
        return Ok(ReplyOutcome::Closed { application_id: row.id });
    }

    let tid = thread_id.to_string();
    let existing = run_db(state, move |db| db.find_by_thread_id(&tid)).await?;
    Ok(match existing {
        Some(row) => {
            debug!("Thread {} already settled as '{}'", thread_id, row.status);
            ReplyOutcome::Unchanged
        }
        None => ReplyOutcome::Uncorrelated,
    })
}

async fn notify_owner(state: &AppState, row: &ApplicationRow, thread_id: &str) {
    let (Ok(user_id), Ok(application_id)) = (row.user_id.parse::<Uuid>(), row.id.parse::<Uuid>()) else {
        warn!("Corrupt ids on application '{}', skipping notification", row.id);
        return;
    };
    state
        .dispatcher
        .notify_reply(user_id, application_id, thread_id, &row.counterparty_name)
        .await;
}

/// Fetch the candidate's thread from the provider and close the record if
/// someone other than the sender has written in it.
///
/// Any message whose `From` does not contain the sender's address counts,
/// including bounces and CC'd third parties.
pub async fn check_candidate(state: &AppState, candidate: &ReplyCandidate) -> Result<ReplyOutcome, ApiError> {
    let access = get_valid_access_token(state, &candidate.user_id).await?;
    let thread = state
        .transport
        .gmail()
        .get_thread(&access.access_token, &candidate.thread_id)
        .await?;

    let own_email = if access.mailbox_email.is_empty() {
        candidate.user_email.as_str()
    } else {
        access.mailbox_email.as_str()
    };

    let Some(reply) = thread.find_reply(own_email) else {
        debug!(
            "No reply yet on thread {} ({} message(s))",
            candidate.thread_id,
            thread.messages.len()
        );
        return Ok(ReplyOutcome::Unchanged);
    };

    debug!(
        "Thread {} has a message from {:?}",
        candidate.thread_id,
        reply.from_header()
    );
    Ok(record_reply(state, &candidate.thread_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestEnv;
    use outreach_db::models::NewApplication;
    use outreach_types::events::GatewayEvent;
    use outreach_types::models::{ApplicationStatus, Source};

    fn insert_sent(env: &TestEnv, user: Uuid, thread_id: &str) -> String {
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
                company: Some("Acme"),
                source: Source::ActiveListing,
                thread_id: Some(thread_id),
                message_id: Some("msg-1"),
                status: ApplicationStatus::AwaitingReply,
            })
            .unwrap();
        id
    }

    #[tokio::test]
    async fn second_transition_is_a_no_op() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        let id = insert_sent(&env, user, "t-1");
        let (_, mut rx) = env.state.dispatcher.register_user_channel(user).await;

        let first = record_reply(&env.state, "t-1").await.unwrap();
        let second = record_reply(&env.state, "t-1").await.unwrap();

        assert_eq!(first, ReplyOutcome::Closed { application_id: id.clone() });
        assert_eq!(second, ReplyOutcome::Unchanged);

        match rx.try_recv().unwrap() {
            GatewayEvent::ReplyReceived { application_id, thread_id, counterparty_name } => {
                assert_eq!(application_id.to_string(), id);
                assert_eq!(thread_id, "t-1");
                assert_eq!(counterparty_name, "Acme HR");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_thread_is_uncorrelated() {
        let env = TestEnv::new().await;
        assert_eq!(
            record_reply(&env.state, "nope").await.unwrap(),
            ReplyOutcome::Uncorrelated
        );
    }

    #[tokio::test]
    async fn concurrent_closers_notify_once() {
        let env = TestEnv::new().await;
        let user = env.authorized_user();
        insert_sent(&env, user, "t-race");
        let (_, mut rx) = env.state.dispatcher.register_user_channel(user).await;

        let (a, b) = tokio::join!(
            record_reply(&env.state, "t-race"),
            record_reply(&env.state, "t-race")
        );
        let closed = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| matches!(o, ReplyOutcome::Closed { .. }))
            .count();

        assert_eq!(closed, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
