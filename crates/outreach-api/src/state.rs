use std::sync::Arc;

use anyhow::anyhow;

use outreach_db::Database;
use outreach_gateway::dispatcher::Dispatcher;
use outreach_mail::transport::MailTransport;

use crate::poller::PollerConfig;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub transport: MailTransport,
    /// Shared secret expected as `?token=` on the push endpoint, if set.
    pub webhook_token: Option<String>,
    /// Where the browser lands after mailbox authorization.
    pub auth_redirect: String,
    /// Cadence and limits for reply checks, shared by the poller and the
    /// webhook's mailbox-wide re-check.
    pub poller: PollerConfig,
}

/// Run a blocking DB call off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
}
