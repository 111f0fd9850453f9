mod config;

use std::sync::Arc;

use tracing::info;

use outreach_api::poller::ReplyPoller;
use outreach_api::routes::build_router;
use outreach_api::state::{AppState, AppStateInner};
use outreach_gateway::dispatcher::Dispatcher;
use outreach_mail::transport::MailTransport;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outreach=debug,outreach_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.mail.oauth.client_id.is_empty() {
        tracing::warn!("GOOGLE_CLIENT_ID is empty; mailbox authorization and sends will fail");
    }

    // Init database
    let db = outreach_db::Database::open(&config.db_path)?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: Dispatcher::new(),
        transport: MailTransport::new(&config.mail)?,
        webhook_token: config.webhook_token.clone(),
        auth_redirect: config.auth_redirect.clone(),
        poller: config.poller.clone(),
    });

    let poller = ReplyPoller::start(state.clone(), config.poller.clone());
    let app = build_router(state);

    info!("Outreach server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.stop().await;
    info!("Outreach server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
