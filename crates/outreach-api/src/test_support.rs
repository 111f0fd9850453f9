use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{EncodingKey, Header, encode};
use outreach_db::Database;
use outreach_gateway::dispatcher::Dispatcher;
use outreach_mail::testing::{FakeProvider, MAILBOX};
use outreach_mail::transport::MailTransport;
use outreach_types::api::Claims;
use uuid::Uuid;

use crate::poller::PollerConfig;
use crate::state::{AppState, AppStateInner};

pub const USER_EMAIL: &str = MAILBOX;
pub const REFRESH_TOKEN: &str = "stored-refresh-token";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_TOKEN: &str = "push-token";
pub const AUTH_REDIRECT: &str = "http://localhost:5173/profile";

pub struct TestEnv {
    pub state: AppState,
    pub provider: FakeProvider,
}

impl TestEnv {
    pub async fn new() -> Self {
        let provider = FakeProvider::start().await;
        let transport = MailTransport::new(&provider.mail_config()).unwrap();
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: JWT_SECRET.into(),
            dispatcher: Dispatcher::new(),
            transport,
            webhook_token: Some(WEBHOOK_TOKEN.into()),
            auth_redirect: AUTH_REDIRECT.into(),
            poller: PollerConfig {
                interval: Duration::from_millis(50),
                concurrency: 2,
                record_timeout: Duration::from_secs(1),
            },
        });
        Self { state, provider }
    }

    /// A user whose mailbox is connected with a refresh token the provider honours.
    pub fn authorized_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .db
            .store_credentials(&id.to_string(), USER_EMAIL, "stale-access", Some(REFRESH_TOKEN))
            .unwrap();
        self.provider.grant_refresh_token(REFRESH_TOKEN);
        id
    }

    /// A user known to the ledger who never connected a mailbox.
    pub fn unauthorized_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state.db.ensure_user(&id.to_string(), USER_EMAIL).unwrap();
        id
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        let claims = Claims {
            sub: user_id,
            email: USER_EMAIL.into(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
    }
}
