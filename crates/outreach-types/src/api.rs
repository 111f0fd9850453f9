use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Source;

// -- JWT Claims --

/// Session claims issued by the identity service. Shared by the REST
/// middleware and the WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Outreach --

/// Who the outreach is addressed to, copied into the ledger at send time.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactDescriptor {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendOutreachRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub contact: Option<ContactDescriptor>,
    #[serde(default)]
    pub source: Option<Source>,
    /// A `Not Applied` placeholder to promote instead of creating a record.
    #[serde(default)]
    pub application_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendOutreachResponse {
    pub application_id: Uuid,
    pub message_id: String,
    pub thread_id: String,
    pub has_attachment: bool,
}

// -- Applications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManualApplicationRequest {
    pub counterparty_name: String,
    pub counterparty_email: String,
    pub role: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub source: Option<Source>,
}

// -- Mailbox authorization --

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

// -- Errors --

/// JSON body returned alongside non-2xx statuses. `needs_auth` tells the
/// client to send the user through mailbox authorization again.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub needs_auth: bool,
}
