//! Gmail REST calls: send a raw message, fetch a thread, read the profile.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{MailError, Result};
use crate::thread::Thread;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Identifiers the provider assigns to an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: String,
    #[serde(default)]
    pub history_id: Option<String>,
}

#[derive(Clone)]
pub struct GmailClient {
    http: Client,
    api_base: String,
}

impl GmailClient {
    pub fn new(http: Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Submit a composed RFC 5322 message. Not retried here: a duplicate
    /// submit is a duplicate email.
    pub async fn send_raw(&self, access_token: &str, message: &[u8]) -> Result<SentMessage> {
        let raw = URL_SAFE_NO_PAD.encode(message);
        let resp = self
            .http
            .post(format!("{}/users/me/messages/send", self.api_base))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await?;
        parse_json(resp).await
    }

    /// The full conversation, limited to the headers reply detection reads.
    pub async fn get_thread(&self, access_token: &str, thread_id: &str) -> Result<Thread> {
        let resp = self
            .http
            .get(format!("{}/users/me/threads/{}", self.api_base, thread_id))
            .bearer_auth(access_token)
            .query(&[("format", "metadata"), ("metadataHeaders", "From")])
            .send()
            .await?;
        parse_json(resp).await
    }

    /// The authorized mailbox address.
    pub async fn get_profile(&self, access_token: &str) -> Result<Profile> {
        let resp = self
            .http
            .get(format!("{}/users/me/profile", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;
        parse_json(resp).await
    }
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(MailError::from_status(status, &body));
    }
    serde_json::from_str(&body).map_err(|e| MailError::InvalidResponse(e.to_string()))
}
