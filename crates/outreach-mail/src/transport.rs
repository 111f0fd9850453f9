//! The mail transport gateway: attachment fetch, composition and submit,
//! given an access token the caller already holds.

use reqwest::Client;
use tracing::info;

use crate::MailConfig;
use crate::attachment::{AttachmentFetcher, AttachmentOutcome};
use crate::error::Result;
use crate::gmail::{GmailClient, SentMessage};
use crate::mime;
use crate::oauth::OAuthClient;

#[derive(Debug, Clone)]
pub struct OutgoingMessage<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub attachment_url: Option<&'a str>,
}

/// A message the provider accepted.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub sent: SentMessage,
    /// `None` when no attachment was requested.
    pub attachment: Option<AttachmentOutcome>,
}

impl Delivery {
    pub fn has_attachment(&self) -> bool {
        self.attachment.as_ref().is_some_and(|a| a.attachment().is_some())
    }
}

#[derive(Clone)]
pub struct MailTransport {
    oauth: OAuthClient,
    gmail: GmailClient,
    attachments: AttachmentFetcher,
}

impl MailTransport {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let provider_http = Client::builder().timeout(config.provider_timeout).build()?;
        let attachment_http = Client::builder().timeout(config.attachment_timeout).build()?;

        Ok(Self {
            oauth: OAuthClient::new(provider_http.clone(), config.oauth.clone()),
            gmail: GmailClient::new(provider_http, config.api_base.clone()),
            attachments: AttachmentFetcher::new(attachment_http, config.attachment_max_bytes),
        })
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn gmail(&self) -> &GmailClient {
        &self.gmail
    }

    /// Send one message. At most one submit is attempted; an unavailable
    /// attachment degrades to a plain message.
    pub async fn send(&self, access_token: &str, msg: &OutgoingMessage<'_>) -> Result<Delivery> {
        let attachment = match msg.attachment_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Some(self.attachments.fetch(url).await),
            None => None,
        };

        let raw = mime::compose(
            msg.from,
            msg.to,
            msg.subject,
            msg.body,
            attachment.as_ref().and_then(AttachmentOutcome::attachment),
        );
        let sent = self.gmail.send_raw(access_token, &raw).await?;

        info!(
            "Sent message {} (thread {}) to {}",
            sent.id, sent.thread_id, msg.to
        );
        Ok(Delivery { sent, attachment })
    }
}
