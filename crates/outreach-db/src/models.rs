//! Database row types. These map directly to SQLite rows.
//! Distinct from outreach-types API models to keep the DB layer independent.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use outreach_types::models::{Application, ApplicationStatus, Source};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: String,
}

impl UserRow {
    /// The stored refresh token, if one is on file and non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationRow {
    pub id: String,
    pub user_id: String,
    pub counterparty_name: String,
    pub counterparty_email: String,
    pub role: String,
    pub company: Option<String>,
    pub source: String,
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub status: String,
    pub sent_at: String,
}

impl ApplicationRow {
    pub fn status(&self) -> Result<ApplicationStatus> {
        self.status.parse().map_err(|e: String| anyhow!(e))
    }

    pub fn into_model(self) -> Result<Application> {
        let status = self.status()?;
        let source: Source = self.source.parse().map_err(|e: String| anyhow!(e))?;
        Ok(Application {
            id: self.id.parse()?,
            user_id: self.user_id.parse()?,
            counterparty_name: self.counterparty_name,
            counterparty_email: self.counterparty_email,
            role: self.role,
            company: self.company,
            source,
            thread_id: self.thread_id,
            message_id: self.message_id,
            status,
            sent_at: self.sent_at.parse::<DateTime<Utc>>()?,
        })
    }
}

/// Fields supplied when a ledger record is created.
pub struct NewApplication<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub counterparty_name: &'a str,
    pub counterparty_email: &'a str,
    pub role: &'a str,
    pub company: Option<&'a str>,
    pub source: Source,
    pub thread_id: Option<&'a str>,
    pub message_id: Option<&'a str>,
    pub status: ApplicationStatus,
}

/// An `Awaiting Reply` record joined with what the reply check needs
/// from its owner.
#[derive(Debug, Clone)]
pub struct ReplyCandidate {
    pub application_id: String,
    pub user_id: String,
    pub user_email: String,
    pub thread_id: String,
    pub counterparty_name: String,
}
