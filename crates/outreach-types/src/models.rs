use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an application status stands. Only ever advances
/// `NotApplied -> AwaitingReply -> GotReply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[serde(rename = "Not Applied")]
    NotApplied,
    #[serde(rename = "Awaiting Reply")]
    AwaitingReply,
    #[serde(rename = "Got a Reply")]
    GotReply,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotApplied => "Not Applied",
            Self::AwaitingReply => "Awaiting Reply",
            Self::GotReply => "Got a Reply",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Not Applied" => Ok(Self::NotApplied),
            "Awaiting Reply" => Ok(Self::AwaitingReply),
            "Got a Reply" => Ok(Self::GotReply),
            other => Err(format!("unknown application status '{}'", other)),
        }
    }
}

/// Provenance of the contact an application was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    ActiveListing,
    BulkDatabase,
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveListing => "active-listing",
            Self::BulkDatabase => "bulk-database",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active-listing" => Ok(Self::ActiveListing),
            "bulk-database" => Ok(Self::BulkDatabase),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

/// One outreach attempt, as exposed over the API.
///
/// The counterparty fields are copied at creation time and never follow
/// later edits to the contact they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub user_id: Uuid,
    pub counterparty_name: String,
    pub counterparty_email: String,
    pub role: String,
    pub company: Option<String>,
    pub source: Source,
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub status: ApplicationStatus,
    pub sent_at: DateTime<Utc>,
}
