//! Inbound mailbox push notifications.
//!
//! The provider delivers a Pub/Sub push envelope whose `message.data` is
//! base64-encoded JSON. Two payload shapes are understood: a direct
//! `{threadId}` and the Gmail watch form `{emailAddress, historyId}`.
//! Anything else is a [`CorrelationMiss`].

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, alias = "publish_time")]
    pub publish_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushData {
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    history_id: Option<serde_json::Value>,
}

/// What a notification points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSignal {
    /// A specific conversation changed.
    Thread { thread_id: String },
    /// Something changed in this mailbox; which thread is not known.
    Mailbox {
        email_address: String,
        history_id: String,
    },
}

/// A notification that cannot be mapped to anything. Logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("uncorrelated notification: {0}")]
pub struct CorrelationMiss(pub String);

/// Decode a raw push body. Never panics; every malformed shape is a miss.
pub fn decode_push(body: &[u8]) -> Result<(PushSignal, Option<String>), CorrelationMiss> {
    let envelope: PushEnvelope = serde_json::from_slice(body)
        .map_err(|e| CorrelationMiss(format!("not a push envelope: {}", e)))?;

    let data = envelope
        .message
        .data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| CorrelationMiss("envelope has no data".into()))?;

    let decoded = STANDARD
        .decode(data.trim())
        .or_else(|_| URL_SAFE.decode(data.trim()))
        .map_err(|e| CorrelationMiss(format!("data is not base64: {}", e)))?;

    let payload: PushData = serde_json::from_slice(&decoded)
        .map_err(|e| CorrelationMiss(format!("data is not JSON: {}", e)))?;

    let signal = signal_from(payload)?;
    Ok((signal, envelope.message.message_id))
}

fn signal_from(payload: PushData) -> Result<PushSignal, CorrelationMiss> {
    if let Some(thread_id) = payload.thread_id.filter(|t| !t.trim().is_empty()) {
        return Ok(PushSignal::Thread { thread_id });
    }

    let history_id = match payload.history_id {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    match (payload.email_address.filter(|e| !e.trim().is_empty()), history_id) {
        (Some(email_address), Some(history_id)) => Ok(PushSignal::Mailbox {
            email_address,
            history_id,
        }),
        _ => Err(CorrelationMiss("payload names neither a thread nor a mailbox".into())),
    }
}
