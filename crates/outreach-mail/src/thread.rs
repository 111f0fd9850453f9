//! Provider conversation shapes and reply detection.
//!
//! Only the fields reply detection needs are modelled; everything else the
//! provider sends is ignored. Missing pieces default to empty rather than
//! failing the parse.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub history_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl ThreadMessage {
    /// Value of the `From` header, if the message carries one.
    pub fn from_header(&self) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("From"))
            .map(|h| h.value.as_str())
            .filter(|v| !v.trim().is_empty())
    }
}

impl Thread {
    /// First message whose sender is not `own_email`.
    ///
    /// Any foreign sender counts, including bounces and CC'd third parties.
    /// Messages without a `From` header are never treated as replies, and
    /// nothing is when the owner's address is unknown.
    pub fn find_reply(&self, own_email: &str) -> Option<&ThreadMessage> {
        let own = own_email.trim().to_ascii_lowercase();
        if own.is_empty() {
            return None;
        }
        self.messages.iter().find(|msg| match msg.from_header() {
            Some(from) => !from.to_ascii_lowercase().contains(&own),
            None => false,
        })
    }
}
