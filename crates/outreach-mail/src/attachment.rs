//! Best-effort résumé download.
//!
//! A failed fetch never fails the send; the caller gets
//! [`AttachmentOutcome::Unavailable`] and decides to go ahead without it.

use futures_util::StreamExt;
use reqwest::{Client, Url};
use tracing::warn;

use crate::mime::Attachment;

const DEFAULT_FILENAME: &str = "resume.pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentOutcome {
    Attached(Attachment),
    Unavailable { url: String, reason: String },
}

impl AttachmentOutcome {
    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            Self::Attached(att) => Some(att),
            Self::Unavailable { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct AttachmentFetcher {
    /// Built with the attachment timeout, separate from provider calls.
    http: Client,
    max_bytes: usize,
}

impl AttachmentFetcher {
    pub fn new(http: Client, max_bytes: usize) -> Self {
        Self { http, max_bytes }
    }

    pub async fn fetch(&self, url: &str) -> AttachmentOutcome {
        match self.try_fetch(url).await {
            Ok(content) => AttachmentOutcome::Attached(Attachment::pdf(&filename_from_url(url), content)),
            Err(reason) => {
                warn!("Attachment unavailable ({}): {}", url, reason);
                AttachmentOutcome::Unavailable {
                    url: url.to_string(),
                    reason,
                }
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let resp = self.http.get(url).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        if resp.content_length().is_some_and(|len| exceeds(len, self.max_bytes)) {
            return Err(format!("larger than {} bytes", self.max_bytes));
        }

        let mut content = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            if content.len() + chunk.len() > self.max_bytes {
                return Err(format!("larger than {} bytes", self.max_bytes));
            }
            content.extend_from_slice(&chunk);
        }

        if content.is_empty() {
            return Err("empty body".to_string());
        }
        Ok(content)
    }
}

/// Declared lengths that do not fit in `usize` are over any cap.
fn exceeds(len: u64, max_bytes: usize) -> bool {
    usize::try_from(len).map_or(true, |len| len > max_bytes)
}

/// Last path segment of the URL, query and fragment excluded.
pub fn filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}
