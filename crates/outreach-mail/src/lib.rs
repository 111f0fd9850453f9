pub mod attachment;
pub mod error;
pub mod gmail;
pub mod mime;
pub mod notification;
pub mod oauth;
pub mod thread;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::time::Duration;

pub use error::{MailError, Result};

/// Provider endpoints, app credentials and I/O bounds for everything in
/// this crate.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub oauth: oauth::OAuthConfig,
    /// Base of the Gmail REST API, e.g. `https://gmail.googleapis.com/gmail/v1`.
    pub api_base: String,
    /// Bound on each token refresh, send and thread fetch.
    pub provider_timeout: Duration,
    pub attachment_timeout: Duration,
    pub attachment_max_bytes: usize,
}
