use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use outreach_api::poller::PollerConfig;
use outreach_mail::MailConfig;
use outreach_mail::gmail::GMAIL_API_BASE;
use outreach_mail::oauth::{GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, OAuthConfig};

/// Secrets that ship in sample env files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me", "changeme", "secret", "your-secret-here"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub mail: MailConfig,
    pub poller: PollerConfig,
    pub webhook_token: Option<String>,
    pub auth_redirect: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("OUTREACH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() {
            bail!("OUTREACH_JWT_SECRET must be set");
        }
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("OUTREACH_JWT_SECRET is a placeholder value; set a real secret");
        }

        let host = var("OUTREACH_HOST", "0.0.0.0");
        let port: u16 = var("OUTREACH_PORT", "8000")
            .parse()
            .context("OUTREACH_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let provider_timeout = secs(&lookup, "OUTREACH_PROVIDER_TIMEOUT_SECS", 20)?;
        let attachment_timeout = secs(&lookup, "OUTREACH_ATTACHMENT_TIMEOUT_SECS", 10)?;
        let attachment_max_bytes: usize = var("OUTREACH_ATTACHMENT_MAX_BYTES", "10485760")
            .parse()
            .context("OUTREACH_ATTACHMENT_MAX_BYTES must be a byte count")?;

        let mail = MailConfig {
            oauth: OAuthConfig {
                client_id: var("GOOGLE_CLIENT_ID", ""),
                client_secret: var("GOOGLE_CLIENT_SECRET", ""),
                redirect_uri: var("GOOGLE_REDIRECT_URI", "http://localhost:8000/gmail/callback"),
                auth_url: var("GOOGLE_AUTH_URL", GOOGLE_AUTH_URL),
                token_url: var("GOOGLE_TOKEN_URL", GOOGLE_TOKEN_URL),
            },
            api_base: var("GMAIL_API_BASE", GMAIL_API_BASE),
            provider_timeout,
            attachment_timeout,
            attachment_max_bytes,
        };

        let concurrency: usize = var("OUTREACH_POLL_CONCURRENCY", "4")
            .parse()
            .context("OUTREACH_POLL_CONCURRENCY must be a positive integer")?;
        if concurrency == 0 {
            bail!("OUTREACH_POLL_CONCURRENCY must be at least 1");
        }
        let interval = secs(&lookup, "OUTREACH_POLL_INTERVAL_SECS", 60)?;
        if interval.is_zero() {
            bail!("OUTREACH_POLL_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            addr,
            db_path: PathBuf::from(var("OUTREACH_DB_PATH", "outreach.db")),
            jwt_secret,
            mail,
            poller: PollerConfig {
                interval,
                concurrency,
                // token refresh + thread fetch
                record_timeout: provider_timeout * 2,
            },
            webhook_token: lookup("OUTREACH_WEBHOOK_TOKEN").filter(|t| !t.trim().is_empty()),
            auth_redirect: var("OUTREACH_AUTH_REDIRECT", "http://localhost:5173/profile"),
        })
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse()
            .map(Duration::from_secs)
            .with_context(|| format!("{} must be a number of seconds", key)),
        None => Ok(Duration::from_secs(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("OUTREACH_JWT_SECRET", "0f8a2c5e9b7d4163")]).unwrap();

        assert_eq!(cfg.addr.to_string(), "0.0.0.0:8000");
        assert_eq!(cfg.db_path, PathBuf::from("outreach.db"));
        assert_eq!(cfg.poller.interval, Duration::from_secs(60));
        assert_eq!(cfg.poller.concurrency, 4);
        assert_eq!(cfg.poller.record_timeout, Duration::from_secs(40));
        assert_eq!(cfg.mail.attachment_timeout, Duration::from_secs(10));
        assert_eq!(cfg.mail.attachment_max_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.mail.oauth.token_url, GOOGLE_TOKEN_URL);
        assert!(cfg.webhook_token.is_none());
    }

    #[test]
    fn secret_is_required_and_not_a_placeholder() {
        assert!(config(&[]).is_err());
        assert!(config(&[("OUTREACH_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(config(&[("OUTREACH_JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("OUTREACH_JWT_SECRET", "0f8a2c5e9b7d4163"),
            ("OUTREACH_PORT", "9100"),
            ("OUTREACH_POLL_INTERVAL_SECS", "15"),
            ("OUTREACH_WEBHOOK_TOKEN", "push"),
            ("GMAIL_API_BASE", "http://127.0.0.1:9999/gmail/v1"),
        ])
        .unwrap();

        assert_eq!(cfg.addr.port(), 9100);
        assert_eq!(cfg.poller.interval, Duration::from_secs(15));
        assert_eq!(cfg.webhook_token.as_deref(), Some("push"));
        assert_eq!(cfg.mail.api_base, "http://127.0.0.1:9999/gmail/v1");
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(config(&[("OUTREACH_JWT_SECRET", "0f8a2c5e9b7d4163"), ("OUTREACH_PORT", "http")]).is_err());
        assert!(config(&[("OUTREACH_JWT_SECRET", "0f8a2c5e9b7d4163"), ("OUTREACH_POLL_CONCURRENCY", "0")]).is_err());
    }
}
