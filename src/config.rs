use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Secret used to sign bearer tokens. Must stay stable across restarts
    /// or every issued token is invalidated.
    pub auth_secret: String,
    /// Bearer token lifetime in minutes.
    pub token_ttl_mins: i64,
    /// Per-channel delivery timeout in seconds. A gateway call that exceeds
    /// this counts as a channel-level delivery failure.
    pub channel_timeout_secs: u64,
    pub max_probes_per_device: i64,
    /// Outbound gateway endpoints per notification channel. A channel with
    /// no configured endpoint fails delivery (the notification row is still
    /// persisted).
    pub email_gateway_url: Option<String>,
    pub sms_gateway_url: Option<String>,
    pub push_gateway_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            auth_secret: required("AUTH_SECRET")?,
            token_ttl_mins: optional("TOKEN_TTL_MINS", "30")
                .parse()
                .context("TOKEN_TTL_MINS must be a positive integer")?,
            channel_timeout_secs: optional("CHANNEL_TIMEOUT_SECS", "5")
                .parse()
                .context("CHANNEL_TIMEOUT_SECS must be a positive integer")?,
            max_probes_per_device: optional("MAX_PROBES_PER_DEVICE", "4")
                .parse()
                .context("MAX_PROBES_PER_DEVICE must be a positive integer")?,
            email_gateway_url: var("EMAIL_GATEWAY_URL"),
            sms_gateway_url: var("SMS_GATEWAY_URL"),
            push_gateway_url: var("PUSH_GATEWAY_URL"),
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
