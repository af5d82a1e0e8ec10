use crate::error::{Error, Result};
use crate::key::Tier;
use std::env;
use std::time::Duration;

/// Runtime configuration for the API client.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_url: String,
    pub application_name: String,
    pub application_version: String,
    pub protocol_version: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub quota_anonymous: u32,
    pub quota_premium: u32,
    pub refill_interval_ms: u64,
    pub rate_limit_cooldown_ms: u64,
    /// `None` retries rate-limited requests until they go through.
    pub max_rate_limit_retries: Option<u32>,
    pub max_attachment_size: u64,
}

const DEFAULT_API_URL: &str = "https://api.modhost.example/v1";

impl Default for Config {
    fn default() -> Self {
        let application_name = env!("CARGO_PKG_NAME").to_string();
        let application_version = env!("CARGO_PKG_VERSION").to_string();
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: format!("{}/{}", application_name, application_version),
            application_name,
            application_version,
            protocol_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout_ms: 30_000,
            quota_anonymous: 30,
            quota_premium: 300,
            refill_interval_ms: 1_000,
            rate_limit_cooldown_ms: 2_000,
            max_rate_limit_retries: None,
            max_attachment_size: 40 * 1024 * 1024,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::invalid_parameter(name, format!("cannot parse {:?}", raw))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - MODHOST_API_KEY (default: unset, anonymous tier)
    /// - MODHOST_API_URL (default: https://api.modhost.example/v1)
    /// - MODHOST_APP_NAME / MODHOST_APP_VERSION (default: this crate)
    /// - MODHOST_PROTOCOL_VERSION (default: crate version)
    /// - MODHOST_USER_AGENT (default: <app name>/<app version>)
    /// - MODHOST_HTTP_TIMEOUT_MS (default: 30000)
    /// - MODHOST_QUOTA_ANONYMOUS / MODHOST_QUOTA_PREMIUM (default: 30 / 300)
    /// - MODHOST_QUOTA_REFILL_MS (default: 1000)
    /// - MODHOST_RATE_LIMIT_COOLDOWN_MS (default: 2000)
    /// - MODHOST_MAX_RATE_LIMIT_RETRIES (default: unbounded)
    /// - MODHOST_MAX_ATTACHMENT_SIZE (default: 40 MiB)
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        cfg.api_key = env::var("MODHOST_API_KEY").ok().filter(|k| !k.is_empty());
        if let Ok(url) = env::var("MODHOST_API_URL") {
            cfg.api_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(name) = env::var("MODHOST_APP_NAME") {
            cfg.application_name = name;
        }
        if let Ok(version) = env::var("MODHOST_APP_VERSION") {
            cfg.application_version = version;
        }
        if let Ok(version) = env::var("MODHOST_PROTOCOL_VERSION") {
            cfg.protocol_version = version;
        }
        cfg.user_agent = env::var("MODHOST_USER_AGENT").unwrap_or_else(|_| {
            format!("{}/{}", cfg.application_name, cfg.application_version)
        });

        if let Some(v) = env_parse("MODHOST_HTTP_TIMEOUT_MS")? {
            cfg.timeout_ms = v;
        }
        if let Some(v) = env_parse("MODHOST_QUOTA_ANONYMOUS")? {
            cfg.quota_anonymous = v;
        }
        if let Some(v) = env_parse("MODHOST_QUOTA_PREMIUM")? {
            cfg.quota_premium = v;
        }
        if let Some(v) = env_parse("MODHOST_QUOTA_REFILL_MS")? {
            cfg.refill_interval_ms = v;
        }
        if let Some(v) = env_parse("MODHOST_RATE_LIMIT_COOLDOWN_MS")? {
            cfg.rate_limit_cooldown_ms = v;
        }
        cfg.max_rate_limit_retries = env_parse("MODHOST_MAX_RATE_LIMIT_RETRIES")?;
        if let Some(v) = env_parse("MODHOST_MAX_ATTACHMENT_SIZE")? {
            cfg.max_attachment_size = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::invalid_parameter("timeout_ms", "must be positive"));
        }
        if self.quota_anonymous == 0 || self.quota_premium == 0 {
            return Err(Error::invalid_parameter("quota", "capacity must be positive"));
        }
        if self.refill_interval_ms == 0 {
            return Err(Error::invalid_parameter(
                "refill_interval_ms",
                "must be positive",
            ));
        }
        url::Url::parse(&self.api_url)
            .map_err(|e| Error::invalid_parameter("api_url", e.to_string()))?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }

    pub fn quota_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Anonymous => self.quota_anonymous,
            Tier::Premium => self.quota_premium,
        }
    }

    /// Reject attachments the server would refuse anyway.
    pub fn check_attachment_size(&self, len: u64) -> Result<()> {
        if len > self.max_attachment_size {
            return Err(Error::invalid_parameter(
                "attachment",
                format!(
                    "{} bytes exceeds the {} byte limit",
                    len, self.max_attachment_size
                ),
            ));
        }
        Ok(())
    }
}
