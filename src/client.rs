use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::{self, RequestContext};
use crate::key::{KeyManager, Tier};
use crate::quota::Quota;
use crate::retry::RetryCoordinator;
use crate::types::KeyValidation;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// One API session: a shared HTTP connection pool, quota and key.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    config: Config,
    quota: Arc<Quota>,
    retry: RetryCoordinator,
    keys: KeyManager,
}

impl Client {
    /// Build a client for `config.api_key`. The key is not validated until
    /// [`Client::set_key`] or [`Client::validate_key`] is called, so the
    /// session starts on the anonymous quota.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let http = http::build_client(&config)?;
        let quota = Arc::new(Quota::new(
            config.quota_for(Tier::Anonymous),
            config.refill_interval(),
        ));
        let retry = RetryCoordinator::new(
            quota.clone(),
            config.rate_limit_cooldown(),
            config.max_rate_limit_retries,
        );
        let keys = KeyManager::new(config.api_key.clone());
        Ok(Self {
            http,
            config,
            quota,
            retry,
            keys,
        })
    }

    /// Build a client and, when a key is configured, validate it to pick the tier.
    pub async fn connect(config: Config) -> Result<Self> {
        let client = Self::new(config)?;
        if client.keys.key().is_some() {
            client.validate_key().await?;
        }
        Ok(client)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    pub fn tier(&self) -> Tier {
        self.keys.tier()
    }

    pub fn api_key(&self) -> Option<String> {
        self.keys.key()
    }

    /// Start a request for `path` (relative to the API root) carrying the
    /// standard headers and the current key.
    pub fn request(&self, path: &str) -> Result<RequestContext> {
        self.request_with_key(path, self.keys.key().as_deref())
    }

    fn request_with_key(&self, path: &str, key: Option<&str>) -> Result<RequestContext> {
        let template = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        let headers = http::standard_headers(&self.config, key)?;
        Ok(RequestContext::new(template, self.config.timeout()).headers(headers))
    }

    /// Send a request through the quota, retrying on rate limits. A context
    /// whose URL cannot be built fails without taking a quota token.
    pub async fn execute(&self, ctx: &RequestContext) -> Result<Value> {
        let url = ctx.url()?;
        self.execute_at(ctx, &url).await
    }

    async fn execute_at(&self, ctx: &RequestContext, url: &Url) -> Result<Value> {
        self.retry
            .execute(|| http::dispatch(&self.http, ctx, url))
            .await
    }

    /// Like [`Client::execute`], decoding the result into `T`.
    pub async fn execute_as<T: DeserializeOwned>(&self, ctx: &RequestContext) -> Result<T> {
        let url = ctx.url()?;
        let value = self.execute_at(ctx, &url).await?;
        serde_json::from_value(value).map_err(|e| Error::MalformedResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Replace the key and re-derive the tier. A `None` key is anonymous and
    /// needs no round trip.
    pub async fn set_key(&self, key: Option<String>) -> Result<Tier> {
        let has_key = key.is_some();
        self.keys.set_key(key);
        if !has_key {
            self.apply_tier(None, Tier::Anonymous);
            return Ok(Tier::Anonymous);
        }
        let validation = self.validate_key().await?;
        Ok(Tier::from_premium(validation.is_premium))
    }

    /// Ask the server about the current key and adopt the tier it reports.
    /// On failure the session falls back to the anonymous tier. If the key is
    /// replaced while the request is in flight, the outcome is returned but
    /// the tier is left to the newer key.
    pub async fn validate_key(&self) -> Result<KeyValidation> {
        let key = self.keys.key();
        let ctx = self.request_with_key("/users/validate.json", key.as_deref())?;
        match self.execute_as::<KeyValidation>(&ctx).await {
            Ok(validation) => {
                self.apply_tier(key.as_deref(), Tier::from_premium(validation.is_premium));
                Ok(validation)
            }
            Err(e) => {
                self.apply_tier(key.as_deref(), Tier::Anonymous);
                Err(e)
            }
        }
    }

    fn apply_tier(&self, key: Option<&str>, tier: Tier) {
        let capacity = self.config.quota_for(tier);
        match self
            .keys
            .set_tier_for(key, tier, |_| self.quota.set_max(capacity))
        {
            Some(previous) if previous != tier => {
                info!("switched to {:?} tier, quota capacity {}", tier, capacity)
            }
            Some(_) => {}
            None => debug!("key changed during validation; keeping current tier"),
        }
    }
}
