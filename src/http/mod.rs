mod template;

pub use template::RequestContext;

use crate::config::Config;
use crate::error::{Error, Result};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

pub const API_KEY: HeaderName = HeaderName::from_static("apikey");
pub const PROTOCOL_VERSION: HeaderName = HeaderName::from_static("protocol-version");
pub const APPLICATION_VERSION: HeaderName = HeaderName::from_static("application-version");

/// Status some gateways use when the origin server is down.
const WEB_SERVER_DOWN: u16 = 521;

pub fn build_client(cfg: &Config) -> Result<Client> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, header_value("user_agent", &cfg.user_agent)?);
    // Credentials are injected per request so the key can be swapped at runtime.
    Client::builder()
        .default_headers(default_headers)
        .connect_timeout(cfg.timeout())
        .timeout(cfg.timeout())
        .use_rustls_tls()
        .build()
        .map_err(Error::Build)
}

pub(crate) fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::invalid_parameter(name, "not a valid header value"))
}

/// Headers sent with every request. The key header is absent when no key is set.
pub fn standard_headers(cfg: &Config, api_key: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        let mut value = header_value("api_key", key)?;
        value.set_sensitive(true);
        headers.insert(API_KEY, value);
    }
    headers.insert(
        PROTOCOL_VERSION,
        header_value("protocol_version", &cfg.protocol_version)?,
    );
    headers.insert(
        APPLICATION_VERSION,
        header_value("application_version", &cfg.application_version)?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Map a received response onto an outcome. Pure in (status, body, url).
pub fn classify(status: StatusCode, body: &str, url: &str) -> Result<Value> {
    if status.as_u16() == WEB_SERVER_DOWN || body.trim() == "Bad Gateway" {
        return Err(Error::ServiceUnavailable {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited {
            url: url.to_string(),
        });
    }
    if status == StatusCode::ACCEPTED {
        return Err(Error::Ambiguous {
            url: url.to_string(),
        });
    }

    let parsed: Value = if body.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(body).map_err(|e| Error::MalformedResponse {
            url: url.to_string(),
            message: e.to_string(),
        })?
    };

    if !status.is_success() {
        let message = ["message", "error"]
            .iter()
            .find_map(|k| parsed.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string());
        return Err(Error::RemoteError {
            status: status.as_u16(),
            message,
            url: url.to_string(),
        });
    }
    Ok(parsed)
}

fn transport_error(err: reqwest::Error, url: &str) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
        }
    } else {
        warn!("request to {} failed: {}", url, err);
        Error::Transport {
            url: url.to_string(),
            source: err,
        }
    }
}

/// Perform exactly one HTTP exchange against `url`, the resolved form of
/// `ctx`. Never retries.
pub async fn dispatch(client: &Client, ctx: &RequestContext, url: &Url) -> Result<Value> {
    let method = ctx.method();
    debug!("{} {}", method, url);

    let mut req = client
        .request(method, url.clone())
        .headers(ctx.header_map().clone())
        .timeout(ctx.timeout_duration());
    if let Some(body) = ctx.json_body() {
        req = req.json(body);
    }

    let res = req
        .send()
        .await
        .map_err(|e| transport_error(e, url.as_str()))?;
    let status = res.status();
    let text = res
        .text()
        .await
        .map_err(|e| transport_error(e, url.as_str()))?;
    debug!("{} -> {}", url, status);
    classify(status, &text, url.as_str())
}
