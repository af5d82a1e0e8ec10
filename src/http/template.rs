use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Everything needed to perform one HTTP exchange.
///
/// Built with the chained setters below and then handed to the dispatcher by
/// reference; a rate-limited request is resent from the same context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    url_template: String,
    path_params: BTreeMap<String, String>,
    query_params: Vec<(String, Option<String>)>,
    headers: HeaderMap,
    body: Option<Value>,
    timeout: Duration,
}

impl RequestContext {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url_template: url_template.into(),
            path_params: BTreeMap::new(),
            query_params: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout,
        }
    }

    /// Value for a `{name}` placeholder in the URL template.
    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.insert(name.into(), value.to_string());
        self
    }

    /// Query parameter; `None` leaves it out of the URL entirely.
    pub fn query_param<V: ToString>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.query_params
            .push((name.into(), value.map(|v| v.to_string())));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Attach a JSON payload, which turns the request into a POST.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn method(&self) -> Method {
        if self.body.is_some() {
            Method::POST
        } else {
            Method::GET
        }
    }

    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn json_body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    /// Substitute placeholders and append the query parameters that have values.
    pub fn url(&self) -> Result<Url> {
        let expanded = expand_template(&self.url_template, &self.path_params)?;
        let mut url = Url::parse(&expanded)
            .map_err(|e| Error::invalid_parameter("url", format!("{}: {}", expanded, e)))?;
        let present: Vec<_> = self
            .query_params
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
            .collect();
        if !present.is_empty() {
            url.query_pairs_mut().extend_pairs(present);
        }
        Ok(url)
    }
}

fn expand_template(template: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            return Err(Error::invalid_parameter(
                "url",
                format!("unterminated placeholder in {}", template),
            ));
        };
        let name = &rest[open + 1..open + close];
        let value = params.get(name).ok_or_else(|| {
            Error::invalid_parameter(name, format!("no value for placeholder in {}", template))
        })?;
        out.push_str(&rest[..open]);
        out.push_str(&urlencoding::encode(value));
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ctx(t: &str) -> RequestContext {
        RequestContext::new(t, Duration::from_secs(1))
    }

    #[test]
    fn placeholders_are_substituted_and_encoded() {
        let url = ctx("https://api.test/v1/games/{game}/mods/{mod}.json")
            .path_param("game", "skyrim special")
            .path_param("mod", 42)
            .url()
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.test/v1/games/skyrim%20special/mods/42.json"
        );
    }

    #[test]
    fn unset_query_params_are_omitted() {
        let url = ctx("https://api.test/v1/files")
            .query_param("category", Some("main"))
            .query_param::<String>("period", None)
            .query_param("page", Some(2))
            .url()
            .unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/files?category=main&page=2");

        let bare = ctx("https://api.test/v1/files")
            .query_param::<u32>("page", None)
            .url()
            .unwrap();
        assert_eq!(bare.as_str(), "https://api.test/v1/files");
    }

    #[test]
    fn missing_placeholder_is_invalid_parameter() {
        let err = ctx("https://api.test/v1/games/{game}").url().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(err.to_string().contains("game"));
    }

    #[test]
    fn body_selects_post() {
        let get = ctx("https://api.test/x");
        assert_eq!(get.method(), Method::GET);
        let post = get.body(serde_json::json!({"a": 1}));
        assert_eq!(post.method(), Method::POST);
    }
}
