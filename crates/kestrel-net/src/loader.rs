//! Requests
//!
//! Request description handed to a [`Loader`](crate::Loader), plus the
//! loader-wide defaults applied to it.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::NetError;

/// HTTP method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
}

impl Method {
    /// Parse a method name, ASCII case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Head,
            Method::Options,
            Method::Patch,
        ]
        .into_iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
        }
    }
}

/// Request configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub referrer: Option<Url>,
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: Vec::new(), body: None, referrer: None, timeout: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::Post, url)
    }

    /// Add a header. A repeated name is joined to the existing value with `", "`.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_referrer(mut self, referrer: Option<Url>) -> Self {
        self.referrer = referrer;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Header value, ASCII case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}

/// Loader-wide request defaults
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub user_agent: String,
    /// Timeout for requests that carry none, in milliseconds; 0 disables it
    pub default_timeout_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("Kestrel/", env!("CARGO_PKG_VERSION")).to_string(),
            default_timeout_ms: 0,
        }
    }
}

impl LoaderConfig {
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Fill in the user agent and default timeout where the request has none
    pub fn prepare(&self, mut request: Request) -> Request {
        if request.header("User-Agent").is_none() && !self.user_agent.is_empty() {
            request.headers.push(("User-Agent".to_string(), self.user_agent.clone()));
        }
        if request.timeout.is_none() && self.default_timeout_ms > 0 {
            request.timeout = Some(Duration::from_millis(self.default_timeout_ms));
        }
        request
    }
}
