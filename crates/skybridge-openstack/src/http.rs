//! Shared request plumbing for the adapters

use crate::error::{from_status, transport};
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use skybridge_cloud::{CloudError, Result};
use std::time::Duration;

const AUTH_HEADER: &str = "X-Auth-Token";

/// Successful response, body already read
pub(crate) struct Reply {
    pub headers: HeaderMap,
    pub body: String,
}

impl Reply {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// What a request is about, for error translation
#[derive(Debug, Clone, Copy)]
pub(crate) struct Subject<'a> {
    pub kind: &'a str,
    pub id: &'a str,
}

impl<'a> Subject<'a> {
    pub fn new(kind: &'a str, id: &'a str) -> Self {
        Self { kind, id }
    }
}

/// reqwest client shared by all adapters
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
}

impl ApiClient {
    /// Client with a per-request timeout
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CloudError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a request, translating every failure at this boundary
    pub(crate) async fn execute(
        &self,
        builder: RequestBuilder,
        token: Option<&str>,
        subject: Subject<'_>,
    ) -> Result<Reply> {
        let builder = match token {
            Some(token) => builder.header(AUTH_HEADER, token),
            None => builder,
        };

        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(transport)?;

        tracing::debug!(
            kind = subject.kind,
            id = subject.id,
            status = status.as_u16(),
            "remote call completed"
        );

        if !status.is_success() {
            return Err(from_status(status, subject.kind, subject.id, &body));
        }

        Ok(Reply { headers, body })
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

/// Anchored, escaped name filter for list endpoints that match by regex
pub(crate) fn exact_name_filter(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('^');
    for c in name.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('$');
    escaped
}
