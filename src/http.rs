use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;

use crate::error::{CatalogError, Result};

/// A fully-read HTTP response. Bodies here are small text files or JSON.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self, what: &str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|source| CatalogError::Decode {
            what: what.to_string(),
            source,
        })
    }

    /// Turn a non-success status into `RemoteApi`.
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CatalogError::RemoteApi {
                status: self.status,
                url: url.to_string(),
            })
        }
    }
}

/// The raw HTTP seam. Production uses reqwest; tests script responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

pub struct ReqwestClient {
    client: reqwest::Client,
    token: Option<String>,
}

impl ReqwestClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CatalogError::Network {
                url: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client, token })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let network = |e: reqwest::Error| CatalogError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut req = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("kepler/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/vnd.github+json");
        // Only the REST API takes the token.
        if let Some(token) = &self.token {
            if !url.contains("raw.githubusercontent.com") {
                req = req.header(AUTHORIZATION, format!("Bearer {}", token));
            }
        }

        let resp = req.send().await.map_err(network)?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(network)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
