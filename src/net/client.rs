//! Network access for the cache worker
//!
//! The `Fetch` trait is the seam between the worker and the network. The
//! production implementation wraps a reqwest client; tests substitute a stub.

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use super::{same_origin, Request, Response, ResponseType};
use crate::error::FetchError;

/// Performs a network fetch for a request and buffers the response
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `request` from the network.
    ///
    /// Any HTTP status counts as success; only transport failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Fetcher backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// HTTP client for making requests
    http_client: Client,
    /// Origin of the app; responses from it are `basic`, others `cors`
    origin: Url,
}

impl HttpFetcher {
    /// Creates a fetcher for an app served from `app_root`
    pub fn new(app_root: &Url) -> Self {
        Self {
            http_client: Client::new(),
            origin: app_root.clone(),
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        debug!(method = %request.method, url = %request.url, "network fetch");

        let response = self
            .http_client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let final_url = response.url().clone();
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let response_type = if same_origin(&final_url, &self.origin) {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            url: final_url.to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            response_type,
            body,
        })
    }
}
