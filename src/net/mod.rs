//! Request and response types for mediated traffic
//!
//! A `Request` is what the app asks for; a `Response` is a fully buffered
//! snapshot that can be handed to the caller and duplicated into the cache.

pub mod client;

pub use client::{Fetch, HttpFetcher};

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// An outbound request the worker is asked to mediate
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
    /// Whether this is a top-level page navigation
    pub navigate: bool,
}

impl Request {
    /// A plain GET request for a subresource
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            navigate: false,
        }
    }

    /// A GET request for a page navigation
    pub fn navigation(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            navigate: true,
        }
    }

    /// Identity under which this request is stored and matched
    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method.as_str().to_string(),
            url: self.url.to_string(),
        }
    }
}

/// Identity of a stored response: method plus URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    /// Key for a GET of `url`
    pub fn get(url: &Url) -> Self {
        Self {
            method: Method::GET.as_str().to_string(),
            url: url.to_string(),
        }
    }

    /// Whether entries under this key may be stored or matched at all
    pub fn is_get(&self) -> bool {
        self.method == Method::GET.as_str()
    }

    /// Stable hex digest used as the on-disk file stem
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Shape of a response as seen by the requesting page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response with full access to headers and body
    Basic,
    /// Cross-origin response
    Cors,
    /// Cross-origin response without read access
    Opaque,
    /// Response synthesised locally rather than fetched
    Default,
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseType::Basic => "basic",
            ResponseType::Cors => "cors",
            ResponseType::Opaque => "opaque",
            ResponseType::Default => "default",
        };
        f.write_str(name)
    }
}

/// A buffered response snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL of the response
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Reason phrase, empty when unknown
    pub status_text: String,
    /// Header name/value pairs in received order
    pub headers: Vec<(String, String)>,
    /// How the response is exposed to the page
    pub response_type: ResponseType,
    /// Body bytes
    pub body: Vec<u8>,
}

impl Response {
    /// Whether the status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Whether two URLs share scheme, host and port
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}
