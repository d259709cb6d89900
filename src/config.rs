//! Worker configuration
//!
//! The version tag, seed set and host lists are fixed for a given build of the
//! app; only the app root (where the app is served from) varies by deployment.
//! Changing `CACHE_VERSION` is the only way to invalidate every cached entry on
//! the next deploy.

use reqwest::Url;

use crate::error::{WorkerError, WorkerResult};
use crate::net::same_origin;

/// Name of the current cache generation
pub const CACHE_VERSION: &str = "e2b-dictionary-v1.0.1";

/// Where the app is served from when nothing else is configured
pub const DEFAULT_APP_ROOT: &str = "http://localhost:8080/";

/// Remote dictionary dataset, seeded at install and refreshed by sync
pub const DICTIONARY_URL: &str =
    "https://raw.githubusercontent.com/towfikahmed0/e2b_dictionary/main/dictionary.json";

/// Icon stylesheet used by the app shell
pub const STYLESHEET_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css";

/// Local app shell paths, resolved against the app root
const LOCAL_SEEDS: [&str; 3] = ["/", "./index.html", "./img/logo.png"];

/// External hosts whose requests are mediated
const MEDIATED_HOSTS: [&str; 2] = ["raw.githubusercontent.com", "cdnjs.cloudflare.com"];

/// Live word lookup API; every lookup must be fresh
pub const LOOKUP_API_HOST: &str = "api.dictionaryapi.dev";

/// Sync tag that triggers a dictionary refresh
pub const SYNC_TAG: &str = "dictionary-update";

/// How a request URL relates to the worker's scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestScope {
    /// Same origin as the app
    SameOrigin,
    /// An allow-listed external host
    AllowListed,
    /// Not mediated; goes straight to the network
    Outside,
}

impl RequestScope {
    /// Whether the worker intercepts requests in this scope
    pub fn is_mediated(self) -> bool {
        !matches!(self, RequestScope::Outside)
    }
}

/// Immutable configuration of one cache worker version
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name of the generation this worker owns
    pub version: String,
    /// Base URL the app is served from
    pub app_root: Url,
    /// URLs that must be present right after install, in order
    pub seeds: Vec<Url>,
    /// External hosts whose requests are mediated
    pub mediated_hosts: Vec<String>,
    /// Hosts whose responses are never stored
    pub never_cache_hosts: Vec<String>,
    /// Dataset refreshed by background sync
    pub dataset_url: Url,
    /// Sync tag handled by this worker
    pub sync_tag: String,
}

impl WorkerConfig {
    /// Builds the configuration for an app served from `app_root`
    ///
    /// # Returns
    /// * `Ok(WorkerConfig)` with seeds resolved against `app_root`
    /// * `Err(WorkerError::InvalidUrl)` if `app_root` is not an absolute URL
    pub fn for_app(app_root: &str) -> WorkerResult<Self> {
        let app_root = parse_url(app_root)?;

        let mut seeds = LOCAL_SEEDS
            .iter()
            .map(|path| {
                app_root.join(path).map_err(|e| WorkerError::InvalidUrl {
                    url: (*path).to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<WorkerResult<Vec<_>>>()?;
        seeds.push(parse_url(STYLESHEET_URL)?);
        seeds.push(parse_url(DICTIONARY_URL)?);

        Ok(Self {
            version: CACHE_VERSION.to_string(),
            dataset_url: parse_url(DICTIONARY_URL)?,
            app_root,
            seeds,
            mediated_hosts: MEDIATED_HOSTS.iter().map(|h| h.to_string()).collect(),
            never_cache_hosts: vec![LOOKUP_API_HOST.to_string()],
            sync_tag: SYNC_TAG.to_string(),
        })
    }

    /// Replaces the generation name, e.g. to stage a new version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Classifies a URL against the worker's scope
    pub fn scope_of(&self, url: &Url) -> RequestScope {
        if same_origin(url, &self.app_root) {
            RequestScope::SameOrigin
        } else if host_in(url, &self.mediated_hosts) {
            RequestScope::AllowListed
        } else {
            RequestScope::Outside
        }
    }

    /// Whether responses for `url` must never be stored
    pub fn is_never_cached(&self, url: &Url) -> bool {
        host_in(url, &self.never_cache_hosts)
    }

    /// Document served to navigations when offline
    pub fn offline_document(&self) -> WorkerResult<Url> {
        self.app_root.join("/").map_err(|e| WorkerError::InvalidUrl {
            url: "/".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Parses an absolute URL
pub fn parse_url(raw: &str) -> WorkerResult<Url> {
    Url::parse(raw).map_err(|e| WorkerError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Host equals one of `hosts` or is a subdomain of one
fn host_in(url: &Url, hosts: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    hosts.iter().any(|allowed| {
        host.eq_ignore_ascii_case(allowed)
            || host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", allowed.to_ascii_lowercase()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig::for_app("https://towfikahmed0.github.io/e2b_dictionary/").unwrap()
    }

    #[test]
    fn test_seeds_resolve_against_app_root_in_order() {
        let seeds: Vec<String> = config().seeds.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            seeds,
            vec![
                "https://towfikahmed0.github.io/",
                "https://towfikahmed0.github.io/e2b_dictionary/index.html",
                "https://towfikahmed0.github.io/e2b_dictionary/img/logo.png",
                STYLESHEET_URL,
                DICTIONARY_URL,
            ]
        );
    }

    #[test]
    fn test_default_version_tag() {
        assert_eq!(config().version, CACHE_VERSION);
        assert_eq!(config().with_version("v2").version, "v2");
    }

    #[test]
    fn test_invalid_app_root_is_rejected() {
        let result = WorkerConfig::for_app("not a url");
        assert!(matches!(result, Err(WorkerError::InvalidUrl { .. })));
    }

    #[test]
    fn test_scope_same_origin() {
        let url = parse_url("https://towfikahmed0.github.io/other/page.html").unwrap();
        assert_eq!(config().scope_of(&url), RequestScope::SameOrigin);
    }

    #[test]
    fn test_scope_allow_listed_hosts() {
        let cfg = config();
        assert_eq!(
            cfg.scope_of(&parse_url(DICTIONARY_URL).unwrap()),
            RequestScope::AllowListed
        );
        assert_eq!(
            cfg.scope_of(&parse_url(STYLESHEET_URL).unwrap()),
            RequestScope::AllowListed
        );
    }

    #[test]
    fn test_scope_outside_hosts() {
        let cfg = config();
        let lookup = parse_url("https://api.dictionaryapi.dev/api/v2/entries/en/word").unwrap();
        let lookalike = parse_url("https://notcdnjs.cloudflare.com.evil.test/x.css").unwrap();
        assert_eq!(cfg.scope_of(&lookup), RequestScope::Outside);
        assert_eq!(cfg.scope_of(&lookalike), RequestScope::Outside);
        assert!(!cfg.scope_of(&lookup).is_mediated());
    }

    #[test]
    fn test_lookup_api_is_never_cached() {
        let cfg = config();
        let lookup = parse_url("https://api.dictionaryapi.dev/api/v2/entries/en/word").unwrap();
        assert!(cfg.is_never_cached(&lookup));
        assert!(!cfg.is_never_cached(&parse_url(DICTIONARY_URL).unwrap()));
    }

    #[test]
    fn test_offline_document_is_origin_root() {
        assert_eq!(
            config().offline_document().unwrap().as_str(),
            "https://towfikahmed0.github.io/"
        );
    }
}
