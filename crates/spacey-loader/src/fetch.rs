// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Fetching module source text
//!
//! The loader never caches fetch results itself beyond the module map, and
//! asks for each resource at most once per realm.

use crate::error::FetchError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Source of module text
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the text of the resource at `url`.
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

/// In-memory fetcher, for embedding and tests.
///
/// Counts how many times each URL was fetched.
#[derive(Default)]
pub struct MemoryFetcher {
    sources: DashMap<Url, String>,
    counts: DashMap<Url, usize>,
    total: AtomicUsize,
    delay: Option<Duration>,
}

impl MemoryFetcher {
    /// Create an empty fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond only after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add or replace a resource
    ///
    /// # Panics
    ///
    /// Panics if `url` is not an absolute URL.
    pub fn insert(&self, url: &str, source: impl Into<String>) -> &Self {
        let parsed = Url::parse(url)
            .unwrap_or_else(|err| panic!("invalid resource URL '{}': {}", url, err));
        self.sources.insert(parsed, source.into());
        self
    }

    /// Number of fetches of `url` so far
    pub fn fetch_count(&self, url: &str) -> usize {
        Url::parse(url)
            .ok()
            .and_then(|url| self.counts.get(&url).map(|count| *count))
            .unwrap_or(0)
    }

    /// Number of fetches of any URL so far
    pub fn total_fetches(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        *self.counts.entry(url.clone()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.sources
            .get(url)
            .map(|source| source.value().clone())
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

/// Fetcher for `file://` URLs
#[derive(Debug, Default, Clone)]
pub struct FileFetcher;

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let path = url.to_file_path().map_err(|_| FetchError::Io {
            url: url.to_string(),
            message: "not a local file path".into(),
        })?;

        debug!(path = %path.display(), "reading module file");
        tokio::fs::read_to_string(&path).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(url.to_string()),
            _ => FetchError::Io {
                url: url.to_string(),
                message: err.to_string(),
            },
        })
    }
}

/// Fetcher for `http://` and `https://` URLs
#[cfg(feature = "http")]
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .user_agent(format!("spacey-loader/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| FetchError::Network {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        debug!(url = %url, "fetching remote module");

        let network = |err: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        };

        let response = self
            .client
            .get(url.clone())
            .header("Accept", "text/javascript, application/javascript")
            .send()
            .await
            .map_err(network)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(network)
    }
}

/// Dispatches on URL scheme: `file` to the file fetcher, `http(s)` to the
/// remote fetcher when one is configured.
pub struct SchemeFetcher {
    file: Arc<dyn Fetcher>,
    remote: Option<Arc<dyn Fetcher>>,
}

impl SchemeFetcher {
    /// Local files only
    pub fn local() -> Self {
        Self {
            file: Arc::new(FileFetcher),
            remote: None,
        }
    }

    /// Use `remote` for http(s) URLs
    pub fn with_remote(mut self, remote: Arc<dyn Fetcher>) -> Self {
        self.remote = Some(remote);
        self
    }
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        match url.scheme() {
            "file" => self.file.fetch(url).await,
            "http" | "https" => match &self.remote {
                Some(remote) => remote.fetch(url).await,
                None => Err(FetchError::RemoteDisabled(url.to_string())),
            },
            scheme => Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fetcher_counts() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("https://x/a.js", "export {}");

        let url = Url::parse("https://x/a.js").unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "export {}");
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "export {}");
        assert_eq!(fetcher.fetch_count("https://x/a.js"), 2);

        let missing = Url::parse("https://x/missing.js").unwrap();
        assert_eq!(
            fetcher.fetch(&missing).await,
            Err(FetchError::NotFound("https://x/missing.js".into()))
        );
        assert_eq!(fetcher.total_fetches(), 3);
    }

    #[test]
    #[should_panic(expected = "invalid resource URL 'x/a.js'")]
    fn test_memory_fetcher_rejects_relative_urls() {
        MemoryFetcher::new().insert("x/a.js", "export {}");
    }

    #[tokio::test]
    async fn test_file_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.js");
        std::fs::write(&path, "export const a = 1;").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(FileFetcher.fetch(&url).await.unwrap(), "export const a = 1;");

        let missing = Url::from_file_path(dir.path().join("nope.js")).unwrap();
        assert!(matches!(FileFetcher.fetch(&missing).await, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_scheme_fetcher_rejects_remote_by_default() {
        let fetcher = SchemeFetcher::local();
        let url = Url::parse("https://example.com/a.js").unwrap();
        assert!(matches!(fetcher.fetch(&url).await, Err(FetchError::RemoteDisabled(_))));

        let data = Url::parse("data:text/javascript,export{}").unwrap();
        assert!(matches!(
            fetcher.fetch(&data).await,
            Err(FetchError::UnsupportedScheme { .. })
        ));
    }
}
