//! Content fetching with a persistent on-disk response cache
//!
//! Cache entries are keyed by normalized URL: one directory per host and
//! path segment, one file per sorted query string. Entries expire after a
//! configurable time-to-live; HTTP failures propagate unchanged to the
//! scraping layer.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;

use crate::{Error, Result};

/// Default cache time-to-live: five days
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// File name for cache entries of URLs without a query string
const EMPTY_QUERY_NAME: &str = "index";

/// Read-through on-disk cache in front of a blocking HTTP client
pub struct UrlCache {
    cache_dir: PathBuf,
    ttl: Option<Duration>,
    client: Client,
}

impl UrlCache {
    /// `ttl` of `None` means entries never expire
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ttl,
            client: Client::new(),
        }
    }

    /// Fetch a URL, serving from the cache when a fresh entry exists
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(hit) = self.lookup(url)? {
            return Ok(hit);
        }
        let response = self.client.get(url).send()?.error_for_status()?;
        let bytes = response.bytes()?.to_vec();
        self.store(url, &bytes)?;
        Ok(bytes)
    }

    /// Read a cached response if present and fresh
    pub fn lookup(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(&parse_url(url)?);
        if self.is_fresh(&path) {
            Ok(Some(fs::read(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Write a response body into the cache
    pub fn store(&self, url: &str, bytes: &[u8]) -> Result<()> {
        let path = self.key_path(&parse_url(url)?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }

    /// Map a URL to its cache file: `<dir>/<host>/<path...>/<sorted query>`.
    /// Query pairs are sorted so parameter order doesn't split the cache.
    fn key_path(&self, url: &Url) -> PathBuf {
        let mut path = self.cache_dir.clone();
        path.push(url.host_str().unwrap_or("unknown"));
        for segment in url.path().split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();
        let name = if pairs.is_empty() {
            EMPTY_QUERY_NAME.to_string()
        } else {
            pairs
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&")
        };
        path.push(name);
        path
    }

    fn is_fresh(&self, path: &Path) -> bool {
        match self.ttl {
            None => path.exists(),
            Some(ttl) => fs::metadata(path)
                .and_then(|m| m.modified())
                .map(|mtime| mtime.elapsed().map(|age| age < ttl).unwrap_or(true))
                .unwrap_or(false),
        }
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::Parse(format!("invalid URL {url:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_path_sorts_query_pairs() {
        let cache = UrlCache::new("/tmp/cache", None);
        let a = cache.key_path(&Url::parse("https://example.com/id.php?b=2&a=1").unwrap());
        let b = cache.key_path(&Url::parse("https://example.com/id.php?a=1&b=2").unwrap());
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/tmp/cache/example.com/id.php/a=1&b=2"));
    }

    #[test]
    fn test_key_path_without_query() {
        let cache = UrlCache::new("/tmp/cache", None);
        let path = cache.key_path(&Url::parse("https://example.com/a/b").unwrap());
        assert_eq!(path, PathBuf::from("/tmp/cache/example.com/a/b/index"));
    }

    #[test]
    fn test_store_then_lookup() {
        let dir = TempDir::new().unwrap();
        let cache = UrlCache::new(dir.path(), None);
        let url = "https://example.com/id.php?id=18231";

        assert!(cache.lookup(url).unwrap().is_none());
        cache.store(url, b"page body").unwrap();
        assert_eq!(cache.lookup(url).unwrap().unwrap(), b"page body");
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let dir = TempDir::new().unwrap();
        let cache = UrlCache::new(dir.path(), Some(Duration::ZERO));
        let url = "https://example.com/id.php?id=1";

        cache.store(url, b"stale").unwrap();
        assert!(cache.lookup(url).unwrap().is_none());
    }
}
