//! Game artwork lookup via the GiantBomb search API, memoized per title.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{HOME_TITLE, OFFLINE_TITLE};
use crate::error::{Result, XboxError};

const GIANTBOMB_SEARCH_URL: &str = "https://www.giantbomb.com/api/search/";
const GIANTBOMB_USER_AGENT: &str = "uc-xbox-presence";

/// Third-party title → image search.
#[async_trait]
pub trait ArtworkSearch: Send + Sync {
    /// `Ok(None)` when the search ran but found nothing usable.
    async fn search(&self, title: &str, api_key: &str) -> Result<Option<String>>;
}

pub struct GiantBombSearch {
    client: Client,
    search_url: String,
}

impl GiantBombSearch {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(true)
            .user_agent(GIANTBOMB_USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            search_url: GIANTBOMB_SEARCH_URL.to_string(),
        })
    }

    pub fn with_search_url(mut self, search_url: impl Into<String>) -> Self {
        self.search_url = search_url.into();
        self
    }
}

#[async_trait]
impl ArtworkSearch for GiantBombSearch {
    async fn search(&self, title: &str, api_key: &str) -> Result<Option<String>> {
        let params = [
            ("api_key", api_key),
            ("format", "json"),
            ("query", title),
            ("resources", "game"),
            ("limit", "1"),
        ];
        // The key travels in the query string; keep the URL out of errors.
        let resp = self
            .client
            .get(&self.search_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| XboxError::Http(e.without_url()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(XboxError::Artwork(format!("GiantBomb returned {}", status)));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| XboxError::Http(e.without_url()))?;
        parse_search_response(&body)
    }
}

/// First result's image URL from a GiantBomb search payload.
fn parse_search_response(body: &Value) -> Result<Option<String>> {
    // status_code 1 is OK; anything else carries an error string.
    if let Some(code) = body.get("status_code").and_then(Value::as_i64) {
        if code != 1 {
            let msg = body.get("error").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(XboxError::Artwork(format!("GiantBomb status {}: {}", code, msg)));
        }
    }
    Ok(body
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|first| first.get("image"))
        .and_then(extract_image_url))
}

/// Best available GiantBomb image variant: original, then super, then small.
fn extract_image_url(img: &Value) -> Option<String> {
    ["original_url", "super_url", "small_url"]
        .iter()
        .filter_map(|key| img.get(*key).and_then(Value::as_str))
        .find(|url| !url.is_empty())
        .map(str::to_string)
}

/// Memoizing resolver. Entries are never evicted: the set of titles seen in
/// one process lifetime is small.
pub struct ArtworkResolver {
    search: Arc<dyn ArtworkSearch>,
    cache: Mutex<HashMap<String, String>>,
}

impl ArtworkResolver {
    pub fn new(search: Arc<dyn ArtworkSearch>) -> Self {
        Self {
            search,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Artwork URL for `title`, or empty. Never fails.
    pub async fn resolve(&self, title: &str, api_key: Option<&str>) -> String {
        let Some(api_key) = api_key.map(str::trim).filter(|k| !k.is_empty()) else {
            return String::new();
        };
        if title.is_empty() || title == HOME_TITLE || title == OFFLINE_TITLE {
            return String::new();
        }

        if let Some(hit) = self.cache.lock().await.get(title) {
            debug!(title, cached = %hit, "artwork: cache hit");
            return hit.clone();
        }

        info!(title, "artwork: searching GiantBomb");
        let url = match self.search.search(title, api_key).await {
            Ok(Some(url)) => {
                info!(title, url = %url, "artwork: found");
                url
            }
            Ok(None) => {
                warn!(title, "artwork: no artwork found");
                String::new()
            }
            Err(e) => {
                warn!(title, error = %e, "artwork: lookup failed");
                String::new()
            }
        };

        self.cache
            .lock()
            .await
            .insert(title.to_string(), url.clone());
        url
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSearch {
        calls: AtomicUsize,
        answer: Option<String>,
        fail: bool,
    }

    #[async_trait]
    impl ArtworkSearch for CountingSearch {
        async fn search(&self, _title: &str, _api_key: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(XboxError::Artwork("connection reset".into()));
            }
            Ok(self.answer.clone())
        }
    }

    fn resolver(search: CountingSearch) -> (Arc<CountingSearch>, ArtworkResolver) {
        let search = Arc::new(search);
        (search.clone(), ArtworkResolver::new(search))
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let (search, resolver) = resolver(CountingSearch {
            answer: Some("https://gb/halo.jpg".into()),
            ..Default::default()
        });

        let first = resolver.resolve("Halo Infinite", Some("key")).await;
        let second = resolver.resolve("Halo Infinite", Some("key")).await;

        assert_eq!(first, "https://gb/halo.jpg");
        assert_eq!(second, first);
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_title_or_key_short_circuits() {
        let (search, resolver) = resolver(CountingSearch {
            answer: Some("https://gb/x.jpg".into()),
            ..Default::default()
        });

        assert_eq!(resolver.resolve("", Some("key")).await, "");
        assert_eq!(resolver.resolve("Home", Some("key")).await, "");
        assert_eq!(resolver.resolve("Offline", Some("key")).await, "");
        assert_eq!(resolver.resolve("Halo Infinite", None).await, "");
        assert_eq!(resolver.resolve("Halo Infinite", Some("  ")).await, "");
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.cached_len().await, 0);
    }

    #[tokio::test]
    async fn failures_are_cached_as_empty() {
        let (search, resolver) = resolver(CountingSearch {
            fail: true,
            ..Default::default()
        });

        assert_eq!(resolver.resolve("Starfield", Some("key")).await, "");
        assert_eq!(resolver.resolve("Starfield", Some("key")).await, "");
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_is_cached_too() {
        let (search, resolver) = resolver(CountingSearch::default());
        assert_eq!(resolver.resolve("Obscure Indie", Some("key")).await, "");
        assert_eq!(resolver.resolve("Obscure Indie", Some("key")).await, "");
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_errors_do_not_carry_the_api_key() {
        let search = GiantBombSearch::new()
            .unwrap()
            .with_search_url("http://127.0.0.1:1/api/search/");
        let err = search
            .search("Halo Infinite", "SECRETKEY123")
            .await
            .unwrap_err();
        assert!(matches!(err, XboxError::Http(_)));
        let printed = format!("{err} {err:?}");
        assert!(!printed.contains("SECRETKEY123"), "{printed}");
    }

    #[test]
    fn search_payload_prefers_original_image() {
        let body = json!({
            "error": "OK",
            "status_code": 1,
            "results": [{
                "name": "Halo Infinite",
                "image": {
                    "small_url": "https://gb/small.jpg",
                    "super_url": "https://gb/super.jpg",
                    "original_url": "https://gb/original.jpg"
                }
            }]
        });
        assert_eq!(
            parse_search_response(&body).unwrap().as_deref(),
            Some("https://gb/original.jpg")
        );

        let fallback = json!({"status_code": 1, "results": [{"image": {"original_url": "", "small_url": "https://gb/small.jpg"}}]});
        assert_eq!(
            parse_search_response(&fallback).unwrap().as_deref(),
            Some("https://gb/small.jpg")
        );

        let empty = json!({"status_code": 1, "results": []});
        assert_eq!(parse_search_response(&empty).unwrap(), None);
    }

    #[test]
    fn search_payload_error_status_is_an_error() {
        let body = json!({"error": "Invalid API Key", "status_code": 100, "results": []});
        assert!(matches!(
            parse_search_response(&body),
            Err(XboxError::Artwork(_))
        ));
    }
}
