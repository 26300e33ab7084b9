use dashmap::DashMap;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::data::cache::KvCache;
use crate::data::types::{Bet, MarketMetadata};

const PAGE_LIMIT: usize = 1000;

/// Client for the Manifold v0 API: paginated trade history plus market
/// metadata, memoized in the persistent cache.
pub struct ManifoldClient {
    client: Client,
    base_url: String,
    /// Slugs with a pagination currently in progress. A second fetch for
    /// the same slug while one is suspended would interleave cursors and
    /// corrupt the cached history, so it is rejected outright.
    in_flight: DashMap<String, ()>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("fetch already in flight for {0}")]
    AlreadyInFlight(String),
}

impl ManifoldClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            in_flight: DashMap::new(),
        }
    }

    /// Full trade history plus metadata for a market.
    ///
    /// The first successful fetch for a slug is frozen in the cache; later
    /// calls return the cached copy without touching the network until
    /// `KvCache::bust_bets` clears it. A failure anywhere aborts the whole
    /// fetch with nothing written, so the caller's chart state stays intact.
    pub async fn fetch_history(
        &self,
        slug: &str,
        cache: &KvCache,
    ) -> Result<(Vec<Bet>, MarketMetadata), FetchError> {
        if self.in_flight.insert(slug.to_string(), ()).is_some() {
            return Err(FetchError::AlreadyInFlight(slug.to_string()));
        }
        let result = self.fetch_history_inner(slug, cache).await;
        self.in_flight.remove(slug);
        result
    }

    async fn fetch_history_inner(
        &self,
        slug: &str,
        cache: &KvCache,
    ) -> Result<(Vec<Bet>, MarketMetadata), FetchError> {
        let bets_key = KvCache::bets_key(slug);
        let meta_key = format!("meta_{}", slug);

        if let Some(cached) = cache.get(&bets_key) {
            match serde_json::from_str::<Vec<Bet>>(&cached) {
                Ok(bets) => {
                    let metadata = cache
                        .get(&meta_key)
                        .and_then(|raw| serde_json::from_str(&raw).ok());
                    if let Some(metadata) = metadata {
                        debug!("serving {} cached bets for {}", bets.len(), slug);
                        return Ok((bets, metadata));
                    }
                }
                Err(e) => warn!("discarding corrupt cached history for {}: {}", slug, e),
            }
        }

        let bets = self.paginate_bets(slug).await?;
        let metadata = self.fetch_metadata(slug).await?;
        info!("fetched {} bets for {}", bets.len(), slug);

        // Persistence failures degrade silently; the fetched data is still
        // good for this session.
        if let Ok(json) = serde_json::to_string(&bets) {
            if let Err(e) = cache.set(&bets_key, &json) {
                warn!("failed to cache history for {}: {}", slug, e);
            }
        }
        if let Ok(json) = serde_json::to_string(&metadata) {
            if let Err(e) = cache.set(&meta_key, &json) {
                warn!("failed to cache metadata for {}: {}", slug, e);
            }
        }

        Ok((bets, metadata))
    }

    /// Cursor pagination: pages of up to 1000 bets sorted by recency, the
    /// next cursor being the last id of the previous page, until an empty
    /// page. Best effort, no retry.
    async fn paginate_bets(&self, slug: &str) -> Result<Vec<Bet>, FetchError> {
        let url = format!("{}/bets", self.base_url);
        let limit = PAGE_LIMIT.to_string();
        let mut all_bets: Vec<Bet> = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("contractSlug", slug), ("limit", limit.as_str())]);
            if let Some(cursor) = &before {
                request = request.query(&[("before", cursor.as_str())]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(FetchError::Status(response.status().as_u16()));
            }

            let page: Vec<Bet> = response.json().await?;
            if page.is_empty() {
                break;
            }

            before = Some(page[page.len() - 1].id.clone());
            all_bets.extend(page);
        }

        Ok(all_bets)
    }

    async fn fetch_metadata(&self, slug: &str) -> Result<MarketMetadata, FetchError> {
        let url = format!("{}/slug/{}", self.base_url, slug);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(id: &str, t: i64) -> Bet {
        Bet {
            id: id.to_string(),
            created_time: t,
            prob_before: 0.5,
            prob_after: 0.5,
        }
    }

    #[tokio::test]
    async fn test_cached_history_skips_network() {
        // Unroutable base URL: any network attempt would error out.
        let client = ManifoldClient::new("http://127.0.0.1:1".to_string());
        let cache = KvCache::open_in_memory().unwrap();

        let bets = vec![bet("a", 1), bet("b", 2)];
        cache
            .set(&KvCache::bets_key("s"), &serde_json::to_string(&bets).unwrap())
            .unwrap();
        let meta = MarketMetadata {
            question: "Will it?".to_string(),
            url: String::new(),
        };
        cache
            .set("meta_s", &serde_json::to_string(&meta).unwrap())
            .unwrap();

        let (got, metadata) = client.fetch_history("s", &cache).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(metadata.question, "Will it?");
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_cache_untouched() {
        let client = ManifoldClient::new("http://127.0.0.1:1".to_string());
        let cache = KvCache::open_in_memory().unwrap();

        let result = client.fetch_history("missing", &cache).await;
        assert!(result.is_err());
        assert_eq!(cache.get(&KvCache::bets_key("missing")), None);
    }

    #[tokio::test]
    async fn test_guard_released_after_failed_fetch() {
        let client = ManifoldClient::new("http://127.0.0.1:1".to_string());
        let cache = KvCache::open_in_memory().unwrap();

        assert!(client.fetch_history("s", &cache).await.is_err());
        // The slug must be fetchable again once the first attempt resolves.
        assert!(!matches!(
            client.fetch_history("s", &cache).await,
            Err(FetchError::AlreadyInFlight(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_discarded() {
        let client = ManifoldClient::new("http://127.0.0.1:1".to_string());
        let cache = KvCache::open_in_memory().unwrap();
        cache.set(&KvCache::bets_key("s"), "not json").unwrap();

        // Falls through to the network, which fails here; the point is
        // that the corrupt entry does not panic or get served.
        assert!(matches!(
            client.fetch_history("s", &cache).await,
            Err(FetchError::Http(_)) | Err(FetchError::Status(_))
        ));
    }
}
