// Trait seam between the research pipeline and the external search service.
//
// DataForSeoClient is the production implementation; tests swap in
// MockProvider (see testing.rs) for deterministic, offline runs.

use async_trait::async_trait;
use dataforseo_client::{DataForSeoClient, Locale, Result};

use crate::types::{RankedKeywordRecord, SerpResult};

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Organic result URLs for `keyword`, rank order, at most `depth` of them.
    async fn top_organic_urls(&self, keyword: &str, depth: u32) -> Result<SerpResult>;

    /// Keywords `url` ranks for, unfiltered, at most `limit` of them.
    async fn ranked_keywords(&self, url: &str, limit: u32) -> Result<Vec<RankedKeywordRecord>>;

    /// Account the calls are billed to. Part of every cache key.
    fn identity(&self) -> &str;
}

/// DataForSEO behind the provider seam, pinned to one locale.
pub struct DataForSeoProvider {
    client: DataForSeoClient,
    locale: Locale,
}

impl DataForSeoProvider {
    pub fn new(client: DataForSeoClient, locale: Locale) -> Self {
        Self { client, locale }
    }
}

#[async_trait]
impl SearchProvider for DataForSeoProvider {
    async fn top_organic_urls(&self, keyword: &str, depth: u32) -> Result<SerpResult> {
        let items = self.client.serp_organic(keyword, &self.locale, depth).await?;
        Ok(items
            .into_iter()
            .filter(|item| item.is_organic())
            .filter_map(|item| item.url)
            .filter(|url| !url.is_empty())
            .take(depth as usize)
            .collect())
    }

    async fn ranked_keywords(&self, url: &str, limit: u32) -> Result<Vec<RankedKeywordRecord>> {
        let items = self.client.ranked_keywords(url, &self.locale, limit).await?;
        Ok(items
            .iter()
            .map(|item| {
                let info = item.keyword_info();
                RankedKeywordRecord {
                    keyword: item.keyword().to_string(),
                    position: item.position(),
                    search_volume: info.search_volume.unwrap_or(0),
                    cpc: info.cpc.unwrap_or(0.0),
                    competition: info.competition.unwrap_or(0.0),
                }
            })
            .collect())
    }

    fn identity(&self) -> &str {
        self.client.login()
    }
}
