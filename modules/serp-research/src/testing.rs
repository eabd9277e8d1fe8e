// Test mocks for the research pipeline.
//
// MockProvider stands in for the search service behind SearchProvider:
// HashMap-based keyword→URLs and URL→ranked keywords, with call counters,
// scripted failures and a panic hook for isolation tests.
//
// Plus helpers for building URL lists and ranked keyword records.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dataforseo_client::{DataForSeoError, Result};

use crate::traits::SearchProvider;
use crate::types::{RankedKeywordRecord, SerpResult};

/// Builds the error a scripted failure returns.
pub type ErrorFactory = fn() -> DataForSeoError;

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Unregistered keywords and URLs answer with an empty list, the way the
/// real service answers a query it has no data for.
/// Builder pattern: `.on_serp()`, `.on_ranked()`, `.fail_serp_times()`, `.panic_on()`.
pub struct MockProvider {
    identity: String,
    serps: HashMap<String, SerpResult>,
    ranked: HashMap<String, Vec<RankedKeywordRecord>>,
    panics: Vec<String>,
    serp_failures: Mutex<HashMap<String, (u32, ErrorFactory)>>,
    ranked_failures: Mutex<HashMap<String, (u32, ErrorFactory)>>,
    serp_calls: Mutex<HashMap<String, u32>>,
    ranked_calls: Mutex<HashMap<String, u32>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            identity: "mock@example.com".to_string(),
            serps: HashMap::new(),
            ranked: HashMap::new(),
            panics: Vec::new(),
            serp_failures: Mutex::new(HashMap::new()),
            ranked_failures: Mutex::new(HashMap::new()),
            serp_calls: Mutex::new(HashMap::new()),
            ranked_calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = identity.to_string();
        self
    }

    pub fn on_serp(mut self, keyword: &str, urls: SerpResult) -> Self {
        self.serps.insert(keyword.to_string(), urls);
        self
    }

    pub fn on_ranked(mut self, url: &str, records: Vec<RankedKeywordRecord>) -> Self {
        self.ranked.insert(url.to_string(), records);
        self
    }

    /// The next `times` SERP calls for `keyword` fail with `error()`.
    pub fn fail_serp_times(self, keyword: &str, times: u32, error: ErrorFactory) -> Self {
        self.serp_failures
            .lock()
            .unwrap()
            .insert(keyword.to_string(), (times, error));
        self
    }

    /// The next `times` ranked-keyword calls for `url` fail with `error()`.
    pub fn fail_ranked_times(self, url: &str, times: u32, error: ErrorFactory) -> Self {
        self.ranked_failures
            .lock()
            .unwrap()
            .insert(url.to_string(), (times, error));
        self
    }

    /// SERP lookups for `keyword` panic.
    pub fn panic_on(mut self, keyword: &str) -> Self {
        self.panics.push(keyword.to_string());
        self
    }

    pub fn serp_calls(&self, keyword: &str) -> u32 {
        self.serp_calls
            .lock()
            .unwrap()
            .get(keyword)
            .copied()
            .unwrap_or(0)
    }

    pub fn ranked_calls(&self, url: &str) -> u32 {
        self.ranked_calls
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        let serp: u32 = self.serp_calls.lock().unwrap().values().sum();
        let ranked: u32 = self.ranked_calls.lock().unwrap().values().sum();
        serp + ranked
    }

    fn scripted_failure(
        failures: &Mutex<HashMap<String, (u32, ErrorFactory)>>,
        key: &str,
    ) -> Option<DataForSeoError> {
        let mut failures = failures.lock().unwrap();
        let (remaining, error) = failures.get_mut(key)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(error())
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    async fn top_organic_urls(&self, keyword: &str, depth: u32) -> Result<SerpResult> {
        *self
            .serp_calls
            .lock()
            .unwrap()
            .entry(keyword.to_string())
            .or_default() += 1;

        if self.panics.iter().any(|k| k == keyword) {
            panic!("MockProvider: scripted panic for {keyword}");
        }
        if let Some(err) = Self::scripted_failure(&self.serp_failures, keyword) {
            return Err(err);
        }

        Ok(self
            .serps
            .get(keyword)
            .map(|urls| urls.iter().take(depth as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn ranked_keywords(&self, url: &str, limit: u32) -> Result<Vec<RankedKeywordRecord>> {
        *self
            .ranked_calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        if let Some(err) = Self::scripted_failure(&self.ranked_failures, url) {
            return Err(err);
        }

        Ok(self
            .ranked
            .get(url)
            .map(|records| records.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn urls(list: &[&str]) -> SerpResult {
    list.iter().map(|u| u.to_string()).collect()
}

/// Ranked keyword with zero competition.
pub fn record(keyword: &str, position: u32, search_volume: u64, cpc: f64) -> RankedKeywordRecord {
    RankedKeywordRecord {
        keyword: keyword.to_string(),
        position,
        search_volume,
        cpc,
        competition: 0.0,
    }
}

/// `count` distinct URLs on `host`, e.g. `https://host/p0 … /p{count-1}`.
pub fn numbered_urls(host: &str, count: usize) -> SerpResult {
    (0..count).map(|i| format!("https://{host}/p{i}")).collect()
}
