use serde::{Deserialize, Serialize};

/// Status code DataForSEO uses for "ok", at both envelope and task level.
pub const STATUS_OK: u32 = 20000;

// --- Requests ---

/// Location/language pair sent with every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    pub location_name: String,
    pub language_code: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            location_name: "United States".to_string(),
            language_code: "en".to_string(),
        }
    }
}

/// Task body for `serp/google/organic/live/advanced`.
#[derive(Debug, Clone, Serialize)]
pub struct SerpTask {
    pub keyword: String,
    pub location_name: String,
    pub language_code: String,
    pub depth: u32,
}

impl SerpTask {
    pub fn new(keyword: &str, locale: &Locale, depth: u32) -> Self {
        Self {
            keyword: keyword.to_string(),
            location_name: locale.location_name.clone(),
            language_code: locale.language_code.clone(),
            depth,
        }
    }
}

/// Task body for `dataforseo_labs/google/ranked_keywords/live`.
#[derive(Debug, Clone, Serialize)]
pub struct RankedKeywordsTask {
    pub target: String,
    pub location_name: String,
    pub language_code: String,
    pub limit: u32,
}

impl RankedKeywordsTask {
    pub fn new(target: &str, locale: &Locale, limit: u32) -> Self {
        Self {
            target: target.to_string(),
            location_name: locale.location_name.clone(),
            language_code: locale.language_code.clone(),
            limit,
        }
    }
}

// --- Response envelope ---

/// Every endpoint wraps its payload in `tasks[].result[]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status_code: u32,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub tasks: Option<Vec<Task<T>>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Task<T> {
    #[serde(default)]
    pub status_code: u32,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub result: Option<Vec<Option<T>>>,
}

// --- SERP ---

#[derive(Debug, Clone, Deserialize)]
pub struct SerpResultPage {
    #[serde(default)]
    pub items: Option<Vec<SerpItem>>,
}

/// One element of a results page. Only `organic` items carry a ranking URL
/// we care about; ads, featured snippets etc. share the same list.
#[derive(Debug, Clone, Deserialize)]
pub struct SerpItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub rank_group: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl SerpItem {
    pub fn is_organic(&self) -> bool {
        self.item_type == "organic"
    }
}

// --- Ranked keywords ---

#[derive(Debug, Clone, Deserialize)]
pub struct RankedKeywordsPage {
    #[serde(default)]
    pub items: Option<Vec<RankedKeywordItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankedKeywordItem {
    #[serde(default)]
    pub keyword_data: Option<KeywordData>,
    #[serde(default)]
    pub ranked_serp_element: Option<RankedSerpElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordData {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub keyword_info: Option<KeywordInfo>,
}

/// Volume, CPC and competition are all nullable upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordInfo {
    #[serde(default)]
    pub search_volume: Option<u64>,
    #[serde(default)]
    pub cpc: Option<f64>,
    #[serde(default)]
    pub competition: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankedSerpElement {
    #[serde(default)]
    pub serp_item: Option<RankedSerpItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankedSerpItem {
    #[serde(default)]
    pub rank_group: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
}

impl RankedKeywordItem {
    /// Keyword text, trimmed. Empty when the item carried none.
    pub fn keyword(&self) -> &str {
        self.keyword_data
            .as_ref()
            .and_then(|d| d.keyword.as_deref())
            .unwrap_or_default()
            .trim()
    }

    /// Rank group of the target URL for this keyword, 0 when unknown.
    pub fn position(&self) -> u32 {
        self.ranked_serp_element
            .as_ref()
            .and_then(|e| e.serp_item.as_ref())
            .and_then(|s| s.rank_group)
            .unwrap_or(0)
    }

    pub fn keyword_info(&self) -> KeywordInfo {
        self.keyword_data
            .as_ref()
            .and_then(|d| d.keyword_info.clone())
            .unwrap_or_default()
    }
}
