use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum organic results kept per SERP.
pub const SERP_DEPTH: usize = 10;

/// Ordered organic result URLs for one keyword, rank order.
pub type SerpResult = Vec<String>;

// --- Ranked keywords ---

/// A keyword the source URL ranks for. Nullable upstream metrics are zeroed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedKeywordRecord {
    pub keyword: String,
    pub position: u32,
    pub search_volume: u64,
    pub cpc: f64,
    pub competition: f64,
}

impl RankedKeywordRecord {
    /// Only top-10 positions with keyword text survive the ranked-keyword client.
    pub fn is_top_ten(&self) -> bool {
        (1..=10).contains(&self.position) && !self.keyword.trim().is_empty()
    }
}

/// Ranked keyword after dedup: one record per keyword text, best position kept.
pub type CandidateKeyword = RankedKeywordRecord;

// --- Pipeline output ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportingKeyword {
    pub keyword: String,
    /// Share of the seed SERP this keyword reproduces, one decimal place.
    pub overlap_percentage: f64,
    pub search_volume: u64,
    pub cpc: f64,
    pub position: u32,
    pub top_10_urls: SerpResult,
    /// Normalized seed URLs also present in `top_10_urls`.
    pub matching_urls: Vec<String>,
}

/// How far a research run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchOutcome {
    Complete,
    /// The seed keyword returned no organic results.
    NoSeedData,
    /// The top three seed URLs yielded no top-10 ranking keywords.
    NoCandidates,
}

impl ResearchOutcome {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            ResearchOutcome::Complete => None,
            ResearchOutcome::NoSeedData => Some("Failed to get top 10 URLs for the keyword"),
            ResearchOutcome::NoCandidates => Some("No ranking keywords found for the top 3 URLs"),
        }
    }
}

/// Everything one research run produced, whichever stage it stopped at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub input_keyword: String,
    pub outcome: ResearchOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub original_top_10_urls: SerpResult,
    /// Sorted candidates, capped for reporting.
    pub keywords_from_top_3_urls: Vec<CandidateKeyword>,
    /// Candidate count before the reporting cap.
    pub total_candidates: usize,
    pub supporting_keywords: Vec<SupportingKeyword>,
    pub total_supporting_keywords_found: usize,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ResearchResult {
    pub fn is_complete(&self) -> bool {
        self.outcome == ResearchOutcome::Complete
    }
}
