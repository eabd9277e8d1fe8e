//! Research pipeline: seed SERP, candidate harvesting, supporting-keyword
//! selection.
//!
//! Stages run strictly in order and never retract. Whatever stage a run stops
//! at, the returned [`ResearchResult`] carries every artifact gathered so far.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::clients::{RankedKeywordClient, SerpClient};
use crate::config::ResearchConfig;
use crate::context::ResearchContext;
use crate::traits::SearchProvider;
use crate::types::{
    CandidateKeyword, RankedKeywordRecord, ResearchOutcome, ResearchResult, SerpResult,
    SupportingKeyword,
};
use crate::urls::{matching_urls, url_overlap};

/// Seed URLs whose ranking keywords are harvested.
pub const HARVEST_URLS: usize = 3;
/// Candidates kept on the result for reporting.
pub const REPORTED_CANDIDATES: usize = 20;
/// Minimum overlap, in percent, for a candidate to be accepted.
pub const MIN_OVERLAP_PERCENT: f64 = 40.0;
/// Selection stops once this many supporting keywords are found.
pub const MAX_SUPPORTING_KEYWORDS: usize = 4;

pub struct ResearchPipeline {
    serp: SerpClient,
    ranked: RankedKeywordClient,
    step_delay: Duration,
}

impl ResearchPipeline {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        ctx: Arc<ResearchContext>,
        config: &ResearchConfig,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            serp: SerpClient::new(provider.clone(), ctx.clone(), retry),
            ranked: RankedKeywordClient::new(provider, ctx, retry),
            step_delay: config.step_delay,
        }
    }

    /// Run all three stages for `keyword`.
    ///
    /// "No data" conditions come back as an outcome on the result. Only a
    /// blank keyword is an error.
    pub async fn research(&self, keyword: &str) -> Result<ResearchResult> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            bail!("Seed keyword must not be empty");
        }

        let started = Instant::now();
        info!(keyword, "Starting keyword research");

        // Stage 1: seed resolution
        let seed_urls = self.serp.fetch_top_urls(keyword).await;
        if seed_urls.is_empty() {
            warn!(keyword, "No organic results for seed keyword");
            return Ok(finish(
                keyword,
                ResearchOutcome::NoSeedData,
                seed_urls,
                Vec::new(),
                Vec::new(),
                started,
            ));
        }
        info!(keyword, urls = seed_urls.len(), "Stage 1 complete: seed SERP resolved");

        // Stage 2: candidate harvesting
        let candidates = self.harvest_candidates(keyword, &seed_urls).await;
        if candidates.is_empty() {
            warn!(keyword, "No top-10 ranking keywords for the top seed URLs");
            return Ok(finish(
                keyword,
                ResearchOutcome::NoCandidates,
                seed_urls,
                candidates,
                Vec::new(),
                started,
            ));
        }
        info!(keyword, candidates = candidates.len(), "Stage 2 complete: candidates harvested");

        // Stage 3: supporting-keyword selection
        let supporting = self.select_supporting(keyword, &seed_urls, &candidates).await;
        info!(
            keyword,
            supporting = supporting.len(),
            "Stage 3 complete: supporting keywords selected"
        );

        Ok(finish(
            keyword,
            ResearchOutcome::Complete,
            seed_urls,
            candidates,
            supporting,
            started,
        ))
    }

    async fn harvest_candidates(
        &self,
        keyword: &str,
        seed_urls: &[String],
    ) -> Vec<CandidateKeyword> {
        let mut records = Vec::new();
        for (i, url) in seed_urls.iter().take(HARVEST_URLS).enumerate() {
            if i > 0 {
                self.pause().await;
            }
            let ranked = self.ranked.fetch_ranked_keywords(url).await;
            debug!(keyword, url = url.as_str(), count = ranked.len(), "Harvested ranked keywords");
            records.extend(ranked);
        }

        let mut candidates = dedup_candidates(records);
        sort_candidates(&mut candidates);
        candidates
    }

    async fn select_supporting(
        &self,
        keyword: &str,
        seed_urls: &[String],
        candidates: &[CandidateKeyword],
    ) -> Vec<SupportingKeyword> {
        let mut supporting = Vec::new();

        for (i, candidate) in candidates.iter().enumerate() {
            if supporting.len() >= MAX_SUPPORTING_KEYWORDS {
                break;
            }
            if i > 0 {
                self.pause().await;
            }

            let candidate_urls = self.serp.fetch_top_urls(&candidate.keyword).await;
            if candidate_urls.is_empty() {
                debug!(keyword, candidate = candidate.keyword.as_str(), "Candidate has no SERP, skipped");
                continue;
            }

            let overlap = url_overlap(seed_urls, &candidate_urls);
            if overlap >= MIN_OVERLAP_PERCENT {
                info!(
                    keyword,
                    candidate = candidate.keyword.as_str(),
                    overlap = round_one_decimal(overlap),
                    "Accepted supporting keyword"
                );
                supporting.push(SupportingKeyword {
                    keyword: candidate.keyword.clone(),
                    overlap_percentage: round_one_decimal(overlap),
                    search_volume: candidate.search_volume,
                    cpc: candidate.cpc,
                    position: candidate.position,
                    matching_urls: matching_urls(seed_urls, &candidate_urls),
                    top_10_urls: candidate_urls,
                });
            } else {
                debug!(
                    keyword,
                    candidate = candidate.keyword.as_str(),
                    overlap = round_one_decimal(overlap),
                    "Insufficient overlap"
                );
            }
        }

        supporting
    }

    async fn pause(&self) {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
    }
}

/// One record per keyword text, keeping the best (lowest) position.
/// On equal positions the first-seen record wins. First-seen order is kept.
pub fn dedup_candidates(records: Vec<RankedKeywordRecord>) -> Vec<CandidateKeyword> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<CandidateKeyword> = Vec::new();

    for record in records {
        match index.get(&record.keyword).copied() {
            Some(i) => {
                if record.position < unique[i].position {
                    unique[i] = record;
                }
            }
            None => {
                index.insert(record.keyword.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}

/// Search volume descending, then CPC descending. Stable.
pub fn sort_candidates(candidates: &mut [CandidateKeyword]) {
    candidates.sort_by(|a, b| {
        b.search_volume
            .cmp(&a.search_volume)
            .then_with(|| b.cpc.total_cmp(&a.cpc))
    });
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn finish(
    keyword: &str,
    outcome: ResearchOutcome,
    original_top_10_urls: SerpResult,
    mut candidates: Vec<CandidateKeyword>,
    supporting_keywords: Vec<SupportingKeyword>,
    started: Instant,
) -> ResearchResult {
    let total_candidates = candidates.len();
    candidates.truncate(REPORTED_CANDIDATES);

    ResearchResult {
        input_keyword: keyword.to_string(),
        outcome,
        error: outcome.message().map(str::to_string),
        original_top_10_urls,
        keywords_from_top_3_urls: candidates,
        total_candidates,
        total_supporting_keywords_found: supporting_keywords.len(),
        supporting_keywords,
        processing_time_ms: started.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    }
}
