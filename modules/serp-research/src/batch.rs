//! Batch coordinator: the research pipeline over many seed keywords.
//!
//! Each seed runs on its own tokio task with at most `workers` in flight.
//! Errors and panics inside one run become a failed outcome for that seed and
//! never touch its siblings. Exactly one outcome comes back per seed, in input
//! order.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::cache::cache_key;
use crate::config::ResearchConfig;
use crate::context::ResearchContext;
use crate::pipeline::ResearchPipeline;
use crate::traits::SearchProvider;
use crate::types::{ResearchOutcome, ResearchResult};

/// Cache operation name for whole research results.
pub const FULL_RESEARCH_OPERATION: &str = "full_research";

/// Progress is logged every this many completions, and on the last one.
const PROGRESS_EVERY: usize = 5;

/// One seed keyword as read from the input, with the rest of its row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedKeyword {
    /// 1-based data row in the input file.
    pub row_number: usize,
    pub keyword: String,
    /// Every column of the input row, header order.
    #[serde(default)]
    pub original_row: Vec<(String, String)>,
}

impl SeedKeyword {
    pub fn new(row_number: usize, keyword: &str) -> Self {
        Self {
            row_number,
            keyword: keyword.to_string(),
            original_row: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemOutcome {
    /// Index into the submitted list.
    pub position: usize,
    pub row_number: usize,
    pub seed_keyword: String,
    pub research_successful: bool,
    pub error_message: Option<String>,
    pub processing_time_ms: u64,
    pub result: Option<ResearchResult>,
    #[serde(skip)]
    pub original_row: Vec<(String, String)>,
}

impl BatchItemOutcome {
    pub fn supporting_keywords_found(&self) -> usize {
        self.result
            .as_ref()
            .map_or(0, |r| r.total_supporting_keywords_found)
    }

    fn from_result(
        position: usize,
        seed: SeedKeyword,
        result: ResearchResult,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            position,
            row_number: seed.row_number,
            seed_keyword: seed.keyword,
            research_successful: result.outcome != ResearchOutcome::NoSeedData,
            error_message: result.error.clone(),
            processing_time_ms: elapsed_ms,
            result: Some(result),
            original_row: seed.original_row,
        }
    }

    fn failed(position: usize, seed: SeedKeyword, message: String, elapsed_ms: u64) -> Self {
        Self {
            position,
            row_number: seed.row_number,
            seed_keyword: seed.keyword,
            research_successful: false,
            error_message: Some(message),
            processing_time_ms: elapsed_ms,
            result: None,
            original_row: seed.original_row,
        }
    }
}

pub struct BatchCoordinator {
    pipeline: Arc<ResearchPipeline>,
    ctx: Arc<ResearchContext>,
    identity: String,
    workers: usize,
    max_keywords: Option<usize>,
}

impl BatchCoordinator {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        ctx: Arc<ResearchContext>,
        config: &ResearchConfig,
    ) -> Self {
        let identity = provider.identity().to_string();
        Self {
            pipeline: Arc::new(ResearchPipeline::new(provider, ctx.clone(), config)),
            ctx,
            identity,
            workers: config.workers.max(1),
            max_keywords: None,
        }
    }

    /// Only the first `max` seeds of each batch are processed.
    pub fn with_max_keywords(mut self, max: Option<usize>) -> Self {
        self.max_keywords = max;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Research every seed. Returns one outcome per processed seed, sorted by
    /// input position.
    pub async fn process_batch(&self, seeds: Vec<SeedKeyword>) -> Vec<BatchItemOutcome> {
        let seeds: Vec<SeedKeyword> = match self.max_keywords {
            Some(max) => seeds.into_iter().take(max).collect(),
            None => seeds,
        };
        let total = seeds.len();
        self.ctx.metrics.record_batch_items(total as u64);
        info!(total, workers = self.workers, "Starting batch research");

        let started = Instant::now();
        let mut in_flight = stream::iter(
            seeds
                .into_iter()
                .enumerate()
                .map(|(position, seed)| self.run_item(position, seed)),
        )
        .buffer_unordered(self.workers);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = in_flight.next().await {
            outcomes.push(outcome);
            let completed = outcomes.len();
            if completed % PROGRESS_EVERY == 0 || completed == total {
                let elapsed = started.elapsed().as_secs_f64();
                let per_minute = if elapsed > 0.0 {
                    completed as f64 / (elapsed / 60.0)
                } else {
                    0.0
                };
                info!(
                    completed,
                    total,
                    keywords_per_minute = format!("{per_minute:.1}").as_str(),
                    "Batch progress"
                );
            }
        }

        outcomes.sort_by_key(|o| o.position);
        outcomes
    }

    async fn run_item(&self, position: usize, seed: SeedKeyword) -> BatchItemOutcome {
        let pipeline = self.pipeline.clone();
        let ctx = self.ctx.clone();
        let key = cache_key(&seed.keyword, FULL_RESEARCH_OPERATION, &self.identity);
        let keyword = seed.keyword.clone();
        let started = Instant::now();

        info!(keyword = keyword.as_str(), row = seed.row_number, "Processing seed keyword");
        let handle = tokio::spawn(async move {
            ctx.cache
                .get_or_try_compute(&key, || async move { pipeline.research(&keyword).await })
                .await
        });
        let joined = handle.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match joined {
            Ok(Ok(result)) => {
                info!(
                    keyword = seed.keyword.as_str(),
                    supporting = result.total_supporting_keywords_found,
                    outcome = ?result.outcome,
                    "Completed seed keyword"
                );
                BatchItemOutcome::from_result(position, seed, result, elapsed_ms)
            }
            Ok(Err(e)) => {
                error!(keyword = seed.keyword.as_str(), error = %e, "Research failed");
                BatchItemOutcome::failed(position, seed, format!("{e:#}"), elapsed_ms)
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    format!("research panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    format!("research task cancelled: {join_err}")
                };
                error!(keyword = seed.keyword.as_str(), error = message.as_str(), "Research task died");
                BatchItemOutcome::failed(position, seed, message, elapsed_ms)
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
