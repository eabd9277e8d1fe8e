//! Report shapes for batch and single-keyword runs.
//!
//! Pure builders only; [`crate::files`] does the writing.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::BatchItemOutcome;
use crate::metrics::MetricsSnapshot;
use crate::types::ResearchResult;

// --- Batch summary JSON ---

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_processing_summary: ProcessingSummary,
    pub performance_metrics: PerformanceMetrics,
    pub successful_keywords: Vec<SuccessfulKeyword>,
    pub failed_keywords: Vec<FailedKeyword>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingSummary {
    pub total_keywords_processed: usize,
    pub successful_researches: usize,
    pub failed_researches: usize,
    pub total_supporting_keywords_found: usize,
    pub average_processing_time_seconds: f64,
    pub total_processing_time_seconds: f64,
    pub keywords_per_minute: f64,
    pub processing_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub total_api_calls: u64,
    pub cache_hits: u64,
    pub cache_hit_rate: f64,
    pub parallel_workers: usize,
    pub cache_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessfulKeyword {
    pub seed_keyword: String,
    pub supporting_keywords_found: usize,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedKeyword {
    pub seed_keyword: String,
    pub error_message: Option<String>,
}

impl BatchSummary {
    pub fn build(
        outcomes: &[BatchItemOutcome],
        metrics: &MetricsSnapshot,
        elapsed: Duration,
        workers: usize,
        cache_ttl_hours: i64,
    ) -> Self {
        let (successful, failed): (Vec<&BatchItemOutcome>, Vec<&BatchItemOutcome>) =
            outcomes.iter().partition(|o| o.research_successful);

        let total_supporting = successful
            .iter()
            .map(|o| o.supporting_keywords_found())
            .sum();
        let average_ms = if outcomes.is_empty() {
            0.0
        } else {
            outcomes.iter().map(|o| o.processing_time_ms as f64).sum::<f64>()
                / outcomes.len() as f64
        };
        let total_secs = elapsed.as_secs_f64();
        let per_minute = if total_secs > 0.0 {
            outcomes.len() as f64 / (total_secs / 60.0)
        } else {
            0.0
        };

        Self {
            batch_processing_summary: ProcessingSummary {
                total_keywords_processed: outcomes.len(),
                successful_researches: successful.len(),
                failed_researches: failed.len(),
                total_supporting_keywords_found: total_supporting,
                average_processing_time_seconds: round2(average_ms / 1000.0),
                total_processing_time_seconds: round2(total_secs),
                keywords_per_minute: round2(per_minute),
                processing_timestamp: Utc::now(),
            },
            performance_metrics: PerformanceMetrics {
                total_api_calls: metrics.api_calls,
                cache_hits: metrics.cache_hits,
                cache_hit_rate: round2(metrics.cache_hit_rate()),
                parallel_workers: workers,
                cache_ttl_hours,
            },
            successful_keywords: successful
                .iter()
                .map(|o| SuccessfulKeyword {
                    seed_keyword: o.seed_keyword.clone(),
                    supporting_keywords_found: o.supporting_keywords_found(),
                    processing_time_seconds: seconds(o.processing_time_ms),
                })
                .collect(),
            failed_keywords: failed
                .iter()
                .map(|o| FailedKeyword {
                    seed_keyword: o.seed_keyword.clone(),
                    error_message: o.error_message.clone(),
                })
                .collect(),
        }
    }
}

// --- Batch CSV ---

/// Header plus rows, every row as long as the header.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

const BASE_COLUMNS: [&str; 8] = [
    "row_number",
    "seed_keyword",
    "research_successful",
    "error_message",
    "processing_time_seconds",
    "original_top_10_urls_count",
    "keywords_from_top_3_urls_count",
    "supporting_keywords_found",
];

/// One row per outcome. Supporting keyword columns run up to the widest
/// result; input columns follow as `original_<name>`, sorted.
pub fn batch_table(outcomes: &[BatchItemOutcome]) -> CsvTable {
    let max_supporting = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref())
        .map(|r| r.supporting_keywords.len())
        .max()
        .unwrap_or(0);

    let mut headers: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    for n in 1..=max_supporting {
        headers.push(format!("supporting_keyword_{n}"));
        headers.push(format!("supporting_keyword_{n}_overlap"));
        headers.push(format!("supporting_keyword_{n}_volume"));
        headers.push(format!("supporting_keyword_{n}_cpc"));
    }
    let original_columns: BTreeSet<String> = outcomes
        .iter()
        .flat_map(|o| o.original_row.iter().map(|(k, _)| format!("original_{k}")))
        .collect();
    headers.extend(original_columns);

    let rows = outcomes
        .iter()
        .map(|o| {
            let cells = row_cells(o);
            headers
                .iter()
                .map(|h| cells.get(h).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    CsvTable { headers, rows }
}

fn row_cells(outcome: &BatchItemOutcome) -> HashMap<String, String> {
    let mut cells = HashMap::new();
    cells.insert("row_number".to_string(), outcome.row_number.to_string());
    cells.insert("seed_keyword".to_string(), outcome.seed_keyword.clone());
    cells.insert(
        "research_successful".to_string(),
        outcome.research_successful.to_string(),
    );
    cells.insert(
        "error_message".to_string(),
        outcome.error_message.clone().unwrap_or_default(),
    );
    cells.insert(
        "processing_time_seconds".to_string(),
        format!("{:.2}", seconds(outcome.processing_time_ms)),
    );

    let result = outcome.result.as_ref();
    cells.insert(
        "original_top_10_urls_count".to_string(),
        result.map_or(0, |r| r.original_top_10_urls.len()).to_string(),
    );
    cells.insert(
        "keywords_from_top_3_urls_count".to_string(),
        result.map_or(0, |r| r.keywords_from_top_3_urls.len()).to_string(),
    );
    cells.insert(
        "supporting_keywords_found".to_string(),
        outcome.supporting_keywords_found().to_string(),
    );

    if let Some(result) = result {
        for (i, sk) in result.supporting_keywords.iter().enumerate() {
            let n = i + 1;
            cells.insert(format!("supporting_keyword_{n}"), sk.keyword.clone());
            cells.insert(
                format!("supporting_keyword_{n}_overlap"),
                format_percent(sk.overlap_percentage),
            );
            cells.insert(
                format!("supporting_keyword_{n}_volume"),
                sk.search_volume.to_string(),
            );
            cells.insert(format!("supporting_keyword_{n}_cpc"), format_cpc(sk.cpc));
        }
    }

    for (column, value) in &outcome.original_row {
        cells.insert(format!("original_{column}"), value.clone());
    }

    cells
}

// --- Single keyword ---

/// Supporting keywords followed by a SUMMARY block, for the single-keyword CSV.
pub fn research_table(result: &ResearchResult) -> CsvTable {
    let headers = ["Keyword", "Search Volume", "CPC", "Overlap %", "Matching URLs", "Position"]
        .iter()
        .map(|h| h.to_string())
        .collect();

    let seed_count = result.original_top_10_urls.len();
    let mut rows: Vec<Vec<String>> = result
        .supporting_keywords
        .iter()
        .enumerate()
        .map(|(i, sk)| {
            vec![
                sk.keyword.clone(),
                sk.search_volume.to_string(),
                format_cpc(sk.cpc),
                format_percent(sk.overlap_percentage),
                format!("{}/{}", sk.matching_urls.len(), seed_count),
                (i + 1).to_string(),
            ]
        })
        .collect();

    rows.push(Vec::new());
    rows.push(vec!["SUMMARY".to_string()]);
    rows.push(vec!["Input Keyword".to_string(), result.input_keyword.clone()]);
    rows.push(vec![
        "Total Supporting Keywords Found".to_string(),
        result.total_supporting_keywords_found.to_string(),
    ]);
    rows.push(vec![
        "Processing Time (seconds)".to_string(),
        format!("{:.2}", seconds(result.processing_time_ms)),
    ]);
    rows.push(vec![
        "Original Top 10 URLs Count".to_string(),
        seed_count.to_string(),
    ]);
    rows.push(vec![
        "Keywords from Top 3 URLs Count".to_string(),
        result.keywords_from_top_3_urls.len().to_string(),
    ]);

    CsvTable { headers, rows }
}

/// Human-readable summary printed after a single-keyword run.
pub fn research_summary(result: &ResearchResult) -> String {
    let rule = "=".repeat(60);
    let mut out = format!(
        "{rule}\nKEYWORD RESEARCH RESULTS\n{rule}\n\
         Input Keyword: {}\n\
         Original Top 10 URLs: {}\n\
         Keywords from Top 3 URLs: {}\n\
         Supporting Keywords Found: {}\n\
         Processing Time: {:.2}s\n",
        result.input_keyword,
        result.original_top_10_urls.len(),
        result.keywords_from_top_3_urls.len(),
        result.total_supporting_keywords_found,
        seconds(result.processing_time_ms),
    );
    if let Some(error) = &result.error {
        out.push_str(&format!("Note: {error}\n"));
    }
    if !result.supporting_keywords.is_empty() {
        out.push_str("\nSupporting Keywords:\n");
        for (i, sk) in result.supporting_keywords.iter().enumerate() {
            out.push_str(&format!(
                "  {}. {} ({} overlap, Vol: {}, CPC: {})\n",
                i + 1,
                sk.keyword,
                format_percent(sk.overlap_percentage),
                sk.search_volume,
                format_cpc(sk.cpc),
            ));
        }
    }
    out
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

pub fn format_cpc(value: f64) -> String {
    format!("${value:.2}")
}

fn seconds(ms: u64) -> f64 {
    round2(ms as f64 / 1000.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResearchOutcome, SupportingKeyword};

    fn result(keyword: &str, supporting: usize) -> ResearchResult {
        let supporting_keywords: Vec<SupportingKeyword> = (0..supporting)
            .map(|i| SupportingKeyword {
                keyword: format!("{keyword} {i}"),
                overlap_percentage: 45.0 + i as f64,
                search_volume: 100 * (i as u64 + 1),
                cpc: 1.5,
                position: 1,
                top_10_urls: vec!["https://a.com".into()],
                matching_urls: vec!["https://a.com".into()],
            })
            .collect();
        ResearchResult {
            input_keyword: keyword.to_string(),
            outcome: ResearchOutcome::Complete,
            error: None,
            original_top_10_urls: vec!["https://a.com".into(), "https://b.com".into()],
            keywords_from_top_3_urls: Vec::new(),
            total_candidates: 0,
            total_supporting_keywords_found: supporting_keywords.len(),
            supporting_keywords,
            processing_time_ms: 1234,
            timestamp: Utc::now(),
        }
    }

    fn outcome(
        position: usize,
        keyword: &str,
        supporting: Option<usize>,
        original_row: Vec<(String, String)>,
    ) -> BatchItemOutcome {
        BatchItemOutcome {
            position,
            row_number: position + 1,
            seed_keyword: keyword.to_string(),
            research_successful: supporting.is_some(),
            error_message: supporting.is_none().then(|| "boom".to_string()),
            processing_time_ms: 2000,
            result: supporting.map(|n| result(keyword, n)),
            original_row,
        }
    }

    #[test]
    fn formats_match_report_conventions() {
        assert_eq!(format_percent(12.345), "12.3%");
        assert_eq!(format_percent(40.0), "40.0%");
        assert_eq!(format_cpc(1.234), "$1.23");
        assert_eq!(format_cpc(0.0), "$0.00");
    }

    #[test]
    fn table_widens_to_most_supporting_keywords() {
        let outcomes = vec![
            outcome(0, "one", Some(1), vec![("keyword".into(), "one".into())]),
            outcome(1, "three", Some(3), vec![("keyword".into(), "three".into()), ("notes".into(), "x".into())]),
            outcome(2, "fail", None, Vec::new()),
        ];
        let table = batch_table(&outcomes);

        assert_eq!(table.headers.len(), BASE_COLUMNS.len() + 3 * 4 + 2);
        assert_eq!(table.headers[8], "supporting_keyword_1");
        assert_eq!(table.headers[9], "supporting_keyword_1_overlap");
        assert_eq!(
            &table.headers[table.headers.len() - 2..],
            &["original_keyword".to_string(), "original_notes".to_string()]
        );
        assert!(table.rows.iter().all(|r| r.len() == table.headers.len()));

        let col = |name: &str| table.headers.iter().position(|h| h == name).unwrap();
        assert_eq!(table.rows[1][col("supporting_keyword_3")], "three 2");
        assert_eq!(table.rows[1][col("supporting_keyword_3_overlap")], "47.0%");
        assert_eq!(table.rows[1][col("supporting_keyword_3_cpc")], "$1.50");
        assert_eq!(table.rows[0][col("supporting_keyword_3")], "");
        assert_eq!(table.rows[2][col("research_successful")], "false");
        assert_eq!(table.rows[2][col("error_message")], "boom");
        assert_eq!(table.rows[1][col("original_notes")], "x");
    }

    #[test]
    fn summary_counts_successes_and_failures() {
        let outcomes = vec![
            outcome(0, "a", Some(2), Vec::new()),
            outcome(1, "b", Some(1), Vec::new()),
            outcome(2, "c", None, Vec::new()),
        ];
        let metrics = MetricsSnapshot {
            total_requests: 10,
            cache_hits: 1,
            api_calls: 3,
            batch_requests: 3,
        };
        let summary = BatchSummary::build(&outcomes, &metrics, Duration::from_secs(60), 4, 24);

        let s = &summary.batch_processing_summary;
        assert_eq!(s.total_keywords_processed, 3);
        assert_eq!(s.successful_researches, 2);
        assert_eq!(s.failed_researches, 1);
        assert_eq!(s.total_supporting_keywords_found, 3);
        assert_eq!(s.average_processing_time_seconds, 2.0);
        assert_eq!(s.keywords_per_minute, 3.0);

        let p = &summary.performance_metrics;
        assert_eq!(p.cache_hit_rate, 25.0);
        assert_eq!(p.parallel_workers, 4);
        assert_eq!(summary.failed_keywords[0].seed_keyword, "c");
        assert_eq!(summary.successful_keywords.len(), 2);
    }

    #[test]
    fn research_table_ends_with_summary_block() {
        let table = research_table(&result("shoes", 2));
        assert_eq!(table.rows[0][4], "1/2");
        assert_eq!(table.rows[1][5], "2");
        assert_eq!(table.rows[3], vec!["SUMMARY".to_string()]);
        assert_eq!(table.rows[6][1], "1.23");
    }

    #[test]
    fn human_summary_lists_supporting_keywords() {
        let text = research_summary(&result("shoes", 1));
        assert!(text.contains("Input Keyword: shoes"));
        assert!(text.contains("1. shoes 0 (45.0% overlap, Vol: 100, CPC: $1.50)"));
    }
}
