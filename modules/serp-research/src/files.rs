//! CSV and JSON files in and out of the CLI.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::SeedKeyword;
use crate::report::CsvTable;

/// Input columns searched for a seed keyword, in priority order.
pub const KEYWORD_COLUMNS: [&str; 5] = ["keyword", "keywords", "seed_keyword", "term", "query"];

/// Read seed keywords from a CSV file with a header row.
pub fn read_seed_keywords(path: &Path) -> Result<Vec<SeedKeyword>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let seeds = parse_seed_keywords(file)
        .with_context(|| format!("Failed to read seed keywords from {}", path.display()))?;
    info!(path = %path.display(), count = seeds.len(), "Read seed keywords");
    Ok(seeds)
}

/// Each row takes its keyword from the first of [`KEYWORD_COLUMNS`] holding a
/// non-blank value. Rows without one are skipped with a warning.
pub fn parse_seed_keywords<R: Read>(input: R) -> Result<Vec<SeedKeyword>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut seeds = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row_number = i + 1;
        let record = record?;
        let row: Vec<(String, String)> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();

        let keyword = KEYWORD_COLUMNS.iter().find_map(|column| {
            row.iter()
                .find(|(h, _)| h == column)
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        });

        match keyword {
            Some(keyword) => seeds.push(SeedKeyword {
                row_number,
                keyword,
                original_row: row,
            }),
            None => warn!(row = row_number, columns = ?headers, "No keyword found in row"),
        }
    }

    Ok(seeds)
}

pub fn write_csv(path: &Path, table: &CsvTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// `results.csv` → `results_summary.json`.
pub fn summary_path(csv_path: &Path) -> PathBuf {
    let stem = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch".to_string());
    csv_path.with_file_name(format!("{stem}_summary.json"))
}

/// Default base name for a single-keyword run: `keyword_research_<keyword>_<timestamp>`.
pub fn default_research_base(keyword: &str) -> String {
    let safe: String = keyword
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    format!(
        "keyword_research_{safe}_{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

pub fn default_batch_output() -> PathBuf {
    PathBuf::from(format!(
        "batch_keyword_research_{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}
