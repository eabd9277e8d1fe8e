use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dataforseo_client::{DataForSeoClient, Locale};
use serp_research::report::{self, BatchSummary};
use serp_research::{
    files, BatchCoordinator, DataForSeoProvider, ResearchConfig, ResearchContext,
    ResearchOutcome, ResearchPipeline, SearchProvider,
};

#[derive(Parser)]
#[command(name = "serp-research")]
#[command(about = "Find supporting keywords by SERP overlap")]
#[command(version)]
struct Cli {
    /// DataForSEO login (defaults to DATAFORSEO_LOGIN)
    #[arg(long, global = true)]
    login: Option<String>,

    /// DataForSEO password (defaults to DATAFORSEO_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Cache database URL, e.g. sqlite://keyword_research_cache.db
    #[arg(long, global = true)]
    cache_db: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a single seed keyword
    Research {
        keyword: String,

        /// Base name for the .json and .csv output (without extension)
        #[arg(short, long)]
        output: Option<String>,

        /// Request timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Research every keyword in a CSV file
    Batch {
        input_csv: PathBuf,

        /// Output CSV file (default: timestamped)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process at most this many keywords
        #[arg(short, long)]
        max_keywords: Option<usize>,

        /// Parallel workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Request timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Cache TTL in hours
        #[arg(long)]
        cache_ttl: Option<i64>,

        /// Delete expired cache entries before starting
        #[arg(long)]
        clean_cache: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "serp_research=debug,dataforseo_client=debug"
    } else {
        "serp_research=info,dataforseo_client=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = ResearchConfig::from_env()?;
    if let Some(login) = cli.login {
        config.login = login;
    }
    if let Some(password) = cli.password {
        config.password = password;
    }
    if let Some(cache_db) = cli.cache_db {
        config.cache_db_url = cache_db;
    }

    match cli.command {
        Commands::Research {
            keyword,
            output,
            timeout,
        } => {
            if let Some(secs) = timeout {
                config.request_timeout = Duration::from_secs(secs);
            }
            research(config, &keyword, output).await
        }
        Commands::Batch {
            input_csv,
            output,
            max_keywords,
            workers,
            timeout,
            cache_ttl,
            clean_cache,
        } => {
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(secs) = timeout {
                config.request_timeout = Duration::from_secs(secs);
            }
            if let Some(hours) = cache_ttl {
                config.cache_ttl_hours = hours;
            }
            let opts = BatchOptions {
                input_csv,
                output: output.unwrap_or_else(files::default_batch_output),
                max_keywords,
                clean_cache,
            };
            batch(config, opts).await
        }
    }
}

async fn connect(config: &ResearchConfig) -> Result<(Arc<dyn SearchProvider>, Arc<ResearchContext>)> {
    config.require_credentials()?;
    config.log_redacted();

    let client = DataForSeoClient::new(&config.login, &config.password, config.request_timeout)?;
    let provider: Arc<dyn SearchProvider> =
        Arc::new(DataForSeoProvider::new(client, Locale::default()));
    let ctx = Arc::new(ResearchContext::connect(config).await?);
    Ok((provider, ctx))
}

async fn research(config: ResearchConfig, keyword: &str, output: Option<String>) -> Result<ExitCode> {
    let (provider, ctx) = connect(&config).await?;
    let pipeline = ResearchPipeline::new(provider, ctx.clone(), &config);

    let result = pipeline.research(keyword).await?;

    let base = output.unwrap_or_else(|| files::default_research_base(keyword));
    let json_path = PathBuf::from(format!("{base}.json"));
    let csv_path = PathBuf::from(format!("{base}.csv"));
    files::write_json(&json_path, &result)?;
    files::write_csv(&csv_path, &report::research_table(&result))?;
    info!(json = %json_path.display(), csv = %csv_path.display(), "Results saved");

    println!("{}", report::research_summary(&result));

    let metrics = ctx.metrics();
    info!(
        api_calls = metrics.api_calls,
        cache_hits = metrics.cache_hits,
        "Research finished"
    );

    if result.outcome == ResearchOutcome::NoSeedData {
        error!(keyword, "{}", result.error.as_deref().unwrap_or("No seed data"));
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

struct BatchOptions {
    input_csv: PathBuf,
    output: PathBuf,
    max_keywords: Option<usize>,
    clean_cache: bool,
}

async fn batch(config: ResearchConfig, opts: BatchOptions) -> Result<ExitCode> {
    let seeds = files::read_seed_keywords(&opts.input_csv)?;
    if seeds.is_empty() {
        error!(input = %opts.input_csv.display(), "No keywords found in input file");
        return Ok(ExitCode::from(1));
    }

    let (provider, ctx) = connect(&config).await?;
    if opts.clean_cache {
        let deleted = ctx.cache.cleanup_expired().await;
        info!(deleted, "Cache cleanup done");
    }

    let coordinator =
        BatchCoordinator::new(provider, ctx.clone(), &config).with_max_keywords(opts.max_keywords);

    let started = Instant::now();
    let outcomes = coordinator.process_batch(seeds).await;
    let elapsed = started.elapsed();

    files::write_csv(&opts.output, &report::batch_table(&outcomes))?;
    let summary = BatchSummary::build(
        &outcomes,
        &ctx.metrics(),
        elapsed,
        coordinator.workers(),
        config.cache_ttl_hours,
    );
    let summary_path = files::summary_path(&opts.output);
    files::write_json(&summary_path, &summary)?;

    let s = &summary.batch_processing_summary;
    info!(
        processed = s.total_keywords_processed,
        successful = s.successful_researches,
        failed = s.failed_researches,
        supporting = s.total_supporting_keywords_found,
        keywords_per_minute = s.keywords_per_minute,
        cache_hit_rate = summary.performance_metrics.cache_hit_rate,
        "Batch complete"
    );
    info!(
        csv = %opts.output.display(),
        summary = %summary_path.display(),
        "Results saved"
    );

    Ok(ExitCode::SUCCESS)
}
