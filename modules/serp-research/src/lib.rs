pub mod batch;
pub mod cache;
pub mod clients;
pub mod config;
pub mod context;
pub mod files;
pub mod metrics;
pub mod pipeline;
pub mod rate_limiter;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod types;
pub mod urls;

pub use batch::{BatchCoordinator, BatchItemOutcome, SeedKeyword};
pub use config::ResearchConfig;
pub use context::ResearchContext;
pub use pipeline::ResearchPipeline;
pub use traits::{DataForSeoProvider, SearchProvider};
pub use types::{ResearchOutcome, ResearchResult, SupportingKeyword};
