use std::time::Duration;

use anyhow::{Context, Result};

use crate::clients::RetryPolicy;

/// Research configuration. Credentials and tuning knobs come from the
/// environment (a `.env` file is honoured); CLI flags override afterwards.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    // Credentials
    pub login: String,
    pub password: String,

    // Cache
    pub cache_db_url: String,
    pub cache_ttl_hours: i64,

    // Concurrency and pacing
    pub workers: usize,
    pub request_timeout: Duration,
    pub min_request_interval: Duration,
    pub step_delay: Duration,

    // Retry
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            login: String::new(),
            password: String::new(),
            cache_db_url: "sqlite://keyword_research_cache.db".to_string(),
            cache_ttl_hours: 24,
            workers: 10,
            request_timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_millis(100),
            step_delay: Duration::from_secs(1),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl ResearchConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            login: std::env::var("DATAFORSEO_LOGIN").unwrap_or_default(),
            password: std::env::var("DATAFORSEO_PASSWORD").unwrap_or_default(),
            cache_db_url: std::env::var("CACHE_DB_URL").unwrap_or(defaults.cache_db_url),
            cache_ttl_hours: env_or("CACHE_TTL_HOURS", defaults.cache_ttl_hours)?,
            workers: env_or("RESEARCH_WORKERS", defaults.workers)?,
            request_timeout: Duration::from_secs(env_or(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            min_request_interval: Duration::from_millis(env_or(
                "MIN_REQUEST_INTERVAL_MS",
                defaults.min_request_interval.as_millis() as u64,
            )?),
            step_delay: Duration::from_millis(env_or(
                "STEP_DELAY_MS",
                defaults.step_delay.as_millis() as u64,
            )?),
            max_attempts: env_or("MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_backoff: Duration::from_millis(env_or(
                "RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
        })
    }

    /// Cache TTL as a chrono duration. Negative or unrepresentable hour counts
    /// are rejected.
    pub fn cache_ttl(&self) -> Result<chrono::Duration> {
        if self.cache_ttl_hours < 0 {
            anyhow::bail!("cache TTL must not be negative, got {} hours", self.cache_ttl_hours);
        }
        chrono::Duration::try_hours(self.cache_ttl_hours)
            .with_context(|| format!("cache TTL of {} hours is out of range", self.cache_ttl_hours))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_backoff: self.retry_backoff,
        }
    }

    /// Fail early when no credentials were supplied by env or flags.
    pub fn require_credentials(&self) -> Result<()> {
        if self.login.is_empty() || self.password.is_empty() {
            anyhow::bail!(
                "DataForSEO credentials missing: pass --login/--password or set DATAFORSEO_LOGIN and DATAFORSEO_PASSWORD"
            );
        }
        Ok(())
    }

    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            if val.is_empty() {
                return "<not set>".to_string();
            }
            let head: String = val.chars().take(3).collect();
            format!("{}...({} chars)", head, val.chars().count())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATAFORSEO_LOGIN: {}", preview(&self.login));
        tracing::info!("  DATAFORSEO_PASSWORD: {}", preview(&self.password));
        tracing::info!("  CACHE_DB_URL: {}", self.cache_db_url);
        tracing::info!("  CACHE_TTL_HOURS: {}", self.cache_ttl_hours);
        tracing::info!("  RESEARCH_WORKERS: {}", self.workers);
        tracing::info!("  REQUEST_TIMEOUT: {:?}", self.request_timeout);
        tracing::info!("  MIN_REQUEST_INTERVAL: {:?}", self.min_request_interval);
        tracing::info!("  STEP_DELAY: {:?}", self.step_delay);
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_batch_tool() {
        let config = ResearchConfig::default();
        assert_eq!(config.workers, 10);
        assert_eq!(config.cache_ttl_hours, 24);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.min_request_interval, Duration::from_millis(100));
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let config = ResearchConfig::default();
        assert!(config.require_credentials().is_err());

        let config = ResearchConfig {
            login: "user@example.com".into(),
            password: "secret".into(),
            ..ResearchConfig::default()
        };
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn env_or_parses_and_falls_back() {
        std::env::set_var("SERP_RESEARCH_TEST_WORKERS", "7");
        assert_eq!(env_or("SERP_RESEARCH_TEST_WORKERS", 1usize).unwrap(), 7);

        std::env::set_var("SERP_RESEARCH_TEST_BAD", "seven");
        assert!(env_or("SERP_RESEARCH_TEST_BAD", 1usize).is_err());

        assert_eq!(env_or("SERP_RESEARCH_TEST_UNSET", 3u32).unwrap(), 3);
    }

    #[test]
    fn cache_ttl_rejects_negative_and_oversized_hours() {
        let ttl = |hours| ResearchConfig {
            cache_ttl_hours: hours,
            ..ResearchConfig::default()
        };
        assert_eq!(ttl(24).cache_ttl().unwrap(), chrono::Duration::hours(24));
        assert_eq!(ttl(0).cache_ttl().unwrap(), chrono::Duration::zero());
        assert!(ttl(-1).cache_ttl().is_err());
        assert!(ttl(i64::MAX).cache_ttl().is_err());
    }

    #[test]
    fn retry_policy_has_at_least_one_attempt() {
        let config = ResearchConfig {
            max_attempts: 0,
            ..ResearchConfig::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 1);
    }
}
