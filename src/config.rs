//! Runtime settings, read from the environment and overridden by flags.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(600);
pub const DEFAULT_DATA_DIR: &str = "public";
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;
pub const DEFAULT_DETAIL_WORKERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub search_url: String,
    pub check_interval: Duration,
    pub data_dir: PathBuf,
    /// Rows requested per result page
    pub page_limit: u32,
    /// Detail pages fetched concurrently within a cycle
    pub detail_workers: usize,
    pub discord_webhook_url: Option<String>,
}

impl Config {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            page_limit: DEFAULT_PAGE_LIMIT,
            detail_workers: DEFAULT_DETAIL_WORKERS,
            discord_webhook_url: None,
        }
    }

    /// Defaults overridden by `SEARCH_URL`, `CHECK_INTERVAL_SECS`,
    /// `CAR_FINDER_DATA_DIR`, `PAGE_LIMIT`, `DETAIL_WORKERS` and
    /// `DISCORD_WEBHOOK_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::new(var("SEARCH_URL").unwrap_or_default());

        if let Some(secs) = var("CHECK_INTERVAL_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .context("CHECK_INTERVAL_SECS must be a whole number of seconds")?;
            config.check_interval = Duration::from_secs(secs);
        }
        if let Some(dir) = var("CAR_FINDER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(limit) = var("PAGE_LIMIT") {
            config.page_limit = limit.trim().parse().context("PAGE_LIMIT must be a number")?;
        }
        if let Some(workers) = var("DETAIL_WORKERS") {
            config.detail_workers = workers
                .trim()
                .parse()
                .context("DETAIL_WORKERS must be a number")?;
        }
        config.discord_webhook_url = var("DISCORD_WEBHOOK_URL");

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_url.trim().is_empty() {
            bail!("No search URL given (pass one or set SEARCH_URL)");
        }
        if self.check_interval.is_zero() {
            bail!("Check interval must be at least one second");
        }
        if self.detail_workers == 0 {
            bail!("At least one detail worker is required");
        }
        if self.page_limit == 0 {
            bail!("Page limit must be positive");
        }
        Ok(())
    }
}
