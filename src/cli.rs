//! Command-line parsing for the `car-finder` binary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::config::{Config, DEFAULT_PAGE_LIMIT};
use crate::query::SearchQuerySpec;

pub const USAGE: &str = "\
Usage:
  car-finder [watch] <SEARCH_URL> [--interval SECS] [--data-dir DIR] [--limit N] [--workers N]
  car-finder decode <URL>
  car-finder build --country Y|N --manufacturer NAME --model-group NAME --model NAME
                   [--badge-group NAME] [--badge NAME] [--badge-detail NAME]
                   [--option NAME]... [--limit N]

Environment:
  SEARCH_URL, CHECK_INTERVAL_SECS, CAR_FINDER_DATA_DIR, PAGE_LIMIT,
  DETAIL_WORKERS, DISCORD_WEBHOOK_URL, RUST_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Watch(WatchArgs),
    Decode(String),
    Build { spec: SearchQuerySpec, limit: u32 },
    Help,
}

/// Flags for `watch`; unset ones keep the environment's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchArgs {
    pub search_url: Option<String>,
    pub interval: Option<Duration>,
    pub data_dir: Option<PathBuf>,
    pub page_limit: Option<u32>,
    pub detail_workers: Option<usize>,
}

impl WatchArgs {
    pub fn apply(self, config: &mut Config) {
        if let Some(url) = self.search_url {
            config.search_url = url;
        }
        if let Some(interval) = self.interval {
            config.check_interval = interval;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(limit) = self.page_limit {
            config.page_limit = limit;
        }
        if let Some(workers) = self.detail_workers {
            config.detail_workers = workers;
        }
    }
}

pub fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();

    match args.peek().map(String::as_str) {
        Some("-h" | "--help" | "help") => Ok(Command::Help),
        Some("decode") => {
            args.next();
            let url = args.next().ok_or_else(|| anyhow!("Missing URL for decode"))?;
            if let Some(extra) = args.next() {
                bail!("Unexpected argument: {}", extra);
            }
            Ok(Command::Decode(url))
        }
        Some("build") => {
            args.next();
            parse_build(args)
        }
        Some("watch") => {
            args.next();
            parse_watch(args)
        }
        _ => parse_watch(args),
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("Missing value for {}", flag))
}

fn parse_watch(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut watch = WatchArgs::default();

    while let Some(a) = args.next() {
        match a.as_str() {
            "--interval" | "-i" => {
                let secs: u64 = value(&mut args, &a)?
                    .parse()
                    .context("--interval takes whole seconds")?;
                watch.interval = Some(Duration::from_secs(secs));
            }
            "--data-dir" | "-d" => watch.data_dir = Some(PathBuf::from(value(&mut args, &a)?)),
            "--limit" => {
                watch.page_limit =
                    Some(value(&mut args, &a)?.parse().context("--limit takes a number")?);
            }
            "--workers" => {
                watch.detail_workers =
                    Some(value(&mut args, &a)?.parse().context("--workers takes a number")?);
            }
            "-h" | "--help" => return Ok(Command::Help),
            flag if flag.starts_with('-') => bail!("Unknown arg: {}", flag),
            _ if watch.search_url.is_none() => watch.search_url = Some(a),
            // a second positional is the interval, as in `car-finder <URL> 600`
            _ if watch.interval.is_none() => {
                let secs: u64 = a.parse().context("Interval must be whole seconds")?;
                watch.interval = Some(Duration::from_secs(secs));
            }
            _ => bail!("Unexpected argument: {}", a),
        }
    }

    Ok(Command::Watch(watch))
}

fn parse_build(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut spec = SearchQuerySpec::default();
    let mut limit = DEFAULT_PAGE_LIMIT;

    while let Some(a) = args.next() {
        match a.as_str() {
            "--country" => spec.country = value(&mut args, &a)?,
            "--manufacturer" => spec.manufacturer = value(&mut args, &a)?,
            "--model-group" => spec.model_group = value(&mut args, &a)?,
            "--model" => spec.model = value(&mut args, &a)?,
            "--badge-group" => spec.badge_group = Some(value(&mut args, &a)?),
            "--badge" => spec.badge = Some(value(&mut args, &a)?),
            "--badge-detail" => spec.badge_details.push(value(&mut args, &a)?),
            "--option" => spec.options.push(value(&mut args, &a)?),
            "--limit" => limit = value(&mut args, &a)?.parse().context("--limit takes a number")?,
            "-h" | "--help" => return Ok(Command::Help),
            other => bail!("Unknown arg: {}", other),
        }
    }

    Ok(Command::Build { spec, limit })
}
