//! The monitor loop: fetch, diff, enrich, classify, persist, sleep.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::filter::classify;
use crate::models::{Discovery, ListingSummary, MonitorState, QualifiedCar};
use crate::store::StateStore;
use crate::traits::{ListingSource, Notifier};

/// Upper bound on one background notification.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Idle,
    Fetching,
    Diffing,
    Enriching,
    Classifying,
    Persisting,
    Sleeping,
    Stopped,
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub candidates: usize,
    /// Candidates whose detail page was read and classified
    pub processed: usize,
    pub qualified: usize,
    /// Candidates skipped because their detail page could not be fetched
    pub failed: usize,
}

/// Listings of `batch` whose id is not in `known`, in batch order, each id
/// at most once.
pub fn diff_new_listings(
    known: &HashSet<String>,
    batch: Vec<ListingSummary>,
) -> Vec<ListingSummary> {
    let mut seen = HashSet::new();
    batch
        .into_iter()
        .filter(|listing| !known.contains(&listing.id) && seen.insert(listing.id.clone()))
        .collect()
}

pub struct CarFinder {
    source: Arc<dyn ListingSource>,
    store: StateStore,
    notifier: Option<Arc<dyn Notifier>>,
    search_url: String,
    check_interval: Duration,
    detail_workers: usize,
    state: MonitorState,
    phase: MonitorPhase,
}

impl CarFinder {
    /// Creates a monitor and loads its state from `store`.
    pub fn new(
        source: Arc<dyn ListingSource>,
        store: StateStore,
        config: &Config,
    ) -> Result<Self> {
        let state = store.load().context("Failed to load monitor state")?;

        Ok(Self {
            source,
            store,
            notifier: None,
            search_url: config.search_url.clone(),
            check_interval: config.check_interval,
            detail_workers: config.detail_workers.max(1),
            state,
            phase: MonitorPhase::Idle,
        })
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    fn set_phase(&mut self, phase: MonitorPhase) {
        if self.phase != phase {
            debug!("Monitor phase {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Runs cycles until `shutdown` is cancelled, then saves the in-memory
    /// state. Cancellation is observed during fetches and during the sleep.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting listing monitor");
        info!("Search URL: {}", self.search_url);
        info!("Check interval: {}s", self.check_interval.as_secs());

        loop {
            info!(
                "Checking for new listings at {}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            );

            let outcome = tokio::select! {
                biased;
                () = shutdown.cancelled() => None,
                result = self.check_for_new_cars() => Some(result),
            };

            match outcome {
                None => break,
                Some(Ok(report)) => info!(
                    "Cycle done: {} listings, {} new, {} processed, {} qualified, {} failed",
                    report.fetched,
                    report.candidates,
                    report.processed,
                    report.qualified,
                    report.failed
                ),
                Some(Err(e)) => error!("Cycle aborted: {:#}", e),
            }

            self.set_phase(MonitorPhase::Sleeping);
            if let Ok(interval) = chrono::Duration::from_std(self.check_interval) {
                info!(
                    "Next check at {}",
                    (Local::now() + interval).format("%Y-%m-%d %H:%M:%S")
                );
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.check_interval) => {}
            }
        }

        info!("Stopping monitor, saving state");
        self.set_phase(MonitorPhase::Persisting);
        let saved = self.store.save(&self.state);
        self.set_phase(MonitorPhase::Stopped);
        saved
    }

    /// One cycle. A failed batch fetch or a failed save aborts the cycle;
    /// a failed detail fetch only skips that listing until the next cycle.
    pub async fn check_for_new_cars(&mut self) -> Result<CycleReport> {
        self.set_phase(MonitorPhase::Fetching);
        let listings = self
            .source
            .fetch_listings(&self.search_url)
            .await
            .context("Failed to fetch listings")?;

        self.set_phase(MonitorPhase::Diffing);
        let mut report = CycleReport {
            fetched: listings.len(),
            ..CycleReport::default()
        };
        let candidates = diff_new_listings(&self.state.known_ids, listings);
        report.candidates = candidates.len();

        if candidates.is_empty() {
            info!("No new listings found");
        } else {
            info!("Found {} new listings, fetching details", candidates.len());
        }

        self.set_phase(MonitorPhase::Enriching);
        let source = Arc::clone(&self.source);
        let mut details = stream::iter(candidates)
            .map(|listing| {
                let source = Arc::clone(&source);
                async move {
                    let detail = source.fetch_detail(&listing.link).await;
                    (listing, detail)
                }
            })
            .buffered(self.detail_workers);

        let mut discoveries = Vec::new();

        while let Some((listing, detail)) = details.next().await {
            let detail = match detail {
                Ok(detail) => detail,
                Err(e) => {
                    warn!("Skipping listing {} until next cycle: {:#}", listing.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            self.set_phase(MonitorPhase::Classifying);
            let qualified = classify(detail.inspection.as_ref(), detail.history.as_ref());
            self.state.mark_known(&listing.id);
            report.processed += 1;

            if qualified
                && let (Some(inspection), Some(history)) = (detail.inspection, detail.history)
            {
                info!("Qualified car found: {} - {}", listing.title, listing.price);
                let car = QualifiedCar::new(&listing, inspection, history, Utc::now());
                if self.state.record_qualified(car) {
                    report.qualified += 1;
                    self.set_phase(MonitorPhase::Persisting);
                    self.store
                        .save_qualified_cars(&self.state.qualified_cars)
                        .context("Failed to save qualified cars")?;
                }
            } else {
                debug!("Listing {} does not qualify", listing.id);
            }

            discoveries.push(Discovery { listing, qualified });
            self.set_phase(MonitorPhase::Enriching);
        }

        self.set_phase(MonitorPhase::Persisting);
        self.store
            .save_known_ids(&self.state.known_ids)
            .context("Failed to save known listings")?;

        if !discoveries.is_empty() {
            info!("{} new listings processed", discoveries.len());
            self.notify(discoveries);
        }

        Ok(report)
    }

    /// Sends `discoveries` on a background task bounded by [`NOTIFY_TIMEOUT`].
    fn notify(&self, discoveries: Vec<Discovery>) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };

        tokio::spawn(async move {
            match tokio::time::timeout(NOTIFY_TIMEOUT, notifier.notify(&discoveries)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to send notification: {:#}", e),
                Err(_) => warn!(
                    "Notification for {} listings timed out after {}s",
                    discoveries.len(),
                    NOTIFY_TIMEOUT.as_secs()
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str) -> ListingSummary {
        ListingSummary {
            id: id.to_string(),
            title: format!("listing {id}"),
            price: String::new(),
            region: String::new(),
            link: format!("https://fem.encar.com/cars/detail/{id}"),
        }
    }

    fn ids(listings: &[ListingSummary]) -> Vec<&str> {
        listings.iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn diff_keeps_unknown_listings_in_batch_order() {
        let known: HashSet<String> = ["2", "4"].iter().map(|s| s.to_string()).collect();
        let batch = ["1", "2", "3", "4", "5"].map(listing).to_vec();

        assert_eq!(ids(&diff_new_listings(&known, batch)), vec!["1", "3", "5"]);
    }

    #[test]
    fn diff_drops_duplicate_ids_within_a_batch() {
        let batch = ["7", "8", "7"].map(listing).to_vec();
        assert_eq!(ids(&diff_new_listings(&HashSet::new(), batch)), vec!["7", "8"]);
    }

    #[test]
    fn diff_of_fully_known_batch_is_empty() {
        let known: HashSet<String> = ["1", "2"].iter().map(|s| s.to_string()).collect();
        let batch = ["2", "1"].map(listing).to_vec();
        assert!(diff_new_listings(&known, batch).is_empty());
    }
}
