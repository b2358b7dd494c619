//! Seams between the monitor and the outside world

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DetailReport, Discovery, ListingSummary};

/// Where listings come from.
///
/// Implementations acquire and release whatever they need (HTTP request,
/// browser session) inside each call and must not retry; the monitor
/// decides what to do about failures.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the current result page of a search
    ///
    /// # Arguments
    /// * `search_url` - Encoded search URL
    ///
    /// # Returns
    /// * `Result<Vec<ListingSummary>>` - Listings in page order
    async fn fetch_listings(&self, search_url: &str) -> Result<Vec<ListingSummary>>;

    /// Fetch the inspection record and history note of one listing
    ///
    /// # Arguments
    /// * `detail_url` - Link taken from a [`ListingSummary`]
    async fn fetch_detail(&self, detail_url: &str) -> Result<DetailReport>;
}

/// Receives the listings processed in a cycle. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, discoveries: &[Discovery]) -> Result<()>;
}
