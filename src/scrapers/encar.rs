//! Encar listing source over plain HTTP

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::models::{DetailReport, HistoryNote, InspectionAttributes, ListingSummary};
use crate::query::{detail_url, extract_listing_id};
use crate::traits::ListingSource;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Unit the result table leaves off its prices (10,000 KRW).
const PRICE_UNIT: &str = "만원";
const NONE_MARKER: &str = "없음";
const SPECIAL_NOTE_LABEL: &str = "특이 사항";

/// CSS selectors for the search result table and the detail page
#[derive(Debug, Clone)]
struct PageSelectors {
    listing_row: Selector,
    price: Selector,
    region: Selector,
    title_link: Selector,
    inspection_section: Selector,
    check_list: Selector,
    item: Selector,
    paragraph: Selector,
    span: Selector,
    history_section: Selector,
    nested_list: Selector,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Failed to parse selector `{}`: {:?}", css, e))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn digits(text: &str) -> Option<u32> {
    text.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

impl PageSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            listing_row: selector("table.car_list tr[data-index]")?,
            price: selector("td.prc_hs strong")?,
            region: selector("td.inf span.detail span.loc")?,
            title_link: selector("td.inf a")?,
            inspection_section: selector("div[data-impression='성능기록부']")?,
            check_list: selector("ul[class*='DetailInspect_check_list']")?,
            item: selector("li")?,
            paragraph: selector("p")?,
            span: selector("span")?,
            history_section: selector("div[data-impression='차량이력']")?,
            nested_list: selector("ul")?,
        })
    }

    fn listings(&self, html: &str) -> Vec<ListingSummary> {
        let document = Html::parse_document(html);
        let mut listings = Vec::new();

        for row in document.select(&self.listing_row) {
            let link = row.select(&self.title_link).next();

            let id = row
                .value()
                .attr("data-impression")
                .and_then(|impression| impression.split('|').next())
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .or_else(|| {
                    link.and_then(|a| a.value().attr("href"))
                        .and_then(extract_listing_id)
                });

            let Some(id) = id else {
                debug!("Skipping result row without a listing id");
                continue;
            };

            let price = row
                .select(&self.price)
                .next()
                .map(element_text)
                .filter(|p| !p.is_empty())
                .map(|p| format!("{p}{PRICE_UNIT}"))
                .unwrap_or_default();

            let region = row
                .select(&self.region)
                .next()
                .map(element_text)
                .unwrap_or_default();

            let title = link.map(element_text).unwrap_or_default();

            listings.push(ListingSummary {
                link: detail_url(&id),
                id,
                title,
                price,
                region,
            });
        }

        listings
    }

    fn detail(&self, html: &str) -> DetailReport {
        let document = Html::parse_document(html);
        DetailReport {
            inspection: self.inspection(&document),
            history: self.history(&document),
        }
    }

    /// Counters from the inspection record. `None` when the section is
    /// missing or none of the counters could be read.
    fn inspection(&self, document: &Html) -> Option<InspectionAttributes> {
        let section = document.select(&self.inspection_section).next()?;
        let mut attributes = InspectionAttributes::unknown();

        if let Some(check_list) = section.select(&self.check_list).next() {
            for item in check_list.select(&self.item) {
                let paragraphs: Vec<_> = item.select(&self.paragraph).collect();
                let [label, value, ..] = paragraphs.as_slice() else {
                    continue;
                };

                let value_text = element_text(*value);
                let count = if value_text.contains(NONE_MARKER) {
                    Some(0)
                } else {
                    value
                        .select(&self.span)
                        .next()
                        .and_then(|span| digits(&element_text(span)))
                        .or_else(|| digits(&value_text))
                };

                if let Some(count) = count {
                    attributes.record(&element_text(*label), count);
                }
            }
        } else {
            for item in section.select(&self.item) {
                let text = element_text(item);
                let count = if text.contains(NONE_MARKER) {
                    Some(0)
                } else {
                    digits(&text)
                };

                if let Some(count) = count {
                    attributes.record(&text, count);
                }
            }
        }

        debug!("Extracted inspection record: {:?}", attributes);
        (!attributes.is_unknown()).then_some(attributes)
    }

    /// The usage history note. `None` when the page does not show one.
    fn history(&self, document: &Html) -> Option<HistoryNote> {
        let section = document.select(&self.history_section).next()?;
        // the label must be the item's own <p>, not one of a nested item
        let item = section.select(&self.item).find(|item| {
            item.children()
                .filter_map(ElementRef::wrap)
                .any(|child| {
                    child.value().name() == "p"
                        && element_text(child).contains(SPECIAL_NOTE_LABEL)
                })
        })?;

        let note = item
            .select(&self.nested_list)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .map_or(HistoryNote::Clean, |text| HistoryNote::from_text(&text));

        Some(note)
    }
}

/// Fetches search results and detail pages with one HTTP request each.
#[derive(Debug, Clone)]
pub struct EncarScraper {
    client: Client,
    selectors: PageSelectors,
}

impl EncarScraper {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            selectors: PageSelectors::new()?,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to fetch {}: {}", url, response.status()));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl ListingSource for EncarScraper {
    async fn fetch_listings(&self, search_url: &str) -> Result<Vec<ListingSummary>> {
        let html = self.fetch_page(search_url).await?;
        let listings = self.selectors.listings(&html);
        info!("Found {} listings on the result page", listings.len());
        Ok(listings)
    }

    async fn fetch_detail(&self, detail_url: &str) -> Result<DetailReport> {
        let html = self.fetch_page(detail_url).await?;
        Ok(self.selectors.detail(&html))
    }
}
