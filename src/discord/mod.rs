//! # Discord Webhook Integration
//!
//! Posts one embed per newly processed listing to a Discord webhook.
//! Qualified cars are highlighted in green, the rest use Discord blue.
//!
//! ## Rate Limits
//!
//! Discord webhooks accept at most 10 embeds per message, so larger batches
//! are split into several messages.
//!
//! ## Environment Configuration
//!
//! Set `DISCORD_WEBHOOK_URL` (or pass it through [`crate::config::Config`]).
//! If it is not set, notifications are disabled but logged.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::models::{DiscordEmbed, DiscordField, DiscordMessage, Discovery};
use crate::traits::Notifier;

const MAX_EMBEDS_PER_MESSAGE: usize = 10;
const COLOR_NEW: u32 = 0x0058_65F2;
const COLOR_QUALIFIED: u32 = 0x0057_F287;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Discord webhook notification client for new listings.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    /// If `None`, every notification is skipped.
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Result<Self> {
        if webhook_url.is_none() {
            warn!("DISCORD_WEBHOOK_URL not set - Discord notifications will be disabled");
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }

    fn embed(discovery: &Discovery, timestamp: &str) -> DiscordEmbed {
        let listing = &discovery.listing;
        let (title, color) = if discovery.qualified {
            ("🚗 Qualified car found!", COLOR_QUALIFIED)
        } else {
            ("New listing", COLOR_NEW)
        };

        DiscordEmbed {
            title: title.to_string(),
            description: listing.title.clone(),
            url: listing.link.clone(),
            color,
            timestamp: timestamp.to_string(),
            fields: vec![
                DiscordField {
                    name: "Price".to_string(),
                    value: listing.price.clone(),
                    inline: true,
                },
                DiscordField {
                    name: "Region".to_string(),
                    value: listing.region.clone(),
                    inline: true,
                },
                DiscordField {
                    name: "Link".to_string(),
                    value: format!("[View on Encar]({})", listing.link),
                    inline: false,
                },
            ],
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, discoveries: &[Discovery]) -> Result<()> {
        let Some(webhook_url) = &self.webhook_url else {
            return Ok(());
        };

        let timestamp = Utc::now().to_rfc3339();
        for chunk in discoveries.chunks(MAX_EMBEDS_PER_MESSAGE) {
            let message = DiscordMessage {
                embeds: chunk.iter().map(|d| Self::embed(d, &timestamp)).collect(),
            };

            let response = self.client.post(webhook_url).json(&message).send().await?;

            if response.status().is_success() {
                info!("Discord notification sent for {} listings", chunk.len());
            } else {
                error!("Failed to send Discord notification: {}", response.status());
            }
        }

        Ok(())
    }
}
