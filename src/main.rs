use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use car_finder::cli::{self, Command};
use car_finder::discord::DiscordNotifier;
use car_finder::query;
use car_finder::scrapers::EncarScraper;
use car_finder::{CarFinder, Config, StateStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli::parse_args(std::env::args().skip(1))? {
        Command::Help => println!("{}", cli::USAGE),
        Command::Decode(url) => println!("{}", query::pretty_print_url(&url)),
        Command::Build { spec, limit } => {
            let url = query::encode_search_url(&spec, limit)?;
            println!("{url}");
        }
        Command::Watch(args) => {
            let mut config = Config::from_env()?;
            args.apply(&mut config);
            config.validate()?;
            watch(config).await?;
        }
    }

    Ok(())
}

async fn watch(mut config: Config) -> Result<()> {
    config.search_url = query::set_page_limit(&config.search_url, config.page_limit);
    info!("Decoded search: {}", query::pretty_print_url(&config.search_url));

    let source = Arc::new(EncarScraper::new()?);
    let notifier = Arc::new(DiscordNotifier::new(config.discord_webhook_url.clone())?);
    let store = StateStore::new(&config.data_dir);

    let mut finder = CarFinder::new(source, store, &config)?.with_notifier(notifier);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt: {}", e);
            return;
        }
        info!("Interrupt received, shutting down");
        signal.cancel();
    });

    finder.run(shutdown).await
}
