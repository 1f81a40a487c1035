use anyhow::Context as _;
use clap::Parser;
use notifeed::config::{Config, optional_secret};
use notifeed::ingest::{Extractor, ingest_page};
use notifeed::item_store::ItemStore;
use notifeed::record_store::RecordStoreClient;
use notifeed::session::{self, PageFetcher};
use notifeed::{logger, utils};
use std::path::PathBuf;
use tracing::Instrument as _;
use url::Url;

/// Collects new notification items from the provider's notification page.
#[derive(Parser, Debug)]
struct Opt {
    /// Ingest a saved copy of the page instead of fetching it.
    #[arg(long)]
    html: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let opt = Opt::parse();
    let config = Config::load()?;
    run(opt, config).instrument(logger::run_span("collect")).await
}

async fn run(opt: Opt, config: Config) -> anyhow::Result<()> {
    let html = match &opt.html {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => fetch_live(&config).await?,
    };

    let extractor = Extractor::new(&config.provider.origin)?;
    let store = ItemStore::new(config.items_path());
    ingest_page(&store, &html, &extractor, config.provider.retention_cap)?;
    Ok(())
}

async fn fetch_live(config: &Config) -> anyhow::Result<String> {
    // The remote store is only one of the session sources.
    let remote = RecordStoreClient::new_from_env().ok();
    let session = session::resolve(
        optional_secret("AUTH_JSON_BASE64").as_ref(),
        &config.provider.auth_file,
        remote.as_ref(),
    )
    .await?;

    let url = Url::parse(&config.notification_url())
        .context("provider origin and notification path do not form a URL")?;
    let html = PageFetcher::new().fetch(&url, &session).await?;

    if config.provider.debug_artifacts {
        let path = config.debug_html_path();
        match utils::write_atomically(&path, html.as_bytes()) {
            Ok(()) => tracing::info!("saved page to {}", path.display()),
            Err(e) => tracing::warn!("failed to save {}: {e:?}", path.display()),
        }
    }
    Ok(html)
}
