use chrono::Utc;
use clap::Parser;
use notifeed::config::{Config, ConfigurationError, PostingPolicy, optional_secret};
use notifeed::item_store::{ItemStore, Platform};
use notifeed::logger;
use notifeed::posting::ItemPoster;
use notifeed::record_store::RecordStoreClient;
use notifeed::social::{self, DryRunPublisher, Publisher, ThreadsClient};
use notifeed::token::{ThreadsTokenRefresher, TokenProvider};
use tracing::Instrument as _;

/// Publishes stored items that have not been posted to a platform yet.
#[derive(Parser, Debug)]
struct Opt {
    #[arg(long, value_enum, default_value_t = Platform::Twitter)]
    platform: Platform,

    /// Overrides the configured posting policy.
    #[arg(long, value_enum)]
    policy: Option<PostingPolicy>,

    /// If specified, nothing is published and no item is marked.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let opt = Opt::parse();
    let config = Config::load()?;
    let span = logger::run_span("post-items");
    run(opt, config).instrument(span).await
}

async fn run(opt: Opt, config: Config) -> anyhow::Result<()> {
    let publisher = publisher(&opt, &config).await?;
    let store = ItemStore::new(config.items_path());
    let poster = ItemPoster {
        store: &store,
        platform: opt.platform,
        policy: opt.policy.unwrap_or(config.posting.policy),
        drain_delay: config.posting.drain_delay(),
        referral_id: &config.provider.referral_id,
    };
    let report = poster.run(publisher.as_ref()).await?;
    tracing::info!(
        "{} published, {} dry run, {} failed, {} were pending",
        report.published,
        report.dry_run,
        report.failed,
        report.pending
    );
    Ok(())
}

async fn publisher(opt: &Opt, config: &Config) -> anyhow::Result<Box<dyn Publisher>> {
    if opt.dry_run {
        return Ok(Box::new(DryRunPublisher::new(opt.platform.as_str())));
    }
    match opt.platform {
        Platform::Twitter => Ok(social::twitter_from_env(&config.posting.twitter_api_url)),
        Platform::Threads => {
            let store = RecordStoreClient::new_from_env()?;
            let refresher = ThreadsTokenRefresher::new(config.posting.threads_refresh_url.clone());
            let provider =
                TokenProvider::new(&store, refresher, optional_secret("THREADS_INITIAL_TOKEN"));
            let token = provider
                .access_token(Utc::now())
                .await?
                .ok_or(ConfigurationError::MissingEnv("THREADS_INITIAL_TOKEN"))?;
            Ok(Box::new(ThreadsClient::new(
                config.posting.threads_api_url.clone(),
                token,
            )))
        }
    }
}
