use chrono::Utc;
use clap::Parser;
use notifeed::config::Config;
use notifeed::engagement::scorer::scorer_from_env;
use notifeed::engagement::{Engagement, RapidApiClient};
use notifeed::logger;
use notifeed::social::{self, DryRunPublisher, Publisher};
use tracing::Instrument as _;

/// Quote-tweet engagement.
///
/// With `--collect`, searches the next keyword and remembers good accounts.
/// Otherwise checks a few remembered accounts and quotes at most one tweet.
#[derive(Parser, Debug)]
struct Opt {
    #[arg(long)]
    collect: bool,

    /// If specified, the quote is only logged.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let opt = Opt::parse();
    let config = Config::load()?;
    let source = RapidApiClient::new_from_env(&config.engagement.rapidapi_host)?;
    let job = Engagement {
        config: &config.engagement,
        accounts_path: config.target_accounts_path(),
        status_path: config.engagement_status_path(),
        source: &source,
    };

    if opt.collect {
        job.collect(Utc::now())
            .instrument(logger::run_span("engage-collect"))
            .await?;
        return Ok(());
    }

    let scorer = scorer_from_env(&config.engagement);
    let publisher: Box<dyn Publisher> = if opt.dry_run {
        Box::new(DryRunPublisher::new("twitter"))
    } else {
        social::twitter_from_env(&config.posting.twitter_api_url)
    };
    let outcome = job
        .engage(scorer.as_ref(), publisher.as_ref(), Utc::now())
        .instrument(logger::run_span("engage"))
        .await?;
    tracing::info!("engagement finished: {outcome:?}");
    Ok(())
}
