use clap::Parser;
use notifeed::config::Config;
use notifeed::logger;
use notifeed::queue::{PostQueue, QueueOutcome};
use notifeed::social::{self, DryRunPublisher, Publisher};
use tracing::Instrument as _;

/// Tweets the next line of `tweets.txt`, wrapping around at the end.
#[derive(Parser, Debug)]
struct Opt {
    /// If specified, nothing is published and the cursor does not move.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let opt = Opt::parse();
    let config = Config::load()?;
    async move {
        let publisher: Box<dyn Publisher> = if opt.dry_run {
            Box::new(DryRunPublisher::new("twitter"))
        } else {
            social::twitter_from_env(&config.posting.twitter_api_url)
        };
        let queue = PostQueue {
            entries_path: config.queue_path(),
            status_path: config.queue_status_path(),
        };
        if let QueueOutcome::Failed { index } = queue.post_next(publisher.as_ref()).await? {
            tracing::warn!("entry {index} will be retried on the next run");
        }
        Ok::<_, anyhow::Error>(())
    }
    .instrument(logger::run_span("post-queue"))
    .await
}
