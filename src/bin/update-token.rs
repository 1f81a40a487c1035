use chrono::Utc;
use notifeed::config::required_secret;
use notifeed::logger;
use notifeed::record_store::RecordStoreClient;
use notifeed::token::{AUTH_TABLE, TOKEN_RECORD_ID, token_fields};
use secrecy::ExposeSecret;
use tracing::Instrument as _;

// Stores a manually issued Threads token (`THREADS_NEW_TOKEN`) as the current
// token, resetting its refresh clock.

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    async move {
        let token = required_secret("THREADS_NEW_TOKEN")?;
        let store = RecordStoreClient::new_from_env()?;
        let fields = token_fields(token.expose_secret(), Utc::now());
        store
            .upsert_record(AUTH_TABLE, TOKEN_RECORD_ID, fields)
            .await?;
        tracing::info!("token record `{TOKEN_RECORD_ID}` updated");
        Ok::<_, anyhow::Error>(())
    }
    .instrument(logger::run_span("update-token"))
    .await
}
