use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use notifeed::config::{Config, optional_secret};
use notifeed::logger;
use notifeed::record_store::RecordStoreClient;
use notifeed::session::StorageState;
use notifeed::token::{AUTH_TABLE, SESSION_RECORD_ID, token_fields};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use tracing::Instrument as _;

/// Uploads a browser storage-state document so scheduled runs can reuse the
/// login.
#[derive(Parser, Debug)]
struct Opt {
    /// Storage-state file to upload. Defaults to the configured `auth-file`;
    /// `AUTH_JSON_BASE64` is used when neither exists.
    file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let opt = Opt::parse();
    let config = Config::load()?;
    async move {
        let path = opt.file.unwrap_or(config.provider.auth_file);
        let json = if path.exists() {
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
        } else if let Some(encoded) = optional_secret("AUTH_JSON_BASE64") {
            let state = StorageState::from_base64(encoded.expose_secret())?;
            serde_json::to_string(&state)?
        } else {
            anyhow::bail!("{} not found and AUTH_JSON_BASE64 is not set", path.display());
        };

        let state = StorageState::parse(&json).context("session document is not valid JSON")?;
        tracing::info!("session has {} cookies", state.cookies.len());

        let store = RecordStoreClient::new_from_env()?;
        store
            .upsert_record(AUTH_TABLE, SESSION_RECORD_ID, token_fields(&json, Utc::now()))
            .await?;
        tracing::info!("session uploaded as `{SESSION_RECORD_ID}`");
        Ok::<_, anyhow::Error>(())
    }
    .instrument(logger::run_span("upload-session"))
    .await
}
