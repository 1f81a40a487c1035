use clap::Parser;
use notifeed::logger;
use notifeed::record_store::RecordStoreClient;
use notifeed::token::AUTH_TABLE;

/// Prints the records of a remote table.
#[derive(Parser, Debug)]
struct Opt {
    #[arg(default_value = AUTH_TABLE)]
    table: String,

    /// Print full values instead of truncating long ones.
    #[arg(long)]
    full: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let opt = Opt::parse();
    let store = RecordStoreClient::new_from_env()?;
    let Some(data) = store.get_table_data(&opt.table, None).await else {
        anyhow::bail!("could not read table `{}`", opt.table);
    };
    if let Some(error) = &data.error {
        anyhow::bail!("table `{}`: {error}", opt.table);
    }

    println!("{} records in `{}`", data.records.len(), opt.table);
    for record in &data.records {
        println!("- id: {}", record.id.as_deref().unwrap_or("<none>"));
        for (key, value) in &record.fields {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if opt.full || value.chars().count() <= 60 {
                println!("    {key}: {value}");
            } else {
                let head: String = value.chars().take(60).collect();
                println!("    {key}: {head}... ({} chars)", value.chars().count());
            }
        }
    }
    Ok(())
}
