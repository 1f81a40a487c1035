#![allow(clippy::new_without_default)]

use anyhow::Context;

pub mod config;
pub mod engagement;
pub mod ingest;
pub mod item_store;
pub mod logger;
pub mod posting;
pub mod queue;
pub mod record_store;
pub mod session;
pub mod social;
pub mod token;
pub mod utils;

pub fn deserialize_payload<T: serde::de::DeserializeOwned>(v: &str) -> anyhow::Result<T> {
    let mut deserializer = serde_json::Deserializer::from_str(v);
    let res: Result<T, _> = serde_path_to_error::deserialize(&mut deserializer);
    match res {
        Ok(r) => Ok(r),
        Err(e) => {
            let ctx = format!("at {:?}", e.path());
            Err(e.into_inner()).context(ctx)
        }
    }
}
