pub mod auth;
pub mod config;
pub mod fast;
pub mod notify;
pub mod preset;
pub mod stats;

use std::sync::Arc;

use fastwatch_core::{open_store, Config, FastingEngine, FastingStore};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Load config and open the configured store.
pub fn open() -> Result<(Config, Arc<dyn FastingStore>), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    Ok((config, store))
}

/// Engine over the configured store, with default presets seeded on first use.
pub async fn engine() -> Result<(Config, FastingEngine), Box<dyn std::error::Error>> {
    let (config, store) = open()?;
    let engine = FastingEngine::new(store);
    let seeded = engine.seed_default_presets().await?;
    if seeded > 0 {
        tracing::debug!(count = seeded, "seeded default presets");
    }
    Ok((config, engine))
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
