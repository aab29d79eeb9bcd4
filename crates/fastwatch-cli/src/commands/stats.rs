use chrono::Local;
use fastwatch_core::load_stats;

use super::{open, print_json, CmdResult};

/// Statistics use local calendar days.
pub async fn run() -> CmdResult {
    let (_, store) = open()?;
    let stats = load_stats(store.as_ref(), Local::now()).await?;
    print_json(&stats)
}
