use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use fastwatch_core::{
    Config, FastingStore, LocalNotifier, MilestoneScheduler, NotificationChannel,
    TelegramNotifier,
};

use super::{open, print_json, CmdResult};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Run the milestone scheduler until Ctrl-C
    Run {
        /// Polling period in seconds (defaults to scheduler.tick_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Evaluate milestones once and print what fired
    Tick,
    /// Show recent local notifications, newest first
    Inbox {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn channels(config: &Config, store: &Arc<dyn FastingStore>) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> =
        vec![Arc::new(LocalNotifier::new(Arc::clone(store)))];
    let telegram = TelegramNotifier::from_config(&config.telegram);
    if telegram.is_configured() {
        channels.push(Arc::new(telegram));
    } else if config.notifications.telegram_notifications {
        tracing::warn!("telegram notifications enabled but no token or chat_id configured");
    }
    channels
}

fn scheduler(config: &Config, store: Arc<dyn FastingStore>) -> MilestoneScheduler {
    let channels = channels(config, &store);
    MilestoneScheduler::new(store, channels, config.notifications.clone())
}

pub async fn run(action: NotifyAction) -> CmdResult {
    let (config, store) = open()?;

    match action {
        NotifyAction::Run { interval } => {
            let period = Duration::from_secs(
                interval
                    .unwrap_or(config.scheduler.tick_interval_secs)
                    .max(1),
            );
            let scheduler = Arc::new(scheduler(&config, store));
            let handle = scheduler.spawn(period)?;
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            handle.shutdown().await;
        }
        NotifyAction::Tick => {
            let report = scheduler(&config, store).tick(Utc::now()).await?;
            print_json(&report)?;
        }
        NotifyAction::Inbox { limit } => {
            let inbox = store.list_notifications(limit).await?;
            print_json(&inbox)?;
        }
    }
    Ok(())
}
