use clap::Subcommand;
use fastwatch_core::{Config, TelegramNotifier};

use super::CmdResult;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Telegram bot: login / logout / status
    Telegram {
        #[command(subcommand)]
        action: AuthOp,
    },
}

#[derive(Subcommand)]
pub enum AuthOp {
    /// Store the bot token and target chat
    Login {
        /// Bot API token
        #[arg(long)]
        token: String,
        /// Chat to post reminders to
        #[arg(long)]
        chat_id: Option<String>,
    },
    /// Remove the stored token
    Logout,
    /// Check whether the channel can send
    Status,
}

pub fn run(action: AuthAction) -> CmdResult {
    match action {
        AuthAction::Telegram { action: op } => handle_telegram(op),
    }
}

fn handle_telegram(op: AuthOp) -> CmdResult {
    match op {
        AuthOp::Login { token, chat_id } => {
            TelegramNotifier::store_token(&token)?;
            if let Some(chat_id) = chat_id {
                let mut config = Config::load()?;
                config.telegram.chat_id = chat_id;
                config.notifications.telegram_notifications = true;
                config.save()?;
            }
            println!("Telegram token stored");
        }
        AuthOp::Logout => {
            TelegramNotifier::forget_token()?;
            println!("Telegram token removed");
        }
        AuthOp::Status => {
            let config = Config::load()?;
            let notifier = TelegramNotifier::from_config(&config.telegram);
            let status = if notifier.is_configured() {
                "configured"
            } else if TelegramNotifier::has_stored_token() {
                "token stored, chat_id missing"
            } else {
                "not configured"
            };
            println!("{status}");
        }
    }
    Ok(())
}
