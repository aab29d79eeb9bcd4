//! Telegram channel -- post reminders through a bot's `sendMessage`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{keyring_store, ChannelKind, NotificationChannel, NotificationRecord};
use crate::error::NotifyError;
use crate::storage::TelegramConfig;

const TOKEN_KEY: &str = "telegram_bot_token";
const TOKEN_ENV: &str = "FASTWATCH_TELEGRAM_TOKEN";

pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Build from config, reading the bot token from the environment or the
    /// OS keyring (empty if absent).
    pub fn from_config(config: &TelegramConfig) -> Self {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| keyring_store::get(TOKEN_KEY).ok().flatten())
            .unwrap_or_default();
        Self::new(&config.api_base, token, &config.chat_id)
    }

    /// Persist a bot token to the OS keyring.
    pub fn store_token(token: &str) -> Result<(), NotifyError> {
        keyring_store::set(TOKEN_KEY, token)
    }

    pub fn forget_token() -> Result<(), NotifyError> {
        keyring_store::delete(TOKEN_KEY)
    }

    pub fn has_stored_token() -> bool {
        std::env::var(TOKEN_ENV).is_ok_and(|t| !t.is_empty())
            || matches!(keyring_store::get(TOKEN_KEY), Ok(Some(_)))
    }

    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && !self.chat_id.is_empty()
    }

    async fn post_message(&self, text: &str) -> Result<(), NotifyError> {
        if !self.is_configured() {
            return Err(NotifyError::NotConfigured("telegram"));
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = json!({ "chat_id": self.chat_id, "text": text });
        let resp = self.client.post(&url).json(&body).send().await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(NotifyError::Http { status, body })
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
        self.post_message(&record.message).await
    }
}
