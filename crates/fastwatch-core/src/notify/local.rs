//! On-device channel: appends to the store's notification inbox.

use std::sync::Arc;

use async_trait::async_trait;
use super::{ChannelKind, NotificationChannel, NotificationRecord};
use crate::error::NotifyError;
use crate::storage::FastingStore;

pub struct LocalNotifier {
    store: Arc<dyn FastingStore>,
}

impl LocalNotifier {
    pub fn new(store: Arc<dyn FastingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationChannel for LocalNotifier {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Local
    }

    async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
        tracing::info!(
            kind = %record.kind,
            minutes_offset = record.minutes_offset,
            "{}",
            record.message
        );
        self.store.push_notification(record).await?;
        Ok(())
    }
}
