use async_trait::async_trait;
use tracing::info;

use crate::{DeliveryReport, SmsSender};

/// Development sender: writes the message to the log instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogSender;

#[async_trait]
impl SmsSender for LogSender {
    async fn send(&self, to: &str, body: &str) -> DeliveryReport {
        info!(to, body, "SMS (log sender, not delivered)");
        DeliveryReport::delivered()
    }
}
