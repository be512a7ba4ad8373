use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{DeliveryReport, SmsError, SmsSender};

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Clone)]
pub struct TwilioOptions {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Sends plain SMS through the Twilio Messages API.
#[derive(Debug, Clone)]
pub struct TwilioSender {
    options: TwilioOptions,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    status: String,
}

impl TwilioSender {
    pub fn new(options: TwilioOptions) -> Result<Self, SmsError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            options,
            client,
            base_url: API_BASE.to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, self.options.account_sid
        )
    }

    async fn post_message(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let mut form_body: HashMap<&str, &str> = HashMap::new();
        form_body.insert("To", to);
        form_body.insert("From", &self.options.from_number);
        form_body.insert("Body", body);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.options.account_sid, Some(&self.options.auth_token))
            .form(&form_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Twilio error ({}): {}", status, body);
            return Err(SmsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message: MessageResponse = response.json().await?;
        debug!("Twilio accepted message {} ({})", message.sid, message.status);
        Ok(())
    }
}

#[async_trait]
impl SmsSender for TwilioSender {
    async fn send(&self, to: &str, body: &str) -> DeliveryReport {
        self.post_message(to, body).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_url_includes_account() {
        let sender = TwilioSender::new(TwilioOptions {
            account_sid: "AC123".into(),
            auth_token: "token".into(),
            from_number: "+15005550006".into(),
        })
        .unwrap();

        assert_eq!(
            sender.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn unreachable_provider_reports_failure() {
        let mut sender = TwilioSender::new(TwilioOptions {
            account_sid: "AC123".into(),
            auth_token: "token".into(),
            from_number: "+15005550006".into(),
        })
        .unwrap();
        // Nothing listens on port 9 locally.
        sender.base_url = "http://127.0.0.1:9".into();

        let report = sender.send("+233241234567", "hello").await;
        assert!(!report.success);
        assert!(report.error_detail.is_some());
    }
}
