//! Outbound delivery to external channel gateways.
//!
//! Each channel (email, SMS, push) forwards to an HTTP gateway endpoint
//! configured per deployment. One attempt per event, bounded by a timeout;
//! any failure is returned to the dispatcher, never raised further.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::db::models::{NotificationChannel, User};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no gateway configured for this channel")]
    NotConfigured,
    #[error("no recipient address for this channel")]
    MissingRecipient,
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub email_url: Option<String>,
    pub sms_url: Option<String>,
    pub push_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct GatewayMessage<'a> {
    recipient: &'a str,
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Clone)]
pub struct ChannelGateway {
    http: Client,
    config: GatewayConfig,
    timeout: Duration,
}

impl ChannelGateway {
    pub fn new(config: GatewayConfig, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            config,
            timeout,
        }
    }

    /// Single delivery attempt for one channel. The in-app channel has no
    /// external transport and always succeeds.
    pub async fn deliver(
        &self,
        channel: NotificationChannel,
        user: &User,
        title: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let push_recipient;
        let (url, recipient) = match channel {
            NotificationChannel::App => return Ok(()),
            NotificationChannel::Email => {
                (self.config.email_url.as_deref(), Some(user.email.as_str()))
            }
            NotificationChannel::Sms => {
                (self.config.sms_url.as_deref(), user.phone_number.as_deref())
            }
            NotificationChannel::Push => {
                push_recipient = user.id.to_string();
                (self.config.push_url.as_deref(), Some(push_recipient.as_str()))
            }
        };

        let url = url.ok_or(DeliveryError::NotConfigured)?;
        let recipient = recipient.ok_or(DeliveryError::MissingRecipient)?;

        self.http
            .post(url)
            .timeout(self.timeout)
            .json(&GatewayMessage {
                recipient,
                title,
                body,
            })
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn user(phone: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_owned(),
            email: "alice@example.com".to_owned(),
            phone_number: phone.map(str::to_owned),
            password_hash: String::new(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn app_channel_needs_no_transport() {
        let gateway = ChannelGateway::new(GatewayConfig::default(), Duration::from_secs(1));
        let result = gateway
            .deliver(NotificationChannel::App, &user(None), "t", "b")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_gateway_fails_delivery() {
        let gateway = ChannelGateway::new(GatewayConfig::default(), Duration::from_secs(1));
        let result = gateway
            .deliver(NotificationChannel::Email, &user(None), "t", "b")
            .await;
        assert!(matches!(result, Err(DeliveryError::NotConfigured)));
    }

    #[tokio::test]
    async fn sms_without_phone_number_fails_delivery() {
        let config = GatewayConfig {
            sms_url: Some("http://localhost:9/sms".to_owned()),
            ..GatewayConfig::default()
        };
        let gateway = ChannelGateway::new(config, Duration::from_secs(1));
        let result = gateway
            .deliver(NotificationChannel::Sms, &user(None), "t", "b")
            .await;
        assert!(matches!(result, Err(DeliveryError::MissingRecipient)));
    }
}
