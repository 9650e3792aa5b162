//! Notification dispatch: persist first, deliver second.
//!
//! Every fired alert is recorded as one `notifications` row per enabled
//! channel before any gateway is contacted, so the in-app history stays
//! authoritative even when external delivery fails. With no channel enabled
//! a single in-app row is still written. Delivery failures are collected
//! into a per-channel result map and never fail the enclosing request.

pub mod transport;

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    alerts::Alert,
    db::models::{Device, NotificationChannel, NotificationSettings, Probe, User},
};

use self::transport::ChannelGateway;

/// Foreign-key scope recorded on persisted notification rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertScope {
    pub device_id: Option<Uuid>,
    pub probe_id: Option<Uuid>,
}

impl AlertScope {
    pub fn device(device: &Device) -> Self {
        Self {
            device_id: Some(device.id),
            probe_id: None,
        }
    }

    pub fn probe(device: &Device, probe: &Probe) -> Self {
        Self {
            device_id: Some(device.id),
            probe_id: Some(probe.id),
        }
    }
}

/// Outcome of one channel's delivery attempt.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChannelResult {
    pub delivered: bool,
    /// Failure detail when `delivered` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Channel name → outcome, for diagnostics and the test endpoint.
pub type DeliveryReport = BTreeMap<String, ChannelResult>;

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    pool: PgPool,
    gateway: ChannelGateway,
}

impl Dispatcher {
    pub fn new(pool: PgPool, gateway: ChannelGateway) -> Self {
        Self {
            inner: Arc::new(Inner { pool, gateway }),
        }
    }

    /// Fan one alert out to the user's enabled channels. Rows are persisted
    /// unconditionally; each gateway gets exactly one attempt.
    pub async fn dispatch(
        &self,
        user: &User,
        settings: &NotificationSettings,
        alert: &Alert,
        scope: AlertScope,
    ) -> Result<DeliveryReport, sqlx::Error> {
        let channels = enabled_channels(settings);
        let mut report = DeliveryReport::new();

        if channels.is_empty() {
            // Keep the in-app history authoritative even with everything off.
            self.persist(user.id, scope, alert, NotificationChannel::App)
                .await?;
            return Ok(report);
        }

        for channel in channels {
            self.persist(user.id, scope, alert, channel).await?;
            match self
                .inner
                .gateway
                .deliver(channel, user, &alert.title, &alert.message)
                .await
            {
                Ok(()) => {
                    info!(channel = %channel, user_id = %user.id, "notification delivered");
                    report.insert(
                        channel.to_string(),
                        ChannelResult {
                            delivered: true,
                            detail: None,
                        },
                    );
                }
                Err(e) => {
                    warn!(channel = %channel, user_id = %user.id, error = %e, "channel delivery failed");
                    report.insert(
                        channel.to_string(),
                        ChannelResult {
                            delivered: false,
                            detail: Some(e.to_string()),
                        },
                    );
                }
            }
        }

        Ok(report)
    }

    /// Connection-lost event from the registry. Silently a no-op when the
    /// device has no owner or the owner opted out of connection alerts.
    pub async fn notify_connection_lost(
        &self,
        device: &Device,
        probe: Option<&Probe>,
    ) -> Result<(), sqlx::Error> {
        let Some(owner_id) = device.owner_id else {
            return Ok(());
        };
        let Some(user) = self.active_user(owner_id).await? else {
            return Ok(());
        };
        let Some(settings) = self.settings_for(owner_id).await? else {
            return Ok(());
        };
        if !settings.connection_alerts {
            return Ok(());
        }

        let alert = connection_lost_alert(device, probe);
        let scope = match probe {
            Some(p) => AlertScope::probe(device, p),
            None => AlertScope::device(device),
        };
        self.dispatch(&user, &settings, &alert, scope).await?;
        Ok(())
    }

    async fn persist(
        &self,
        user_id: Uuid,
        scope: AlertScope,
        alert: &Alert,
        channel: NotificationChannel,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO notifications (user_id, device_id, probe_id, kind, channel, title, message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user_id)
        .bind(scope.device_id)
        .bind(scope.probe_id)
        .bind(alert.kind)
        .bind(channel)
        .bind(&alert.title)
        .bind(&alert.message)
        .execute(&self.inner.pool)
        .await?;
        Ok(())
    }

    async fn active_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active")
            .bind(user_id)
            .fetch_optional(&self.inner.pool)
            .await
    }

    async fn settings_for(
        &self,
        user_id: Uuid,
    ) -> Result<Option<NotificationSettings>, sqlx::Error> {
        sqlx::query_as::<_, NotificationSettings>(
            "SELECT * FROM notification_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.inner.pool)
        .await
    }
}

fn enabled_channels(settings: &NotificationSettings) -> Vec<NotificationChannel> {
    let mut channels = Vec::new();
    if settings.email_enabled {
        channels.push(NotificationChannel::Email);
    }
    if settings.sms_enabled {
        channels.push(NotificationChannel::Sms);
    }
    if settings.push_enabled {
        channels.push(NotificationChannel::Push);
    }
    channels
}

fn connection_lost_alert(device: &Device, probe: Option<&Probe>) -> Alert {
    use crate::db::models::NotificationKind;

    match probe {
        Some(probe) => Alert {
            kind: NotificationKind::ConnectionLost,
            title: "Probe connection lost".to_owned(),
            message: format!(
                "Connection to probe {} on device {} has been lost.",
                probe.label(),
                device.label()
            ),
        },
        None => Alert {
            kind: NotificationKind::ConnectionLost,
            title: "Device connection lost".to_owned(),
            message: format!("Connection to device {} has been lost.", device.label()),
        },
    }
}
