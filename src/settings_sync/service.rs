//! Reconciliation of device-held settings with their cloud-stored values.
//!
//! Target temperature is last-writer-wins by timestamp. Each write appends a
//! row tagged with who set it, so a device echoing back the value it just
//! applied can be told apart from a fresh user command.

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    api::errors::ApiError,
    db::models::{CustomTrigger, Device, NotificationSettings, TargetSetter, TargetTemperature},
    telemetry::service::validate_temperature,
};

pub struct SettingsSync {
    pool: PgPool,
}

/// Everything a device pulls during a sync poll.
#[derive(Debug)]
pub struct DeviceSyncData {
    pub target: Option<TargetTemperature>,
    pub settings: Option<NotificationSettings>,
    /// Active triggers scoped to this device.
    pub triggers: Vec<CustomTrigger>,
    pub last_sync: chrono::DateTime<Utc>,
}

impl SettingsSync {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a target-temperature row. For user-originated writes the user
    /// must own the device.
    pub async fn set_target(
        &self,
        device: &Device,
        temperature: f64,
        set_by: TargetSetter,
        user_id: Option<Uuid>,
    ) -> Result<TargetTemperature, ApiError> {
        validate_temperature(temperature)?;

        if set_by == TargetSetter::User {
            let Some(user_id) = user_id else {
                return Err(ApiError::Validation(
                    "user-originated target requires a user".into(),
                ));
            };
            if device.owner_id != Some(user_id) {
                return Err(ApiError::Unauthorized("device is not owned by this user"));
            }
        }

        let target = sqlx::query_as::<_, TargetTemperature>(
            "INSERT INTO target_temperatures (device_id, temperature, set_by, set_by_user_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING *",
        )
        .bind(device.id)
        .bind(temperature)
        .bind(set_by)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        info!(
            device_id = %device.device_id,
            temperature,
            set_by = ?set_by,
            "target temperature updated"
        );
        Ok(target)
    }

    /// The current target: latest row by timestamp regardless of setter.
    pub async fn current_target(
        &self,
        device: &Device,
    ) -> Result<Option<TargetTemperature>, ApiError> {
        let target = sqlx::query_as::<_, TargetTemperature>(
            "SELECT * FROM target_temperatures WHERE device_id = $1 \
             ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(device.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(target)
    }

    pub async fn target_history(
        &self,
        device: &Device,
        limit: i64,
    ) -> Result<Vec<TargetTemperature>, ApiError> {
        let rows = sqlx::query_as::<_, TargetTemperature>(
            "SELECT * FROM target_temperatures WHERE device_id = $1 \
             ORDER BY recorded_at DESC LIMIT $2",
        )
        .bind(device.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Collect the device's sync payload and refresh its last-connected
    /// stamp — a sync poll is proof of life.
    pub async fn sync(&self, device: &Device) -> Result<DeviceSyncData, ApiError> {
        let target = self.current_target(device).await?;

        let (settings, triggers) = match device.owner_id {
            Some(owner_id) => {
                let settings = sqlx::query_as::<_, NotificationSettings>(
                    "SELECT * FROM notification_settings WHERE user_id = $1",
                )
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?;

                let triggers = sqlx::query_as::<_, CustomTrigger>(
                    "SELECT * FROM custom_triggers \
                     WHERE user_id = $1 AND device_id = $2 AND is_active \
                     ORDER BY created_at",
                )
                .bind(owner_id)
                .bind(device.id)
                .fetch_all(&self.pool)
                .await?;

                (settings, triggers)
            }
            None => (None, Vec::new()),
        };

        sqlx::query(
            "UPDATE devices SET is_connected = TRUE, last_connected = now(), updated_at = now() \
             WHERE id = $1",
        )
        .bind(device.id)
        .execute(&self.pool)
        .await?;

        Ok(DeviceSyncData {
            target,
            settings,
            triggers,
            last_sync: Utc::now(),
        })
    }
}
