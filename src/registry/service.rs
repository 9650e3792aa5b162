//! Device and probe registry: identity issuance, connection state, and
//! ownership association.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    api::errors::{is_unique_violation, ApiError},
    auth,
    db::models::{Device, Probe},
};

pub struct DeviceRegistry {
    pool: PgPool,
    max_probes_per_device: i64,
}

#[derive(Debug)]
pub struct NewDevice<'a> {
    pub device_id: &'a str,
    pub name: Option<&'a str>,
    pub model: &'a str,
    pub firmware_version: &'a str,
}

#[derive(Debug)]
pub struct NewProbe<'a> {
    pub probe_id: &'a str,
    pub name: Option<&'a str>,
    pub model: Option<&'a str>,
}

impl DeviceRegistry {
    pub fn new(pool: PgPool, max_probes_per_device: i64) -> Self {
        Self {
            pool,
            max_probes_per_device,
        }
    }

    /// Register a device and issue its API key. The external device_id must
    /// be unused; the key is immutable after issuance, so re-registration is
    /// rejected rather than refreshed.
    pub async fn register_device(&self, new: NewDevice<'_>) -> Result<Device, ApiError> {
        validate_external_id("device_id", new.device_id)?;
        if new.model.trim().is_empty() {
            return Err(ApiError::Validation("model must not be empty".into()));
        }
        if new.firmware_version.trim().is_empty() {
            return Err(ApiError::Validation(
                "firmware_version must not be empty".into(),
            ));
        }

        let api_key = auth::generate_api_key();
        let device = sqlx::query_as::<_, Device>(
            "INSERT INTO devices (device_id, api_key, name, model, firmware_version, is_connected, last_connected) \
             VALUES ($1, $2, $3, $4, $5, TRUE, now()) \
             RETURNING *",
        )
        .bind(new.device_id)
        .bind(&api_key)
        .bind(new.name)
        .bind(new.model)
        .bind(new.firmware_version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::DuplicateIdentity(format!(
                    "device {} already registered",
                    new.device_id
                ))
            } else {
                e.into()
            }
        })?;

        info!(device_id = %device.device_id, "device registered");
        Ok(device)
    }

    /// Register a probe under an already-registered device. The probe_id
    /// must be unused within that device, and the per-device cap holds.
    pub async fn register_probe(
        &self,
        device: &Device,
        new: NewProbe<'_>,
    ) -> Result<Probe, ApiError> {
        validate_external_id("probe_id", new.probe_id)?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM probes WHERE device_id = $1")
                .bind(device.id)
                .fetch_one(&self.pool)
                .await?;
        if count >= self.max_probes_per_device {
            return Err(ApiError::Validation(format!(
                "device already has the maximum number of probes ({})",
                self.max_probes_per_device
            )));
        }

        let probe = sqlx::query_as::<_, Probe>(
            "INSERT INTO probes (probe_id, device_id, name, model, is_connected, last_connected) \
             VALUES ($1, $2, $3, $4, TRUE, now()) \
             RETURNING *",
        )
        .bind(new.probe_id)
        .bind(device.id)
        .bind(new.name)
        .bind(new.model)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::DuplicateIdentity(format!(
                    "probe {} already registered on device {}",
                    new.probe_id, device.device_id
                ))
            } else {
                e.into()
            }
        })?;

        info!(device_id = %device.device_id, probe_id = %probe.probe_id, "probe registered");
        Ok(probe)
    }

    pub async fn probes_for_device(&self, device: &Device) -> Result<Vec<Probe>, ApiError> {
        let probes = sqlx::query_as::<_, Probe>(
            "SELECT * FROM probes WHERE device_id = $1 ORDER BY created_at",
        )
        .bind(device.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(probes)
    }

    pub async fn probe_by_external_id(
        &self,
        device: &Device,
        probe_id: &str,
    ) -> Result<Probe, ApiError> {
        sqlx::query_as::<_, Probe>(
            "SELECT * FROM probes WHERE device_id = $1 AND probe_id = $2",
        )
        .bind(device.id)
        .bind(probe_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::UnknownProbe(probe_id.to_owned()))
    }

    /// Flip the device's connection flag. `last_connected` only advances on
    /// reconnect; a disconnect keeps the last known timestamp.
    pub async fn set_device_connection(
        &self,
        device: &Device,
        is_connected: bool,
    ) -> Result<Device, ApiError> {
        let updated = sqlx::query_as::<_, Device>(
            "UPDATE devices \
             SET is_connected = $2, \
                 last_connected = CASE WHEN $2 THEN now() ELSE last_connected END, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(device.id)
        .bind(is_connected)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    pub async fn set_probe_connection(
        &self,
        probe: &Probe,
        is_connected: bool,
    ) -> Result<Probe, ApiError> {
        let updated = sqlx::query_as::<_, Probe>(
            "UPDATE probes \
             SET is_connected = $2, \
                 last_connected = CASE WHEN $2 THEN now() ELSE last_connected END, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(probe.id)
        .bind(is_connected)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    /// Associate a device with a user. Claiming an already-owned device by
    /// the same user is a no-op; a different user takes ownership over. No
    /// ownership history is kept.
    pub async fn claim_device(
        &self,
        user_id: Uuid,
        external_device_id: &str,
    ) -> Result<Device, ApiError> {
        let device = sqlx::query_as::<_, Device>(
            "UPDATE devices SET owner_id = $1, updated_at = now() \
             WHERE device_id = $2 \
             RETURNING *",
        )
        .bind(user_id)
        .bind(external_device_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::UnknownDevice(external_device_id.to_owned()))?;

        info!(device_id = %device.device_id, user_id = %user_id, "device claimed");
        Ok(device)
    }

    pub async fn owned_devices(&self, user_id: Uuid) -> Result<Vec<Device>, ApiError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(devices)
    }
}

/// External identifiers are printable hardware labels: 1–64 chars of ASCII
/// alphanumerics, dashes and underscores.
fn validate_external_id(field: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() || value.len() > 64 {
        return Err(ApiError::Validation(format!(
            "{field} must be between 1 and 64 characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::Validation(format!(
            "{field} may only contain letters, digits, dashes and underscores"
        )));
    }
    Ok(())
}
