//! Telemetry ingest and reading history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::{
    api::errors::ApiError,
    db::models::{Device, Probe, TargetTemperature, TemperatureReading},
};

/// Sanity bounds for any temperature accepted at the boundary, in °F.
/// Values outside are treated as sensor garbage and rejected.
const MIN_PLAUSIBLE_TEMP: f64 = -200.0;
const MAX_PLAUSIBLE_TEMP: f64 = 1500.0;

pub struct TelemetryService {
    pool: PgPool,
}

#[derive(Debug)]
pub struct ProbeReading<'a> {
    pub probe_id: &'a str,
    pub temperature: f64,
}

/// One persisted raw reading together with its (connection-refreshed) probe,
/// kept for threshold evaluation.
#[derive(Debug)]
pub struct StoredReading {
    pub reading: TemperatureReading,
    pub probe: Probe,
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub raw: Vec<StoredReading>,
    /// The batch average: the device-supplied value when given (also
    /// persisted as an `is_average` row), otherwise computed over the
    /// connected probes' most recent values in this batch. Not persisted
    /// when computed.
    pub average: Option<f64>,
    pub target: Option<TargetTemperature>,
}

#[derive(Debug, Default)]
pub struct HistoryFilter<'a> {
    pub probe_id: Option<&'a str>,
    /// `Some(true)` = average rows only, `Some(false)` = raw rows only.
    pub is_average: Option<bool>,
    pub limit: i64,
}

/// History row joined back to external identifiers.
#[derive(Debug, FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub device_id: String,
    pub probe_id: Option<String>,
    pub temperature: f64,
    pub is_average: bool,
    pub recorded_at: DateTime<Utc>,
}

impl TelemetryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a batch of probe readings (and an optional device-computed
    /// average) as immutable rows in one transaction. Reporting probes are
    /// marked connected; probes that stay silent are left alone rather than
    /// treated as zero.
    pub async fn ingest(
        &self,
        device: &Device,
        readings: &[ProbeReading<'_>],
        average_temperature: Option<f64>,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<IngestOutcome, ApiError> {
        if readings.is_empty() && average_temperature.is_none() {
            return Err(ApiError::Validation(
                "at least one reading or an average_temperature is required".into(),
            ));
        }
        for reading in readings {
            validate_temperature(reading.temperature)?;
        }
        if let Some(avg) = average_temperature {
            validate_temperature(avg)?;
        }

        let recorded_at = recorded_at.unwrap_or_else(Utc::now);
        let mut tx = self.pool.begin().await?;
        let mut raw = Vec::with_capacity(readings.len());

        for reading in readings {
            let probe = sqlx::query_as::<_, Probe>(
                "UPDATE probes SET is_connected = TRUE, last_connected = now(), updated_at = now() \
                 WHERE device_id = $1 AND probe_id = $2 \
                 RETURNING *",
            )
            .bind(device.id)
            .bind(reading.probe_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::UnknownProbe(reading.probe_id.to_owned()))?;

            let row = sqlx::query_as::<_, TemperatureReading>(
                "INSERT INTO temperature_readings (device_id, probe_id, temperature, is_average, recorded_at) \
                 VALUES ($1, $2, $3, FALSE, $4) \
                 RETURNING *",
            )
            .bind(device.id)
            .bind(probe.id)
            .bind(reading.temperature)
            .bind(recorded_at)
            .fetch_one(&mut *tx)
            .await?;

            raw.push(StoredReading {
                reading: row,
                probe,
            });
        }

        if let Some(avg) = average_temperature {
            sqlx::query(
                "INSERT INTO temperature_readings (device_id, temperature, is_average, recorded_at) \
                 VALUES ($1, $2, TRUE, $3)",
            )
            .bind(device.id)
            .bind(avg)
            .bind(recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE devices SET is_connected = TRUE, last_connected = now(), updated_at = now() \
             WHERE id = $1",
        )
        .bind(device.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let average = average_temperature.or_else(|| batch_average(&raw));
        let target = self.latest_target(device.id).await?;

        info!(
            device_id = %device.device_id,
            readings = raw.len(),
            average = ?average,
            "temperature batch ingested"
        );

        Ok(IngestOutcome {
            raw,
            average,
            target,
        })
    }

    /// Bounded, most-recent-first reading history, optionally narrowed to
    /// one probe and to average-only or raw-only rows.
    pub async fn history(
        &self,
        device: &Device,
        filter: HistoryFilter<'_>,
    ) -> Result<Vec<HistoryRow>, ApiError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT r.id, d.device_id, p.probe_id, r.temperature, r.is_average, r.recorded_at \
             FROM temperature_readings r \
             JOIN devices d ON d.id = r.device_id \
             LEFT JOIN probes p ON p.id = r.probe_id \
             WHERE r.device_id = $1 \
               AND ($2::text IS NULL OR p.probe_id = $2) \
               AND ($3::boolean IS NULL OR r.is_average = $3) \
             ORDER BY r.recorded_at DESC \
             LIMIT $4",
        )
        .bind(device.id)
        .bind(filter.probe_id)
        .bind(filter.is_average)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// On-demand mean over each connected probe's latest raw reading.
    /// `None` when no connected probe has reported yet.
    pub async fn current_average(&self, device: &Device) -> Result<Option<f64>, ApiError> {
        let average: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(latest.temperature) FROM ( \
                 SELECT DISTINCT ON (r.probe_id) r.temperature \
                 FROM temperature_readings r \
                 JOIN probes p ON p.id = r.probe_id \
                 WHERE p.device_id = $1 AND p.is_connected AND NOT r.is_average \
                 ORDER BY r.probe_id, r.recorded_at DESC \
             ) latest",
        )
        .bind(device.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(average)
    }

    pub async fn latest_target(
        &self,
        device_id: Uuid,
    ) -> Result<Option<TargetTemperature>, ApiError> {
        let target = sqlx::query_as::<_, TargetTemperature>(
            "SELECT * FROM target_temperatures WHERE device_id = $1 \
             ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(target)
    }
}

pub(crate) fn validate_temperature(value: f64) -> Result<(), ApiError> {
    if !value.is_finite() || !(MIN_PLAUSIBLE_TEMP..=MAX_PLAUSIBLE_TEMP).contains(&value) {
        return Err(ApiError::Validation(format!(
            "temperature {value} is outside the plausible range \
             [{MIN_PLAUSIBLE_TEMP}, {MAX_PLAUSIBLE_TEMP}]"
        )));
    }
    Ok(())
}

/// Arithmetic mean over the most recent value per connected probe in this
/// batch. Probes that did not report are excluded, not treated as zero.
fn batch_average(raw: &[StoredReading]) -> Option<f64> {
    let mut latest: HashMap<Uuid, f64> = HashMap::new();
    for stored in raw {
        if stored.probe.is_connected {
            latest.insert(stored.probe.id, stored.reading.temperature);
        }
    }
    if latest.is_empty() {
        return None;
    }
    Some(latest.values().sum::<f64>() / latest.len() as f64)
}
