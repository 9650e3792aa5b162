use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Postgres enums
// ---------------------------------------------------------------------------

/// Mirrors the `trigger_condition` Postgres enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "trigger_condition", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    Above,
    Below,
    Equal,
}

/// Mirrors the `target_setter` Postgres enum. Records whether a target
/// temperature row originated from the device itself or from a user, so a
/// device's own applied-value readback is never misread as a new command.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "target_setter", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TargetSetter {
    Device,
    User,
}

/// Mirrors the `notification_channel` Postgres enum. `App` is the in-app
/// history entry written when no external channel is enabled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "notification_channel", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    App,
    Email,
    Sms,
    Push,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationChannel::App => "app",
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
            NotificationChannel::Push => "push",
        };
        f.write_str(s)
    }
}

/// Mirrors the `notification_kind` Postgres enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TemperatureAlert,
    CustomTrigger,
    ConnectionLost,
    Test,
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub id: Uuid,
    /// External identifier chosen by the hardware at registration time.
    pub device_id: String,
    /// Secret credential, immutable after issuance. Never serialised into
    /// user-facing responses; only the registration response carries it.
    pub api_key: String,
    pub name: Option<String>,
    pub model: String,
    pub firmware_version: String,
    pub is_connected: bool,
    pub last_connected: Option<DateTime<Utc>>,
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// User-facing label: the friendly name when set, the external id otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.device_id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Probe {
    pub id: Uuid,
    /// External identifier, unique within the owning device.
    pub probe_id: String,
    pub device_id: Uuid,
    pub name: Option<String>,
    pub model: Option<String>,
    pub is_connected: bool,
    pub last_connected: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Probe {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.probe_id)
    }
}

/// Append-only; rows are immutable once written.
#[derive(Debug, Clone, FromRow)]
pub struct TemperatureReading {
    pub id: Uuid,
    pub device_id: Uuid,
    pub probe_id: Option<Uuid>,
    pub temperature: f64,
    pub is_average: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only history; the device's current target is the latest row.
#[derive(Debug, Clone, FromRow)]
pub struct TargetTemperature {
    pub id: Uuid,
    pub device_id: Uuid,
    pub temperature: f64,
    pub set_by: TargetSetter,
    pub set_by_user_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationSettings {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub max_temp_threshold: Option<f64>,
    pub min_temp_threshold: Option<f64>,
    pub connection_alerts: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CustomTrigger {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub condition: TriggerCondition,
    pub threshold: f64,
    /// Device scope; `None` means the trigger applies to any of the user's
    /// devices. Probe scope requires device scope (enforced by the schema).
    pub device_id: Option<Uuid>,
    pub probe_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Option<Uuid>,
    pub probe_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
