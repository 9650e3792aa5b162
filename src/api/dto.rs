//! Request and response bodies. Every endpoint speaks an explicit struct,
//! validated at the boundary; internal row types never serialise directly,
//! which keeps secrets (password hashes, API keys) out of responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::models::{
        Device, Notification, NotificationChannel, NotificationKind, NotificationSettings,
        Probe, TargetSetter, TargetTemperature, TriggerCondition, User,
    },
    notify::DeliveryReport,
    settings_sync::DeviceSyncData,
    telemetry::service::HistoryRow,
    users::service::TriggerView,
};

// ---------------------------------------------------------------------------
// Devices & probes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeviceRegistrationRequest {
    /// External identifier printed on the hardware.
    pub device_id: String,
    pub name: Option<String>,
    pub model: String,
    pub firmware_version: String,
}

/// The only response that ever carries the API key.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceRegistrationResponse {
    pub device_id: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProbeRegistrationRequest {
    pub probe_id: String,
    pub name: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProbeRegistrationResponse {
    pub probe_id: String,
    pub device_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceDto {
    pub device_id: String,
    pub name: Option<String>,
    pub model: String,
    pub firmware_version: String,
    pub is_connected: bool,
    pub last_connected: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Device> for DeviceDto {
    fn from(d: Device) -> Self {
        Self {
            device_id: d.device_id,
            name: d.name,
            model: d.model,
            firmware_version: d.firmware_version,
            is_connected: d.is_connected,
            last_connected: d.last_connected,
            created_at: d.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProbeDto {
    pub probe_id: String,
    pub name: Option<String>,
    pub model: Option<String>,
    pub is_connected: bool,
    pub last_connected: Option<DateTime<Utc>>,
}

impl From<Probe> for ProbeDto {
    fn from(p: Probe) -> Self {
        Self {
            probe_id: p.probe_id,
            name: p.name,
            model: p.model,
            is_connected: p.is_connected,
            last_connected: p.last_connected,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectionUpdateRequest {
    pub is_connected: bool,
}

// ---------------------------------------------------------------------------
// Users & auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            phone_number: u.phone_number,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationSettingsDto {
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub max_temp_threshold: Option<f64>,
    pub min_temp_threshold: Option<f64>,
    pub connection_alerts: bool,
}

impl From<NotificationSettings> for NotificationSettingsDto {
    fn from(s: NotificationSettings) -> Self {
        Self {
            email_enabled: s.email_enabled,
            sms_enabled: s.sms_enabled,
            push_enabled: s.push_enabled,
            max_temp_threshold: s.max_temp_threshold,
            min_temp_threshold: s.min_temp_threshold,
            connection_alerts: s.connection_alerts,
        }
    }
}

/// Partial update: absent fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NotificationSettingsUpdateRequest {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub max_temp_threshold: Option<f64>,
    pub min_temp_threshold: Option<f64>,
    pub connection_alerts: Option<bool>,
}

// ---------------------------------------------------------------------------
// Custom triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomTriggerCreateRequest {
    pub name: String,
    pub condition: TriggerCondition,
    pub threshold: f64,
    /// External device id; required when `probe_id` is given.
    pub device_id: Option<String>,
    pub probe_id: Option<String>,
    /// Defaults to active.
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomTriggerUpdateRequest {
    pub name: Option<String>,
    pub condition: Option<TriggerCondition>,
    pub threshold: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomTriggerDto {
    pub id: Uuid,
    pub name: String,
    pub condition: TriggerCondition,
    pub threshold: f64,
    pub device_id: Option<String>,
    pub probe_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<TriggerView> for CustomTriggerDto {
    fn from(t: TriggerView) -> Self {
        Self {
            id: t.id,
            name: t.name,
            condition: t.condition,
            threshold: t.threshold,
            device_id: t.device_id,
            probe_id: t.probe_id,
            is_active: t.is_active,
            created_at: t.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProbeReadingInput {
    pub probe_id: String,
    pub temperature: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TemperatureUpdateRequest {
    pub device_id: String,
    pub readings: Vec<ProbeReadingInput>,
    /// Device-computed average; persisted as an average row when present.
    pub average_temperature: Option<f64>,
    /// Defaults to the server's receipt time.
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TemperatureUpdateResponse {
    pub message: String,
    /// The batch average (supplied or computed over connected probes).
    pub average_temperature: Option<f64>,
    /// Current target, returned so the device can self-correct without a
    /// second round trip.
    pub target_temperature: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TemperatureReadingDto {
    pub id: Uuid,
    pub device_id: String,
    pub probe_id: Option<String>,
    pub temperature: f64,
    pub is_average: bool,
    pub recorded_at: DateTime<Utc>,
}

impl From<HistoryRow> for TemperatureReadingDto {
    fn from(r: HistoryRow) -> Self {
        Self {
            id: r.id,
            device_id: r.device_id,
            probe_id: r.probe_id,
            temperature: r.temperature,
            is_average: r.is_average,
            recorded_at: r.recorded_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub probe_id: Option<String>,
    pub limit: Option<i64>,
    pub is_average: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TargetTemperatureRequest {
    pub device_id: String,
    pub temperature: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TargetTemperatureDto {
    pub temperature: f64,
    pub set_by: TargetSetter,
    pub set_by_user_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

impl From<TargetTemperature> for TargetTemperatureDto {
    fn from(t: TargetTemperature) -> Self {
        Self {
            temperature: t.temperature,
            set_by: t.set_by,
            set_by_user_id: t.set_by_user_id,
            recorded_at: t.recorded_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AverageResponse {
    pub average_temperature: f64,
}

// ---------------------------------------------------------------------------
// Settings sync
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetTargetRequest {
    pub temperature: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThresholdBounds {
    pub max_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncTriggerDto {
    pub name: String,
    pub condition: TriggerCondition,
    pub threshold: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    pub device_id: String,
    pub target_temperature: Option<f64>,
    pub last_sync: DateTime<Utc>,
    pub thresholds: ThresholdBounds,
    pub custom_triggers: Vec<SyncTriggerDto>,
}

impl SyncResponse {
    pub fn from_sync_data(device_id: String, data: DeviceSyncData) -> Self {
        Self {
            device_id,
            target_temperature: data.target.map(|t| t.temperature),
            last_sync: data.last_sync,
            thresholds: ThresholdBounds {
                max_temperature: data.settings.as_ref().and_then(|s| s.max_temp_threshold),
                min_temperature: data.settings.as_ref().and_then(|s| s.min_temp_threshold),
            },
            custom_triggers: data
                .triggers
                .into_iter()
                .map(|t| SyncTriggerDto {
                    name: t.name,
                    condition: t.condition,
                    threshold: t.threshold,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationDto {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationDto {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            kind: n.kind,
            channel: n.channel,
            title: n.title,
            message: n.message,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationListParams {
    pub limit: Option<i64>,
    pub unread_only: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadAllResponse {
    pub marked: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TestNotificationRequest {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestNotificationResponse {
    pub message: String,
    pub results: DeliveryReport,
}
