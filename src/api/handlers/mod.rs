pub mod devices;
pub mod notifications;
pub mod settings;
pub mod temperature;
pub mod users;

use utoipa::OpenApi;

use super::dto;
use crate::{db::models, notify::ChannelResult};

/// Bounded list queries: default 100 entries, hard cap 1000.
pub(crate) fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(100).clamp(1, 1000)
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        devices::register_device,
        devices::register_probe,
        devices::list_probes,
        devices::update_device_connection,
        devices::update_probe_connection,
        users::register_user,
        users::login,
        users::get_me,
        users::update_me,
        users::claim_device,
        users::list_my_devices,
        users::get_notification_settings,
        users::update_notification_settings,
        users::create_trigger,
        users::list_triggers,
        users::update_trigger,
        users::delete_trigger,
        temperature::update_temperature,
        temperature::set_target_temperature,
        temperature::get_history,
        temperature::get_target,
        temperature::get_average,
        settings::sync_settings,
        settings::set_target_from_device,
        settings::set_target_from_user,
        settings::get_target_history,
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        notifications::send_test_notification,
        health,
    ),
    components(schemas(
        dto::DeviceRegistrationRequest,
        dto::DeviceRegistrationResponse,
        dto::ProbeRegistrationRequest,
        dto::ProbeRegistrationResponse,
        dto::DeviceDto,
        dto::ProbeDto,
        dto::ConnectionUpdateRequest,
        dto::RegisterUserRequest,
        dto::UserDto,
        dto::LoginRequest,
        dto::TokenResponse,
        dto::UpdateUserRequest,
        dto::NotificationSettingsDto,
        dto::NotificationSettingsUpdateRequest,
        dto::CustomTriggerCreateRequest,
        dto::CustomTriggerUpdateRequest,
        dto::CustomTriggerDto,
        dto::ProbeReadingInput,
        dto::TemperatureUpdateRequest,
        dto::TemperatureUpdateResponse,
        dto::TemperatureReadingDto,
        dto::TargetTemperatureRequest,
        dto::TargetTemperatureDto,
        dto::AverageResponse,
        dto::SetTargetRequest,
        dto::ThresholdBounds,
        dto::SyncTriggerDto,
        dto::SyncResponse,
        dto::NotificationDto,
        dto::ReadAllResponse,
        dto::TestNotificationRequest,
        dto::TestNotificationResponse,
        models::TriggerCondition,
        models::TargetSetter,
        models::NotificationChannel,
        models::NotificationKind,
        ChannelResult,
    )),
    tags(
        (name = "devices", description = "Device and probe registry"),
        (name = "users", description = "Accounts, profiles and trigger configuration"),
        (name = "temperature", description = "Telemetry ingest and history"),
        (name = "settings", description = "Device settings synchronisation"),
        (name = "notifications", description = "Notification history and delivery"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "ThermoCloud API",
        version = "0.1.0",
        description = "REST API for cloud-connected cooking thermometers"
    )
)]
pub struct ApiDoc;
