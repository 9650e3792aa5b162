use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    api::{
        dto::{
            CustomTriggerCreateRequest, CustomTriggerDto, CustomTriggerUpdateRequest, DeviceDto,
            LoginRequest, NotificationSettingsDto, NotificationSettingsUpdateRequest,
            RegisterUserRequest, TokenResponse, UpdateUserRequest, UserDto,
        },
        errors::ApiError,
        extract::CurrentUser,
    },
    registry::DeviceRegistry,
    state::AppState,
    users::{
        service::{NewTrigger, NewUser, ProfileUpdate, SettingsUpdate, TriggerUpdate},
        UserService,
    },
};

fn users(state: &AppState) -> UserService {
    UserService::new(state.pool.clone(), state.tokens.clone())
}

/// Register an account. The password is stored only as a salted argon2 hash.
#[utoipa::path(
    post,
    path = "/users/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "Created user", body = UserDto),
        (status = 400, description = "Invalid payload or username/email already registered"),
    ),
    tag = "users"
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<UserDto>, ApiError> {
    let user = users(&state)
        .register(NewUser {
            username: &req.username,
            email: &req.email,
            phone_number: req.phone_number.as_deref(),
            password: &req.password,
        })
        .await?;
    Ok(Json(user.into()))
}

/// Exchange credentials for a time-bounded bearer token.
#[utoipa::path(
    post,
    path = "/users/token",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token", body = TokenResponse),
        (status = 401, description = "Incorrect username or password"),
    ),
    tag = "users"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let (_, issued) = users(&state)
        .authenticate(&req.username, &req.password)
        .await?;
    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_owned(),
        expires_at: issued.expires_at,
    }))
}

/// The authenticated user's profile.
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user", body = UserDto),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "users"
)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserDto> {
    Json(user.into())
}

/// Update the authenticated user's profile.
#[utoipa::path(
    put,
    path = "/users/me",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserDto),
        (status = 400, description = "Invalid payload or identity already taken"),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "users"
)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserDto>, ApiError> {
    let updated = users(&state)
        .update_profile(
            &user,
            ProfileUpdate {
                username: req.username.as_deref(),
                email: req.email.as_deref(),
                phone_number: req.phone_number.as_deref(),
                password: req.password.as_deref(),
            },
        )
        .await?;
    Ok(Json(updated.into()))
}

/// Claim ownership of a device. Idempotent for the same user; a different
/// user takes ownership over.
#[utoipa::path(
    post,
    path = "/users/me/devices/{device_id}",
    params(("device_id" = String, Path, description = "External device id")),
    responses(
        (status = 200, description = "Claimed device", body = DeviceDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
    ),
    tag = "users"
)]
pub async fn claim_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceDto>, ApiError> {
    let registry = DeviceRegistry::new(state.pool.clone(), state.max_probes_per_device);
    let device = registry.claim_device(user.id, &device_id).await?;
    Ok(Json(device.into()))
}

/// Devices owned by the authenticated user.
#[utoipa::path(
    get,
    path = "/users/me/devices",
    responses(
        (status = 200, description = "Owned devices", body = Vec<DeviceDto>),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "users"
)]
pub async fn list_my_devices(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<DeviceDto>>, ApiError> {
    let registry = DeviceRegistry::new(state.pool.clone(), state.max_probes_per_device);
    let devices = registry.owned_devices(user.id).await?;
    Ok(Json(devices.into_iter().map(Into::into).collect()))
}

/// The user's notification preferences.
#[utoipa::path(
    get,
    path = "/users/me/notification-settings",
    responses(
        (status = 200, description = "Notification settings", body = NotificationSettingsDto),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "users"
)]
pub async fn get_notification_settings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<NotificationSettingsDto>, ApiError> {
    let settings = users(&state).notification_settings(user.id).await?;
    Ok(Json(settings.into()))
}

/// Patch the user's notification preferences; absent fields stay unchanged.
#[utoipa::path(
    put,
    path = "/users/me/notification-settings",
    request_body = NotificationSettingsUpdateRequest,
    responses(
        (status = 200, description = "Updated settings", body = NotificationSettingsDto),
        (status = 400, description = "Out-of-range threshold"),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "users"
)]
pub async fn update_notification_settings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NotificationSettingsUpdateRequest>,
) -> Result<Json<NotificationSettingsDto>, ApiError> {
    let settings = users(&state)
        .update_notification_settings(
            user.id,
            SettingsUpdate {
                email_enabled: req.email_enabled,
                sms_enabled: req.sms_enabled,
                push_enabled: req.push_enabled,
                max_temp_threshold: req.max_temp_threshold,
                min_temp_threshold: req.min_temp_threshold,
                connection_alerts: req.connection_alerts,
            },
        )
        .await?;
    Ok(Json(settings.into()))
}

/// Create a custom trigger. Device scope must name an owned device; probe
/// scope requires device scope.
#[utoipa::path(
    post,
    path = "/users/me/triggers",
    request_body = CustomTriggerCreateRequest,
    responses(
        (status = 200, description = "Created trigger", body = CustomTriggerDto),
        (status = 400, description = "Invalid scope or threshold"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Scoped device or probe not found"),
    ),
    tag = "users"
)]
pub async fn create_trigger(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CustomTriggerCreateRequest>,
) -> Result<Json<CustomTriggerDto>, ApiError> {
    let service = users(&state);
    let trigger = service
        .create_trigger(
            &user,
            NewTrigger {
                name: &req.name,
                condition: req.condition,
                threshold: req.threshold,
                device_id: req.device_id.as_deref(),
                probe_id: req.probe_id.as_deref(),
                is_active: req.is_active.unwrap_or(true),
            },
        )
        .await?;
    let view = service.trigger_view(user.id, trigger.id).await?;
    Ok(Json(view.into()))
}

/// All of the user's triggers.
#[utoipa::path(
    get,
    path = "/users/me/triggers",
    responses(
        (status = 200, description = "Triggers", body = Vec<CustomTriggerDto>),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "users"
)]
pub async fn list_triggers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<CustomTriggerDto>>, ApiError> {
    let triggers = users(&state).list_triggers(user.id).await?;
    Ok(Json(triggers.into_iter().map(Into::into).collect()))
}

/// Patch a trigger's name, condition, threshold or active flag.
#[utoipa::path(
    put,
    path = "/users/me/triggers/{trigger_id}",
    params(("trigger_id" = Uuid, Path, description = "Trigger id")),
    request_body = CustomTriggerUpdateRequest,
    responses(
        (status = 200, description = "Updated trigger", body = CustomTriggerDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Trigger not found"),
    ),
    tag = "users"
)]
pub async fn update_trigger(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(trigger_id): Path<Uuid>,
    Json(req): Json<CustomTriggerUpdateRequest>,
) -> Result<Json<CustomTriggerDto>, ApiError> {
    let service = users(&state);
    service
        .update_trigger(
            user.id,
            trigger_id,
            TriggerUpdate {
                name: req.name.as_deref(),
                condition: req.condition,
                threshold: req.threshold,
                is_active: req.is_active,
            },
        )
        .await?;
    let view = service.trigger_view(user.id, trigger_id).await?;
    Ok(Json(view.into()))
}

/// Delete a trigger.
#[utoipa::path(
    delete,
    path = "/users/me/triggers/{trigger_id}",
    params(("trigger_id" = Uuid, Path, description = "Trigger id")),
    responses(
        (status = 200, description = "Trigger deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Trigger not found"),
    ),
    tag = "users"
)]
pub async fn delete_trigger(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(trigger_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    users(&state).delete_trigger(user.id, trigger_id).await?;
    Ok(Json(serde_json::json!({ "message": "trigger deleted" })))
}
