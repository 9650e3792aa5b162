use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    api::{
        dto::{
            ConnectionUpdateRequest, DeviceDto, DeviceRegistrationRequest,
            DeviceRegistrationResponse, ProbeDto, ProbeRegistrationRequest,
            ProbeRegistrationResponse,
        },
        errors::ApiError,
        extract::{ensure_device_matches, AuthedDevice},
    },
    registry::{service::{NewDevice, NewProbe}, DeviceRegistry},
    state::AppState,
};

fn registry(state: &AppState) -> DeviceRegistry {
    DeviceRegistry::new(state.pool.clone(), state.max_probes_per_device)
}

/// Register a device and issue its API key. The key is returned exactly once
/// and is immutable afterwards; re-registering the same device_id fails.
#[utoipa::path(
    post,
    path = "/devices/register",
    request_body = DeviceRegistrationRequest,
    responses(
        (status = 200, description = "Device registered", body = DeviceRegistrationResponse),
        (status = 400, description = "Invalid payload or device_id already registered"),
    ),
    tag = "devices"
)]
pub async fn register_device(
    State(state): State<AppState>,
    Json(req): Json<DeviceRegistrationRequest>,
) -> Result<Json<DeviceRegistrationResponse>, ApiError> {
    let device = registry(&state)
        .register_device(NewDevice {
            device_id: &req.device_id,
            name: req.name.as_deref(),
            model: &req.model,
            firmware_version: &req.firmware_version,
        })
        .await?;

    Ok(Json(DeviceRegistrationResponse {
        device_id: device.device_id,
        api_key: device.api_key,
    }))
}

/// Register a probe under the authenticated device.
#[utoipa::path(
    post,
    path = "/devices/{device_id}/probes/register",
    params(("device_id" = String, Path, description = "External device id")),
    request_body = ProbeRegistrationRequest,
    responses(
        (status = 200, description = "Probe registered", body = ProbeRegistrationResponse),
        (status = 400, description = "Duplicate probe_id or probe cap reached"),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "devices"
)]
pub async fn register_probe(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
    Json(req): Json<ProbeRegistrationRequest>,
) -> Result<Json<ProbeRegistrationResponse>, ApiError> {
    ensure_device_matches(&device, &device_id)?;

    let probe = registry(&state)
        .register_probe(
            &device,
            NewProbe {
                probe_id: &req.probe_id,
                name: req.name.as_deref(),
                model: req.model.as_deref(),
            },
        )
        .await?;

    Ok(Json(ProbeRegistrationResponse {
        probe_id: probe.probe_id,
        device_id: device.device_id,
    }))
}

/// List the device's probes.
#[utoipa::path(
    get,
    path = "/devices/{device_id}/probes",
    params(("device_id" = String, Path, description = "External device id")),
    responses(
        (status = 200, description = "Probes for this device", body = Vec<ProbeDto>),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "devices"
)]
pub async fn list_probes(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<ProbeDto>>, ApiError> {
    ensure_device_matches(&device, &device_id)?;
    let probes = registry(&state).probes_for_device(&device).await?;
    Ok(Json(probes.into_iter().map(Into::into).collect()))
}

/// Flip the device's connection flag. A connected→disconnected transition
/// emits a connection-lost notification when the owner opted in.
#[utoipa::path(
    put,
    path = "/devices/{device_id}/connection",
    params(("device_id" = String, Path, description = "External device id")),
    request_body = ConnectionUpdateRequest,
    responses(
        (status = 200, description = "Updated device", body = DeviceDto),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "devices"
)]
pub async fn update_device_connection(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
    Json(req): Json<ConnectionUpdateRequest>,
) -> Result<Json<DeviceDto>, ApiError> {
    ensure_device_matches(&device, &device_id)?;

    let was_connected = device.is_connected;
    let updated = registry(&state)
        .set_device_connection(&device, req.is_connected)
        .await?;

    if was_connected && !req.is_connected {
        state.dispatcher.notify_connection_lost(&updated, None).await?;
    }

    Ok(Json(updated.into()))
}

/// Flip a probe's connection flag, with the same connection-lost semantics
/// as the device-level endpoint.
#[utoipa::path(
    put,
    path = "/devices/{device_id}/probes/{probe_id}/connection",
    params(
        ("device_id" = String, Path, description = "External device id"),
        ("probe_id" = String, Path, description = "External probe id"),
    ),
    request_body = ConnectionUpdateRequest,
    responses(
        (status = 200, description = "Updated probe", body = ProbeDto),
        (status = 401, description = "Missing or mismatched API key"),
        (status = 404, description = "Probe not found"),
    ),
    tag = "devices"
)]
pub async fn update_probe_connection(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path((device_id, probe_id)): Path<(String, String)>,
    Json(req): Json<ConnectionUpdateRequest>,
) -> Result<Json<ProbeDto>, ApiError> {
    ensure_device_matches(&device, &device_id)?;

    let registry = registry(&state);
    let probe = registry.probe_by_external_id(&device, &probe_id).await?;
    let was_connected = probe.is_connected;
    let updated = registry.set_probe_connection(&probe, req.is_connected).await?;

    if was_connected && !req.is_connected {
        state
            .dispatcher
            .notify_connection_lost(&device, Some(&updated))
            .await?;
    }

    Ok(Json(updated.into()))
}
