use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    api::{
        dto::{LimitParams, SetTargetRequest, SyncResponse, TargetTemperatureDto},
        errors::ApiError,
        extract::{ensure_device_matches, AuthedDevice, CurrentUser},
    },
    db::models::{Device, TargetSetter},
    settings_sync::SettingsSync,
    state::AppState,
};

use super::clamp_limit;

/// Device poll: current target temperature plus the owner's thresholds and
/// active device-scoped triggers. Polling counts as proof of life.
#[utoipa::path(
    get,
    path = "/settings/{device_id}/sync",
    params(("device_id" = String, Path, description = "External device id")),
    responses(
        (status = 200, description = "Settings to reconcile", body = SyncResponse),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "settings"
)]
pub async fn sync_settings(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
) -> Result<Json<SyncResponse>, ApiError> {
    ensure_device_matches(&device, &device_id)?;

    let data = SettingsSync::new(state.pool.clone()).sync(&device).await?;
    Ok(Json(SyncResponse::from_sync_data(device.device_id, data)))
}

/// Target update originating from the device itself.
#[utoipa::path(
    post,
    path = "/settings/{device_id}/target",
    params(("device_id" = String, Path, description = "External device id")),
    request_body = SetTargetRequest,
    responses(
        (status = 200, description = "Target stored", body = TargetTemperatureDto),
        (status = 400, description = "Implausible temperature"),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "settings"
)]
pub async fn set_target_from_device(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
    Json(req): Json<SetTargetRequest>,
) -> Result<Json<TargetTemperatureDto>, ApiError> {
    ensure_device_matches(&device, &device_id)?;

    let target = SettingsSync::new(state.pool.clone())
        .set_target(&device, req.temperature, TargetSetter::Device, None)
        .await?;
    Ok(Json(target.into()))
}

/// Target update originating from a user; the user must own the device.
#[utoipa::path(
    post,
    path = "/settings/user/{device_id}/target",
    params(("device_id" = String, Path, description = "External device id")),
    request_body = SetTargetRequest,
    responses(
        (status = 200, description = "Target stored", body = TargetTemperatureDto),
        (status = 400, description = "Implausible temperature"),
        (status = 401, description = "Missing token or device not owned"),
        (status = 404, description = "Device not found"),
    ),
    tag = "settings"
)]
pub async fn set_target_from_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(device_id): Path<String>,
    Json(req): Json<SetTargetRequest>,
) -> Result<Json<TargetTemperatureDto>, ApiError> {
    let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE device_id = $1")
        .bind(&device_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::UnknownDevice(device_id.clone()))?;

    let target = SettingsSync::new(state.pool.clone())
        .set_target(&device, req.temperature, TargetSetter::User, Some(user.id))
        .await?;
    Ok(Json(target.into()))
}

/// Bounded target-temperature history, most recent first.
#[utoipa::path(
    get,
    path = "/settings/{device_id}/history",
    params(
        ("device_id" = String, Path, description = "External device id"),
        ("limit" = Option<i64>, Query, description = "Max rows (default 100, cap 1000)"),
    ),
    responses(
        (status = 200, description = "Target history", body = Vec<TargetTemperatureDto>),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "settings"
)]
pub async fn get_target_history(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<TargetTemperatureDto>>, ApiError> {
    ensure_device_matches(&device, &device_id)?;

    let rows = SettingsSync::new(state.pool.clone())
        .target_history(&device, clamp_limit(params.limit))
        .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sqlx::PgPool;

    use crate::api::testing::{
        auth_header, claim_device, register_and_login, register_device, register_probe,
        test_server,
    };

    #[sqlx::test(migrations = "./migrations")]
    async fn sync_requires_a_key(pool: PgPool) {
        let server = test_server(pool);
        register_device(&server, "D1").await;
        server
            .get("/settings/D1/sync")
            .await
            .assert_status_unauthorized();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sync_returns_target_thresholds_and_device_triggers(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;
        let token = register_and_login(&server, "alice").await;
        claim_device(&server, &token, "D1").await;

        server
            .put("/users/me/notification-settings")
            .add_header("authorization", auth_header(&token))
            .json(&json!({ "max_temp_threshold": 212.0, "min_temp_threshold": 32.0 }))
            .await
            .assert_status_ok();
        server
            .post("/settings/D1/target")
            .add_header("x-api-key", key.as_str())
            .json(&json!({ "temperature": 225.0 }))
            .await
            .assert_status_ok();

        // One active device-scoped trigger, one inactive: only the active
        // one syncs down.
        server
            .post("/users/me/triggers")
            .add_header("authorization", auth_header(&token))
            .json(&json!({
                "name": "active",
                "condition": "above",
                "threshold": 200.0,
                "device_id": "D1"
            }))
            .await
            .assert_status_ok();
        server
            .post("/users/me/triggers")
            .add_header("authorization", auth_header(&token))
            .json(&json!({
                "name": "inactive",
                "condition": "below",
                "threshold": 50.0,
                "device_id": "D1",
                "is_active": false
            }))
            .await
            .assert_status_ok();

        let resp = server
            .get("/settings/D1/sync")
            .add_header("x-api-key", key.as_str())
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["device_id"], "D1");
        assert_eq!(body["target_temperature"], 225.0);
        assert_eq!(body["thresholds"]["max_temperature"], 212.0);
        assert_eq!(body["thresholds"]["min_temperature"], 32.0);
        let triggers = body["custom_triggers"].as_array().unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0]["name"], "active");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sync_for_unowned_device_has_no_thresholds(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;

        let resp = server
            .get("/settings/D1/sync")
            .add_header("x-api-key", key.as_str())
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert!(body["target_temperature"].is_null());
        assert!(body["thresholds"]["max_temperature"].is_null());
        assert!(body["custom_triggers"].as_array().unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn last_writer_wins_between_device_and_user(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        let token = register_and_login(&server, "alice").await;
        claim_device(&server, &token, "D1").await;

        server
            .post("/settings/D1/target")
            .add_header("x-api-key", key.as_str())
            .json(&json!({ "temperature": 200.0 }))
            .await
            .assert_status_ok();
        server
            .post("/settings/user/D1/target")
            .add_header("authorization", auth_header(&token))
            .json(&json!({ "temperature": 250.0 }))
            .await
            .assert_status_ok();

        let target: Value = server
            .get("/temperature/D1/target")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(target["temperature"], 250.0);
        assert_eq!(target["set_by"], "user");

        // The device writing again wins again, and set_by tells the echo
        // apart from a user command.
        server
            .post("/settings/D1/target")
            .add_header("x-api-key", key.as_str())
            .json(&json!({ "temperature": 250.0 }))
            .await
            .assert_status_ok();
        let target: Value = server
            .get("/temperature/D1/target")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(target["set_by"], "device");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn user_cannot_set_target_for_unowned_device(pool: PgPool) {
        let server = test_server(pool);
        register_device(&server, "D1").await;
        let token = register_and_login(&server, "alice").await;

        let resp = server
            .post("/settings/user/D1/target")
            .add_header("authorization", auth_header(&token))
            .json(&json!({ "temperature": 250.0 }))
            .await;
        resp.assert_status_unauthorized();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn target_history_is_bounded_and_ordered(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;

        for temp in [200.0, 210.0, 220.0] {
            server
                .post("/settings/D1/target")
                .add_header("x-api-key", key.as_str())
                .json(&json!({ "temperature": temp }))
                .await
                .assert_status_ok();
        }

        let history: Vec<Value> = server
            .get("/settings/D1/history")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0]["temperature"], 220.0);

        let limited: Vec<Value> = server
            .get("/settings/D1/history?limit=2")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(limited.len(), 2);
    }
}
