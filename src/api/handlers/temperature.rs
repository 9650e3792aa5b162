use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::debug;

use crate::{
    alerts::{self, ReadingContext},
    api::{
        dto::{
            AverageResponse, HistoryParams, TargetTemperatureDto, TargetTemperatureRequest,
            TemperatureReadingDto, TemperatureUpdateRequest, TemperatureUpdateResponse,
        },
        errors::ApiError,
        extract::{ensure_device_matches, AuthedDevice},
    },
    db::models::{Device, TargetSetter, User},
    notify::AlertScope,
    settings_sync::SettingsSync,
    state::AppState,
    telemetry::{service::ProbeReading, HistoryFilter, IngestOutcome, TelemetryService},
    users::UserService,
};

use super::clamp_limit;

/// Ingest a batch of probe readings. Readings are persisted as immutable
/// rows, thresholds are evaluated against the owner's settings and triggers,
/// and the current target temperature is returned so the device can
/// self-correct without a second round trip.
#[utoipa::path(
    post,
    path = "/temperature/update",
    request_body = TemperatureUpdateRequest,
    responses(
        (status = 200, description = "Readings stored", body = TemperatureUpdateResponse),
        (status = 400, description = "Empty batch or implausible temperature"),
        (status = 401, description = "Missing or mismatched API key"),
        (status = 404, description = "Unknown probe in batch"),
    ),
    tag = "temperature"
)]
pub async fn update_temperature(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Json(req): Json<TemperatureUpdateRequest>,
) -> Result<Json<TemperatureUpdateResponse>, ApiError> {
    ensure_device_matches(&device, &req.device_id)?;

    let readings: Vec<ProbeReading<'_>> = req
        .readings
        .iter()
        .map(|r| ProbeReading {
            probe_id: &r.probe_id,
            temperature: r.temperature,
        })
        .collect();

    let telemetry = TelemetryService::new(state.pool.clone());
    let outcome = telemetry
        .ingest(&device, &readings, req.average_temperature, req.recorded_at)
        .await?;

    evaluate_thresholds(&state, &device, &outcome).await?;

    Ok(Json(TemperatureUpdateResponse {
        message: "temperature readings received".to_owned(),
        average_temperature: outcome.average,
        target_temperature: outcome.target.map(|t| t.temperature),
    }))
}

/// Set the device's target temperature through the device-key path.
#[utoipa::path(
    post,
    path = "/temperature/target",
    request_body = TargetTemperatureRequest,
    responses(
        (status = 200, description = "Target stored", body = TargetTemperatureDto),
        (status = 400, description = "Implausible temperature"),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "temperature"
)]
pub async fn set_target_temperature(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Json(req): Json<TargetTemperatureRequest>,
) -> Result<Json<TargetTemperatureDto>, ApiError> {
    ensure_device_matches(&device, &req.device_id)?;

    let target = SettingsSync::new(state.pool.clone())
        .set_target(&device, req.temperature, TargetSetter::Device, None)
        .await?;
    Ok(Json(target.into()))
}

/// Bounded, most-recent-first reading history, optionally filtered to one
/// probe and to average-only (`is_average=true`) or raw-only rows.
#[utoipa::path(
    get,
    path = "/temperature/{device_id}/history",
    params(
        ("device_id" = String, Path, description = "External device id"),
        ("probe_id" = Option<String>, Query, description = "Filter to one probe"),
        ("limit" = Option<i64>, Query, description = "Max rows (default 100, cap 1000)"),
        ("is_average" = Option<bool>, Query, description = "Average-only or raw-only rows"),
    ),
    responses(
        (status = 200, description = "Readings, most recent first", body = Vec<TemperatureReadingDto>),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "temperature"
)]
pub async fn get_history(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<TemperatureReadingDto>>, ApiError> {
    ensure_device_matches(&device, &device_id)?;

    let rows = TelemetryService::new(state.pool.clone())
        .history(
            &device,
            HistoryFilter {
                probe_id: params.probe_id.as_deref(),
                is_average: params.is_average,
                limit: clamp_limit(params.limit),
            },
        )
        .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// The device's current target temperature, if any has been set.
#[utoipa::path(
    get,
    path = "/temperature/{device_id}/target",
    params(("device_id" = String, Path, description = "External device id")),
    responses(
        (status = 200, description = "Current target or null", body = Option<TargetTemperatureDto>),
        (status = 401, description = "Missing or mismatched API key"),
    ),
    tag = "temperature"
)]
pub async fn get_target(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
) -> Result<Json<Option<TargetTemperatureDto>>, ApiError> {
    ensure_device_matches(&device, &device_id)?;
    let target = SettingsSync::new(state.pool.clone())
        .current_target(&device)
        .await?;
    Ok(Json(target.map(Into::into)))
}

/// On-demand mean over each connected probe's latest raw reading.
#[utoipa::path(
    get,
    path = "/temperature/{device_id}/average",
    params(("device_id" = String, Path, description = "External device id")),
    responses(
        (status = 200, description = "Current average", body = AverageResponse),
        (status = 401, description = "Missing or mismatched API key"),
        (status = 404, description = "No connected probe has readings"),
    ),
    tag = "temperature"
)]
pub async fn get_average(
    State(state): State<AppState>,
    AuthedDevice(device): AuthedDevice,
    Path(device_id): Path<String>,
) -> Result<Json<AverageResponse>, ApiError> {
    ensure_device_matches(&device, &device_id)?;

    let average = TelemetryService::new(state.pool.clone())
        .current_average(&device)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("no connected probes with temperature readings".into())
        })?;
    Ok(Json(AverageResponse {
        average_temperature: average,
    }))
}

/// Run the owner's thresholds and triggers over every raw reading in the
/// batch. Derived average rows are not re-evaluated, so one breach fires
/// once per reading. Delivery results are captured for diagnostics only;
/// failures never fail the ingest.
async fn evaluate_thresholds(
    state: &AppState,
    device: &Device,
    outcome: &IngestOutcome,
) -> Result<(), ApiError> {
    let Some(owner_id) = device.owner_id else {
        return Ok(());
    };
    let Some(user) = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE id = $1 AND is_active",
    )
    .bind(owner_id)
    .fetch_optional(&state.pool)
    .await?
    else {
        return Ok(());
    };

    let users = UserService::new(state.pool.clone(), state.tokens.clone());
    let settings = users.notification_settings(owner_id).await?;
    let triggers = users.active_triggers(owner_id).await?;

    for stored in &outcome.raw {
        let context = ReadingContext {
            device_id: device.id,
            device_label: device.label(),
            probe_id: Some(stored.probe.id),
            probe_label: Some(stored.probe.label()),
            temperature: stored.reading.temperature,
        };
        for alert in alerts::evaluate(&settings, &triggers, &context) {
            let report = state
                .dispatcher
                .dispatch(&user, &settings, &alert, AlertScope::probe(device, &stored.probe))
                .await?;
            debug!(
                device_id = %device.device_id,
                probe_id = %stored.probe.probe_id,
                ?report,
                "alert dispatched"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sqlx::PgPool;

    use crate::api::testing::{
        auth_header, claim_device, disable_all_channels, post_reading, register_and_login,
        register_device, register_probe, test_server,
    };

    #[sqlx::test(migrations = "./migrations")]
    async fn single_reading_appears_once_in_history(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;

        post_reading(&server, &key, "D1", "P1", 165.0).await;

        let history: Vec<Value> = server
            .get("/temperature/D1/history")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["temperature"], 165.0);
        assert_eq!(history[0]["probe_id"], "P1");
        assert_eq!(history[0]["is_average"], false);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn ingest_requires_matching_key(pool: PgPool) {
        let server = test_server(pool);
        register_device(&server, "D1").await;
        let other_key = register_device(&server, "D2").await;

        let resp = server
            .post("/temperature/update")
            .add_header("x-api-key", other_key.as_str())
            .json(&json!({
                "device_id": "D1",
                "readings": [{ "probe_id": "P1", "temperature": 100.0 }]
            }))
            .await;
        resp.assert_status_unauthorized();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_probe_fails_the_whole_batch(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;

        let resp = server
            .post("/temperature/update")
            .add_header("x-api-key", key.as_str())
            .json(&json!({
                "device_id": "D1",
                "readings": [
                    { "probe_id": "P1", "temperature": 100.0 },
                    { "probe_id": "GHOST", "temperature": 120.0 }
                ]
            }))
            .await;
        resp.assert_status_not_found();

        // The transaction rolled back: nothing persisted.
        let history: Vec<Value> = server
            .get("/temperature/D1/history")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert!(history.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn empty_batch_without_average_is_rejected(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;

        let resp = server
            .post("/temperature/update")
            .add_header("x-api-key", key.as_str())
            .json(&json!({ "device_id": "D1", "readings": [] }))
            .await;
        resp.assert_status_bad_request();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn computed_average_covers_connected_probes_only(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;
        register_probe(&server, &key, "D1", "P2").await;

        let resp = server
            .post("/temperature/update")
            .add_header("x-api-key", key.as_str())
            .json(&json!({
                "device_id": "D1",
                "readings": [
                    { "probe_id": "P1", "temperature": 100.0 },
                    { "probe_id": "P2", "temperature": 200.0 }
                ]
            }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["average_temperature"], 150.0);

        // The computed average is not persisted as a row.
        let averages: Vec<Value> = server
            .get("/temperature/D1/history?is_average=true")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert!(averages.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn computed_average_uses_latest_value_per_probe(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;
        register_probe(&server, &key, "D1", "P2").await;

        let resp = server
            .post("/temperature/update")
            .add_header("x-api-key", key.as_str())
            .json(&json!({
                "device_id": "D1",
                "readings": [
                    { "probe_id": "P1", "temperature": 100.0 },
                    { "probe_id": "P1", "temperature": 120.0 },
                    { "probe_id": "P2", "temperature": 60.0 }
                ]
            }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["average_temperature"], 90.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn supplied_average_is_persisted_and_echoed(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;

        let resp = server
            .post("/temperature/update")
            .add_header("x-api-key", key.as_str())
            .json(&json!({
                "device_id": "D1",
                "readings": [{ "probe_id": "P1", "temperature": 150.0 }],
                "average_temperature": 149.5
            }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["average_temperature"], 149.5);

        let averages: Vec<Value> = server
            .get("/temperature/D1/history?is_average=true")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0]["temperature"], 149.5);
        assert!(averages[0]["probe_id"].is_null());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn implausible_temperature_is_rejected(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;

        let resp = server
            .post("/temperature/update")
            .add_header("x-api-key", key.as_str())
            .json(&json!({
                "device_id": "D1",
                "readings": [{ "probe_id": "P1", "temperature": 9000.0 }]
            }))
            .await;
        resp.assert_status_bad_request();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn ingest_returns_current_target(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;

        server
            .post("/temperature/target")
            .add_header("x-api-key", key.as_str())
            .json(&json!({ "device_id": "D1", "temperature": 225.0 }))
            .await
            .assert_status_ok();

        let resp = server
            .post("/temperature/update")
            .add_header("x-api-key", key.as_str())
            .json(&json!({
                "device_id": "D1",
                "readings": [{ "probe_id": "P1", "temperature": 180.0 }]
            }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["target_temperature"], 225.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn breach_records_notification_even_with_channels_disabled(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;
        let token = register_and_login(&server, "alice").await;
        claim_device(&server, &token, "D1").await;
        disable_all_channels(&server, &token).await;
        server
            .put("/users/me/notification-settings")
            .add_header("authorization", auth_header(&token))
            .json(&json!({ "min_temp_threshold": 32.0, "max_temp_threshold": 212.0 }))
            .await
            .assert_status_ok();

        post_reading(&server, &key, "D1", "P1", 250.0).await;

        let notifications: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["kind"], "temperature_alert");
        assert_eq!(notifications[0]["channel"], "app");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn repeated_breaches_fire_repeatedly(pool: PgPool) {
        // No debounce window exists: every breach produces a fresh
        // notification.
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;
        let token = register_and_login(&server, "alice").await;
        claim_device(&server, &token, "D1").await;
        disable_all_channels(&server, &token).await;
        server
            .put("/users/me/notification-settings")
            .add_header("authorization", auth_header(&token))
            .json(&json!({ "max_temp_threshold": 212.0 }))
            .await
            .assert_status_ok();

        post_reading(&server, &key, "D1", "P1", 250.0).await;
        post_reading(&server, &key, "D1", "P1", 251.0).await;

        let notifications: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        assert_eq!(notifications.len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn above_trigger_fires_strictly_above_threshold(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;
        let token = register_and_login(&server, "alice").await;
        claim_device(&server, &token, "D1").await;
        disable_all_channels(&server, &token).await;
        server
            .post("/users/me/triggers")
            .add_header("authorization", auth_header(&token))
            .json(&json!({
                "name": "done",
                "condition": "above",
                "threshold": 200.0,
                "device_id": "D1"
            }))
            .await
            .assert_status_ok();

        post_reading(&server, &key, "D1", "P1", 199.0).await;
        post_reading(&server, &key, "D1", "P1", 200.0).await;

        let notifications: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        assert!(notifications.is_empty());

        post_reading(&server, &key, "D1", "P1", 201.0).await;

        let notifications: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["kind"], "custom_trigger");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unowned_device_breach_stays_silent(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;

        // No owner: evaluation is skipped and ingest still succeeds.
        post_reading(&server, &key, "D1", "P1", 500.0).await;
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn history_filters_and_limits(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;
        register_probe(&server, &key, "D1", "P2").await;

        post_reading(&server, &key, "D1", "P1", 100.0).await;
        post_reading(&server, &key, "D1", "P2", 110.0).await;
        post_reading(&server, &key, "D1", "P1", 120.0).await;

        let all: Vec<Value> = server
            .get("/temperature/D1/history")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(all.len(), 3);

        let p1_only: Vec<Value> = server
            .get("/temperature/D1/history?probe_id=P1")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(p1_only.len(), 2);
        assert!(p1_only.iter().all(|r| r["probe_id"] == "P1"));

        let limited: Vec<Value> = server
            .get("/temperature/D1/history?limit=1")
            .add_header("x-api-key", key.as_str())
            .await
            .json();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0]["temperature"], 120.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn current_average_tracks_connection_state(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;
        register_probe(&server, &key, "D1", "P2").await;

        post_reading(&server, &key, "D1", "P1", 100.0).await;
        post_reading(&server, &key, "D1", "P2", 200.0).await;

        let resp = server
            .get("/temperature/D1/average")
            .add_header("x-api-key", key.as_str())
            .await;
        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>()["average_temperature"], 150.0);

        // A disconnected probe drops out of the average.
        server
            .put("/devices/D1/probes/P2/connection")
            .add_header("x-api-key", key.as_str())
            .json(&json!({ "is_connected": false }))
            .await
            .assert_status_ok();
        let resp = server
            .get("/temperature/D1/average")
            .add_header("x-api-key", key.as_str())
            .await;
        assert_eq!(resp.json::<Value>()["average_temperature"], 100.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn average_without_readings_is_404(pool: PgPool) {
        let server = test_server(pool);
        let key = register_device(&server, "D1").await;
        register_probe(&server, &key, "D1", "P1").await;

        let resp = server
            .get("/temperature/D1/average")
            .add_header("x-api-key", key.as_str())
            .await;
        resp.assert_status_not_found();
    }
}
