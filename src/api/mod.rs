pub mod dto;
pub mod errors;
pub mod extract;
pub mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::state::AppState;

use handlers::ApiDoc;

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        // Device & probe registry
        .route("/devices/register", post(handlers::devices::register_device))
        .route(
            "/devices/{device_id}/probes/register",
            post(handlers::devices::register_probe),
        )
        .route(
            "/devices/{device_id}/probes",
            get(handlers::devices::list_probes),
        )
        .route(
            "/devices/{device_id}/connection",
            put(handlers::devices::update_device_connection),
        )
        .route(
            "/devices/{device_id}/probes/{probe_id}/connection",
            put(handlers::devices::update_probe_connection),
        )
        // Accounts
        .route("/users/register", post(handlers::users::register_user))
        .route("/users/token", post(handlers::users::login))
        .route(
            "/users/me",
            get(handlers::users::get_me).put(handlers::users::update_me),
        )
        .route("/users/me/devices", get(handlers::users::list_my_devices))
        .route(
            "/users/me/devices/{device_id}",
            post(handlers::users::claim_device),
        )
        .route(
            "/users/me/notification-settings",
            get(handlers::users::get_notification_settings)
                .put(handlers::users::update_notification_settings),
        )
        .route(
            "/users/me/triggers",
            post(handlers::users::create_trigger).get(handlers::users::list_triggers),
        )
        .route(
            "/users/me/triggers/{trigger_id}",
            put(handlers::users::update_trigger).delete(handlers::users::delete_trigger),
        )
        // Telemetry
        .route(
            "/temperature/update",
            post(handlers::temperature::update_temperature),
        )
        .route(
            "/temperature/target",
            post(handlers::temperature::set_target_temperature),
        )
        .route(
            "/temperature/{device_id}/history",
            get(handlers::temperature::get_history),
        )
        .route(
            "/temperature/{device_id}/target",
            get(handlers::temperature::get_target),
        )
        .route(
            "/temperature/{device_id}/average",
            get(handlers::temperature::get_average),
        )
        // Settings sync
        .route(
            "/settings/{device_id}/sync",
            get(handlers::settings::sync_settings),
        )
        .route(
            "/settings/{device_id}/target",
            post(handlers::settings::set_target_from_device),
        )
        .route(
            "/settings/user/{device_id}/target",
            post(handlers::settings::set_target_from_user),
        )
        .route(
            "/settings/{device_id}/history",
            get(handlers::settings::get_target_history),
        )
        // Notifications
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/{notification_id}/read",
            put(handlers::notifications::mark_read),
        )
        .route(
            "/notifications/read-all",
            put(handlers::notifications::mark_all_read),
        )
        .route(
            "/notifications/test",
            post(handlers::notifications::send_test_notification),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
