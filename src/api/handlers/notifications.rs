use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    alerts::Alert,
    api::{
        dto::{
            NotificationDto, NotificationListParams, ReadAllResponse, TestNotificationRequest,
            TestNotificationResponse,
        },
        errors::ApiError,
        extract::CurrentUser,
    },
    db::models::{Notification, NotificationKind},
    notify::AlertScope,
    state::AppState,
    users::UserService,
};

use super::clamp_limit;

/// The caller's notification history, most recent first.
#[utoipa::path(
    get,
    path = "/notifications",
    params(
        ("limit" = Option<i64>, Query, description = "Max rows (default 100, cap 1000)"),
        ("unread_only" = Option<bool>, Query, description = "Only unread notifications"),
    ),
    responses(
        (status = 200, description = "Notifications", body = Vec<NotificationDto>),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<NotificationListParams>,
) -> Result<Json<Vec<NotificationDto>>, ApiError> {
    let rows = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications \
         WHERE user_id = $1 AND (NOT $2 OR NOT is_read) \
         ORDER BY created_at DESC \
         LIMIT $3",
    )
    .bind(user.id)
    .bind(params.unread_only.unwrap_or(false))
    .bind(clamp_limit(params.limit))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Mark one notification as read. Idempotent: re-reading an already-read
/// notification succeeds and leaves it read.
#[utoipa::path(
    put,
    path = "/notifications/{notification_id}/read",
    params(("notification_id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Updated notification", body = NotificationDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Not found or owned by someone else"),
    ),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<NotificationDto>, ApiError> {
    let updated = sqlx::query_as::<_, Notification>(
        "UPDATE notifications SET is_read = TRUE \
         WHERE id = $1 AND user_id = $2 \
         RETURNING *",
    )
    .bind(notification_id)
    .bind(user.id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("notification {notification_id} not found")))?;
    Ok(Json(updated.into()))
}

/// Mark every unread notification of the caller as read.
#[utoipa::path(
    put,
    path = "/notifications/read-all",
    responses(
        (status = 200, description = "Count of notifications marked", body = ReadAllResponse),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "notifications"
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ReadAllResponse>, ApiError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read",
    )
    .bind(user.id)
    .execute(&state.pool)
    .await?;
    Ok(Json(ReadAllResponse {
        marked: result.rows_affected(),
    }))
}

/// Send a test notification to oneself through every enabled channel and
/// return the per-channel delivery outcome.
#[utoipa::path(
    post,
    path = "/notifications/test",
    request_body = TestNotificationRequest,
    responses(
        (status = 200, description = "Per-channel delivery results", body = TestNotificationResponse),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "notifications"
)]
pub async fn send_test_notification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<TestNotificationRequest>,
) -> Result<Json<TestNotificationResponse>, ApiError> {
    let settings = UserService::new(state.pool.clone(), state.tokens.clone())
        .notification_settings(user.id)
        .await?;

    let alert = Alert {
        kind: NotificationKind::Test,
        title: req.title,
        message: req.message,
    };
    let results = state
        .dispatcher
        .dispatch(&user, &settings, &alert, AlertScope::default())
        .await?;

    Ok(Json(TestNotificationResponse {
        message: "test notification sent".to_owned(),
        results,
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sqlx::PgPool;

    use crate::api::testing::{
        auth_header, disable_all_channels, register_and_login, test_server,
    };

    async fn send_test(server: &axum_test::TestServer, token: &str, title: &str) {
        server
            .post("/notifications/test")
            .add_header("authorization", auth_header(token))
            .json(&json!({ "title": title, "message": "hello" }))
            .await
            .assert_status_ok();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn listing_is_scoped_to_the_caller(pool: PgPool) {
        let server = test_server(pool);
        let alice = register_and_login(&server, "alice").await;
        let bob = register_and_login(&server, "bob").await;
        disable_all_channels(&server, &alice).await;
        disable_all_channels(&server, &bob).await;

        send_test(&server, &alice, "for alice").await;

        let for_alice: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&alice))
            .await
            .json();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0]["title"], "for alice");

        let for_bob: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&bob))
            .await
            .json();
        assert!(for_bob.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn mark_read_is_idempotent(pool: PgPool) {
        let server = test_server(pool);
        let token = register_and_login(&server, "alice").await;
        disable_all_channels(&server, &token).await;
        send_test(&server, &token, "t").await;

        let listed: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        let id = listed[0]["id"].as_str().unwrap().to_owned();

        let resp = server
            .put(&format!("/notifications/{id}/read"))
            .add_header("authorization", auth_header(&token))
            .await;
        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>()["is_read"], true);

        // Second read succeeds and stays read.
        let resp = server
            .put(&format!("/notifications/{id}/read"))
            .add_header("authorization", auth_header(&token))
            .await;
        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>()["is_read"], true);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn foreign_notifications_cannot_be_marked(pool: PgPool) {
        let server = test_server(pool);
        let alice = register_and_login(&server, "alice").await;
        let bob = register_and_login(&server, "bob").await;
        disable_all_channels(&server, &alice).await;
        send_test(&server, &alice, "t").await;

        let listed: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&alice))
            .await
            .json();
        let id = listed[0]["id"].as_str().unwrap().to_owned();

        server
            .put(&format!("/notifications/{id}/read"))
            .add_header("authorization", auth_header(&bob))
            .await
            .assert_status_not_found();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn read_all_marks_only_the_callers_rows(pool: PgPool) {
        let server = test_server(pool);
        let alice = register_and_login(&server, "alice").await;
        let bob = register_and_login(&server, "bob").await;
        disable_all_channels(&server, &alice).await;
        disable_all_channels(&server, &bob).await;
        send_test(&server, &alice, "a1").await;
        send_test(&server, &alice, "a2").await;
        send_test(&server, &bob, "b1").await;

        let resp = server
            .put("/notifications/read-all")
            .add_header("authorization", auth_header(&alice))
            .await;
        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>()["marked"], 2);

        let unread_bob: Vec<Value> = server
            .get("/notifications?unread_only=true")
            .add_header("authorization", auth_header(&bob))
            .await
            .json();
        assert_eq!(unread_bob.len(), 1);

        // Nothing left to mark for alice.
        let resp = server
            .put("/notifications/read-all")
            .add_header("authorization", auth_header(&alice))
            .await;
        assert_eq!(resp.json::<Value>()["marked"], 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unread_filter_hides_read_rows(pool: PgPool) {
        let server = test_server(pool);
        let token = register_and_login(&server, "alice").await;
        disable_all_channels(&server, &token).await;
        send_test(&server, &token, "t1").await;
        send_test(&server, &token, "t2").await;

        let listed: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        let id = listed[0]["id"].as_str().unwrap().to_owned();
        server
            .put(&format!("/notifications/{id}/read"))
            .add_header("authorization", auth_header(&token))
            .await
            .assert_status_ok();

        let unread: Vec<Value> = server
            .get("/notifications?unread_only=true")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        assert_eq!(unread.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn disabled_channels_still_persist_one_app_row(pool: PgPool) {
        let server = test_server(pool);
        let token = register_and_login(&server, "alice").await;
        disable_all_channels(&server, &token).await;

        let resp = server
            .post("/notifications/test")
            .add_header("authorization", auth_header(&token))
            .json(&json!({ "title": "t", "message": "m" }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert!(body["results"].as_object().unwrap().is_empty());

        let listed: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["channel"], "app");
        assert_eq!(listed[0]["kind"], "test");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failed_channels_are_reported_not_fatal(pool: PgPool) {
        // Default settings enable email and push, but the test state has no
        // gateways configured: delivery fails per channel, the request still
        // succeeds, and a row per attempted channel is persisted.
        let server = test_server(pool);
        let token = register_and_login(&server, "alice").await;

        let resp = server
            .post("/notifications/test")
            .add_header("authorization", auth_header(&token))
            .json(&json!({ "title": "t", "message": "m" }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        let results = body["results"].as_object().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["email"]["delivered"], false);
        assert_eq!(results["push"]["delivered"], false);
        assert!(results["email"]["detail"]
            .as_str()
            .unwrap()
            .contains("no gateway configured"));

        let listed: Vec<Value> = server
            .get("/notifications")
            .add_header("authorization", auth_header(&token))
            .await
            .json();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|n| n["is_read"] == false));
    }
}
