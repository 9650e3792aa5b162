//! Account management: registration, authentication, profile, notification
//! preferences and custom triggers.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::{
    api::errors::{is_unique_violation, ApiError},
    auth::{self, IssuedToken, TokenSigner},
    db::models::{CustomTrigger, NotificationSettings, TriggerCondition, User},
    telemetry::service::validate_temperature,
};

pub struct UserService {
    pool: PgPool,
    tokens: TokenSigner,
}

#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub phone_number: Option<&'a str>,
    pub password: &'a str,
}

#[derive(Debug, Default)]
pub struct ProfileUpdate<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone_number: Option<&'a str>,
    pub password: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct SettingsUpdate {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub max_temp_threshold: Option<f64>,
    pub min_temp_threshold: Option<f64>,
    pub connection_alerts: Option<bool>,
}

#[derive(Debug)]
pub struct NewTrigger<'a> {
    pub name: &'a str,
    pub condition: TriggerCondition,
    pub threshold: f64,
    /// External device id; required when `probe_id` is given.
    pub device_id: Option<&'a str>,
    pub probe_id: Option<&'a str>,
    pub is_active: bool,
}

#[derive(Debug, Default)]
pub struct TriggerUpdate<'a> {
    pub name: Option<&'a str>,
    pub condition: Option<TriggerCondition>,
    pub threshold: Option<f64>,
    pub is_active: Option<bool>,
}

/// Trigger joined back to the external device/probe identifiers users deal
/// in (internal uuids never surface through the API).
#[derive(Debug, FromRow)]
pub struct TriggerView {
    pub id: Uuid,
    pub name: String,
    pub condition: TriggerCondition,
    pub threshold: f64,
    pub device_id: Option<String>,
    pub probe_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

const TRIGGER_VIEW_SELECT: &str =
    "SELECT t.id, t.name, t.condition, t.threshold, \
            d.device_id, p.probe_id, t.is_active, t.created_at \
     FROM custom_triggers t \
     LEFT JOIN devices d ON d.id = t.device_id \
     LEFT JOIN probes p ON p.id = t.probe_id";

impl UserService {
    pub fn new(pool: PgPool, tokens: TokenSigner) -> Self {
        Self { pool, tokens }
    }

    /// Create an account plus its default notification settings. SMS starts
    /// enabled only when a phone number was supplied.
    pub async fn register(&self, new: NewUser<'_>) -> Result<User, ApiError> {
        validate_username(new.username)?;
        validate_email(new.email)?;
        validate_password(new.password)?;

        let existing = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = $1 OR email = $2 LIMIT 1",
        )
        .bind(new.username)
        .bind(new.email)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(existing) = existing {
            let detail = if existing.username == new.username {
                format!("username {} already registered", new.username)
            } else {
                format!("email {} already registered", new.email)
            };
            return Err(ApiError::DuplicateIdentity(detail));
        }

        let password_hash = auth::hash_password(new.password)?;

        let mut tx = self.pool.begin().await?;
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, phone_number, password_hash) \
             VALUES ($1, $2, $3, $4) \
             RETURNING *",
        )
        .bind(new.username)
        .bind(new.email)
        .bind(new.phone_number)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::DuplicateIdentity("username or email already registered".into())
            } else {
                ApiError::from(e)
            }
        })?;

        sqlx::query(
            "INSERT INTO notification_settings (user_id, sms_enabled) VALUES ($1, $2)",
        )
        .bind(user.id)
        .bind(new.phone_number.is_some())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(username = %user.username, "user registered");
        Ok(user)
    }

    /// Verify credentials and issue a time-bounded signed token.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(User, IssuedToken), ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        let Some(user) = user else {
            return Err(ApiError::Unauthorized("incorrect username or password"));
        };
        if !auth::verify_password(password, &user.password_hash) {
            return Err(ApiError::Unauthorized("incorrect username or password"));
        }
        if !user.is_active {
            return Err(ApiError::Unauthorized("inactive user"));
        }

        let token = self.tokens.issue(user.id);
        Ok((user, token))
    }

    pub async fn update_profile(
        &self,
        user: &User,
        update: ProfileUpdate<'_>,
    ) -> Result<User, ApiError> {
        if let Some(username) = update.username {
            validate_username(username)?;
            if username != user.username && self.username_taken(username, user.id).await? {
                return Err(ApiError::DuplicateIdentity(format!(
                    "username {username} already taken"
                )));
            }
        }
        if let Some(email) = update.email {
            validate_email(email)?;
            if email != user.email && self.email_taken(email, user.id).await? {
                return Err(ApiError::DuplicateIdentity(format!(
                    "email {email} already registered"
                )));
            }
        }
        let password_hash = match update.password {
            Some(password) => {
                validate_password(password)?;
                Some(auth::hash_password(password)?)
            }
            None => None,
        };

        let updated = sqlx::query_as::<_, User>(
            "UPDATE users SET \
                 username = COALESCE($2, username), \
                 email = COALESCE($3, email), \
                 phone_number = COALESCE($4, phone_number), \
                 password_hash = COALESCE($5, password_hash), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(user.id)
        .bind(update.username)
        .bind(update.email)
        .bind(update.phone_number)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    /// Settings are created at registration; the fallback insert covers
    /// accounts that predate that behaviour.
    pub async fn notification_settings(
        &self,
        user_id: Uuid,
    ) -> Result<NotificationSettings, ApiError> {
        let existing = sqlx::query_as::<_, NotificationSettings>(
            "SELECT * FROM notification_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(settings) = existing {
            return Ok(settings);
        }

        let created = sqlx::query_as::<_, NotificationSettings>(
            "INSERT INTO notification_settings (user_id) VALUES ($1) RETURNING *",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update_notification_settings(
        &self,
        user_id: Uuid,
        update: SettingsUpdate,
    ) -> Result<NotificationSettings, ApiError> {
        if let Some(max) = update.max_temp_threshold {
            validate_temperature(max)?;
        }
        if let Some(min) = update.min_temp_threshold {
            validate_temperature(min)?;
        }

        // Ensure the row exists before patching it.
        self.notification_settings(user_id).await?;

        let updated = sqlx::query_as::<_, NotificationSettings>(
            "UPDATE notification_settings SET \
                 email_enabled = COALESCE($2, email_enabled), \
                 sms_enabled = COALESCE($3, sms_enabled), \
                 push_enabled = COALESCE($4, push_enabled), \
                 max_temp_threshold = COALESCE($5, max_temp_threshold), \
                 min_temp_threshold = COALESCE($6, min_temp_threshold), \
                 connection_alerts = COALESCE($7, connection_alerts), \
                 updated_at = now() \
             WHERE user_id = $1 \
             RETURNING *",
        )
        .bind(user_id)
        .bind(update.email_enabled)
        .bind(update.sms_enabled)
        .bind(update.push_enabled)
        .bind(update.max_temp_threshold)
        .bind(update.min_temp_threshold)
        .bind(update.connection_alerts)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    /// Create a custom trigger. Device scope must name a device the user
    /// owns; probe scope additionally requires the probe to belong to that
    /// device.
    pub async fn create_trigger(
        &self,
        user: &User,
        new: NewTrigger<'_>,
    ) -> Result<CustomTrigger, ApiError> {
        if new.name.trim().is_empty() {
            return Err(ApiError::Validation("trigger name must not be empty".into()));
        }
        validate_temperature(new.threshold)?;
        if new.probe_id.is_some() && new.device_id.is_none() {
            return Err(ApiError::Validation(
                "probe scope requires a device scope".into(),
            ));
        }

        let device = match new.device_id {
            Some(external_id) => {
                let device = sqlx::query_as::<_, crate::db::models::Device>(
                    "SELECT * FROM devices WHERE device_id = $1",
                )
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ApiError::UnknownDevice(external_id.to_owned()))?;
                if device.owner_id != Some(user.id) {
                    return Err(ApiError::Validation(format!(
                        "device {external_id} is not associated with this account"
                    )));
                }
                Some(device)
            }
            None => None,
        };

        let probe_uuid = match (new.probe_id, &device) {
            (Some(probe_external), Some(device)) => {
                let probe = sqlx::query_as::<_, crate::db::models::Probe>(
                    "SELECT * FROM probes WHERE device_id = $1 AND probe_id = $2",
                )
                .bind(device.id)
                .bind(probe_external)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ApiError::UnknownProbe(probe_external.to_owned()))?;
                Some(probe.id)
            }
            _ => None,
        };

        let trigger = sqlx::query_as::<_, CustomTrigger>(
            "INSERT INTO custom_triggers \
                 (user_id, name, condition, threshold, device_id, probe_id, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING *",
        )
        .bind(user.id)
        .bind(new.name)
        .bind(new.condition)
        .bind(new.threshold)
        .bind(device.as_ref().map(|d| d.id))
        .bind(probe_uuid)
        .bind(new.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(trigger)
    }

    pub async fn list_triggers(&self, user_id: Uuid) -> Result<Vec<TriggerView>, ApiError> {
        let triggers = sqlx::query_as::<_, TriggerView>(&format!(
            "{TRIGGER_VIEW_SELECT} WHERE t.user_id = $1 ORDER BY t.created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(triggers)
    }

    pub async fn trigger_view(
        &self,
        user_id: Uuid,
        trigger_id: Uuid,
    ) -> Result<TriggerView, ApiError> {
        sqlx::query_as::<_, TriggerView>(&format!(
            "{TRIGGER_VIEW_SELECT} WHERE t.user_id = $1 AND t.id = $2"
        ))
        .bind(user_id)
        .bind(trigger_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("trigger {trigger_id} not found")))
    }

    /// Active triggers considered during threshold evaluation for a user.
    pub async fn active_triggers(&self, user_id: Uuid) -> Result<Vec<CustomTrigger>, ApiError> {
        let triggers = sqlx::query_as::<_, CustomTrigger>(
            "SELECT * FROM custom_triggers WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(triggers)
    }

    pub async fn update_trigger(
        &self,
        user_id: Uuid,
        trigger_id: Uuid,
        update: TriggerUpdate<'_>,
    ) -> Result<CustomTrigger, ApiError> {
        if let Some(threshold) = update.threshold {
            validate_temperature(threshold)?;
        }

        sqlx::query_as::<_, CustomTrigger>(
            "UPDATE custom_triggers SET \
                 name = COALESCE($3, name), \
                 condition = COALESCE($4, condition), \
                 threshold = COALESCE($5, threshold), \
                 is_active = COALESCE($6, is_active), \
                 updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING *",
        )
        .bind(trigger_id)
        .bind(user_id)
        .bind(update.name)
        .bind(update.condition)
        .bind(update.threshold)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("trigger {trigger_id} not found")))
    }

    pub async fn delete_trigger(&self, user_id: Uuid, trigger_id: Uuid) -> Result<(), ApiError> {
        let deleted = sqlx::query("DELETE FROM custom_triggers WHERE id = $1 AND user_id = $2")
            .bind(trigger_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("trigger {trigger_id} not found")));
        }
        Ok(())
    }

    async fn username_taken(&self, username: &str, exclude: Uuid) -> Result<bool, ApiError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 AND id <> $2)",
        )
        .bind(username)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn email_taken(&self, email: &str, exclude: Uuid) -> Result<bool, ApiError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND id <> $2)",
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() || username.len() > 64 {
        return Err(ApiError::Validation(
            "username must be between 1 and 64 characters".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if !email.contains('@') || email.len() > 255 {
        return Err(ApiError::Validation("email address is not valid".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_bounds() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"x".repeat(65)).is_err());
    }

    #[test]
    fn email_needs_an_at_sign() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("alice.example.com").is_err());
    }

    #[test]
    fn password_minimum_length() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
    }
}
