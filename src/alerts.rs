//! Threshold evaluation for ingested temperature readings.
//!
//! Pure functions: the caller loads the owner's notification settings and
//! active triggers, and hands every fired [`Alert`] to the dispatcher. Global
//! min/max thresholds are checked first, then custom triggers. Triggers are
//! independent; firing one never suppresses another, and there is no
//! debounce window — every breach fires again.

use uuid::Uuid;

use crate::db::models::{
    CustomTrigger, NotificationKind, NotificationSettings, TriggerCondition,
};

/// One reading in evaluation context. Labels are user-facing display names
/// used to build notification text.
#[derive(Debug)]
pub struct ReadingContext<'a> {
    pub device_id: Uuid,
    pub device_label: &'a str,
    pub probe_id: Option<Uuid>,
    pub probe_label: Option<&'a str>,
    pub temperature: f64,
}

/// A fired alert, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

pub fn evaluate(
    settings: &NotificationSettings,
    triggers: &[CustomTrigger],
    reading: &ReadingContext<'_>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let subject = subject_label(reading);

    if let Some(max) = settings.max_temp_threshold {
        if reading.temperature > max {
            alerts.push(Alert {
                kind: NotificationKind::TemperatureAlert,
                title: "High temperature alert".to_owned(),
                message: format!(
                    "Temperature for {subject} has exceeded the maximum threshold: \
                     {}°F (threshold {max}°F)",
                    reading.temperature
                ),
            });
        }
    }

    if let Some(min) = settings.min_temp_threshold {
        if reading.temperature < min {
            alerts.push(Alert {
                kind: NotificationKind::TemperatureAlert,
                title: "Low temperature alert".to_owned(),
                message: format!(
                    "Temperature for {subject} has fallen below the minimum threshold: \
                     {}°F (threshold {min}°F)",
                    reading.temperature
                ),
            });
        }
    }

    for trigger in triggers.iter().filter(|t| t.is_active) {
        if !in_scope(trigger, reading) {
            continue;
        }
        if condition_met(trigger.condition, reading.temperature, trigger.threshold) {
            alerts.push(Alert {
                kind: NotificationKind::CustomTrigger,
                title: format!("Custom temperature alert: {}", trigger.name),
                message: format!(
                    "Temperature for {subject} is {}°F ({} {}°F)",
                    reading.temperature,
                    condition_word(trigger.condition),
                    trigger.threshold
                ),
            });
        }
    }

    alerts
}

/// `equal` is an exact comparison; no tolerance band is applied.
pub fn condition_met(condition: TriggerCondition, value: f64, threshold: f64) -> bool {
    match condition {
        TriggerCondition::Above => value > threshold,
        TriggerCondition::Below => value < threshold,
        TriggerCondition::Equal => value == threshold,
    }
}

/// A device-scoped trigger only fires for that device; a probe-scoped one
/// only for readings of that probe. Unscoped triggers fire everywhere.
fn in_scope(trigger: &CustomTrigger, reading: &ReadingContext<'_>) -> bool {
    if let Some(device_id) = trigger.device_id {
        if device_id != reading.device_id {
            return false;
        }
    }
    match trigger.probe_id {
        Some(probe_id) => reading.probe_id == Some(probe_id),
        None => true,
    }
}

fn condition_word(condition: TriggerCondition) -> &'static str {
    match condition {
        TriggerCondition::Above => "above",
        TriggerCondition::Below => "below",
        TriggerCondition::Equal => "equal to",
    }
}

fn subject_label(reading: &ReadingContext<'_>) -> String {
    match reading.probe_label {
        Some(probe) => format!("{} ({probe})", reading.device_label),
        None => reading.device_label.to_owned(),
    }
}
