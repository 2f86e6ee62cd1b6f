//! Notification content for each reminder category, and the service helpers
//! that deliver it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    category::{NotificationAction, NotificationCategory, UserInfoKey},
    error::ReminderError,
    notifications::{CategoryRegistration, NotificationContent},
    service::{ReconcileReport, ReminderService},
    tracker::ReminderEntry,
};

/// Slow carb absorption time; a missed-meal notification stops being useful
/// once a meal eaten at `meal_start` would have been absorbed.
pub const MISSED_MEAL_RELEVANCE_MINUTES: i64 = 4 * 60;
pub const MEALTIME_REMINDER_GRACE_MINUTES: i64 = 5;
/// Bolus failures older than this are shown without the retry action.
pub const BOLUS_RETRY_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BolusActivationType {
    Manual,
    Automatic,
    Remote,
}

impl BolusActivationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BolusActivationType::Manual => "manual",
            BolusActivationType::Automatic => "automatic",
            BolusActivationType::Remote => "remote",
        }
    }
}

/// Pump error as described to the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PumpFailure {
    pub description: Option<String>,
    pub failure_reason: Option<String>,
    pub recovery_suggestion: Option<String>,
}

impl PumpFailure {
    /// Joins the available sentences, adding a full stop where one is missing.
    pub fn body(&self) -> String {
        [
            self.description.as_deref(),
            self.failure_reason.as_deref(),
            self.recovery_suggestion.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(|sentence| {
            if sentence.ends_with('.') {
                sentence.to_string()
            } else {
                format!("{sentence}.")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
    }
}

pub fn default_categories() -> Vec<CategoryRegistration> {
    vec![
        CategoryRegistration {
            identifier: NotificationCategory::BolusFailure.as_str().to_string(),
            actions: vec![NotificationAction::RetryBolus],
            custom_dismiss_action: false,
        },
        CategoryRegistration {
            identifier: NotificationCategory::Alert.as_str().to_string(),
            actions: vec![NotificationAction::AcknowledgeAlert],
            custom_dismiss_action: true,
        },
    ]
}

pub fn missed_meal(meal_start: DateTime<Utc>, grams: f64) -> NotificationContent {
    NotificationContent::new(
        "Possible Missed Meal",
        "It looks like you may not have logged a meal you ate. Tap to log it now.",
    )
    .with_date(UserInfoKey::MissedMealTime, meal_start)
    .with_user_info(UserInfoKey::MissedMealCarbAmount, grams)
    .with_date(
        UserInfoKey::ExpirationDate,
        meal_start + Duration::minutes(MISSED_MEAL_RELEVANCE_MINUTES),
    )
}

pub fn mealtime_reminder(carb_entry_identifier: &str, mealtime: DateTime<Utc>) -> NotificationContent {
    NotificationContent::new("Mealtime Reminder", "It's time to eat now!")
        .with_user_info(UserInfoKey::CarbEntryIdentifier, carb_entry_identifier)
        .with_date(
            UserInfoKey::ExpirationDate,
            mealtime + Duration::minutes(MEALTIME_REMINDER_GRACE_MINUTES),
        )
}

pub fn bolus_failure(
    failure: &PumpFailure,
    units: f64,
    start: DateTime<Utc>,
    activation: BolusActivationType,
    now: DateTime<Utc>,
) -> NotificationContent {
    let mut content = NotificationContent::new("Bolus Issue", failure.body())
        .with_user_info(UserInfoKey::BolusAmount, units)
        .with_date(UserInfoKey::BolusStartDate, start)
        .with_user_info(UserInfoKey::BolusActivationType, activation.as_str());
    if start >= now - Duration::minutes(BOLUS_RETRY_WINDOW_MINUTES) {
        content = content.with_category_identifier(NotificationCategory::BolusFailure.as_str());
    }
    content
}

pub fn remote_command_expired(time_expired: Duration) -> NotificationContent {
    let minutes = (time_expired.num_seconds().abs() as f64 / 60.0).round();
    NotificationContent::new(
        "Remote Command Expired",
        format!("The remote command expired {minutes:.0} minutes ago."),
    )
    .with_category_identifier(NotificationCategory::RemoteCommandExpired.as_str())
}

pub fn remote_bolus(amount: f64) -> NotificationContent {
    NotificationContent::new(remote_bolus_title(amount), "Success!")
}

pub fn remote_bolus_failure(error: &str, amount: f64) -> NotificationContent {
    NotificationContent::new(remote_bolus_title(amount), error)
}

pub fn remote_carbs(grams: f64) -> NotificationContent {
    NotificationContent::new("", format!("{}\nSuccess!", remote_carbs_line(grams)))
}

pub fn remote_carbs_failure(error: &str, grams: f64) -> NotificationContent {
    NotificationContent::new("", format!("{}\n{error}", remote_carbs_line(grams)))
}

fn remote_bolus_title(amount: f64) -> String {
    format!("Remote Bolus Entry: {} U", format_units(amount))
}

fn remote_carbs_line(grams: f64) -> String {
    format!("Remote Carbs Entry: {} grams", grams.trunc() as i64)
}

fn format_units(amount: f64) -> String {
    let formatted = format!("{amount:.2}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

impl ReminderService {
    /// Tracks a mealtime reminder for a carb entry, sweeping expired
    /// reminders first.
    #[instrument(skip(self))]
    pub fn schedule_mealtime_reminder(
        &self,
        carb_entry_identifier: &str,
        mealtime: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ReminderError> {
        let category = NotificationCategory::MealtimeReminder;
        let sweep = self.remove_expired_at(category, now);
        let entry = ReminderEntry::new(
            carb_entry_identifier,
            mealtime,
            mealtime_reminder(carb_entry_identifier, mealtime),
        );
        let mut report = self.reconcile_at(category, entry, now)?;
        report.removed_delivered = sweep.removed_delivered;
        report.failures.extend(sweep.failures);
        Ok(report)
    }

    /// Sends a missed-meal notification, optionally after `delay`. A newer
    /// detection always replaces the outstanding one.
    #[instrument(skip(self))]
    pub fn send_missed_meal(
        &self,
        meal_start: DateTime<Utc>,
        grams: f64,
        delay: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ReminderError> {
        let category = NotificationCategory::MissedMeal;
        let content = missed_meal(meal_start, grams);
        match delay {
            Some(delay) => {
                let entry = ReminderEntry::new(category.as_str(), now + delay, content);
                self.reconcile_at(category, entry, now)
            }
            None => Ok(self.send_immediate(category, category.as_str(), content)),
        }
    }

    pub fn send_bolus_failure(
        &self,
        failure: &PumpFailure,
        units: f64,
        start: DateTime<Utc>,
        activation: BolusActivationType,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let category = NotificationCategory::BolusFailure;
        let content = bolus_failure(failure, units, start, activation, now);
        self.send_immediate(category, category.as_str(), content)
    }

    pub fn send_remote_command_expired(&self, time_expired: Duration) -> ReconcileReport {
        let category = NotificationCategory::RemoteCommandExpired;
        self.send_immediate(category, category.as_str(), remote_command_expired(time_expired))
    }

    pub fn send_remote_bolus(&self, amount: f64) -> ReconcileReport {
        let category = NotificationCategory::RemoteBolus;
        self.send_immediate(category, category.as_str(), remote_bolus(amount))
    }

    pub fn send_remote_bolus_failure(&self, error: &str, amount: f64) -> ReconcileReport {
        let category = NotificationCategory::RemoteBolusFailure;
        self.send_immediate(category, category.as_str(), remote_bolus_failure(error, amount))
    }

    pub fn send_remote_carbs(&self, grams: f64) -> ReconcileReport {
        let category = NotificationCategory::RemoteCarbs;
        self.send_immediate(category, category.as_str(), remote_carbs(grams))
    }

    pub fn send_remote_carbs_failure(&self, error: &str, grams: f64) -> ReconcileReport {
        let category = NotificationCategory::RemoteCarbsFailure;
        self.send_immediate(category, category.as_str(), remote_carbs_failure(error, grams))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn bolus_failure_body_avoids_double_full_stop() {
        let failure = PumpFailure {
            description: Some("Communication failure.".into()),
            failure_reason: Some("The pump did not respond".into()),
            recovery_suggestion: None,
        };
        assert_eq!(
            failure.body(),
            "Communication failure. The pump did not respond."
        );
    }

    #[test]
    fn recent_bolus_failure_offers_retry() {
        let failure = PumpFailure::default();
        let recent = bolus_failure(
            &failure,
            1.5,
            now() - Duration::minutes(2),
            BolusActivationType::Manual,
            now(),
        );
        assert_eq!(recent.category_identifier.as_deref(), Some("bolusFailure"));
        assert_eq!(
            recent.user_info_str(UserInfoKey::BolusActivationType),
            Some("manual")
        );

        let stale = bolus_failure(
            &failure,
            1.5,
            now() - Duration::minutes(6),
            BolusActivationType::Manual,
            now(),
        );
        assert!(stale.category_identifier.is_none());
    }

    #[test]
    fn missed_meal_expires_after_slow_absorption() {
        let start = now() - Duration::minutes(30);
        let content = missed_meal(start, 45.0);
        assert_eq!(content.expiration_time(), Some(start + Duration::hours(4)));
        assert_eq!(content.user_info_date(UserInfoKey::MissedMealTime), Some(start));
    }

    #[test]
    fn mealtime_reminder_expires_five_minutes_after_mealtime() {
        let content = mealtime_reminder("carb-1", now());
        assert_eq!(content.expiration_time(), Some(now() + Duration::minutes(5)));
        assert_eq!(
            content.user_info_str(UserInfoKey::CarbEntryIdentifier),
            Some("carb-1")
        );
    }

    #[test]
    fn default_categories_register_action_sets() {
        let categories = default_categories();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].identifier, "bolusFailure");
        assert_eq!(categories[0].actions, vec![NotificationAction::RetryBolus]);
        assert!(categories[1].custom_dismiss_action);
        assert_eq!(categories[1].actions, vec![NotificationAction::AcknowledgeAlert]);
    }

    #[test]
    fn remote_command_expiry_reports_whole_minutes() {
        let content = remote_command_expired(Duration::seconds(-610));
        assert_eq!(content.body, "The remote command expired 10 minutes ago.");
        assert_eq!(
            content.category_identifier.as_deref(),
            Some("remoteCommandExpired")
        );
    }

    #[test]
    fn remote_entries_format_amounts() {
        assert_eq!(remote_bolus(1.25).title, "Remote Bolus Entry: 1.25 U");
        assert_eq!(remote_bolus(2.0).title, "Remote Bolus Entry: 2 U");
        assert_eq!(
            remote_carbs(30.7).body,
            "Remote Carbs Entry: 30 grams\nSuccess!"
        );
        assert_eq!(
            remote_carbs_failure("Pump busy", 12.0).body,
            "Remote Carbs Entry: 12 grams\nPump busy"
        );
    }
}
