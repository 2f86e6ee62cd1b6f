use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReminderError;

/// Logical notification types. The serialized names match the identifiers the
/// notification queue sees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum NotificationCategory {
    BolusFailure,
    Alert,
    RemoteCommandExpired,
    RemoteBolus,
    RemoteBolusFailure,
    RemoteCarbs,
    RemoteCarbsFailure,
    MissedMeal,
    MealtimeReminder,
}

/// How a category maps its entries onto notification identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// Every notification of the category shares the category identifier, so a
    /// newer one replaces whatever is outstanding.
    Singleton,
    /// Each entry keeps its own identifier; many may be pending at once.
    PerEntry,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 9] = [
        NotificationCategory::BolusFailure,
        NotificationCategory::Alert,
        NotificationCategory::RemoteCommandExpired,
        NotificationCategory::RemoteBolus,
        NotificationCategory::RemoteBolusFailure,
        NotificationCategory::RemoteCarbs,
        NotificationCategory::RemoteCarbsFailure,
        NotificationCategory::MissedMeal,
        NotificationCategory::MealtimeReminder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::BolusFailure => "bolusFailure",
            NotificationCategory::Alert => "alert",
            NotificationCategory::RemoteCommandExpired => "remoteCommandExpired",
            NotificationCategory::RemoteBolus => "remoteBolus",
            NotificationCategory::RemoteBolusFailure => "remoteBolusFailure",
            NotificationCategory::RemoteCarbs => "remoteCarbs",
            NotificationCategory::RemoteCarbsFailure => "remoteCarbsFailure",
            NotificationCategory::MissedMeal => "missedMeal",
            NotificationCategory::MealtimeReminder => "mealtimeReminder",
        }
    }

    pub fn policy(&self) -> IdentifierPolicy {
        match self {
            NotificationCategory::MealtimeReminder => IdentifierPolicy::PerEntry,
            _ => IdentifierPolicy::Singleton,
        }
    }

    /// Resolves the identifier a notification for `entry_identifier` is
    /// scheduled under.
    pub fn notification_identifier(&self, entry_identifier: &str) -> String {
        match self.policy() {
            IdentifierPolicy::Singleton => self.as_str().to_string(),
            IdentifierPolicy::PerEntry => entry_identifier.to_string(),
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationCategory {
    type Err = ReminderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ReminderError::UnknownCategory(value.to_string()))
    }
}

/// Keys used inside a notification's `user_info` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInfoKey {
    BolusAmount,
    BolusStartDate,
    BolusActivationType,
    MissedMealTime,
    MissedMealCarbAmount,
    ExpirationDate,
    CarbEntryIdentifier,
}

impl UserInfoKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserInfoKey::BolusAmount => "bolusAmount",
            UserInfoKey::BolusStartDate => "bolusStartDate",
            UserInfoKey::BolusActivationType => "bolusActivationType",
            UserInfoKey::MissedMealTime => "missedMealTime",
            UserInfoKey::MissedMealCarbAmount => "missedMealCarbAmount",
            UserInfoKey::ExpirationDate => "expirationDate",
            UserInfoKey::CarbEntryIdentifier => "carbEntryIdentifier",
        }
    }
}

/// Actions a user can take straight from a delivered notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum NotificationAction {
    RetryBolus,
    AcknowledgeAlert,
}

impl NotificationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationAction::RetryBolus => "retryBolus",
            NotificationAction::AcknowledgeAlert => "acknowledgeAlert",
        }
    }
}
