use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    category::{NotificationAction, NotificationCategory, UserInfoKey},
    error::DeliveryError,
};

pub type UserInfo = Map<String, Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub sound: bool,
    /// Action set the OS attaches to the notification, if any.
    pub category_identifier: Option<String>,
    pub user_info: UserInfo,
}

impl NotificationContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            sound: true,
            category_identifier: None,
            user_info: UserInfo::new(),
        }
    }

    pub fn with_user_info(mut self, key: UserInfoKey, value: impl Into<Value>) -> Self {
        self.user_info.insert(key.as_str().to_string(), value.into());
        self
    }

    pub fn with_date(self, key: UserInfoKey, date: DateTime<Utc>) -> Self {
        self.with_user_info(key, date.to_rfc3339())
    }

    pub fn with_category_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.category_identifier = Some(identifier.into());
        self
    }

    pub fn user_info_str(&self, key: UserInfoKey) -> Option<&str> {
        self.user_info.get(key.as_str()).and_then(Value::as_str)
    }

    pub fn user_info_date(&self, key: UserInfoKey) -> Option<DateTime<Utc>> {
        let raw = self.user_info_str(key)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|date| date.with_timezone(&Utc))
    }

    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.user_info_date(UserInfoKey::ExpirationDate)
    }
}

/// A request handed to the notification queue. `trigger: None` delivers
/// immediately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRequest {
    pub identifier: String,
    pub category: NotificationCategory,
    pub trigger: Option<DateTime<Utc>>,
    pub content: NotificationContent,
}

/// A notification as reported back by the queue, either pending or delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingNotification {
    pub identifier: String,
    pub category: NotificationCategory,
    pub trigger_time: Option<DateTime<Utc>>,
    pub content: NotificationContent,
}

impl PendingNotification {
    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.content.expiration_time()
    }
}

impl From<NotificationRequest> for PendingNotification {
    fn from(request: NotificationRequest) -> Self {
        Self {
            identifier: request.identifier,
            category: request.category,
            trigger_time: request.trigger,
            content: request.content,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
    NotDetermined,
    Denied,
    Authorized,
    Provisional,
}

impl AuthorizationStatus {
    pub fn is_granted(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Authorized | AuthorizationStatus::Provisional
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationOptions {
    pub alert: bool,
    pub badge: bool,
    pub sound: bool,
    pub critical_alert: bool,
}

impl AuthorizationOptions {
    pub fn standard(critical_alerts: bool) -> Self {
        Self {
            alert: true,
            badge: true,
            sound: true,
            critical_alert: critical_alerts,
        }
    }
}

/// Action set registered for a category identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRegistration {
    pub identifier: String,
    pub actions: Vec<NotificationAction>,
    pub custom_dismiss_action: bool,
}

/// Platform-specific notification adapters implement this trait.
///
/// Implementations must not block on the underlying service: `add`,
/// `cancel_pending` and `remove_delivered` dispatch and return. Replacing a
/// request with the same identifier overwrites the earlier one, and cancelling
/// an unknown identifier is not an error.
pub trait NotificationCenter: Send + Sync {
    fn authorization_status(&self) -> AuthorizationStatus;
    fn request_authorization(
        &self,
        options: AuthorizationOptions,
    ) -> Result<AuthorizationStatus, DeliveryError>;
    fn set_categories(&self, categories: Vec<CategoryRegistration>);

    fn add(&self, request: NotificationRequest) -> Result<(), DeliveryError>;
    fn cancel_pending(&self, identifiers: &[String]) -> Result<(), DeliveryError>;
    fn pending(&self, category: NotificationCategory)
        -> Result<Vec<PendingNotification>, DeliveryError>;
    fn delivered(
        &self,
        category: NotificationCategory,
    ) -> Result<Vec<PendingNotification>, DeliveryError>;
    fn remove_delivered(&self, identifiers: &[String]) -> Result<(), DeliveryError>;
}

impl<T: NotificationCenter + ?Sized> NotificationCenter for Arc<T> {
    fn authorization_status(&self) -> AuthorizationStatus {
        (**self).authorization_status()
    }

    fn request_authorization(
        &self,
        options: AuthorizationOptions,
    ) -> Result<AuthorizationStatus, DeliveryError> {
        (**self).request_authorization(options)
    }

    fn set_categories(&self, categories: Vec<CategoryRegistration>) {
        (**self).set_categories(categories)
    }

    fn add(&self, request: NotificationRequest) -> Result<(), DeliveryError> {
        (**self).add(request)
    }

    fn cancel_pending(&self, identifiers: &[String]) -> Result<(), DeliveryError> {
        (**self).cancel_pending(identifiers)
    }

    fn pending(
        &self,
        category: NotificationCategory,
    ) -> Result<Vec<PendingNotification>, DeliveryError> {
        (**self).pending(category)
    }

    fn delivered(
        &self,
        category: NotificationCategory,
    ) -> Result<Vec<PendingNotification>, DeliveryError> {
        (**self).delivered(category)
    }

    fn remove_delivered(&self, identifiers: &[String]) -> Result<(), DeliveryError> {
        (**self).remove_delivered(identifiers)
    }
}
