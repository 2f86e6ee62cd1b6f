//! In-memory notification queue used by tests and the command-line driver.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    category::NotificationCategory,
    error::{DeliveryError, DeliveryOperation},
    notifications::{
        AuthorizationOptions, AuthorizationStatus, CategoryRegistration, NotificationCenter,
        NotificationRequest, PendingNotification,
    },
};

/// Mutating call recorded by [`InMemoryNotificationCenter`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOperation {
    Add(NotificationRequest),
    CancelPending(Vec<String>),
    RemoveDelivered(Vec<String>),
}

#[derive(Debug)]
struct QueueState {
    pending: Vec<PendingNotification>,
    delivered: Vec<PendingNotification>,
    categories: Vec<CategoryRegistration>,
    authorization: AuthorizationStatus,
    grant_on_request: bool,
    deferred: bool,
    queued: Vec<QueueOperation>,
    history: Vec<QueueOperation>,
    failures: HashMap<DeliveryOperation, usize>,
}

/// Notification queue with the replace-on-same-identifier semantics of a
/// device notification center.
///
/// Requests without a trigger land in the delivered list straight away;
/// scheduled requests stay pending until [`advance_to`](Self::advance_to)
/// passes their trigger. In deferred mode mutations are held back until
/// [`flush`](Self::flush), which models the window in which the real queue
/// has not caught up with the calls made against it.
#[derive(Debug)]
pub struct InMemoryNotificationCenter {
    state: Mutex<QueueState>,
}

impl Default for InMemoryNotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotificationCenter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                delivered: Vec::new(),
                categories: Vec::new(),
                authorization: AuthorizationStatus::Authorized,
                grant_on_request: true,
                deferred: false,
                queued: Vec::new(),
                history: Vec::new(),
                failures: HashMap::new(),
            }),
        }
    }

    pub fn deferred() -> Self {
        let center = Self::new();
        center.state.lock().deferred = true;
        center
    }

    pub fn with_authorization(self, status: AuthorizationStatus, grant_on_request: bool) -> Self {
        {
            let mut state = self.state.lock();
            state.authorization = status;
            state.grant_on_request = grant_on_request;
        }
        self
    }

    /// Makes the next `count` calls of `operation` fail.
    pub fn fail_next(&self, operation: DeliveryOperation, count: usize) {
        *self.state.lock().failures.entry(operation).or_default() += count;
    }

    /// Applies every queued mutation. No-op outside deferred mode.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        let queued = std::mem::take(&mut state.queued);
        for operation in queued {
            state.apply(operation);
        }
    }

    /// Moves every pending notification due at `now` to the delivered list.
    pub fn advance_to(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut state = self.state.lock();
        let (due, still_pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|notification| {
                notification
                    .trigger_time
                    .map_or(true, |trigger| trigger <= now)
            });
        state.pending = still_pending;
        let fired: Vec<String> = due.iter().map(|n| n.identifier.clone()).collect();
        for notification in due {
            state.deliver(notification);
        }
        fired
    }

    pub fn pending_snapshot(&self) -> Vec<PendingNotification> {
        self.state.lock().pending.clone()
    }

    pub fn delivered_snapshot(&self) -> Vec<PendingNotification> {
        self.state.lock().delivered.clone()
    }

    pub fn pending_identifiers(&self, category: NotificationCategory) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .pending
            .iter()
            .filter(|n| n.category == category)
            .map(|n| n.identifier.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn history(&self) -> Vec<QueueOperation> {
        self.state.lock().history.clone()
    }

    pub fn categories(&self) -> Vec<CategoryRegistration> {
        self.state.lock().categories.clone()
    }

    fn take_failure(&self, operation: DeliveryOperation) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        match state.failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(DeliveryError::new(operation, "injected failure"))
            }
            _ => Ok(()),
        }
    }

    fn submit(&self, operation: QueueOperation) {
        let mut state = self.state.lock();
        state.history.push(operation.clone());
        if state.deferred {
            state.queued.push(operation);
        } else {
            state.apply(operation);
        }
    }
}

impl QueueState {
    fn apply(&mut self, operation: QueueOperation) {
        match operation {
            QueueOperation::Add(request) => {
                let notification = PendingNotification::from(request);
                self.pending.retain(|n| n.identifier != notification.identifier);
                if notification.trigger_time.is_some() {
                    self.pending.push(notification);
                } else {
                    self.deliver(notification);
                }
            }
            QueueOperation::CancelPending(ids) => {
                self.pending.retain(|n| !ids.contains(&n.identifier));
            }
            QueueOperation::RemoveDelivered(ids) => {
                self.delivered.retain(|n| !ids.contains(&n.identifier));
            }
        }
    }

    fn deliver(&mut self, notification: PendingNotification) {
        self.delivered.retain(|n| n.identifier != notification.identifier);
        self.delivered.push(notification);
    }
}

impl NotificationCenter for InMemoryNotificationCenter {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.state.lock().authorization
    }

    fn request_authorization(
        &self,
        _options: AuthorizationOptions,
    ) -> Result<AuthorizationStatus, DeliveryError> {
        self.take_failure(DeliveryOperation::Authorize)?;
        let mut state = self.state.lock();
        if state.authorization == AuthorizationStatus::NotDetermined {
            state.authorization = if state.grant_on_request {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Denied
            };
        }
        Ok(state.authorization)
    }

    fn set_categories(&self, categories: Vec<CategoryRegistration>) {
        self.state.lock().categories = categories;
    }

    fn add(&self, request: NotificationRequest) -> Result<(), DeliveryError> {
        self.take_failure(DeliveryOperation::Add)?;
        self.submit(QueueOperation::Add(request));
        Ok(())
    }

    fn cancel_pending(&self, identifiers: &[String]) -> Result<(), DeliveryError> {
        self.take_failure(DeliveryOperation::CancelPending)?;
        self.submit(QueueOperation::CancelPending(identifiers.to_vec()));
        Ok(())
    }

    fn pending(
        &self,
        category: NotificationCategory,
    ) -> Result<Vec<PendingNotification>, DeliveryError> {
        self.take_failure(DeliveryOperation::ListPending)?;
        Ok(self
            .state
            .lock()
            .pending
            .iter()
            .filter(|n| n.category == category)
            .cloned()
            .collect())
    }

    fn delivered(
        &self,
        category: NotificationCategory,
    ) -> Result<Vec<PendingNotification>, DeliveryError> {
        self.take_failure(DeliveryOperation::ListDelivered)?;
        Ok(self
            .state
            .lock()
            .delivered
            .iter()
            .filter(|n| n.category == category)
            .cloned()
            .collect())
    }

    fn remove_delivered(&self, identifiers: &[String]) -> Result<(), DeliveryError> {
        self.take_failure(DeliveryOperation::RemoveDelivered)?;
        self.submit(QueueOperation::RemoveDelivered(identifiers.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationContent;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 7, 12, 0, 0).unwrap()
    }

    fn request(id: &str, trigger: Option<DateTime<Utc>>) -> NotificationRequest {
        NotificationRequest {
            identifier: id.to_string(),
            category: NotificationCategory::MealtimeReminder,
            trigger,
            content: NotificationContent::new("Mealtime Reminder", "It's time to eat now!"),
        }
    }

    #[test]
    fn same_identifier_replaces_pending_request() {
        let center = InMemoryNotificationCenter::new();
        center
            .add(request("c1", Some(now() + Duration::minutes(10))))
            .unwrap();
        center
            .add(request("c1", Some(now() + Duration::minutes(20))))
            .unwrap();
        let pending = center.pending_snapshot();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].trigger_time, Some(now() + Duration::minutes(20)));
    }

    #[test]
    fn cancelling_unknown_identifier_is_noop() {
        let center = InMemoryNotificationCenter::new();
        center.cancel_pending(&["missing".to_string()]).unwrap();
        assert!(center.pending_snapshot().is_empty());
    }

    #[test]
    fn immediate_requests_are_delivered() {
        let center = InMemoryNotificationCenter::new();
        center.add(request("now", None)).unwrap();
        assert!(center.pending_snapshot().is_empty());
        assert_eq!(center.delivered_snapshot().len(), 1);
    }

    #[test]
    fn advance_fires_due_requests() {
        let center = InMemoryNotificationCenter::new();
        center
            .add(request("soon", Some(now() + Duration::minutes(5))))
            .unwrap();
        center
            .add(request("later", Some(now() + Duration::minutes(50))))
            .unwrap();
        let fired = center.advance_to(now() + Duration::minutes(5));
        assert_eq!(fired, vec!["soon".to_string()]);
        assert_eq!(
            center.pending_identifiers(NotificationCategory::MealtimeReminder),
            vec!["later".to_string()]
        );
    }

    #[test]
    fn deferred_mode_holds_mutations_until_flush() {
        let center = InMemoryNotificationCenter::deferred();
        center
            .add(request("c1", Some(now() + Duration::minutes(5))))
            .unwrap();
        assert!(center.pending_snapshot().is_empty());
        center.flush();
        assert_eq!(center.pending_snapshot().len(), 1);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let center = InMemoryNotificationCenter::new();
        center.fail_next(DeliveryOperation::Add, 1);
        assert!(center.add(request("c1", None)).is_err());
        assert!(center.add(request("c1", None)).is_ok());
        assert_eq!(center.history().len(), 1);
    }

    #[test]
    fn authorization_request_resolves_undetermined_status() {
        let center = InMemoryNotificationCenter::new()
            .with_authorization(AuthorizationStatus::NotDetermined, false);
        let status = center
            .request_authorization(AuthorizationOptions::standard(false))
            .unwrap();
        assert_eq!(status, AuthorizationStatus::Denied);
    }
}
