use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    alerts,
    category::{IdentifierPolicy, NotificationCategory, UserInfoKey},
    error::{DeliveryError, ReminderError},
    notifications::{
        AuthorizationOptions, AuthorizationStatus, NotificationCenter, NotificationContent,
        NotificationRequest, PendingNotification,
    },
    tracker::{ReminderEntry, ReminderState, ReminderTracker},
};

/// What a reconciliation or sweep did to the notification queue.
///
/// Queue failures end up in `failures` instead of being returned; the next
/// reconciliation re-diffs against the queue and repairs whatever was missed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub expired: Vec<String>,
    pub cancelled: Vec<String>,
    pub removed_delivered: Vec<String>,
    pub sent: Vec<String>,
    pub replaced: bool,
    #[serde(skip)]
    pub failures: Vec<DeliveryError>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Keeps the notification queue in line with the tracked reminders, one
/// tracker per category.
pub struct ReminderService {
    trackers: Mutex<HashMap<NotificationCategory, ReminderTracker>>,
    center: Box<dyn NotificationCenter>,
}

pub struct ReminderServiceBuilder {
    center: Option<Box<dyn NotificationCenter>>,
}

impl ReminderServiceBuilder {
    pub fn new() -> Self {
        Self { center: None }
    }

    pub fn with_notification_center(mut self, center: Box<dyn NotificationCenter>) -> Self {
        self.center = Some(center);
        self
    }

    pub fn build(self) -> Result<ReminderService> {
        let center = self
            .center
            .ok_or_else(|| anyhow!("notification center not configured"))?;
        Ok(ReminderService {
            trackers: Mutex::new(HashMap::new()),
            center,
        })
    }
}

impl Default for ReminderServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReminderService {
    pub fn builder() -> ReminderServiceBuilder {
        ReminderServiceBuilder::new()
    }

    pub fn notification_center(&self) -> &dyn NotificationCenter {
        self.center.as_ref()
    }

    pub fn reconcile(
        &self,
        category: NotificationCategory,
        entry: ReminderEntry,
    ) -> Result<ReconcileReport, ReminderError> {
        self.reconcile_at(category, entry, Utc::now())
    }

    /// Adds or replaces `entry` and brings the category's pending
    /// notifications in line with the tracked set.
    ///
    /// The tracker is updated before diffing against the queue. Only entry
    /// validation errors are returned; queue failures are logged and reported.
    #[instrument(skip(self, entry), fields(identifier = %entry.identifier))]
    pub fn reconcile_at(
        &self,
        category: NotificationCategory,
        mut entry: ReminderEntry,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ReminderError> {
        entry.identifier = category.notification_identifier(&entry.identifier);
        let identifier = entry.identifier.clone();

        let mut trackers = self.trackers.lock();
        let tracker = trackers.entry(category).or_default();
        let mut report = ReconcileReport {
            expired: identifiers(tracker.purge_expired(now)),
            ..ReconcileReport::default()
        };

        let baseline = tracker.snapshot();
        if let Err(err) = tracker.add_or_update(entry, now) {
            // the purge above still has to reach the queue
            self.converge(category, tracker, &baseline, &mut report);
            return Err(err);
        }
        report.replaced = baseline.contains_key(&identifier);
        let desired = tracker.snapshot();
        debug!(
            baseline = baseline.len(),
            desired = desired.len(),
            replaced = report.replaced,
            "updated desired reminders"
        );

        self.converge(category, tracker, &desired, &mut report);
        Ok(report)
    }

    pub fn remove_expired(&self, category: NotificationCategory) -> ReconcileReport {
        self.remove_expired_at(category, Utc::now())
    }

    /// Removes delivered and pending notifications of `category` whose
    /// expiration date lies strictly before `now`.
    #[instrument(skip(self))]
    pub fn remove_expired_at(
        &self,
        category: NotificationCategory,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let mut trackers = self.trackers.lock();
        let mut report = ReconcileReport {
            expired: trackers
                .get_mut(&category)
                .map(|tracker| identifiers(tracker.purge_expired(now)))
                .unwrap_or_default(),
            ..ReconcileReport::default()
        };
        let singleton = category.policy() == IdentifierPolicy::Singleton;

        match self.center.delivered(category) {
            Ok(delivered) => {
                let stale = expired_identifiers(&delivered, now, singleton);
                if !stale.is_empty() {
                    match self.center.remove_delivered(&stale) {
                        Ok(()) => report.removed_delivered = stale,
                        Err(err) => record_failure(category, &mut report, err),
                    }
                }
            }
            Err(err) => record_failure(category, &mut report, err),
        }

        match self.center.pending(category) {
            Ok(pending) => {
                let stale = expired_identifiers(&pending, now, singleton);
                if !stale.is_empty() {
                    match self.center.cancel_pending(&stale) {
                        Ok(()) => {
                            if let Some(tracker) = trackers.get_mut(&category) {
                                for id in &stale {
                                    tracker.remove(id);
                                }
                            }
                            report.cancelled = stale;
                        }
                        Err(err) => record_failure(category, &mut report, err),
                    }
                }
            }
            Err(err) => record_failure(category, &mut report, err),
        }

        debug!(
            removed = report.removed_delivered.len(),
            cancelled = report.cancelled.len(),
            "swept expired notifications"
        );
        report
    }

    /// Drops a tracked reminder whose upstream record went away and cancels
    /// its notification.
    #[instrument(skip(self))]
    pub fn remove_entry(&self, category: NotificationCategory, identifier: &str) -> ReconcileReport {
        let identifier = category.notification_identifier(identifier);
        let mut trackers = self.trackers.lock();
        if let Some(tracker) = trackers.get_mut(&category) {
            tracker.remove(&identifier);
        }
        let mut report = ReconcileReport::default();
        let ids = vec![identifier];
        match self.center.cancel_pending(&ids) {
            Ok(()) => report.cancelled = ids,
            Err(err) => record_failure(category, &mut report, err),
        }
        report
    }

    /// Delivers `content` right away under the category's identifier policy.
    /// Anything tracked under the same identifier is superseded.
    #[instrument(skip(self, content))]
    pub fn send_immediate(
        &self,
        category: NotificationCategory,
        identifier: &str,
        content: NotificationContent,
    ) -> ReconcileReport {
        self.deliver(category, identifier, content, None)
    }

    /// Hands `content` to the queue to fire at `trigger` without tracking it.
    /// `expiration`, when given, is stored as the `expirationDate` user info so
    /// that [`Self::remove_expired`] can clear it later.
    #[instrument(skip(self, content))]
    pub fn send_at(
        &self,
        category: NotificationCategory,
        identifier: &str,
        content: NotificationContent,
        trigger: DateTime<Utc>,
        expiration: Option<DateTime<Utc>>,
    ) -> ReconcileReport {
        let content = match expiration {
            Some(expiration) => content.with_date(UserInfoKey::ExpirationDate, expiration),
            None => content,
        };
        self.deliver(category, identifier, content, Some(trigger))
    }

    fn deliver(
        &self,
        category: NotificationCategory,
        identifier: &str,
        content: NotificationContent,
        trigger: Option<DateTime<Utc>>,
    ) -> ReconcileReport {
        let identifier = category.notification_identifier(identifier);
        let mut trackers = self.trackers.lock();
        if let Some(tracker) = trackers.get_mut(&category) {
            tracker.remove(&identifier);
        }
        let mut report = ReconcileReport::default();
        let request = NotificationRequest {
            identifier: identifier.clone(),
            category,
            trigger,
            content,
        };
        match self.center.add(request) {
            Ok(()) => report.sent.push(identifier),
            Err(err) => record_failure(category, &mut report, err),
        }
        report
    }

    pub fn current_entries(
        &self,
        category: NotificationCategory,
        now: DateTime<Utc>,
    ) -> Vec<ReminderEntry> {
        self.trackers
            .lock()
            .get_mut(&category)
            .map(|tracker| tracker.current_entries(now))
            .unwrap_or_default()
    }

    pub fn contains(&self, category: NotificationCategory, identifier: &str) -> bool {
        let identifier = category.notification_identifier(identifier);
        self.trackers
            .lock()
            .get(&category)
            .is_some_and(|tracker| tracker.contains(&identifier))
    }

    pub fn state_of(
        &self,
        category: NotificationCategory,
        identifier: &str,
    ) -> Option<ReminderState> {
        let identifier = category.notification_identifier(identifier);
        self.trackers
            .lock()
            .get(&category)
            .and_then(|tracker| tracker.state(&identifier))
    }

    /// Fails with [`ReminderError::AuthorizationDenied`] unless notifications
    /// are currently permitted.
    pub fn ensure_authorized(&self) -> Result<AuthorizationStatus, ReminderError> {
        let status = self.center.authorization_status();
        if status.is_granted() {
            Ok(status)
        } else {
            Err(ReminderError::AuthorizationDenied { status })
        }
    }

    /// Registers the notification actions and asks for permission.
    #[instrument(skip(self))]
    pub fn authorize(&self, critical_alerts: bool) -> Result<AuthorizationStatus, ReminderError> {
        self.center.set_categories(alerts::default_categories());
        let status = match self
            .center
            .request_authorization(AuthorizationOptions::standard(critical_alerts))
        {
            Ok(status) => status,
            Err(err) => {
                warn!(%err, "authorization request failed");
                self.center.authorization_status()
            }
        };
        if status.is_granted() {
            Ok(status)
        } else {
            Err(ReminderError::AuthorizationDenied { status })
        }
    }
}

impl ReminderService {
    fn converge(
        &self,
        category: NotificationCategory,
        tracker: &mut ReminderTracker,
        desired: &BTreeMap<String, DateTime<Utc>>,
        report: &mut ReconcileReport,
    ) {
        match self.center.pending(category) {
            Ok(pending) => {
                let mut to_cancel: Vec<String> = pending
                    .iter()
                    .filter(|notification| {
                        desired.get(&notification.identifier) != notification.trigger_time.as_ref()
                    })
                    .map(|notification| notification.identifier.clone())
                    .collect();
                to_cancel.sort();
                to_cancel.dedup();
                if !to_cancel.is_empty() {
                    debug!(?to_cancel, "cancelling stale notifications");
                    match self.center.cancel_pending(&to_cancel) {
                        Ok(()) => report.cancelled = to_cancel,
                        Err(err) => record_failure(category, report, err),
                    }
                }
            }
            Err(err) => record_failure(category, report, err),
        }

        for identifier in desired.keys() {
            let Some(entry) = tracker.get(identifier) else {
                continue;
            };
            let request = NotificationRequest {
                identifier: identifier.clone(),
                category,
                trigger: Some(entry.trigger_time),
                content: entry.content.clone(),
            };
            match self.center.add(request) {
                Ok(()) => {
                    tracker.mark_scheduled(identifier);
                    report.sent.push(identifier.clone());
                }
                Err(err) => record_failure(category, report, err),
            }
        }
    }
}

fn record_failure(category: NotificationCategory, report: &mut ReconcileReport, err: DeliveryError) {
    warn!(%err, %category, "notification queue operation failed");
    report.failures.push(err);
}

fn identifiers(entries: Vec<ReminderEntry>) -> Vec<String> {
    entries.into_iter().map(|entry| entry.identifier).collect()
}

fn expired_identifiers(
    notifications: &[PendingNotification],
    now: DateTime<Utc>,
    singleton: bool,
) -> Vec<String> {
    let mut stale = Vec::new();
    for notification in notifications {
        let Some(expiration) = notification.expiration_time() else {
            continue;
        };
        if expiration < now {
            stale.push(notification.identifier.clone());
            // a singleton category has at most one outstanding notification
            if singleton {
                break;
            }
        }
    }
    stale
}
