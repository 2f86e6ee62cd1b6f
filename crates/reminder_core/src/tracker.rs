use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::ReminderError, notifications::NotificationContent};

/// A reminder that should exist in the notification queue until it fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderEntry {
    pub identifier: String,
    pub trigger_time: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub content: NotificationContent,
}

impl ReminderEntry {
    pub fn new(
        identifier: impl Into<String>,
        trigger_time: DateTime<Utc>,
        content: NotificationContent,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            trigger_time,
            expiration_time: content.expiration_time(),
            content,
        }
    }
}

/// Lifecycle of a single entry. `Expired`, `Cancelled` and `Fired` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderState {
    Pending,
    Scheduled,
    Expired,
    Cancelled,
    Fired,
}

#[derive(Debug, Clone)]
struct TrackedReminder {
    entry: ReminderEntry,
    state: ReminderState,
}

/// In-memory set of future reminders, keyed by identifier.
///
/// Memory only: the set can always be rebuilt from the upstream records, so
/// nothing here is persisted.
#[derive(Debug, Default, Clone)]
pub struct ReminderTracker {
    entries: HashMap<String, TrackedReminder>,
}

impl ReminderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry`, replacing any entry with the same identifier.
    ///
    /// Entries whose trigger time is not strictly after `now`, or that have an
    /// empty identifier, are rejected and leave the set untouched.
    pub fn add_or_update(
        &mut self,
        entry: ReminderEntry,
        now: DateTime<Utc>,
    ) -> Result<Option<ReminderEntry>, ReminderError> {
        if entry.identifier.trim().is_empty() {
            return Err(ReminderError::invalid_entry(
                entry.identifier,
                "identifier must not be empty",
            ));
        }
        if entry.trigger_time <= now {
            return Err(ReminderError::invalid_entry(
                entry.identifier,
                format!(
                    "trigger time {} is not after {}",
                    entry.trigger_time.to_rfc3339(),
                    now.to_rfc3339()
                ),
            ));
        }
        let identifier = entry.identifier.clone();
        let previous = self.entries.insert(
            identifier,
            TrackedReminder {
                entry,
                state: ReminderState::Pending,
            },
        );
        Ok(previous.map(|tracked| tracked.entry))
    }

    /// Drops every entry with `trigger_time <= now` and returns them.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> Vec<ReminderEntry> {
        let expired_ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, tracked)| tracked.entry.trigger_time <= now)
            .map(|(id, _)| id.clone())
            .collect();
        let mut expired: Vec<ReminderEntry> = expired_ids
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .map(|tracked| tracked.entry)
            .collect();
        expired.sort_by(|a, b| {
            a.trigger_time
                .cmp(&b.trigger_time)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        expired
    }

    /// Live entries ordered by trigger time, after purging anything due.
    pub fn current_entries(&mut self, now: DateTime<Utc>) -> Vec<ReminderEntry> {
        self.purge_expired(now);
        let mut entries: Vec<ReminderEntry> = self
            .entries
            .values()
            .map(|tracked| tracked.entry.clone())
            .collect();
        entries.sort_by(|a, b| {
            a.trigger_time
                .cmp(&b.trigger_time)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        entries
    }

    /// Identifier to trigger time mapping of the live entries.
    pub fn desired(&mut self, now: DateTime<Utc>) -> BTreeMap<String, DateTime<Utc>> {
        self.purge_expired(now);
        self.snapshot()
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.entries
            .iter()
            .map(|(id, tracked)| (id.clone(), tracked.entry.trigger_time))
            .collect()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&ReminderEntry> {
        self.entries.get(identifier).map(|tracked| &tracked.entry)
    }

    pub fn remove(&mut self, identifier: &str) -> Option<ReminderEntry> {
        self.entries.remove(identifier).map(|tracked| tracked.entry)
    }

    pub fn state(&self, identifier: &str) -> Option<ReminderState> {
        self.entries.get(identifier).map(|tracked| tracked.state)
    }

    pub fn mark_scheduled(&mut self, identifier: &str) {
        if let Some(tracked) = self.entries.get_mut(identifier) {
            tracked.state = ReminderState::Scheduled;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 7, 12, 0, 0).unwrap()
    }

    fn entry(id: &str, offset_minutes: i64) -> ReminderEntry {
        ReminderEntry::new(
            id,
            now() + Duration::minutes(offset_minutes),
            NotificationContent::new("Mealtime Reminder", "It's time to eat now!"),
        )
    }

    #[test]
    fn replaces_entry_with_same_identifier() {
        let mut tracker = ReminderTracker::new();
        assert!(tracker.add_or_update(entry("c1", 30), now()).unwrap().is_none());
        let previous = tracker
            .add_or_update(entry("c1", 45), now())
            .unwrap()
            .expect("previous entry returned");
        assert_eq!(previous.trigger_time, now() + Duration::minutes(30));
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get("c1").map(|e| e.trigger_time),
            Some(now() + Duration::minutes(45))
        );
    }

    #[test]
    fn rejects_trigger_not_in_future() {
        let mut tracker = ReminderTracker::new();
        let err = tracker.add_or_update(entry("c1", 0), now()).unwrap_err();
        assert!(matches!(err, ReminderError::InvalidEntry { ref identifier, .. } if identifier == "c1"));
        assert!(tracker.add_or_update(entry("c2", -1), now()).is_err());
        assert!(tracker.is_empty());
    }

    #[test]
    fn rejects_blank_identifier() {
        let mut tracker = ReminderTracker::new();
        assert!(tracker.add_or_update(entry("  ", 10), now()).is_err());
        assert!(tracker.is_empty());
    }

    #[test]
    fn rejected_update_keeps_existing_entry() {
        let mut tracker = ReminderTracker::new();
        tracker.add_or_update(entry("c1", 10), now()).unwrap();
        assert!(tracker.add_or_update(entry("c1", -10), now()).is_err());
        assert_eq!(
            tracker.get("c1").map(|e| e.trigger_time),
            Some(now() + Duration::minutes(10))
        );
    }

    #[test]
    fn purge_leaves_only_future_entries() {
        let mut tracker = ReminderTracker::new();
        tracker.add_or_update(entry("a", 5), now()).unwrap();
        tracker.add_or_update(entry("b", 10), now()).unwrap();
        tracker.add_or_update(entry("c", 20), now()).unwrap();

        let later = now() + Duration::minutes(10);
        let expired = tracker.purge_expired(later);
        let ids: Vec<&str> = expired.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(tracker
            .current_entries(later)
            .iter()
            .all(|e| e.trigger_time > later));
        assert!(tracker.contains("c"));
    }

    #[test]
    fn current_entries_are_time_ordered() {
        let mut tracker = ReminderTracker::new();
        tracker.add_or_update(entry("late", 40), now()).unwrap();
        tracker.add_or_update(entry("early", 5), now()).unwrap();
        let ids: Vec<String> = tracker
            .current_entries(now())
            .into_iter()
            .map(|e| e.identifier)
            .collect();
        assert_eq!(ids, vec!["early".to_string(), "late".to_string()]);
    }

    #[test]
    fn tracks_lifecycle_state() {
        let mut tracker = ReminderTracker::new();
        tracker.add_or_update(entry("c1", 5), now()).unwrap();
        assert_eq!(tracker.state("c1"), Some(ReminderState::Pending));
        tracker.mark_scheduled("c1");
        assert_eq!(tracker.state("c1"), Some(ReminderState::Scheduled));
        tracker.add_or_update(entry("c1", 6), now()).unwrap();
        assert_eq!(tracker.state("c1"), Some(ReminderState::Pending));
        assert!(tracker.remove("c1").is_some());
        assert_eq!(tracker.state("c1"), None);
    }
}
