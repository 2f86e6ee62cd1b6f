use std::collections::{HashSet, VecDeque};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use reminder_core::{NotificationCategory, ReconcileReport, ReminderError, ReminderService};

/// Carb store record as seen by the reminder layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarbEntry {
    pub sync_identifier: Option<String>,
    pub start_date: DateTime<Utc>,
    pub grams: f64,
    /// Set when the user asked to be reminded at `start_date`.
    #[serde(default)]
    pub mealtime_reminder: bool,
}

impl CarbEntry {
    fn identifier(&self) -> Result<&str, ReminderError> {
        self.sync_identifier
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ReminderError::invalid_entry("", "carb entry has no sync identifier"))
    }
}

/// Upstream change pushed into the reminder layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncJob {
    Upsert(CarbEntry),
    Delete(String),
    /// Full carb store contents; anything tracked but absent is dropped.
    Snapshot(Vec<CarbEntry>),
    Sweep,
}

/// Queue of carb store changes waiting to be applied to a [`ReminderService`].
///
/// The carb store pushes changes here as they happen; nothing is polled.
#[derive(Debug, Default)]
pub struct CarbStoreSync {
    pending_jobs: VecDeque<SyncJob>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub scheduled: Vec<String>,
    pub removed: Vec<String>,
    pub rejected: Vec<String>,
    pub reconcile: ReconcileReport,
}

impl SyncReport {
    fn absorb(&mut self, report: ReconcileReport) {
        self.reconcile.expired.extend(report.expired);
        self.reconcile.cancelled.extend(report.cancelled);
        self.reconcile.removed_delivered.extend(report.removed_delivered);
        self.reconcile.sent.extend(report.sent);
        self.reconcile.replaced |= report.replaced;
        self.reconcile.failures.extend(report.failures);
    }
}

impl CarbStoreSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_upsert(&mut self, entry: CarbEntry) {
        self.pending_jobs.push_back(SyncJob::Upsert(entry));
    }

    pub fn record_delete(&mut self, sync_identifier: &str) {
        self.pending_jobs
            .push_back(SyncJob::Delete(sync_identifier.to_string()));
    }

    pub fn record_snapshot(&mut self, entries: Vec<CarbEntry>) {
        self.pending_jobs.push_back(SyncJob::Snapshot(entries));
    }

    pub fn schedule_sweep(&mut self) {
        self.pending_jobs.push_back(SyncJob::Sweep);
    }

    pub fn dequeue_job(&mut self) -> Option<SyncJob> {
        self.pending_jobs.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_jobs.len()
    }

    /// Applies every queued job in order.
    pub fn drain(&mut self, service: &ReminderService, now: DateTime<Utc>) -> Result<Vec<SyncReport>> {
        let mut reports = Vec::new();
        while let Some(job) = self.dequeue_job() {
            reports.push(self.perform_job(job, service, now)?);
        }
        Ok(reports)
    }

    #[instrument(skip(self, service))]
    pub fn perform_job(
        &mut self,
        job: SyncJob,
        service: &ReminderService,
        now: DateTime<Utc>,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        match job {
            SyncJob::Upsert(entry) => {
                apply_upsert(service, &entry, now, &mut report)
                    .context("failed to apply carb entry change")?;
            }
            SyncJob::Delete(id) => {
                report.absorb(service.remove_entry(NotificationCategory::MealtimeReminder, &id));
                report.removed.push(id);
            }
            SyncJob::Snapshot(entries) => {
                let live: HashSet<&str> = entries
                    .iter()
                    .filter(|entry| entry.mealtime_reminder)
                    .filter_map(|entry| entry.sync_identifier.as_deref())
                    .collect();
                for tracked in
                    service.current_entries(NotificationCategory::MealtimeReminder, now)
                {
                    if !live.contains(tracked.identifier.as_str()) {
                        report.absorb(service.remove_entry(
                            NotificationCategory::MealtimeReminder,
                            &tracked.identifier,
                        ));
                        report.removed.push(tracked.identifier);
                    }
                }
                for entry in entries.iter().filter(|entry| entry.mealtime_reminder) {
                    if let Err(err) = apply_upsert(service, entry, now, &mut report) {
                        tracing::warn!(%err, "skipping carb entry from snapshot");
                        report
                            .rejected
                            .push(entry.sync_identifier.clone().unwrap_or_default());
                    }
                }
            }
            SyncJob::Sweep => {
                report.absorb(service.remove_expired_at(NotificationCategory::MealtimeReminder, now));
            }
        }
        Ok(report)
    }
}

fn apply_upsert(
    service: &ReminderService,
    entry: &CarbEntry,
    now: DateTime<Utc>,
    report: &mut SyncReport,
) -> Result<(), ReminderError> {
    let id = entry.identifier()?;
    let category = NotificationCategory::MealtimeReminder;
    if !entry.mealtime_reminder {
        if service.contains(category, id) {
            report.absorb(service.remove_entry(category, id));
            report.removed.push(id.to_string());
        }
        return Ok(());
    }
    if entry.start_date <= now {
        // reminder time already passed; treat like a cleared flag
        if service.contains(category, id) {
            report.absorb(service.remove_entry(category, id));
            report.removed.push(id.to_string());
        }
        return Ok(());
    }
    report.absorb(service.schedule_mealtime_reminder(id, entry.start_date, now)?);
    report.scheduled.push(id.to_string());
    Ok(())
}
