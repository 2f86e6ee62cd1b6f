use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reminder_core::{
    alerts::{BolusActivationType, PumpFailure},
    memory::InMemoryNotificationCenter,
    NotificationCategory, PendingNotification, ReminderService,
};
use reminder_sync::{CarbEntry, CarbStoreSync};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AlertSettings, AppConfig};

/// One line of driver input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReminderEvent {
    CarbEntry(CarbEntry),
    CarbDeleted {
        sync_identifier: String,
    },
    CarbSnapshot {
        entries: Vec<CarbEntry>,
    },
    MissedMeal {
        meal_start: DateTime<Utc>,
        grams: f64,
        #[serde(default)]
        delay_minutes: Option<i64>,
    },
    BolusFailure {
        #[serde(default)]
        failure: PumpFailure,
        units: f64,
        start: DateTime<Utc>,
        activation: BolusActivationType,
    },
    RemoteCommandExpired {
        expired_seconds: i64,
    },
    RemoteBolus {
        amount: f64,
        #[serde(default)]
        error: Option<String>,
    },
    RemoteCarbs {
        grams: f64,
        #[serde(default)]
        error: Option<String>,
    },
    Sweep {
        category: NotificationCategory,
    },
    /// Moves the driver clock forward, firing every notification that is due.
    Advance {
        to: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueState {
    pub now: DateTime<Utc>,
    pub pending: Vec<PendingNotification>,
    pub delivered: Vec<PendingNotification>,
}

/// Drives a [`ReminderService`] backed by the in-memory queue from a stream
/// of upstream events.
pub struct ReminderApp {
    service: ReminderService,
    center: Arc<InMemoryNotificationCenter>,
    sync: CarbStoreSync,
    settings: AlertSettings,
    now: DateTime<Utc>,
}

impl ReminderApp {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let center = Arc::new(InMemoryNotificationCenter::new());
        let service = ReminderService::builder()
            .with_notification_center(Box::new(Arc::clone(&center)))
            .build()?;
        match service.authorize(config.settings.critical_alerts_enabled) {
            Ok(status) => debug!(?status, "notifications authorized"),
            Err(err) => warn!(%err, "notifications are not authorized"),
        }
        Ok(Self {
            service,
            center,
            sync: CarbStoreSync::new(),
            settings: config.settings,
            now: config.start_time.unwrap_or_else(Utc::now),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn handle(&mut self, event: ReminderEvent) -> Result<()> {
        match event {
            ReminderEvent::CarbEntry(mut entry) => {
                if entry.mealtime_reminder && !self.settings.mealtime_reminder_notifications_enabled {
                    debug!("mealtime reminders disabled; not scheduling");
                    entry.mealtime_reminder = false;
                }
                self.sync.record_upsert(entry);
            }
            ReminderEvent::CarbDeleted { sync_identifier } => {
                self.sync.record_delete(&sync_identifier);
            }
            ReminderEvent::CarbSnapshot { mut entries } => {
                if !self.settings.mealtime_reminder_notifications_enabled {
                    for entry in &mut entries {
                        entry.mealtime_reminder = false;
                    }
                }
                self.sync.record_snapshot(entries);
            }
            ReminderEvent::MissedMeal {
                meal_start,
                grams,
                delay_minutes,
            } => {
                if !self.settings.missed_meal_notifications_enabled {
                    debug!("missed meal notifications disabled");
                    return Ok(());
                }
                self.service.send_missed_meal(
                    meal_start,
                    grams,
                    delay_minutes.map(Duration::minutes),
                    self.now,
                )?;
            }
            ReminderEvent::BolusFailure {
                failure,
                units,
                start,
                activation,
            } => {
                self.service
                    .send_bolus_failure(&failure, units, start, activation, self.now);
            }
            ReminderEvent::RemoteCommandExpired { expired_seconds } => {
                self.service
                    .send_remote_command_expired(Duration::seconds(expired_seconds));
            }
            ReminderEvent::RemoteBolus { amount, error } => match error {
                Some(error) => {
                    self.service.send_remote_bolus_failure(&error, amount);
                }
                None => {
                    self.service.send_remote_bolus(amount);
                }
            },
            ReminderEvent::RemoteCarbs { grams, error } => match error {
                Some(error) => {
                    self.service.send_remote_carbs_failure(&error, grams);
                }
                None => {
                    self.service.send_remote_carbs(grams);
                }
            },
            ReminderEvent::Sweep { category } => {
                self.service.remove_expired_at(category, self.now);
            }
            ReminderEvent::Advance { to } => {
                if to > self.now {
                    self.now = to;
                }
                let fired = self.center.advance_to(self.now);
                if !fired.is_empty() {
                    info!(?fired, "notifications fired");
                }
            }
        }
        for report in self.sync.drain(&self.service, self.now)? {
            if !report.rejected.is_empty() {
                warn!(rejected = ?report.rejected, "carb entries rejected");
            }
        }
        Ok(())
    }

    pub fn queue_state(&self) -> QueueState {
        QueueState {
            now: self.now,
            pending: self.center.pending_snapshot(),
            delivered: self.center.delivered_snapshot(),
        }
    }
}

/// Applies JSON-line events from `reader`. Blank lines and `#` comments are
/// skipped.
pub fn apply_events(app: &mut ReminderApp, reader: impl BufRead) -> Result<usize> {
    let mut applied = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event: ReminderEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid event on line {}", idx + 1))?;
        if let Err(err) = app.handle(event) {
            warn!(line = idx + 1, %err, "event rejected");
            continue;
        }
        applied += 1;
    }
    Ok(applied)
}

pub fn run(config: AppConfig) -> Result<()> {
    let mut app = ReminderApp::new(&config)?;
    let applied = match &config.events_path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open events file {}", path.display()))?;
            apply_events(&mut app, BufReader::new(file))?
        }
        None => apply_events(&mut app, io::stdin().lock())?,
    };
    info!(applied, "events applied");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &app.queue_state())?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 7, 12, 0, 0).unwrap()
    }

    fn app(settings: AlertSettings) -> ReminderApp {
        ReminderApp::new(&AppConfig {
            settings,
            start_time: Some(start()),
            ..AppConfig::default()
        })
        .unwrap()
    }

    fn enabled() -> AlertSettings {
        AlertSettings {
            missed_meal_notifications_enabled: true,
            mealtime_reminder_notifications_enabled: true,
            critical_alerts_enabled: false,
        }
    }

    #[test]
    fn applies_event_stream() {
        let mut app = app(enabled());
        let input = r#"
# two carb entries with reminders, one later deleted
{"event":"carb_entry","sync_identifier":"c1","start_date":"2025-11-07T12:30:00Z","grams":40,"mealtime_reminder":true}
{"event":"carb_entry","sync_identifier":"c2","start_date":"2025-11-07T12:05:00Z","grams":20,"mealtime_reminder":true}
{"event":"carb_deleted","sync_identifier":"c2"}
{"event":"missed_meal","meal_start":"2025-11-07T11:00:00Z","grams":35}
{"event":"missed_meal","meal_start":"2025-11-07T11:40:00Z","grams":50}
"#;
        let applied = apply_events(&mut app, Cursor::new(input)).unwrap();
        assert_eq!(applied, 5);

        let state = app.queue_state();
        let pending: Vec<&str> = state.pending.iter().map(|n| n.identifier.as_str()).collect();
        assert_eq!(pending, vec!["c1"]);
        let missed: Vec<_> = state
            .delivered
            .iter()
            .filter(|n| n.category == NotificationCategory::MissedMeal)
            .collect();
        assert_eq!(missed.len(), 1);
    }

    #[test]
    fn disabled_toggles_suppress_reminders() {
        let mut app = app(AlertSettings::default());
        let input = r#"{"event":"carb_entry","sync_identifier":"c1","start_date":"2025-11-07T12:30:00Z","grams":40,"mealtime_reminder":true}
{"event":"missed_meal","meal_start":"2025-11-07T11:00:00Z","grams":35}"#;
        apply_events(&mut app, Cursor::new(input)).unwrap();
        let state = app.queue_state();
        assert!(state.pending.is_empty());
        assert!(state.delivered.is_empty());
    }

    #[test]
    fn advance_fires_and_sweep_clears_stale_reminders() {
        let mut app = app(enabled());
        let input = r#"{"event":"carb_entry","sync_identifier":"c1","start_date":"2025-11-07T12:30:00Z","grams":40,"mealtime_reminder":true}
{"event":"advance","to":"2025-11-07T12:31:00Z"}
{"event":"sweep","category":"mealtimeReminder"}"#;
        apply_events(&mut app, Cursor::new(input)).unwrap();
        assert_eq!(app.queue_state().delivered.len(), 1);

        app.handle(ReminderEvent::Advance {
            to: start() + Duration::minutes(40),
        })
        .unwrap();
        app.handle(ReminderEvent::Sweep {
            category: NotificationCategory::MealtimeReminder,
        })
        .unwrap();
        assert!(app.queue_state().delivered.is_empty());
    }

    #[test]
    fn malformed_line_is_reported() {
        let mut app = app(enabled());
        let err = apply_events(&mut app, Cursor::new("{\"event\":\"lunch\"}")).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
