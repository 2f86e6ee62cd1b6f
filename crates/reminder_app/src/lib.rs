pub mod app;
pub mod config;

pub use app::{apply_events, run, ReminderApp, ReminderEvent};
pub use config::{AlertSettings, AppConfig};
