pub mod alerts;
pub mod category;
pub mod error;
pub mod memory;
pub mod notifications;
pub mod service;
pub mod tracker;

pub use crate::category::{IdentifierPolicy, NotificationCategory};
pub use crate::error::{DeliveryError, ReminderError};
pub use crate::notifications::{NotificationCenter, NotificationContent, PendingNotification};
pub use crate::service::{ReconcileReport, ReminderService, ReminderServiceBuilder};
pub use crate::tracker::{ReminderEntry, ReminderState, ReminderTracker};
