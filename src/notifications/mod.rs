//! Per-session notification store and the templates that feed it.

mod record;
mod store;
pub mod templates;

pub use record::{NewNotification, Notification, NotificationSnapshot};
pub use store::{InitOutcome, NotificationStore, NOTIFICATION_EVENTS};
