use serde::Serialize;

use crate::notifications::{Notification, NotificationSnapshot};

/// Counts above this render as `"9+"`.
pub const BADGE_CAP: usize = 9;

/// Badge text for an unread count; `None` hides the badge.
pub fn badge_label(unread: usize) -> Option<String> {
    match unread {
        0 => None,
        n if n > BADGE_CAP => Some(format!("{BADGE_CAP}+")),
        n => Some(n.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BellView {
    pub badge: Option<String>,
    pub unread_count: usize,
    pub notifications: Vec<Notification>,
}

impl BellView {
    pub fn from_snapshot(snapshot: &NotificationSnapshot) -> Self {
        Self {
            badge: badge_label(snapshot.unread_count),
            unread_count: snapshot.unread_count,
            notifications: snapshot.notifications.clone(),
        }
    }

    pub fn has_unread(&self) -> bool {
        self.unread_count > 0
    }
}
