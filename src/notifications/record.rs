use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A displayed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub action_label: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Input to `NotificationStore::add`. The store assigns the id and read flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub category: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub action_label: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl NewNotification {
    pub fn new(category: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            title: title.into(),
            body: body.into(),
            link: None,
            action_label: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>, action_label: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self.action_label = Some(action_label.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    pub(crate) fn into_record(self, id: String) -> Notification {
        Notification {
            id,
            category: self.category,
            title: self.title,
            body: self.body,
            link: self.link,
            action_label: self.action_label,
            occurred_at: self.occurred_at,
            is_read: false,
        }
    }
}

/// Point-in-time view of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}
