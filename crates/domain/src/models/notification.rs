use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Default lifetime of a transient notification.
pub const DEFAULT_NOTIFICATION_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// 0 means the notification stays until dismissed.
    pub duration_ms: u64,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        message: impl Into<String>,
        title: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title,
            message: message.into(),
            created_at: Utc::now(),
            duration_ms,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.duration_ms == 0
    }
}
