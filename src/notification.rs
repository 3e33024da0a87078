use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Principal;

/// Backend-delivered notification. The payload is polymorphic per kind and is
/// modeled as a tagged union so rendering stays exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient: Principal,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    Comment {
        author: Principal,
        post_id: String,
    },
    ConnectionRequest {
        from: Principal,
    },
}

impl NotificationPayload {
    /// The actor the notification is about.
    pub fn actor(&self) -> &Principal {
        match self {
            Self::Comment { author, .. } => author,
            Self::ConnectionRequest { from } => from,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Comment { author, post_id } => {
                format!("{author} commented on post {post_id}")
            }
            Self::ConnectionRequest { from } => {
                format!("{from} sent you a connection request")
            }
        }
    }
}

pub fn unread_count(items: &[Notification]) -> usize {
    items.iter().filter(|n| !n.is_read).count()
}
