//! Notification records and the delivery port.

use crate::types::{EventId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A delivery record for one recipient.
///
/// Created by the policy evaluator; mutated only to flip `read` when the
/// recipient has seen it (or when the triggering event leaves the pending
/// state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: Uuid,
    /// The recipient.
    pub user_id: UserId,
    /// The event this notification is about, when there is one.
    pub source_event: Option<EventId>,
    /// Rendered message text.
    pub message: String,
    /// Whether the recipient has seen it.
    pub read: bool,
    /// When it was sent.
    pub sent_at: Timestamp,
}

impl Notification {
    /// Creates an unread notification sent now.
    pub fn new(user_id: UserId, source_event: Option<EventId>, message: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            source_event,
            message,
            read: false,
            sent_at: Timestamp::now(),
        }
    }
}

/// Delivery port implemented by the notification collaborator.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification. Errors surface to the policy evaluator,
    /// where they are logged and swallowed by the dispatcher.
    async fn notify(&self, notification: Notification) -> Result<(), String>;

    /// Marks every notification referencing the given event as read.
    ///
    /// Used when an approval request is resolved so stale approval prompts
    /// disappear from inboxes.
    async fn mark_read_for_event(&self, event_id: &EventId) -> Result<(), String>;
}
