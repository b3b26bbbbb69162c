//! Approval workflow for pending events.
//!
//! Events stamped [`EventStatus::Pending`] at commit time sit in the stream
//! without affecting the visible projection until a reviewer approves or
//! rejects them here. Both outcomes are terminal: once an event leaves
//! `Pending` its status never changes again.

use crate::dispatch::Publisher;
use crate::errors::{CommandResult, EventStoreError, ValidationError};
use crate::event::{EventStatus, ProjectEvent};
use crate::notification::NotificationSink;
use crate::store::EventStore;
use crate::types::EventId;
use std::sync::Arc;

/// Reviews pending events and records the verdict.
pub struct EventService<S> {
    store: Arc<S>,
    publisher: Arc<dyn Publisher>,
    notifications: Option<Arc<dyn NotificationSink>>,
}

impl<S> EventService<S>
where
    S: EventStore,
{
    /// Creates a service over the given store and publisher.
    pub fn new(store: Arc<S>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            store,
            publisher,
            notifications: None,
        }
    }

    /// Attaches a notification sink so approval-request notifications are
    /// marked read when their event is decided.
    #[must_use]
    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }

    /// Looks up a single event by id, regardless of status.
    pub async fn get_event(&self, event_id: &EventId) -> CommandResult<ProjectEvent> {
        Ok(self.store.get_event(event_id).await?)
    }

    /// Approves a pending event, making it visible to the projection.
    ///
    /// Readers folding the stream after this point see the event applied at
    /// its original position, so approval is retroactive.
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn approve(&self, event_id: &EventId) -> CommandResult<ProjectEvent> {
        self.decide(event_id, EventStatus::Approved).await
    }

    /// Rejects a pending event. The event keeps its stream slot and its
    /// contribution to the version but is never applied.
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn reject(&self, event_id: &EventId) -> CommandResult<ProjectEvent> {
        self.decide(event_id, EventStatus::Rejected).await
    }

    async fn decide(&self, event_id: &EventId, verdict: EventStatus) -> CommandResult<ProjectEvent> {
        // The pending check and the write are one compare-and-swap in the
        // store, so racing verdicts cannot both transition the event.
        let updated = match self
            .store
            .set_status(event_id, EventStatus::Pending, verdict)
            .await
        {
            Ok(updated) => updated,
            Err(EventStoreError::StatusConflict { actual, .. }) => {
                return Err(ValidationError::InvalidStatusTransition {
                    from: actual,
                    to: verdict,
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        };

        // Everything after the status write is best effort: the verdict is
        // durable and must be reported even if follow-up plumbing fails.
        if let Some(sink) = &self.notifications {
            if let Err(error) = sink.mark_read_for_event(event_id).await {
                tracing::warn!(event_id = %event_id, %error, "marking approval notifications read failed");
            }
        }
        if let Err(error) = self.publisher.publish_status_changed(&updated).await {
            tracing::warn!(event_id = %event_id, %error, "publishing status change failed");
        }
        // General publish as well, so policies see the now-visible change.
        if let Err(error) = self.publisher.publish(std::slice::from_ref(&updated)).await {
            tracing::warn!(event_id = %event_id, %error, "publishing decided event failed");
        }

        Ok(updated)
    }
}
