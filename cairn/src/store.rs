//! Event store port.
//!
//! The store persists an ordered, versioned log of events per project and is
//! the only mutable shared resource in the core. Concurrency correctness
//! comes from the version token checked at commit time, not from in-process
//! locking in the callers.

use crate::errors::EventStoreResult;
use crate::event::{EventStatus, ProjectEvent};
use crate::types::{EventId, EventVersion, ProjectId};
use async_trait::async_trait;

/// The event store contract implemented by persistence adapters.
///
/// Implementations must make `append` atomic: either all events are persisted
/// and the version advances by the number of events, or nothing is written.
/// The version check and the write must happen in one step (a unique
/// constraint or compare-and-swap), never as a separate read followed by a
/// write, so concurrent commands on the same aggregate cannot race past each
/// other.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Loads the full event stream for a project, oldest first, together
    /// with the stream's current version.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::StreamNotFound`](crate::errors::EventStoreError::StreamNotFound)
    /// when the project has no events, so callers can tell "no history" apart
    /// from a store failure.
    async fn load(
        &self,
        project_id: &ProjectId,
    ) -> EventStoreResult<(Vec<ProjectEvent>, EventVersion)>;

    /// Appends events to a project's stream at the expected version.
    ///
    /// All events commit as one atomic unit and share the single
    /// expected-version check. Returns the new stream version.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::VersionConflict`](crate::errors::EventStoreError::VersionConflict)
    /// when the stream's actual version differs from `expected_version` at
    /// commit time; in that case nothing was written.
    async fn append(
        &self,
        project_id: &ProjectId,
        expected_version: EventVersion,
        events: Vec<ProjectEvent>,
    ) -> EventStoreResult<EventVersion>;

    /// Looks up a single event by id.
    async fn get_event(&self, event_id: &EventId) -> EventStoreResult<ProjectEvent>;

    /// Updates an event's status and returns the updated event.
    ///
    /// Status is the only mutable field of a stored event. The check against
    /// `expected` and the write must happen in one step, like the version
    /// check on `append`, so two concurrent verdicts on the same event
    /// cannot both transition it.
    ///
    /// When the transition leaves `Pending` for a terminal status, the store
    /// stamps `decided_at` with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::StatusConflict`](crate::errors::EventStoreError::StatusConflict)
    /// when the event's actual status differs from `expected` at commit
    /// time; in that case nothing was written.
    async fn set_status(
        &self,
        event_id: &EventId,
        expected: EventStatus,
        status: EventStatus,
    ) -> EventStoreResult<ProjectEvent>;
}
