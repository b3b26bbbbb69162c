//! Error types for the Cairn core.
//!
//! The taxonomy follows the command pipeline's needs:
//!
//! - **`CommandError`**: what callers of the executor and event service see.
//!   `NotFound`, `ConcurrencyConflict` and `Validation` propagate unwrapped so
//!   the edge layer can map them to appropriate responses. A concurrency
//!   conflict is always safe to retry by reloading and re-deciding.
//! - **`EventStoreError`**: persistence-layer failures, with a distinguished
//!   `VersionConflict` variant for optimistic-concurrency rejections.
//! - **`PolicyError`** / **`DispatchError`**: side-effect failures. These are
//!   logged inside the dispatcher and never reach the command's outcome.

use crate::event::{EventKind, EventStatus};
use crate::types::{EventId, EventVersion, ProjectId};
use thiserror::Error;

/// Errors surfaced to command and workflow callers.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The project aggregate has no event stream.
    #[error("project '{0}' not found")]
    NotFound(ProjectId),

    /// The referenced event does not exist.
    #[error("event '{0}' not found")]
    EventNotFound(EventId),

    /// Optimistic concurrency control detected a conflicting write.
    ///
    /// The caller decides whether to retry with fresh state; the executor
    /// never retries on its own because decisions may carry side effects.
    #[error("concurrency conflict on project '{project_id}'")]
    ConcurrencyConflict {
        /// The project whose stream moved underneath the command.
        project_id: ProjectId,
    },

    /// The command or transition was rejected before any write happened.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A persistence failure other than a version conflict.
    #[error("event store error: {0}")]
    EventStore(EventStoreError),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Rejections raised before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The event kind is not present in the type registry.
    #[error("unknown event kind '{0}'")]
    UnknownEventKind(EventKind),

    /// The registry's `is_allowed` check refused the event for this caller.
    #[error("event kind '{kind}' is not allowed for this caller")]
    NotAllowed {
        /// The refused event kind.
        kind: EventKind,
    },

    /// A status transition out of a terminal status was attempted.
    #[error("cannot transition event from {from} to {to}")]
    InvalidStatusTransition {
        /// The event's current status.
        from: EventStatus,
        /// The requested status.
        to: EventStatus,
    },

    /// Malformed command input.
    #[error("{0}")]
    Invalid(String),
}

/// Errors from the event store port.
#[derive(Debug, Clone, Error)]
pub enum EventStoreError {
    /// The stream has no events. Callers distinguish "no history" from a
    /// store failure through this variant.
    #[error("no events for project '{0}'")]
    StreamNotFound(ProjectId),

    /// No event with this id exists.
    #[error("event '{0}' not found")]
    EventNotFound(EventId),

    /// The stream's actual version differed from the expected version at
    /// commit time. Nothing was written.
    #[error(
        "version conflict on project '{project_id}': expected {expected}, but current is {current}"
    )]
    VersionConflict {
        /// The stream with the conflict.
        project_id: ProjectId,
        /// The version the append expected to find.
        expected: EventVersion,
        /// The actual current version.
        current: EventVersion,
    },

    /// The event's actual status differed from the expected status when a
    /// status update was attempted. Nothing was written.
    #[error(
        "status conflict on event '{event_id}': expected {expected}, but current is {actual}"
    )]
    StatusConflict {
        /// The event whose status moved underneath the caller.
        event_id: EventId,
        /// The status the update expected to find.
        expected: EventStatus,
        /// The actual current status.
        actual: EventStatus,
    },

    /// An event payload could not be serialized or deserialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The store backend is unreachable or failed.
    #[error("store failure: {0}")]
    StoreFailure(String),
}

/// Failures inside the policy evaluator.
///
/// These never propagate past the dispatcher; they exist so the evaluator's
/// internals can use `?` and the dispatcher can log one structured error.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy store could not be queried.
    #[error("policy lookup failed: {0}")]
    Lookup(String),

    /// Recipient resolution through the directory adapter failed.
    #[error("recipient resolution failed: {0}")]
    RecipientResolution(String),

    /// The notification sink rejected a delivery.
    #[error("notification delivery failed: {0}")]
    Notification(String),

    /// Flipping an event to pending for a request-approval action failed.
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

/// Error type for dispatcher handlers.
///
/// One handler failing is logged and must not stop the remaining handlers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Policy evaluation failed for this event.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// A cache refresh could not re-reduce from the store.
    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    /// Anything else a handler wants to report.
    #[error("{0}")]
    Other(String),
}

/// Type alias for command results.
pub type CommandResult<T> = Result<T, CommandError>;

/// Type alias for event store results.
pub type EventStoreResult<T> = Result<T, EventStoreError>;

impl From<EventStoreError> for CommandError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::VersionConflict { project_id, .. } => {
                Self::ConcurrencyConflict { project_id }
            }
            EventStoreError::StreamNotFound(project_id) => Self::NotFound(project_id),
            EventStoreError::EventNotFound(event_id) => Self::EventNotFound(event_id),
            other => Self::EventStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_id() -> ProjectId {
        ProjectId::try_new("project-1").unwrap()
    }

    #[test]
    fn version_conflict_converts_to_concurrency_conflict() {
        let err = EventStoreError::VersionConflict {
            project_id: project_id(),
            expected: EventVersion::new(3),
            current: EventVersion::new(4),
        };
        let command_err: CommandError = err.into();
        assert!(matches!(
            command_err,
            CommandError::ConcurrencyConflict { project_id } if project_id == self::project_id()
        ));
    }

    #[test]
    fn stream_not_found_converts_to_not_found() {
        let err = EventStoreError::StreamNotFound(project_id());
        let command_err: CommandError = err.into();
        assert!(matches!(command_err, CommandError::NotFound(_)));
    }

    #[test]
    fn other_store_errors_stay_wrapped() {
        let err = EventStoreError::StoreFailure("connection dropped".to_string());
        let command_err: CommandError = err.into();
        assert!(matches!(command_err, CommandError::EventStore(_)));
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = EventStoreError::VersionConflict {
            project_id: project_id(),
            expected: EventVersion::new(5),
            current: EventVersion::new(7),
        };
        assert_eq!(
            err.to_string(),
            "version conflict on project 'project-1': expected 5, but current is 7"
        );

        let err = CommandError::NotFound(project_id());
        assert_eq!(err.to_string(), "project 'project-1' not found");

        let event_id = EventId::new();
        let err = EventStoreError::StatusConflict {
            event_id,
            expected: EventStatus::Pending,
            actual: EventStatus::Approved,
        };
        assert_eq!(
            err.to_string(),
            format!("status conflict on event '{event_id}': expected pending, but current is approved")
        );
    }
}
