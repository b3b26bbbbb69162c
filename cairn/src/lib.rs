//! Event-sourced project aggregates for research administration backends.
//!
//! Cairn keeps each project as an append-only stream of events and derives
//! the current state by folding the stream. Writes go through a command
//! pipeline (load, decide, append, re-apply, publish) with optimistic
//! concurrency on the stream version. Events carry an approval status;
//! pending and rejected events hold their place in the stream but stay
//! invisible to readers until approved.
//!
//! # Architecture
//!
//! - [`store::EventStore`] is the persistence port: ordered load plus atomic
//!   compare-and-swap append.
//! - [`projection::Project`] reduces a stream to state, skipping events that
//!   are not approved.
//! - [`executor::CommandExecutor`] runs decisions and commits their events
//!   as one atomic unit.
//! - [`service::EventService`] owns the pending/approved/rejected workflow.
//! - [`policy::PolicyEvaluator`] matches committed events against configured
//!   rules and fans out notifications and approval requests.
//! - [`dispatch::EventDispatcher`] routes committed events to handlers,
//!   best effort, so side effects never fail a write.
//! - [`cache::ProjectLoader`] serves reads through an optional cache; the
//!   store plus reducer stay the only source of truth.
//! - [`hydrate::Hydrator`] resolves referenced entity ids into names for
//!   presentation.
//!
//! Persistence, org structure, user directories and notification delivery
//! are ports implemented by the host application; the `cairn-memory` crate
//! provides in-memory adapters for tests and prototyping.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod dispatch;
pub mod errors;
pub mod event;
pub mod executor;
pub mod hydrate;
pub mod notification;
pub mod policy;
pub mod projection;
pub mod registry;
pub mod service;
pub mod store;
pub mod types;

pub use cache::{ProjectCache, ProjectLoader};
pub use dispatch::{CacheRefresher, EventDispatcher, EventHandler, Publisher, StatusChangeHandler};
pub use errors::{
    CommandError, CommandResult, DispatchError, EventStoreError, EventStoreResult, PolicyError,
    ValidationError,
};
pub use event::{EventKind, EventStatus, ProjectEvent, ProjectEventPayload};
pub use executor::CommandExecutor;
pub use hydrate::{EntityDirectory, HydratedEvent, Hydrator};
pub use notification::{Notification, NotificationSink};
pub use policy::{
    Condition, ConditionOperator, DynamicGroup, EventPolicy, OrgDirectory, PolicyAction,
    PolicyEvaluator, PolicyStore, RecipientDirectory, RecipientSpec,
};
pub use projection::{Project, ProjectMember};
pub use registry::{CommandContext, Decider, EventTypeMeta, EventTypeRegistry};
pub use service::EventService;
pub use store::EventStore;
pub use types::{
    EventId, EventVersion, OrgNodeId, OrgRoleId, PersonId, ProductId, ProjectId, ProjectRoleId,
    Timestamp, UserId,
};
