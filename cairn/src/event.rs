//! The event model: status workflow, kind discriminators, payloads, and the
//! stored envelope.
//!
//! Events are immutable facts about one project aggregate. The only field
//! that ever changes after an append is `status`, which moves
//! pending→{approved|rejected} exactly once through the event service.

use crate::types::{EventId, OrgNodeId, PersonId, ProductId, ProjectId, ProjectRoleId, Timestamp, UserId};
use chrono::NaiveDate;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Workflow status of an event.
///
/// Only `Approved` events are visible to the projection. A `Pending` event
/// occupies its slot in the stream (and advances the version) but has no
/// projected effect until an approver acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Awaiting an approval decision.
    Pending,
    /// Approved; folded into the projection.
    Approved,
    /// Rejected; never folded into the projection.
    Rejected,
}

impl EventStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// String discriminator for an event type.
///
/// Kinds are data, not code: policies list the kinds they apply to and the
/// type registry is keyed by kind, so new event types can be added without
/// touching the pipeline.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Deref, Display, Serialize,
        Deserialize
    )
)]
pub struct EventKind(String);

impl EventKind {
    /// Builds a kind from a compile-time constant discriminator.
    ///
    /// Only for the crate's own well-formed constants; external input goes
    /// through `try_new`.
    fn well_known(kind: &'static str) -> Self {
        Self::try_new(kind).expect("well-known event kinds are valid")
    }
}

/// Type-specific payload of a project event.
///
/// The serialized form carries the kind as a `type` tag so any backend that
/// round-trips the discriminator and fields is acceptable. `Other` carries
/// the raw payload of a kind this build does not know; the reducer ignores
/// it, which keeps old readers working when new event types appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectEventPayload {
    /// The project came into existence. Always the first event of a stream.
    ProjectStarted {
        /// Project title.
        title: String,
        /// Optional free-text description.
        description: Option<String>,
        /// Planned start date.
        start_date: Option<NaiveDate>,
        /// Planned end date.
        end_date: Option<NaiveDate>,
        /// Organisation node that owns the project.
        org_node: Option<OrgNodeId>,
    },
    /// Title, description or date range changed. Only `Some` fields apply.
    ProjectDetailsUpdated {
        /// New title, if changed.
        title: Option<String>,
        /// New description, if changed.
        description: Option<String>,
        /// New start date, if changed.
        start_date: Option<NaiveDate>,
        /// New end date, if changed.
        end_date: Option<NaiveDate>,
    },
    /// A person was assigned a project role.
    MemberAdded {
        /// The person joining the project.
        person_id: PersonId,
        /// The role they hold.
        role_id: ProjectRoleId,
    },
    /// A person's project membership ended.
    MemberRemoved {
        /// The person leaving the project.
        person_id: PersonId,
    },
    /// A research product was linked to the project.
    ProductAdded {
        /// The linked product.
        product_id: ProductId,
    },
    /// A research product link was removed.
    ProductRemoved {
        /// The unlinked product.
        product_id: ProductId,
    },
    /// An organisation was affiliated with the project.
    AffiliatedOrganisationAdded {
        /// The affiliated organisation node.
        org_node: OrgNodeId,
    },
    /// An organisation affiliation was removed.
    AffiliatedOrganisationRemoved {
        /// The organisation node no longer affiliated.
        org_node: OrgNodeId,
    },
    /// The project moved to a different owning organisation node.
    OwnerOrganisationMoved {
        /// The new owning node.
        org_node: OrgNodeId,
    },
    /// A custom field was written.
    CustomFieldSet {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A custom field was removed.
    CustomFieldCleared {
        /// Field name.
        name: String,
    },
    /// An event kind this build does not know. Ignored by the reducer.
    Other {
        /// The original discriminator.
        kind: EventKind,
        /// The raw payload as stored.
        data: Value,
    },
}

impl ProjectEventPayload {
    /// The kind discriminator for this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ProjectStarted { .. } => EventKind::well_known("project_started"),
            Self::ProjectDetailsUpdated { .. } => EventKind::well_known("project_details_updated"),
            Self::MemberAdded { .. } => EventKind::well_known("member_added"),
            Self::MemberRemoved { .. } => EventKind::well_known("member_removed"),
            Self::ProductAdded { .. } => EventKind::well_known("product_added"),
            Self::ProductRemoved { .. } => EventKind::well_known("product_removed"),
            Self::AffiliatedOrganisationAdded { .. } => {
                EventKind::well_known("affiliated_organisation_added")
            }
            Self::AffiliatedOrganisationRemoved { .. } => {
                EventKind::well_known("affiliated_organisation_removed")
            }
            Self::OwnerOrganisationMoved { .. } => {
                EventKind::well_known("owner_organisation_moved")
            }
            Self::CustomFieldSet { .. } => EventKind::well_known("custom_field_set"),
            Self::CustomFieldCleared { .. } => EventKind::well_known("custom_field_cleared"),
            Self::Other { kind, .. } => kind.clone(),
        }
    }
}

/// A stored event: one immutable fact about one project aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEvent {
    /// Unique identifier (UUIDv7).
    pub id: EventId,
    /// The aggregate this event belongs to.
    pub project_id: ProjectId,
    /// Workflow status. The only mutable field.
    pub status: EventStatus,
    /// The user who created the event.
    pub created_by: UserId,
    /// When the event was created.
    pub created_at: Timestamp,
    /// When the event left `Pending`, if it ever did.
    ///
    /// Stamped by the store on the pending-to-terminal transition. An event
    /// that carries a verdict here is never held for approval again, even if
    /// a request-approval policy re-matches it on a later publish.
    #[serde(default)]
    pub decided_at: Option<Timestamp>,
    /// Type-specific payload.
    pub payload: ProjectEventPayload,
}

impl ProjectEvent {
    /// Creates a new event envelope with a fresh id and the current time.
    pub fn new(
        project_id: ProjectId,
        status: EventStatus,
        created_by: UserId,
        payload: ProjectEventPayload,
    ) -> Self {
        Self {
            id: EventId::new(),
            project_id,
            status,
            created_by,
            created_at: Timestamp::now(),
            decided_at: None,
            payload,
        }
    }

    /// The kind discriminator of this event's payload.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
