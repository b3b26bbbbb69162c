//! The project projection: folding an event stream into current state.
//!
//! `reduce` is a pure, deterministic function of the event list. It is the
//! source of truth for project state; the cache in front of it is only an
//! optimization.

use crate::event::{EventStatus, ProjectEvent, ProjectEventPayload};
use crate::types::{EventVersion, OrgNodeId, PersonId, ProductId, ProjectId, ProjectRoleId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One person's current role assignment on a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMember {
    /// The person holding the role.
    pub person_id: PersonId,
    /// The project role they hold.
    pub role_id: ProjectRoleId,
}

/// Current state of one project aggregate, derived from its event stream.
///
/// Never stored directly: recomputed on demand from the full stream, or
/// served from cache when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Aggregate identity.
    pub id: ProjectId,
    /// Stream version this state was reduced at. Counts every event,
    /// including pending and rejected ones.
    pub version: EventVersion,
    /// Project title.
    pub title: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Planned start date.
    pub start_date: Option<NaiveDate>,
    /// Planned end date.
    pub end_date: Option<NaiveDate>,
    /// Current members with their roles.
    pub members: Vec<ProjectMember>,
    /// Every person ever assigned a project role, including since-removed
    /// members. Feeds the `project_members` dynamic recipient group.
    pub all_time_members: BTreeSet<PersonId>,
    /// The organisation node that owns this project.
    pub org_node: Option<OrgNodeId>,
    /// Linked research products.
    pub product_ids: BTreeSet<ProductId>,
    /// Affiliated organisation nodes.
    pub affiliated_orgs: BTreeSet<OrgNodeId>,
    /// Free-form custom fields.
    pub custom_fields: BTreeMap<String, String>,
    /// Creator of the project-started event. Feeds the `project_owner`
    /// dynamic recipient group.
    pub created_by: Option<UserId>,
}

impl Project {
    /// An empty aggregate with the given identity at version 0.
    pub fn empty(id: ProjectId) -> Self {
        Self {
            id,
            version: EventVersion::initial(),
            title: String::new(),
            description: None,
            start_date: None,
            end_date: None,
            members: Vec::new(),
            all_time_members: BTreeSet::new(),
            org_node: None,
            product_ids: BTreeSet::new(),
            affiliated_orgs: BTreeSet::new(),
            custom_fields: BTreeMap::new(),
            created_by: None,
        }
    }

    /// Folds an ordered event list into current state.
    pub fn reduce(id: ProjectId, history: &[ProjectEvent]) -> Self {
        let mut state = Self::empty(id);
        for event in history {
            state.apply(event);
        }
        state
    }

    /// Applies one event to this state.
    ///
    /// Every event advances the version, since pending and rejected events
    /// occupy real stream slots, but only `Approved` events change visible
    /// fields.
    /// That makes approval retroactive: flipping a pending event to approved
    /// changes the projection on the next reduce without rewriting history.
    pub fn apply(&mut self, event: &ProjectEvent) {
        self.version = self.version.next();

        if event.status != EventStatus::Approved {
            return;
        }

        match &event.payload {
            ProjectEventPayload::ProjectStarted {
                title,
                description,
                start_date,
                end_date,
                org_node,
            } => {
                self.title.clone_from(title);
                self.description.clone_from(description);
                self.start_date = *start_date;
                self.end_date = *end_date;
                self.org_node.clone_from(org_node);
                self.created_by = Some(event.created_by.clone());
            }
            ProjectEventPayload::ProjectDetailsUpdated {
                title,
                description,
                start_date,
                end_date,
            } => {
                if let Some(title) = title {
                    self.title.clone_from(title);
                }
                if let Some(description) = description {
                    self.description = Some(description.clone());
                }
                if let Some(start_date) = start_date {
                    self.start_date = Some(*start_date);
                }
                if let Some(end_date) = end_date {
                    self.end_date = Some(*end_date);
                }
            }
            ProjectEventPayload::MemberAdded { person_id, role_id } => {
                self.members.retain(|m| &m.person_id != person_id);
                self.members.push(ProjectMember {
                    person_id: person_id.clone(),
                    role_id: role_id.clone(),
                });
                self.all_time_members.insert(person_id.clone());
            }
            ProjectEventPayload::MemberRemoved { person_id } => {
                self.members.retain(|m| &m.person_id != person_id);
            }
            ProjectEventPayload::ProductAdded { product_id } => {
                self.product_ids.insert(product_id.clone());
            }
            ProjectEventPayload::ProductRemoved { product_id } => {
                self.product_ids.remove(product_id);
            }
            ProjectEventPayload::AffiliatedOrganisationAdded { org_node } => {
                self.affiliated_orgs.insert(org_node.clone());
            }
            ProjectEventPayload::AffiliatedOrganisationRemoved { org_node } => {
                self.affiliated_orgs.remove(org_node);
            }
            ProjectEventPayload::OwnerOrganisationMoved { org_node } => {
                self.org_node = Some(org_node.clone());
            }
            ProjectEventPayload::CustomFieldSet { name, value } => {
                self.custom_fields.insert(name.clone(), value.clone());
            }
            ProjectEventPayload::CustomFieldCleared { name } => {
                self.custom_fields.remove(name);
            }
            // Unknown kinds are ignored so old readers keep working when new
            // event types appear.
            ProjectEventPayload::Other { .. } => {}
        }
    }
}
