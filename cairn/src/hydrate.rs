//! Presentation support: resolving the entity ids an event stream mentions
//! into display names.
//!
//! Events only carry ids. A timeline view wants "Alice Jones joined as
//! Principal Investigator", so the hydrator collects every referenced id
//! across a batch of events and resolves them in one round trip per entity
//! type.

use crate::errors::{CommandError, CommandResult};
use crate::event::{ProjectEvent, ProjectEventPayload};
use crate::registry::EventTypeRegistry;
use crate::types::{PersonId, ProductId, ProjectRoleId};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Batch name lookups, backed by whatever entity storage the host app uses.
/// Unknown ids are simply absent from the returned map.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Display names for a batch of people.
    async fn person_names(
        &self,
        ids: &BTreeSet<PersonId>,
    ) -> CommandResult<BTreeMap<PersonId, String>>;

    /// Display names for a batch of project roles.
    async fn role_names(
        &self,
        ids: &BTreeSet<ProjectRoleId>,
    ) -> CommandResult<BTreeMap<ProjectRoleId, String>>;

    /// Display names for a batch of research products.
    async fn product_names(
        &self,
        ids: &BTreeSet<ProductId>,
    ) -> CommandResult<BTreeMap<ProductId, String>>;
}

/// An event plus the resolved names of the entities it references.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedEvent {
    /// The underlying event.
    pub event: ProjectEvent,
    /// Friendly name of the event kind, for display.
    pub kind_name: String,
    /// Name of the referenced person, when resolvable.
    pub person_name: Option<String>,
    /// Name of the referenced project role, when resolvable.
    pub role_name: Option<String>,
    /// Name of the referenced product, when resolvable.
    pub product_name: Option<String>,
}

/// Resolves entity references for presentation.
pub struct Hydrator {
    directory: Arc<dyn EntityDirectory>,
    registry: Arc<EventTypeRegistry>,
}

impl Hydrator {
    /// Creates a hydrator over the given directory and registry.
    pub fn new(directory: Arc<dyn EntityDirectory>, registry: Arc<EventTypeRegistry>) -> Self {
        Self {
            directory,
            registry,
        }
    }

    /// Hydrates a batch of events with one directory call per entity type,
    /// however many events reference them.
    pub async fn hydrate(&self, events: Vec<ProjectEvent>) -> CommandResult<Vec<HydratedEvent>> {
        let mut person_ids = BTreeSet::new();
        let mut role_ids = BTreeSet::new();
        let mut product_ids = BTreeSet::new();
        for event in &events {
            match &event.payload {
                ProjectEventPayload::MemberAdded { person_id, role_id } => {
                    person_ids.insert(person_id.clone());
                    role_ids.insert(role_id.clone());
                }
                ProjectEventPayload::MemberRemoved { person_id } => {
                    person_ids.insert(person_id.clone());
                }
                ProjectEventPayload::ProductAdded { product_id }
                | ProjectEventPayload::ProductRemoved { product_id } => {
                    product_ids.insert(product_id.clone());
                }
                _ => {}
            }
        }

        let persons = if person_ids.is_empty() {
            BTreeMap::new()
        } else {
            self.directory.person_names(&person_ids).await?
        };
        let roles = if role_ids.is_empty() {
            BTreeMap::new()
        } else {
            self.directory.role_names(&role_ids).await?
        };
        let products = if product_ids.is_empty() {
            BTreeMap::new()
        } else {
            self.directory.product_names(&product_ids).await?
        };

        Ok(events
            .into_iter()
            .map(|event| {
                let (person_name, role_name, product_name) = match &event.payload {
                    ProjectEventPayload::MemberAdded { person_id, role_id } => (
                        persons.get(person_id).cloned(),
                        roles.get(role_id).cloned(),
                        None,
                    ),
                    ProjectEventPayload::MemberRemoved { person_id } => {
                        (persons.get(person_id).cloned(), None, None)
                    }
                    ProjectEventPayload::ProductAdded { product_id }
                    | ProjectEventPayload::ProductRemoved { product_id } => {
                        (None, None, products.get(product_id).cloned())
                    }
                    _ => (None, None, None),
                };
                let kind = event.kind();
                let kind_name = self.registry.friendly_name(&kind).to_string();
                HydratedEvent {
                    event,
                    kind_name,
                    person_name,
                    role_name,
                    product_name,
                }
            })
            .collect())
    }

    /// Hydrates a single event.
    pub async fn hydrate_one(&self, event: ProjectEvent) -> CommandResult<HydratedEvent> {
        let mut hydrated = self.hydrate(vec![event]).await?;
        hydrated
            .pop()
            .ok_or_else(|| CommandError::Internal("hydration produced no output".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventStatus;
    use crate::types::{ProjectId, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EntityDirectory for CountingDirectory {
        async fn person_names(
            &self,
            ids: &BTreeSet<PersonId>,
        ) -> CommandResult<BTreeMap<PersonId, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .iter()
                .map(|id| (id.clone(), format!("Person {}", id.as_ref())))
                .collect())
        }

        async fn role_names(
            &self,
            ids: &BTreeSet<ProjectRoleId>,
        ) -> CommandResult<BTreeMap<ProjectRoleId, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .iter()
                .map(|id| (id.clone(), format!("Role {}", id.as_ref())))
                .collect())
        }

        async fn product_names(
            &self,
            _ids: &BTreeSet<ProductId>,
        ) -> CommandResult<BTreeMap<ProductId, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BTreeMap::new())
        }
    }

    fn member_added(person: &str, role: &str) -> ProjectEvent {
        ProjectEvent::new(
            ProjectId::try_new("project-1").unwrap(),
            EventStatus::Approved,
            UserId::try_new("user-1").unwrap(),
            ProjectEventPayload::MemberAdded {
                person_id: PersonId::try_new(person).unwrap(),
                role_id: ProjectRoleId::try_new(role).unwrap(),
            },
        )
    }

    #[tokio::test]
    async fn batches_make_one_directory_call_per_entity_type() {
        let directory = Arc::new(CountingDirectory {
            calls: AtomicUsize::new(0),
        });
        let hydrator = Hydrator::new(
            Arc::clone(&directory) as Arc<dyn EntityDirectory>,
            Arc::new(EventTypeRegistry::with_defaults()),
        );

        let events = vec![
            member_added("alice", "pi"),
            member_added("bob", "pi"),
            member_added("carol", "postdoc"),
        ];
        let hydrated = hydrator.hydrate(events).await.unwrap();

        // Persons and roles each resolved once; no product lookup happened.
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(hydrated[0].person_name.as_deref(), Some("Person alice"));
        assert_eq!(hydrated[2].role_name.as_deref(), Some("Role postdoc"));
        assert_eq!(hydrated[0].kind_name, "Member added");
    }

    #[tokio::test]
    async fn unresolvable_ids_hydrate_to_none() {
        let directory = Arc::new(CountingDirectory {
            calls: AtomicUsize::new(0),
        });
        let hydrator = Hydrator::new(
            directory as Arc<dyn EntityDirectory>,
            Arc::new(EventTypeRegistry::with_defaults()),
        );

        let event = ProjectEvent::new(
            ProjectId::try_new("project-1").unwrap(),
            EventStatus::Approved,
            UserId::try_new("user-1").unwrap(),
            ProjectEventPayload::ProductAdded {
                product_id: ProductId::try_new("prod-404").unwrap(),
            },
        );
        let hydrated = hydrator.hydrate_one(event).await.unwrap();
        assert_eq!(hydrated.product_name, None);
    }
}
