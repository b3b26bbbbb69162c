//! In-memory adapters for the cairn project core.
//!
//! Implements every port the core depends on (event store, cache,
//! notification sink, policy store, org and recipient directories) with
//! plain hash maps behind locks. Useful for tests and prototyping where
//! persistence is not required; the concurrency semantics match what a
//! database-backed store must provide, including the compare-and-swap
//! version check on append.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cairn::errors::{CommandResult, EventStoreError, EventStoreResult, PolicyError};
use cairn::event::{EventKind, EventStatus, ProjectEvent};
use cairn::hydrate::EntityDirectory;
use cairn::notification::{Notification, NotificationSink};
use cairn::policy::{EventPolicy, OrgDirectory, PolicyStore, RecipientDirectory};
use cairn::projection::Project;
use cairn::store::EventStore;
use cairn::types::{
    EventId, EventVersion, OrgNodeId, OrgRoleId, PersonId, ProductId, ProjectId, ProjectRoleId,
    Timestamp, UserId,
};

#[derive(Default)]
struct StoreInner {
    streams: HashMap<ProjectId, Vec<ProjectEvent>>,
    // Event id to owning stream, so status lookups avoid a full scan.
    index: HashMap<EventId, ProjectId>,
}

/// Thread-safe in-memory event store.
///
/// The version check and the write happen under one write lock, so
/// concurrent appends to the same stream serialize exactly as they would
/// against a store using a unique constraint on (stream, version).
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryEventStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn load(
        &self,
        project_id: &ProjectId,
    ) -> EventStoreResult<(Vec<ProjectEvent>, EventVersion)> {
        let inner = self.inner.read().expect("RwLock poisoned");
        match inner.streams.get(project_id) {
            Some(events) if !events.is_empty() => {
                Ok((events.clone(), EventVersion::new(events.len() as u64)))
            }
            _ => Err(EventStoreError::StreamNotFound(project_id.clone())),
        }
    }

    async fn append(
        &self,
        project_id: &ProjectId,
        expected_version: EventVersion,
        events: Vec<ProjectEvent>,
    ) -> EventStoreResult<EventVersion> {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        let current = EventVersion::new(
            inner.streams.get(project_id).map_or(0, Vec::len) as u64,
        );
        if current != expected_version {
            return Err(EventStoreError::VersionConflict {
                project_id: project_id.clone(),
                expected: expected_version,
                current,
            });
        }
        for event in &events {
            inner.index.insert(event.id, project_id.clone());
        }
        let stream = inner.streams.entry(project_id.clone()).or_default();
        stream.extend(events);
        Ok(EventVersion::new(stream.len() as u64))
    }

    async fn get_event(&self, event_id: &EventId) -> EventStoreResult<ProjectEvent> {
        let inner = self.inner.read().expect("RwLock poisoned");
        inner
            .index
            .get(event_id)
            .and_then(|project_id| inner.streams.get(project_id))
            .and_then(|stream| stream.iter().find(|e| e.id == *event_id))
            .cloned()
            .ok_or(EventStoreError::EventNotFound(*event_id))
    }

    async fn set_status(
        &self,
        event_id: &EventId,
        expected: EventStatus,
        status: EventStatus,
    ) -> EventStoreResult<ProjectEvent> {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        let project_id = inner
            .index
            .get(event_id)
            .cloned()
            .ok_or(EventStoreError::EventNotFound(*event_id))?;
        let stream = inner
            .streams
            .get_mut(&project_id)
            .ok_or(EventStoreError::EventNotFound(*event_id))?;
        let event = stream
            .iter_mut()
            .find(|e| e.id == *event_id)
            .ok_or(EventStoreError::EventNotFound(*event_id))?;
        // Check and write under the same lock, so concurrent status updates
        // serialize like concurrent appends do.
        if event.status != expected {
            return Err(EventStoreError::StatusConflict {
                event_id: *event_id,
                expected,
                actual: event.status,
            });
        }
        if event.status == EventStatus::Pending && status.is_terminal() {
            event.decided_at = Some(Timestamp::now());
        }
        event.status = status;
        Ok(event.clone())
    }
}

/// In-memory projection cache.
#[derive(Clone, Default)]
pub struct InMemoryProjectCache {
    entries: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl InMemoryProjectCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached projections, for test assertions.
    pub fn len(&self) -> usize {
        self.entries.read().expect("RwLock poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl cairn::cache::ProjectCache for InMemoryProjectCache {
    async fn get(&self, project_id: &ProjectId) -> Option<Project> {
        self.entries
            .read()
            .expect("RwLock poisoned")
            .get(project_id)
            .cloned()
    }

    async fn put(&self, project: Project) {
        self.entries
            .write()
            .expect("RwLock poisoned")
            .insert(project.id.clone(), project);
    }

    async fn delete(&self, project_id: &ProjectId) {
        self.entries
            .write()
            .expect("RwLock poisoned")
            .remove(project_id);
    }
}

/// Notification sink that records deliveries instead of sending them.
#[derive(Clone, Default)]
pub struct RecordingNotificationSink {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl RecordingNotificationSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in delivery order.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().expect("RwLock poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), String> {
        self.sent.write().expect("RwLock poisoned").push(notification);
        Ok(())
    }

    async fn mark_read_for_event(&self, event_id: &EventId) -> Result<(), String> {
        let mut sent = self.sent.write().expect("RwLock poisoned");
        for notification in sent.iter_mut() {
            if notification.source_event == Some(*event_id) {
                notification.read = true;
            }
        }
        Ok(())
    }
}

/// Policy store over a fixed list of policies.
#[derive(Clone, Default)]
pub struct StaticPolicyStore {
    policies: Arc<RwLock<Vec<EventPolicy>>>,
}

impl StaticPolicyStore {
    /// Creates a store holding the given policies.
    pub fn new(policies: Vec<EventPolicy>) -> Self {
        Self {
            policies: Arc::new(RwLock::new(policies)),
        }
    }

    /// Adds a policy after construction.
    pub fn add(&self, policy: EventPolicy) {
        self.policies.write().expect("RwLock poisoned").push(policy);
    }
}

#[async_trait]
impl PolicyStore for StaticPolicyStore {
    async fn policies_for_kind(&self, kind: &EventKind) -> Result<Vec<EventPolicy>, PolicyError> {
        Ok(self
            .policies
            .read()
            .expect("RwLock poisoned")
            .iter()
            .filter(|p| p.event_kinds.contains(kind))
            .cloned()
            .collect())
    }
}

/// Org structure as parent pointers plus explicit role-holder grants.
#[derive(Clone, Default)]
pub struct StaticOrgDirectory {
    parents: Arc<HashMap<OrgNodeId, OrgNodeId>>,
    role_holders: Arc<HashMap<(OrgRoleId, OrgNodeId), Vec<UserId>>>,
}

impl StaticOrgDirectory {
    /// Builds a directory from child-to-parent edges and role grants keyed
    /// by (role, scope node).
    pub fn new(
        parents: HashMap<OrgNodeId, OrgNodeId>,
        role_holders: HashMap<(OrgRoleId, OrgNodeId), Vec<UserId>>,
    ) -> Self {
        Self {
            parents: Arc::new(parents),
            role_holders: Arc::new(role_holders),
        }
    }
}

#[async_trait]
impl OrgDirectory for StaticOrgDirectory {
    async fn ancestor_ids(&self, node: &OrgNodeId) -> Result<Vec<OrgNodeId>, PolicyError> {
        let mut ancestors = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = node.clone();
        while let Some(parent) = self.parents.get(&current) {
            if !seen.insert(parent.clone()) {
                return Err(PolicyError::Lookup(format!(
                    "org hierarchy cycle at node {parent}"
                )));
            }
            ancestors.push(parent.clone());
            current = parent.clone();
        }
        Ok(ancestors)
    }

    async fn org_role_holders(
        &self,
        role: &OrgRoleId,
        scope: &OrgNodeId,
    ) -> Result<Vec<UserId>, PolicyError> {
        Ok(self
            .role_holders
            .get(&(role.clone(), scope.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Person-to-user mapping over a fixed table.
#[derive(Clone, Default)]
pub struct StaticRecipientDirectory {
    users: Arc<HashMap<PersonId, UserId>>,
}

impl StaticRecipientDirectory {
    /// Builds a directory from a person-to-user table.
    pub fn new(users: HashMap<PersonId, UserId>) -> Self {
        Self {
            users: Arc::new(users),
        }
    }
}

#[async_trait]
impl RecipientDirectory for StaticRecipientDirectory {
    async fn user_for_person(&self, person: &PersonId) -> Result<Option<UserId>, PolicyError> {
        Ok(self.users.get(person).cloned())
    }
}

/// Entity name lookups over fixed tables, for hydration in tests.
#[derive(Clone, Default)]
pub struct StaticEntityDirectory {
    persons: Arc<BTreeMap<PersonId, String>>,
    roles: Arc<BTreeMap<ProjectRoleId, String>>,
    products: Arc<BTreeMap<ProductId, String>>,
}

impl StaticEntityDirectory {
    /// Builds a directory from name tables.
    pub fn new(
        persons: BTreeMap<PersonId, String>,
        roles: BTreeMap<ProjectRoleId, String>,
        products: BTreeMap<ProductId, String>,
    ) -> Self {
        Self {
            persons: Arc::new(persons),
            roles: Arc::new(roles),
            products: Arc::new(products),
        }
    }
}

#[async_trait]
impl EntityDirectory for StaticEntityDirectory {
    async fn person_names(
        &self,
        ids: &BTreeSet<PersonId>,
    ) -> CommandResult<BTreeMap<PersonId, String>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.persons.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }

    async fn role_names(
        &self,
        ids: &BTreeSet<ProjectRoleId>,
    ) -> CommandResult<BTreeMap<ProjectRoleId, String>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.roles.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }

    async fn product_names(
        &self,
        ids: &BTreeSet<ProductId>,
    ) -> CommandResult<BTreeMap<ProductId, String>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }
}
