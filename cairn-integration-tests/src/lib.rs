//! Shared fixtures for the integration tests.
//!
//! Wires the core against the in-memory adapters the way a host application
//! would at startup: one store, one dispatcher with the cache refresher and
//! policy evaluator registered, one executor and event service on top.

use std::collections::HashMap;
use std::sync::Arc;

use cairn::cache::ProjectLoader;
use cairn::dispatch::{CacheRefresher, EventDispatcher};
use cairn::event::ProjectEventPayload;
use cairn::executor::CommandExecutor;
use cairn::policy::{OrgDirectory, PolicyStore, RecipientDirectory};
use cairn::registry::{CommandContext, EventTypeRegistry};
use cairn::service::EventService;
use cairn::types::{OrgNodeId, PersonId, ProjectId, UserId};
use cairn_memory::{
    InMemoryEventStore, InMemoryProjectCache, RecordingNotificationSink, StaticOrgDirectory,
    StaticPolicyStore, StaticRecipientDirectory,
};

/// A fully wired core over in-memory adapters.
pub struct Harness {
    /// The shared store behind every component.
    pub store: Arc<InMemoryEventStore>,
    /// Cache sitting in front of the loader.
    pub cache: Arc<InMemoryProjectCache>,
    /// Loader reading through the cache.
    pub loader: ProjectLoader<InMemoryEventStore>,
    /// Command pipeline.
    pub executor: CommandExecutor<InMemoryEventStore>,
    /// Approval workflow.
    pub service: EventService<InMemoryEventStore>,
    /// Records every notification the policy engine sends.
    pub sink: Arc<RecordingNotificationSink>,
    /// Policies consulted on every committed event.
    pub policies: Arc<StaticPolicyStore>,
}

/// Builder mirroring the knobs a host application wires differently per
/// deployment.
#[derive(Default)]
pub struct HarnessBuilder {
    registry: Option<EventTypeRegistry>,
    org: Option<Arc<StaticOrgDirectory>>,
    recipients: Option<Arc<StaticRecipientDirectory>>,
    policies: Vec<cairn::policy::EventPolicy>,
}

impl HarnessBuilder {
    /// Overrides the default event-type registry.
    #[must_use]
    pub fn registry(mut self, registry: EventTypeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Supplies an org hierarchy.
    #[must_use]
    pub fn org(mut self, org: StaticOrgDirectory) -> Self {
        self.org = Some(Arc::new(org));
        self
    }

    /// Supplies a person-to-user table.
    #[must_use]
    pub fn recipients(mut self, table: HashMap<PersonId, UserId>) -> Self {
        self.recipients = Some(Arc::new(StaticRecipientDirectory::new(table)));
        self
    }

    /// Adds a policy to the policy store.
    #[must_use]
    pub fn policy(mut self, policy: cairn::policy::EventPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Wires everything together.
    pub fn build(self) -> Harness {
        let store = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(InMemoryProjectCache::new());
        let sink = Arc::new(RecordingNotificationSink::new());
        let policies = Arc::new(StaticPolicyStore::new(self.policies));
        let registry = Arc::new(self.registry.unwrap_or_else(EventTypeRegistry::with_defaults));
        let org = self
            .org
            .unwrap_or_else(|| Arc::new(StaticOrgDirectory::default()));
        let recipients = self
            .recipients
            .unwrap_or_else(|| Arc::new(StaticRecipientDirectory::default()));

        let loader = ProjectLoader::new(Arc::clone(&store))
            .with_cache(Arc::clone(&cache) as Arc<dyn cairn::cache::ProjectCache>);
        let refresher = Arc::new(CacheRefresher::new(loader.clone()));
        let evaluator = Arc::new(cairn::policy::PolicyEvaluator::new(
            Arc::clone(&store),
            Arc::clone(&policies) as Arc<dyn PolicyStore>,
            org as Arc<dyn OrgDirectory>,
            recipients as Arc<dyn RecipientDirectory>,
            Arc::clone(&sink) as Arc<dyn cairn::notification::NotificationSink>,
        ));
        let dispatcher = Arc::new(
            EventDispatcher::new()
                .with_event_handler(Arc::clone(&refresher) as _)
                .with_event_handler(evaluator as _)
                .with_status_handler(refresher as _),
        );

        let executor = CommandExecutor::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&dispatcher) as Arc<dyn cairn::dispatch::Publisher>,
        )
        .with_cache(Arc::clone(&cache) as Arc<dyn cairn::cache::ProjectCache>);
        let service = EventService::new(
            Arc::clone(&store),
            dispatcher as Arc<dyn cairn::dispatch::Publisher>,
        )
        .with_notifications(Arc::clone(&sink) as Arc<dyn cairn::notification::NotificationSink>);

        Harness {
            store,
            cache,
            loader,
            executor,
            service,
            sink,
            policies,
        }
    }
}

impl Harness {
    /// Harness with all defaults.
    pub fn new() -> Self {
        HarnessBuilder::default().build()
    }

    /// Builder for harnesses with custom wiring.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Project id fixture.
pub fn project(s: &str) -> ProjectId {
    ProjectId::try_new(s).expect("fixture ids are valid")
}

/// Command context fixture.
pub fn as_user(s: &str) -> CommandContext {
    CommandContext::new(UserId::try_new(s).expect("fixture ids are valid"))
}

/// Org node fixture.
pub fn node(s: &str) -> OrgNodeId {
    OrgNodeId::try_new(s).expect("fixture ids are valid")
}

/// A project-started payload owned by the given org node.
pub fn started_in(title: &str, org_node: Option<OrgNodeId>) -> ProjectEventPayload {
    ProjectEventPayload::ProjectStarted {
        title: title.to_string(),
        description: None,
        start_date: None,
        end_date: None,
        org_node,
    }
}
