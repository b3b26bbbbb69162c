//! Per-event-type registry: metadata and decision functions keyed by kind.
//!
//! The source system branched on event-type strings all over the pipeline;
//! here that dispatch lives in one explicit registry object constructed at
//! process start and passed by reference into the executor and evaluator.
//! The core never branches on concrete event kinds itself.

use crate::errors::CommandResult;
use crate::event::{EventKind, ProjectEventPayload};
use crate::projection::Project;
use crate::types::UserId;
use std::collections::HashMap;
use std::sync::Arc;

/// Caller context for one command execution.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// The user issuing the command. Stamped as `created_by` on new events.
    pub user_id: UserId,
    /// Correlation id for request tracing.
    pub correlation_id: String,
}

impl CommandContext {
    /// Creates a context for the given user with a fresh correlation id.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            correlation_id: uuid::Uuid::now_v7().to_string(),
        }
    }
}

/// Predicate over a proposed event, given the caller's context.
pub type EventPredicate = fn(&CommandContext, &ProjectEventPayload) -> bool;

/// A decision function: inspects current state and produces zero or more new
/// event payloads. Must be pure: all inputs come from the context and state,
/// so a retry after a concurrency conflict re-runs it safely.
pub type Decider =
    Arc<dyn Fn(&CommandContext, &Project) -> CommandResult<Vec<ProjectEventPayload>> + Send + Sync>;

/// Static metadata for one event kind.
#[derive(Clone)]
pub struct EventTypeMeta {
    /// Human-readable name, used in notification message templates.
    pub friendly_name: &'static str,
    /// Whether this caller may create this event at all.
    pub is_allowed: EventPredicate,
    /// Whether the event starts out `Pending` instead of `Approved`.
    pub needs_approval: EventPredicate,
}

impl std::fmt::Debug for EventTypeMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTypeMeta")
            .field("friendly_name", &self.friendly_name)
            .finish_non_exhaustive()
    }
}

fn always(_: &CommandContext, _: &ProjectEventPayload) -> bool {
    true
}

fn never(_: &CommandContext, _: &ProjectEventPayload) -> bool {
    false
}

impl EventTypeMeta {
    /// Metadata for an event kind that any caller may create and that is
    /// approved immediately. Most kinds work this way.
    pub fn auto_approved(friendly_name: &'static str) -> Self {
        Self {
            friendly_name,
            is_allowed: always,
            needs_approval: never,
        }
    }

    /// Overrides the approval predicate.
    #[must_use]
    pub fn with_needs_approval(mut self, needs_approval: EventPredicate) -> Self {
        self.needs_approval = needs_approval;
        self
    }

    /// Overrides the permission predicate.
    #[must_use]
    pub fn with_is_allowed(mut self, is_allowed: EventPredicate) -> Self {
        self.is_allowed = is_allowed;
        self
    }
}

/// Registry mapping event kinds to their metadata and optional deciders.
///
/// Built once at startup by the domain layer, then shared read-only.
#[derive(Default)]
pub struct EventTypeRegistry {
    metas: HashMap<EventKind, EventTypeMeta>,
    deciders: HashMap<EventKind, Decider>,
}

impl std::fmt::Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTypeRegistry")
            .field("metas", &self.metas)
            .field("deciders", &self.deciders.keys())
            .finish()
    }
}

impl EventTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in project event kinds, all auto-approved.
    /// The domain layer overrides approval rules where its workflow needs
    /// them.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults: [(&str, &str); 11] = [
            ("project_started", "Project started"),
            ("project_details_updated", "Project details updated"),
            ("member_added", "Member added"),
            ("member_removed", "Member removed"),
            ("product_added", "Product linked"),
            ("product_removed", "Product unlinked"),
            ("affiliated_organisation_added", "Organisation affiliated"),
            ("affiliated_organisation_removed", "Affiliation removed"),
            ("owner_organisation_moved", "Project moved"),
            ("custom_field_set", "Custom field set"),
            ("custom_field_cleared", "Custom field cleared"),
        ];
        for (kind, friendly) in defaults {
            registry.register(
                EventKind::try_new(kind).expect("default kinds are valid"),
                EventTypeMeta::auto_approved(friendly),
            );
        }
        registry
    }

    /// Registers (or replaces) metadata for a kind.
    pub fn register(&mut self, kind: EventKind, meta: EventTypeMeta) -> &mut Self {
        self.metas.insert(kind, meta);
        self
    }

    /// Registers a decision function for a kind, so generic edges can run
    /// commands by kind name.
    pub fn register_decider(&mut self, kind: EventKind, decider: Decider) -> &mut Self {
        self.deciders.insert(kind, decider);
        self
    }

    /// Metadata for a kind, if registered.
    pub fn meta(&self, kind: &EventKind) -> Option<&EventTypeMeta> {
        self.metas.get(kind)
    }

    /// The decision function for a kind, if registered.
    pub fn decider(&self, kind: &EventKind) -> Option<Decider> {
        self.deciders.get(kind).cloned()
    }

    /// Friendly display name for a kind. Falls back to the raw discriminator
    /// for kinds this registry does not know.
    pub fn friendly_name<'a>(&'a self, kind: &'a EventKind) -> &'a str {
        self.meta(kind)
            .map_or_else(|| kind.as_ref(), |meta| meta.friendly_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(s: &str) -> EventKind {
        EventKind::try_new(s).unwrap()
    }

    fn ctx() -> CommandContext {
        CommandContext::new(UserId::try_new("user-1").unwrap())
    }

    fn payload() -> ProjectEventPayload {
        ProjectEventPayload::CustomFieldSet {
            name: "x".into(),
            value: "y".into(),
        }
    }

    #[test]
    fn defaults_cover_all_builtin_kinds() {
        let registry = EventTypeRegistry::with_defaults();
        assert!(registry.meta(&kind("project_started")).is_some());
        assert!(registry.meta(&kind("custom_field_cleared")).is_some());
        assert!(registry.meta(&kind("budget_revised")).is_none());
    }

    #[test]
    fn auto_approved_kinds_allow_and_skip_approval() {
        let registry = EventTypeRegistry::with_defaults();
        let meta = registry.meta(&kind("member_added")).unwrap();
        assert!((meta.is_allowed)(&ctx(), &payload()));
        assert!(!(meta.needs_approval)(&ctx(), &payload()));
    }

    #[test]
    fn approval_predicate_can_be_overridden() {
        let mut registry = EventTypeRegistry::with_defaults();
        registry.register(
            kind("owner_organisation_moved"),
            EventTypeMeta::auto_approved("Project moved").with_needs_approval(|_, _| true),
        );
        let meta = registry.meta(&kind("owner_organisation_moved")).unwrap();
        assert!((meta.needs_approval)(&ctx(), &payload()));
    }

    #[test]
    fn friendly_name_falls_back_to_the_discriminator() {
        let registry = EventTypeRegistry::with_defaults();
        assert_eq!(registry.friendly_name(&kind("member_added")), "Member added");
        assert_eq!(registry.friendly_name(&kind("mystery_kind")), "mystery_kind");
    }

    #[test]
    fn deciders_are_registered_and_resolved_by_kind() {
        let mut registry = EventTypeRegistry::with_defaults();
        registry.register_decider(
            kind("custom_field_set"),
            Arc::new(|_, _| {
                Ok(vec![ProjectEventPayload::CustomFieldSet {
                    name: "via-registry".into(),
                    value: "1".into(),
                }])
            }),
        );
        let decider = registry.decider(&kind("custom_field_set")).unwrap();
        let project = Project::empty(crate::types::ProjectId::try_new("p").unwrap());
        let events = decider(&ctx(), &project).unwrap();
        assert_eq!(events.len(), 1);
        assert!(registry.decider(&kind("member_added")).is_none());
    }
}
