//! The policy engine: configurable trigger-condition-action rules.
//!
//! Policies are data, not code. Each one names the event kinds it watches,
//! an AND-ed list of field conditions, a recipient specification and an
//! action. The evaluator runs as an event handler behind the dispatcher, so
//! a broken policy can never fail the write that triggered it.
//!
//! Policies are scoped to an organisation node and inherited downward: a
//! policy defined on a parent node applies to every project owned by a
//! descendant. The evaluator does not know the org tree itself; it asks an
//! injected [`OrgDirectory`] for ancestor sets.

use crate::dispatch::EventHandler;
use crate::errors::{DispatchError, EventStoreError, PolicyError};
use crate::event::{EventKind, EventStatus, ProjectEvent};
use crate::notification::{Notification, NotificationSink};
use crate::projection::Project;
use crate::store::EventStore;
use crate::types::{OrgNodeId, OrgRoleId, PersonId, ProjectRoleId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Comparison applied between a resolved field and a configured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    GreaterThan,
    LessThan,
    Between,
    In,
    NotIn,
    Exists,
    NotExists,
}

/// One field test. Field paths are `event.<f>`, `project.<f>` or
/// `custom_field.<name>`; deeper nesting uses further dot segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted field path resolved against the evaluation context.
    pub field: String,
    /// Comparison to apply.
    pub operator: ConditionOperator,
    /// Ignored by `exists` / `not_exists`. `between` expects a two-element
    /// array, `in` / `not_in` expect an array of candidates.
    #[serde(default)]
    pub value: Value,
}

/// What a matching policy does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Create a notification per resolved recipient.
    Notify,
    /// Notify recipients and hold the event as pending until approved.
    RequestApproval,
}

/// Named recipient sets computed at evaluation time rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicGroup {
    /// Everyone ever assigned a project role on the project.
    ProjectMembers,
    /// The user who started the project.
    ProjectOwner,
    /// Administrators of the owning org node. Resolution is not implemented
    /// yet and currently yields no recipients.
    OrgAdmins,
}

/// Who a policy's action reaches. The resolved set is the union of all four
/// sources, deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientSpec {
    /// Explicit user accounts.
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    /// Users holding one of these project roles on the affected project.
    #[serde(default)]
    pub project_role_ids: Vec<ProjectRoleId>,
    /// Users holding one of these org roles within the policy's scope.
    #[serde(default)]
    pub org_role_ids: Vec<OrgRoleId>,
    /// Computed recipient groups.
    #[serde(default)]
    pub dynamic_groups: Vec<DynamicGroup>,
}

/// A configured rule. Lives outside the event log; editing a policy never
/// touches history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPolicy {
    /// Unique identifier.
    pub id: Uuid,
    /// Administrator-facing name, used in log lines.
    pub name: String,
    /// Event kinds this policy watches.
    pub event_kinds: Vec<EventKind>,
    /// All conditions must pass. An empty list always matches.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// What happens on a match.
    pub action: PolicyAction,
    /// Message with optional `{event.<f>}` style placeholders.
    pub message_template: String,
    /// Who the action reaches.
    #[serde(default)]
    pub recipients: RecipientSpec,
    /// Scope node. `None` means the policy applies everywhere.
    #[serde(default)]
    pub org_node: Option<OrgNodeId>,
}

/// Source of configured policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Returns the policies whose `event_kinds` contain `kind`.
    async fn policies_for_kind(&self, kind: &EventKind) -> Result<Vec<EventPolicy>, PolicyError>;
}

/// Organisation structure lookups the evaluator depends on.
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    /// Ancestors of `node`, excluding the node itself, root last.
    async fn ancestor_ids(&self, node: &OrgNodeId) -> Result<Vec<OrgNodeId>, PolicyError>;

    /// Users holding `role` within the subtree rooted at `scope`.
    async fn org_role_holders(
        &self,
        role: &OrgRoleId,
        scope: &OrgNodeId,
    ) -> Result<Vec<UserId>, PolicyError>;
}

/// Maps person records (who appear on projects) to user accounts (who
/// receive notifications). Not every person has an account.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn user_for_person(&self, person: &PersonId) -> Result<Option<UserId>, PolicyError>;
}

/// Evaluates every committed event against the configured policies.
pub struct PolicyEvaluator<S> {
    store: Arc<S>,
    policies: Arc<dyn PolicyStore>,
    org: Arc<dyn OrgDirectory>,
    directory: Arc<dyn RecipientDirectory>,
    sink: Arc<dyn NotificationSink>,
}

impl<S> PolicyEvaluator<S>
where
    S: EventStore,
{
    /// Creates an evaluator over the given ports.
    pub fn new(
        store: Arc<S>,
        policies: Arc<dyn PolicyStore>,
        org: Arc<dyn OrgDirectory>,
        directory: Arc<dyn RecipientDirectory>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            policies,
            org,
            directory,
            sink,
        }
    }

    /// Runs all matching policies for one event and returns the
    /// notifications that were sent.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, kind = %event.kind()))]
    pub async fn evaluate(&self, event: &ProjectEvent) -> Result<Vec<Notification>, PolicyError> {
        let candidates = self.policies.policies_for_kind(&event.kind()).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let (history, _) = self.store.load(&event.project_id).await?;
        let project = Project::reduce(event.project_id.clone(), &history);

        // Precompute the project's ancestor-or-self set once; every scoped
        // candidate checks membership against it.
        let scope = match &project.org_node {
            Some(node) => {
                let mut set: BTreeSet<OrgNodeId> = self
                    .org
                    .ancestor_ids(node)
                    .await?
                    .into_iter()
                    .collect();
                set.insert(node.clone());
                set
            }
            None => BTreeSet::new(),
        };

        let context = evaluation_context(event, &project);
        let mut sent = Vec::new();

        for policy in candidates {
            if let Some(node) = &policy.org_node {
                if !scope.contains(node) {
                    continue;
                }
            }
            if !conditions_match(&policy.conditions, &context) {
                continue;
            }
            tracing::debug!(policy = %policy.name, "policy matched");
            sent.extend(self.act(&policy, event, &project, &context).await?);
        }

        Ok(sent)
    }

    async fn act(
        &self,
        policy: &EventPolicy,
        event: &ProjectEvent,
        project: &Project,
        context: &Value,
    ) -> Result<Vec<Notification>, PolicyError> {
        if policy.action == PolicyAction::RequestApproval {
            // Events that already went through a verdict are never held
            // again: an approved event stays approved when its publish
            // re-matches the policy, and a rejected one stays rejected.
            if event.decided_at.is_some() || event.status == EventStatus::Rejected {
                tracing::debug!(
                    policy = %policy.name,
                    event_id = %event.id,
                    "event already carries a verdict, not holding it again"
                );
                return Ok(Vec::new());
            }
            if event.status == EventStatus::Approved {
                // Hold the event until an approver acts. Already-pending
                // events stay pending; only the notifications remain to do.
                match self
                    .store
                    .set_status(&event.id, EventStatus::Approved, EventStatus::Pending)
                    .await
                {
                    Ok(_) => {}
                    // A verdict landed between publish and here; leave it.
                    Err(EventStoreError::StatusConflict { .. }) => return Ok(Vec::new()),
                    Err(err) => return Err(err.into()),
                }
            }
        }

        let recipients = self.resolve_recipients(policy, project).await?;
        let message = render_template(&policy.message_template, context);

        let mut sent = Vec::with_capacity(recipients.len());
        for user_id in recipients {
            let notification = Notification::new(user_id, Some(event.id), message.clone());
            match self.sink.notify(notification.clone()).await {
                Ok(()) => sent.push(notification),
                // One undeliverable recipient must not starve the rest.
                Err(error) => {
                    tracing::warn!(policy = %policy.name, %error, "notification delivery failed");
                }
            }
        }
        Ok(sent)
    }

    async fn resolve_recipients(
        &self,
        policy: &EventPolicy,
        project: &Project,
    ) -> Result<BTreeSet<UserId>, PolicyError> {
        let mut recipients: BTreeSet<UserId> =
            policy.recipients.user_ids.iter().cloned().collect();

        for role_id in &policy.recipients.project_role_ids {
            for member in &project.members {
                if member.role_id == *role_id {
                    if let Some(user) = self.directory.user_for_person(&member.person_id).await? {
                        recipients.insert(user);
                    }
                }
            }
        }

        if !policy.recipients.org_role_ids.is_empty() {
            // Org roles resolve within the policy's own scope, falling back
            // to the project's owning node for unscoped policies.
            if let Some(scope) = policy.org_node.as_ref().or(project.org_node.as_ref()) {
                for role_id in &policy.recipients.org_role_ids {
                    for user in self.org.org_role_holders(role_id, scope).await? {
                        recipients.insert(user);
                    }
                }
            }
        }

        for group in &policy.recipients.dynamic_groups {
            match group {
                DynamicGroup::ProjectMembers => {
                    for person_id in &project.all_time_members {
                        if let Some(user) = self.directory.user_for_person(person_id).await? {
                            recipients.insert(user);
                        }
                    }
                }
                DynamicGroup::ProjectOwner => {
                    if let Some(owner) = &project.created_by {
                        recipients.insert(owner.clone());
                    }
                }
                DynamicGroup::OrgAdmins => {
                    // TODO: resolve once org nodes carry an admin role id.
                    tracing::debug!(policy = %policy.name, "org_admins group is unresolved, skipping");
                }
            }
        }

        Ok(recipients)
    }
}

#[async_trait]
impl<S> EventHandler for PolicyEvaluator<S>
where
    S: EventStore,
{
    fn name(&self) -> &'static str {
        "policy-evaluator"
    }

    async fn handle(&self, event: &ProjectEvent) -> Result<(), DispatchError> {
        self.evaluate(event).await?;
        Ok(())
    }
}

/// Builds the JSON document condition paths resolve against.
fn evaluation_context(event: &ProjectEvent, project: &Project) -> Value {
    let mut event_value = serde_json::to_value(&event.payload).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut event_value {
        // Custom payloads carry their fields under `data`; lift them so
        // conditions address every kind uniformly as `event.<field>`.
        if let Some(Value::Object(data)) = map.remove("data") {
            for (key, value) in data {
                map.entry(key).or_insert(value);
            }
        }
        map.insert("kind".into(), Value::String(event.kind().to_string()));
        map.insert(
            "status".into(),
            Value::String(event.status.to_string()),
        );
        map.insert(
            "created_by".into(),
            Value::String(event.created_by.to_string()),
        );
    }
    serde_json::json!({
        "event": event_value,
        "project": serde_json::to_value(project).unwrap_or(Value::Null),
        "custom_field": project.custom_fields,
    })
}

fn conditions_match(conditions: &[Condition], context: &Value) -> bool {
    conditions.iter().all(|c| condition_matches(c, context))
}

fn condition_matches(condition: &Condition, context: &Value) -> bool {
    let actual = resolve_path(context, &condition.field);
    match condition.operator {
        ConditionOperator::Exists => actual.is_some_and(|v| !v.is_null()),
        ConditionOperator::NotExists => !actual.is_some_and(|v| !v.is_null()),
        ConditionOperator::Equals => actual.is_some_and(|v| values_equal(v, &condition.value)),
        ConditionOperator::NotEquals => {
            !actual.is_some_and(|v| values_equal(v, &condition.value))
        }
        ConditionOperator::Contains => actual.is_some_and(|v| match v {
            Value::String(s) => condition
                .value
                .as_str()
                .is_some_and(|needle| s.contains(needle)),
            Value::Array(items) => items.iter().any(|item| values_equal(item, &condition.value)),
            _ => false,
        }),
        ConditionOperator::StartsWith => actual.is_some_and(|v| {
            matches!((v.as_str(), condition.value.as_str()),
                (Some(s), Some(prefix)) if s.starts_with(prefix))
        }),
        ConditionOperator::GreaterThan => {
            compare(actual, &condition.value).is_some_and(std::cmp::Ordering::is_gt)
        }
        ConditionOperator::LessThan => {
            compare(actual, &condition.value).is_some_and(std::cmp::Ordering::is_lt)
        }
        ConditionOperator::Between => actual.is_some_and(|v| {
            let Some(bounds) = condition.value.as_array() else {
                return false;
            };
            let (Some(lo), Some(hi)) = (bounds.first(), bounds.get(1)) else {
                return false;
            };
            compare(Some(v), lo).is_some_and(std::cmp::Ordering::is_ge)
                && compare(Some(v), hi).is_some_and(std::cmp::Ordering::is_le)
        }),
        ConditionOperator::In => actual.is_some_and(|v| {
            condition
                .value
                .as_array()
                .is_some_and(|candidates| candidates.iter().any(|c| values_equal(v, c)))
        }),
        ConditionOperator::NotIn => !actual.is_some_and(|v| {
            condition
                .value
                .as_array()
                .is_some_and(|candidates| candidates.iter().any(|c| values_equal(v, c)))
        }),
    }
}

/// Equality with numeric coercion, so `100` and `100.0` compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Orders two values numerically when both are numbers, lexically when both
/// are strings. Mixed or non-orderable types do not compare.
fn compare(actual: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    let actual = actual?;
    match (actual.as_f64(), expected.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(x), Some(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

/// Resolves a dotted path like `event.amount` inside the context document.
fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Substitutes `{path}` placeholders from the evaluation context. Unknown
/// placeholders are left verbatim so misconfiguration stays visible.
fn render_template(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let path = &after[..close];
                match resolve_path(context, path) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Null) | None => {
                        out.push('{');
                        out.push_str(path);
                        out.push('}');
                    }
                    Some(other) => out.push_str(&other.to_string()),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
