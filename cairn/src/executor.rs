//! The command executor: load → decide → append → re-apply → publish.
//!
//! One executor instance serves all commands against all project aggregates.
//! Concurrent commands on the same aggregate race on the expected version;
//! exactly one wins per version number and the loser gets a typed
//! [`CommandError::ConcurrencyConflict`]. The executor never retries on its
//! own: decisions may carry side effects, so the caller decides whether to
//! reload and re-run.

use crate::cache::{ProjectCache, ProjectLoader};
use crate::dispatch::Publisher;
use crate::errors::{CommandError, CommandResult, ValidationError};
use crate::event::{EventStatus, ProjectEvent, ProjectEventPayload};
use crate::projection::Project;
use crate::registry::{CommandContext, EventTypeRegistry};
use crate::store::EventStore;
use crate::types::ProjectId;
use std::sync::Arc;

/// Orchestrates command execution against one aggregate at a time.
pub struct CommandExecutor<S> {
    store: Arc<S>,
    loader: ProjectLoader<S>,
    registry: Arc<EventTypeRegistry>,
    publisher: Arc<dyn Publisher>,
}

impl<S> CommandExecutor<S>
where
    S: EventStore,
{
    /// Creates an executor without a cache; loads replay the stream.
    pub fn new(
        store: Arc<S>,
        registry: Arc<EventTypeRegistry>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let loader = ProjectLoader::new(Arc::clone(&store));
        Self {
            store,
            loader,
            registry,
            publisher,
        }
    }

    /// Attaches a read-through cache for state loads.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ProjectCache>) -> Self {
        self.loader = self.loader.with_cache(cache);
        self
    }

    /// Executes a decision against an existing aggregate.
    ///
    /// Fails with [`CommandError::NotFound`] when the project has no stream.
    /// A decision returning zero events is a legitimate no-op: nothing is
    /// appended and the version is unchanged.
    #[tracing::instrument(
        skip(self, decision),
        fields(project_id = %project_id, user_id = %ctx.user_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn execute<D>(
        &self,
        ctx: &CommandContext,
        project_id: &ProjectId,
        decision: D,
    ) -> CommandResult<Project>
    where
        D: FnOnce(&CommandContext, &Project) -> CommandResult<Vec<ProjectEventPayload>>,
    {
        let state = self.loader.load(project_id).await?;
        self.decide_and_commit(ctx, state, decision).await
    }

    /// Executes a decision that bootstraps a new aggregate.
    ///
    /// The decision sees the empty aggregate at version 0 and typically
    /// produces the stream's first event. If another command created the
    /// stream concurrently, the version-0 append loses the race and surfaces
    /// as a concurrency conflict.
    #[tracing::instrument(
        skip(self, decision),
        fields(project_id = %project_id, user_id = %ctx.user_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn execute_new<D>(
        &self,
        ctx: &CommandContext,
        project_id: &ProjectId,
        decision: D,
    ) -> CommandResult<Project>
    where
        D: FnOnce(&CommandContext, &Project) -> CommandResult<Vec<ProjectEventPayload>>,
    {
        let state = Project::empty(project_id.clone());
        self.decide_and_commit(ctx, state, decision).await
    }

    /// Runs the decision registered in the type registry for `kind`.
    ///
    /// Lets generic edges run commands by kind name without linking the
    /// concrete decision function.
    pub async fn execute_registered(
        &self,
        ctx: &CommandContext,
        project_id: &ProjectId,
        kind: &crate::event::EventKind,
    ) -> CommandResult<Project> {
        let decider = self
            .registry
            .decider(kind)
            .ok_or_else(|| ValidationError::UnknownEventKind(kind.clone()))?;
        self.execute(ctx, project_id, move |ctx, state| decider(ctx, state))
            .await
    }

    async fn decide_and_commit<D>(
        &self,
        ctx: &CommandContext,
        mut state: Project,
        decision: D,
    ) -> CommandResult<Project>
    where
        D: FnOnce(&CommandContext, &Project) -> CommandResult<Vec<ProjectEventPayload>>,
    {
        // The decision is pure: it runs to completion before anything is
        // written, so a panic or error here cannot corrupt the stream.
        let payloads = decision(ctx, &state)?;
        if payloads.is_empty() {
            tracing::debug!("decision produced no events; command is a no-op");
            return Ok(state);
        }

        let events = self.stamp(ctx, &state.id, payloads)?;

        // All events from one decision commit as one atomic unit sharing a
        // single expected-version check.
        self.store
            .append(&state.id, state.version, events.clone())
            .await?;

        // Re-apply in memory so the returned state reflects the write
        // without a re-read.
        for event in &events {
            state.apply(event);
        }

        // The write already succeeded; a publish failure must not fail the
        // command.
        if let Err(error) = self.publisher.publish(&events).await {
            tracing::warn!(project_id = %state.id, %error, "publishing committed events failed");
        }

        Ok(state)
    }

    /// Completes envelopes for decision payloads: permission check, approval
    /// status from the registry, creator and timestamps.
    fn stamp(
        &self,
        ctx: &CommandContext,
        project_id: &ProjectId,
        payloads: Vec<ProjectEventPayload>,
    ) -> CommandResult<Vec<ProjectEvent>> {
        payloads
            .into_iter()
            .map(|payload| {
                let kind = payload.kind();
                let meta = self
                    .registry
                    .meta(&kind)
                    .ok_or_else(|| ValidationError::UnknownEventKind(kind.clone()))?;
                if !(meta.is_allowed)(ctx, &payload) {
                    return Err(CommandError::Validation(ValidationError::NotAllowed {
                        kind,
                    }));
                }
                let status = if (meta.needs_approval)(ctx, &payload) {
                    EventStatus::Pending
                } else {
                    EventStatus::Approved
                };
                Ok(ProjectEvent::new(
                    project_id.clone(),
                    status,
                    ctx.user_id.clone(),
                    payload,
                ))
            })
            .collect()
    }
}
