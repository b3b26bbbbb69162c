//! Fan-out dispatcher invoked after every append and status transition.
//!
//! Side effects (policy evaluation, cache refresh) are best-effort and
//! independent: one handler failing is logged and never stops the remaining
//! handlers, and nothing here can fail the write that triggered it.

use crate::cache::ProjectLoader;
use crate::errors::DispatchError;
use crate::event::ProjectEvent;
use crate::store::EventStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Handler invoked for every published (committed) event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, used in log lines.
    fn name(&self) -> &'static str;

    /// Reacts to one committed event.
    async fn handle(&self, event: &ProjectEvent) -> Result<(), DispatchError>;
}

/// Handler invoked only on explicit status transitions.
#[async_trait]
pub trait StatusChangeHandler: Send + Sync {
    /// Handler name, used in log lines.
    fn name(&self) -> &'static str;

    /// Reacts to one event whose status just changed.
    async fn on_status_changed(&self, event: &ProjectEvent) -> Result<(), DispatchError>;
}

/// Publishing port the write path talks to.
///
/// The executor and event service only see this trait; which side effects
/// exist is decided once at startup by handler registration.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Hands committed events to the notification handlers.
    async fn publish(&self, events: &[ProjectEvent]) -> Result<(), DispatchError>;

    /// Hands a status transition to the status-change handlers.
    async fn publish_status_changed(&self, event: &ProjectEvent) -> Result<(), DispatchError>;
}

/// Fan-out hub with two independent handler lists.
///
/// Handlers run in registration order. Errors are logged per handler and
/// swallowed; `publish` itself never fails.
#[derive(Default)]
pub struct EventDispatcher {
    event_handlers: Vec<Arc<dyn EventHandler>>,
    status_handlers: Vec<Arc<dyn StatusChangeHandler>>,
}

impl EventDispatcher {
    /// Creates a dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the per-event list.
    #[must_use]
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Appends a handler to the status-change list.
    #[must_use]
    pub fn with_status_handler(mut self, handler: Arc<dyn StatusChangeHandler>) -> Self {
        self.status_handlers.push(handler);
        self
    }
}

#[async_trait]
impl Publisher for EventDispatcher {
    async fn publish(&self, events: &[ProjectEvent]) -> Result<(), DispatchError> {
        for event in events {
            for handler in &self.event_handlers {
                if let Err(error) = handler.handle(event).await {
                    tracing::warn!(
                        handler = handler.name(),
                        event_id = %event.id,
                        kind = %event.kind(),
                        %error,
                        "event handler failed; continuing with remaining handlers"
                    );
                }
            }
        }
        Ok(())
    }

    async fn publish_status_changed(&self, event: &ProjectEvent) -> Result<(), DispatchError> {
        for handler in &self.status_handlers {
            if let Err(error) = handler.on_status_changed(event).await {
                tracing::warn!(
                    handler = handler.name(),
                    event_id = %event.id,
                    status = %event.status,
                    %error,
                    "status-change handler failed; continuing with remaining handlers"
                );
            }
        }
        Ok(())
    }
}

/// Handler that keeps the read-through cache coherent with the store.
///
/// Registered on both lists: any committed append and any status transition
/// re-reduces the affected project from the store before the next read.
pub struct CacheRefresher<S> {
    loader: ProjectLoader<S>,
}

impl<S> CacheRefresher<S>
where
    S: EventStore,
{
    /// Creates a refresher over the given loader.
    pub const fn new(loader: ProjectLoader<S>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl<S> EventHandler for CacheRefresher<S>
where
    S: EventStore,
{
    fn name(&self) -> &'static str {
        "cache-refresher"
    }

    async fn handle(&self, event: &ProjectEvent) -> Result<(), DispatchError> {
        self.loader.refresh(&event.project_id).await?;
        Ok(())
    }
}

#[async_trait]
impl<S> StatusChangeHandler for CacheRefresher<S>
where
    S: EventStore,
{
    fn name(&self) -> &'static str {
        "cache-refresher"
    }

    async fn on_status_changed(&self, event: &ProjectEvent) -> Result<(), DispatchError> {
        self.loader.refresh(&event.project_id).await?;
        Ok(())
    }
}
