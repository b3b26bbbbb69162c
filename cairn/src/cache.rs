//! Read-through project cache and the loader in front of the event store.
//!
//! The cache maps project id to last-known projected state. It is an
//! optimization with explicit invalidation, never a place where state can
//! only exist: every entry can be rebuilt by replaying the stream.

use crate::errors::EventStoreResult;
use crate::projection::Project;
use crate::store::EventStore;
use crate::types::ProjectId;
use async_trait::async_trait;
use std::sync::Arc;

/// Cache port for projected project state.
///
/// Operations are best-effort and infallible from the caller's view; an
/// implementation that loses entries only costs a replay.
#[async_trait]
pub trait ProjectCache: Send + Sync {
    /// Returns the cached state for a project, if present.
    async fn get(&self, project_id: &ProjectId) -> Option<Project>;

    /// Stores (or replaces) the cached state for a project.
    async fn put(&self, project: Project);

    /// Drops the cached state for a project.
    async fn delete(&self, project_id: &ProjectId);
}

/// Read-through loader: cache first, replay from the store on a miss.
///
/// The cache may be absent, in which case every load replays the stream.
pub struct ProjectLoader<S> {
    store: Arc<S>,
    cache: Option<Arc<dyn ProjectCache>>,
}

impl<S> Clone for ProjectLoader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: self.cache.clone(),
        }
    }
}

impl<S> ProjectLoader<S>
where
    S: EventStore,
{
    /// Creates a loader without a cache; every load replays from the store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store, cache: None }
    }

    /// Attaches a cache to this loader.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ProjectCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Loads current project state, serving from cache when possible.
    ///
    /// On a miss the stream is replayed, the result cached, and returned.
    pub async fn load(&self, project_id: &ProjectId) -> EventStoreResult<Project> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(project_id).await {
                return Ok(cached);
            }
        }
        let project = self.replay(project_id).await?;
        if let Some(cache) = &self.cache {
            cache.put(project.clone()).await;
        }
        Ok(project)
    }

    /// Replays the stream and reduces it, bypassing the cache.
    pub async fn replay(&self, project_id: &ProjectId) -> EventStoreResult<Project> {
        let (events, _version) = self.store.load(project_id).await?;
        Ok(Project::reduce(project_id.clone(), &events))
    }

    /// Re-reduces from the store and overwrites the cache entry.
    ///
    /// Called synchronously in the dispatch path after appends and status
    /// transitions, so the next read is guaranteed fresh. If the stream has
    /// disappeared the stale entry is dropped before the error propagates.
    pub async fn refresh(&self, project_id: &ProjectId) -> EventStoreResult<Project> {
        match self.replay(project_id).await {
            Ok(project) => {
                if let Some(cache) = &self.cache {
                    cache.put(project.clone()).await;
                }
                Ok(project)
            }
            Err(err) => {
                if let Some(cache) = &self.cache {
                    cache.delete(project_id).await;
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EventStoreError;
    use crate::event::{EventStatus, ProjectEvent, ProjectEventPayload};
    use crate::types::{EventId, EventVersion, UserId};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Store stub serving a fixed history and counting loads.
    struct FixedStore {
        events: Vec<ProjectEvent>,
        loads: Mutex<usize>,
    }

    #[async_trait]
    impl EventStore for FixedStore {
        async fn load(
            &self,
            project_id: &ProjectId,
        ) -> EventStoreResult<(Vec<ProjectEvent>, EventVersion)> {
            *self.loads.lock().unwrap() += 1;
            if self.events.is_empty() {
                return Err(EventStoreError::StreamNotFound(project_id.clone()));
            }
            Ok((
                self.events.clone(),
                EventVersion::new(self.events.len() as u64),
            ))
        }

        async fn append(
            &self,
            _project_id: &ProjectId,
            _expected_version: EventVersion,
            _events: Vec<ProjectEvent>,
        ) -> EventStoreResult<EventVersion> {
            unimplemented!("not used by loader tests")
        }

        async fn get_event(&self, event_id: &EventId) -> EventStoreResult<ProjectEvent> {
            Err(EventStoreError::EventNotFound(*event_id))
        }

        async fn set_status(
            &self,
            event_id: &EventId,
            _expected: EventStatus,
            _status: EventStatus,
        ) -> EventStoreResult<ProjectEvent> {
            Err(EventStoreError::EventNotFound(*event_id))
        }
    }

    #[derive(Default)]
    struct MapCache {
        entries: Mutex<HashMap<ProjectId, Project>>,
    }

    #[async_trait]
    impl ProjectCache for MapCache {
        async fn get(&self, project_id: &ProjectId) -> Option<Project> {
            self.entries.lock().unwrap().get(project_id).cloned()
        }

        async fn put(&self, project: Project) {
            self.entries
                .lock()
                .unwrap()
                .insert(project.id.clone(), project);
        }

        async fn delete(&self, project_id: &ProjectId) {
            self.entries.lock().unwrap().remove(project_id);
        }
    }

    fn pid() -> ProjectId {
        ProjectId::try_new("project-1").unwrap()
    }

    fn started() -> ProjectEvent {
        ProjectEvent::new(
            pid(),
            EventStatus::Approved,
            UserId::try_new("user-1").unwrap(),
            ProjectEventPayload::ProjectStarted {
                title: "Cached".into(),
                description: None,
                start_date: None,
                end_date: None,
                org_node: None,
            },
        )
    }

    #[tokio::test]
    async fn miss_replays_and_populates_the_cache() {
        let store = Arc::new(FixedStore {
            events: vec![started()],
            loads: Mutex::new(0),
        });
        let cache = Arc::new(MapCache::default());
        let loader = ProjectLoader::new(Arc::clone(&store)).with_cache(cache.clone());

        let first = loader.load(&pid()).await.unwrap();
        assert_eq!(first.title, "Cached");
        assert_eq!(*store.loads.lock().unwrap(), 1);

        // Second load is served from cache; the store is not touched again.
        let second = loader.load(&pid()).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(*store.loads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn loader_without_cache_always_replays() {
        let store = Arc::new(FixedStore {
            events: vec![started()],
            loads: Mutex::new(0),
        });
        let loader = ProjectLoader::new(Arc::clone(&store));

        loader.load(&pid()).await.unwrap();
        loader.load(&pid()).await.unwrap();
        assert_eq!(*store.loads.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn refresh_overwrites_a_stale_entry() {
        let store = Arc::new(FixedStore {
            events: vec![started()],
            loads: Mutex::new(0),
        });
        let cache = Arc::new(MapCache::default());
        let mut stale = Project::empty(pid());
        stale.title = "Stale".into();
        cache.put(stale).await;

        let loader = ProjectLoader::new(Arc::clone(&store)).with_cache(cache.clone());
        let refreshed = loader.refresh(&pid()).await.unwrap();
        assert_eq!(refreshed.title, "Cached");
        assert_eq!(cache.get(&pid()).await.unwrap().title, "Cached");
    }

    #[tokio::test]
    async fn refresh_of_a_missing_stream_drops_the_entry() {
        let store = Arc::new(FixedStore {
            events: vec![],
            loads: Mutex::new(0),
        });
        let cache = Arc::new(MapCache::default());
        cache.put(Project::empty(pid())).await;

        let loader = ProjectLoader::new(Arc::clone(&store)).with_cache(cache.clone());
        let result = loader.refresh(&pid()).await;
        assert!(matches!(result, Err(EventStoreError::StreamNotFound(_))));
        assert!(cache.get(&pid()).await.is_none());
    }
}
