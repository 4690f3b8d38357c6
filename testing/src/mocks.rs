//! In-memory collaborators for fast, deterministic tests.
//!
//! - [`InMemoryEntityStore`]: `BTreeMap`-backed entity store with atomic commits
//! - [`InMemoryCache`]: `HashMap`-backed cache
//! - [`RecordingTaskQueue`]: captures dispatched tasks
//! - [`StaticIdentityResolver`]: fixed bearer-token table
//!
//! Each mock can be switched into a failing mode to exercise error paths.

use conference_core::cache::{Cache, CacheError, CacheFuture};
use conference_core::entity::Entity;
use conference_core::identity::{self, CallerIdentity, IdentityFuture, IdentityResolver};
use conference_core::key::EntityKey;
use conference_core::store::{
    EntityStore, Mutation, Query, Record, StoreError, StoreFuture, Version,
};
use conference_core::task_queue::{Task, TaskFuture, TaskQueue, TaskQueueError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

type Records = BTreeMap<EntityKey, (Version, Entity)>;

/// In-memory entity store.
///
/// Commits take a write lock, check every precondition, then apply every
/// mutation, so a batch is atomic with respect to all other callers. Each
/// commit yields to the scheduler first so concurrent tests interleave reads
/// and writes the way a real backend would.
///
/// # Example
///
/// ```
/// use conference_core::entity::Wishlist;
/// use conference_core::key::{EntityKey, Kind};
/// use conference_core::store::{EntityStore, Mutation, Precondition, Version};
/// use conference_testing::InMemoryEntityStore;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryEntityStore::new();
/// let key = EntityKey::root(Kind::Profile, "alice").child(Kind::Wishlist, "wishlist");
///
/// store
///     .commit(vec![Mutation::put(key.clone(), Wishlist::default(), Precondition::Absent)])
///     .await
///     .unwrap();
///
/// let record = store.get(&key).await.unwrap().unwrap();
/// assert_eq!(record.version, Version::FIRST);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    records: Arc<RwLock<Records>>,
    injected_conflicts: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with a concurrency conflict without
    /// applying anything.
    pub fn fail_next_commits(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of commits applied successfully.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Check if a record exists.
    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.read().contains_key(key)
    }

    /// Every stored record, in key order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.read()
            .iter()
            .map(|(key, (version, entity))| record(key, *version, entity))
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, key: &EntityKey) -> Option<Record> {
        self.read()
            .get(key)
            .map(|(version, entity)| record(key, *version, entity))
    }

    fn run_query(&self, query: &Query) -> Vec<Record> {
        let records = self.read();
        let candidates: Vec<Record> = match &query.ancestor {
            Some(ancestor) => records
                .range((Bound::Excluded(ancestor), Bound::Unbounded))
                .take_while(|(key, _)| key.is_descendant_of(ancestor))
                .map(|(key, (version, entity))| record(key, *version, entity))
                .collect(),
            None => records
                .iter()
                .filter(|(key, _)| key.kind() == query.kind)
                .map(|(key, (version, entity))| record(key, *version, entity))
                .collect(),
        };
        drop(records);
        query.apply(candidates)
    }

    fn apply(&self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        let mut seen = BTreeSet::new();
        for mutation in &mutations {
            let key = mutation.key();
            if !seen.insert(key) {
                return Err(StoreError::Database(format!(
                    "Commit touches {key} more than once"
                )));
            }
            let current = records.get(key).map(|(version, _)| *version);
            if injected || !mutation.precondition().holds(current) {
                return Err(StoreError::ConcurrencyConflict {
                    key: key.clone(),
                    expected: mutation.precondition(),
                    actual: current,
                });
            }
        }

        for mutation in mutations {
            match mutation {
                Mutation::Put { key, entity, .. } => {
                    let version = records
                        .get(&key)
                        .map_or(Version::FIRST, |(version, _)| version.next());
                    records.insert(key, (version, entity));
                }
                Mutation::Delete { key, .. } => {
                    records.remove(&key);
                }
            }
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn record(key: &EntityKey, version: Version, entity: &Entity) -> Record {
    Record {
        key: key.clone(),
        version,
        entity: entity.clone(),
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get<'a>(&'a self, key: &'a EntityKey) -> StoreFuture<'a, Option<Record>> {
        Box::pin(async move { Ok(self.load(key)) })
    }

    fn query(&self, query: Query) -> StoreFuture<'_, Vec<Record>> {
        Box::pin(async move { Ok(self.run_query(&query)) })
    }

    fn commit(&self, mutations: Vec<Mutation>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.apply(mutations)
        })
    }
}

/// In-memory cache.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Read an entry without going through the trait.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError("in-memory cache switched off".to_string()));
        }
        Ok(())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Cache for InMemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.peek(key))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.write().insert(key.to_string(), value);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.write().remove(key);
            Ok(())
        })
    }
}

/// Task queue that records every dispatched task.
#[derive(Clone, Debug, Default)]
pub struct RecordingTaskQueue {
    tasks: Arc<Mutex<Vec<Task>>>,
    rejecting: Arc<AtomicBool>,
}

impl RecordingTaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make dispatch fail (or succeed again).
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Every task dispatched so far, in order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dispatched tasks with the given name.
    #[must_use]
    pub fn tasks_named(&self, name: &str) -> Vec<Task> {
        self.tasks().into_iter().filter(|t| t.name == name).collect()
    }
}

impl TaskQueue for RecordingTaskQueue {
    fn dispatch(&self, task: Task) -> TaskFuture<'_> {
        Box::pin(async move {
            if self.rejecting.load(Ordering::SeqCst) {
                return Err(TaskQueueError {
                    task: task.name,
                    reason: "queue rejecting".to_string(),
                });
            }
            self.tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(task);
            Ok(())
        })
    }
}

/// Identity resolver backed by a fixed token table.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentityResolver {
    tokens: HashMap<String, CallerIdentity>,
}

impl StaticIdentityResolver {
    /// Create a resolver that knows no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `identity`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, identity: CallerIdentity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve<'a>(&'a self, bearer: Option<&'a str>) -> IdentityFuture<'a> {
        Box::pin(async move {
            bearer
                .and_then(|token| self.tokens.get(token))
                .cloned()
                .ok_or_else(identity::unauthorized)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::fixtures::speaker;
    use conference_core::entity::Wishlist;
    use conference_core::error::ErrorKind;
    use conference_core::key::Kind;
    use conference_core::store::Precondition;

    #[tokio::test]
    async fn failed_precondition_applies_nothing() {
        let store = InMemoryEntityStore::new();
        let a = EntityKey::root(Kind::Speaker, "a");
        let b = EntityKey::root(Kind::Speaker, "b");
        store
            .commit(vec![Mutation::put(a.clone(), speaker("a@x"), Precondition::Absent)])
            .await
            .unwrap();

        let result = store
            .commit(vec![
                Mutation::put(b.clone(), speaker("b@x"), Precondition::Absent),
                Mutation::put(a.clone(), speaker("a2@x"), Precondition::Absent),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));
        assert!(!store.contains(&b));
        assert_eq!(store.get(&a).await.unwrap().unwrap().version, Version::FIRST);
    }

    #[tokio::test]
    async fn versions_increase_and_reset_after_delete() {
        let store = InMemoryEntityStore::new();
        let key = EntityKey::root(Kind::Speaker, "a");
        store
            .commit(vec![Mutation::put(key.clone(), speaker("a@x"), Precondition::Absent)])
            .await
            .unwrap();
        store
            .commit(vec![Mutation::put(key.clone(), speaker("a@y"), Precondition::At(Version::FIRST))])
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap().version, Version::new(2));

        store
            .commit(vec![Mutation::delete(key.clone(), Precondition::At(Version::new(2)))])
            .await
            .unwrap();
        store
            .commit(vec![Mutation::put(key.clone(), speaker("a@z"), Precondition::Absent)])
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap().version, Version::FIRST);
    }

    #[tokio::test]
    async fn ancestor_query_only_returns_descendants() {
        let store = InMemoryEntityStore::new();
        let alice = EntityKey::root(Kind::Profile, "alice");
        let alice_list = alice.child(Kind::Wishlist, "wishlist");
        let bob_list = EntityKey::root(Kind::Profile, "bob").child(Kind::Wishlist, "wishlist");
        store
            .commit(vec![
                Mutation::put(alice_list.clone(), Wishlist::default(), Precondition::Absent),
                Mutation::put(bob_list, Wishlist::default(), Precondition::Absent),
            ])
            .await
            .unwrap();

        let results = store
            .query(Query::kind(Kind::Wishlist).ancestor(alice))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, alice_list);
    }

    #[tokio::test]
    async fn injected_conflicts_are_consumed() {
        let store = InMemoryEntityStore::new();
        store.fail_next_commits(1);
        let key = EntityKey::root(Kind::Speaker, "a");

        let first = store
            .commit(vec![Mutation::put(key.clone(), speaker("a@x"), Precondition::Any)])
            .await;
        assert!(first.unwrap_err().is_conflict());

        store
            .commit(vec![Mutation::put(key, speaker("a@x"), Precondition::Any)])
            .await
            .unwrap();
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_commit_are_rejected() {
        let store = InMemoryEntityStore::new();
        let key = EntityKey::root(Kind::Speaker, "a");
        let result = store
            .commit(vec![
                Mutation::put(key.clone(), speaker("a@x"), Precondition::Any),
                Mutation::delete(key, Precondition::Any),
            ])
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let resolver = StaticIdentityResolver::new()
            .with_token("t1", CallerIdentity::new("alice", "alice@example.com", "Alice"));

        assert_eq!(resolver.resolve(Some("t1")).await.unwrap().user_id, "alice");
        let error = resolver.resolve(Some("nope")).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unauthorized);
        assert!(resolver.resolve(None).await.is_err());
    }

    #[tokio::test]
    async fn switched_off_cache_fails() {
        let cache = InMemoryCache::new();
        cache.set("k", "v".to_string()).await.unwrap();
        cache.set_unavailable(true);
        assert!(cache.get("k").await.is_err());
        assert_eq!(cache.peek("k"), Some("v".to_string()));
    }
}
