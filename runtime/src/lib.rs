//! # Conference Runtime
//!
//! Operations of the conference-management backend.
//!
//! This crate turns the seams of `conference-core` into behavior. Every
//! operation reads through the injected [`EntityStore`], decides, and writes
//! back in one version-checked commit, retrying on contention
//! ([`retry::transact`]).
//!
//! ## Core Components
//!
//! - **Registration Engine** ([`registration`]): seat accounting; never oversells
//! - **Linkage Manager** ([`linkage`]): session/speaker links and deletion cascades
//! - **Wishlist Manager** ([`wishlist`]): per-profile session wishlists
//! - **Announcement Cache** ([`announcement`]): sold-out announcement and speaker summaries
//! - **Directories** ([`conferences`], [`profiles`], [`sessions`], [`speakers`]):
//!   creation, updates and queries
//! - **Service** ([`service::ConferenceService`]): the facade an API layer calls
//!
//! ## Example
//!
//! ```
//! use conference_runtime::{ConferenceEnvironment, service::ConferenceService};
//! use conference_testing::mocks::{
//!     InMemoryCache, InMemoryEntityStore, RecordingTaskQueue, StaticIdentityResolver,
//! };
//! use std::sync::Arc;
//!
//! let env = ConferenceEnvironment::new(
//!     Arc::new(InMemoryEntityStore::new()),
//!     Arc::new(InMemoryCache::new()),
//!     Arc::new(RecordingTaskQueue::new()),
//!     Arc::new(StaticIdentityResolver::new()),
//! );
//! let service = ConferenceService::new(env);
//! # let _ = service;
//! ```

use conference_core::cache::Cache;
use conference_core::entity::EntityKind;
use conference_core::error::{ConferenceError, Result};
use conference_core::identity::IdentityResolver;
use conference_core::key::{EntityKey, Kind, Reference};
use conference_core::store::{EntityStore, Record, Stored, fetch};
use conference_core::task_queue::{Task, TaskQueue};
use std::sync::Arc;

pub mod announcement;
pub mod config;
pub mod conferences;
pub mod linkage;
pub mod metrics;
pub mod profiles;
pub mod registration;
pub mod retry;
pub mod service;
pub mod sessions;
pub mod speakers;
pub mod wishlist;

pub use config::ConferenceConfig;
pub use retry::RetryPolicy;
pub use service::ConferenceService;

/// Collaborators shared by every component.
///
/// Cloning is cheap; each handle is an `Arc`.
#[derive(Clone)]
pub struct ConferenceEnvironment {
    /// Entity store.
    pub store: Arc<dyn EntityStore>,
    /// Derived-state cache.
    pub cache: Arc<dyn Cache>,
    /// Asynchronous task sink.
    pub tasks: Arc<dyn TaskQueue>,
    /// Bearer credential resolver.
    pub identity: Arc<dyn IdentityResolver>,
    /// Transaction retry policy.
    pub retry: RetryPolicy,
}

impl ConferenceEnvironment {
    /// Create an environment with the default retry policy.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        cache: Arc<dyn Cache>,
        tasks: Arc<dyn TaskQueue>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            store,
            cache,
            tasks,
            identity,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load a record of type `T` by caller-supplied reference.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: the reference is malformed
    /// - `NotFound`: it names another kind, or no such record exists
    pub(crate) async fn load<T: EntityKind>(&self, reference: &Reference) -> Result<Stored<T>> {
        let key = key_for(reference, T::KIND)?;
        fetch::<T>(self.store.as_ref(), &key)
            .await?
            .ok_or_else(|| ConferenceError::not_found(T::KIND, reference.clone()))
    }

    /// Load a record of type `T` by key, `None` if absent.
    pub(crate) async fn find<T: EntityKind>(&self, key: &EntityKey) -> Result<Option<Stored<T>>> {
        Ok(fetch::<T>(self.store.as_ref(), key).await?)
    }

    /// Resolve references in order, skipping malformed and dangling ones.
    pub(crate) async fn resolve_all<T: EntityKind>(
        &self,
        references: &[Reference],
    ) -> Result<Vec<Stored<T>>> {
        let keys: Vec<EntityKey> = references
            .iter()
            .filter_map(|reference| reference.decode().ok())
            .filter(|key| key.kind() == T::KIND)
            .collect();
        Ok(self
            .store
            .get_many(&keys)
            .await?
            .into_iter()
            .flatten()
            .filter_map(Record::into_typed)
            .collect())
    }

    /// Hand a task to the queue; failures are logged, never returned.
    pub(crate) async fn dispatch(&self, task: Task) {
        let name = task.name.clone();
        match self.tasks.dispatch(task).await {
            Ok(()) => tracing::debug!(task = %name, "Task dispatched"),
            Err(error) => tracing::warn!(task = %name, error = %error, "Task dispatch failed"),
        }
    }
}

/// Decode a caller-supplied reference and check its kind.
///
/// # Errors
///
/// - `BadRequest`: the reference is malformed
/// - `NotFound`: it names a record of another kind
pub fn key_for(reference: &Reference, kind: Kind) -> Result<EntityKey> {
    let key = reference.decode()?;
    if key.kind() != kind {
        return Err(ConferenceError::not_found(kind, reference.clone()));
    }
    Ok(key)
}

/// Reject a blank required field.
pub(crate) fn require(value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConferenceError::BadRequest(message.to_string()));
    }
    Ok(())
}
