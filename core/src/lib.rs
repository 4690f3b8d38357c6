//! # Conference Core
//!
//! Domain model and collaborator seams for the conference-management backend.
//!
//! This crate holds everything that does not perform I/O: the entity model,
//! keys and references, the error taxonomy, the Filter Compiler, and the traits
//! behind which the runtime reaches its collaborators.
//!
//! ## Core Concepts
//!
//! - **Entity**: a typed record (`Profile`, `Conference`, `ConferenceSession`,
//!   `Speaker`, `Wishlist`) stored under an [`key::EntityKey`]
//! - **Reference**: the opaque URL-safe form of a key handed to callers
//! - **Store**: [`store::EntityStore`], ancestor queries plus atomic,
//!   version-checked commits
//! - **Collaborators**: [`cache::Cache`], [`task_queue::TaskQueue`] and
//!   [`identity::IdentityResolver`], injected as trait objects
//!
//! ## Architecture Principles
//!
//! - Optimistic concurrency instead of locks
//! - Explicit dependency injection; no global state
//! - Query semantics defined once ([`store::Query::apply`]) and shared by every
//!   backend
//!
//! ## Example
//!
//! ```
//! use conference_core::filter::{compile, RawFilter};
//! use conference_core::key::Kind;
//!
//! let query = compile(&[RawFilter::new("CITY", "EQ", "Boston")])
//!     .unwrap()
//!     .into_query();
//! assert_eq!(query.kind, Kind::Conference);
//! ```

pub mod cache;
pub mod entity;
pub mod error;
pub mod filter;
pub mod identity;
pub mod key;
pub mod store;
pub mod task_queue;

pub use error::{ConferenceError, ErrorKind, Result};
pub use key::{EntityKey, Kind, Reference};

/// Re-exports for the common imports.
pub mod prelude {
    pub use crate::cache::{Cache, CacheError};
    pub use crate::entity::{
        Conference, ConferenceSession, Entity, EntityKind, Profile, PropertyValue, SessionType,
        Speaker, TeeShirtSize, Wishlist,
    };
    pub use crate::error::{ConferenceError, ErrorKind, Result};
    pub use crate::filter::{QueryPlan, RawFilter};
    pub use crate::identity::{CallerIdentity, IdentityResolver};
    pub use crate::key::{EntityKey, Kind, Reference};
    pub use crate::store::{
        EntityStore, Mutation, Precondition, Query, Record, Stored, StoreError, Version,
    };
    pub use crate::task_queue::{Task, TaskQueue, TaskQueueError};
}
