//! Entity store abstraction with optimistic concurrency.
//!
//! This module defines the persistence seam of the conference backend: a
//! key-addressed record store with ancestor-scoped queries and atomic,
//! version-checked multi-record commits.
//!
//! # Transactions
//!
//! A unit of work reads the records it needs (each read carries a [`Version`]),
//! decides what to write, and submits every write in a single
//! [`EntityStore::commit`]. Each [`Mutation`] states a [`Precondition`] on the
//! record it touches; if any precondition no longer holds, nothing is applied
//! and the commit fails with [`StoreError::ConcurrencyConflict`]. The caller
//! re-reads and tries again. There are no locks held between reads and the
//! commit.
//!
//! # Implementations
//!
//! - `PostgresEntityStore` (in `conference-postgres`): production implementation
//! - `InMemoryEntityStore` (in `conference-testing`): fast, deterministic tests
//!
//! Both evaluate [`Query`] predicates and ordering through [`Query::apply`], so
//! query semantics cannot drift between backends.
//!
//! # Example
//!
//! ```no_run
//! use conference_core::entity::Conference;
//! use conference_core::key::EntityKey;
//! use conference_core::store::{fetch, EntityStore, Mutation, Precondition, StoreError};
//!
//! async fn take_seat(store: &dyn EntityStore, key: &EntityKey) -> Result<(), StoreError> {
//!     let Some(mut conference) = fetch::<Conference>(store, key).await? else {
//!         return Ok(());
//!     };
//!     conference.value.seats_available -= 1;
//!     store
//!         .commit(vec![Mutation::put(key.clone(), conference.value, Precondition::At(conference.version))])
//!         .await
//! }
//! ```

use crate::entity::{Entity, EntityKind, PropertyValue};
use crate::key::{EntityKey, Kind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EntityStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A commit precondition did not hold: another writer got there first.
    #[error("Concurrency conflict on {key}: expected {expected}, found {}", found(.actual))]
    ConcurrencyConflict {
        /// The record whose precondition failed.
        key: EntityKey,
        /// What the commit expected.
        expected: Precondition,
        /// The version found, `None` if the record does not exist.
        actual: Option<Version>,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[allow(clippy::ref_option)]
fn found(actual: &Option<Version>) -> String {
    actual.map_or_else(|| "absent".to_string(), |version| format!("version {version}"))
}

impl StoreError {
    /// True for errors a fresh read-modify-write attempt may resolve.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Record version for optimistic concurrency control.
///
/// The first stored version of a record is 1; each successful write increments
/// it. A deleted and re-created record starts again at 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly inserted record.
    pub const FIRST: Self = Self(1);

    /// Create a version from its number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The version after one more write.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Condition a record must satisfy for a [`Mutation`] to apply.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// No check (last writer wins).
    Any,
    /// The record must not exist.
    Absent,
    /// The record must exist at exactly this version.
    At(Version),
}

impl Precondition {
    /// Check against the current version of a record (`None` = absent).
    #[must_use]
    pub fn holds(self, current: Option<Version>) -> bool {
        match self {
            Self::Any => true,
            Self::Absent => current.is_none(),
            Self::At(expected) => current == Some(expected),
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any version"),
            Self::Absent => f.write_str("absent"),
            Self::At(version) => write!(f, "version {version}"),
        }
    }
}

/// A single write inside a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or replace a record.
    Put {
        /// Record key.
        key: EntityKey,
        /// New value.
        entity: Entity,
        /// Required state of the record before the write.
        precondition: Precondition,
    },
    /// Remove a record.
    Delete {
        /// Record key.
        key: EntityKey,
        /// Required state of the record before the delete.
        precondition: Precondition,
    },
}

impl Mutation {
    /// Build a put from any typed entity.
    #[must_use]
    pub fn put(key: EntityKey, entity: impl Into<Entity>, precondition: Precondition) -> Self {
        Self::Put {
            key,
            entity: entity.into(),
            precondition,
        }
    }

    /// Build a delete.
    #[must_use]
    pub const fn delete(key: EntityKey, precondition: Precondition) -> Self {
        Self::Delete { key, precondition }
    }

    /// Key this mutation touches.
    #[must_use]
    pub const fn key(&self) -> &EntityKey {
        match self {
            Self::Put { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    /// Precondition of this mutation.
    #[must_use]
    pub const fn precondition(&self) -> Precondition {
        match self {
            Self::Put { precondition, .. } | Self::Delete { precondition, .. } => *precondition,
        }
    }
}

/// A stored record: key, current version and value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Record key.
    pub key: EntityKey,
    /// Current version.
    pub version: Version,
    /// Stored value.
    pub entity: Entity,
}

impl Record {
    /// Convert into a typed record, `None` if the entity is another kind.
    #[must_use]
    pub fn into_typed<T: EntityKind>(self) -> Option<Stored<T>> {
        let Self {
            key,
            version,
            entity,
        } = self;
        T::from_entity(entity).map(|value| Stored {
            key,
            version,
            value,
        })
    }
}

/// A typed record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stored<T> {
    /// Record key.
    pub key: EntityKey,
    /// Version the value was read at.
    pub version: Version,
    /// The value.
    pub value: T,
}

impl<T: EntityKind> Stored<T> {
    /// A put that only applies if the record is still at the version it was read at.
    #[must_use]
    pub fn put_checked(self) -> Mutation {
        Mutation::put(self.key, self.value, Precondition::At(self.version))
    }

    /// A delete that only applies if the record is still at the version it was read at.
    #[must_use]
    pub fn delete_checked(&self) -> Mutation {
        Mutation::delete(self.key.clone(), Precondition::At(self.version))
    }
}

/// Comparison operator of a query predicate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`; on a list property: contains.
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `!=`
    Ne,
}

impl Operator {
    /// Everything except equality restricts a range.
    #[must_use]
    pub const fn is_inequality(self) -> bool {
        !matches!(self, Self::Eq)
    }

    /// Symbol used in logs, e.g. `">="`.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Ne => "!=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
            Self::Ne => ordering != Ordering::Equal,
        }
    }
}

/// `property <op> value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    /// camelCase property name.
    pub property: String,
    /// Operator.
    pub operator: Operator,
    /// Right-hand side.
    pub value: PropertyValue,
}

impl Predicate {
    /// Build a predicate.
    #[must_use]
    pub fn new(property: impl Into<String>, operator: Operator, value: PropertyValue) -> Self {
        Self {
            property: property.into(),
            operator,
            value,
        }
    }

    /// Shorthand for an equality predicate.
    #[must_use]
    pub fn eq(property: impl Into<String>, value: PropertyValue) -> Self {
        Self::new(property, Operator::Eq, value)
    }

    /// Evaluate against an entity.
    ///
    /// A list property matches when any element matches. Absent properties and
    /// values of another type never match.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        match entity.property(&self.property) {
            PropertyValue::List(items) => items.iter().any(|item| self.matches_value(item)),
            value => self.matches_value(&value),
        }
    }

    fn matches_value(&self, value: &PropertyValue) -> bool {
        value
            .compare(&self.value)
            .is_some_and(|ordering| self.operator.accepts(ordering))
    }
}

/// Sort direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    /// camelCase property name.
    pub property: String,
    /// Direction.
    pub direction: Direction,
}

impl SortKey {
    /// Ascending sort on a property.
    #[must_use]
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Ascending,
        }
    }
}

/// A query over one kind, optionally scoped to the descendants of a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// Kind to return.
    pub kind: Kind,
    /// Only descendants of this key.
    pub ancestor: Option<EntityKey>,
    /// Conjunction of predicates.
    pub predicates: Vec<Predicate>,
    /// Sort keys, applied in order.
    pub order: Vec<SortKey>,
}

impl Query {
    /// All records of a kind.
    #[must_use]
    pub const fn kind(kind: Kind) -> Self {
        Self {
            kind,
            ancestor: None,
            predicates: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Restrict to descendants of `ancestor`.
    #[must_use]
    pub fn ancestor(mut self, ancestor: EntityKey) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    /// Add a predicate.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add an ascending sort key.
    #[must_use]
    pub fn order_by(mut self, property: impl Into<String>) -> Self {
        self.order.push(SortKey::ascending(property));
        self
    }

    /// True when a record belongs in the result set (ordering aside).
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        record.key.kind() == self.kind
            && self
                .ancestor
                .as_ref()
                .is_none_or(|ancestor| record.key.is_descendant_of(ancestor))
            && self.predicates.iter().all(|p| p.matches(&record.entity))
    }

    /// Filter and sort candidate records.
    ///
    /// Backends fetch a superset (typically every record of the kind under the
    /// ancestor) and hand it here. Ties keep key order, so results are stable.
    #[must_use]
    pub fn apply(&self, candidates: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut records: Vec<Record> = candidates.into_iter().filter(|r| self.matches(r)).collect();
        records.sort_by(|a, b| {
            self.order
                .iter()
                .map(|sort| {
                    let ordering = a
                        .entity
                        .property(&sort.property)
                        .sort_cmp(&b.entity.property(&sort.property));
                    match sort.direction {
                        Direction::Ascending => ordering,
                        Direction::Descending => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.key.cmp(&b.key))
        });
        records
    }
}

/// Key-addressed record store with ancestor queries and atomic commits.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store handle is shared by every
/// concurrently running request.
///
/// # Dyn Compatibility
///
/// Methods return [`StoreFuture`] (`Pin<Box<dyn Future>>`) rather than using
/// `async fn`, so the store can be injected as `Arc<dyn EntityStore>`.
pub trait EntityStore: Send + Sync {
    /// Load one record.
    ///
    /// # Errors
    ///
    /// - `Database`: backend failure
    /// - `Serialization`: stored value could not be decoded
    fn get<'a>(&'a self, key: &'a EntityKey) -> StoreFuture<'a, Option<Record>>;

    /// Load several records, preserving input order.
    ///
    /// The default implementation issues one [`get`](Self::get) per key.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    fn get_many<'a>(&'a self, keys: &'a [EntityKey]) -> StoreFuture<'a, Vec<Option<Record>>> {
        Box::pin(async move {
            let mut records = Vec::with_capacity(keys.len());
            for key in keys {
                records.push(self.get(key).await?);
            }
            Ok(records)
        })
    }

    /// Run a query. Results are ordered by `query.order`, then by key.
    ///
    /// # Errors
    ///
    /// - `Database`: backend failure
    /// - `Serialization`: a stored value could not be decoded
    fn query(&self, query: Query) -> StoreFuture<'_, Vec<Record>>;

    /// Atomically apply a batch of mutations.
    ///
    /// Either every mutation applies or none does. A batch may not touch the
    /// same key twice.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: a precondition failed; nothing was written
    /// - `Database`: backend failure
    /// - `Serialization`: a value could not be encoded
    fn commit(&self, mutations: Vec<Mutation>) -> StoreFuture<'_, ()>;
}

/// Load a typed record. A record of another kind under the key reads as `None`.
///
/// # Errors
///
/// Propagates [`EntityStore::get`] errors.
pub async fn fetch<T: EntityKind>(
    store: &dyn EntityStore,
    key: &EntityKey,
) -> Result<Option<Stored<T>>, StoreError> {
    Ok(store.get(key).await?.and_then(Record::into_typed))
}

/// Run a query and keep the records of type `T`.
///
/// # Errors
///
/// Propagates [`EntityStore::query`] errors.
pub async fn fetch_all<T: EntityKind>(
    store: &dyn EntityStore,
    query: Query,
) -> Result<Vec<Stored<T>>, StoreError> {
    Ok(store
        .query(query)
        .await?
        .into_iter()
        .filter_map(Record::into_typed)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Conference, Wishlist};
    use crate::key::Reference;

    fn conference(name: &str, month: u32, topics: &[&str]) -> Entity {
        Entity::Conference(Conference {
            name: name.to_string(),
            description: None,
            organizer_user_id: "alice".to_string(),
            topics: topics.iter().map(ToString::to_string).collect(),
            city: None,
            start_date: None,
            month,
            end_date: None,
            max_attendees: 10,
            seats_available: 10,
        })
    }

    fn record(id: &str, entity: Entity) -> Record {
        Record {
            key: EntityKey::root(Kind::Profile, "alice").child(entity.kind(), id),
            version: Version::FIRST,
            entity,
        }
    }

    #[test]
    fn concurrency_conflict_error_display() {
        let error = StoreError::ConcurrencyConflict {
            key: EntityKey::root(Kind::Speaker, "s1"),
            expected: Precondition::At(Version::new(5)),
            actual: Some(Version::new(7)),
        };

        let display = format!("{error}");
        assert!(display.contains("Speaker:s1"));
        assert!(display.contains("expected version 5"));
        assert!(display.contains("found version 7"));
        assert!(error.is_conflict());

        let missing = StoreError::ConcurrencyConflict {
            key: EntityKey::root(Kind::Speaker, "s1"),
            expected: Precondition::At(Version::new(5)),
            actual: None,
        };
        assert!(format!("{missing}").ends_with("found absent"));
    }

    #[test]
    fn preconditions() {
        assert!(Precondition::Any.holds(None));
        assert!(Precondition::Absent.holds(None));
        assert!(!Precondition::Absent.holds(Some(Version::FIRST)));
        assert!(Precondition::At(Version::FIRST).holds(Some(Version::FIRST)));
        assert!(!Precondition::At(Version::FIRST).holds(Some(Version::FIRST.next())));
        assert!(!Precondition::At(Version::FIRST).holds(None));
    }

    #[test]
    fn list_properties_match_any_element() {
        let entity = conference("A", 3, &["Rust", "Go"]);
        assert!(Predicate::eq("topics", PropertyValue::text("Go")).matches(&entity));
        assert!(!Predicate::eq("topics", PropertyValue::text("Java")).matches(&entity));

        let wishlist = Entity::Wishlist(Wishlist {
            sessions: vec![Reference::new("abc")],
        });
        assert!(Predicate::eq("sessions", PropertyValue::text("abc")).matches(&wishlist));
    }

    #[test]
    fn missing_properties_never_match() {
        let entity = conference("A", 3, &[]);
        assert!(!Predicate::new("city", Operator::Ne, PropertyValue::text("Paris")).matches(&entity));
    }

    #[test]
    fn apply_filters_and_orders() {
        let query = Query::kind(Kind::Conference)
            .filter(Predicate::new("month", Operator::Gt, PropertyValue::Int(3)))
            .order_by("month")
            .order_by("name");

        let results = query.apply(vec![
            record("1", conference("Zeta", 6, &[])),
            record("2", conference("Alpha", 6, &[])),
            record("3", conference("Beta", 4, &[])),
            record("4", conference("Early", 2, &[])),
        ]);

        let names: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.into_typed::<Conference>())
            .map(|c| c.value.name)
            .collect();
        assert_eq!(names, vec!["Beta", "Alpha", "Zeta"]);
    }

    #[test]
    fn ancestor_scope_excludes_other_parents() {
        let query = Query::kind(Kind::Conference).ancestor(EntityKey::root(Kind::Profile, "bob"));
        assert!(query.apply(vec![record("1", conference("A", 1, &[]))]).is_empty());
    }
}
