//! `PostgreSQL` entity store for the conference backend.
//!
//! [`PostgresEntityStore`] implements [`EntityStore`] over a single table:
//!
//! ```sql
//! CREATE TABLE entities (
//!     reference  TEXT PRIMARY KEY,     -- Reference of the key
//!     kind       TEXT NOT NULL,
//!     ancestry   TEXT[] NOT NULL,      -- References of every ancestor
//!     version    BIGINT NOT NULL,
//!     body       JSONB NOT NULL,       -- the serialized Entity
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! Commits run in one database transaction. Every touched row is locked with
//! `SELECT ... FOR UPDATE` in key order, the preconditions are checked against
//! the locked versions, and only then are the writes applied. Two writers
//! inserting the same new key collide on the primary key instead; that, and
//! serialization or deadlock failures, surface as
//! [`StoreError::ConcurrencyConflict`] so callers retry them like any other
//! lost race.
//!
//! Queries select candidates by kind (and ancestor) in SQL and evaluate
//! predicates and ordering in-process with [`Query::apply`], so the results
//! match every other store exactly.
//!
//! # Example
//!
//! ```no_run
//! use conference_postgres::PostgresEntityStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresEntityStore::connect(
//!     "postgres://localhost/conference",
//!     10,
//!     Duration::from_secs(30),
//! )
//! .await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use conference_core::entity::Entity;
use conference_core::key::{EntityKey, Reference};
use conference_core::store::{
    EntityStore, Mutation, Precondition, Query, Record, StoreError, StoreFuture, Version,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;

/// Conflicting commits, by cause.
pub const STORE_CONFLICTS_TOTAL: &str = "conference_store_conflicts_total";

// unique_violation, serialization_failure, deadlock_detected
const CONFLICT_CODES: [&str; 3] = ["23505", "40001", "40P01"];

type Row = (String, i64, serde_json::Value);

/// `PostgreSQL`-backed [`EntityStore`].
#[derive(Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if the connection fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Use an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `entities` table and its indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load(&self, key: &EntityKey) -> Result<Option<Record>, StoreError> {
        let row: Option<Row> =
            sqlx::query_as("SELECT reference, version, body FROM entities WHERE reference = $1")
                .bind(key.to_reference().as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;
        row.map(decode_row).transpose()
    }

    async fn load_many(&self, keys: &[EntityKey]) -> Result<Vec<Option<Record>>, StoreError> {
        let references: Vec<String> = keys.iter().map(|k| k.to_reference().as_str().to_string()).collect();
        let rows: Vec<Row> =
            sqlx::query_as("SELECT reference, version, body FROM entities WHERE reference = ANY($1)")
                .bind(&references)
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;

        let mut found: HashMap<EntityKey, Record> = rows
            .into_iter()
            .map(|row| decode_row(row).map(|record| (record.key.clone(), record)))
            .collect::<Result<_, _>>()?;
        Ok(keys.iter().map(|key| found.remove(key)).collect())
    }

    async fn run_query(&self, query: Query) -> Result<Vec<Record>, StoreError> {
        let rows: Vec<Row> = match &query.ancestor {
            Some(ancestor) => sqlx::query_as(
                "SELECT reference, version, body FROM entities WHERE kind = $1 AND $2 = ANY(ancestry)",
            )
            .bind(query.kind.as_str())
            .bind(ancestor.to_reference().as_str())
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as("SELECT reference, version, body FROM entities WHERE kind = $1")
                .bind(query.kind.as_str())
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(database_error)?;

        let candidates = rows
            .into_iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(query.apply(candidates))
    }

    async fn apply(&self, mut mutations: Vec<Mutation>) -> Result<(), StoreError> {
        // A fixed lock order keeps concurrent commits from deadlocking.
        mutations.sort_by(|a, b| a.key().cmp(b.key()));
        if let Some(pair) = mutations.windows(2).find(|pair| pair[0].key() == pair[1].key()) {
            return Err(StoreError::Database(format!(
                "Commit touches {} more than once",
                pair[0].key()
            )));
        }

        let mut tx = self.pool.begin().await.map_err(database_error)?;
        for mutation in mutations {
            let key = mutation.key().clone();
            let expected = mutation.precondition();
            let current = lock_version(&mut tx, &key)
                .await
                .map_err(|e| conflict_or_database(&key, expected, e))?;

            if !expected.holds(current) {
                metrics::counter!(STORE_CONFLICTS_TOTAL, "cause" => "precondition").increment(1);
                tracing::debug!(key = %key, %expected, ?current, "Commit precondition failed");
                return Err(StoreError::ConcurrencyConflict {
                    key,
                    expected,
                    actual: current,
                });
            }

            write(&mut tx, mutation, current)
                .await
                .map_err(|e| conflict_or_database(&key, expected, e))?;
        }

        tx.commit().await.map_err(database_error)
    }
}

async fn lock_version(
    tx: &mut Transaction<'_, Postgres>,
    key: &EntityKey,
) -> Result<Option<Version>, WriteError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT version FROM entities WHERE reference = $1 FOR UPDATE")
            .bind(key.to_reference().as_str())
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row.map(|(version,)| to_version(version)).transpose()?)
}

async fn write(
    tx: &mut Transaction<'_, Postgres>,
    mutation: Mutation,
    current: Option<Version>,
) -> Result<(), WriteError> {
    match mutation {
        Mutation::Put { key, entity, .. } => {
            let body = serde_json::to_value(&entity)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let reference = key.to_reference();
            match current {
                Some(version) => {
                    sqlx::query(
                        "UPDATE entities SET version = $2, body = $3, updated_at = now() WHERE reference = $1",
                    )
                    .bind(reference.as_str())
                    .bind(from_version(version.next())?)
                    .bind(body)
                    .execute(&mut **tx)
                    .await?;
                }
                None => {
                    let ancestry: Vec<String> = key
                        .ancestors()
                        .iter()
                        .map(|a| a.to_reference().as_str().to_string())
                        .collect();
                    sqlx::query(
                        "INSERT INTO entities (reference, kind, ancestry, version, body) VALUES ($1, $2, $3, $4, $5)",
                    )
                    .bind(reference.as_str())
                    .bind(key.kind().as_str())
                    .bind(&ancestry)
                    .bind(from_version(Version::FIRST)?)
                    .bind(body)
                    .execute(&mut **tx)
                    .await?;
                }
            }
        }
        Mutation::Delete { key, .. } => {
            sqlx::query("DELETE FROM entities WHERE reference = $1")
                .bind(key.to_reference().as_str())
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

/// Failure inside a commit, before it is classified.
enum WriteError {
    Sql(sqlx::Error),
    Store(StoreError),
}

impl From<sqlx::Error> for WriteError {
    fn from(error: sqlx::Error) -> Self {
        Self::Sql(error)
    }
}

impl From<StoreError> for WriteError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

fn conflict_or_database(key: &EntityKey, expected: Precondition, error: WriteError) -> StoreError {
    let error = match error {
        WriteError::Store(error) => return error,
        WriteError::Sql(error) => error,
    };
    let code = match &error {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    };
    match code {
        Some(code) if CONFLICT_CODES.contains(&code.as_str()) => {
            metrics::counter!(STORE_CONFLICTS_TOTAL, "cause" => code).increment(1);
            StoreError::ConcurrencyConflict {
                key: key.clone(),
                expected,
                actual: None,
            }
        }
        _ => database_error(error),
    }
}

fn database_error(error: sqlx::Error) -> StoreError {
    StoreError::Database(error.to_string())
}

fn decode_row((reference, version, body): Row) -> Result<Record, StoreError> {
    let key = Reference::new(reference)
        .decode()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let entity: Entity =
        serde_json::from_value(body).map_err(|e| StoreError::Serialization(format!("{key}: {e}")))?;
    Ok(Record {
        key,
        version: to_version(version)?,
        entity,
    })
}

fn to_version(value: i64) -> Result<Version, StoreError> {
    u64::try_from(value)
        .map(Version::new)
        .map_err(|_| StoreError::Serialization(format!("Negative version {value}")))
}

fn from_version(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value())
        .map_err(|_| StoreError::Serialization(format!("Version {version} exceeds i64::MAX")))
}

impl EntityStore for PostgresEntityStore {
    fn get<'a>(&'a self, key: &'a EntityKey) -> StoreFuture<'a, Option<Record>> {
        Box::pin(self.load(key))
    }

    fn get_many<'a>(&'a self, keys: &'a [EntityKey]) -> StoreFuture<'a, Vec<Option<Record>>> {
        Box::pin(self.load_many(keys))
    }

    fn query(&self, query: Query) -> StoreFuture<'_, Vec<Record>> {
        Box::pin(self.run_query(query))
    }

    fn commit(&self, mutations: Vec<Mutation>) -> StoreFuture<'_, ()> {
        Box::pin(self.apply(mutations))
    }
}
