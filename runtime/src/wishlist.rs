//! Wishlist Manager: one ordered, duplicate-free session list per profile.

use crate::metrics;
use crate::retry::transact;
use crate::{ConferenceEnvironment, key_for};
use conference_core::entity::{ConferenceSession, PropertyValue, Wishlist};
use conference_core::error::{ConferenceError, Result};
use conference_core::identity::CallerIdentity;
use conference_core::key::{EntityKey, Kind, Reference};
use conference_core::store::{Mutation, Precondition, Predicate, Query, Stored, fetch_all};

/// Fixed id of the single wishlist under a profile.
pub const WISHLIST_ID: &str = "wishlist";

/// Key of a user's wishlist.
#[must_use]
pub fn wishlist_key(user_id: &str) -> EntityKey {
    crate::profiles::profile_key(user_id).child(Kind::Wishlist, WISHLIST_ID)
}

/// Remove `session` from every wishlist that holds it.
///
/// Each wishlist is its own transaction. Returns how many wishlists changed.
pub(crate) async fn prune_session(env: &ConferenceEnvironment, session: &Reference) -> Result<u64> {
    let query = Query::kind(Kind::Wishlist)
        .filter(Predicate::eq("sessions", PropertyValue::text(session.as_str())));
    let holders = fetch_all::<Wishlist>(env.store.as_ref(), query).await?;

    let mut pruned = 0;
    for holder in holders {
        let key = &holder.key;
        let changed = transact(&env.retry, "prune_wishlist", move || async move {
            let Some(mut stored) = env.find::<Wishlist>(key).await? else {
                return Ok(false);
            };
            let before = stored.value.sessions.len();
            stored.value.sessions.retain(|r| r != session);
            if stored.value.sessions.len() == before {
                return Ok(false);
            }
            env.store.commit(vec![stored.put_checked()]).await?;
            Ok(true)
        })
        .await?;
        if changed {
            pruned += 1;
        }
    }

    metrics::record_cascade(Kind::Wishlist, pruned);
    Ok(pruned)
}

/// Adds, removes and lists wishlist sessions.
#[derive(Clone)]
pub struct WishlistManager {
    env: ConferenceEnvironment,
}

impl WishlistManager {
    /// Create the manager.
    #[must_use]
    pub const fn new(env: ConferenceEnvironment) -> Self {
        Self { env }
    }

    /// Add a session to the caller's wishlist, creating the wishlist on first use.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: the session does not exist
    /// - `Conflict`: the session is already on the wishlist
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn add_session(&self, caller: &CallerIdentity, session: &Reference) -> Result<bool> {
        let stored = self.env.load::<ConferenceSession>(session).await?;
        let canonical = &stored.key.to_reference();
        let key = &wishlist_key(&caller.user_id);

        transact(&self.env.retry, "add_to_wishlist", move || async move {
            let (mut wishlist, precondition) = match self.env.find::<Wishlist>(key).await? {
                Some(stored) => (stored.value, Precondition::At(stored.version)),
                None => (Wishlist::default(), Precondition::Absent),
            };
            if wishlist.sessions.contains(canonical) {
                return Err(ConferenceError::Conflict(
                    "Session already in wishlist".to_string(),
                ));
            }
            wishlist.sessions.push(canonical.clone());
            self.env
                .store
                .commit(vec![Mutation::put(key.clone(), wishlist, precondition)])
                .await?;
            Ok(true)
        })
        .await
    }

    /// Remove a session from the caller's wishlist.
    ///
    /// Returns `false` when the session was not on it.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: the reference is not a session, or the caller has no wishlist
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn remove_session(&self, caller: &CallerIdentity, session: &Reference) -> Result<bool> {
        let canonical = &key_for(session, Kind::ConferenceSession)?.to_reference();
        let key = &wishlist_key(&caller.user_id);

        transact(&self.env.retry, "remove_from_wishlist", move || async move {
            let mut stored = self
                .env
                .find::<Wishlist>(key)
                .await?
                .ok_or_else(|| ConferenceError::not_found(Kind::Wishlist, key))?;
            let before = stored.value.sessions.len();
            stored.value.sessions.retain(|r| r != canonical);
            if stored.value.sessions.len() == before {
                return Ok(false);
            }
            self.env.store.commit(vec![stored.put_checked()]).await?;
            Ok(true)
        })
        .await
    }

    /// The caller's wishlist sessions in insertion order; empty without a wishlist.
    ///
    /// # Errors
    ///
    /// `Store` errors.
    pub async fn list(&self, caller: &CallerIdentity) -> Result<Vec<Stored<ConferenceSession>>> {
        match self.env.find::<Wishlist>(&wishlist_key(&caller.user_id)).await? {
            Some(stored) => self.env.resolve_all(&stored.value.sessions).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use conference_core::error::ErrorKind;
    use conference_core::store::{EntityStore, fetch};
    use conference_testing::caller;
    use conference_testing::fixtures::session;
    use conference_testing::mocks::{
        InMemoryCache, InMemoryEntityStore, RecordingTaskQueue, StaticIdentityResolver,
    };
    use std::sync::Arc;

    async fn setup() -> (WishlistManager, InMemoryEntityStore, Reference, Reference) {
        let store = InMemoryEntityStore::new();
        let conf = EntityKey::root(Kind::Profile, "org").child(Kind::Conference, "c");
        let a = conf.child(Kind::ConferenceSession, "a");
        let b = conf.child(Kind::ConferenceSession, "b");
        store
            .commit(vec![
                Mutation::put(a.clone(), session("A"), Precondition::Absent),
                Mutation::put(b.clone(), session("B"), Precondition::Absent),
            ])
            .await
            .unwrap();
        let env = ConferenceEnvironment::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryCache::new()),
            Arc::new(RecordingTaskQueue::new()),
            Arc::new(StaticIdentityResolver::new()),
        );
        (WishlistManager::new(env), store, a.to_reference(), b.to_reference())
    }

    #[tokio::test]
    async fn adding_twice_conflicts_and_keeps_one_entry() {
        let (wishlists, store, a, _) = setup().await;
        let alice = caller("alice");

        assert!(wishlists.add_session(&alice, &a).await.unwrap());
        let error = wishlists.add_session(&alice, &a).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);

        let stored = fetch::<Wishlist>(&store, &wishlist_key("alice")).await.unwrap().unwrap();
        assert_eq!(stored.value.sessions, vec![a]);
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let (wishlists, _, a, b) = setup().await;
        let alice = caller("alice");
        assert!(wishlists.list(&alice).await.unwrap().is_empty());

        wishlists.add_session(&alice, &b).await.unwrap();
        wishlists.add_session(&alice, &a).await.unwrap();

        let names: Vec<String> = wishlists
            .list(&alice)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.value.name)
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn remove_reports_absence_and_missing_wishlist() {
        let (wishlists, _, a, b) = setup().await;
        let alice = caller("alice");

        let error = wishlists.remove_session(&alice, &a).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);

        wishlists.add_session(&alice, &a).await.unwrap();
        assert!(!wishlists.remove_session(&alice, &b).await.unwrap());
        assert!(wishlists.remove_session(&alice, &a).await.unwrap());
        assert!(wishlists.list(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (wishlists, _, _, _) = setup().await;
        let missing = EntityKey::root(Kind::Profile, "org")
            .child(Kind::Conference, "c")
            .child(Kind::ConferenceSession, "zzz")
            .to_reference();

        let error = wishlists.add_session(&caller("alice"), &missing).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
