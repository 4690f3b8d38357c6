//! Attendee profiles.
//!
//! A profile is keyed by the caller's user id and created lazily the first time
//! an operation needs it: on first read, first save, first registration, or
//! when the caller creates a conference (the profile is the conference's
//! parent).

use crate::ConferenceEnvironment;
use crate::retry::transact;
use conference_core::entity::{Profile, TeeShirtSize};
use conference_core::error::Result;
use conference_core::identity::CallerIdentity;
use conference_core::key::{EntityKey, Kind};
use conference_core::store::{Mutation, Precondition, Query, fetch_all};

/// Key of a user's profile.
#[must_use]
pub fn profile_key(user_id: &str) -> EntityKey {
    EntityKey::root(Kind::Profile, user_id)
}

/// Fields a caller may change on their profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// New display name.
    pub display_name: Option<String>,
    /// New shirt size.
    pub tee_shirt_size: Option<TeeShirtSize>,
}

/// A profile as read inside a transaction, with the precondition a write of it
/// must carry.
pub(crate) struct LoadedProfile {
    pub key: EntityKey,
    pub profile: Profile,
    pub precondition: Precondition,
}

impl LoadedProfile {
    pub(crate) fn put(self) -> Mutation {
        Mutation::put(self.key, self.profile, self.precondition)
    }
}

/// Read the caller's profile, or the default profile a first write would create.
pub(crate) async fn load_or_default(
    env: &ConferenceEnvironment,
    caller: &CallerIdentity,
) -> Result<LoadedProfile> {
    let key = profile_key(&caller.user_id);
    Ok(match env.find::<Profile>(&key).await? {
        Some(stored) => LoadedProfile {
            key,
            profile: stored.value,
            precondition: Precondition::At(stored.version),
        },
        None => LoadedProfile {
            key,
            profile: Profile {
                display_name: caller.nickname.clone(),
                main_email: caller.email.clone(),
                tee_shirt_size: TeeShirtSize::NotSpecified,
                conference_keys_to_attend: Vec::new(),
            },
            precondition: Precondition::Absent,
        },
    })
}

/// Profile reads and updates.
#[derive(Clone)]
pub struct ProfileDirectory {
    env: ConferenceEnvironment,
}

impl ProfileDirectory {
    /// Create the directory.
    #[must_use]
    pub const fn new(env: ConferenceEnvironment) -> Self {
        Self { env }
    }

    /// The caller's profile, created on first access.
    ///
    /// # Errors
    ///
    /// `Transient` or `Store` errors from the underlying transaction.
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn get_profile(&self, caller: &CallerIdentity) -> Result<Profile> {
        transact(&self.env.retry, "get_profile", move || async move {
            let loaded = load_or_default(&self.env, caller).await?;
            let profile = loaded.profile.clone();
            if loaded.precondition == Precondition::Absent {
                self.env.store.commit(vec![loaded.put()]).await?;
                tracing::info!("Profile created");
            }
            Ok(profile)
        })
        .await
    }

    /// Apply the given fields to the caller's profile.
    ///
    /// # Errors
    ///
    /// `Transient` or `Store` errors from the underlying transaction.
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn save_profile(&self, caller: &CallerIdentity, update: ProfileUpdate) -> Result<Profile> {
        let update = &update;
        transact(&self.env.retry, "save_profile", move || async move {
            let mut loaded = load_or_default(&self.env, caller).await?;
            if let Some(name) = &update.display_name {
                loaded.profile.display_name.clone_from(name);
            }
            if let Some(size) = update.tee_shirt_size {
                loaded.profile.tee_shirt_size = size;
            }
            let profile = loaded.profile.clone();
            self.env.store.commit(vec![loaded.put()]).await?;
            Ok(profile)
        })
        .await
    }

    /// Every profile, in user-id order.
    ///
    /// # Errors
    ///
    /// `Store` errors from the query.
    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let profiles = fetch_all::<Profile>(self.env.store.as_ref(), Query::kind(Kind::Profile)).await?;
        Ok(profiles.into_iter().map(|stored| stored.value).collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use conference_testing::caller;
    use conference_testing::mocks::{
        InMemoryCache, InMemoryEntityStore, RecordingTaskQueue, StaticIdentityResolver,
    };
    use std::sync::Arc;

    fn directory() -> (ProfileDirectory, InMemoryEntityStore) {
        let store = InMemoryEntityStore::new();
        let env = ConferenceEnvironment::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryCache::new()),
            Arc::new(RecordingTaskQueue::new()),
            Arc::new(StaticIdentityResolver::new()),
        );
        (ProfileDirectory::new(env), store)
    }

    #[tokio::test]
    async fn first_read_creates_default_profile() {
        let (profiles, store) = directory();
        let alice = caller("alice");

        let profile = profiles.get_profile(&alice).await.unwrap();

        assert_eq!(profile.display_name, "alice");
        assert_eq!(profile.main_email, "alice@example.com");
        assert_eq!(profile.tee_shirt_size, TeeShirtSize::NotSpecified);
        assert!(store.contains(&profile_key("alice")));

        profiles.get_profile(&alice).await.unwrap();
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn save_applies_only_given_fields() {
        let (profiles, _) = directory();
        let alice = caller("alice");

        profiles
            .save_profile(
                &alice,
                ProfileUpdate {
                    tee_shirt_size: Some(TeeShirtSize::MM),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        let profile = profiles
            .save_profile(
                &alice,
                ProfileUpdate {
                    display_name: Some("Alice A.".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(profile.display_name, "Alice A.");
        assert_eq!(profile.tee_shirt_size, TeeShirtSize::MM);
        assert_eq!(profiles.list_profiles().await.unwrap(), vec![profile]);
    }
}
