//! Speakers.
//!
//! Speakers are top-level records. Their session lists are maintained by
//! [`crate::linkage`]; this module never writes them.

use crate::retry::transact;
use crate::{ConferenceEnvironment, key_for};
use conference_core::entity::{PropertyValue, Speaker};
use conference_core::error::{ConferenceError, Result};
use conference_core::key::{EntityKey, Kind, Reference};
use conference_core::store::{Mutation, Precondition, Predicate, Query, Stored, Version, fetch_all};

/// Fields of a new speaker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewSpeaker {
    /// Display name.
    pub display_name: Option<String>,
    /// Contact email, required.
    pub main_email: String,
}

/// Fields that may change on a speaker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpeakerUpdate {
    /// New display name.
    pub display_name: Option<String>,
    /// New email; must not be blank.
    pub main_email: Option<String>,
}

const EMAIL_REQUIRED: &str = "Speaker 'mainEmail' field required";

/// Speaker creation, updates and reads.
#[derive(Clone)]
pub struct SpeakerDirectory {
    env: ConferenceEnvironment,
}

impl SpeakerDirectory {
    /// Create the directory.
    #[must_use]
    pub const fn new(env: ConferenceEnvironment) -> Self {
        Self { env }
    }

    /// Create a speaker with no sessions.
    ///
    /// # Errors
    ///
    /// `BadRequest` when the email is blank.
    #[tracing::instrument(skip(self, new_speaker))]
    pub async fn create_speaker(&self, new_speaker: NewSpeaker) -> Result<Stored<Speaker>> {
        crate::require(&new_speaker.main_email, EMAIL_REQUIRED)?;
        let speaker = Speaker {
            display_name: new_speaker.display_name,
            main_email: new_speaker.main_email,
            session_keys_to_speak_at: Vec::new(),
        };
        let key = EntityKey::allocate(Kind::Speaker, None);

        self.env
            .store
            .commit(vec![Mutation::put(key.clone(), speaker.clone(), Precondition::Absent)])
            .await?;
        tracing::info!(speaker = %key, "Speaker created");

        Ok(Stored {
            key,
            version: Version::FIRST,
            value: speaker,
        })
    }

    /// Apply `update` to a speaker.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference or blank email
    /// - `NotFound`: no such speaker
    #[tracing::instrument(skip(self, update))]
    pub async fn save_speaker(&self, speaker: &Reference, update: SpeakerUpdate) -> Result<Stored<Speaker>> {
        if let Some(email) = &update.main_email {
            crate::require(email, EMAIL_REQUIRED)?;
        }
        let update = &update;
        transact(&self.env.retry, "save_speaker", move || async move {
            let mut stored = self.env.load::<Speaker>(speaker).await?;
            if let Some(name) = &update.display_name {
                stored.value.display_name = Some(name.clone());
            }
            if let Some(email) = &update.main_email {
                stored.value.main_email.clone_from(email);
            }
            let updated = Stored {
                key: stored.key.clone(),
                version: stored.version.next(),
                value: stored.value.clone(),
            };
            self.env.store.commit(vec![stored.put_checked()]).await?;
            Ok(updated)
        })
        .await
    }

    /// One speaker.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed reference, `NotFound` if absent.
    pub async fn get_speaker(&self, speaker: &Reference) -> Result<Stored<Speaker>> {
        self.env.load(speaker).await
    }

    /// Every speaker, by email.
    ///
    /// # Errors
    ///
    /// `Store` errors.
    pub async fn list_speakers(&self) -> Result<Vec<Stored<Speaker>>> {
        Ok(fetch_all(self.env.store.as_ref(), Query::kind(Kind::Speaker).order_by("mainEmail")).await?)
    }

    /// The speaker assigned to `session`.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: not a session reference, or no speaker lists the session
    pub async fn featured_speaker(&self, session: &Reference) -> Result<Stored<Speaker>> {
        let canonical = key_for(session, Kind::ConferenceSession)?.to_reference();
        let query = Query::kind(Kind::Speaker).filter(Predicate::eq(
            "sessionKeysToSpeakAt",
            PropertyValue::text(canonical.as_str()),
        ));
        fetch_all::<Speaker>(self.env.store.as_ref(), query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ConferenceError::not_found(Kind::Speaker, session.clone()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::linkage::LinkageManager;
    use crate::sessions::NewSession;
    use conference_core::error::ErrorKind;
    use conference_core::store::EntityStore;
    use conference_testing::caller;
    use conference_testing::fixtures::conference;
    use conference_testing::mocks::{
        InMemoryCache, InMemoryEntityStore, RecordingTaskQueue, StaticIdentityResolver,
    };
    use std::sync::Arc;

    fn env(store: &InMemoryEntityStore) -> ConferenceEnvironment {
        ConferenceEnvironment::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryCache::new()),
            Arc::new(RecordingTaskQueue::new()),
            Arc::new(StaticIdentityResolver::new()),
        )
    }

    #[tokio::test]
    async fn create_requires_email() {
        let store = InMemoryEntityStore::new();
        let speakers = SpeakerDirectory::new(env(&store));

        let error = speakers.create_speaker(NewSpeaker::default()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::BadRequest);

        let created = speakers
            .create_speaker(NewSpeaker {
                display_name: Some("Ada".to_string()),
                main_email: "ada@example.com".to_string(),
            })
            .await
            .unwrap();
        assert!(created.value.session_keys_to_speak_at.is_empty());
        assert_eq!(speakers.list_speakers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_updates_only_given_fields() {
        let store = InMemoryEntityStore::new();
        let speakers = SpeakerDirectory::new(env(&store));
        let created = speakers
            .create_speaker(NewSpeaker {
                display_name: Some("Ada".to_string()),
                main_email: "ada@example.com".to_string(),
            })
            .await
            .unwrap();
        let reference = created.key.to_reference();

        let saved = speakers
            .save_speaker(
                &reference,
                SpeakerUpdate {
                    display_name: Some("Ada L.".to_string()),
                    main_email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(saved.value.display_name.as_deref(), Some("Ada L."));
        assert_eq!(saved.value.main_email, "ada@example.com");
        assert_eq!(speakers.get_speaker(&reference).await.unwrap().value, saved.value);

        let blank = speakers
            .save_speaker(
                &reference,
                SpeakerUpdate {
                    main_email: Some(String::new()),
                    ..SpeakerUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(blank.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn featured_speaker_follows_the_session_link() {
        let store = InMemoryEntityStore::new();
        let env = env(&store);
        let speakers = SpeakerDirectory::new(env.clone());
        let linkage = LinkageManager::new(env);
        let conference_key = EntityKey::root(Kind::Profile, "org").child(Kind::Conference, "c");
        store
            .commit(vec![Mutation::put(
                conference_key.clone(),
                conference("C", "org", 10),
                Precondition::Absent,
            )])
            .await
            .unwrap();
        let ada = speakers
            .create_speaker(NewSpeaker {
                display_name: None,
                main_email: "ada@example.com".to_string(),
            })
            .await
            .unwrap();

        let org = caller("org");
        let with_speaker = linkage
            .create_session(
                &org,
                &conference_key.to_reference(),
                NewSession {
                    name: "Intro".to_string(),
                    speaker: Some(ada.key.to_reference()),
                    ..NewSession::default()
                },
            )
            .await
            .unwrap();
        let without = linkage
            .create_session(
                &org,
                &conference_key.to_reference(),
                NewSession {
                    name: "Panel".to_string(),
                    ..NewSession::default()
                },
            )
            .await
            .unwrap();

        let featured = speakers
            .featured_speaker(&with_speaker.key.to_reference())
            .await
            .unwrap();
        assert_eq!(featured.key, ada.key);

        let error = speakers
            .featured_speaker(&without.key.to_reference())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
