//! Linkage Manager: session/speaker links and deletion cascades.
//!
//! A session's `speaker_key` and its speaker's `session_keys_to_speak_at`
//! always agree. Every operation that changes one side writes the other side in
//! the same commit.
//!
//! Deletions cascade record by record instead:
//!
//! 1. sessions: pruned from every wishlist, detached from their speaker, deleted
//! 2. profiles: the conference removed from every attendance list
//! 3. the conference itself
//!
//! Each step is its own retried transaction and tolerates records that an
//! earlier, interrupted run already handled, so re-running a cascade finishes
//! the job. Sessions go before the conference, so a partial run never leaves a
//! session under a deleted conference.

use crate::announcement::AnnouncementCache;
use crate::metrics;
use crate::retry::transact;
use crate::sessions::NewSession;
use crate::wishlist::prune_session;
use crate::{ConferenceEnvironment, key_for};
use conference_core::entity::{Conference, ConferenceSession, Profile, PropertyValue, Speaker};
use conference_core::error::{ConferenceError, Result};
use conference_core::identity::CallerIdentity;
use conference_core::key::{EntityKey, Kind, Reference};
use conference_core::store::{Mutation, Precondition, Predicate, Query, Stored, Version, fetch_all};
use conference_core::task_queue::Task;
use futures::future::try_join_all;

/// Maintains speaker links and runs deletion cascades.
#[derive(Clone)]
pub struct LinkageManager {
    env: ConferenceEnvironment,
    announcements: AnnouncementCache,
}

impl LinkageManager {
    /// Create the manager.
    #[must_use]
    pub fn new(env: ConferenceEnvironment) -> Self {
        Self {
            announcements: AnnouncementCache::new(env.clone()),
            env,
        }
    }

    /// Create a session in a conference the caller organizes.
    ///
    /// With a speaker, the session and the speaker's updated session list are
    /// written in one commit, and a `set_speaker_and_sessions` task is
    /// dispatched for the `(speaker, conference)` pair.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: blank name, bad date/time, malformed reference
    /// - `NotFound`: no such conference or speaker
    /// - `Unauthorized`: the caller does not organize the conference
    /// - `Conflict`: the speaker already lists the new session
    #[tracing::instrument(skip(self, caller, new_session), fields(user = %caller.user_id))]
    pub async fn create_session(
        &self,
        caller: &CallerIdentity,
        conference: &Reference,
        new_session: NewSession,
    ) -> Result<Stored<ConferenceSession>> {
        let speaker = new_session.speaker.clone();
        let mut session = new_session.into_session()?;

        let parent = self.env.load::<Conference>(conference).await?;
        if parent.value.organizer_user_id != caller.user_id {
            return Err(ConferenceError::Unauthorized(
                "Only the conference organizer can create sessions".to_string(),
            ));
        }

        let key = EntityKey::allocate(Kind::ConferenceSession, Some(&parent.key));
        let session_ref = &key.to_reference();
        let speaker_ref = match &speaker {
            Some(reference) => {
                let stored = self.env.load::<Speaker>(reference).await?;
                let canonical = stored.key.to_reference();
                session.speaker_key = Some(canonical.clone());
                Some(canonical)
            }
            None => None,
        };

        let session = &session;
        let key = &key;
        let speaker_ref = speaker_ref.as_ref();
        transact(&self.env.retry, "create_session", move || async move {
            let mut mutations = vec![Mutation::put(key.clone(), session.clone(), Precondition::Absent)];
            if let Some(speaker_ref) = speaker_ref {
                let mut speaker = self.env.load::<Speaker>(speaker_ref).await?;
                if speaker.value.session_keys_to_speak_at.contains(session_ref) {
                    return Err(ConferenceError::Conflict(
                        "Session is already assigned to this speaker".to_string(),
                    ));
                }
                speaker.value.session_keys_to_speak_at.push(session_ref.clone());
                mutations.push(speaker.put_checked());
            }
            self.env.store.commit(mutations).await?;
            Ok(())
        })
        .await?;

        tracing::info!(session = %key, "Session created");
        if let Some(speaker_ref) = speaker_ref {
            self.notify_speaker_changed(speaker_ref, &parent.key.to_reference()).await;
        }

        Ok(Stored {
            key: key.clone(),
            version: Version::FIRST,
            value: session.clone(),
        })
    }

    /// Make `speaker` the speaker of `session`, detaching any previous speaker.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: no such session or speaker
    /// - `Unauthorized`: the caller does not organize the session's conference
    /// - `Conflict`: the speaker is already assigned to the session
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn assign_speaker(
        &self,
        caller: &CallerIdentity,
        session: &Reference,
        speaker: &Reference,
    ) -> Result<Stored<ConferenceSession>> {
        let session_key = key_for(session, Kind::ConferenceSession)?;
        let conference_key = session_key
            .parent()
            .ok_or_else(|| ConferenceError::not_found(Kind::ConferenceSession, session.clone()))?;
        let conference = self
            .env
            .find::<Conference>(&conference_key)
            .await?
            .ok_or_else(|| ConferenceError::not_found(Kind::ConferenceSession, session.clone()))?;
        if conference.value.organizer_user_id != caller.user_id {
            return Err(ConferenceError::Unauthorized(
                "Only the conference organizer can assign speakers".to_string(),
            ));
        }
        let speaker_key = key_for(speaker, Kind::Speaker)?;

        let session_ref = &session_key.to_reference();
        let speaker_ref = &speaker_key.to_reference();
        let (updated, previous) = transact(&self.env.retry, "assign_speaker", move || async move {
            let mut stored = self.env.load::<ConferenceSession>(session_ref).await?;
            let mut new_speaker = self.env.load::<Speaker>(speaker_ref).await?;
            if stored.value.speaker_key.as_ref() == Some(speaker_ref) {
                return Err(ConferenceError::Conflict(
                    "Speaker is already assigned to this session".to_string(),
                ));
            }

            let mut mutations = Vec::with_capacity(3);
            let previous = stored.value.speaker_key.replace(speaker_ref.clone());
            let previous_key = previous.as_ref().and_then(|r| r.decode().ok());
            if let Some(previous_key) = previous_key {
                if let Some(mut old) = self.env.find::<Speaker>(&previous_key).await? {
                    old.value.session_keys_to_speak_at.retain(|r| r != session_ref);
                    mutations.push(old.put_checked());
                }
            }

            if !new_speaker.value.session_keys_to_speak_at.contains(session_ref) {
                new_speaker.value.session_keys_to_speak_at.push(session_ref.clone());
            }
            mutations.push(new_speaker.put_checked());

            let updated = Stored {
                key: stored.key.clone(),
                version: stored.version.next(),
                value: stored.value.clone(),
            };
            mutations.push(stored.put_checked());
            self.env.store.commit(mutations).await?;
            Ok((updated, previous))
        })
        .await?;

        let conference_ref = conference.key.to_reference();
        tracing::info!(session = %session_key, speaker = %speaker_key, "Speaker assigned");
        self.notify_speaker_changed(speaker_ref, &conference_ref).await;
        if let Some(previous) = &previous {
            self.notify_speaker_changed(previous, &conference_ref).await;
        }
        Ok(updated)
    }

    /// Delete one session: prune wishlists, detach its speaker, delete it.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: no such session
    /// - `Forbidden`: the caller does not organize the session's conference
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn delete_session(&self, caller: &CallerIdentity, session: &Reference) -> Result<()> {
        let stored = self.env.load::<ConferenceSession>(session).await?;
        let organizer = match stored.key.parent() {
            Some(conference_key) => self
                .env
                .find::<Conference>(&conference_key)
                .await?
                .map(|c| c.value.organizer_user_id),
            None => None,
        };
        if organizer.as_deref() != Some(caller.user_id.as_str()) {
            return Err(ConferenceError::Forbidden(
                "Only the owner can delete sessions.".to_string(),
            ));
        }

        self.remove_session(&stored.key).await?;
        tracing::info!(session = %stored.key, "Session deleted");
        Ok(())
    }

    /// Delete a speaker, clearing the speaker link on every session that has it.
    ///
    /// Sessions are kept.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: no such speaker
    #[tracing::instrument(skip(self))]
    pub async fn delete_speaker(&self, speaker: &Reference) -> Result<()> {
        let stored = self.env.load::<Speaker>(speaker).await?;
        let speaker_ref = &stored.key.to_reference();

        let linked = fetch_all::<ConferenceSession>(
            self.env.store.as_ref(),
            Query::kind(Kind::ConferenceSession)
                .filter(Predicate::eq("speakerKey", PropertyValue::text(speaker_ref.as_str()))),
        )
        .await?;
        let mut session_keys: Vec<EntityKey> = linked.into_iter().map(|s| s.key).collect();
        for key in stored
            .value
            .session_keys_to_speak_at
            .iter()
            .filter_map(|reference| reference.decode().ok())
        {
            if !session_keys.contains(&key) {
                session_keys.push(key);
            }
        }

        let cleared = try_join_all(
            session_keys
                .iter()
                .map(|key| self.clear_speaker(key, speaker_ref)),
        )
        .await?;
        let late = self.delete_speaker_record(&stored.key, speaker_ref).await?;
        let cleared_count = (cleared.iter().filter(|c| **c).count() + late.len()) as u64;
        metrics::record_cascade(Kind::ConferenceSession, cleared_count);
        for key in late {
            if !session_keys.contains(&key) {
                session_keys.push(key);
            }
        }

        let mut conferences: Vec<EntityKey> = session_keys.iter().filter_map(EntityKey::parent).collect();
        conferences.sort();
        conferences.dedup();
        for conference in conferences {
            self.announcements
                .forget_speaker_summary(speaker_ref, &conference.to_reference())
                .await;
        }

        tracing::info!(speaker = %stored.key, sessions_cleared = cleared_count, "Speaker deleted");
        Ok(())
    }

    /// Delete a conference the caller organizes, with everything that points at it.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: no such conference
    /// - `Forbidden`: the caller does not organize it
    /// - `Transient`/`Store`: a step failed; re-running completes the cascade
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn delete_conference(&self, caller: &CallerIdentity, conference: &Reference) -> Result<()> {
        let stored = self.env.load::<Conference>(conference).await?;
        if stored.value.organizer_user_id != caller.user_id {
            return Err(ConferenceError::Forbidden(
                "Only the owner can delete the conference.".to_string(),
            ));
        }
        let conference_ref = &stored.key.to_reference();

        let sessions = fetch_all::<ConferenceSession>(
            self.env.store.as_ref(),
            Query::kind(Kind::ConferenceSession).ancestor(stored.key.clone()),
        )
        .await?;
        let session_count = sessions.len() as u64;
        for session in &sessions {
            self.remove_session(&session.key).await?;
        }

        let attendees = fetch_all::<Profile>(
            self.env.store.as_ref(),
            Query::kind(Kind::Profile).filter(Predicate::eq(
                "conferenceKeysToAttend",
                PropertyValue::text(conference_ref.as_str()),
            )),
        )
        .await?;
        let mut released = 0;
        for attendee in &attendees {
            let key = &attendee.key;
            let changed = transact(&self.env.retry, "release_attendee", move || async move {
                let Some(mut profile) = self.env.find::<Profile>(key).await? else {
                    return Ok(false);
                };
                let before = profile.value.conference_keys_to_attend.len();
                profile.value.conference_keys_to_attend.retain(|r| r != conference_ref);
                if profile.value.conference_keys_to_attend.len() == before {
                    return Ok(false);
                }
                self.env.store.commit(vec![profile.put_checked()]).await?;
                Ok(true)
            })
            .await?;
            if changed {
                released += 1;
            }
        }
        metrics::record_cascade(Kind::Profile, released);

        let key = &stored.key;
        transact(&self.env.retry, "delete_conference", move || async move {
            if let Some(current) = self.env.find::<Conference>(key).await? {
                self.env.store.commit(vec![current.delete_checked()]).await?;
            }
            Ok(())
        })
        .await?;
        metrics::record_cascade(Kind::Conference, 1);

        tracing::info!(
            conference = %stored.key,
            sessions = session_count,
            attendees = released,
            "Conference deleted"
        );
        self.announcements.refresh_best_effort().await;
        Ok(())
    }

    /// Prune, detach and delete one session. Safe to repeat.
    ///
    /// The session is re-read inside the transaction and deleted in the same
    /// commit that detaches it from the speaker it names at that moment, so a
    /// concurrent reassignment conflicts instead of leaving a dangling link.
    async fn remove_session(&self, key: &EntityKey) -> Result<()> {
        let session_ref = &key.to_reference();
        prune_session(&self.env, session_ref).await?;

        let speaker = transact(&self.env.retry, "delete_session", move || async move {
            let Some(current) = self.env.find::<ConferenceSession>(key).await? else {
                return Ok(None);
            };
            let speaker_ref = current.value.speaker_key.clone();
            let mut mutations = vec![current.delete_checked()];
            let speaker_key = speaker_ref.as_ref().and_then(|r| r.decode().ok());
            if let Some(speaker_key) = speaker_key {
                if let Some(mut speaker) = self.env.find::<Speaker>(&speaker_key).await? {
                    let before = speaker.value.session_keys_to_speak_at.len();
                    speaker.value.session_keys_to_speak_at.retain(|r| r != session_ref);
                    if speaker.value.session_keys_to_speak_at.len() != before {
                        mutations.push(speaker.put_checked());
                    }
                }
            }
            self.env.store.commit(mutations).await?;
            Ok(speaker_ref)
        })
        .await?;
        metrics::record_cascade(Kind::ConferenceSession, 1);

        if let (Some(speaker_ref), Some(conference)) = (&speaker, key.parent()) {
            self.notify_speaker_changed(speaker_ref, &conference.to_reference()).await;
        }
        Ok(())
    }

    /// Delete the speaker record, clearing sessions linked to it since the sweep.
    ///
    /// The delete is version-checked, so an assignment that lands meanwhile
    /// conflicts and the sweep of the speaker's own list runs again. Returns
    /// the sessions cleared here.
    async fn delete_speaker_record(&self, key: &EntityKey, speaker: &Reference) -> Result<Vec<EntityKey>> {
        transact(&self.env.retry, "delete_speaker", move || async move {
            let Some(current) = self.env.find::<Speaker>(key).await? else {
                return Ok(Vec::new());
            };
            let mut cleared: Vec<EntityKey> = Vec::new();
            let mut mutations = Vec::new();
            for session_key in current
                .value
                .session_keys_to_speak_at
                .iter()
                .filter_map(|reference| reference.decode().ok())
            {
                if cleared.contains(&session_key) {
                    continue;
                }
                if let Some(mut session) = self.env.find::<ConferenceSession>(&session_key).await? {
                    if session.value.speaker_key.as_ref() == Some(speaker) {
                        session.value.speaker_key = None;
                        mutations.push(session.put_checked());
                        cleared.push(session_key);
                    }
                }
            }
            mutations.push(current.delete_checked());
            self.env.store.commit(mutations).await?;
            Ok(cleared)
        })
        .await
    }

    /// Clear a session's speaker link if it still points at `speaker`.
    async fn clear_speaker(&self, session: &EntityKey, speaker: &Reference) -> Result<bool> {
        transact(&self.env.retry, "clear_speaker", move || async move {
            let Some(mut stored) = self.env.find::<ConferenceSession>(session).await? else {
                return Ok(false);
            };
            if stored.value.speaker_key.as_ref() != Some(speaker) {
                return Ok(false);
            }
            stored.value.speaker_key = None;
            self.env.store.commit(vec![stored.put_checked()]).await?;
            Ok(true)
        })
        .await
    }

    async fn notify_speaker_changed(&self, speaker: &Reference, conference: &Reference) {
        self.env
            .dispatch(Task::set_speaker_and_sessions(speaker.as_str(), conference.as_str()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::wishlist::{WishlistManager, wishlist_key};
    use conference_core::entity::Wishlist;
    use conference_core::error::ErrorKind;
    use conference_core::store::{EntityStore, fetch};
    use conference_testing::caller;
    use conference_testing::fixtures::{conference, speaker};
    use conference_testing::mocks::{
        InMemoryCache, InMemoryEntityStore, RecordingTaskQueue, StaticIdentityResolver,
    };
    use std::sync::Arc;

    struct Harness {
        linkage: LinkageManager,
        wishlists: WishlistManager,
        store: InMemoryEntityStore,
        tasks: RecordingTaskQueue,
        conference: Reference,
        speaker: Reference,
    }

    async fn harness() -> Harness {
        let store = InMemoryEntityStore::new();
        let tasks = RecordingTaskQueue::new();
        let conference_key = EntityKey::root(Kind::Profile, "org").child(Kind::Conference, "c");
        let speaker_key = EntityKey::root(Kind::Speaker, "ada");
        store
            .commit(vec![
                Mutation::put(conference_key.clone(), conference("C", "org", 10), Precondition::Absent),
                Mutation::put(speaker_key.clone(), speaker("ada@example.com"), Precondition::Absent),
            ])
            .await
            .unwrap();
        let env = ConferenceEnvironment::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryCache::new()),
            Arc::new(tasks.clone()),
            Arc::new(StaticIdentityResolver::new()),
        );
        Harness {
            linkage: LinkageManager::new(env.clone()),
            wishlists: WishlistManager::new(env),
            store,
            tasks,
            conference: conference_key.to_reference(),
            speaker: speaker_key.to_reference(),
        }
    }

    fn named(name: &str, speaker: Option<&Reference>) -> NewSession {
        NewSession {
            name: name.to_string(),
            speaker: speaker.cloned(),
            ..NewSession::default()
        }
    }

    async fn speaker_sessions(store: &InMemoryEntityStore, speaker: &Reference) -> Vec<Reference> {
        fetch::<Speaker>(store, &speaker.decode().unwrap())
            .await
            .unwrap()
            .unwrap()
            .value
            .session_keys_to_speak_at
    }

    #[tokio::test]
    async fn create_session_links_both_sides_and_dispatches() {
        let h = harness().await;
        let created = h
            .linkage
            .create_session(&caller("org"), &h.conference, named("Intro", Some(&h.speaker)))
            .await
            .unwrap();

        assert_eq!(created.value.speaker_key.as_ref(), Some(&h.speaker));
        assert_eq!(created.key.parent().unwrap().to_reference(), h.conference);
        assert_eq!(
            speaker_sessions(&h.store, &h.speaker).await,
            vec![created.key.to_reference()]
        );

        let dispatched = h.tasks.tasks_named(Task::SET_SPEAKER_AND_SESSIONS);
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].get("speakerId"), Some(h.speaker.as_str()));
        assert_eq!(dispatched[0].get("conferenceId"), Some(h.conference.as_str()));
    }

    #[tokio::test]
    async fn create_session_checks_input_then_ownership() {
        let h = harness().await;

        let blank = h
            .linkage
            .create_session(&caller("mallory"), &h.conference, named("", None))
            .await
            .unwrap_err();
        assert_eq!(blank.kind(), ErrorKind::BadRequest);

        let stranger = h
            .linkage
            .create_session(&caller("mallory"), &h.conference, named("Intro", None))
            .await
            .unwrap_err();
        assert_eq!(stranger.kind(), ErrorKind::Unauthorized);

        let missing_speaker = EntityKey::root(Kind::Speaker, "nobody").to_reference();
        let error = h
            .linkage
            .create_session(&caller("org"), &h.conference, named("Intro", Some(&missing_speaker)))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn reassigning_moves_the_session_between_speakers() {
        let h = harness().await;
        let grace = EntityKey::root(Kind::Speaker, "grace");
        h.store
            .commit(vec![Mutation::put(grace.clone(), speaker("grace@example.com"), Precondition::Absent)])
            .await
            .unwrap();
        let grace = grace.to_reference();
        let org = caller("org");
        let created = h
            .linkage
            .create_session(&org, &h.conference, named("Intro", Some(&h.speaker)))
            .await
            .unwrap();
        let session_ref = created.key.to_reference();

        let updated = h.linkage.assign_speaker(&org, &session_ref, &grace).await.unwrap();

        assert_eq!(updated.value.speaker_key.as_ref(), Some(&grace));
        assert!(speaker_sessions(&h.store, &h.speaker).await.is_empty());
        assert_eq!(speaker_sessions(&h.store, &grace).await, vec![session_ref.clone()]);

        let again = h.linkage.assign_speaker(&org, &session_ref, &grace).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::Conflict);

        let stranger = h
            .linkage
            .assign_speaker(&caller("mallory"), &session_ref, &h.speaker)
            .await
            .unwrap_err();
        assert_eq!(stranger.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn deleting_a_speaker_keeps_sessions_unassigned() {
        let h = harness().await;
        let org = caller("org");
        let mut sessions = Vec::new();
        for name in ["A", "B"] {
            let created = h
                .linkage
                .create_session(&org, &h.conference, named(name, Some(&h.speaker)))
                .await
                .unwrap();
            sessions.push(created.key);
        }

        h.linkage.delete_speaker(&h.speaker).await.unwrap();

        assert!(!h.store.contains(&h.speaker.decode().unwrap()));
        for key in &sessions {
            let stored = fetch::<ConferenceSession>(&h.store, key).await.unwrap().unwrap();
            assert_eq!(stored.value.speaker_key, None);
        }
        let again = h.linkage.delete_speaker(&h.speaker).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn deleting_a_session_prunes_wishlists_and_speaker() {
        let h = harness().await;
        let org = caller("org");
        let created = h
            .linkage
            .create_session(&org, &h.conference, named("Intro", Some(&h.speaker)))
            .await
            .unwrap();
        let session_ref = created.key.to_reference();
        h.wishlists.add_session(&caller("alice"), &session_ref).await.unwrap();

        let forbidden = h
            .linkage
            .delete_session(&caller("mallory"), &session_ref)
            .await
            .unwrap_err();
        assert_eq!(forbidden.kind(), ErrorKind::Forbidden);

        h.linkage.delete_session(&org, &session_ref).await.unwrap();

        assert!(!h.store.contains(&created.key));
        assert!(speaker_sessions(&h.store, &h.speaker).await.is_empty());
        let wishlist = fetch::<Wishlist>(&h.store, &wishlist_key("alice")).await.unwrap().unwrap();
        assert!(wishlist.value.sessions.is_empty());
    }

    #[tokio::test]
    async fn removing_a_reassigned_session_detaches_its_current_speaker() {
        let h = harness().await;
        let grace = EntityKey::root(Kind::Speaker, "grace");
        h.store
            .commit(vec![Mutation::put(grace.clone(), speaker("grace@example.com"), Precondition::Absent)])
            .await
            .unwrap();
        let grace = grace.to_reference();
        let org = caller("org");
        let created = h
            .linkage
            .create_session(&org, &h.conference, named("Intro", Some(&h.speaker)))
            .await
            .unwrap();
        let session_ref = created.key.to_reference();

        // Reassigned after the cascade listed the session.
        h.linkage.assign_speaker(&org, &session_ref, &grace).await.unwrap();
        h.linkage.remove_session(&created.key).await.unwrap();

        assert!(!h.store.contains(&created.key));
        assert!(speaker_sessions(&h.store, &grace).await.is_empty());
        assert!(speaker_sessions(&h.store, &h.speaker).await.is_empty());
        let notified: Vec<String> = h
            .tasks
            .tasks_named(Task::SET_SPEAKER_AND_SESSIONS)
            .iter()
            .filter_map(|t| t.get("speakerId").map(str::to_string))
            .collect();
        assert_eq!(notified.last().map(String::as_str), Some(grace.as_str()));
    }

    #[tokio::test]
    async fn speaker_delete_clears_sessions_assigned_after_the_sweep() {
        let h = harness().await;
        let org = caller("org");
        let created = h
            .linkage
            .create_session(&org, &h.conference, named("Intro", None))
            .await
            .unwrap();
        let speaker_key = h.speaker.decode().unwrap();

        // The sweep found nothing; the assignment lands before the record goes.
        h.linkage
            .assign_speaker(&org, &created.key.to_reference(), &h.speaker)
            .await
            .unwrap();
        let cleared = h.linkage.delete_speaker_record(&speaker_key, &h.speaker).await.unwrap();

        assert_eq!(cleared, vec![created.key.clone()]);
        assert!(!h.store.contains(&speaker_key));
        let session = fetch::<ConferenceSession>(&h.store, &created.key).await.unwrap().unwrap();
        assert_eq!(session.value.speaker_key, None);
    }

    #[tokio::test]
    async fn deleting_a_conference_cascades() {
        let h = harness().await;
        let org = caller("org");
        let conference_key = h.conference.decode().unwrap();
        let mut sessions = Vec::new();
        for name in ["A", "B"] {
            let created = h
                .linkage
                .create_session(&org, &h.conference, named(name, Some(&h.speaker)))
                .await
                .unwrap();
            sessions.push(created.key.to_reference());
        }
        for user in ["alice", "bob", "carol"] {
            h.wishlists.add_session(&caller(user), &sessions[0]).await.unwrap();
        }
        let attendee = EntityKey::root(Kind::Profile, "dave");
        let mut profile = conference_testing::fixtures::profile("dave");
        profile.conference_keys_to_attend.push(h.conference.clone());
        h.store
            .commit(vec![Mutation::put(attendee.clone(), profile, Precondition::Absent)])
            .await
            .unwrap();

        let forbidden = h
            .linkage
            .delete_conference(&caller("mallory"), &h.conference)
            .await
            .unwrap_err();
        assert_eq!(forbidden.kind(), ErrorKind::Forbidden);

        h.linkage.delete_conference(&org, &h.conference).await.unwrap();

        assert!(!h.store.contains(&conference_key));
        for session in &sessions {
            assert!(!h.store.contains(&session.decode().unwrap()));
        }
        assert!(speaker_sessions(&h.store, &h.speaker).await.is_empty());
        for user in ["alice", "bob", "carol"] {
            let wishlist = fetch::<Wishlist>(&h.store, &wishlist_key(user)).await.unwrap().unwrap();
            assert!(wishlist.value.sessions.is_empty());
        }
        let dave = fetch::<Profile>(&h.store, &attendee).await.unwrap().unwrap();
        assert!(dave.value.conference_keys_to_attend.is_empty());
    }
}
