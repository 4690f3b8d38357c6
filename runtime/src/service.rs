//! The facade an API layer calls.
//!
//! [`ConferenceService`] owns one of each component, all sharing a single
//! [`ConferenceEnvironment`]. Transport code authenticates the request with
//! [`ConferenceService::authenticate`] and calls the component it needs.

use crate::ConferenceEnvironment;
use crate::announcement::AnnouncementCache;
use crate::conferences::ConferenceDirectory;
use crate::linkage::LinkageManager;
use crate::profiles::ProfileDirectory;
use crate::registration::RegistrationEngine;
use crate::sessions::SessionDirectory;
use crate::speakers::SpeakerDirectory;
use crate::wishlist::WishlistManager;
use conference_core::error::{ConferenceError, Result};
use conference_core::identity::CallerIdentity;
use conference_core::key::Reference;
use conference_core::task_queue::Task;

/// Every conference operation behind one handle.
#[derive(Clone)]
pub struct ConferenceService {
    env: ConferenceEnvironment,
    registration: RegistrationEngine,
    linkage: LinkageManager,
    wishlists: WishlistManager,
    announcements: AnnouncementCache,
    conferences: ConferenceDirectory,
    profiles: ProfileDirectory,
    sessions: SessionDirectory,
    speakers: SpeakerDirectory,
}

impl ConferenceService {
    /// Build every component over `env`.
    #[must_use]
    pub fn new(env: ConferenceEnvironment) -> Self {
        Self {
            registration: RegistrationEngine::new(env.clone()),
            linkage: LinkageManager::new(env.clone()),
            wishlists: WishlistManager::new(env.clone()),
            announcements: AnnouncementCache::new(env.clone()),
            conferences: ConferenceDirectory::new(env.clone()),
            profiles: ProfileDirectory::new(env.clone()),
            sessions: SessionDirectory::new(env.clone()),
            speakers: SpeakerDirectory::new(env.clone()),
            env,
        }
    }

    /// Resolve the request's bearer credential.
    ///
    /// # Errors
    ///
    /// `Unauthorized` when the credential is missing or unknown.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<CallerIdentity> {
        self.env.identity.resolve(bearer).await
    }

    /// Run a queued task in-process.
    ///
    /// A task consumer calls this for tasks it pulls off the queue. The
    /// confirmation email has no in-process effect and is only logged.
    ///
    /// # Errors
    ///
    /// `BadRequest` for an unknown task or a missing parameter, otherwise the
    /// errors of the handler.
    #[tracing::instrument(skip(self, task), fields(task = %task.name))]
    pub async fn run_task(&self, task: &Task) -> Result<()> {
        let param = |name: &str| {
            task.get(name)
                .map(Reference::new)
                .ok_or_else(|| ConferenceError::BadRequest(format!("Task {} is missing '{name}'", task.name)))
        };
        match task.name.as_str() {
            Task::SET_SPEAKER_AND_SESSIONS => {
                let speaker = param("speakerId")?;
                let conference = param("conferenceId")?;
                self.announcements
                    .refresh_speaker_summary(&speaker, &conference)
                    .await?;
                Ok(())
            }
            Task::SEND_CONFIRMATION_EMAIL => {
                tracing::info!(
                    email = task.get("email").unwrap_or_default(),
                    info = task.get("conferenceInfo").unwrap_or_default(),
                    "Confirmation email"
                );
                Ok(())
            }
            other => Err(ConferenceError::BadRequest(format!("Unknown task: {other}"))),
        }
    }

    /// Seat registration.
    #[must_use]
    pub const fn registration(&self) -> &RegistrationEngine {
        &self.registration
    }

    /// Speaker links and deletion cascades.
    #[must_use]
    pub const fn linkage(&self) -> &LinkageManager {
        &self.linkage
    }

    /// Wishlists.
    #[must_use]
    pub const fn wishlists(&self) -> &WishlistManager {
        &self.wishlists
    }

    /// Announcement and speaker summaries.
    #[must_use]
    pub const fn announcements(&self) -> &AnnouncementCache {
        &self.announcements
    }

    /// Conference creation, updates and queries.
    #[must_use]
    pub const fn conferences(&self) -> &ConferenceDirectory {
        &self.conferences
    }

    /// Profiles.
    #[must_use]
    pub const fn profiles(&self) -> &ProfileDirectory {
        &self.profiles
    }

    /// Session reads.
    #[must_use]
    pub const fn sessions(&self) -> &SessionDirectory {
        &self.sessions
    }

    /// Speakers.
    #[must_use]
    pub const fn speakers(&self) -> &SpeakerDirectory {
        &self.speakers
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::announcement::speaker_summary_key;
    use crate::conferences::NewConference;
    use crate::sessions::NewSession;
    use crate::speakers::NewSpeaker;
    use conference_core::error::ErrorKind;
    use conference_testing::caller;
    use conference_testing::mocks::{
        InMemoryCache, InMemoryEntityStore, RecordingTaskQueue, StaticIdentityResolver,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn authenticate_delegates_to_the_resolver() {
        let service = ConferenceService::new(ConferenceEnvironment::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(RecordingTaskQueue::new()),
            Arc::new(StaticIdentityResolver::new().with_token("t0k3n", caller("alice"))),
        ));

        assert_eq!(service.authenticate(Some("t0k3n")).await.unwrap().user_id, "alice");
        assert_eq!(
            service.authenticate(None).await.unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[tokio::test]
    async fn queued_speaker_task_builds_the_summary() {
        let cache = InMemoryCache::new();
        let tasks = RecordingTaskQueue::new();
        let service = ConferenceService::new(ConferenceEnvironment::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(cache.clone()),
            Arc::new(tasks.clone()),
            Arc::new(StaticIdentityResolver::new()),
        ));
        let org = caller("org");
        let conference = service
            .conferences()
            .create_conference(
                &org,
                NewConference {
                    name: "RustConf".to_string(),
                    ..NewConference::default()
                },
            )
            .await
            .unwrap()
            .key
            .to_reference();
        let ada = service
            .speakers()
            .create_speaker(NewSpeaker {
                display_name: Some("Ada".to_string()),
                main_email: "ada@example.com".to_string(),
            })
            .await
            .unwrap()
            .key
            .to_reference();
        for name in ["Borrowing", "Async"] {
            service
                .linkage()
                .create_session(
                    &org,
                    &conference,
                    NewSession {
                        name: name.to_string(),
                        speaker: Some(ada.clone()),
                        ..NewSession::default()
                    },
                )
                .await
                .unwrap();
        }

        for task in tasks.tasks() {
            service.run_task(&task).await.unwrap();
        }

        assert_eq!(
            cache.peek(&speaker_summary_key(&ada, &conference)).as_deref(),
            Some("Ada will be speaking at the following sessions: Async, Borrowing")
        );
        assert_eq!(
            service.run_task(&Task::new("nope")).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
    }
}
