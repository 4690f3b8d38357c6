//! Registration Engine: seat accounting for conferences.
//!
//! `register` and `unregister` each read the caller's profile and the
//! conference, then write both back in one commit whose preconditions pin the
//! versions that were read. Two callers racing for the last seat therefore
//! cannot both succeed: the second commit fails its precondition, the
//! transaction re-runs against fresh state, and sees the conference sold out.
//!
//! Invariants maintained at rest:
//!
//! - `0 <= seats_available <= max_attendees`
//! - `seats_available == max_attendees - (profiles attending)`
//! - a profile lists each conference at most once

use crate::announcement::AnnouncementCache;
use crate::metrics;
use crate::profiles::load_or_default;
use crate::retry::transact;
use crate::{ConferenceEnvironment, key_for};
use conference_core::entity::Conference;
use conference_core::error::{ConferenceError, Result};
use conference_core::identity::CallerIdentity;
use conference_core::key::{Kind, Reference};

/// Registers and unregisters callers for conferences.
#[derive(Clone)]
pub struct RegistrationEngine {
    env: ConferenceEnvironment,
    announcements: AnnouncementCache,
}

impl RegistrationEngine {
    /// Create the engine.
    #[must_use]
    pub fn new(env: ConferenceEnvironment) -> Self {
        Self {
            announcements: AnnouncementCache::new(env.clone()),
            env,
        }
    }

    /// Take a seat at `conference` for the caller.
    ///
    /// The caller's profile is created in the same commit if it does not exist.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: no such conference
    /// - `Conflict`: already registered, or no seats left
    /// - `Transient`: contention outlasted the retry budget
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn register(&self, caller: &CallerIdentity, conference: &Reference) -> Result<bool> {
        let key = key_for(conference, Kind::Conference)?;
        let canonical = &key.to_reference();

        let result = transact(&self.env.retry, "register", move || async move {
            let mut stored = self.env.load::<Conference>(conference).await?;
            let mut profile = load_or_default(&self.env, caller).await?;

            if profile.profile.is_attending(canonical) {
                return Err(ConferenceError::Conflict(
                    "You have already registered for this conference".to_string(),
                ));
            }
            if stored.value.seats_available == 0 {
                return Err(ConferenceError::Conflict(
                    "There are no seats available.".to_string(),
                ));
            }

            profile.profile.conference_keys_to_attend.push(canonical.clone());
            stored.value.seats_available -= 1;
            let seats = stored.value.seats_available;

            self.env
                .store
                .commit(vec![profile.put(), stored.put_checked()])
                .await?;
            Ok(seats)
        })
        .await;

        match result {
            Ok(seats) => {
                metrics::record_registration("registered");
                tracing::info!(conference = %key, seats_available = seats, "Registered");
                self.announcements.refresh_best_effort().await;
                Ok(true)
            }
            Err(error) => {
                metrics::record_registration(match &error {
                    ConferenceError::Conflict(_) => "rejected",
                    _ => "failed",
                });
                Err(error)
            }
        }
    }

    /// Give up the caller's seat at `conference`.
    ///
    /// Returns `false`, writing nothing, when the caller was not registered.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference
    /// - `NotFound`: no such conference
    /// - `Transient`: contention outlasted the retry budget
    #[tracing::instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub async fn unregister(&self, caller: &CallerIdentity, conference: &Reference) -> Result<bool> {
        let key = key_for(conference, Kind::Conference)?;
        let canonical = &key.to_reference();

        let removed = transact(&self.env.retry, "unregister", move || async move {
            let mut stored = self.env.load::<Conference>(conference).await?;
            let mut profile = load_or_default(&self.env, caller).await?;

            let attending = &mut profile.profile.conference_keys_to_attend;
            let before = attending.len();
            attending.retain(|r| r != canonical);
            if attending.len() == before {
                return Ok(false);
            }

            stored.value.seats_available =
                (stored.value.seats_available + 1).min(stored.value.max_attendees);

            self.env
                .store
                .commit(vec![profile.put(), stored.put_checked()])
                .await?;
            Ok(true)
        })
        .await?;

        if removed {
            metrics::record_registration("unregistered");
            tracing::info!(conference = %key, "Unregistered");
            self.announcements.refresh_best_effort().await;
        } else {
            metrics::record_registration("not_registered");
        }
        Ok(removed)
    }
}
