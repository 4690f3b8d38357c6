//! Announcement Cache: derived text kept in the process-wide cache.
//!
//! Two projections live here:
//!
//! - the sold-out announcement, naming every conference with
//!   `0 < seats_available <= 5`
//! - per-speaker summaries, naming a speaker's sessions at one conference
//!
//! Both are recomputable from the store at any time. Readers treat a missing
//! entry as empty text, and cache failures are logged rather than returned.

use crate::metrics;
use crate::{ConferenceEnvironment, key_for};
use conference_core::entity::{Conference, ConferenceSession, PropertyValue, Speaker};
use conference_core::error::Result;
use conference_core::key::{Kind, Reference};
use conference_core::store::{Operator, Predicate, Query, fetch_all};

/// Cache key of the sold-out announcement.
pub const ANNOUNCEMENT_KEY: &str = "RECENT_ANNOUNCEMENTS";

/// Conferences with at most this many seats left are "nearly sold out".
pub const NEARLY_SOLD_OUT_SEATS: u32 = 5;

/// Cache key of a speaker's summary at a conference.
#[must_use]
pub fn speaker_summary_key(speaker: &Reference, conference: &Reference) -> String {
    format!("SPEAKER_SUMMARY:{speaker}:{conference}")
}

/// Announcement text for the given conference names, `None` when there are none.
#[must_use]
pub fn announcement_text(names: &[String]) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    Some(format!(
        "Last chance to attend! The following conferences are nearly sold out: {}",
        names.join(", ")
    ))
}

/// Summary text for a speaker, `None` unless they hold more than one session.
#[must_use]
pub fn speaker_summary_text(speaker_name: &str, session_names: &[String]) -> Option<String> {
    if session_names.len() <= 1 {
        return None;
    }
    Some(format!(
        "{speaker_name} will be speaking at the following sessions: {}",
        session_names.join(", ")
    ))
}

/// Maintains the derived cache entries.
#[derive(Clone)]
pub struct AnnouncementCache {
    env: ConferenceEnvironment,
}

impl AnnouncementCache {
    /// Create the cache maintainer.
    #[must_use]
    pub const fn new(env: ConferenceEnvironment) -> Self {
        Self { env }
    }

    /// Recompute the sold-out announcement and store it (or clear it).
    ///
    /// Returns the new text, `None` when no conference qualifies.
    ///
    /// # Errors
    ///
    /// `Store` or `Cache` errors.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Option<String>> {
        let query = Query::kind(Kind::Conference)
            .filter(Predicate::new("seatsAvailable", Operator::Gt, PropertyValue::Int(0)))
            .filter(Predicate::new(
                "seatsAvailable",
                Operator::Lte,
                PropertyValue::Int(i64::from(NEARLY_SOLD_OUT_SEATS)),
            ))
            .order_by("seatsAvailable")
            .order_by("name");

        let mut names: Vec<String> = fetch_all::<Conference>(self.env.store.as_ref(), query)
            .await?
            .into_iter()
            .map(|stored| stored.value.name)
            .collect();
        names.sort();

        let text = announcement_text(&names);
        match &text {
            Some(text) => self.env.cache.set(ANNOUNCEMENT_KEY, text.clone()).await?,
            None => self.env.cache.delete(ANNOUNCEMENT_KEY).await?,
        }
        metrics::record_announcement_refresh(if text.is_some() { "set" } else { "cleared" });
        tracing::debug!(conferences = names.len(), "Announcement refreshed");
        Ok(text)
    }

    /// Refresh, logging instead of returning failures.
    pub(crate) async fn refresh_best_effort(&self) {
        if let Err(error) = self.refresh().await {
            metrics::record_announcement_refresh("failed");
            tracing::warn!(error = %error, "Announcement refresh failed");
        }
    }

    /// The cached announcement, or `""` when there is none.
    pub async fn get_announcement(&self) -> String {
        match self.env.cache.get(ANNOUNCEMENT_KEY).await {
            Ok(text) => text.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(error = %error, "Announcement unavailable");
                String::new()
            }
        }
    }

    /// Recompute the summary of `speaker`'s sessions at `conference`.
    ///
    /// This is the handler behind the `set_speaker_and_sessions` task.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: a reference is malformed
    /// - `NotFound`: the speaker does not exist
    /// - `Store` or `Cache` errors
    #[tracing::instrument(skip(self))]
    pub async fn refresh_speaker_summary(
        &self,
        speaker: &Reference,
        conference: &Reference,
    ) -> Result<Option<String>> {
        let conference_key = key_for(conference, Kind::Conference)?;
        let stored = self.env.load::<Speaker>(speaker).await?;
        let speaker_name = stored
            .value
            .display_name
            .unwrap_or(stored.value.main_email);

        let query = Query::kind(Kind::ConferenceSession)
            .ancestor(conference_key)
            .filter(Predicate::eq("speakerKey", PropertyValue::text(speaker.as_str())))
            .order_by("name");
        let sessions: Vec<String> = fetch_all::<ConferenceSession>(self.env.store.as_ref(), query)
            .await?
            .into_iter()
            .map(|stored| stored.value.name)
            .collect();

        let key = speaker_summary_key(speaker, conference);
        let text = speaker_summary_text(&speaker_name, &sessions);
        match &text {
            Some(text) => self.env.cache.set(&key, text.clone()).await?,
            None => self.env.cache.delete(&key).await?,
        }
        Ok(text)
    }

    /// The cached summary, or `""` when there is none.
    pub async fn get_speaker_summary(&self, speaker: &Reference, conference: &Reference) -> String {
        let key = speaker_summary_key(speaker, conference);
        match self.env.cache.get(&key).await {
            Ok(text) => text.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(error = %error, "Speaker summary unavailable");
                String::new()
            }
        }
    }

    /// Drop a cached summary, logging failures.
    pub(crate) async fn forget_speaker_summary(&self, speaker: &Reference, conference: &Reference) {
        let key = speaker_summary_key(speaker, conference);
        if let Err(error) = self.env.cache.delete(&key).await {
            tracing::warn!(error = %error, key = %key, "Speaker summary invalidation failed");
        }
    }
}
