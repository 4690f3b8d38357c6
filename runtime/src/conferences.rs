//! Conference creation, updates and queries.

use crate::announcement::AnnouncementCache;
use crate::profiles::{load_or_default, profile_key};
use crate::retry::transact;
use crate::sessions::parse_date;
use crate::ConferenceEnvironment;
use chrono::{Datelike, NaiveDate};
use conference_core::entity::Conference;
use conference_core::error::{ConferenceError, Result};
use conference_core::filter::{RawFilter, compile};
use conference_core::identity::CallerIdentity;
use conference_core::key::{EntityKey, Kind, Reference};
use conference_core::store::{Mutation, Precondition, Query, Stored, Version, fetch_all};
use conference_core::task_queue::Task;

/// City used when a conference is created without one.
pub const DEFAULT_CITY: &str = "Default City";

/// Topics used when a conference is created without any.
pub const DEFAULT_TOPICS: [&str; 2] = ["Default", "Topic"];

/// Fields of a new conference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewConference {
    /// Name, required.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Topics; defaults to [`DEFAULT_TOPICS`].
    pub topics: Option<Vec<String>>,
    /// City; defaults to [`DEFAULT_CITY`].
    pub city: Option<String>,
    /// First day as `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Last day as `YYYY-MM-DD`.
    pub end_date: Option<String>,
    /// Capacity; defaults to 0.
    pub max_attendees: Option<u32>,
}

impl NewConference {
    fn into_conference(self, organizer: &str) -> Result<Conference> {
        crate::require(&self.name, "Conference 'name' field required")?;
        let start_date = self.start_date.as_deref().map(parse_date).transpose()?;
        let max_attendees = self.max_attendees.unwrap_or(0);
        Ok(Conference {
            name: self.name,
            description: self.description,
            organizer_user_id: organizer.to_string(),
            topics: self
                .topics
                .unwrap_or_else(|| DEFAULT_TOPICS.iter().map(ToString::to_string).collect()),
            city: Some(self.city.unwrap_or_else(|| DEFAULT_CITY.to_string())),
            month: month_of(start_date),
            start_date,
            end_date: self.end_date.as_deref().map(parse_date).transpose()?,
            max_attendees,
            seats_available: max_attendees,
        })
    }
}

/// Fields an organizer may change; `None` leaves a field as it is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConferenceUpdate {
    /// New name; must not be blank.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New topics.
    pub topics: Option<Vec<String>>,
    /// New city.
    pub city: Option<String>,
    /// New first day as `YYYY-MM-DD`; also changes the month.
    pub start_date: Option<String>,
    /// New last day as `YYYY-MM-DD`.
    pub end_date: Option<String>,
    /// New capacity; seats available shift by the same amount.
    pub max_attendees: Option<u32>,
}

impl ConferenceUpdate {
    fn apply(&self, conference: &mut Conference) -> Result<()> {
        if let Some(name) = &self.name {
            crate::require(name, "Conference 'name' field required")?;
            conference.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            conference.description = Some(description.clone());
        }
        if let Some(topics) = &self.topics {
            conference.topics.clone_from(topics);
        }
        if let Some(city) = &self.city {
            conference.city = Some(city.clone());
        }
        if let Some(start) = &self.start_date {
            let start = parse_date(start)?;
            conference.start_date = Some(start);
            conference.month = start.month();
        }
        if let Some(end) = &self.end_date {
            conference.end_date = Some(parse_date(end)?);
        }
        if let Some(max) = self.max_attendees {
            let attendees = conference.attendee_count();
            if max < attendees {
                return Err(ConferenceError::Conflict(format!(
                    "Cannot lower maxAttendees to {max}: {attendees} attendees are registered"
                )));
            }
            conference.max_attendees = max;
            conference.seats_available = max - attendees;
        }
        Ok(())
    }
}

fn month_of(date: Option<NaiveDate>) -> u32 {
    date.map_or(0, |d| d.month())
}

fn confirmation_text(conference: &Conference) -> String {
    let dates = match (conference.start_date, conference.end_date) {
        (Some(start), Some(end)) => format!(" from {start} to {end}"),
        (Some(start), None) => format!(" on {start}"),
        _ => String::new(),
    };
    format!(
        "{} in {}{dates}, {} seats",
        conference.name,
        conference.city.as_deref().unwrap_or(DEFAULT_CITY),
        conference.max_attendees
    )
}

/// Conference creation, updates and queries.
#[derive(Clone)]
pub struct ConferenceDirectory {
    env: ConferenceEnvironment,
    announcements: AnnouncementCache,
}

impl ConferenceDirectory {
    /// Create the directory.
    #[must_use]
    pub fn new(env: ConferenceEnvironment) -> Self {
        Self {
            announcements: AnnouncementCache::new(env.clone()),
            env,
        }
    }

    /// Create a conference organized by the caller.
    ///
    /// The caller's profile is created in the same commit when needed, and a
    /// confirmation email task is dispatched afterwards.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a blank name or a malformed date.
    #[tracing::instrument(skip(self, caller, new_conference), fields(user = %caller.user_id))]
    pub async fn create_conference(
        &self,
        caller: &CallerIdentity,
        new_conference: NewConference,
    ) -> Result<Stored<Conference>> {
        let conference = &new_conference.into_conference(&caller.user_id)?;
        let key = &EntityKey::allocate(Kind::Conference, Some(&profile_key(&caller.user_id)));

        transact(&self.env.retry, "create_conference", move || async move {
            let profile = load_or_default(&self.env, caller).await?;
            let mut mutations = vec![Mutation::put(key.clone(), conference.clone(), Precondition::Absent)];
            if profile.precondition == Precondition::Absent {
                mutations.push(profile.put());
            }
            self.env.store.commit(mutations).await?;
            Ok(())
        })
        .await?;

        tracing::info!(conference = %key, name = %conference.name, "Conference created");
        self.env
            .dispatch(Task::send_confirmation_email(
                &caller.email,
                &confirmation_text(conference),
            ))
            .await;

        Ok(Stored {
            key: key.clone(),
            version: Version::FIRST,
            value: conference.clone(),
        })
    }

    /// Apply `update` to a conference the caller organizes.
    ///
    /// # Errors
    ///
    /// - `BadRequest`: malformed reference, blank name, bad date
    /// - `NotFound`: no such conference
    /// - `Forbidden`: the caller does not organize it
    /// - `Conflict`: the new capacity is below the current attendee count
    #[tracing::instrument(skip(self, caller, update), fields(user = %caller.user_id))]
    pub async fn update_conference(
        &self,
        caller: &CallerIdentity,
        conference: &Reference,
        update: ConferenceUpdate,
    ) -> Result<Stored<Conference>> {
        let update = &update;
        let updated = transact(&self.env.retry, "update_conference", move || async move {
            let mut stored = self.env.load::<Conference>(conference).await?;
            if stored.value.organizer_user_id != caller.user_id {
                return Err(ConferenceError::Forbidden(
                    "Only the owner can update the conference.".to_string(),
                ));
            }
            update.apply(&mut stored.value)?;

            let updated = Stored {
                key: stored.key.clone(),
                version: stored.version.next(),
                value: stored.value.clone(),
            };
            self.env.store.commit(vec![stored.put_checked()]).await?;
            Ok(updated)
        })
        .await?;

        // Capacity and name both show up in the sold-out announcement.
        if update.max_attendees.is_some() || update.name.is_some() {
            self.announcements.refresh_best_effort().await;
        }
        Ok(updated)
    }

    /// One conference.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed reference, `NotFound` if absent.
    pub async fn get_conference(&self, conference: &Reference) -> Result<Stored<Conference>> {
        self.env.load(conference).await
    }

    /// Conferences organized by `organizer`, by name.
    ///
    /// # Errors
    ///
    /// `Store` errors.
    pub async fn conferences_created(&self, organizer: &CallerIdentity) -> Result<Vec<Stored<Conference>>> {
        let query = Query::kind(Kind::Conference)
            .ancestor(profile_key(&organizer.user_id))
            .order_by("name");
        Ok(fetch_all(self.env.store.as_ref(), query).await?)
    }

    /// Conferences the caller is registered for, in registration order.
    ///
    /// References that no longer resolve are skipped.
    ///
    /// # Errors
    ///
    /// `Store` errors.
    pub async fn conferences_to_attend(&self, caller: &CallerIdentity) -> Result<Vec<Stored<Conference>>> {
        let profile = load_or_default(&self.env, caller).await?;
        self.env
            .resolve_all(&profile.profile.conference_keys_to_attend)
            .await
    }

    /// Run user-supplied filters through the filter compiler and execute them.
    ///
    /// # Errors
    ///
    /// `BadRequest` from the compiler, `Store` errors from the query.
    #[tracing::instrument(skip(self))]
    pub async fn query_conferences(&self, filters: &[RawFilter]) -> Result<Vec<Stored<Conference>>> {
        let plan = compile(filters)?;
        tracing::debug!(
            predicates = plan.predicates().len(),
            inequality = ?plan.inequality_field(),
            "Filters compiled"
        );
        Ok(fetch_all(self.env.store.as_ref(), plan.into_query()).await?)
    }
}
