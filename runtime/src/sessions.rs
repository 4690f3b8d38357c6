//! Conference sessions: input parsing and read queries.
//!
//! Creation, speaker assignment and deletion change speaker links and live in
//! [`crate::linkage`].

use crate::ConferenceEnvironment;
use chrono::{NaiveDate, NaiveTime};
use conference_core::entity::{Conference, ConferenceSession, PropertyValue, SessionType, Speaker};
use conference_core::error::{ConferenceError, Result};
use conference_core::key::{Kind, Reference};
use conference_core::store::{Operator, Predicate, Query, Stored, fetch_all};

/// Format of session start times, e.g. `"10:30 AM"`.
pub const START_TIME_FORMAT: &str = "%I:%M %p";

/// Default session length in minutes.
pub const DEFAULT_DURATION: u32 = 60;

/// Default start time.
pub const DEFAULT_START_TIME: &str = "10:30 AM";

/// Sessions starting at or after this hour are evening sessions.
const EVENING_STARTS: u32 = 19;

/// Fields of a new session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewSession {
    /// Name, required.
    pub name: String,
    /// Highlights.
    pub highlights: Option<String>,
    /// Speaker to link the session to.
    pub speaker: Option<Reference>,
    /// Start time as `HH:MM AM`; defaults to 10:30 AM.
    pub start_time: Option<String>,
    /// Duration in minutes; defaults to 60.
    pub duration: Option<u32>,
    /// Session type; defaults to `UNKNOWN`.
    pub type_of_session: Option<SessionType>,
    /// Day as `YYYY-MM-DD`.
    pub date: Option<String>,
}

impl NewSession {
    /// Build the entity, applying defaults. The speaker link is left to the caller.
    ///
    /// # Errors
    ///
    /// `BadRequest` when the name is blank or a date/time does not parse.
    pub fn into_session(self) -> Result<ConferenceSession> {
        crate::require(&self.name, "Session 'name' field required")?;
        Ok(ConferenceSession {
            name: self.name,
            highlights: self.highlights,
            speaker_key: None,
            start_time: Some(parse_start_time(
                self.start_time.as_deref().unwrap_or(DEFAULT_START_TIME),
            )?),
            duration: self.duration.unwrap_or(DEFAULT_DURATION),
            type_of_session: self.type_of_session.unwrap_or_default(),
            date: self.date.as_deref().map(parse_date).transpose()?,
        })
    }
}

/// Parse a 12-hour start time such as `"07:45 PM"`.
///
/// # Errors
///
/// `BadRequest` when the text does not match [`START_TIME_FORMAT`].
pub fn parse_start_time(text: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), START_TIME_FORMAT).map_err(|e| {
        ConferenceError::BadRequest(format!("Invalid start time {text:?} (expected HH:MM AM): {e}"))
    })
}

/// Parse a `YYYY-MM-DD` date, ignoring anything after the first ten characters.
///
/// # Errors
///
/// `BadRequest` when the date does not parse.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
        ConferenceError::BadRequest(format!("Invalid date {text:?} (expected YYYY-MM-DD): {e}"))
    })
}

/// Session read queries.
#[derive(Clone)]
pub struct SessionDirectory {
    env: ConferenceEnvironment,
}

impl SessionDirectory {
    /// Create the directory.
    #[must_use]
    pub const fn new(env: ConferenceEnvironment) -> Self {
        Self { env }
    }

    /// One session.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed reference, `NotFound` if absent.
    pub async fn get_session(&self, session: &Reference) -> Result<Stored<ConferenceSession>> {
        self.env.load(session).await
    }

    /// Sessions of a conference, by name.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed reference, `NotFound` if the conference is absent.
    pub async fn conference_sessions(&self, conference: &Reference) -> Result<Vec<Stored<ConferenceSession>>> {
        let stored = self.env.load::<Conference>(conference).await?;
        self.query(Query::kind(Kind::ConferenceSession).ancestor(stored.key).order_by("name"))
            .await
    }

    /// Sessions of a conference with the given type, by name.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed reference, `NotFound` if the conference is absent.
    pub async fn sessions_by_type(
        &self,
        conference: &Reference,
        session_type: SessionType,
    ) -> Result<Vec<Stored<ConferenceSession>>> {
        let stored = self.env.load::<Conference>(conference).await?;
        self.query(
            Query::kind(Kind::ConferenceSession)
                .ancestor(stored.key)
                .filter(Predicate::eq("typeOfSession", PropertyValue::text(session_type.as_str())))
                .order_by("name"),
        )
        .await
    }

    /// Every session given by a speaker, across conferences, by name.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a malformed reference, `NotFound` if the speaker is absent.
    pub async fn sessions_by_speaker(&self, speaker: &Reference) -> Result<Vec<Stored<ConferenceSession>>> {
        let stored = self.env.load::<Speaker>(speaker).await?;
        self.query(
            Query::kind(Kind::ConferenceSession)
                .filter(Predicate::eq(
                    "speakerKey",
                    PropertyValue::text(stored.key.to_reference().as_str()),
                ))
                .order_by("name"),
        )
        .await
    }

    /// Every session, by name.
    ///
    /// # Errors
    ///
    /// `Store` errors.
    pub async fn all_sessions(&self) -> Result<Vec<Stored<ConferenceSession>>> {
        self.query(Query::kind(Kind::ConferenceSession).order_by("name")).await
    }

    /// Sessions that are not workshops and start before 7 PM.
    ///
    /// The store query carries the single inequality (start time); the type
    /// exclusion is a second inequality and is applied here.
    ///
    /// # Errors
    ///
    /// `Store` errors.
    pub async fn daytime_non_workshop_sessions(&self) -> Result<Vec<Stored<ConferenceSession>>> {
        let evening = NaiveTime::from_hms_opt(EVENING_STARTS, 0, 0).unwrap_or(NaiveTime::MIN);
        let sessions = self
            .query(
                Query::kind(Kind::ConferenceSession)
                    .filter(Predicate::new("startTime", Operator::Lt, PropertyValue::Time(evening)))
                    .order_by("startTime")
                    .order_by("name"),
            )
            .await?;
        Ok(sessions
            .into_iter()
            .filter(|stored| stored.value.type_of_session != SessionType::Workshop)
            .collect())
    }

    async fn query(&self, query: Query) -> Result<Vec<Stored<ConferenceSession>>> {
        Ok(fetch_all(self.env.store.as_ref(), query).await?)
    }
}
