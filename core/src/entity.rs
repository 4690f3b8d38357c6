//! The five entity types and the property view the store queries against.
//!
//! Entities are plain data: no keys, no versions. Keys live beside them in
//! [`Record`](crate::store::Record)s so the same value can be written under a
//! fresh key or compared across reads.
//!
//! Field names serialize in camelCase; those names are also the property names
//! used by queries (`city`, `maxAttendees`, `sessionKeysToSpeakAt`, ...).

use crate::key::{Kind, Reference};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when an enum value arrives in an unknown spelling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {what}: {value}")]
pub struct ParseEnumError {
    what: &'static str,
    value: String,
}

/// T-shirt size recorded on a profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum TeeShirtSize {
    #[default]
    NotSpecified,
    XsM,
    XsW,
    SM,
    SW,
    MM,
    MW,
    LM,
    LW,
    XlM,
    XlW,
    XxlM,
    XxlW,
    XxxlM,
    XxxlW,
}

impl TeeShirtSize {
    const ALL: [Self; 15] = [
        Self::NotSpecified,
        Self::XsM,
        Self::XsW,
        Self::SM,
        Self::SW,
        Self::MM,
        Self::MW,
        Self::LM,
        Self::LW,
        Self::XlM,
        Self::XlW,
        Self::XxlM,
        Self::XxlW,
        Self::XxxlM,
        Self::XxxlW,
    ];

    /// Wire spelling, e.g. `"XL_W"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSpecified => "NOT_SPECIFIED",
            Self::XsM => "XS_M",
            Self::XsW => "XS_W",
            Self::SM => "S_M",
            Self::SW => "S_W",
            Self::MM => "M_M",
            Self::MW => "M_W",
            Self::LM => "L_M",
            Self::LW => "L_W",
            Self::XlM => "XL_M",
            Self::XlW => "XL_W",
            Self::XxlM => "XXL_M",
            Self::XxlW => "XXL_W",
            Self::XxxlM => "XXXL_M",
            Self::XxxlW => "XXXL_W",
        }
    }
}

impl FromStr for TeeShirtSize {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|size| size.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                what: "t-shirt size",
                value: s.to_string(),
            })
    }
}

/// Category of a conference session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    /// Not categorised.
    #[default]
    Unknown,
    /// Hands-on workshop.
    Workshop,
    /// Lecture.
    Lecture,
    /// Keynote.
    Keynote,
    /// Informal meetup.
    Meetup,
}

impl SessionType {
    /// Wire spelling, e.g. `"KEYNOTE"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Workshop => "WORKSHOP",
            Self::Lecture => "LECTURE",
            Self::Keynote => "KEYNOTE",
            Self::Meetup => "MEETUP",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNKNOWN" => Ok(Self::Unknown),
            "WORKSHOP" => Ok(Self::Workshop),
            "LECTURE" => Ok(Self::Lecture),
            "KEYNOTE" => Ok(Self::Keynote),
            "MEETUP" => Ok(Self::Meetup),
            _ => Err(ParseEnumError {
                what: "session type",
                value: s.to_string(),
            }),
        }
    }
}

/// Attendee profile. Keyed by the caller's stable user id; never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Display name, initially the caller's nickname.
    pub display_name: String,
    /// Contact email.
    pub main_email: String,
    /// Shirt size.
    pub tee_shirt_size: TeeShirtSize,
    /// Conferences the user is registered for, in registration order.
    pub conference_keys_to_attend: Vec<Reference>,
}

impl Profile {
    /// True when the profile is registered for `conference`.
    #[must_use]
    pub fn is_attending(&self, conference: &Reference) -> bool {
        self.conference_keys_to_attend.contains(conference)
    }
}

/// A conference, owned by the organizer's profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conference {
    /// Name, never empty.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// User id of the organizer.
    pub organizer_user_id: String,
    /// Topics.
    pub topics: Vec<String>,
    /// City.
    pub city: Option<String>,
    /// First day.
    pub start_date: Option<NaiveDate>,
    /// Month of `start_date`, 0 when there is none.
    pub month: u32,
    /// Last day.
    pub end_date: Option<NaiveDate>,
    /// Capacity.
    pub max_attendees: u32,
    /// Remaining seats, `0 <= seats_available <= max_attendees`.
    pub seats_available: u32,
}

impl Conference {
    /// Number of seats currently taken.
    #[must_use]
    pub const fn attendee_count(&self) -> u32 {
        self.max_attendees.saturating_sub(self.seats_available)
    }
}

/// A session inside a conference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceSession {
    /// Name, never empty.
    pub name: String,
    /// Highlights.
    pub highlights: Option<String>,
    /// Assigned speaker. When set, the speaker's `session_keys_to_speak_at`
    /// contains this session and vice versa.
    pub speaker_key: Option<Reference>,
    /// Start time of day.
    pub start_time: Option<NaiveTime>,
    /// Duration in minutes.
    pub duration: u32,
    /// Category.
    pub type_of_session: SessionType,
    /// Day of the session.
    pub date: Option<NaiveDate>,
}

/// A speaker; independent of any conference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Speaker {
    /// Display name.
    pub display_name: Option<String>,
    /// Contact email, required.
    pub main_email: String,
    /// Sessions this speaker is assigned to.
    pub session_keys_to_speak_at: Vec<Reference>,
}

/// A profile's set of sessions of interest. One per profile, never deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    /// Session references without duplicates, in insertion order.
    pub sessions: Vec<Reference>,
}

/// Any storable entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
#[allow(missing_docs)]
pub enum Entity {
    Profile(Profile),
    Conference(Conference),
    ConferenceSession(ConferenceSession),
    Speaker(Speaker),
    Wishlist(Wishlist),
}

impl Entity {
    /// Kind of this entity.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Profile(_) => Kind::Profile,
            Self::Conference(_) => Kind::Conference,
            Self::ConferenceSession(_) => Kind::ConferenceSession,
            Self::Speaker(_) => Kind::Speaker,
            Self::Wishlist(_) => Kind::Wishlist,
        }
    }

    /// Read a property by its camelCase name. Unknown names and unset optional
    /// fields read as [`PropertyValue::Null`].
    #[must_use]
    pub fn property(&self, name: &str) -> PropertyValue {
        match self {
            Self::Profile(p) => match name {
                "displayName" => PropertyValue::text(&p.display_name),
                "mainEmail" => PropertyValue::text(&p.main_email),
                "teeShirtSize" => PropertyValue::text(p.tee_shirt_size.as_str()),
                "conferenceKeysToAttend" => PropertyValue::references(&p.conference_keys_to_attend),
                _ => PropertyValue::Null,
            },
            Self::Conference(c) => match name {
                "name" => PropertyValue::text(&c.name),
                "description" => c.description.as_deref().map_or(PropertyValue::Null, PropertyValue::text),
                "organizerUserId" => PropertyValue::text(&c.organizer_user_id),
                "topics" => PropertyValue::List(c.topics.iter().map(PropertyValue::text).collect()),
                "city" => c.city.as_deref().map_or(PropertyValue::Null, PropertyValue::text),
                "startDate" => c.start_date.map_or(PropertyValue::Null, PropertyValue::Date),
                "endDate" => c.end_date.map_or(PropertyValue::Null, PropertyValue::Date),
                "month" => PropertyValue::Int(i64::from(c.month)),
                "maxAttendees" => PropertyValue::Int(i64::from(c.max_attendees)),
                "seatsAvailable" => PropertyValue::Int(i64::from(c.seats_available)),
                _ => PropertyValue::Null,
            },
            Self::ConferenceSession(s) => match name {
                "name" => PropertyValue::text(&s.name),
                "highlights" => s.highlights.as_deref().map_or(PropertyValue::Null, PropertyValue::text),
                "speakerKey" => s
                    .speaker_key
                    .as_ref()
                    .map_or(PropertyValue::Null, |r| PropertyValue::text(r.as_str())),
                "startTime" => s.start_time.map_or(PropertyValue::Null, PropertyValue::Time),
                "duration" => PropertyValue::Int(i64::from(s.duration)),
                "typeOfSession" => PropertyValue::text(s.type_of_session.as_str()),
                "date" => s.date.map_or(PropertyValue::Null, PropertyValue::Date),
                _ => PropertyValue::Null,
            },
            Self::Speaker(s) => match name {
                "displayName" => s.display_name.as_deref().map_or(PropertyValue::Null, PropertyValue::text),
                "mainEmail" => PropertyValue::text(&s.main_email),
                "sessionKeysToSpeakAt" => PropertyValue::references(&s.session_keys_to_speak_at),
                _ => PropertyValue::Null,
            },
            Self::Wishlist(w) => match name {
                "sessions" => PropertyValue::references(&w.sessions),
                _ => PropertyValue::Null,
            },
        }
    }
}

/// Typed access to one variant of [`Entity`].
pub trait EntityKind: Sized + Into<Entity> {
    /// The kind this type is stored as.
    const KIND: Kind;

    /// Extract the typed value, or `None` if `entity` is another kind.
    fn from_entity(entity: Entity) -> Option<Self>;
}

macro_rules! entity_kind {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Entity {
                fn from(value: $ty) -> Self {
                    Self::$ty(value)
                }
            }

            impl EntityKind for $ty {
                const KIND: Kind = Kind::$ty;

                fn from_entity(entity: Entity) -> Option<Self> {
                    match entity {
                        Entity::$ty(value) => Some(value),
                        _ => None,
                    }
                }
            }
        )*
    };
}

entity_kind!(Profile, Conference, ConferenceSession, Speaker, Wishlist);

static NULL_VALUE: PropertyValue = PropertyValue::Null;

/// A property value as seen by query predicates and sort orders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    /// Property absent or unset.
    Null,
    /// Integer.
    Int(i64),
    /// String.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Repeated property.
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Convenience constructor for text values.
    #[must_use]
    pub fn text(value: impl AsRef<str>) -> Self {
        Self::Text(value.as_ref().to_string())
    }

    fn references(values: &[Reference]) -> Self {
        Self::List(values.iter().map(|r| Self::text(r.as_str())).collect())
    }

    /// Compare two scalar values of the same type.
    ///
    /// Returns `None` for mismatched types, lists and nulls: such pairs never
    /// satisfy a predicate.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Ordering used for sorting: nulls first, lists by their smallest element,
    /// then by type and value.
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        let a = self.sort_key();
        let b = other.sort_key();
        a.rank()
            .cmp(&b.rank())
            .then_with(|| a.compare(b).unwrap_or(Ordering::Equal))
    }

    fn sort_key(&self) -> &Self {
        match self {
            Self::List(items) => items
                .iter()
                .min_by(|a, b| a.sort_cmp(b))
                .unwrap_or(&NULL_VALUE),
            other => other,
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null | Self::List(_) => 0,
            Self::Int(_) => 1,
            Self::Text(_) => 2,
            Self::Date(_) => 3,
            Self::Time(_) => 4,
        }
    }
}
