//! Entity and caller fixtures.

use chrono::NaiveDate;
use conference_core::entity::{Conference, ConferenceSession, Profile, SessionType, Speaker, TeeShirtSize};
use conference_core::identity::CallerIdentity;

/// A caller with a predictable email and nickname.
///
/// ```
/// let alice = conference_testing::caller("alice");
/// assert_eq!(alice.email, "alice@example.com");
/// assert_eq!(alice.nickname, "alice");
/// ```
#[must_use]
pub fn caller(user_id: &str) -> CallerIdentity {
    CallerIdentity::new(user_id, format!("{user_id}@example.com"), user_id)
}

/// The profile a first write for `user_id` would create.
#[must_use]
pub fn profile(user_id: &str) -> Profile {
    Profile {
        display_name: user_id.to_string(),
        main_email: format!("{user_id}@example.com"),
        tee_shirt_size: TeeShirtSize::NotSpecified,
        conference_keys_to_attend: Vec::new(),
    }
}

/// A conference organized by `organizer` with every seat free.
#[must_use]
pub fn conference(name: &str, organizer: &str, max_attendees: u32) -> Conference {
    Conference {
        name: name.to_string(),
        description: None,
        organizer_user_id: organizer.to_string(),
        topics: vec!["Default".to_string(), "Topic".to_string()],
        city: Some("Default City".to_string()),
        start_date: NaiveDate::from_ymd_opt(2026, 6, 1),
        month: 6,
        end_date: NaiveDate::from_ymd_opt(2026, 6, 3),
        max_attendees,
        seats_available: max_attendees,
    }
}

/// A speaker with no sessions.
#[must_use]
pub fn speaker(email: &str) -> Speaker {
    Speaker {
        display_name: None,
        main_email: email.to_string(),
        session_keys_to_speak_at: Vec::new(),
    }
}

/// A one-hour lecture with no speaker.
#[must_use]
pub fn session(name: &str) -> ConferenceSession {
    ConferenceSession {
        name: name.to_string(),
        highlights: None,
        speaker_key: None,
        start_time: chrono::NaiveTime::from_hms_opt(10, 30, 0),
        duration: 60,
        type_of_session: SessionType::Lecture,
        date: None,
    }
}
