//! Entity keys and their URL-safe references.
//!
//! Every record in the store is addressed by an [`EntityKey`]: an ordered path of
//! `(Kind, id)` pairs. The last pair names the record itself, the pairs before it
//! name its ancestors. Ancestry doubles as ownership:
//!
//! ```text
//! Profile(alice)                       organizer
//! └── Conference(7f3c…)                owned by alice
//!     └── ConferenceSession(91aa…)     owned by the conference
//! Profile(alice)
//! └── Wishlist(wishlist)               one per profile
//! Speaker(c2d0…)                       top level
//! ```
//!
//! A [`Reference`] is the opaque, globally resolvable form of a key that crosses
//! the API boundary: base64url (no padding) over the JSON-encoded path.
//!
//! # Examples
//!
//! ```
//! use conference_core::key::{EntityKey, Kind, Reference};
//!
//! let profile = EntityKey::root(Kind::Profile, "alice");
//! let conference = profile.child(Kind::Conference, "c-1");
//!
//! let reference = conference.to_reference();
//! let decoded: EntityKey = reference.decode().unwrap();
//! assert_eq!(decoded, conference);
//! assert_eq!(decoded.parent(), Some(profile));
//! ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a reference cannot be decoded into a key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid reference: {0}")]
pub struct ParseReferenceError(String);

/// The five entity kinds the store holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Attendee profile, keyed by the caller's user id.
    Profile,
    /// Conference, child of its organizer's profile.
    Conference,
    /// Session, child of its conference.
    ConferenceSession,
    /// Speaker, top level.
    Speaker,
    /// Wishlist, child of a profile.
    Wishlist,
}

impl Kind {
    /// Stable name used in storage and log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "Profile",
            Self::Conference => "Conference",
            Self::ConferenceSession => "ConferenceSession",
            Self::Speaker => "Speaker",
            Self::Wishlist => "Wishlist",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a record: the path from the top-level ancestor down to the record.
///
/// Keys order lexicographically by path, so all descendants of a key sort
/// directly after it. The in-memory store relies on this for ancestor scans.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    path: Vec<(Kind, String)>,
}

impl EntityKey {
    /// Create a top-level key (no parent).
    #[must_use]
    pub fn root(kind: Kind, id: impl Into<String>) -> Self {
        Self {
            path: vec![(kind, id.into())],
        }
    }

    /// Create a key for a child of `self`.
    #[must_use]
    pub fn child(&self, kind: Kind, id: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push((kind, id.into()));
        Self { path }
    }

    /// Create a key with a freshly generated id, optionally under a parent.
    #[must_use]
    pub fn allocate(kind: Kind, parent: Option<&Self>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        match parent {
            Some(parent) => parent.child(kind, id),
            None => Self::root(kind, id),
        }
    }

    /// Kind of the record this key addresses.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.last().0
    }

    /// Id of the record within its parent.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.last().1
    }

    /// Parent key, or `None` for top-level records.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Self {
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// All ancestors from the top-level key down to the direct parent.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        (1..self.path.len())
            .map(|len| Self {
                path: self.path[..len].to_vec(),
            })
            .collect()
    }

    /// True when `ancestor` is a strict prefix of this key.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
        self.path.len() > ancestor.path.len() && self.path.starts_with(&ancestor.path)
    }

    /// Encode this key as a URL-safe reference.
    #[must_use]
    pub fn to_reference(&self) -> Reference {
        // A Vec of (enum, String) pairs always serializes.
        let json = serde_json::to_vec(&self.path).unwrap_or_default();
        Reference(URL_SAFE_NO_PAD.encode(json))
    }

    // Constructors and `Reference::decode` never produce an empty path.
    fn last(&self) -> &(Kind, String) {
        &self.path[self.path.len() - 1]
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (kind, id)) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{kind}:{id}")?;
        }
        Ok(())
    }
}

/// Opaque, URL-safe identifier for a record.
///
/// Use [`FromStr`] for input that arrives from callers: it checks that the
/// string decodes to a well-formed key. [`Reference::decode`] does the same for
/// an already-constructed reference.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    /// Wrap a string without validation.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the reference back into the key it was made from.
    ///
    /// # Errors
    ///
    /// Returns [`ParseReferenceError`] when the string is not base64url, is not a
    /// JSON key path, or the path is empty.
    pub fn decode(&self) -> Result<EntityKey, ParseReferenceError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|e| ParseReferenceError(format!("{}: {e}", self.0)))?;
        let path: Vec<(Kind, String)> = serde_json::from_slice(&bytes)
            .map_err(|e| ParseReferenceError(format!("{}: {e}", self.0)))?;
        if path.is_empty() || path.iter().any(|(_, id)| id.is_empty()) {
            return Err(ParseReferenceError(format!("{}: empty key path", self.0)));
        }
        Ok(EntityKey { path })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Reference {
    type Err = ParseReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reference = Self(s.to_string());
        reference.decode()?;
        Ok(reference)
    }
}

impl From<&EntityKey> for Reference {
    fn from(key: &EntityKey) -> Self {
        key.to_reference()
    }
}

impl AsRef<str> for Reference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn reference_roundtrip_preserves_path() {
        let key = EntityKey::root(Kind::Profile, "user/with/slashes")
            .child(Kind::Conference, "c1")
            .child(Kind::ConferenceSession, "s1");

        let reference = key.to_reference();
        assert!(!reference.as_str().contains('/'));
        assert!(!reference.as_str().contains('='));
        assert_eq!(reference.decode().unwrap(), key);
    }

    #[test]
    fn parent_and_ancestors() {
        let profile = EntityKey::root(Kind::Profile, "alice");
        let conference = profile.child(Kind::Conference, "c1");
        let session = conference.child(Kind::ConferenceSession, "s1");

        assert_eq!(profile.parent(), None);
        assert_eq!(session.parent(), Some(conference.clone()));
        assert_eq!(session.ancestors(), vec![profile.clone(), conference.clone()]);
        assert!(session.is_descendant_of(&profile));
        assert!(!profile.is_descendant_of(&profile));
        assert_eq!(session.kind(), Kind::ConferenceSession);
        assert_eq!(session.id(), "s1");
    }

    #[test]
    fn malformed_references_are_rejected() {
        assert!("not base64 !!".parse::<Reference>().is_err());
        // Valid base64url, but not a key path.
        assert!("aGVsbG8".parse::<Reference>().is_err());
        // Valid JSON, empty path.
        let empty = URL_SAFE_NO_PAD.encode(b"[]");
        assert!(empty.parse::<Reference>().is_err());
    }

    #[test]
    fn allocated_keys_are_unique() {
        let parent = EntityKey::root(Kind::Profile, "alice");
        let a = EntityKey::allocate(Kind::Conference, Some(&parent));
        let b = EntityKey::allocate(Kind::Conference, Some(&parent));
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(parent));
    }

    #[test]
    fn display_is_readable() {
        let key = EntityKey::root(Kind::Profile, "alice").child(Kind::Wishlist, "wishlist");
        assert_eq!(key.to_string(), "Profile:alice/Wishlist:wishlist");
    }
}
