//! Caller identity.

use crate::error::{ConferenceError, Result};
use std::future::Future;
use std::pin::Pin;

/// Message returned when no caller could be authenticated.
pub const AUTHORIZATION_REQUIRED: &str = "Authorization required";

/// An authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallerIdentity {
    /// Stable user id; doubles as the caller's profile id.
    pub user_id: String,
    /// Email address.
    pub email: String,
    /// Display nickname, used as the default profile name.
    pub nickname: String,
}

impl CallerIdentity {
    /// Build an identity.
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            nickname: nickname.into(),
        }
    }
}

/// Boxed future returned by [`IdentityResolver::resolve`].
pub type IdentityFuture<'a> = Pin<Box<dyn Future<Output = Result<CallerIdentity>> + Send + 'a>>;

/// Turns request credentials into a caller identity.
pub trait IdentityResolver: Send + Sync {
    /// Resolve a bearer credential. `None` means the request carried none.
    ///
    /// # Errors
    ///
    /// Returns [`ConferenceError::Unauthorized`] when the credential is missing
    /// or not recognised.
    fn resolve<'a>(&'a self, bearer: Option<&'a str>) -> IdentityFuture<'a>;
}

/// The error every resolver returns for a missing or unknown credential.
#[must_use]
pub fn unauthorized() -> ConferenceError {
    ConferenceError::Unauthorized(AUTHORIZATION_REQUIRED.to_string())
}
