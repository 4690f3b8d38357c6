//! Fire-and-forget task dispatch.
//!
//! Side effects that do not belong in a request (confirmation email, speaker
//! summary refresh) are handed to an external queue as a task name plus an
//! opaque string parameter map.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`TaskQueue::dispatch`].
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TaskQueueError>> + Send + 'a>>;

/// The queue rejected or could not accept a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to dispatch task {task}: {reason}")]
pub struct TaskQueueError {
    /// Task name.
    pub task: String,
    /// Why dispatch failed.
    pub reason: String,
}

/// A named task with string parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// Handler name on the consuming side.
    pub name: String,
    /// Parameters, sorted by name.
    pub params: BTreeMap<String, String>,
}

impl Task {
    /// Task name for conference-creation confirmation emails.
    pub const SEND_CONFIRMATION_EMAIL: &'static str = "send_confirmation_email";
    /// Task name for speaker summary refreshes.
    pub const SET_SPEAKER_AND_SESSIONS: &'static str = "set_speaker_and_sessions";

    /// Build a task with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Email the organizer that their conference was created.
    #[must_use]
    pub fn send_confirmation_email(email: &str, conference_info: &str) -> Self {
        Self::new(Self::SEND_CONFIRMATION_EMAIL)
            .param("email", email)
            .param("conferenceInfo", conference_info)
    }

    /// Recompute the summary for a speaker at a conference.
    #[must_use]
    pub fn set_speaker_and_sessions(speaker_id: &str, conference_id: &str) -> Self {
        Self::new(Self::SET_SPEAKER_AND_SESSIONS)
            .param("speakerId", speaker_id)
            .param("conferenceId", conference_id)
    }

    /// Look up a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Sink for asynchronous tasks.
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task. Completion is not awaited.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError`] if the queue refuses the task.
    fn dispatch(&self, task: Task) -> TaskFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_task_carries_both_ids() {
        let task = Task::set_speaker_and_sessions("spk", "conf");
        assert_eq!(task.name, "set_speaker_and_sessions");
        assert_eq!(task.get("speakerId"), Some("spk"));
        assert_eq!(task.get("conferenceId"), Some("conf"));
    }
}
