//! Metrics for observability and monitoring.
//!
//! Counters are emitted through the `metrics` facade. Without an installed
//! recorder they are no-ops; the embedding application installs whichever
//! exporter it runs and calls [`register_metrics`] once at startup.
//!
//! | Metric | Labels |
//! |--------|--------|
//! | `conference_registrations_total` | `outcome` |
//! | `conference_transaction_retries_total` | `operation` |
//! | `conference_cascade_records_total` | `kind` |
//! | `conference_announcement_refreshes_total` | `outcome` |

use conference_core::key::Kind;
use metrics::{counter, describe_counter};

/// Registrations and unregistrations by outcome.
pub const REGISTRATIONS_TOTAL: &str = "conference_registrations_total";
/// Transaction attempts beyond the first.
pub const TRANSACTION_RETRIES_TOTAL: &str = "conference_transaction_retries_total";
/// Records touched by deletion cascades.
pub const CASCADE_RECORDS_TOTAL: &str = "conference_cascade_records_total";
/// Announcement recomputations.
pub const ANNOUNCEMENT_REFRESHES_TOTAL: &str = "conference_announcement_refreshes_total";

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        REGISTRATIONS_TOTAL,
        "Total number of register/unregister calls by outcome"
    );
    describe_counter!(
        TRANSACTION_RETRIES_TOTAL,
        "Total number of transaction retries caused by write contention"
    );
    describe_counter!(
        CASCADE_RECORDS_TOTAL,
        "Total number of records modified or deleted by deletion cascades"
    );
    describe_counter!(
        ANNOUNCEMENT_REFRESHES_TOTAL,
        "Total number of sold-out announcement recomputations"
    );
}

/// Count a registration outcome (`registered`, `unregistered`, `not_registered`,
/// `rejected`, `failed`).
pub(crate) fn record_registration(outcome: &'static str) {
    counter!(REGISTRATIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_transaction_retry(operation: &'static str) {
    counter!(TRANSACTION_RETRIES_TOTAL, "operation" => operation).increment(1);
}

pub(crate) fn record_cascade(kind: Kind, records: u64) {
    counter!(CASCADE_RECORDS_TOTAL, "kind" => kind.as_str()).increment(records);
}

pub(crate) fn record_announcement_refresh(outcome: &'static str) {
    counter!(ANNOUNCEMENT_REFRESHES_TOTAL, "outcome" => outcome).increment(1);
}
