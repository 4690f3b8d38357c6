//! # Conference Testing
//!
//! Testing utilities for the conference backend.
//!
//! This crate provides:
//! - In-memory implementations of every collaborator seam ([`mocks`])
//! - Entity and caller fixtures ([`fixtures`])
//! - proptest strategies ([`properties`])
//! - Log output for tests ([`helpers`])
//!
//! ## Example
//!
//! ```
//! use conference_core::store::EntityStore;
//! use conference_testing::mocks::InMemoryEntityStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn EntityStore> = Arc::new(InMemoryEntityStore::new());
//! # let _ = store;
//! ```

pub mod fixtures;
pub mod mocks;

/// Test helpers.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Route `tracing` output to the test harness.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// One step of a registration sequence.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum SeatOp {
        /// User `n` registers.
        Register(usize),
        /// User `n` unregisters.
        Unregister(usize),
    }

    impl SeatOp {
        /// Index of the user performing the step.
        #[must_use]
        pub const fn user(self) -> usize {
            match self {
                Self::Register(user) | Self::Unregister(user) => user,
            }
        }
    }

    /// Arbitrary register/unregister sequences over `users` distinct users.
    pub fn seat_ops(users: usize, max_len: usize) -> impl Strategy<Value = Vec<SeatOp>> {
        let op = (0..users, any::<bool>()).prop_map(|(user, register)| {
            if register {
                SeatOp::Register(user)
            } else {
                SeatOp::Unregister(user)
            }
        });
        prop::collection::vec(op, 0..max_len)
    }
}

pub use fixtures::caller;
pub use mocks::{InMemoryCache, InMemoryEntityStore, RecordingTaskQueue, StaticIdentityResolver};
