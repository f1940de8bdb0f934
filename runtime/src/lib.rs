//! # Feedback Loop Runtime
//!
//! Runtime implementation of the unidirectional feedback loop.
//!
//! This crate provides the Floodgate that serializes reducer execution over
//! concurrently produced events, the Feedback combinators that turn state
//! observations into event-producing effects, and the loop lifecycle that
//! ties them together.
//!
//! ## Core Components
//!
//! - **Floodgate**: the gate that applies events to state, one at a time,
//!   no matter how many producers push concurrently
//! - **Feedback**: declarative state-to-effect rules with flatten-latest
//!   cancellation
//! - **FeedbackLoop / Store**: lifecycle, external sends, snapshot streams,
//!   scoped contexts
//!
//! ## Example
//!
//! ```ignore
//! use feedback_loop_runtime::{Feedback, Store};
//! use feedback_loop_core::FnReducer;
//!
//! let store = Store::new(
//!     initial_state,
//!     FnReducer::new(my_reducer),
//!     Feedback::combine(vec![page_fetcher, session_watcher]),
//! );
//!
//! // Send an event
//! store.send(Event::Refresh)?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field);
//! ```

/// Ready-made effect stream constructors
pub mod effects;

/// Feedback combinators and the effect engine
pub mod feedback;

/// Loop assembly, lifecycle and configuration
pub mod feedback_loop;

/// The serialized event-draining gate
pub mod floodgate;

/// Prometheus metrics for observability
pub mod metrics;

/// Store and scoped contexts
pub mod store;

/// Error types for the loop runtime
pub mod error {
    use std::time::Duration;
    use thiserror::Error;

    /// Errors that can occur when driving a feedback loop.
    #[derive(Error, Debug)]
    pub enum LoopError {
        /// The loop has been stopped and no longer accepts events.
        ///
        /// Returned by `send()` and `wait_for()` once `stop()` has run;
        /// stopping is terminal.
        #[error("Feedback loop is stopped")]
        Stopped,

        /// Timeout waiting for a matching snapshot
        ///
        /// Returned by `wait_for` when the deadline expires before any
        /// snapshot satisfies the predicate.
        #[error("Timed out after {duration:?} waiting for a matching snapshot")]
        Timeout {
            /// The deadline that elapsed.
            duration: Duration,
        },
    }
}

pub use error::LoopError;
pub use feedback::{Feedback, SharedConsumer};
pub use feedback_loop::{FeedbackLoop, LoopConfig};
pub use floodgate::{Floodgate, StateStream};
pub use store::{Context, Store};
